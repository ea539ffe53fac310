//! External command description.

use std::fmt;
use tokio::process::Command;

/// Placeholder printed instead of sensitive argument values.
const REDACTED: &str = "****";

/// A program invocation that can be displayed without leaking secrets.
#[derive(Clone)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    /// Indexes into `args` whose value must never be printed
    sensitive: Vec<usize>,
    shell: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            sensitive: Vec::new(),
            shell: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add an argument that is redacted in `Display`/`Debug` output.
    pub fn secret_arg(mut self, arg: impl Into<String>) -> Self {
        self.sensitive.push(self.args.len());
        self.args.push(arg.into());
        self
    }

    /// Run through `sh -c` instead of executing the program directly.
    ///
    /// Arguments are handed to the shell as positional parameters
    /// (`exec "$0" "$@"`), so values never need quoting.
    pub fn shell(mut self, shell: bool) -> Self {
        self.shell = shell;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn is_shell(&self) -> bool {
        self.shell
    }

    pub(crate) fn to_command(&self) -> Command {
        let mut cmd = if self.shell {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg("exec \"$0\" \"$@\"").arg(&self.program);
            cmd
        } else {
            Command::new(&self.program)
        };
        cmd.args(&self.args);
        cmd
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.shell {
            write!(f, "sh -c ")?;
        }
        write!(f, "{}", self.program)?;
        for (i, arg) in self.args.iter().enumerate() {
            if self.sensitive.contains(&i) {
                write!(f, " {}", redact(arg))?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("command", &self.to_string())
            .field("shell", &self.shell)
            .finish()
    }
}

/// Keep a `--flag=` prefix visible, hide the value.
fn redact(arg: &str) -> String {
    match arg.split_once('=') {
        Some((flag, _)) if flag.starts_with('-') => format!("{}={}", flag, REDACTED),
        _ => REDACTED.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_redacts_secrets() {
        let spec = CommandSpec::new("mysqldump")
            .arg("-h")
            .arg("localhost")
            .secret_arg("--password=hunter2")
            .arg("openmrs");

        let shown = spec.to_string();
        assert_eq!(shown, "mysqldump -h localhost --password=**** openmrs");
        assert!(!format!("{:?}", spec).contains("hunter2"));
    }

    #[test]
    fn test_bare_secret_is_fully_redacted() {
        let spec = CommandSpec::new("mysql").arg("-p").secret_arg("hunter2");
        assert_eq!(spec.to_string(), "mysql -p ****");
        assert!(!format!("{:?}", spec).contains("hunter2"));
    }

    #[test]
    fn test_shell_display() {
        let spec = CommandSpec::new("mysql").arg("db").shell(true);
        assert!(spec.is_shell());
        assert_eq!(spec.to_string(), "sh -c mysql db");
    }
}

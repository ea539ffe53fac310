//! Dump and restore invocations built from configuration.

use crate::config::{DatabaseConfig, ToolConfig};
use crate::process::CommandSpec;

fn connection_args(tool: &ToolConfig, db: &DatabaseConfig, password: &str) -> CommandSpec {
    let mut spec = CommandSpec::new(&tool.program)
        .args(tool.extra_args.iter().cloned())
        .arg("-h")
        .arg(&db.host)
        .arg("-P")
        .arg(db.port.to_string())
        .arg("-u")
        .arg(&db.user);
    if !password.is_empty() {
        spec = spec.secret_arg(format!("--password={}", password));
    }
    spec.arg(&db.name).shell(tool.shell)
}

/// `mysqldump [extra] -h <host> -P <port> -u <user> --password=<pw> <db>`, SQL on stdout.
pub fn dump_command(tool: &ToolConfig, db: &DatabaseConfig, password: &str) -> CommandSpec {
    connection_args(tool, db, password)
}

/// `mysql [extra] -h <host> -P <port> -u <user> --password=<pw> <db>`, SQL on stdin.
pub fn restore_command(tool: &ToolConfig, db: &DatabaseConfig, password: &str) -> CommandSpec {
    connection_args(tool, db, password)
}

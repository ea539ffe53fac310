//! Configuration management for dumpvault
//!
//! Loaded once at process start from `dumpvault.toml` and shared as
//! `Arc<Config>`. Secrets may be given inline or through environment
//! variables (`database.password_env`, `crypto.key_env`).

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::artifact::ArtifactStore;
use crate::crypto::{build_transform, CipherMode, CryptoKey, CryptoTransform};

/// Main configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub crypto: CryptoConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Connection settings handed to the dump and restore tools.
#[derive(Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_user")]
    pub user: String,
    /// Inline password. Prefer `password_env`.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Environment variable holding the password
    #[serde(default)]
    pub password_env: Option<String>,
    /// Database (schema) name; also the artifact name prefix
    #[serde(default = "default_database")]
    pub name: String,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    3306
}

fn default_user() -> String {
    "root".to_string()
}

fn default_database() -> String {
    "openmrs".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            user: default_user(),
            password: None,
            password_env: None,
            name: default_database(),
        }
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("password_env", &self.password_env)
            .field("name", &self.name)
            .finish()
    }
}

impl DatabaseConfig {
    /// Resolve the password: `password_env` wins over the inline value.
    pub fn resolve_password(&self) -> Result<String> {
        if let Some(ref var) = self.password_env {
            return std::env::var(var)
                .with_context(|| format!("Environment variable '{}' not set", var));
        }
        Ok(self.password.clone().unwrap_or_default())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackupConfig {
    /// Directory holding every artifact
    #[serde(default = "default_backup_dir")]
    pub dir: PathBuf,
    /// Fixed name of the transient decrypted file used by imports
    #[serde(default = "default_temp_file_name")]
    pub temp_file_name: String,
    /// Extension of plaintext dumps
    #[serde(default = "default_plaintext_extension")]
    pub plaintext_extension: String,
    /// Suffix appended to plaintext names once encrypted
    #[serde(default = "default_encrypted_suffix")]
    pub encrypted_suffix: String,
}

fn default_backup_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("backups")
}

fn default_temp_file_name() -> String {
    "temp_decrypted.sql".to_string()
}

fn default_plaintext_extension() -> String {
    "sql".to_string()
}

fn default_encrypted_suffix() -> String {
    "enc".to_string()
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: default_backup_dir(),
            temp_file_name: default_temp_file_name(),
            plaintext_extension: default_plaintext_extension(),
            encrypted_suffix: default_encrypted_suffix(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default = "default_dump_tool")]
    pub dump: ToolConfig,
    #[serde(default = "default_restore_tool")]
    pub restore: ToolConfig,
}

/// An external program plus how to invoke it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolConfig {
    pub program: String,
    /// Extra arguments placed before the connection flags
    #[serde(default)]
    pub extra_args: Vec<String>,
    /// Spawn through `sh -c`
    #[serde(default)]
    pub shell: bool,
}

fn default_dump_tool() -> ToolConfig {
    ToolConfig {
        program: "mysqldump".to_string(),
        extra_args: Vec::new(),
        shell: false,
    }
}

fn default_restore_tool() -> ToolConfig {
    ToolConfig {
        program: "mysql".to_string(),
        extra_args: Vec::new(),
        shell: true,
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            dump: default_dump_tool(),
            restore: default_restore_tool(),
        }
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct CryptoConfig {
    #[serde(default)]
    pub mode: CipherMode,
    /// Inline hex or base64 key. Prefer `key_env`.
    #[serde(default, skip_serializing)]
    pub key: Option<String>,
    /// Environment variable holding the hex or base64 key
    #[serde(default = "default_key_env")]
    pub key_env: Option<String>,
}

fn default_key_env() -> Option<String> {
    Some("DUMPVAULT_KEY".to_string())
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            mode: CipherMode::default(),
            key: None,
            key_env: default_key_env(),
        }
    }
}

impl std::fmt::Debug for CryptoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoConfig")
            .field("mode", &self.mode)
            .field("key", &self.key.as_ref().map(|_| "[REDACTED]"))
            .field("key_env", &self.key_env)
            .finish()
    }
}

impl CryptoConfig {
    /// Load the key: an inline key wins, otherwise `key_env` is read.
    pub fn load_key(&self) -> Result<CryptoKey> {
        if let Some(ref encoded) = self.key {
            return CryptoKey::parse(encoded).map_err(|e| anyhow!("crypto.key: {}", e));
        }
        match self.key_env {
            Some(ref var) => CryptoKey::from_env(var).map_err(|e| anyhow!("crypto.key_env: {}", e)),
            None => bail!("No encryption key configured (set crypto.key or crypto.key_env)"),
        }
    }

    /// Build the configured transform.
    pub fn transform(&self) -> Result<Arc<dyn CryptoTransform>> {
        let key = self.load_key()?;
        build_transform(self.mode, &key).map_err(|e| anyhow!("{}", e))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// Pending jobs held before submissions wait for a free slot
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,
}

fn default_queue_capacity() -> usize {
    32
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Finished job outcomes kept in memory for `GET /jobs`
    #[serde(default = "default_recent_outcomes")]
    pub recent_outcomes: usize,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_recent_outcomes() -> usize {
    100
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            recent_outcomes: default_recent_outcomes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log output format: "pretty" or "json"
    /// Override with LOG_FORMAT env var
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter string
    /// Override with RUST_LOG env var
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable Prometheus metrics at GET /metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_log_level() -> String {
    "info,dumpvault=debug".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: default_log_format(),
            log_level: default_log_level(),
            metrics_enabled: true,
        }
    }
}

/// Expand ~ to home directory in path
pub fn expand_tilde(path: &Path) -> Result<PathBuf> {
    let s = path.to_string_lossy();
    if let Some(rest) = s.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
        Ok(home.join(rest))
    } else if s == "~" {
        dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))
    } else {
        Ok(path.to_path_buf())
    }
}

/// Where [`Config::load_or_default`] got its settings from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults { missing: PathBuf },
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::File(path) => write!(f, "config file {}", path.display()),
            ConfigSource::Defaults { missing } => write!(
                f,
                "defaults (config file {} not found)",
                missing.display()
            ),
        }
    }
}

impl Config {
    /// Parse a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content).context("Invalid config file")?;
        config.expand_paths()?;
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn load(config_path: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Cannot read config {}", config_path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Load config from file path, or fall back to defaults when it is missing.
    ///
    /// Nothing is logged here; callers report the returned [`ConfigSource`]
    /// once logging is set up from the loaded config.
    pub fn load_or_default(config_path: &Path) -> Result<(Self, ConfigSource)> {
        if config_path.exists() {
            let config = Self::load(config_path)?;
            Ok((config, ConfigSource::File(config_path.to_path_buf())))
        } else {
            let mut config = Config::default();
            config.expand_paths()?;
            Ok((
                config,
                ConfigSource::Defaults {
                    missing: config_path.to_path_buf(),
                },
            ))
        }
    }

    /// Expand ~ in all paths
    fn expand_paths(&mut self) -> Result<()> {
        self.backup.dir = expand_tilde(&self.backup.dir)?;
        Ok(())
    }

    /// Reject settings that would break artifact naming or the queue.
    pub fn validate(&self) -> Result<()> {
        if self.database.name.is_empty() {
            bail!("database.name must not be empty");
        }
        if self.database.name.contains(['/', '\\']) {
            bail!("database.name must not contain path separators");
        }
        if self.backup.temp_file_name.is_empty() || self.backup.temp_file_name.contains(['/', '\\']) {
            bail!("backup.temp_file_name must be a plain file name");
        }
        if self.backup.encrypted_suffix.is_empty() {
            bail!("backup.encrypted_suffix must not be empty");
        }
        if self.tools.dump.program.is_empty() || self.tools.restore.program.is_empty() {
            bail!("tools.dump.program and tools.restore.program must be set");
        }
        if self.queue.capacity == 0 {
            bail!("queue.capacity must be at least 1");
        }
        Ok(())
    }

    /// Store rooted at the configured backup directory.
    pub fn artifact_store(&self) -> ArtifactStore {
        ArtifactStore::new(&self.backup.dir, &self.backup.encrypted_suffix)
    }

    /// Path of the transient decrypted file used by imports.
    pub fn temp_decrypted_path(&self) -> PathBuf {
        self.backup.dir.join(&self.backup.temp_file_name)
    }
}

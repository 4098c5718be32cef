//! Configuration system for the pairchat server.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/pairchat/config.toml`)
//! 4. Compiled defaults

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use pairchat_proto::identity::Identity;
use pairchat_proto::message::MAX_BODY_SIZE;

/// Errors that can occur when loading server configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    server: ServerSection,
    storage: StorageSection,
    auth: AuthSection,
}

/// `[server]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerSection {
    bind_addr: Option<String>,
    max_body_size: Option<usize>,
}

/// `[storage]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct StorageSection {
    data_dir: Option<PathBuf>,
    fsync: Option<bool>,
}

/// `[auth]` section. `tokens` maps bearer token to identity.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct AuthSection {
    require_push_token: Option<bool>,
    tokens: HashMap<String, Identity>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the pairchat server.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "pairchat direct messaging server")]
pub struct ServeCliArgs {
    /// Address to bind the server to.
    #[arg(short, long, env = "PAIRCHAT_ADDR")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/pairchat/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory holding the journal. Without one the server keeps
    /// everything in memory.
    #[arg(short, long, env = "PAIRCHAT_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Maximum message body size in bytes.
    #[arg(long)]
    pub max_body_size: Option<usize>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "PAIRCHAT_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to (e.g., `0.0.0.0:3000`).
    pub bind_addr: String,
    /// Maximum accepted message body size in bytes.
    pub max_body_size: usize,
    /// Journal directory; `None` runs memory-only.
    pub data_dir: Option<PathBuf>,
    /// Whether each journal append is followed by `sync_data`.
    pub fsync: bool,
    /// Whether `identify` on the push channel must carry a valid token.
    pub require_push_token: bool,
    /// Bearer token to identity table.
    pub tokens: HashMap<String, Identity>,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            max_body_size: MAX_BODY_SIZE,
            data_dir: None,
            fsync: false,
            require_push_token: true,
            tokens: HashMap::new(),
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and missing file
    /// is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed,
    /// including a token mapped to a malformed identity.
    pub fn load(cli: &ServeCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, file))
    }

    /// Resolve a `ServerConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    fn resolve(cli: &ServeCliArgs, file: ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: cli
                .bind
                .clone()
                .or(file.server.bind_addr)
                .unwrap_or(defaults.bind_addr),
            max_body_size: cli
                .max_body_size
                .or(file.server.max_body_size)
                .unwrap_or(defaults.max_body_size),
            data_dir: cli.data_dir.clone().or(file.storage.data_dir),
            fsync: file.storage.fsync.unwrap_or(defaults.fsync),
            require_push_token: file
                .auth
                .require_push_token
                .unwrap_or(defaults.require_push_token),
            tokens: file.auth.tokens,
            log_level: cli.log_level.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
fn load_config_file(explicit_path: Option<&Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("pairchat").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}

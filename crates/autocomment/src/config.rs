use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;

use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub workspace: Option<PathBuf>,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    #[error("environment variable '{0}' is not set")]
    MissingEnvVar(String),

    #[error("unclosed variable reference '${{' (missing '}}')")]
    UnclosedVarReference,

    #[error("telegram.api_id and telegram.api_hash must be configured")]
    MissingApiCredentials,
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        let expanded = expand_env_vars(&contents)?;
        Ok(serde_saphyr::from_str(&expanded)?)
    }
}

/// Resolve a path relative to the config file directory.
///
/// If the path is absolute, it is returned as-is.
/// If the path is relative, it is joined with the config file's parent directory.
pub fn resolve_path(config_path: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }

    let config_dir = config_path.parent().unwrap_or_else(|| Path::new("."));
    config_dir.join(path)
}

// ============================================================================
// Default Paths
// ============================================================================

/// Default workspace directory (relative to config file).
pub const DEFAULT_WORKSPACE: &str = ".autocomment";
/// Registry document (relative to workspace).
pub const STATE_FILE: &str = "state.json";
/// Per-account session files (relative to workspace).
pub const SESSIONS_DIR: &str = "sessions";

/// Resolved on-disk locations for one workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspacePaths {
    pub root: PathBuf,
    pub state_file: PathBuf,
    pub sessions_dir: PathBuf,
    pub log_file: PathBuf,
}

impl WorkspacePaths {
    pub fn resolve(config_path: &Path, config: &Config) -> Self {
        let workspace = config
            .workspace
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKSPACE));
        let root = resolve_path(config_path, &workspace);
        let log_file = if config.logging.file.is_absolute() {
            config.logging.file.clone()
        } else {
            root.join(&config.logging.file)
        };
        Self {
            state_file: root.join(STATE_FILE),
            sessions_dir: root.join(SESSIONS_DIR),
            log_file,
            root,
        }
    }
}

// ============================================================================
// Private Helpers (Serde Defaults)
// ============================================================================

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout() -> u64 {
    120
}

fn default_gateway_command() -> String {
    "tg-gateway".to_string()
}

fn default_gateway_timeout() -> u64 {
    30
}

fn default_log_file() -> PathBuf {
    PathBuf::from("autocomment.log")
}

fn default_tail_lines() -> usize {
    100
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports the following syntax (shell-compatible):
/// - `${VAR}` - Required variable, errors if not set
/// - `${VAR:-default}` - Optional variable with default value
/// - `${VAR:-}` - Optional variable, empty string if not set
/// - `$$` - Escaped `$` (only needed before `{` to prevent expansion)
///
/// No nested expansion: `${VAR:-${DEFAULT}}` is not supported.
///
/// ```yaml
/// telegram:
///   api_id: ${TELEGRAM_API_ID}
///   api_hash: ${TELEGRAM_API_HASH}
/// server:
///   admin_token: ${AUTOCOMMENT_TOKEN:-}
/// ```
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }
        match chars.peek() {
            Some('$') => {
                chars.next();
                result.push('$');
            }
            Some('{') => {
                chars.next();
                let expanded = parse_var_reference(&mut chars)?;
                result.push_str(&expanded);
            }
            _ => result.push('$'),
        }
    }

    Ok(result)
}

/// Parse a variable reference after seeing `${`.
fn parse_var_reference(
    chars: &mut std::iter::Peekable<std::str::Chars>,
) -> Result<String, ConfigError> {
    let mut var_name = String::new();
    let mut default_value: Option<String> = None;
    let mut found_closing_brace = false;

    while let Some(c) = chars.next() {
        match (c, default_value.as_mut()) {
            ('}', _) => {
                found_closing_brace = true;
                break;
            }
            (':', None) if chars.peek() == Some(&'-') => {
                chars.next();
                default_value = Some(String::new());
            }
            (c, Some(default)) => default.push(c),
            (c, None) => var_name.push(c),
        }
    }

    if !found_closing_brace {
        return Err(ConfigError::UnclosedVarReference);
    }

    match std::env::var(&var_name) {
        Ok(value) => Ok(value),
        Err(_) => default_value.ok_or(ConfigError::MissingEnvVar(var_name)),
    }
}

// ============================================================================
// TelegramConfig
// ============================================================================

/// Application credentials for the messaging service.
#[derive(Debug, Default, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub api_id: Option<i64>,
    #[serde(default)]
    pub api_hash: Option<String>,
}

impl TelegramConfig {
    /// The API id/hash pair. Both must be present and non-empty.
    pub fn credentials(&self) -> Result<(i64, &str), ConfigError> {
        match (self.api_id, self.api_hash.as_deref()) {
            (Some(id), Some(hash)) if id != 0 && !hash.is_empty() => Ok((id, hash)),
            _ => Err(ConfigError::MissingApiCredentials),
        }
    }
}

// ============================================================================
// GatewayConfig
// ============================================================================

/// How to launch the per-account gateway process.
#[derive(Debug, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default = "default_gateway_timeout")]
    pub connect_timeout_seconds: u64,
    #[serde(default = "default_gateway_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            command: default_gateway_command(),
            args: Vec::new(),
            env: HashMap::new(),
            connect_timeout_seconds: default_gateway_timeout(),
            request_timeout_seconds: default_gateway_timeout(),
        }
    }
}

// ============================================================================
// ServerConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Optional API token. If set, `/api/v1` endpoints require it.
    /// If not set, they only accept requests from localhost.
    #[serde(default)]
    pub api_token: Option<String>,
    /// Optional admin API token. If set, admin endpoints require this token.
    /// If not set, admin endpoints only accept requests from localhost.
    #[serde(default)]
    pub admin_token: Option<String>,
}

impl ServerConfig {
    /// Configured API token; an empty value counts as unset.
    pub fn api_token(&self) -> Option<&str> {
        self.api_token.as_deref().filter(|t| !t.is_empty())
    }

    /// Configured admin token; an empty value counts as unset.
    pub fn admin_token(&self) -> Option<&str> {
        self.admin_token.as_deref().filter(|t| !t.is_empty())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
            api_token: None,
            admin_token: None,
        }
    }
}

// ============================================================================
// LoggingConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log file, relative to the workspace unless absolute.
    #[serde(default = "default_log_file")]
    pub file: PathBuf,
    /// Default number of lines returned by log tailing.
    #[serde(default = "default_tail_lines")]
    pub tail_lines: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
            tail_lines: default_tail_lines(),
        }
    }
}

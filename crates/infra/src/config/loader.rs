//! Configuration loader
//!
//! Loads [`ClientConfig`] from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If incomplete, falls back to loading from file
//! 3. Probes a few paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `TWINLINE_USERNAME`, `TWINLINE_ORGANIZATION`, `TWINLINE_PASSWORD`:
//!   login credentials (required)
//! - `TWINLINE_VMWARE_URL`, `TWINLINE_CERBERUS_URL`: partition base URLs
//!   (required)
//! - `TWINLINE_VMWARE_API_VERSION`, `TWINLINE_CERBERUS_API_VERSION`
//! - `TWINLINE_VMWARE_POLL_ERRORS`, `TWINLINE_CERBERUS_POLL_ERRORS`:
//!   `abort` or `continue`
//! - `TWINLINE_HTTP_TIMEOUT`: per-request timeout in seconds
//! - `TWINLINE_TOKEN_HEADER`: login response header carrying the token
//! - `TWINLINE_SESSION_CACHE_PATH`, `TWINLINE_SESSION_CACHE_PASSPHRASE`:
//!   enable the session cache when both are set
//!
//! ## File Locations
//! Without an explicit path the loader probes, in order, `./twinline.toml`,
//! `./twinline.json`, `./config/twinline.toml`, `./config/twinline.json`,
//! then the same names next to the executable.

use std::path::{Path, PathBuf};

use twinline_domain::constants::{DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_TOKEN_HEADER};
use twinline_domain::{
    ApiError, ClientConfig, CredentialsConfig, PartitionConfig, PollErrorPolicy, Result,
    SessionCacheConfig,
};

const CONFIG_NAMES: [&str; 4] =
    ["twinline.toml", "twinline.json", "config/twinline.toml", "config/twinline.json"];

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If any required
/// variables are missing, falls back to loading from a config file.
///
/// # Errors
/// Returns `ApiError::Configuration` if neither source yields a valid
/// configuration.
pub fn load() -> Result<ClientConfig> {
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = %e, "Failed to load from environment, trying file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// # Errors
/// Returns `ApiError::Configuration` if required variables are missing
/// or have invalid values.
pub fn load_from_env() -> Result<ClientConfig> {
    let credentials = CredentialsConfig {
        username: env_var("TWINLINE_USERNAME")?,
        organization: env_var("TWINLINE_ORGANIZATION")?,
        password: env_var("TWINLINE_PASSWORD")?,
    };

    let vmware = partition_from_env("VMWARE")?;
    let cerberus = partition_from_env("CERBERUS")?;

    let http_timeout_secs = match env_opt("TWINLINE_HTTP_TIMEOUT") {
        Some(raw) => raw
            .parse::<u64>()
            .map_err(|e| ApiError::Configuration(format!("Invalid HTTP timeout: {e}")))?,
        None => DEFAULT_HTTP_TIMEOUT_SECS,
    };

    let session_cache = match (
        env_opt("TWINLINE_SESSION_CACHE_PATH"),
        env_opt("TWINLINE_SESSION_CACHE_PASSPHRASE"),
    ) {
        (Some(path), Some(passphrase)) => {
            Some(SessionCacheConfig { path: PathBuf::from(path), passphrase })
        }
        (None, None) => None,
        _ => {
            return Err(ApiError::Configuration(
                "TWINLINE_SESSION_CACHE_PATH and TWINLINE_SESSION_CACHE_PASSPHRASE must be set together"
                    .to_string(),
            ))
        }
    };

    let config = ClientConfig {
        credentials,
        vmware,
        cerberus,
        http_timeout_secs,
        token_header: env_opt("TWINLINE_TOKEN_HEADER")
            .unwrap_or_else(|| DEFAULT_TOKEN_HEADER.to_string()),
        session_cache,
    };
    config.validate()?;
    Ok(config)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes the standard locations via
/// [`probe_config_paths`]. Format is chosen by extension.
///
/// # Errors
/// Returns `ApiError::Configuration` if the file is missing, unreadable,
/// malformed or fails validation.
pub fn load_from_file(path: Option<PathBuf>) -> Result<ClientConfig> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(ApiError::Configuration(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            ApiError::Configuration("No config file found in any of the standard locations".into())
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| ApiError::Configuration(format!("Failed to read config file: {e}")))?;

    let config = parse_config(&contents, &config_path)?;
    config.validate()?;
    Ok(config)
}

fn parse_config(contents: &str, path: &Path) -> Result<ClientConfig> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| ApiError::Configuration(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| ApiError::Configuration(format!("Invalid JSON format: {e}"))),
        _ => Err(ApiError::Configuration(format!("Unsupported config format: {extension}"))),
    }
}

/// First existing config file among the standard locations.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd);
    }
    if let Some(exe_dir) = std::env::current_exe().ok().and_then(|exe| exe.parent().map(Path::to_path_buf)) {
        roots.push(exe_dir);
    }

    roots
        .iter()
        .flat_map(|root| CONFIG_NAMES.iter().map(move |name| root.join(name)))
        .find(|path| path.exists())
}

fn partition_from_env(prefix: &str) -> Result<PartitionConfig> {
    let mut partition = PartitionConfig::new(env_var(&format!("TWINLINE_{prefix}_URL"))?);
    partition.api_version = env_opt(&format!("TWINLINE_{prefix}_API_VERSION"));

    let policy_var = format!("TWINLINE_{prefix}_POLL_ERRORS");
    if let Some(raw) = env_opt(&policy_var) {
        partition.poll_error_policy = match raw.to_ascii_lowercase().as_str() {
            "abort" => PollErrorPolicy::Abort,
            "continue" => PollErrorPolicy::Continue,
            other => {
                return Err(ApiError::Configuration(format!(
                    "Invalid {policy_var}: '{other}' (expected abort or continue)"
                )))
            }
        };
    }
    Ok(partition)
}

/// Get required environment variable
fn env_var(key: &str) -> Result<String> {
    env_opt(key).ok_or_else(|| {
        ApiError::Configuration(format!("Missing required environment variable: {key}"))
    })
}

/// Optional environment variable; blank counts as unset.
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

//! Configuration loading for the CLI.
//!
//! Settings come from a TOML file (`--config`, or `<config dir>/warden/config.toml`
//! when present) and are overridden field by field by command-line flags and
//! `WARDEN_*` environment variables.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

use warden::{ManagerConfig, StoreBackendKind, StoreConfig};

/// Per-field overrides from flags or environment.
#[derive(clap::Args, Debug, Default, Clone)]
pub struct Overrides {
    /// Base URL of the API; tokens come from `<base-url>/token`
    #[arg(long, env = "WARDEN_BASE_URL")]
    pub base_url: Option<String>,

    /// PEM-encoded client certificate
    #[arg(long, env = "WARDEN_CERTIFICATE_PATH")]
    pub certificate_path: Option<PathBuf>,

    /// PEM-encoded private key
    #[arg(long, env = "WARDEN_PRIVATE_KEY_PATH")]
    pub private_key_path: Option<PathBuf>,

    /// OAuth2 client identifier
    #[arg(long, env = "WARDEN_CLIENT_ID")]
    pub client_id: Option<String>,

    /// Cache slot name
    #[arg(long, env = "WARDEN_CACHE_KEY")]
    pub cache_key: Option<String>,

    /// Token exchange timeout in seconds
    #[arg(long, env = "WARDEN_TIMEOUT_SECONDS")]
    pub timeout_seconds: Option<u64>,

    /// Token store backend: `file` or `memory`
    #[arg(long, env = "WARDEN_STORE_BACKEND", value_parser = parse_backend)]
    pub store_backend: Option<StoreBackendKind>,

    /// Directory for the file token store
    #[arg(long, env = "WARDEN_STORE_DIR")]
    pub store_dir: Option<PathBuf>,
}

fn parse_backend(value: &str) -> std::result::Result<StoreBackendKind, String> {
    match value.to_lowercase().as_str() {
        "file" => Ok(StoreBackendKind::File),
        "memory" => Ok(StoreBackendKind::Memory),
        other => Err(format!("unknown store backend '{other}' (expected file or memory)")),
    }
}

/// The config file with every field optional, so flags can fill the gaps.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    base_url: Option<String>,
    certificate_path: Option<PathBuf>,
    private_key_path: Option<PathBuf>,
    client_id: Option<String>,
    cache_key: Option<String>,
    timeout_seconds: Option<u64>,
    store: Option<StoreConfig>,
}

/// Returns the default configuration file path.
///
/// # Errors
///
/// Returns an error if the config directory cannot be determined.
pub fn config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Failed to determine config directory")?
        .join("warden");

    Ok(config_dir.join("config.toml"))
}

/// Loads the manager configuration.
///
/// An explicit `path` must exist. Without one, the default path is read if
/// present and otherwise skipped.
///
/// # Errors
///
/// Returns an error if a file cannot be read or parsed, a required field is
/// missing everywhere, or the merged configuration is invalid.
pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<ManagerConfig> {
    let file = match path {
        Some(path) => read_file(path)?,
        None => {
            let path = config_path()?;
            if path.exists() {
                read_file(&path)?
            } else {
                debug!(path = %path.display(), "No config file, using flags and environment");
                FileConfig::default()
            }
        }
    };

    resolve(file, overrides)
}

fn read_file(path: &Path) -> Result<FileConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    toml::from_str(&contents).with_context(|| format!("Invalid config file {}", path.display()))
}

fn resolve(file: FileConfig, overrides: &Overrides) -> Result<ManagerConfig> {
    let base_url = required(overrides.base_url.clone(), file.base_url, "base_url")?;
    let certificate_path = required(
        overrides.certificate_path.clone(),
        file.certificate_path,
        "certificate_path",
    )?;
    let private_key_path = required(
        overrides.private_key_path.clone(),
        file.private_key_path,
        "private_key_path",
    )?;
    let client_id = required(overrides.client_id.clone(), file.client_id, "client_id")?;

    let mut store = file.store.unwrap_or_default();
    if let Some(backend) = overrides.store_backend {
        store.backend = backend;
    }
    if let Some(directory) = &overrides.store_dir {
        store.directory = Some(directory.clone());
    }

    let mut config =
        ManagerConfig::new(base_url, certificate_path, private_key_path, client_id).with_store(store);
    config.cache_key = overrides.cache_key.clone().or(file.cache_key);
    config.timeout_seconds = overrides.timeout_seconds.or(file.timeout_seconds);

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn required<T>(flag: Option<T>, file: Option<T>, field: &str) -> Result<T> {
    flag.or(file).with_context(|| {
        format!(
            "{field} is not set (config file, --{}, or WARDEN_{})",
            field.replace('_', "-"),
            field.to_uppercase()
        )
    })
}

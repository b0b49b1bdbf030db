//! Configuration types for magpie components.
//!
//! All tunables live in one explicit structure constructed at process start
//! and passed to the components that need it. Nothing here is global or
//! lazily initialized.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::AppError;
use crate::ingest::IngestConfig;

/// Gateway (resolve service) credentials.
///
/// The gateway requires an authenticated client; the archive does not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// OAuth client identifier.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// User agent sent with every request. Upstream throttles generic ones.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_user_agent() -> String {
    concat!("magpie/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Ingestion tunables as they appear in the config file.
///
/// Durations are plain seconds in TOML; [`IngestSettings::to_ingest_config`]
/// converts to the runtime form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestSettings {
    /// Retries per upstream call after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Seconds between retry attempts.
    #[serde(default = "default_wait_secs")]
    pub wait_secs: u64,
    /// Seconds the cursor jumps forward on an empty page.
    #[serde(default = "default_skip_time_secs")]
    pub skip_time_secs: i64,
}

fn default_max_retries() -> u32 {
    5
}

fn default_wait_secs() -> u64 {
    5
}

fn default_skip_time_secs() -> i64 {
    3600
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            wait_secs: default_wait_secs(),
            skip_time_secs: default_skip_time_secs(),
        }
    }
}

impl IngestSettings {
    /// Converts file settings into the pipeline's runtime configuration.
    pub fn to_ingest_config(&self) -> IngestConfig {
        IngestConfig {
            max_retries: self.max_retries,
            wait: Duration::from_secs(self.wait_secs),
            skip_time: self.skip_time_secs,
            ..IngestConfig::default()
        }
    }
}

/// Root configuration structure for magpie.toml.
///
/// # Example
///
/// ```toml
/// database_path = "magpie.db"
///
/// [gateway]
/// client_id = "..."
/// client_secret = "..."
///
/// [ingest]
/// max_retries = 5
/// wait_secs = 5
/// skip_time_secs = 3600
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MagpieConfig {
    /// SQLite database file path. Defaults to `magpie.db` in the working
    /// directory.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Gateway credentials. Absent means resolve calls cannot authenticate;
    /// commands that need them fail at startup, not mid-run.
    pub gateway: Option<GatewayConfig>,

    /// Ingestion tunables.
    #[serde(default)]
    pub ingest: IngestSettings,
}

fn default_database_path() -> String {
    "magpie.db".to_string()
}

impl Default for MagpieConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            gateway: None,
            ingest: IngestSettings::default(),
        }
    }
}

impl MagpieConfig {
    /// Returns the gateway credentials or a fatal configuration error.
    pub fn require_gateway(&self) -> Result<&GatewayConfig, AppError> {
        self.gateway.as_ref().ok_or_else(|| {
            AppError::ConfigError(
                "Missing [gateway] section: client_id and client_secret are required".to_string(),
            )
        })
    }
}

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "magpie.toml";

/// Returns the default configuration directory path.
///
/// Uses XDG Base Directory specification: `~/.config/magpie/`
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("magpie"))
}

/// Returns the default configuration file path.
///
/// Path: `~/.config/magpie/magpie.toml`
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join(CONFIG_FILE_NAME))
}

/// Default template content for a new magpie.toml file.
const DEFAULT_CONFIG_TEMPLATE: &str = r#"# magpie configuration
#
# Usage:
#   magpie ingest <collection> --from <date> --to <date>
#   magpie stats <collection>
#
# The [gateway] section is required for ingestion; stats only needs the
# database. Credentials can also come from the MAGPIE_CLIENT_ID and
# MAGPIE_CLIENT_SECRET environment variables.

database_path = "magpie.db"

# [gateway]
# client_id = "your-client-id"
# client_secret = "your-client-secret"

[ingest]
max_retries = 5
wait_secs = 5
skip_time_secs = 3600
"#;

/// Load configuration from a TOML file.
///
/// # Arguments
/// * `path` - Optional custom path. If `None`, uses default XDG path.
///
/// # Returns
/// * `Ok(Some(config))` - Configuration loaded successfully
/// * `Ok(None)` - No configuration file found and none could be created
/// * `Err(e)` - Configuration file exists but is invalid
///
/// # Behavior
/// If no configuration file exists at the default path, a template file
/// is automatically created to help users get started.
pub fn load_config(path: Option<PathBuf>) -> Result<Option<MagpieConfig>, AppError> {
    let using_default_path = path.is_none();
    let config_path = match path {
        Some(p) => p,
        None => match default_config_path() {
            Some(p) => p,
            None => return Ok(None),
        },
    };

    if !config_path.exists() {
        if using_default_path {
            match create_default_config(&config_path) {
                Ok(()) => {
                    tracing::info!(
                        "Config file created at {}, edit it to add gateway credentials",
                        config_path.display()
                    );
                }
                Err(e) => {
                    tracing::warn!("Could not create default config template: {}", e);
                    return Ok(None);
                }
            }
        } else {
            return Err(AppError::ConfigError(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }
    }

    let content = std::fs::read_to_string(&config_path).map_err(|e| {
        AppError::ConfigError(format!(
            "Failed to read config file '{}': {}",
            config_path.display(),
            e
        ))
    })?;

    let config: MagpieConfig = toml::from_str(&content).map_err(|e| {
        AppError::ConfigError(format!("Invalid TOML in '{}': {}", config_path.display(), e))
    })?;

    Ok(Some(config))
}

/// Create a default configuration file with a template.
///
/// Creates the parent directory if it doesn't exist.
fn create_default_config(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, DEFAULT_CONFIG_TEMPLATE)?;
    tracing::info!("Created default config template at: {}", path.display());

    Ok(())
}

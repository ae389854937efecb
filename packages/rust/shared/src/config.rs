//! Application configuration for LotScout.
//!
//! User config lives at `~/.lotscout/lotscout.toml`. The file is loaded once
//! at process start and immutable thereafter; the CLI can point elsewhere via
//! `--config`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LotScoutError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "lotscout.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".lotscout";

// ---------------------------------------------------------------------------
// Config structs (matching lotscout.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Listings site settings.
    #[serde(default)]
    pub site: SiteConfig,

    /// Extraction pool settings.
    #[serde(default)]
    pub extract: ExtractConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Re-enrichment flow settings.
    #[serde(default)]
    pub refresh: RefreshConfig,

    /// Telegram delivery settings.
    #[serde(default)]
    pub telegram: TelegramConfig,
}

/// `[site]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Auctions calendar page URL.
    #[serde(default = "default_calendar_url")]
    pub calendar_url: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            calendar_url: default_calendar_url(),
        }
    }
}

fn default_calendar_url() -> String {
    "https://www.iaai.com/LiveAuctionsCalendar".into()
}

/// `[extract]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Lots below this model year are never created.
    #[serde(default = "default_min_model_year")]
    pub min_model_year: u16,

    /// Worker count is `available parallelism * worker_multiplier`.
    #[serde(default = "default_worker_multiplier")]
    pub worker_multiplier: usize,

    /// Bound on page readiness waits, in seconds.
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            min_model_year: default_min_model_year(),
            worker_multiplier: default_worker_multiplier(),
            wait_timeout_secs: default_wait_timeout_secs(),
        }
    }
}

fn default_min_model_year() -> u16 {
    2010
}
fn default_worker_multiplier() -> usize {
    3
}
fn default_wait_timeout_secs() -> u64 {
    30
}

/// `[database]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the libSQL database file. A leading `~` expands to the
    /// user's home directory.
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.lotscout/lotscout.db".into()
}

impl DatabaseConfig {
    /// Resolve the configured path, expanding a leading `~`.
    pub fn resolved_path(&self) -> Result<PathBuf> {
        if let Some(rest) = self.path.strip_prefix("~/") {
            let home = dirs::home_dir()
                .ok_or_else(|| LotScoutError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        } else {
            Ok(PathBuf::from(&self.path))
        }
    }
}

/// Where the re-enrichment flow dispatches its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dispatch {
    /// Replace the stored lot set with the enriched set.
    Store,
    /// Send a buy-now digest to Telegram instead of persisting.
    Telegram,
}

/// `[refresh]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshConfig {
    /// Dispatch target for the enriched set.
    #[serde(default = "default_dispatch")]
    pub dispatch: Dispatch,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            dispatch: default_dispatch(),
        }
    }
}

fn default_dispatch() -> Dispatch {
    Dispatch::Store
}

/// `[telegram]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Name of the env var holding the bot token (never store the token itself).
    #[serde(default = "default_bot_token_env")]
    pub bot_token_env: String,

    /// Chat to deliver digests to.
    #[serde(default)]
    pub chat_id: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token_env: default_bot_token_env(),
            chat_id: String::new(),
        }
    }
}

fn default_bot_token_env() -> String {
    "LOTSCOUT_TELEGRAM_TOKEN".into()
}

// ---------------------------------------------------------------------------
// Worker sizing
// ---------------------------------------------------------------------------

/// Pool size: available CPU parallelism times the configured multiplier,
/// never below one.
pub fn worker_count(multiplier: usize) -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cpus * multiplier).max(1)
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.lotscout/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| LotScoutError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.lotscout/lotscout.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| LotScoutError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| LotScoutError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| LotScoutError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| LotScoutError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| LotScoutError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

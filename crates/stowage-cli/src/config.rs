use std::path::PathBuf;

use config::{Config, ConfigError, File};
use serde::{Deserialize, Serialize};
use stowage::{Amount, SessionConfig};
use stowage_fake::{FakeLedgerConfig, FakeStorageConfig};

/// Account used when none is configured
const DEFAULT_ACCOUNT: &str = "0x0000000000000000000000000000000000000001";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Account address, validated when the session is opened
    pub account: String,
    /// Funds credited to the account by the fake ledger at startup
    pub initial_balance: Amount,
    /// Timeouts, top-up policy and pricing of the session
    pub session: SessionConfig,
    /// Delays and confirmation mode of the fake ledger
    pub fake_ledger: FakeLedgerConfig,
    /// Providers and delays of the fake storage service
    pub fake_storage: FakeStorageConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            account: DEFAULT_ACCOUNT.to_string(),
            initial_balance: Amount::ZERO,
            session: SessionConfig::default(),
            fake_ledger: FakeLedgerConfig {
                min_delay_ms: 200,
                max_delay_ms: 1500,
                ..Default::default()
            },
            fake_storage: FakeStorageConfig {
                min_delay_ms: 100,
                max_delay_ms: 800,
                ..Default::default()
            },
        }
    }
}

impl Settings {
    #[must_use]
    pub fn new<P>(config_file_name: Option<P>) -> Self
    where
        P: Into<PathBuf>,
    {
        let default_settings = Self::default();
        // attempt to construct settings with file
        let from_file = Self::new_from_default(&default_settings, config_file_name);
        match from_file {
            Ok(f) => f,
            Err(e) => {
                tracing::error!("Error reading config file, falling back to defaults. Error: {e}");
                default_settings
            }
        }
    }

    fn new_from_default<P>(
        default: &Settings,
        config_file_name: Option<P>,
    ) -> Result<Self, ConfigError>
    where
        P: Into<PathBuf>,
    {
        let default_config_file_name = home::home_dir()
            .ok_or(ConfigError::NotFound("Config Path".to_string()))?
            .join(crate::DEFAULT_WORK_DIR)
            .join("config.toml");

        let config: String = match config_file_name {
            Some(value) => value.into().to_string_lossy().to_string(),
            None => default_config_file_name.to_string_lossy().to_string(),
        };
        let builder = Config::builder();
        let config: Config = builder
            // use defaults
            .add_source(Config::try_from(default)?)
            // override with file contents
            .add_source(File::with_name(&config))
            .build()?;

        config.try_deserialize()
    }
}

use std::path::Path;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Configuration for the Palaver HTTP service.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PalaverServiceConfig {
    /// Bind address for the service.
    ///
    /// This field specifies the address and port on which the service will bind,
    /// e.g. `0.0.0.0:8080`.
    pub service_bind_address: String,

    /// Directory the rolling log files are written to.
    #[serde(default = "default_log_directory")]
    pub log_directory: String,

    /// Base name of the log file, rotated daily.
    #[serde(default = "default_log_file_name")]
    pub log_file_name: String,

    /// Whether the user's previous exchanges are prepended to the prompt.
    ///
    /// Disabled by default, in which case every reply only depends on the
    /// latest message.
    #[serde(default)]
    pub use_chat_history: bool,
}

fn default_log_directory() -> String {
    "./logs".to_string()
}

fn default_log_file_name() -> String {
    "palaver.log".to_string()
}

impl PalaverServiceConfig {
    /// Creates a new `PalaverServiceConfig` instance from a configuration file.
    ///
    /// # Arguments
    ///
    /// * `config_file_path` - Path to the configuration file. The file should be in a format
    ///   supported by the `config` crate (e.g., TOML, JSON, YAML) and contain a
    ///   `palaver_service` section. Values can be overridden with `PALAVER_SERVICE__*`
    ///   environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// * The configuration file cannot be read or parsed
    /// * The `palaver_service` section is missing from the configuration
    /// * The configuration format doesn't match the expected structure
    pub fn from_file_path<P: AsRef<Path>>(config_file_path: P) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::from(config_file_path.as_ref()))
            .add_source(
                Environment::with_prefix("PALAVER_SERVICE")
                    .keep_prefix(true)
                    .separator("__"),
            );
        let config = builder.build()?;
        config.get::<Self>("palaver_service")
    }
}

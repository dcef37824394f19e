use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default size of the SQLite connection pool.
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Configuration for the SQLite database connection.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct PalaverStateConfig {
    /// The URL of the SQLite database (e.g. `sqlite://palaver.db`).
    pub database_url: String,

    /// Maximum number of pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

const fn default_max_connections() -> u32 {
    DEFAULT_MAX_CONNECTIONS
}

impl PalaverStateConfig {
    /// Creates a new `PalaverStateConfig` instance from a configuration file.
    ///
    /// Values are read from the `palaver_state` section of the file and may be
    /// overridden by `PALAVER_STATE__*` environment variables
    /// (e.g. `PALAVER_STATE__DATABASE_URL`).
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - The configuration file cannot be read or parsed.
    /// - The `palaver_state` section is missing.
    /// - Required fields are missing or have invalid types.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// use palaver_state::config::PalaverStateConfig;
    ///
    /// let config = PalaverStateConfig::from_file_path("config.toml")?;
    /// ```
    pub fn from_file_path<P: AsRef<Path>>(config_file_path: P) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::from(config_file_path.as_ref()))
            .add_source(
                Environment::with_prefix("PALAVER_STATE")
                    .keep_prefix(true)
                    .separator("__"),
            );
        let config = builder.build()?;
        config.get::<Self>("palaver_state")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_file_path_reads_section() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[palaver_state]\ndatabase_url = \"sqlite://palaver.db\"\n"
        )
        .unwrap();

        let config = PalaverStateConfig::from_file_path(file.path()).unwrap();
        assert_eq!(config.database_url, "sqlite://palaver.db");
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
    }

    #[test]
    fn test_from_file_path_missing_section() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[palaver_service]\nservice_bind_address = \"0.0.0.0:8080\"\n").unwrap();

        assert!(PalaverStateConfig::from_file_path(file.path()).is_err());
    }
}

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::pipelines::ReportParams;
use crate::security::credentials::Credentials;

/// Environment variable naming the config file when `--config` is absent
pub const CONFIG_ENV: &str = "FLIGHT_ANALYTICS_CONFIG";
pub const CONFIG_FILE_NAME: &str = "config.toml";
const CONFIG_DIR_NAME: &str = "flight-analytics";

/// Process configuration, loaded once in `main` and passed down by reference.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo: MongoConfig,
    #[serde(default)]
    pub reports: ReportParams,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Clone, Deserialize)]
pub struct MongoConfig {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_admin_db")]
    pub admin_db: String,
    pub database: String,
    pub collection: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_admin_db() -> String {
    "admin".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl MongoConfig {
    pub fn credentials(&self) -> Result<Option<Credentials>> {
        Credentials::from_parts(self.username.as_deref(), self.password.as_deref())
    }

    pub fn has_credentials(&self) -> bool {
        matches!(self.credentials(), Ok(Some(_)))
    }
}

impl fmt::Debug for MongoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("admin_db", &self.admin_db)
            .field("database", &self.database)
            .field("collection", &self.collection)
            .finish()
    }
}

impl Config {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Locate and load the config file. See [`candidate_paths`] for the
    /// search order; a missing file is fatal.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let candidates = candidate_paths(explicit, env_path.as_deref());

        match candidates.iter().find(|p| p.is_file()) {
            Some(path) => Self::from_file(path),
            None => Err(Error::Config(format!(
                "no configuration file found (searched: {})",
                candidates
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.mongo.credentials()?;

        if self.mongo.database.is_empty() || self.mongo.collection.is_empty() {
            return Err(Error::Config(
                "mongo.database and mongo.collection must not be empty".to_string(),
            ));
        }
        if !(1..=12).contains(&self.reports.month) {
            return Err(Error::Config(format!(
                "reports.month must be between 1 and 12, got {}",
                self.reports.month
            )));
        }
        Ok(())
    }
}

/// Search order: explicit path, then the env var path, then
/// `./config.toml`, then the per-user config directory. An explicit or env
/// path is used alone.
pub fn candidate_paths(explicit: Option<&Path>, env_path: Option<&Path>) -> Vec<PathBuf> {
    if let Some(path) = explicit.or(env_path) {
        return vec![path.to_path_buf()];
    }

    let mut paths = vec![PathBuf::from(CONFIG_FILE_NAME)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME));
    }
    paths
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [mongo]
        host = "localhost"
        port = 27017
        database = "airline"
        collection = "flights"
    "#;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = Config::from_toml_str(MINIMAL).unwrap();
        assert_eq!(config.mongo.admin_db, "admin");
        assert_eq!(config.reports.year, 2020);
        assert_eq!(config.reports.destinations, vec!["SFO", "OAK", "SJC"]);
        assert_eq!(config.reports.state, "CA");
        assert_eq!(config.reports.month, 11);
        assert_eq!(config.logging.level, "info");
        assert!(!config.mongo.has_credentials());
    }

    #[test]
    fn partial_credentials_are_rejected() {
        let content = format!("{}\nusername = \"reader\"\n", MINIMAL);
        let err = Config::from_toml_str(&content).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn out_of_range_month_is_rejected() {
        let content = format!("{}\n[reports]\nmonth = 13\n", MINIMAL);
        let err = Config::from_toml_str(&content).unwrap_err();
        assert!(err.to_string().contains("reports.month"));
    }

    #[test]
    fn host_is_not_validated_at_load_time() {
        let content = MINIMAL.replace("\"localhost\"", "\"\"");
        let config = Config::from_toml_str(&content).unwrap();
        assert!(config.mongo.host.is_empty());
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let err = Config::from_toml_str("[mongo\nhost = ").unwrap_err();
        assert!(err.to_string().starts_with("configuration error"));
    }

    #[test]
    fn debug_output_hides_password() {
        let content = format!(
            "{}\nusername = \"reader\"\npassword = \"s3cret\"\n",
            MINIMAL
        );
        let config = Config::from_toml_str(&content).unwrap();
        assert!(!format!("{:?}", config).contains("s3cret"));
    }

    #[test]
    fn explicit_path_wins_over_env() {
        let paths = candidate_paths(Some(Path::new("a.toml")), Some(Path::new("b.toml")));
        assert_eq!(paths, vec![PathBuf::from("a.toml")]);

        let paths = candidate_paths(None, Some(Path::new("b.toml")));
        assert_eq!(paths, vec![PathBuf::from("b.toml")]);
    }

    #[test]
    fn default_search_starts_in_working_directory() {
        let paths = candidate_paths(None, None);
        assert_eq!(paths[0], PathBuf::from(CONFIG_FILE_NAME));
    }
}

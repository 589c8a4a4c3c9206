use crate::kv::validate_key;
use crate::store::{DEFAULT_KEY, DEFAULT_MAX_PAYLOAD_BYTES};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub registration: RegistrationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default = "default_key")]
    pub key: String,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("~/.local/share/facereg")
}

fn default_key() -> String {
    DEFAULT_KEY.to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            key: default_key(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationConfig {
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
}

fn default_max_payload_bytes() -> usize {
    DEFAULT_MAX_PAYLOAD_BYTES
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain:
    /// 1. /etc/facereg/facereg.toml (system-wide)
    /// 2. ~/.config/facereg/facereg.toml (user)
    /// 3. Compiled defaults
    ///
    /// Only a missing file moves on to the next location; a file that
    /// exists but fails to read, parse or validate is an error.
    pub fn load() -> Result<Self, ConfigError> {
        let mut candidates = vec![PathBuf::from("/etc/facereg/facereg.toml")];
        if let Some(home) = std::env::var_os("HOME") {
            candidates.push(
                PathBuf::from(home)
                    .join(".config")
                    .join("facereg")
                    .join("facereg.toml"),
            );
        }

        let config = Self::load_first(&candidates)?.unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    /// Load the first existing file among `candidates`
    fn load_first(candidates: &[PathBuf]) -> Result<Option<Self>, ConfigError> {
        for path in candidates {
            match Self::load_from_path(path) {
                Ok(config) => {
                    log::debug!("Loaded config from {}", path.display());
                    return Ok(Some(config));
                }
                Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Load configuration from a specific file path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.database_path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "Storage database path cannot be empty".to_string(),
            ));
        }

        validate_key(&self.storage.key).map_err(|e| ConfigError::Validation(e.to_string()))?;

        if self.registration.max_payload_bytes == 0 {
            return Err(ConfigError::Validation(
                "Max payload size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Storage directory with a leading `~` expanded to $HOME
    pub fn database_dir(&self) -> PathBuf {
        expand_home(&self.storage.database_path)
    }
}

fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.storage.key, "@face_description");
        assert_eq!(config.registration.max_payload_bytes, 16 * 1024 * 1024);
    }

    #[test]
    fn test_load_from_path_with_defaults() {
        let path = env::temp_dir().join(format!("facereg-config-{}.toml", std::process::id()));
        fs::write(&path, "[storage]\ndatabase_path = \"/tmp/facereg-db\"\n").unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.storage.database_path, PathBuf::from("/tmp/facereg-db"));
        assert_eq!(config.storage.key, DEFAULT_KEY);
        assert_eq!(config.registration.max_payload_bytes, DEFAULT_MAX_PAYLOAD_BYTES);
        config.validate().unwrap();

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_registration_only_file() {
        let path = env::temp_dir().join(format!("facereg-config-reg-{}.toml", std::process::id()));
        fs::write(&path, "[registration]\nmax_payload_bytes = 4\n").unwrap();

        let config = Config::load_first(&[path.clone()]).unwrap().unwrap();
        assert_eq!(config.registration.max_payload_bytes, 4);
        assert_eq!(config.storage.key, DEFAULT_KEY);
        assert_eq!(config.storage.database_path, default_database_path());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_load_first_skips_missing_files() {
        let missing = env::temp_dir().join(format!("facereg-config-none-{}.toml", std::process::id()));
        let present = env::temp_dir().join(format!("facereg-config-present-{}.toml", std::process::id()));
        fs::write(&present, "[storage]\nkey = \"other\"\n").unwrap();

        assert!(Config::load_first(&[missing.clone()]).unwrap().is_none());
        let config = Config::load_first(&[missing, present.clone()]).unwrap().unwrap();
        assert_eq!(config.storage.key, "other");

        let _ = fs::remove_file(&present);
    }

    #[test]
    fn test_load_first_propagates_parse_errors() {
        let broken = env::temp_dir().join(format!("facereg-config-broken-{}.toml", std::process::id()));
        let fallback = env::temp_dir().join(format!("facereg-config-fallback-{}.toml", std::process::id()));
        fs::write(&broken, "[registration\nmax_payload_bytes = 4\n").unwrap();
        fs::write(&fallback, "[registration]\nmax_payload_bytes = 8\n").unwrap();

        let result = Config::load_first(&[broken.clone(), fallback.clone()]);
        assert!(matches!(result, Err(ConfigError::Parse(_))));

        let _ = fs::remove_file(&broken);
        let _ = fs::remove_file(&fallback);
    }

    #[test]
    fn test_parse_error() {
        let result: Result<Config, _> = toml::from_str("[storage]\ndatabase_path = 5\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_failures() {
        let mut config = Config::default();
        config.storage.key = "../etc".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let mut config = Config::default();
        config.storage.database_path = PathBuf::new();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let mut config = Config::default();
        config.registration.max_payload_bytes = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_expand_home() {
        let absolute = PathBuf::from("/var/lib/facereg");
        assert_eq!(expand_home(&absolute), absolute);

        if let Some(home) = env::var_os("HOME") {
            assert_eq!(
                expand_home(Path::new("~/.local/share/facereg")),
                PathBuf::from(home).join(".local/share/facereg")
            );
        }
    }
}

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Strategy for picking which eligible units a buy-X-get-Y action gives away.
/// `CheapestFirst` is the conservative default: the promotion grants the
/// minimum-value discount, which is documented storefront behavior.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FreeUnitSelection {
    CheapestFirst,
    MostExpensiveFirst,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub free_unit_selection: FreeUnitSelection,
    pub max_coupons_per_basket: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { free_unit_selection: FreeUnitSelection::CheapestFirst, max_coupons_per_basket: 1 }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
}

const DEFAULT_CONFIG_PATH: &str = "tally.toml";
const ENV_FREE_UNIT_SELECTION: &str = "TALLY_FREE_UNIT_SELECTION";
const ENV_MAX_COUPONS: &str = "TALLY_MAX_COUPONS";

impl EngineConfig {
    /// Layering: built-in defaults, then the TOML file (if present), then
    /// environment variables.
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let path =
            options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        let mut config = match read_config_file(&path)? {
            Some(config) => config,
            None if options.require_file => {
                return Err(ConfigError::MissingConfigFile(path));
            }
            None => EngineConfig::default(),
        };
        apply_env_overrides(&mut config)?;
        Ok(config)
    }
}

fn read_config_file(path: &Path) -> Result<Option<EngineConfig>, ConfigError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(source) if source.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(ConfigError::ReadFile { path: path.to_path_buf(), source });
        }
    };
    let config = toml::from_str(&contents)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })?;
    Ok(Some(config))
}

fn apply_env_overrides(config: &mut EngineConfig) -> Result<(), ConfigError> {
    if let Ok(value) = env::var(ENV_FREE_UNIT_SELECTION) {
        config.free_unit_selection = match value.as_str() {
            "cheapest_first" => FreeUnitSelection::CheapestFirst,
            "most_expensive_first" => FreeUnitSelection::MostExpensiveFirst,
            _ => {
                return Err(ConfigError::InvalidEnvOverride {
                    key: ENV_FREE_UNIT_SELECTION.to_string(),
                    value,
                });
            }
        };
    }
    if let Ok(value) = env::var(ENV_MAX_COUPONS) {
        config.max_coupons_per_basket = value.parse().map_err(|_| {
            ConfigError::InvalidEnvOverride { key: ENV_MAX_COUPONS.to_string(), value }
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::{ConfigError, EngineConfig, FreeUnitSelection, LoadOptions};

    #[test]
    fn defaults_allow_one_coupon_and_cheapest_first_selection() {
        let config = EngineConfig::default();
        assert_eq!(config.max_coupons_per_basket, 1);
        assert_eq!(config.free_unit_selection, FreeUnitSelection::CheapestFirst);
    }

    #[test]
    fn loads_settings_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "free_unit_selection = \"most_expensive_first\"").expect("write");
        writeln!(file, "max_coupons_per_basket = 2").expect("write");

        let config = EngineConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
        })
        .expect("config should load");

        assert_eq!(config.free_unit_selection, FreeUnitSelection::MostExpensiveFirst);
        assert_eq!(config.max_coupons_per_basket, 2);
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let result = EngineConfig::load(LoadOptions {
            config_path: Some("/nonexistent/tally.toml".into()),
            require_file: true,
        });
        assert!(matches!(result, Err(ConfigError::MissingConfigFile(_))));
    }

    #[test]
    fn partial_file_keeps_defaults_for_omitted_keys() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "max_coupons_per_basket = 3").expect("write");

        let config = EngineConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
        })
        .expect("config should load");

        assert_eq!(config.max_coupons_per_basket, 3);
        assert_eq!(config.free_unit_selection, FreeUnitSelection::CheapestFirst);
    }
}

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{HashwatchError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FarmConfig {
    /// Base URL of the farm monitoring API, e.g. `http://127.0.0.1:8080`.
    pub base_url: String,
    /// When set, the dashboard runs in single-miner mode for this address.
    pub ip: Option<String>,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    pub interval_secs: u64,
    pub bin_minutes: u32,
    /// Upper bound passed as `limit=` on metrics fetches.
    pub sample_limit: u32,
    pub price_feed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsConfig {
    pub log_level: String,
    pub state_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HashwatchConfig {
    pub farm: FarmConfig,
    pub poller: PollerConfig,
    pub ops: OpsConfig,
}

impl HashwatchConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            HashwatchError::Configuration(format!(
                "unable to read config file {}: {err}",
                path_ref.display()
            ))
        })?;
        toml::from_str(&contents).map_err(|err| {
            HashwatchError::Configuration(format!(
                "failed to parse config file {}: {err}",
                path_ref.display()
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.farm.base_url.trim().is_empty() {
            return Err(HashwatchError::Configuration(
                "farm.base_url must not be empty".into(),
            ));
        }
        if self.farm.request_timeout_secs == 0 {
            return Err(HashwatchError::Configuration(
                "farm.request_timeout_secs must be greater than zero".into(),
            ));
        }
        if !(5..=300).contains(&self.poller.interval_secs) {
            return Err(HashwatchError::Configuration(
                "poller.interval_secs must be between 5 and 300".into(),
            ));
        }
        if self.poller.bin_minutes == 0 {
            return Err(HashwatchError::Configuration(
                "poller.bin_minutes must be greater than zero".into(),
            ));
        }
        if self.poller.sample_limit == 0 {
            return Err(HashwatchError::Configuration(
                "poller.sample_limit must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for HashwatchConfig {
    fn default() -> Self {
        Self {
            farm: FarmConfig {
                base_url: "http://127.0.0.1:8080".into(),
                ip: None,
                request_timeout_secs: 10,
            },
            poller: PollerConfig {
                interval_secs: 15,
                bin_minutes: 5,
                sample_limit: 3000,
                price_feed: true,
            },
            ops: OpsConfig {
                log_level: "info".into(),
                state_dir: "state".into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn load_hashwatch_config_from_file() {
        let temp_path = std::env::temp_dir().join("hashwatch-config-test.toml");
        let config = HashwatchConfig {
            farm: FarmConfig {
                base_url: "http://192.168.1.50:8080".into(),
                ip: Some("192.168.1.101".into()),
                request_timeout_secs: 5,
            },
            poller: PollerConfig {
                interval_secs: 30,
                bin_minutes: 5,
                sample_limit: 1000,
                price_feed: false,
            },
            ops: OpsConfig {
                log_level: "debug".into(),
                state_dir: "state".into(),
            },
        };

        let doc = toml::to_string(&config).expect("serialize config");
        fs::write(&temp_path, doc).expect("write temp config");

        let loaded = HashwatchConfig::from_file(&temp_path).expect("load config");
        assert_eq!(loaded.farm.base_url, config.farm.base_url);
        assert_eq!(loaded.farm.ip, config.farm.ip);
        assert_eq!(loaded.poller.interval_secs, config.poller.interval_secs);
        assert!(!loaded.poller.price_feed);
        fs::remove_file(&temp_path).expect("cleanup temp config");
    }

    #[test]
    fn validate_configuration_rules() {
        let mut config = HashwatchConfig::default();
        assert!(config.validate().is_ok());

        config.farm.base_url = "   ".into();
        assert!(config.validate().is_err());
        config.farm.base_url = "http://127.0.0.1:8080".into();

        config.farm.request_timeout_secs = 0;
        assert!(config.validate().is_err());
        config.farm.request_timeout_secs = 10;

        config.poller.interval_secs = 3;
        assert!(config.validate().is_err());
        config.poller.interval_secs = 301;
        assert!(config.validate().is_err());
        config.poller.interval_secs = 15;

        config.poller.bin_minutes = 0;
        assert!(config.validate().is_err());
        config.poller.bin_minutes = 5;

        config.poller.sample_limit = 0;
        assert!(config.validate().is_err());
        config.poller.sample_limit = 3000;
        assert!(config.validate().is_ok());
    }
}

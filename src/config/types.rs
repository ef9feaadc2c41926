use std::collections::BTreeMap;
use std::time::Duration;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::device::constants::{DEFAULT_HUNDREDTHS_PER_DEGREE, DEFAULT_SCAN_TIMEOUT_SECS, ORIENTATION_SERVICE};
use crate::device::types::{ChannelConfiguration, OrientationChannel};
use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub channel_configuration: ChannelConfiguration,
    pub scan_timeout_secs: u64,
    pub hundredths_per_degree: f32,
    pub service_uuid: Uuid,
    // only channels whose firmware UUID differs from the built-in table
    pub characteristic_uuids: BTreeMap<OrientationChannel, Uuid>,
    pub log_level: LevelFilter,
}

impl Config {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    /// Rejects values that would turn every yaw/pitch/roll reading into inf or NaN.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let scale = self.hundredths_per_degree;
        if !scale.is_finite() || scale <= 0.0 {
            return Err(ConfigError::InvalidUnitScale { value: scale });
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            channel_configuration: ChannelConfiguration::default(),
            scan_timeout_secs: DEFAULT_SCAN_TIMEOUT_SECS,
            hundredths_per_degree: DEFAULT_HUNDREDTHS_PER_DEGREE,
            service_uuid: ORIENTATION_SERVICE,
            characteristic_uuids: BTreeMap::new(),
            log_level: LevelFilter::Info,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_is_the_default_config() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.channel_configuration, ChannelConfiguration::Gyro);
        assert_eq!(config.scan_timeout(), Duration::from_secs(20));
    }

    #[test]
    fn parses_camel_case_fields() {
        let config: Config = serde_json::from_str(r#"{
            "channelConfiguration": "gyro",
            "scanTimeoutSecs": 5,
            "characteristicUuids": { "yaw": "00000000-0000-0000-0000-000000001234" },
            "logLevel": "debug"
        }"#).unwrap();

        assert_eq!(config.channel_configuration, ChannelConfiguration::Gyro);
        assert_eq!(config.scan_timeout_secs, 5);
        assert_eq!(config.hundredths_per_degree, 100.0);
        assert_eq!(config.characteristic_uuids.get(&OrientationChannel::Yaw), Some(&Uuid::from_u128(0x1234)));
        assert_eq!(config.log_level, LevelFilter::Debug);
    }

    #[test]
    fn unit_scale_must_be_positive() {
        assert!(Config::default().validate().is_ok());

        for value in [0.0, -100.0, f32::NAN, f32::INFINITY] {
            let config = Config { hundredths_per_degree: value, ..Config::default() };
            assert!(matches!(config.validate(), Err(ConfigError::InvalidUnitScale { .. })));
        }
    }

    #[test]
    fn saved_config_reads_back() {
        let mut config = Config::default();
        config.channel_configuration = ChannelConfiguration::Gyro;
        config.characteristic_uuids.insert(OrientationChannel::Roll, Uuid::from_u128(7));

        let content = serde_json::to_string_pretty(&config).unwrap();
        assert!(content.contains("\"channelConfiguration\": \"gyro\""));
        assert_eq!(serde_json::from_str::<Config>(&content).unwrap(), config);
    }
}

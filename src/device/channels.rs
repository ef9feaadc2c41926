use std::collections::BTreeMap;
use indexmap::IndexMap;
use uuid::Uuid;

use crate::device::constants::{
    GYRO_X_CHARACTERISTIC, GYRO_Y_CHARACTERISTIC, GYRO_Z_CHARACTERISTIC,
    PITCH_CHARACTERISTIC, ROLL_CHARACTERISTIC, YAW_CHARACTERISTIC,
};
use crate::device::types::{ChannelConfiguration, OrientationChannel};
use crate::error::ConfigError;

/// Maps characteristic UUIDs to channels. Every UUID maps to exactly one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTable {
    entries: IndexMap<Uuid, OrientationChannel>,
}

fn default_uuid(channel: OrientationChannel) -> Uuid {
    match channel {
        OrientationChannel::GyroX => GYRO_X_CHARACTERISTIC,
        OrientationChannel::GyroY => GYRO_Y_CHARACTERISTIC,
        OrientationChannel::GyroZ => GYRO_Z_CHARACTERISTIC,
        OrientationChannel::Yaw => YAW_CHARACTERISTIC,
        OrientationChannel::Pitch => PITCH_CHARACTERISTIC,
        OrientationChannel::Roll => ROLL_CHARACTERISTIC,
    }
}

impl ChannelTable {
    /// Builds the table from the firmware defaults, replacing the UUIDs of the channels in `overrides`.
    pub fn with_overrides(overrides: &BTreeMap<OrientationChannel, Uuid>) -> Result<Self, ConfigError> {
        let mut entries = IndexMap::new();

        for channel in OrientationChannel::ALL {
            let uuid = overrides.get(&channel).copied().unwrap_or_else(|| default_uuid(channel));

            if entries.insert(uuid, channel).is_some() {
                return Err(ConfigError::DuplicateCharacteristic { uuid });
            }
        }

        Ok(ChannelTable { entries })
    }

    pub fn channel_of(&self, uuid: &Uuid) -> Option<OrientationChannel> {
        self.entries.get(uuid).copied()
    }

    pub fn uuid_of(&self, channel: OrientationChannel) -> Option<Uuid> {
        self.entries
            .iter()
            .find(|(_, c)| **c == channel)
            .map(|(uuid, _)| *uuid)
    }

    /// The characteristic UUIDs to discover and subscribe for `configuration`.
    pub fn uuids_for(&self, configuration: ChannelConfiguration) -> Vec<Uuid> {
        configuration
            .channels()
            .iter()
            .filter_map(|channel| self.uuid_of(*channel))
            .collect()
    }
}

impl Default for ChannelTable {
    fn default() -> Self {
        let entries = OrientationChannel::ALL
            .iter()
            .map(|channel| (default_uuid(*channel), *channel))
            .collect();

        ChannelTable { entries }
    }
}

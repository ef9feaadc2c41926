use std::fmt;
use std::sync::{Arc, RwLock};

use crate::device::types::{ChannelConfiguration, OrientationChannel};

/// Last known value of every channel. Gyro channels hold the smoothed raw reading,
/// yaw/pitch/roll hold degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct OrientationSnapshot {
    pub gyro_x: i16,
    pub gyro_y: i16,
    pub gyro_z: i16,
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

impl OrientationSnapshot {
    pub fn value(&self, channel: OrientationChannel) -> f32 {
        match channel {
            OrientationChannel::GyroX => f32::from(self.gyro_x),
            OrientationChannel::GyroY => f32::from(self.gyro_y),
            OrientationChannel::GyroZ => f32::from(self.gyro_z),
            OrientationChannel::Yaw => self.yaw,
            OrientationChannel::Pitch => self.pitch,
            OrientationChannel::Roll => self.roll,
        }
    }

    /// Formats only the channels of `configuration`.
    pub fn display(&self, configuration: ChannelConfiguration) -> SnapshotDisplay {
        SnapshotDisplay { snapshot: *self, configuration }
    }
}

pub struct SnapshotDisplay {
    snapshot: OrientationSnapshot,
    configuration: ChannelConfiguration,
}

impl fmt::Display for SnapshotDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = &self.snapshot;
        match self.configuration {
            ChannelConfiguration::Gyro => write!(f, "X: {} | Y: {} | Z: {}", s.gyro_x, s.gyro_y, s.gyro_z),
            ChannelConfiguration::YawPitchRoll => write!(
                f,
                "Yaw: {:.2} | Pitch: {:.2} | Roll: {:.2}",
                s.yaw, s.pitch, s.roll,
            ),
        }
    }
}

/// Shared holder of the current orientation.
///
/// The session writes one channel at a time under the lock; any clone may read a
/// consistent copy at any moment.
#[derive(Debug, Clone, Default)]
pub struct OrientationModel {
    inner: Arc<RwLock<OrientationSnapshot>>,
}

impl OrientationModel {
    pub fn new() -> Self {
        OrientationModel::default()
    }

    pub fn snapshot(&self) -> OrientationSnapshot {
        // a poisoned lock still holds a complete snapshot, every write is a single field store
        *self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_gyro(&self, channel: OrientationChannel, value: i16) -> OrientationSnapshot {
        self.update(|snapshot| match channel {
            OrientationChannel::GyroX => snapshot.gyro_x = value,
            OrientationChannel::GyroY => snapshot.gyro_y = value,
            OrientationChannel::GyroZ => snapshot.gyro_z = value,
            _ => {},
        })
    }

    pub fn set_degrees(&self, channel: OrientationChannel, degrees: f32) -> OrientationSnapshot {
        self.update(|snapshot| match channel {
            OrientationChannel::Yaw => snapshot.yaw = degrees,
            OrientationChannel::Pitch => snapshot.pitch = degrees,
            OrientationChannel::Roll => snapshot.roll = degrees,
            _ => {},
        })
    }

    fn update<F: FnOnce(&mut OrientationSnapshot)>(&self, apply: F) -> OrientationSnapshot {
        let mut guard = self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        apply(&mut *guard);
        *guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn updates_only_touch_one_channel() {
        let model = OrientationModel::new();
        let reader = model.clone();

        model.set_gyro(OrientationChannel::GyroY, 12);
        model.set_degrees(OrientationChannel::Roll, -10.0);
        let snapshot = model.set_degrees(OrientationChannel::Yaw, 45.0);

        assert_eq!(snapshot, reader.snapshot());
        assert_eq!(snapshot.gyro_x, 0);
        assert_eq!(snapshot.gyro_y, 12);
        assert_eq!(snapshot.yaw, 45.0);
        assert_eq!(snapshot.pitch, 0.0);
        assert_eq!(snapshot.roll, -10.0);
        assert_eq!(snapshot.value(OrientationChannel::GyroY), 12.0);
    }

    #[test]
    fn mismatched_channel_kinds_are_ignored() {
        let model = OrientationModel::new();
        model.set_gyro(OrientationChannel::Yaw, 99);
        model.set_degrees(OrientationChannel::GyroZ, 1.5);

        assert_eq!(model.snapshot(), OrientationSnapshot::default());
    }

    #[test]
    fn display_follows_configuration() {
        let snapshot = OrientationSnapshot { gyro_x: 1, gyro_y: -2, gyro_z: 3, yaw: 45.0, pitch: -10.0, roll: 0.5 };

        assert_eq!(snapshot.display(ChannelConfiguration::Gyro).to_string(), "X: 1 | Y: -2 | Z: 3");
        assert_eq!(
            snapshot.display(ChannelConfiguration::YawPitchRoll).to_string(),
            "Yaw: 45.00 | Pitch: -10.00 | Roll: 0.50",
        );
    }
}

use std::fmt;
use serde::{Deserialize, Serialize};

use crate::device::orientation::OrientationSnapshot;

/// One semantic sensor channel of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrientationChannel {
    GyroX,
    GyroY,
    GyroZ,
    Yaw,
    Pitch,
    Roll,
}

impl OrientationChannel {
    pub const ALL: [OrientationChannel; 6] = [
        OrientationChannel::GyroX,
        OrientationChannel::GyroY,
        OrientationChannel::GyroZ,
        OrientationChannel::Yaw,
        OrientationChannel::Pitch,
        OrientationChannel::Roll,
    ];

    /// Index of the axis for the gyro channels, these are the only smoothed channels.
    pub fn gyro_axis(&self) -> Option<usize> {
        match self {
            OrientationChannel::GyroX => Some(0),
            OrientationChannel::GyroY => Some(1),
            OrientationChannel::GyroZ => Some(2),
            _ => None,
        }
    }
}

impl fmt::Display for OrientationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            OrientationChannel::GyroX => "Gyro X",
            OrientationChannel::GyroY => "Gyro Y",
            OrientationChannel::GyroZ => "Gyro Z",
            OrientationChannel::Yaw => "Yaw",
            OrientationChannel::Pitch => "Pitch",
            OrientationChannel::Roll => "Roll",
        };

        write!(f, "{}", result)
    }
}

/// Which set of characteristics the firmware exposes. Only one set is ever subscribed.
/// The published sketch only exposes the gyro set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelConfiguration {
    #[default]
    Gyro,
    YawPitchRoll,
}

impl ChannelConfiguration {
    pub fn channels(&self) -> [OrientationChannel; 3] {
        match self {
            ChannelConfiguration::Gyro => [
                OrientationChannel::GyroX,
                OrientationChannel::GyroY,
                OrientationChannel::GyroZ,
            ],
            ChannelConfiguration::YawPitchRoll => [
                OrientationChannel::Yaw,
                OrientationChannel::Pitch,
                OrientationChannel::Roll,
            ],
        }
    }

    pub fn contains(&self, channel: OrientationChannel) -> bool {
        self.channels().contains(&channel)
    }
}

impl fmt::Display for ChannelConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            ChannelConfiguration::Gyro => "gyro",
            ChannelConfiguration::YawPitchRoll => "yaw/pitch/roll",
        };

        write!(f, "{}", result)
    }
}

/// Opaque, transport assigned identifier of a peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeripheralId(String);

impl PeripheralId {
    pub fn new(id: impl Into<String>) -> Self {
        PeripheralId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PeripheralId {
    fn from(id: &str) -> Self {
        PeripheralId::new(id)
    }
}

/// A discovered peripheral. Never changes after discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeripheralHandle {
    pub id: PeripheralId,
    pub name: String,
}

impl PeripheralHandle {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        PeripheralHandle {
            id: PeripheralId::new(id),
            name: name.into(),
        }
    }
}

impl fmt::Display for PeripheralHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Scanning,
    Discovered,
    Connecting { peripheral: PeripheralHandle },
    ServicesDiscovered { peripheral: PeripheralHandle },
    CharacteristicsDiscovered { peripheral: PeripheralHandle },
    Subscribed { peripheral: PeripheralHandle },
    Connected { peripheral: PeripheralHandle },
    Disconnecting { peripheral: PeripheralHandle },
}

impl ConnectionState {
    /// The peripheral this state is about, if any.
    pub fn peripheral(&self) -> Option<&PeripheralHandle> {
        match self {
            ConnectionState::Idle
            | ConnectionState::Scanning
            | ConnectionState::Discovered => None,
            ConnectionState::Connecting { peripheral }
            | ConnectionState::ServicesDiscovered { peripheral }
            | ConnectionState::CharacteristicsDiscovered { peripheral }
            | ConnectionState::Subscribed { peripheral }
            | ConnectionState::Connected { peripheral }
            | ConnectionState::Disconnecting { peripheral } => Some(peripheral),
        }
    }

    /// True once the characteristics of the connected peripheral are known.
    pub fn has_characteristics(&self) -> bool {
        matches!(
            self,
            ConnectionState::CharacteristicsDiscovered { .. }
                | ConnectionState::Subscribed { .. }
                | ConnectionState::Connected { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Scanning => "scanning",
            ConnectionState::Discovered => "discovered",
            ConnectionState::Connecting { .. } => "connecting",
            ConnectionState::ServicesDiscovered { .. } => "services discovered",
            ConnectionState::CharacteristicsDiscovered { .. } => "characteristics discovered",
            ConnectionState::Subscribed { .. } => "subscribed",
            ConnectionState::Connected { .. } => "connected",
            ConnectionState::Disconnecting { .. } => "disconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.peripheral() {
            Some(peripheral) => write!(f, "{} [{}]", self.name(), peripheral),
            None => write!(f, "{}", self.name()),
        }
    }
}

/// Why a session with a peripheral ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    Requested,
    ConnectFailed(String),
    LinkLost(Option<String>),
    DiscoveryFailed(String),
    ServiceNotFound,
    MissingCharacteristics(Vec<OrientationChannel>),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::Requested => write!(f, "disconnect requested"),
            DisconnectReason::ConnectFailed(err) => write!(f, "connect failed: {}", err),
            DisconnectReason::LinkLost(Some(err)) => write!(f, "connection lost: {}", err),
            DisconnectReason::LinkLost(None) => write!(f, "connection lost"),
            DisconnectReason::DiscoveryFailed(err) => write!(f, "discovery failed: {}", err),
            DisconnectReason::ServiceNotFound => write!(f, "orientation service not found"),
            DisconnectReason::MissingCharacteristics(channels) => {
                let names = channels.iter().map(|c| c.to_string()).collect::<Vec<_>>();
                write!(f, "missing characteristics: {}", names.join(", "))
            },
        }
    }
}

/// The SessionEventSink callbacks as values, for consumers that live on another task.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    PeripheralsDiscovered(Vec<PeripheralHandle>),
    Connected(PeripheralHandle),
    Disconnected(PeripheralHandle, DisconnectReason),
    CharacteristicsReady(PeripheralHandle),
    OrientationUpdated(OrientationSnapshot),
}

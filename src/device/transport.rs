use uuid::Uuid;

use crate::device::types::{PeripheralHandle, PeripheralId};

/// Commands understood by a BLE stack.
///
/// Every command returns immediately; its outcome arrives later as a `TransportEvent`.
pub trait Transport: Send {
    /// Scan for peripherals advertising `service`.
    fn scan(&mut self, service: Uuid);

    fn stop_scan(&mut self);

    fn connect(&mut self, peripheral: &PeripheralId);

    fn disconnect(&mut self, peripheral: &PeripheralId);

    fn discover_services(&mut self, peripheral: &PeripheralId, services: &[Uuid]);

    fn discover_characteristics(&mut self, peripheral: &PeripheralId, service: Uuid, characteristics: &[Uuid]);

    fn set_notify(&mut self, peripheral: &PeripheralId, characteristic: Uuid, enabled: bool);
}

/// Completion and notification events reported by a `Transport`.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Discovered {
        peripheral: PeripheralHandle,
    },
    Connected {
        peripheral: PeripheralId,
    },
    ConnectFailed {
        peripheral: PeripheralId,
        error: String,
    },
    Disconnected {
        peripheral: PeripheralId,
        error: Option<String>,
    },
    ServicesDiscovered {
        peripheral: PeripheralId,
        services: Vec<Uuid>,
        error: Option<String>,
    },
    CharacteristicsDiscovered {
        peripheral: PeripheralId,
        service: Uuid,
        characteristics: Vec<Uuid>,
        error: Option<String>,
    },
    NotifyStateChanged {
        peripheral: PeripheralId,
        characteristic: Uuid,
        enabled: bool,
        error: Option<String>,
    },
    CharacteristicValue {
        peripheral: PeripheralId,
        characteristic: Uuid,
        value: Vec<u8>,
        error: Option<String>,
    },
}

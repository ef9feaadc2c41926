use indexmap::{IndexMap, IndexSet};
use log::{debug, info, warn};
use uuid::Uuid;

use crate::config::types::Config;
use crate::device::channels::ChannelTable;
use crate::device::constants::{DEFAULT_HUNDREDTHS_PER_DEGREE, ORIENTATION_SERVICE};
use crate::device::decoder::{decode_i16, scale_to_degrees};
use crate::device::filter::MovingAverageFilter;
use crate::device::orientation::{OrientationModel, OrientationSnapshot};
use crate::device::sink::SessionEventSink;
use crate::device::transport::{Transport, TransportEvent};
use crate::device::types::{
    ChannelConfiguration, ConnectionState, DisconnectReason, OrientationChannel, PeripheralHandle,
    PeripheralId,
};
use crate::error::{ConfigError, SessionError};

/// Static settings of a session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub service: Uuid,
    pub configuration: ChannelConfiguration,
    pub table: ChannelTable,
    pub hundredths_per_degree: f32,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(SessionSettings {
            service: config.service_uuid,
            configuration: config.channel_configuration,
            table: ChannelTable::with_overrides(&config.characteristic_uuids)?,
            hundredths_per_degree: config.hundredths_per_degree,
        })
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            service: ORIENTATION_SERVICE,
            configuration: ChannelConfiguration::default(),
            table: ChannelTable::default(),
            hundredths_per_degree: DEFAULT_HUNDREDTHS_PER_DEGREE,
        }
    }
}

/// Drives one BLE session: scan, connect, discover, subscribe and stream orientation values.
///
/// All methods are synchronous and only issue transport commands; progress is made by feeding
/// the transport's events to `handle_event`. Calls that are not valid in the current state
/// are rejected with a `SessionError` and leave the state untouched.
pub struct GattSessionManager<T: Transport> {
    transport: T,
    settings: SessionSettings,
    state: ConnectionState,
    scan_active: bool,
    peripherals: IndexMap<PeripheralId, PeripheralHandle>,
    // characteristics of the connected peripheral, only filled from CharacteristicsDiscovered on
    bindings: IndexMap<Uuid, OrientationChannel>,
    subscribed: IndexSet<Uuid>,
    // aborted links whose Disconnected event has not arrived yet
    closing: IndexSet<PeripheralId>,
    gyro_filters: [MovingAverageFilter; 3],
    orientation: OrientationModel,
    sink: Option<Box<dyn SessionEventSink>>,
}

impl<T: Transport> GattSessionManager<T> {
    pub fn new(transport: T, settings: SessionSettings) -> Self {
        GattSessionManager {
            transport,
            settings,
            state: ConnectionState::Idle,
            scan_active: false,
            peripherals: IndexMap::new(),
            bindings: IndexMap::new(),
            subscribed: IndexSet::new(),
            closing: IndexSet::new(),
            gyro_filters: Default::default(),
            orientation: OrientationModel::new(),
            sink: None,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn configuration(&self) -> ChannelConfiguration {
        self.settings.configuration
    }

    pub fn is_scanning(&self) -> bool {
        self.scan_active
    }

    /// Peripherals found by the last scan, in discovery order.
    pub fn peripherals(&self) -> Vec<PeripheralHandle> {
        self.peripherals.values().cloned().collect()
    }

    /// A handle that always reads the latest orientation.
    pub fn orientation(&self) -> OrientationModel {
        self.orientation.clone()
    }

    pub fn snapshot(&self) -> OrientationSnapshot {
        self.orientation.snapshot()
    }

    /// Replaces the registered sink, returning the previous one.
    pub fn register_sink(&mut self, sink: Box<dyn SessionEventSink>) -> Option<Box<dyn SessionEventSink>> {
        self.sink.replace(sink)
    }

    pub fn clear_sink(&mut self) -> Option<Box<dyn SessionEventSink>> {
        self.sink.take()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn start_scan(&mut self) -> Result<(), SessionError> {
        match self.state {
            ConnectionState::Idle | ConnectionState::Scanning | ConnectionState::Discovered => {},
            _ => return Err(self.invalid_state("start scanning")),
        }

        info!("Starting scan for service {}...", self.settings.service);
        self.peripherals.clear();
        self.state = ConnectionState::Scanning;
        self.scan_active = true;
        self.transport.scan(self.settings.service);
        Ok(())
    }

    pub fn stop_scan(&mut self) {
        if !self.scan_active {
            return;
        }

        info!("Stopping scan");
        self.scan_active = false;
        self.transport.stop_scan();

        if self.state == ConnectionState::Scanning {
            self.state = ConnectionState::Idle;
        }
    }

    pub fn connect(&mut self, id: &PeripheralId) -> Result<(), SessionError> {
        let peripheral = match self.peripherals.get(id) {
            Some(peripheral) => peripheral.clone(),
            None => return Err(SessionError::UnknownPeripheral { id: id.to_string() }),
        };

        match self.state {
            ConnectionState::Idle | ConnectionState::Scanning | ConnectionState::Discovered => {},
            _ => return Err(self.invalid_state("connect")),
        }

        self.stop_scan();

        info!("Connecting to peripheral {}", peripheral);
        self.reset_connection();
        self.state = ConnectionState::Connecting { peripheral };
        self.transport.connect(id);
        Ok(())
    }

    /// Unsubscribes what was subscribed and disconnects. Disconnecting a peripheral that is not
    /// connected is a no-op.
    pub fn disconnect(&mut self, id: &PeripheralId) -> Result<(), SessionError> {
        let peripheral = match self.state.peripheral() {
            Some(peripheral) if &peripheral.id == id => peripheral.clone(),
            _ => {
                debug!("Not connected to {}, nothing to disconnect", id);
                return Ok(());
            },
        };

        if let ConnectionState::Disconnecting { .. } = self.state {
            return Ok(());
        }

        if self.state.has_characteristics() {
            self.unsubscribe_known(id);
        }

        info!("Disconnecting from peripheral {}", peripheral);
        self.transport.disconnect(id);
        self.state = ConnectionState::Disconnecting { peripheral };
        Ok(())
    }

    /// Enables notifications on every channel characteristic of the connected peripheral.
    pub fn subscribe_all(&mut self, id: &PeripheralId) -> Result<(), SessionError> {
        let peripheral = self.ready_peripheral(id, "subscribe")?;

        for (uuid, channel) in &self.bindings {
            if self.subscribed.insert(*uuid) {
                info!("Subscribing to {} characteristic {}", channel, uuid);
                self.transport.set_notify(id, *uuid, true);
            }
        }

        if let ConnectionState::CharacteristicsDiscovered { .. } = self.state {
            self.state = ConnectionState::Subscribed { peripheral };
        }
        Ok(())
    }

    pub fn unsubscribe_all(&mut self, id: &PeripheralId) -> Result<(), SessionError> {
        let peripheral = self.ready_peripheral(id, "unsubscribe")?;

        self.unsubscribe_known(id);
        self.state = ConnectionState::CharacteristicsDiscovered { peripheral };
        Ok(())
    }

    pub fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Discovered { peripheral } => self.on_discovered(peripheral),
            TransportEvent::Connected { peripheral } => self.on_connected(&peripheral),
            TransportEvent::ConnectFailed { peripheral, error } => self.on_connect_failed(&peripheral, error),
            TransportEvent::Disconnected { peripheral, error } => self.on_disconnected(&peripheral, error),
            TransportEvent::ServicesDiscovered { peripheral, services, error } => {
                self.on_services_discovered(&peripheral, &services, error)
            },
            TransportEvent::CharacteristicsDiscovered { peripheral, service, characteristics, error } => {
                self.on_characteristics_discovered(&peripheral, service, &characteristics, error)
            },
            TransportEvent::NotifyStateChanged { peripheral, characteristic, enabled, error } => {
                self.on_notify_state_changed(&peripheral, characteristic, enabled, error)
            },
            TransportEvent::CharacteristicValue { peripheral, characteristic, value, error } => {
                self.on_characteristic_value_updated(&peripheral, characteristic, &value, error)
            },
        }
    }

    pub fn on_discovered(&mut self, peripheral: PeripheralHandle) {
        if !self.scan_active {
            debug!("Ignoring discovery of {} while not scanning", peripheral);
            return;
        }

        if self.peripherals.contains_key(&peripheral.id) {
            return;
        }

        info!("Adding peripheral {}", peripheral);
        self.peripherals.insert(peripheral.id.clone(), peripheral);

        if self.state == ConnectionState::Scanning {
            self.state = ConnectionState::Discovered;
        }

        let peripherals = self.peripherals();
        if let Some(sink) = self.sink.as_mut() {
            sink.on_peripheral_discovered(&peripherals);
        }
    }

    pub fn on_connected(&mut self, id: &PeripheralId) {
        let peripheral = match &self.state {
            ConnectionState::Connecting { peripheral } if &peripheral.id == id => peripheral.clone(),
            state => {
                debug!("Ignoring connection of {} while {}", id, state);
                return;
            },
        };

        info!("Connected to {}; discovering services...", peripheral);
        self.transport.discover_services(id, &[self.settings.service]);

        if let Some(sink) = self.sink.as_mut() {
            sink.on_connected(&peripheral);
        }
    }

    pub fn on_connect_failed(&mut self, id: &PeripheralId, error: String) {
        match &self.state {
            ConnectionState::Connecting { peripheral } if &peripheral.id == id => {
                warn!("Connecting to {} failed: {}", peripheral, error);
                let peripheral = peripheral.clone();
                self.end_session(peripheral, DisconnectReason::ConnectFailed(error));
            },
            state => debug!("Ignoring connect failure of {} while {}: {}", id, state, error),
        }
    }

    pub fn on_disconnected(&mut self, id: &PeripheralId, error: Option<String>) {
        if self.closing.shift_remove(id) {
            debug!("Aborted link to {} is closed", id);
            return;
        }

        let peripheral = match self.state.peripheral() {
            Some(peripheral) if &peripheral.id == id => peripheral.clone(),
            _ => {
                debug!("Ignoring disconnect of {} while {}", id, self.state);
                return;
            },
        };

        let reason = match (&self.state, error) {
            (ConnectionState::Disconnecting { .. }, None) => DisconnectReason::Requested,
            (ConnectionState::Disconnecting { .. }, Some(error)) => {
                warn!("Disconnect from {} reported an error: {}", peripheral, error);
                DisconnectReason::Requested
            },
            (ConnectionState::Connecting { .. }, error) => DisconnectReason::ConnectFailed(
                error.unwrap_or_else(|| String::from("disconnected while connecting")),
            ),
            (_, error) => {
                warn!("Connection to {} lost", peripheral);
                DisconnectReason::LinkLost(error)
            },
        };

        self.end_session(peripheral, reason);
    }

    pub fn on_services_discovered(&mut self, id: &PeripheralId, services: &[Uuid], error: Option<String>) {
        let peripheral = match &self.state {
            ConnectionState::Connecting { peripheral } if &peripheral.id == id => peripheral.clone(),
            state => {
                debug!("Ignoring services of {} while {}", id, state);
                return;
            },
        };

        if let Some(error) = error {
            warn!("Service discovery on {} failed: {}", peripheral, error);
            return self.abort_session(peripheral, DisconnectReason::DiscoveryFailed(error));
        }

        if !services.contains(&self.settings.service) {
            warn!("{} does not offer service {}", peripheral, self.settings.service);
            return self.abort_session(peripheral, DisconnectReason::ServiceNotFound);
        }

        let characteristics = self.settings.table.uuids_for(self.settings.configuration);
        info!("Discovering {} characteristics of {}", self.settings.configuration, peripheral);
        self.transport.discover_characteristics(id, self.settings.service, &characteristics);
        self.state = ConnectionState::ServicesDiscovered { peripheral };
    }

    pub fn on_characteristics_discovered(
        &mut self,
        id: &PeripheralId,
        service: Uuid,
        characteristics: &[Uuid],
        error: Option<String>,
    ) {
        let peripheral = match &self.state {
            ConnectionState::ServicesDiscovered { peripheral } if &peripheral.id == id => peripheral.clone(),
            state => {
                debug!("Ignoring characteristics of {} while {}", id, state);
                return;
            },
        };

        if service != self.settings.service {
            debug!("Ignoring characteristics of unrelated service {}", service);
            return;
        }

        if let Some(error) = error {
            warn!("Characteristic discovery on {} failed: {}", peripheral, error);
            return self.abort_session(peripheral, DisconnectReason::DiscoveryFailed(error));
        }

        let configuration = self.settings.configuration;
        self.bindings.clear();
        for uuid in characteristics {
            match self.settings.table.channel_of(uuid) {
                Some(channel) if configuration.contains(channel) => {
                    self.bindings.insert(*uuid, channel);
                },
                _ => debug!("Ignoring characteristic {}", uuid),
            }
        }

        let missing: Vec<OrientationChannel> = configuration
            .channels()
            .into_iter()
            .filter(|channel| !self.bindings.values().any(|c| c == channel))
            .collect();

        if !missing.is_empty() {
            warn!("{} is missing {} characteristics", peripheral, missing.len());
            return self.abort_session(peripheral, DisconnectReason::MissingCharacteristics(missing));
        }

        info!("Characteristics of {} are ready", peripheral);
        self.state = ConnectionState::CharacteristicsDiscovered { peripheral: peripheral.clone() };

        if let Some(sink) = self.sink.as_mut() {
            sink.on_characteristics_ready(&peripheral);
        }
    }

    pub fn on_notify_state_changed(
        &mut self,
        id: &PeripheralId,
        characteristic: Uuid,
        enabled: bool,
        error: Option<String>,
    ) {
        match error {
            None => debug!("Notifications for {} on {} are now {}", characteristic, id, if enabled { "on" } else { "off" }),
            Some(error) => {
                warn!("Changing notifications for {} on {} failed: {}", characteristic, id, error);
                // allow a later subscribe_all to try again
                if enabled {
                    self.subscribed.shift_remove(&characteristic);
                }
            },
        }
    }

    /// Decodes a characteristic value into the orientation snapshot. Values that arrive with
    /// an error are dropped.
    pub fn on_characteristic_value_updated(
        &mut self,
        id: &PeripheralId,
        characteristic: Uuid,
        value: &[u8],
        error: Option<String>,
    ) {
        if let Some(error) = error {
            warn!("Dropping value of {}: {}", characteristic, error);
            return;
        }

        let peripheral = match self.state.peripheral() {
            Some(peripheral) if &peripheral.id == id && self.state.has_characteristics() => peripheral.clone(),
            _ => {
                debug!("Ignoring value of {} from {} while {}", characteristic, id, self.state);
                return;
            },
        };

        let channel = match self.bindings.get(&characteristic) {
            Some(channel) => *channel,
            None => {
                debug!("Unknown characteristic {}", characteristic);
                return;
            },
        };

        let raw = decode_i16(value);
        let snapshot = match channel.gyro_axis() {
            Some(axis) => {
                let average = self.gyro_filters[axis].push(raw);
                self.orientation.set_gyro(channel, average)
            },
            None => {
                let degrees = scale_to_degrees(raw, self.settings.hundredths_per_degree);
                self.orientation.set_degrees(channel, degrees)
            },
        };

        if let ConnectionState::Subscribed { .. } = self.state {
            info!("Receiving orientation from {}", peripheral);
            self.state = ConnectionState::Connected { peripheral };
        }

        if let Some(sink) = self.sink.as_mut() {
            sink.on_orientation_updated(&snapshot);
        }
    }

    fn ready_peripheral(&self, id: &PeripheralId, operation: &'static str) -> Result<PeripheralHandle, SessionError> {
        match self.state.peripheral() {
            Some(peripheral) if &peripheral.id == id => {
                if self.state.has_characteristics() {
                    Ok(peripheral.clone())
                } else if let ConnectionState::Disconnecting { .. } = self.state {
                    Err(self.invalid_state(operation))
                } else {
                    Err(SessionError::CharacteristicsNotReady { id: id.to_string() })
                }
            },
            _ => Err(self.invalid_state(operation)),
        }
    }

    fn unsubscribe_known(&mut self, id: &PeripheralId) {
        for uuid in self.subscribed.drain(..) {
            info!("Unsubscribing from characteristic {}", uuid);
            self.transport.set_notify(id, uuid, false);
        }
    }

    /// Protocol-shape failure: drop the link and report the session as ended.
    fn abort_session(&mut self, peripheral: PeripheralHandle, reason: DisconnectReason) {
        self.closing.insert(peripheral.id.clone());
        self.transport.disconnect(&peripheral.id);
        self.end_session(peripheral, reason);
    }

    fn end_session(&mut self, peripheral: PeripheralHandle, reason: DisconnectReason) {
        self.reset_connection();
        self.state = ConnectionState::Idle;

        if let Some(sink) = self.sink.as_mut() {
            sink.on_disconnected(&peripheral, &reason);
        }
    }

    fn reset_connection(&mut self) {
        self.bindings.clear();
        self.subscribed.clear();
    }

    fn invalid_state(&self, operation: &'static str) -> SessionError {
        SessionError::InvalidState { operation, state: self.state.to_string() }
    }
}

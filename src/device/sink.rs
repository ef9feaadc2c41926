use futures::channel::mpsc::{channel, Receiver, Sender};
use log::{info, warn};

use crate::device::orientation::OrientationSnapshot;
use crate::device::types::{DisconnectReason, PeripheralHandle, SessionEvent};

/// Receives the events of a session. A session holds at most one sink; registering another
/// one replaces it.
///
/// Callbacks run on the task that drives the session and must return quickly, BLE
/// notifications are not delivered while a callback runs. Use a `ChannelSink` to move
/// slow work elsewhere.
pub trait SessionEventSink: Send {
    /// The set of discovered peripherals grew; `peripherals` is the complete set.
    fn on_peripheral_discovered(&mut self, _peripherals: &[PeripheralHandle]) {}

    fn on_connected(&mut self, _peripheral: &PeripheralHandle) {}

    /// Also reported for failed connection attempts and aborted discovery.
    fn on_disconnected(&mut self, _peripheral: &PeripheralHandle, _reason: &DisconnectReason) {}

    /// The orientation characteristics are known, `subscribe_all` may be called now.
    fn on_characteristics_ready(&mut self, _peripheral: &PeripheralHandle) {}

    fn on_orientation_updated(&mut self, _snapshot: &OrientationSnapshot) {}
}

/// Forwards every callback as a `SessionEvent` over a bounded channel.
/// When the consumer falls behind, orientation updates are dropped instead of blocking the
/// session. Lifecycle events are always delivered.
pub struct ChannelSink {
    sender: Sender<SessionEvent>,
}

impl ChannelSink {
    pub fn new(buffer: usize) -> (Self, Receiver<SessionEvent>) {
        let (sender, receiver) = channel::<SessionEvent>(buffer);
        (ChannelSink { sender }, receiver)
    }

    fn forward(&mut self, event: SessionEvent) {
        let result = match event {
            SessionEvent::OrientationUpdated(_) => self.sender.try_send(event),
            // every sender has a guaranteed slot, so a fresh clone is never full
            _ => self.sender.clone().try_send(event),
        };

        if let Err(err) = result {
            if err.is_full() {
                warn!("Session event consumer is falling behind, dropping {:?}", err.into_inner());
            }
        }
    }
}

impl SessionEventSink for ChannelSink {
    fn on_peripheral_discovered(&mut self, peripherals: &[PeripheralHandle]) {
        self.forward(SessionEvent::PeripheralsDiscovered(peripherals.to_vec()));
    }

    fn on_connected(&mut self, peripheral: &PeripheralHandle) {
        self.forward(SessionEvent::Connected(peripheral.clone()));
    }

    fn on_disconnected(&mut self, peripheral: &PeripheralHandle, reason: &DisconnectReason) {
        self.forward(SessionEvent::Disconnected(peripheral.clone(), reason.clone()));
    }

    fn on_characteristics_ready(&mut self, peripheral: &PeripheralHandle) {
        self.forward(SessionEvent::CharacteristicsReady(peripheral.clone()));
    }

    fn on_orientation_updated(&mut self, snapshot: &OrientationSnapshot) {
        self.forward(SessionEvent::OrientationUpdated(*snapshot));
    }
}

/// Writes session events to the log.
pub struct LogSink;

impl SessionEventSink for LogSink {
    fn on_peripheral_discovered(&mut self, peripherals: &[PeripheralHandle]) {
        if let Some(newest) = peripherals.last() {
            info!("Discovered {} ({} peripherals so far)", newest, peripherals.len());
        }
    }

    fn on_connected(&mut self, peripheral: &PeripheralHandle) {
        info!("Connected to {}", peripheral);
    }

    fn on_disconnected(&mut self, peripheral: &PeripheralHandle, reason: &DisconnectReason) {
        info!("Disconnected from {}: {}", peripheral, reason);
    }

    fn on_characteristics_ready(&mut self, peripheral: &PeripheralHandle) {
        info!("Characteristics of {} are ready", peripheral);
    }

    fn on_orientation_updated(&mut self, snapshot: &OrientationSnapshot) {
        info!("{:?}", snapshot);
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use super::*;

    #[test]
    fn channel_sink_forwards_events_in_order() {
        let (mut sink, mut receiver) = ChannelSink::new(8);
        let peripheral = PeripheralHandle::new("a", "Arduino");

        sink.on_connected(&peripheral);
        sink.on_disconnected(&peripheral, &DisconnectReason::Requested);

        let events = futures::executor::block_on(async {
            drop(sink);
            receiver.by_ref().collect::<Vec<_>>().await
        });

        assert_eq!(events, vec![
            SessionEvent::Connected(peripheral.clone()),
            SessionEvent::Disconnected(peripheral, DisconnectReason::Requested),
        ]);
    }

    #[test]
    fn full_channel_drops_instead_of_blocking() {
        let (mut sink, mut receiver) = ChannelSink::new(0);
        let snapshot = OrientationSnapshot::default();

        for _ in 0..10 {
            sink.on_orientation_updated(&snapshot);
        }
        drop(sink);

        let count = futures::executor::block_on(receiver.by_ref().count());
        // a futures channel has one slot per sender on top of the buffer
        assert_eq!(count, 1);
    }

    #[test]
    fn lifecycle_events_survive_a_full_channel() {
        let (mut sink, mut receiver) = ChannelSink::new(0);
        let peripheral = PeripheralHandle::new("a", "Arduino");
        let snapshot = OrientationSnapshot::default();

        for _ in 0..10 {
            sink.on_orientation_updated(&snapshot);
        }
        sink.on_characteristics_ready(&peripheral);
        sink.on_disconnected(&peripheral, &DisconnectReason::Requested);
        drop(sink);

        let events = futures::executor::block_on(receiver.by_ref().collect::<Vec<_>>());
        assert_eq!(events, vec![
            SessionEvent::OrientationUpdated(snapshot),
            SessionEvent::CharacteristicsReady(peripheral.clone()),
            SessionEvent::Disconnected(peripheral, DisconnectReason::Requested),
        ]);
    }
}

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::channel::mpsc::Sender;
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use tokio::spawn;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::device::constants::{CONNECT_DEADLINE, DISCONNECT_DEADLINE, DISCOVERY_DEADLINE, NOTIFY_DEADLINE};
use crate::device::transport::{Transport, TransportEvent};
use crate::device::types::{PeripheralHandle, PeripheralId};
use crate::error::DeviceError;

type PeripheralMap = Arc<Mutex<HashMap<PeripheralId, Peripheral>>>;

fn lock_peripherals(peripherals: &PeripheralMap) -> std::sync::MutexGuard<'_, HashMap<PeripheralId, Peripheral>> {
    peripherals.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn emit(mut events: Sender<TransportEvent>, event: TransportEvent) {
    if let Err(err) = events.send(event).await {
        debug!("Session is gone, dropping transport event: {:?}", err);
    }
}

async fn with_deadline<T, F>(deadline: u64, what: &str, fut: F) -> Result<T, String>
where
    F: Future<Output = Result<T, btleplug::Error>>,
{
    tokio::select! {
        _ = sleep(Duration::from_millis(deadline)) => {
            warn!("{} took too long", what);
            Err(format!("{} took longer than {}ms", what, deadline))
        }
        result = fut => result.map_err(|err| err.to_string()),
    }
}

/// Runs `connect` unless `cancel` fires first. Returns None when the connection is no longer
/// wanted; a link that came up anyway is dropped again with `disconnect`.
async fn connect_unless_cancelled<C, D, DF>(
    cancel: &CancellationToken,
    connect: C,
    disconnect: D,
) -> Option<Result<(), String>>
where
    C: Future<Output = Result<(), btleplug::Error>>,
    D: FnOnce() -> DF,
    DF: Future<Output = Result<(), btleplug::Error>>,
{
    let connected = tokio::select! {
        _ = cancel.cancelled() => None,
        result = with_deadline(CONNECT_DEADLINE, "Connecting", connect) => Some(result),
    };

    match connected {
        Some(result) if !cancel.is_cancelled() => Some(result),
        Some(Err(_)) => None,
        _ => {
            if let Err(err) = with_deadline(DISCONNECT_DEADLINE, "Dropping cancelled connection", disconnect()).await {
                debug!("{}", err);
            }
            None
        },
    }
}

async fn first_adapter(manager: &Manager) -> Result<Adapter, DeviceError> {
    let adapters = manager.adapters().await?;
    let adapter = adapters.into_iter().next().ok_or(DeviceError::NoAdapter)?;

    info!("Using adapter {}", adapter.adapter_info().await.unwrap_or("UNKNOWN".to_string()));
    Ok(adapter)
}

// btleplug ids are platform specific, the session only needs a stable string
fn session_id(id: &btleplug::platform::PeripheralId) -> PeripheralId {
    PeripheralId::new(format!("{:?}", id))
}

/// Returns the handle of `peripheral` if it advertises `service`.
async fn matching_handle(peripheral: &Peripheral, service: Uuid) -> Option<PeripheralHandle> {
    match peripheral.properties().await {
        Err(err) => {
            warn!("Could not query peripheral for properties: {:?}", err);
            None
        },
        Ok(None) => {
            debug!("Peripheral has no properties");
            None
        },
        Ok(Some(properties)) => {
            // Some environments ignore the scan filter, so check the service uuid again
            if !properties.services.contains(&service) {
                return None;
            }

            let name = properties.local_name.unwrap_or_else(|| properties.address.to_string());
            Some(PeripheralHandle { id: session_id(&peripheral.id()), name })
        },
    }
}

/// Watches adapter events for the lifetime of the transport.
fn central_events_task(
    cancel: CancellationToken,
    adapter: Adapter,
    scan_service: Arc<Mutex<Option<Uuid>>>,
    peripherals: PeripheralMap,
    events: Sender<TransportEvent>,
) {
    spawn(async move {
        let mut central_events = match adapter.events().await {
            Ok(stream) => stream,
            Err(err) => {
                warn!("Failed to listen to adapter events: {}", err);
                return;
            },
        };

        'mainloop: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                event = central_events.next() => match event {
                    None => break 'mainloop,
                    Some(CentralEvent::DeviceDiscovered(id)) | Some(CentralEvent::DeviceUpdated(id)) => {
                        let service = *scan_service.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                        let Some(service) = service else { continue 'mainloop };

                        let peripheral = match adapter.peripheral(&id).await {
                            Ok(peripheral) => peripheral,
                            Err(err) => {
                                debug!("Discovered peripheral {:?} went away: {}", id, err);
                                continue 'mainloop;
                            },
                        };

                        if let Some(handle) = matching_handle(&peripheral, service).await {
                            lock_peripherals(&peripherals).insert(handle.id.clone(), peripheral);
                            emit(events.clone(), TransportEvent::Discovered { peripheral: handle }).await;
                        }
                    },
                    Some(CentralEvent::DeviceDisconnected(id)) => {
                        let peripheral = session_id(&id);
                        if lock_peripherals(&peripherals).contains_key(&peripheral) {
                            emit(events.clone(), TransportEvent::Disconnected { peripheral, error: None }).await;
                        }
                    },
                    Some(_) => {},
                },
            }
        }
    });
}

/// Forwards notifications of a connected peripheral until cancelled.
fn read_notifications_task(
    cancel: CancellationToken,
    id: PeripheralId,
    peripheral: Peripheral,
    events: Sender<TransportEvent>,
) {
    spawn(async move {
        let mut notification_stream = match peripheral.notifications().await {
            Ok(stream) => stream,
            Err(err) => {
                warn!("Failed to listen to notifications of {}: {}", id, err);
                return;
            },
        };

        'mainloop: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                data = notification_stream.next() => match data {
                    None => break 'mainloop,
                    Some(data) => {
                        let event = TransportEvent::CharacteristicValue {
                            peripheral: id.clone(),
                            characteristic: data.uuid,
                            value: data.value,
                            error: None,
                        };
                        emit(events.clone(), event).await;
                    },
                },
            }
        }

        debug!("Stopped reading notifications of {}", id);
    });
}

/// `Transport` on top of btleplug, using the first bluetooth adapter.
pub struct BtleTransport {
    adapter: Adapter,
    events: Sender<TransportEvent>,
    peripherals: PeripheralMap,
    scan_service: Arc<Mutex<Option<Uuid>>>,
    connections: HashMap<PeripheralId, CancellationToken>,
    cancel: CancellationToken,
}

impl BtleTransport {
    /// Must be called from within a tokio runtime. Stops all background work when `cancel` is cancelled.
    pub async fn new(events: Sender<TransportEvent>, cancel: CancellationToken) -> Result<Self, DeviceError> {
        let manager = Manager::new().await?;
        let adapter = first_adapter(&manager).await?;
        let peripherals: PeripheralMap = Arc::new(Mutex::new(HashMap::new()));
        let scan_service = Arc::new(Mutex::new(None));

        central_events_task(
            cancel.clone(),
            adapter.clone(),
            scan_service.clone(),
            peripherals.clone(),
            events.clone(),
        );

        Ok(BtleTransport {
            adapter,
            events,
            peripherals,
            scan_service,
            connections: HashMap::new(),
            cancel,
        })
    }

    fn peripheral(&self, id: &PeripheralId) -> Option<Peripheral> {
        lock_peripherals(&self.peripherals).get(id).cloned()
    }

    fn set_scan_service(&self, service: Option<Uuid>) {
        *self.scan_service.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = service;
    }
}

impl Transport for BtleTransport {
    fn scan(&mut self, service: Uuid) {
        self.set_scan_service(Some(service));
        let adapter = self.adapter.clone();

        spawn(async move {
            let filter = ScanFilter {
                services: vec![service],
            };

            if let Err(err) = adapter.start_scan(filter).await {
                warn!("Scanning failed {:?}", err);
            }
        });
    }

    fn stop_scan(&mut self) {
        self.set_scan_service(None);
        let adapter = self.adapter.clone();

        spawn(async move {
            if let Err(err) = adapter.stop_scan().await {
                warn!("Stopping the scan failed {:?}", err);
            }
        });
    }

    fn connect(&mut self, id: &PeripheralId) {
        let id = id.clone();
        let events = self.events.clone();

        let Some(peripheral) = self.peripheral(&id) else {
            spawn(emit(events, TransportEvent::ConnectFailed { peripheral: id, error: String::from("unknown peripheral") }));
            return;
        };

        let connection_cancel = self.cancel.child_token();
        if let Some(previous) = self.connections.insert(id.clone(), connection_cancel.clone()) {
            previous.cancel();
        }

        spawn(async move {
            let connected = connect_unless_cancelled(
                &connection_cancel,
                peripheral.connect(),
                || peripheral.disconnect(),
            ).await;

            let event = match connected {
                None => {
                    debug!("Connecting to {} was cancelled", id);
                    return;
                },
                Some(Ok(())) => {
                    read_notifications_task(connection_cancel, id.clone(), peripheral, events.clone());
                    TransportEvent::Connected { peripheral: id }
                },
                Some(Err(error)) => TransportEvent::ConnectFailed { peripheral: id, error },
            };

            emit(events, event).await;
        });
    }

    fn disconnect(&mut self, id: &PeripheralId) {
        if let Some(connection_cancel) = self.connections.remove(id) {
            connection_cancel.cancel();
        }

        let id = id.clone();
        let events = self.events.clone();
        let Some(peripheral) = self.peripheral(&id) else {
            spawn(emit(events, TransportEvent::Disconnected { peripheral: id, error: None }));
            return;
        };

        spawn(async move {
            let error = with_deadline(DISCONNECT_DEADLINE, "Disconnecting", peripheral.disconnect()).await.err();
            emit(events, TransportEvent::Disconnected { peripheral: id, error }).await;
        });
    }

    fn discover_services(&mut self, id: &PeripheralId, services: &[Uuid]) {
        let id = id.clone();
        let wanted = services.to_vec();
        let events = self.events.clone();
        let Some(peripheral) = self.peripheral(&id) else {
            let error = Some(String::from("unknown peripheral"));
            spawn(emit(events, TransportEvent::ServicesDiscovered { peripheral: id, services: vec![], error }));
            return;
        };

        spawn(async move {
            let event = match with_deadline(DISCOVERY_DEADLINE, "Discovering services", peripheral.discover_services()).await {
                Ok(()) => {
                    let services = peripheral
                        .services()
                        .iter()
                        .map(|service| service.uuid)
                        .filter(|uuid| wanted.is_empty() || wanted.contains(uuid))
                        .collect();
                    TransportEvent::ServicesDiscovered { peripheral: id, services, error: None }
                },
                Err(error) => TransportEvent::ServicesDiscovered { peripheral: id, services: vec![], error: Some(error) },
            };

            emit(events, event).await;
        });
    }

    fn discover_characteristics(&mut self, id: &PeripheralId, service: Uuid, characteristics: &[Uuid]) {
        // btleplug discovers characteristics together with the services
        let wanted = characteristics.to_vec();
        let (characteristics, error) = match self.peripheral(id) {
            None => (vec![], Some(String::from("unknown peripheral"))),
            Some(peripheral) => match peripheral.services().into_iter().find(|s| s.uuid == service) {
                None => (vec![], Some(format!("service {} not found", service))),
                Some(found) => {
                    let characteristics = found
                        .characteristics
                        .iter()
                        .map(|characteristic| characteristic.uuid)
                        .filter(|uuid| wanted.is_empty() || wanted.contains(uuid))
                        .collect();
                    (characteristics, None)
                },
            },
        };

        let event = TransportEvent::CharacteristicsDiscovered {
            peripheral: id.clone(),
            service,
            characteristics,
            error,
        };
        spawn(emit(self.events.clone(), event));
    }

    fn set_notify(&mut self, id: &PeripheralId, characteristic: Uuid, enabled: bool) {
        let id = id.clone();
        let events = self.events.clone();
        let peripheral = self.peripheral(&id);

        spawn(async move {
            let target = peripheral.as_ref().and_then(|peripheral| {
                peripheral.characteristics().into_iter().find(|c| c.uuid == characteristic)
            });

            let result = match (peripheral, target) {
                (Some(peripheral), Some(target)) if enabled => {
                    with_deadline(NOTIFY_DEADLINE, "Subscribing", peripheral.subscribe(&target)).await
                },
                (Some(peripheral), Some(target)) => {
                    with_deadline(NOTIFY_DEADLINE, "Unsubscribing", peripheral.unsubscribe(&target)).await
                },
                _ => Err(format!("characteristic {} is not available", characteristic)),
            };

            let event = TransportEvent::NotifyStateChanged {
                peripheral: id,
                characteristic,
                enabled,
                error: result.err(),
            };
            emit(events, event).await;
        });
    }
}

impl Drop for BtleTransport {
    fn drop(&mut self) {
        for (_, connection_cancel) in self.connections.drain() {
            connection_cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use super::*;

    fn disconnect_flag() -> (Arc<AtomicBool>, impl FnOnce() -> futures::future::Ready<Result<(), btleplug::Error>>) {
        let flag = Arc::new(AtomicBool::new(false));
        let set = flag.clone();
        (flag, move || {
            set.store(true, Ordering::SeqCst);
            futures::future::ready(Ok(()))
        })
    }

    #[tokio::test]
    async fn connection_is_reported_when_not_cancelled() {
        let cancel = CancellationToken::new();
        let (disconnected, disconnect) = disconnect_flag();

        let result = connect_unless_cancelled(&cancel, async { Ok::<(), btleplug::Error>(()) }, disconnect).await;

        assert_eq!(result, Some(Ok(())));
        assert!(!disconnected.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn cancelled_attempt_is_dropped() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (disconnected, disconnect) = disconnect_flag();

        let result = connect_unless_cancelled(&cancel, futures::future::pending(), disconnect).await;

        assert_eq!(result, None);
        assert!(disconnected.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn link_that_comes_up_after_a_disconnect_is_closed_again() {
        let cancel = CancellationToken::new();
        let (disconnected, disconnect) = disconnect_flag();
        let connect = {
            let cancel = cancel.clone();
            async move {
                // the session disconnects while the platform is still connecting
                cancel.cancel();
                Ok::<(), btleplug::Error>(())
            }
        };

        let result = connect_unless_cancelled(&cancel, connect, disconnect).await;

        assert_eq!(result, None);
        assert!(disconnected.load(Ordering::SeqCst));
    }
}

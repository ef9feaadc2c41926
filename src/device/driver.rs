use futures::channel::mpsc::{channel, Receiver, Sender};
use futures::channel::oneshot;
use futures::{SinkExt, StreamExt};
use log::{debug, info};
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::device::orientation::{OrientationModel, OrientationSnapshot};
use crate::device::session::GattSessionManager;
use crate::device::sink::SessionEventSink;
use crate::device::transport::{Transport, TransportEvent};
use crate::device::types::{ConnectionState, PeripheralHandle, PeripheralId};
use crate::error::SessionError;

type Reply<T> = oneshot::Sender<T>;

enum Command {
    StartScan(Reply<Result<(), SessionError>>),
    StopScan(Reply<()>),
    Connect(PeripheralId, Reply<Result<(), SessionError>>),
    Disconnect(PeripheralId, Reply<Result<(), SessionError>>),
    SubscribeAll(PeripheralId, Reply<Result<(), SessionError>>),
    UnsubscribeAll(PeripheralId, Reply<Result<(), SessionError>>),
    RegisterSink(Box<dyn SessionEventSink>, Reply<()>),
    State(Reply<ConnectionState>),
    Peripherals(Reply<Vec<PeripheralHandle>>),
}

/// Cloneable command interface to a session running on its own task.
///
/// Commands are applied in order with the transport events, each call resolves as soon as
/// the session accepted or rejected the command.
#[derive(Clone)]
pub struct SessionHandle {
    commands: Sender<Command>,
    orientation: OrientationModel,
}

impl SessionHandle {
    async fn request<R>(&self, make: impl FnOnce(Reply<R>) -> Command) -> Result<R, SessionError> {
        let (reply, response) = oneshot::channel::<R>();
        let mut commands = self.commands.clone();

        commands.send(make(reply)).await.map_err(|_| SessionError::SessionClosed)?;
        response.await.map_err(|_| SessionError::SessionClosed)
    }

    pub async fn start_scan(&self) -> Result<(), SessionError> {
        self.request(Command::StartScan).await?
    }

    pub async fn stop_scan(&self) -> Result<(), SessionError> {
        self.request(Command::StopScan).await
    }

    pub async fn connect(&self, peripheral: &PeripheralId) -> Result<(), SessionError> {
        let peripheral = peripheral.clone();
        self.request(|reply| Command::Connect(peripheral, reply)).await?
    }

    pub async fn disconnect(&self, peripheral: &PeripheralId) -> Result<(), SessionError> {
        let peripheral = peripheral.clone();
        self.request(|reply| Command::Disconnect(peripheral, reply)).await?
    }

    pub async fn subscribe_all(&self, peripheral: &PeripheralId) -> Result<(), SessionError> {
        let peripheral = peripheral.clone();
        self.request(|reply| Command::SubscribeAll(peripheral, reply)).await?
    }

    pub async fn unsubscribe_all(&self, peripheral: &PeripheralId) -> Result<(), SessionError> {
        let peripheral = peripheral.clone();
        self.request(|reply| Command::UnsubscribeAll(peripheral, reply)).await?
    }

    pub async fn register_sink(&self, sink: Box<dyn SessionEventSink>) -> Result<(), SessionError> {
        self.request(|reply| Command::RegisterSink(sink, reply)).await
    }

    pub async fn state(&self) -> Result<ConnectionState, SessionError> {
        self.request(Command::State).await
    }

    pub async fn peripherals(&self) -> Result<Vec<PeripheralHandle>, SessionError> {
        self.request(Command::Peripherals).await
    }

    /// Reads the orientation without going through the session task.
    pub fn snapshot(&self) -> OrientationSnapshot {
        self.orientation.snapshot()
    }
}

fn apply<T: Transport>(manager: &mut GattSessionManager<T>, command: Command) {
    // a caller that stopped waiting for the reply is not an error
    match command {
        Command::StartScan(reply) => {
            let _ = reply.send(manager.start_scan());
        },
        Command::StopScan(reply) => {
            manager.stop_scan();
            let _ = reply.send(());
        },
        Command::Connect(peripheral, reply) => {
            let _ = reply.send(manager.connect(&peripheral));
        },
        Command::Disconnect(peripheral, reply) => {
            let _ = reply.send(manager.disconnect(&peripheral));
        },
        Command::SubscribeAll(peripheral, reply) => {
            let _ = reply.send(manager.subscribe_all(&peripheral));
        },
        Command::UnsubscribeAll(peripheral, reply) => {
            let _ = reply.send(manager.unsubscribe_all(&peripheral));
        },
        Command::RegisterSink(sink, reply) => {
            manager.register_sink(sink);
            let _ = reply.send(());
        },
        Command::State(reply) => {
            let _ = reply.send(manager.state().clone());
        },
        Command::Peripherals(reply) => {
            let _ = reply.send(manager.peripherals());
        },
    }
}

/// Moves `manager` onto its own task, which serializes transport events and commands.
///
/// The task ends when `cancel` is cancelled, or when every `SessionHandle` is dropped and the
/// transport stopped sending events. It hands the manager back so a caller can inspect it.
pub fn spawn_session<T: Transport + 'static>(
    mut manager: GattSessionManager<T>,
    mut transport_events: Receiver<TransportEvent>,
    cancel: CancellationToken,
) -> (SessionHandle, JoinHandle<GattSessionManager<T>>) {
    let (command_sender, mut command_receiver) = channel::<Command>(16);
    let orientation = manager.orientation();

    let handle = spawn(async move {
        'mainloop: loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    break 'mainloop;
                },
                Some(event) = transport_events.next() => {
                    debug!("Transport event {:?}", event);
                    manager.handle_event(event);
                },
                Some(command) = command_receiver.next() => {
                    apply(&mut manager, command);
                },
                else => break 'mainloop,
            }
        }

        info!("Session task stopped in state {}", manager.state());
        manager
    });

    (SessionHandle { commands: command_sender, orientation }, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::constants::ORIENTATION_SERVICE;
    use crate::device::session::SessionSettings;
    use crate::device::session::tests::{Command as TransportCommand, RecordingTransport};

    #[tokio::test]
    async fn commands_and_events_are_serialized() {
        let manager = GattSessionManager::new(RecordingTransport::default(), SessionSettings::default());
        let (mut events, event_receiver) = channel::<TransportEvent>(8);
        let cancel = CancellationToken::new();
        let (session, handle) = spawn_session(manager, event_receiver, cancel.clone());

        session.start_scan().await.unwrap();
        events.send(TransportEvent::Discovered { peripheral: PeripheralHandle::new("A", "Arduino") }).await.unwrap();

        // events and commands race inside select!, wait until the discovery was applied
        let mut peripherals = session.peripherals().await.unwrap();
        while peripherals.is_empty() {
            tokio::task::yield_now().await;
            peripherals = session.peripherals().await.unwrap();
        }

        assert_eq!(session.state().await.unwrap(), ConnectionState::Discovered);
        assert_eq!(
            session.connect(&PeripheralId::new("B")).await,
            Err(SessionError::UnknownPeripheral { id: String::from("B") }),
        );
        session.connect(&PeripheralId::new("A")).await.unwrap();

        cancel.cancel();
        let manager = handle.await.unwrap();
        assert_eq!(manager.transport().commands, vec![
            TransportCommand::Scan(ORIENTATION_SERVICE),
            TransportCommand::StopScan,
            TransportCommand::Connect(PeripheralId::new("A")),
        ]);

        assert_eq!(session.start_scan().await, Err(SessionError::SessionClosed));
    }
}

use std::path::PathBuf;
use clap::{Parser, ValueEnum};
use futures::channel::mpsc::{channel, Receiver};
use futures::StreamExt;
use log::{info, warn};
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

use crate::config::types::Config;
use crate::device::connection::BtleTransport;
use crate::device::constants::{DISCONNECT_DEADLINE, NOTIFY_DEADLINE, SESSION_EVENT_BUFFER, TRANSPORT_EVENT_BUFFER};
use crate::device::driver::{spawn_session, SessionHandle};
use crate::device::session::{GattSessionManager, SessionSettings};
use crate::device::sink::{ChannelSink, LogSink};
use crate::device::transport::TransportEvent;
use crate::device::types::{ChannelConfiguration, DisconnectReason, PeripheralHandle, SessionEvent};
use crate::error::AppRunError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfigurationArg {
    Gyro,
    YawPitchRoll,
}

impl From<ConfigurationArg> for ChannelConfiguration {
    fn from(arg: ConfigurationArg) -> Self {
        match arg {
            ConfigurationArg::Gyro => ChannelConfiguration::Gyro,
            ConfigurationArg::YawPitchRoll => ChannelConfiguration::YawPitchRoll,
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version)]
#[command(about = "Streams the orientation of an Arduino 101 board over Bluetooth LE.\n\nExample: board-orientation --configuration gyro --device Arduino101", long_about = None)]
pub struct Args {
    /// Path to the config file. Defaults to board-orientation.json next to the executable, or in
    /// the user config directory
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Which characteristics the board firmware exposes
    #[arg(long, value_enum)]
    pub configuration: Option<ConfigurationArg>,

    /// Stop scanning after this many seconds
    #[arg(long)]
    pub scan_timeout: Option<u64>,

    /// Connect to the peripheral with this name or id, instead of the first one found
    #[arg(long)]
    pub device: Option<String>,

    /// Only list the peripherals found during the scan
    #[arg(long)]
    pub list: bool,

    /// Write the effective config to the config file and exit
    #[arg(long)]
    pub write_config: bool,

    /// Log debug output regardless of the configured log level
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Command line options take precedence over the config file.
    pub fn apply_to(&self, config: &mut Config) {
        if let Some(configuration) = self.configuration {
            config.channel_configuration = configuration.into();
        }

        if let Some(scan_timeout) = self.scan_timeout {
            config.scan_timeout_secs = scan_timeout;
        }
    }

    pub fn matches(&self, peripheral: &PeripheralHandle) -> bool {
        match &self.device {
            None => true,
            Some(device) => &peripheral.name == device || peripheral.id.as_str() == device,
        }
    }
}

/// Scans until the timeout, or until a peripheral matching `--device` shows up.
async fn discover(
    args: &Args,
    timeout: Duration,
    session: &SessionHandle,
    events: &mut Receiver<SessionEvent>,
) -> Result<Option<PeripheralHandle>, AppRunError> {
    session.start_scan().await?;
    info!("Scanning for {} seconds...", timeout.as_secs());

    let deadline = sleep(timeout);
    tokio::pin!(deadline);

    let found = 'scan: loop {
        tokio::select! {
            _ = &mut deadline => break 'scan None,
            event = events.next() => match event {
                None => break 'scan None,
                Some(SessionEvent::PeripheralsDiscovered(peripherals)) => {
                    if let Some(peripheral) = peripherals.iter().find(|p| args.matches(p)) {
                        break 'scan Some(peripheral.clone());
                    }
                },
                Some(_) => {},
            },
        }
    };

    // the scan timeout is the caller's job, the session would keep scanning
    session.stop_scan().await?;
    Ok(found)
}

/// Scans for the whole timeout and prints every peripheral that was found.
async fn list(timeout: Duration, session: &SessionHandle) -> Result<(), AppRunError> {
    session.register_sink(Box::new(LogSink)).await?;
    session.start_scan().await?;
    info!("Listing peripherals for {} seconds...", timeout.as_secs());

    sleep(timeout).await;
    session.stop_scan().await?;

    for peripheral in session.peripherals().await? {
        println!("{}\t{}", peripheral.name, peripheral.id);
    }
    Ok(())
}

async fn wait_for_disconnect(target: &PeripheralHandle, events: &mut Receiver<SessionEvent>) {
    let deadline = sleep(Duration::from_millis(DISCONNECT_DEADLINE + NOTIFY_DEADLINE));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                warn!("Disconnecting from {} took too long", target);
                return;
            },
            event = events.next() => match event {
                None => return,
                Some(SessionEvent::Disconnected(peripheral, reason)) if peripheral.id == target.id => {
                    info!("Disconnected from {}: {}", peripheral, reason);
                    return;
                },
                Some(_) => {},
            },
        }
    }
}

/// Connects to `target` and logs its orientation until Ctrl-C or until the session ends.
async fn stream(
    target: PeripheralHandle,
    configuration: ChannelConfiguration,
    session: &SessionHandle,
    events: &mut Receiver<SessionEvent>,
) -> Result<(), AppRunError> {
    session.connect(&target.id).await?;

    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            result = &mut interrupted => {
                if let Err(err) = result {
                    warn!("Failed to listen for Ctrl-C: {}", err);
                }

                info!("Interrupted, disconnecting from {}", target);
                session.disconnect(&target.id).await?;
                wait_for_disconnect(&target, events).await;
                return Ok(());
            },
            event = events.next() => match event {
                None => return Ok(()),
                Some(SessionEvent::CharacteristicsReady(peripheral)) => {
                    session.subscribe_all(&peripheral.id).await?;
                },
                Some(SessionEvent::OrientationUpdated(snapshot)) => {
                    info!("{}", snapshot.display(configuration));
                },
                Some(SessionEvent::Disconnected(peripheral, DisconnectReason::Requested)) => {
                    info!("Disconnected from {}", peripheral);
                    return Ok(());
                },
                Some(SessionEvent::Disconnected(peripheral, reason)) => {
                    return Err(AppRunError::SessionEnded {
                        peripheral: peripheral.to_string(),
                        reason: reason.to_string(),
                    });
                },
                Some(SessionEvent::Connected(peripheral)) => {
                    info!("Connected to {}, waiting for characteristics", peripheral);
                },
                Some(SessionEvent::PeripheralsDiscovered(_)) => {},
            },
        }
    }
}

async fn drive(args: &Args, config: &Config, session: &SessionHandle) -> Result<(), AppRunError> {
    if args.list {
        return list(config.scan_timeout(), session).await;
    }

    let (sink, mut events) = ChannelSink::new(SESSION_EVENT_BUFFER);
    session.register_sink(Box::new(sink)).await?;

    match discover(args, config.scan_timeout(), session, &mut events).await? {
        None => Err(AppRunError::NoPeripheralFound),
        Some(target) => stream(target, config.channel_configuration, session, &mut events).await,
    }
}

/// Composition root: owns the transport and the session for the lifetime of the run.
pub async fn run_cli(args: &Args, config: &Config) -> Result<(), AppRunError> {
    let settings = SessionSettings::from_config(config)?;
    info!("Expecting {} characteristics", settings.configuration);

    let cancel = CancellationToken::new();
    let (transport_sender, transport_receiver) = channel::<TransportEvent>(TRANSPORT_EVENT_BUFFER);
    let transport = BtleTransport::new(transport_sender, cancel.clone()).await?;
    let manager = GattSessionManager::new(transport, settings);
    let (session, handle) = spawn_session(manager, transport_receiver, cancel.clone());

    let result = drive(args, config, &session).await;

    cancel.cancel();
    if let Err(err) = handle.await {
        warn!("Session task failed: {}", err);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::types::OrientationChannel;

    #[test]
    fn command_line_overrides_config() {
        let args = Args::parse_from(["board-orientation", "--configuration", "yaw-pitch-roll", "--scan-timeout", "5"]);
        let mut config = Config::default();
        config.characteristic_uuids.insert(OrientationChannel::Yaw, uuid::Uuid::from_u128(1));

        args.apply_to(&mut config);

        assert_eq!(config.channel_configuration, ChannelConfiguration::YawPitchRoll);
        assert_eq!(config.scan_timeout_secs, 5);
        assert_eq!(config.characteristic_uuids.len(), 1);
    }

    #[test]
    fn device_matches_name_or_id() {
        let board = PeripheralHandle::new("hci0/dev_AA", "Arduino101");
        let any = Args::parse_from(["board-orientation"]);
        let by_name = Args::parse_from(["board-orientation", "--device", "Arduino101"]);
        let by_id = Args::parse_from(["board-orientation", "--device", "hci0/dev_AA"]);
        let other = Args::parse_from(["board-orientation", "--device", "Genuino"]);

        assert!(any.matches(&board));
        assert!(by_name.matches(&board));
        assert!(by_id.matches(&board));
        assert!(!other.matches(&board));
    }

    #[test]
    fn configuration_names_follow_clap_conventions() {
        let args = Args::parse_from(["board-orientation", "--configuration", "yaw-pitch-roll", "--list"]);
        assert_eq!(args.configuration, Some(ConfigurationArg::YawPitchRoll));
        assert!(args.list);
    }
}

use std::io;
use std::str::Utf8Error;
use thiserror::Error;
use uuid::Uuid;
use btleplug;
use serde_json;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to determine path to config file")]
    NoConfigPath,

    #[error("Failed to acquire file lock on config file: {source}")]
    CanNotLock { source: io::Error },

    #[error("Failed to encode/decode config as utf-8: {source}")]
    Utf8Error { #[from] source: Utf8Error },

    #[error("Failed to read/write config file: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse/build config file: {source}")]
    JsonError { #[from] source: serde_json::Error },

    #[error("Characteristic {uuid} is mapped to more than one channel")]
    DuplicateCharacteristic { uuid: Uuid },

    #[error("hundredthsPerDegree must be a positive number, got {value}")]
    InvalidUnitScale { value: f32 },
}

impl ConfigError {
    pub fn is_file_not_found_error(&self) -> bool {
        match self {
            ConfigError::IOError { source } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Caller misuse of the session. Returned synchronously, the session state is left untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Peripheral {id} was not found by the last scan")]
    UnknownPeripheral { id: String },

    #[error("Can not {operation} while the session is {state}")]
    InvalidState { operation: &'static str, state: String },

    #[error("Characteristics of peripheral {id} have not been discovered yet")]
    CharacteristicsNotReady { id: String },

    #[error("The session has been shut down")]
    SessionClosed,
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Error communicating with device (btleplug): {source}")]
    Btle { #[from] source: btleplug::Error },

    #[error("No bluetooth adapter is available")]
    NoAdapter,
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start application (config): {source}")]
    ConfigError { #[from] source: ConfigError },

    #[error("Failed to start application (bluetooth): {source}")]
    DeviceError { #[from] source: DeviceError },

    #[error("Session command was rejected: {source}")]
    SessionError { #[from] source: SessionError },

    #[error("Failed to start application (io): {source}")]
    IOError { #[from] source: io::Error },

    #[error("Session with {peripheral} ended: {reason}")]
    SessionEnded { peripheral: String, reason: String },

    #[error("No matching peripheral was found before the scan timed out")]
    NoPeripheralFound,
}

use std::io;
use std::str::Utf8Error;
use std::sync::Arc;
use thiserror::Error;
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
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start application (config): {source}")]
    ConfigError { #[from] source: ConfigError },

    #[error("Failed to start application (runtime): {source}")]
    Runtime { #[from] source: io::Error },
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Error communicating with device (btleplug): {source}")]
    Btle { #[from] source: btleplug::Error },

    #[error("The serial bluetooth service is not available")]
    MissingService,

    #[error("A required bluetooth characteristic is not available")]
    MissingCharacteristic,

    #[error("The link to the device is closed")]
    LinkClosed,
}

#[derive(Error, Debug, Clone)]
pub enum ConnectError {
    #[error("Bluetooth is not available on this host")]
    UnsupportedPlatform,

    #[error("No device was selected")]
    NoDeviceSelected,

    #[error("Failed to establish a link to the device: {source}")]
    LinkFailure { source: Arc<DeviceError> },

    #[error("The connection attempt was cancelled")]
    Cancelled,

    #[error("The connectivity service has stopped")]
    ServiceStopped,
}

impl From<DeviceError> for ConnectError {
    fn from(source: DeviceError) -> Self {
        ConnectError::LinkFailure { source: Arc::new(source) }
    }
}

impl From<btleplug::Error> for ConnectError {
    fn from(source: btleplug::Error) -> Self {
        DeviceError::from(source).into()
    }
}

#[derive(Error, Debug)]
pub enum SendError {
    #[error("Not connected to a device")]
    NotConnected,

    #[error("Sending to the device took too long")]
    WriteTimeout,

    #[error("Failed to send to the device: {source}")]
    Write { #[from] source: DeviceError },

    #[error("The connectivity service has stopped")]
    ServiceStopped,
}

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("{source}")]
    Send { #[from] source: SendError },

    #[error("The device coordinator has stopped")]
    CoordinatorStopped,
}

#[derive(Error, Debug, PartialEq)]
pub enum TelemetryParseError {
    #[error("Missing field {0} in telemetry record")]
    MissingField(&'static str),

    #[error("Malformed pair {0:?} in telemetry record")]
    MalformedPair(String),

    #[error("Invalid number for {key}: {value:?}")]
    InvalidNumber { key: &'static str, value: String },
}

#[derive(Error, Debug, PartialEq)]
pub enum ConsoleParseError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command {0:?}, type \"help\" for a list")]
    UnknownCommand(String),

    #[error("Missing argument, usage: {0}")]
    MissingArgument(&'static str),

    #[error("Invalid argument {0:?}")]
    InvalidArgument(String),
}

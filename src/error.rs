//! Error types for the gimbal controller.
//!
//! Transport failures are non-fatal: they are reported and the controller
//! keeps its intended state. Configuration errors are fatal at startup,
//! except `UnknownGimbal`, which only rejects a single selection.

use std::path::PathBuf;
use thiserror::Error;

/// Raised when bytes from outside fail frame validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Invalid frame length: expected {expected} bytes but got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Invalid start byte: {0:#04x}")]
    BadStartByte(u8),

    #[error("Checksum mismatch: expected {expected:#04x}, frame carries {actual:#04x}")]
    ChecksumMismatch { expected: u8, actual: u8 },
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to open serial port {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Failed to write to serial port {port}: {source}")]
    Write {
        port: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Device unavailable: {port}")]
    Unavailable { port: String },

    #[error("Frame writer has shut down")]
    Disconnected,

    #[error("Frame writer task failed: {0}")]
    Worker(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Gimbal directory is empty")]
    EmptyDirectory,

    #[error("Unknown gimbal: {0}")]
    UnknownGimbal(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Unknown direction: {0}")]
    UnknownDirection(String),

    #[error("Missing argument for {0}")]
    MissingArgument(&'static str),

    #[error("Invalid number: {0}")]
    InvalidNumber(String),
}

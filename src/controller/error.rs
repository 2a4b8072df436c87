//! Error definitions for the device side.

use crate::sink::SinkError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
    /// Nothing matched after every retry was spent.
    #[error("{what} not found after {attempts} attempts")]
    DeviceNotFound { what: String, attempts: u32 },

    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Another process already holds the device.
    #[error("Failed to grab {path} exclusively: {source}")]
    AcquisitionFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to conceal {path}: {source}")]
    Conceal {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to restore {path}: {source}")]
    Restore {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why a steady-state loop stopped early.
#[derive(Debug, Error)]
pub enum LoopError {
    /// The input source failed; only this loop is affected.
    #[error("Input source failed: {0}")]
    Source(#[from] std::io::Error),

    /// The sink is unusable; the whole daemon shuts down.
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// A blocking read panicked or was aborted.
    #[error("Blocking read did not complete: {0}")]
    Blocking(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("I2C bus error: {0}")]
    Bus(String),

    /// Something other than a BMI160 answered at the address.
    #[error("Unexpected chip id {0:#04x}")]
    UnexpectedChipId(u8),

    #[error("Failed to open I2C bus {path}: {reason}")]
    Open { path: String, reason: String },
}

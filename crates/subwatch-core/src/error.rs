//! SubWatch error types.

use thiserror::Error;

/// Errors surfaced by the reminder engine and its collaborators.
///
/// Expected provider failures are NOT represented here — a channel send
/// reports those as a [`crate::types::SendOutcome`] value. This enum covers
/// configuration, storage, and ledger faults.
#[derive(Debug, Error)]
pub enum SubwatchError {
    /// Channel adapter infrastructure error (building a transport, bad address).
    #[error("Channel error: {0}")]
    Channel(String),

    /// Configuration or preference validation error.
    #[error("Config error: {0}")]
    Config(String),

    /// Subscription or preference store error.
    #[error("Store error: {0}")]
    Store(String),

    /// Reminder ledger read/write error.
    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SubwatchError>;

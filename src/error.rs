use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the materials client and panel operations.
#[derive(Debug, Error)]
pub enum PortalError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The backend answered `success: false`.
    #[error("{0}")]
    Rejected(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Fallback query failed: {0}")]
    Fallback(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Slot {0} is out of range (1-{max})", max = crate::slots::SLOT_COUNT)]
    SlotOutOfRange(usize),

    #[error("No material in slot {0}")]
    EmptySlot(usize),

    #[error("Slot {0} already holds a material")]
    SlotOccupied(usize),

    #[error("Please select a course first")]
    NoCourseSelected,

    #[error("{0}")]
    MissingInput(String),

    #[error("Delete cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PortalError>;

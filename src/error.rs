//! Error handling for splmeter.
//!
//! One enum covers construction-time rejections (duplicate buses, unknown
//! tokens), runtime faults, and controller I/O. End-of-stream is not an
//! error: `Controller::read_block` signals it with `Ok(None)`.

use thiserror::Error;

/// Result type alias for splmeter operations
pub type Result<T> = std::result::Result<T, SlmError>;

/// Main error type for splmeter operations
#[derive(Error, Debug)]
pub enum SlmError {
    /// A bus with this name was already registered on the engine.
    #[error("Bus '{name}' is already registered")]
    DuplicateBus { name: String },

    /// A bus was referenced by a name the engine does not know.
    #[error("No bus named '{name}'")]
    UnknownBus { name: String },

    /// A requirement or stage addition named an identifier that is not in
    /// the registry. The specific request fails; previously satisfied
    /// requirements stay intact.
    #[error("Function '{token}' is not implemented")]
    RequestRejected { token: String },

    /// A stage was evaluated twice for the same block. Fatal: the
    /// topological-order invariant of its bus is broken.
    #[error("Stage '{stage}' was evaluated twice for block {block_index}")]
    ExecutionFault { stage: String, block_index: u64 },

    /// The input file could not be interpreted as audio.
    #[error("Invalid audio file: {reason}")]
    InvalidAudio { reason: String },

    /// The controller was asked to switch files mid-stream.
    #[error("Current stream has not finished")]
    ControllerBusy,

    /// Propagated controller I/O failure. Not retried by the engine.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SlmError {
    /// Get the error code for this error type
    pub fn error_code(&self) -> &'static str {
        match self {
            SlmError::DuplicateBus { .. } => "DUPLICATE_BUS",
            SlmError::UnknownBus { .. } => "UNKNOWN_BUS",
            SlmError::RequestRejected { .. } => "REQUEST_REJECTED",
            SlmError::ExecutionFault { .. } => "EXECUTION_FAULT",
            SlmError::InvalidAudio { .. } => "INVALID_AUDIO",
            SlmError::ControllerBusy => "CONTROLLER_BUSY",
            SlmError::Io(_) => "IO_ERROR",
        }
    }
}

//! Error taxonomy for the player engine.
//!
//! Every fallible public operation returns a [`PlayerError`]; each variant also carries a
//! stable, small, non-zero `errcode` used when notifying the state listener. `0` means
//! "no error" and is never produced by [`PlayerError::errcode`].

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("operation not legal in current state: {0:?}")]
    InvalidState(crate::state::State),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("source open failed ({protocol}): {source}")]
    SourceOpen {
        protocol: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("source read failed: {source}")]
    SourceRead {
        #[source]
        source: anyhow::Error,
    },

    #[error("source seek failed: {source}")]
    SourceSeek {
        #[source]
        source: anyhow::Error,
    },

    #[error("could not parse media: {0}")]
    ParseError(String),

    #[error("decoder error: {0}")]
    DecoderError(String),

    #[error("sink open failed: {source}")]
    SinkOpen {
        #[source]
        source: anyhow::Error,
    },

    #[error("sink write failed: {source}")]
    SinkWrite {
        #[source]
        source: anyhow::Error,
    },

    #[error("out of memory")]
    OutOfMemory,

    /// Internal signal only: a ring buffer was closed while a blocking operation was pending.
    /// Never surfaced to a caller of the control API or the state listener.
    #[error("ring buffer shut down")]
    Shutdown,
}

impl PlayerError {
    /// Stable non-zero error code reported to the state listener alongside `State::Error`.
    ///
    /// `0` is reserved for "no error" and is never returned here.
    #[must_use]
    pub fn errcode(&self) -> i32 {
        match self {
            PlayerError::InvalidState(_) => 1,
            PlayerError::InvalidArgument(_) => 2,
            PlayerError::SourceOpen { .. } => 3,
            PlayerError::SourceRead { .. } => 4,
            PlayerError::SourceSeek { .. } => 5,
            PlayerError::ParseError(_) => 6,
            PlayerError::DecoderError(_) => 7,
            PlayerError::SinkOpen { .. } => 8,
            PlayerError::SinkWrite { .. } => 9,
            PlayerError::OutOfMemory => 10,
            PlayerError::Shutdown => 11,
        }
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;

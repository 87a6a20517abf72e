// SPDX-License-Identifier: GPL-3.0-only
//! Error types for the crate
//!
//! Each layer has its own error enum (`TransportError`, `FrameError`,
//! `EdidError`); `DdcError` is what the public control functions return.
//! Config loading reports its own `ConfigError` before any display is
//! touched. A display declining a control is not an error: it is
//! reported as `ReadResponse::Invalid`.

use thiserror::Error;

use crate::protocols::edid::EdidError;
use crate::session::TransportError;

/// Main error type for control and identity operations
#[derive(Error, Debug)]
pub enum DdcError {
    /// The session cannot be opened or used any more
    #[error("Transport unavailable for display {id}: {source}")]
    TransportUnavailable {
        id: String,
        #[source]
        source: TransportError,
    },

    /// A single transaction failed but the session is still usable
    #[error("Transport error on display {id}: {source}")]
    Transport {
        id: String,
        #[source]
        source: TransportError,
    },

    /// The identity block could not be decoded at all
    #[error("EDID error on display {id}: {source}")]
    Edid {
        id: String,
        #[source]
        source: EdidError,
    },

    /// Display not found in the session registry
    #[error("Display {0} not found")]
    DisplayNotFound(String),

    /// Blocking task join error
    #[error("Task join error: {0}")]
    TaskJoin(String),
}

impl DdcError {
    /// Wrap a transport error, choosing the fatal or transient variant
    pub fn from_transport(id: impl Into<String>, source: TransportError) -> Self {
        let id = id.into();
        if source.is_fatal() {
            DdcError::TransportUnavailable { id, source }
        } else {
            DdcError::Transport { id, source }
        }
    }

    /// Whether the session this error came from should be discarded
    pub fn is_fatal(&self) -> bool {
        matches!(self, DdcError::TransportUnavailable { .. })
    }
}

/// Result type alias for DdcError
pub type Result<T> = std::result::Result<T, DdcError>;

// SPDX-License-Identifier: GPL-3.0-only
//! Transport sessions
//!
//! A [`Session`] is an exclusive handle to one physical display's control
//! channel. Sessions are opened by a [`SessionProvider`] (the device layer)
//! and handed to the VCP engine and EDID reader. Nothing in this module
//! interprets the bytes that cross a session.

mod mock;
mod registry;
mod shared;

#[cfg(all(feature = "i2c-dev", target_os = "linux"))]
pub mod i2c_dev;

pub use mock::{MockDisplay, MockProvider};
pub use registry::SessionRegistry;
pub use shared::SharedSession;

use std::time::Duration;

use thiserror::Error;

use crate::protocols::edid::EDID_BLOCK_LEN;

/// Identifier a session was opened with
pub type DisplayId = String;

/// Errors reported by a session
#[derive(Error, Debug)]
pub enum TransportError {
    /// The session cannot be used any more (device gone, permission revoked)
    #[error("session unavailable: {0}")]
    Unavailable(String),

    /// No reply arrived within the allotted time
    #[error("timed out waiting for reply")]
    Timeout,

    /// The bus did not acknowledge the transfer
    #[error("transfer not acknowledged")]
    Nack,

    /// Other I/O failure on a single transfer
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Fatal errors end the retry loop; everything else is retried
    pub fn is_fatal(&self) -> bool {
        match self {
            TransportError::Unavailable(_) => true,
            TransportError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::NotFound
                    | std::io::ErrorKind::PermissionDenied
                    | std::io::ErrorKind::NotConnected
            ),
            TransportError::Timeout | TransportError::Nack => false,
        }
    }
}

/// Exclusive byte channel to one display
pub trait Session: Send {
    /// Identifier used in logs and errors (bus path, connector name, ...)
    fn id(&self) -> String;

    /// Write one frame to the display's control channel
    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// Read up to `capacity` bytes of reply, giving up after `timeout`
    fn receive(&mut self, capacity: usize, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// Read the 128-byte identity block from the EDID address
    fn read_identity_block(&mut self) -> Result<[u8; EDID_BLOCK_LEN], TransportError>;

    /// Block the calling thread for `duration`
    ///
    /// Simulated sessions override this to record waits instead of sleeping.
    fn delay(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }

    /// One send-then-receive round trip with the reply delay in between
    fn transact(
        &mut self,
        frame: &[u8],
        capacity: usize,
        reply_delay: Duration,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        self.send(frame)?;
        self.delay(reply_delay);
        self.receive(capacity, timeout)
    }
}

impl<S: Session + ?Sized> Session for Box<S> {
    fn id(&self) -> String {
        (**self).id()
    }

    fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        (**self).send(frame)
    }

    fn receive(&mut self, capacity: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        (**self).receive(capacity, timeout)
    }

    fn read_identity_block(&mut self) -> Result<[u8; EDID_BLOCK_LEN], TransportError> {
        (**self).read_identity_block()
    }

    fn delay(&mut self, duration: Duration) {
        (**self).delay(duration)
    }
}

/// Opens and closes sessions for display identifiers
///
/// Implemented by the device layer; this crate ships an i2c-dev provider on
/// Linux and a simulated one for tests.
pub trait SessionProvider: Send + Sync {
    type Session: Session + 'static;

    /// Open an exclusive session to the display named by `display_id`
    fn open_session(&self, display_id: &str) -> crate::error::Result<Self::Session>;

    /// Release a session; the default simply drops it
    fn close_session(&self, session: Self::Session) {
        debug!(display_id = %session.id(), "Closing session");
        drop(session);
    }
}

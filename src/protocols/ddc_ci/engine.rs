// SPDX-License-Identifier: GPL-3.0-only
//! VCP transaction engine
//!
//! Drives one logical read or write over a [`Session`]. Displays are slow and
//! drop commands that arrive too quickly, so every write is followed by a
//! settle delay and every read waits before fetching its reply. Reads are
//! retried; writes are not, since the protocol has no acknowledgment for
//! "set VCP feature".

use std::time::Duration;

use crate::config::TransactionConfig;
use crate::controls::ControlId;
use crate::error::{DdcError, Result};
use crate::session::Session;

use super::frame::{self, FrameError, ReadRequest, ReadResponse, WriteCommand};

/// Runs VCP transactions with a fixed timing policy
#[derive(Debug, Clone, Default)]
pub struct VcpEngine {
    timing: TransactionConfig,
}

impl VcpEngine {
    pub fn new(timing: TransactionConfig) -> Self {
        Self { timing }
    }

    pub fn timing(&self) -> &TransactionConfig {
        &self.timing
    }

    /// Send a "set VCP feature" frame and wait for the display to settle
    ///
    /// The settle delay is observed even when the send reports a transient
    /// error, since the display may still have latched part of the frame.
    pub fn write<S: Session + ?Sized>(&self, session: &mut S, cmd: &WriteCommand) -> Result<()> {
        if !cmd.control_id.spec().access.writable() {
            warn!(control = %cmd.control_id, "Writing a control that is normally read-only");
        }

        let frame = frame::encode_write(cmd);
        let sent = session.send(&frame);

        if let Err(e) = sent {
            if e.is_fatal() {
                error!(display_id = %session.id(), error = %e, "Session unusable during write");
                return Err(DdcError::from_transport(session.id(), e));
            }
            session.delay(self.timing.settle_delay());
            debug!(display_id = %session.id(), control = %cmd.control_id, error = %e, "DDC/CI write failed");
            return Err(DdcError::from_transport(session.id(), e));
        }

        session.delay(self.timing.settle_delay());
        debug!(
            display_id = %session.id(),
            control = %cmd.control_id,
            value = cmd.new_value,
            "Set VCP feature"
        );
        Ok(())
    }

    /// Read a control using the configured timeout and retry count
    pub fn get<S: Session + ?Sized>(&self, session: &mut S, control_id: ControlId) -> Result<ReadResponse> {
        self.read(session, control_id, self.timing.reply_timeout(), self.timing.max_retries)
    }

    /// Request a control's value, retrying invalid replies and transient errors
    ///
    /// Makes at most `max_retries + 1` attempts. Returns the last invalid
    /// response when they are exhausted; only a fatal transport error is an
    /// `Err`. An "unsupported" reply is retried like any other invalid one,
    /// since some displays answer that way while still busy.
    pub fn read<S: Session + ?Sized>(
        &self,
        session: &mut S,
        control_id: ControlId,
        timeout: Duration,
        max_retries: u8,
    ) -> Result<ReadResponse> {
        let request = ReadRequest {
            control_id,
            expected_reply_capacity: self.timing.reply_capacity,
        };
        let frame = frame::encode_read(control_id);
        let attempts = u32::from(max_retries) + 1;
        let mut last = ReadResponse::Invalid(FrameError::NoReply("no attempt made".to_string()));

        for attempt in 1..=attempts {
            let response = match session.transact(
                &frame,
                request.expected_reply_capacity,
                self.timing.reply_delay(),
                timeout,
            ) {
                Ok(raw) => frame::decode_response(&raw, control_id),
                Err(e) if e.is_fatal() => {
                    error!(
                        display_id = %session.id(),
                        control = %control_id,
                        error = %e,
                        "Session unusable during read"
                    );
                    return Err(DdcError::from_transport(session.id(), e));
                }
                Err(e) => ReadResponse::Invalid(FrameError::NoReply(e.to_string())),
            };

            match &response {
                ReadResponse::Valid(value) => {
                    if attempt > 1 {
                        info!(control = %control_id, "DDC/CI read succeeded on attempt {}", attempt);
                    }
                    trace!(control = %control_id, max = value.max_value, current = value.current_value, "Got VCP feature");
                    return Ok(response);
                }
                ReadResponse::Invalid(reason) => {
                    debug!("DDC/CI attempt {}/{} for {} failed: {}", attempt, attempts, control_id, reason);
                }
            }
            last = response;
        }

        warn!(
            display_id = %session.id(),
            control = %control_id,
            "No valid reply after {} attempts",
            attempts
        );
        Ok(last)
    }
}

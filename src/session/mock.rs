// SPDX-License-Identifier: GPL-3.0-only
//! Simulated DDC/CI display for testing.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::controls::ControlId;
use crate::error::{DdcError, Result};
use crate::protocols::ddc_ci::frame::{self, HostCommand, VcpValue};
use crate::protocols::edid::EDID_BLOCK_LEN;

use super::{Session, SessionProvider, TransportError};

type FailureFactory = Arc<dyn Fn() -> TransportError + Send + Sync>;

/// A display that answers DDC/CI frames from an in-memory VCP table
///
/// This allows testing code that depends on [`Session`] without a monitor
/// attached. Delays are recorded instead of slept.
///
/// # Example
///
/// ```
/// use monitor_ddc::{ControlId, MockDisplay, get_control, set_control};
///
/// let mut display = MockDisplay::new("mock-0");
/// display.set_control(ControlId::Brightness, 100, 40);
///
/// set_control(&mut display, ControlId::Brightness, 75).unwrap();
/// let response = get_control(&mut display, ControlId::Brightness).unwrap();
/// assert_eq!(response.current_value(), Some(75));
/// ```
#[derive(Clone)]
pub struct MockDisplay {
    id: String,
    controls: BTreeMap<u8, VcpValue>,
    edid: Option<[u8; EDID_BLOCK_LEN]>,
    pending_reply: Option<Vec<u8>>,
    failure: Option<FailureFactory>,
    silent: bool,
    corrupt_replies: usize,
    busy_replies: usize,
    min_spacing: Option<Duration>,
    since_last_send: Option<Duration>,
    sent: Vec<Vec<u8>>,
    delays: Vec<Duration>,
}

impl MockDisplay {
    /// A display with no controls and no EDID
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            controls: BTreeMap::new(),
            edid: None,
            pending_reply: None,
            failure: None,
            silent: false,
            corrupt_replies: 0,
            busy_replies: 0,
            min_spacing: None,
            since_last_send: None,
            sent: Vec::new(),
            delays: Vec::new(),
        }
    }

    pub fn set_control(&mut self, control: ControlId, max_value: u16, current_value: u16) {
        self.controls.insert(control.code(), VcpValue::new(max_value, current_value));
    }

    pub fn control(&self, control: ControlId) -> Option<VcpValue> {
        self.controls.get(&control.code()).copied()
    }

    pub fn with_edid(mut self, block: [u8; EDID_BLOCK_LEN]) -> Self {
        self.edid = Some(block);
        self
    }

    /// Every send fails with the error produced by `factory`
    pub fn always_fail_with<F>(&mut self, factory: F)
    where
        F: Fn() -> TransportError + Send + Sync + 'static,
    {
        self.failure = Some(Arc::new(factory));
    }

    /// Frames are accepted but no reply ever arrives
    pub fn never_reply(&mut self) {
        self.silent = true;
    }

    /// Flip a bit in the next `count` replies
    pub fn corrupt_next_replies(&mut self, count: usize) {
        self.corrupt_replies = count;
    }

    /// Answer the next `count` reads with the null message
    pub fn busy_for(&mut self, count: usize) {
        self.busy_replies = count;
    }

    /// Drop commands that arrive less than `spacing` after the previous one
    pub fn require_spacing(&mut self, spacing: Duration) {
        self.min_spacing = Some(spacing);
    }

    /// Number of frames the host attempted to send
    pub fn attempts(&self) -> usize {
        self.sent.len()
    }

    pub fn sent_frames(&self) -> &[Vec<u8>] {
        &self.sent
    }

    pub fn delays(&self) -> Vec<Duration> {
        self.delays.clone()
    }

    fn too_soon(&self) -> bool {
        match (self.min_spacing, self.since_last_send) {
            (Some(min), Some(elapsed)) => elapsed < min,
            _ => false,
        }
    }

    fn handle_command(&mut self, raw: &[u8]) {
        let command = match frame::decode_command(raw) {
            Ok(command) => command,
            Err(e) => {
                debug!(display_id = %self.id, error = %e, "Mock display ignoring malformed frame");
                return;
            }
        };

        match command {
            HostCommand::GetVcp { code } => {
                let mut reply = if self.busy_replies > 0 {
                    self.busy_replies -= 1;
                    frame::encode_null_reply()
                } else {
                    frame::encode_reply(code, self.controls.get(&code).copied())
                };
                if self.corrupt_replies > 0 {
                    self.corrupt_replies -= 1;
                    if let Some(last) = reply.last_mut() {
                        *last ^= 0x01;
                    }
                }
                self.pending_reply = Some(reply);
            }
            HostCommand::SetVcp { code, value } => {
                if let Some(entry) = self.controls.get_mut(&code) {
                    entry.current_value = value;
                }
            }
        }
    }
}

impl std::fmt::Debug for MockDisplay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MockDisplay(id: {}, controls: {})", self.id, self.controls.len())
    }
}

impl Session for MockDisplay {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn send(&mut self, raw: &[u8]) -> std::result::Result<(), TransportError> {
        self.sent.push(raw.to_vec());
        if let Some(factory) = &self.failure {
            return Err(factory());
        }

        let dropped = self.too_soon();
        self.since_last_send = Some(Duration::ZERO);
        self.pending_reply = None;

        if dropped {
            debug!(display_id = %self.id, "Mock display dropped a command sent too soon");
        } else if !self.silent {
            self.handle_command(raw);
        }
        Ok(())
    }

    fn receive(
        &mut self,
        capacity: usize,
        _timeout: Duration,
    ) -> std::result::Result<Vec<u8>, TransportError> {
        match self.pending_reply.take() {
            Some(mut reply) => {
                reply.truncate(capacity);
                Ok(reply)
            }
            None => Err(TransportError::Timeout),
        }
    }

    fn read_identity_block(&mut self) -> std::result::Result<[u8; EDID_BLOCK_LEN], TransportError> {
        if let Some(factory) = &self.failure {
            return Err(factory());
        }
        self.edid.ok_or(TransportError::Nack)
    }

    fn delay(&mut self, duration: Duration) {
        self.delays.push(duration);
        if let Some(elapsed) = self.since_last_send.as_mut() {
            *elapsed += duration;
        }
    }
}

/// Opens [`MockDisplay`] sessions from a fixed set of templates
#[derive(Clone, Default)]
pub struct MockProvider {
    displays: HashMap<String, MockDisplay>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_display(mut self, display: MockDisplay) -> Self {
        self.displays.insert(display.id(), display);
        self
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

impl SessionProvider for MockProvider {
    type Session = MockDisplay;

    fn open_session(&self, display_id: &str) -> Result<MockDisplay> {
        let display = self.displays.get(display_id).cloned().ok_or_else(|| {
            DdcError::from_transport(
                display_id,
                TransportError::Unavailable("no such display".to_string()),
            )
        })?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(display)
    }

    fn close_session(&self, session: MockDisplay) {
        self.closed.fetch_add(1, Ordering::SeqCst);
        drop(session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replies_to_get_vcp() {
        let mut display = MockDisplay::new("mock-0");
        display.set_control(ControlId::Brightness, 100, 42);

        display.send(&frame::encode_read(ControlId::Brightness)).unwrap();
        let reply = display.receive(11, Duration::from_millis(10)).unwrap();

        let response = frame::decode_response(&reply, ControlId::Brightness);
        assert_eq!(response.current_value(), Some(42));
    }

    #[test]
    fn test_reply_is_consumed_once() {
        let mut display = MockDisplay::new("mock-0");
        display.set_control(ControlId::Brightness, 100, 42);

        display.send(&frame::encode_read(ControlId::Brightness)).unwrap();
        display.receive(11, Duration::from_millis(10)).unwrap();
        assert!(matches!(
            display.receive(11, Duration::from_millis(10)),
            Err(TransportError::Timeout)
        ));
    }

    #[test]
    fn test_drops_commands_sent_too_soon() {
        let mut display = MockDisplay::new("mock-0");
        display.set_control(ControlId::Brightness, 100, 42);
        display.require_spacing(Duration::from_millis(50));

        let read = frame::encode_read(ControlId::Brightness);
        display.send(&read).unwrap();
        display.send(&read).unwrap();
        assert!(display.receive(11, Duration::from_millis(10)).is_err());

        display.delay(Duration::from_millis(50));
        display.send(&read).unwrap();
        assert!(display.receive(11, Duration::from_millis(10)).is_ok());
    }

    #[test]
    fn test_provider_unknown_display() {
        let provider = MockProvider::new().with_display(MockDisplay::new("known"));

        assert!(provider.open_session("known").is_ok());
        let err = provider.open_session("unknown").unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(provider.opened(), 1);
    }
}

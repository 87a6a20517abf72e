// SPDX-License-Identifier: GPL-3.0-only
//! Session shared between async tasks
//!
//! DDC/CI has no way to tell which request a reply belongs to, so two
//! transactions must never interleave on one display. [`SharedSession`]
//! puts the session behind a `tokio::sync::Mutex` that is held for the
//! whole transaction, including settle and retry delays.
//!
//! The async methods move an owned guard into `spawn_blocking`. If the
//! caller's future is dropped, the blocking task still finishes the
//! transaction before the lock is released.

use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::controls::ControlId;
use crate::error::{DdcError, Result};
use crate::protocols::ddc_ci::{ReadResponse, VcpEngine, WriteCommand};
use crate::protocols::edid::DecodedEdid;

use super::Session;

pub struct SharedSession<S> {
    id: String,
    session: Arc<Mutex<S>>,
    engine: VcpEngine,
}

impl<S> Clone for SharedSession<S> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            session: Arc::clone(&self.session),
            engine: self.engine.clone(),
        }
    }
}

impl<S> std::fmt::Debug for SharedSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SharedSession({})", self.id)
    }
}

impl<S: Session + 'static> SharedSession<S> {
    pub fn new(session: S, engine: VcpEngine) -> Self {
        Self {
            id: session.id(),
            session: Arc::new(Mutex::new(session)),
            engine,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn engine(&self) -> &VcpEngine {
        &self.engine
    }

    /// Hand the session back once no other clone holds it
    pub fn try_into_inner(self) -> std::result::Result<S, Self> {
        match Arc::try_unwrap(self.session) {
            Ok(mutex) => Ok(mutex.into_inner()),
            Err(session) => Err(Self { id: self.id, session, engine: self.engine }),
        }
    }

    pub async fn set_control(&self, control: ControlId, value: u16) -> Result<()> {
        let engine = self.engine.clone();
        let cmd = WriteCommand::new(control, value);
        self.run_locked(move |session| engine.write(session, &cmd)).await
    }

    pub async fn get_control(&self, control: ControlId) -> Result<ReadResponse> {
        let engine = self.engine.clone();
        self.run_locked(move |session| engine.get(session, control)).await
    }

    pub async fn read_edid(&self) -> Result<DecodedEdid> {
        self.run_locked(|session| crate::read_edid(session)).await
    }

    /// Blocking variant for callers outside the runtime
    ///
    /// Panics if called from within an async context, like
    /// [`Mutex::blocking_lock`].
    pub fn blocking_set_control(&self, control: ControlId, value: u16) -> Result<()> {
        let mut session = self.session.blocking_lock();
        self.engine.write(&mut *session, &WriteCommand::new(control, value))
    }

    pub fn blocking_get_control(&self, control: ControlId) -> Result<ReadResponse> {
        let mut session = self.session.blocking_lock();
        self.engine.get(&mut *session, control)
    }

    pub fn blocking_read_edid(&self) -> Result<DecodedEdid> {
        let mut session = self.session.blocking_lock();
        crate::read_edid(&mut *session)
    }

    async fn run_locked<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut S) -> Result<T> + Send + 'static,
    {
        let mut guard: OwnedMutexGuard<S> = Arc::clone(&self.session).lock_owned().await;
        tokio::task::spawn_blocking(move || f(&mut *guard))
            .await
            .map_err(|e| DdcError::TaskJoin(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransactionConfig;
    use crate::protocols::edid::sample_block;
    use crate::session::MockDisplay;

    fn shared(display: MockDisplay) -> SharedSession<MockDisplay> {
        SharedSession::new(display, VcpEngine::new(TransactionConfig::default()))
    }

    #[tokio::test]
    async fn test_async_set_and_get() {
        let mut display = MockDisplay::new("mock-0");
        display.set_control(ControlId::Brightness, 100, 30);
        let session = shared(display);

        session.set_control(ControlId::Brightness, 90).await.unwrap();
        let response = session.get_control(ControlId::Brightness).await.unwrap();

        assert_eq!(response.current_value(), Some(90));
        assert_eq!(session.id(), "mock-0");
    }

    #[tokio::test]
    async fn test_async_read_edid() {
        let session = shared(MockDisplay::new("mock-0").with_edid(sample_block()));

        let edid = session.read_edid().await.unwrap();
        assert!(edid.checksum_ok);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_transactions_do_not_interleave() {
        let mut display = MockDisplay::new("mock-0");
        display.set_control(ControlId::Brightness, 100, 0);
        display.set_control(ControlId::Contrast, 100, 0);
        let session = shared(display);

        let mut tasks = Vec::new();
        for i in 0..8u16 {
            let session = session.clone();
            tasks.push(tokio::spawn(async move {
                let control = if i % 2 == 0 { ControlId::Brightness } else { ControlId::Contrast };
                session.set_control(control, i).await.unwrap();
                session.get_control(control).await.unwrap()
            }));
        }

        for task in tasks {
            assert!(task.await.unwrap().is_valid());
        }

        let display = session.try_into_inner().unwrap();
        // One frame per write and one per read; a retry would add more
        assert_eq!(display.attempts(), 16);
    }

    #[test]
    fn test_blocking_variants() {
        let mut display = MockDisplay::new("mock-0");
        display.set_control(ControlId::Contrast, 100, 10);
        let session = shared(display.with_edid(sample_block()));

        session.blocking_set_control(ControlId::Contrast, 44).unwrap();
        let response = session.blocking_get_control(ControlId::Contrast).unwrap();
        assert_eq!(response.current_value(), Some(44));
        assert!(session.blocking_read_edid().unwrap().checksum_ok);
    }

    #[test]
    fn test_into_inner_refused_while_shared() {
        let session = shared(MockDisplay::new("mock-0"));
        let other = session.clone();

        let session = session.try_into_inner().unwrap_err();
        drop(other);
        assert!(session.try_into_inner().is_ok());
    }
}

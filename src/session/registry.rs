// SPDX-License-Identifier: GPL-3.0-only
//! Session registry
//!
//! Keeps at most one open session per display so that every caller in the
//! process goes through the same lock. Two connections to one monitor would
//! let their DDC/CI transactions interleave, and the display would answer
//! one host's request with the other's reply.
//!
//! # Thread Safety
//!
//! Uses `Arc<RwLock<HashMap>>`:
//! - Lookups take the read lock
//! - Opening and closing take the write lock
//! - The registry itself is `Clone` and cheap to pass between tasks
//!
//! # Usage
//!
//! ```
//! use monitor_ddc::{Config, ControlId, MockDisplay, MockProvider, SessionRegistry};
//!
//! # async fn example() -> monitor_ddc::Result<()> {
//! let mut display = MockDisplay::new("mock-0");
//! display.set_control(ControlId::Brightness, 100, 50);
//! let registry = SessionRegistry::new(MockProvider::new().with_display(display), Config::default());
//!
//! let session = registry.get_or_open("mock-0").await?;
//! session.set_control(ControlId::Brightness, 80).await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::Config;
use crate::error::{DdcError, Result};
use crate::protocols::ddc_ci::VcpEngine;

use super::{DisplayId, SessionProvider, SharedSession};

pub struct SessionRegistry<P: SessionProvider> {
    provider: Arc<P>,
    config: Arc<Config>,
    sessions: Arc<RwLock<HashMap<DisplayId, SharedSession<P::Session>>>>,
}

impl<P: SessionProvider> Clone for SessionRegistry<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            config: Arc::clone(&self.config),
            sessions: Arc::clone(&self.sessions),
        }
    }
}

impl<P: SessionProvider + 'static> SessionRegistry<P> {
    pub fn new(provider: P, config: Config) -> Self {
        Self {
            provider: Arc::new(provider),
            config: Arc::new(config),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get the session for `id`, opening it on first use
    ///
    /// The display's timing overrides from [`Config`] apply to the new
    /// session's engine.
    pub async fn get_or_open(&self, id: &str) -> Result<SharedSession<P::Session>> {
        if let Some(session) = self.get(id).await {
            return Ok(session);
        }

        let mut sessions = self.sessions.write().await;
        // Another task may have opened it while we waited for the write lock
        if let Some(session) = sessions.get(id) {
            return Ok(session.clone());
        }

        let provider = Arc::clone(&self.provider);
        let display_id = id.to_string();
        let session = tokio::task::spawn_blocking(move || provider.open_session(&display_id))
            .await
            .map_err(|e| DdcError::TaskJoin(e.to_string()))??;

        let engine = VcpEngine::new(self.config.transaction_for(id));
        let shared = SharedSession::new(session, engine);
        info!("Display {} added to registry", id);
        sessions.insert(id.to_string(), shared.clone());
        Ok(shared)
    }

    pub async fn get(&self, id: &str) -> Option<SharedSession<P::Session>> {
        let sessions = self.sessions.read().await;
        sessions.get(id).cloned()
    }

    pub async fn get_all_ids(&self) -> Vec<DisplayId> {
        let sessions = self.sessions.read().await;
        sessions.keys().cloned().collect()
    }

    /// Remove a display and release its session through the provider
    ///
    /// Waits for a transaction in progress to finish. If other handles to
    /// the session are still alive, the session is released when the last
    /// of them is dropped instead.
    pub async fn close(&self, id: &str) -> Result<()> {
        let shared = {
            let mut sessions = self.sessions.write().await;
            sessions.remove(id).ok_or_else(|| DdcError::DisplayNotFound(id.to_string()))?
        };
        info!("Display {} removed from registry", id);
        self.release(shared).await
    }

    /// Drop the session after a fatal error so the next use reopens it
    pub async fn forget(&self, id: &str) {
        let removed = {
            let mut sessions = self.sessions.write().await;
            sessions.remove(id)
        };
        if let Some(shared) = removed {
            debug!("Display {} forgotten", id);
            if let Err(e) = self.release(shared).await {
                warn!(display_id = %id, error = %e, "Releasing forgotten session failed");
            }
        }
    }

    async fn release(&self, shared: SharedSession<P::Session>) -> Result<()> {
        match shared.try_into_inner() {
            Ok(session) => {
                let provider = Arc::clone(&self.provider);
                tokio::task::spawn_blocking(move || provider.close_session(session))
                    .await
                    .map_err(|e| DdcError::TaskJoin(e.to_string()))?;
            }
            Err(shared) => {
                warn!(display_id = %shared.id(), "Session still in use, releasing on last drop");
            }
        }
        Ok(())
    }

    pub async fn count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::ControlId;
    use crate::session::{MockDisplay, MockProvider};

    fn provider() -> MockProvider {
        let mut display = MockDisplay::new("mock-0");
        display.set_control(ControlId::Brightness, 100, 50);
        MockProvider::new()
            .with_display(display)
            .with_display(MockDisplay::new("mock-1"))
    }

    #[tokio::test]
    async fn test_open_once_per_display() {
        let provider = provider();
        let registry = SessionRegistry::new(provider.clone(), Config::default());

        let first = registry.get_or_open("mock-0").await.unwrap();
        first.set_control(ControlId::Brightness, 75).await.unwrap();

        let second = registry.get_or_open("mock-0").await.unwrap();
        assert_eq!(second.get_control(ControlId::Brightness).await.unwrap().current_value(), Some(75));
        assert_eq!(provider.opened(), 1);
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_display() {
        let registry = SessionRegistry::new(provider(), Config::default());

        let err = registry.get_or_open("mock-9").await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(registry.count().await, 0);
        assert!(matches!(
            registry.close("mock-9").await,
            Err(DdcError::DisplayNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_close_releases_through_provider() {
        let provider = provider();
        let registry = SessionRegistry::new(provider.clone(), Config::default());

        registry.get_or_open("mock-0").await.unwrap();
        registry.get_or_open("mock-1").await.unwrap();
        let mut ids = registry.get_all_ids().await;
        ids.sort();
        assert_eq!(ids, vec!["mock-0".to_string(), "mock-1".to_string()]);

        registry.close("mock-0").await.unwrap();
        assert_eq!(provider.closed(), 1);
        assert!(registry.get("mock-0").await.is_none());
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn test_per_monitor_timing() {
        let config = Config::from_kdl(
            r#"
            monitor "mock-1" {
                max-retries 7
            }
            "#,
        )
        .unwrap();
        let registry = SessionRegistry::new(provider(), config);

        let tuned = registry.get_or_open("mock-1").await.unwrap();
        let default = registry.get_or_open("mock-0").await.unwrap();

        assert_eq!(tuned.engine().timing().max_retries, 7);
        assert_eq!(default.engine().timing().max_retries, 3);
    }

    #[tokio::test]
    async fn test_forget_reopens() {
        let provider = provider();
        let registry = SessionRegistry::new(provider.clone(), Config::default());

        registry.get_or_open("mock-0").await.unwrap();
        registry.forget("mock-0").await;
        registry.get_or_open("mock-0").await.unwrap();

        assert_eq!(provider.opened(), 2);
        assert_eq!(provider.closed(), 1);
        assert_eq!(registry.count().await, 1);
    }
}

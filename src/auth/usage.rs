//! Background last-used tracking
//!
//! Touches never block the authentication decision. Each one runs as a
//! detached task and any failure is handed to an [`ErrorSink`].

use crate::auth::KeyId;
use crate::storage::{CredentialStore, StoreError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Receives failures from background side effects
pub trait ErrorSink: Send + Sync {
    fn report(&self, key_id: KeyId, error: &StoreError);
}

/// Default sink: log the failure and move on
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, key_id: KeyId, error: &StoreError) {
        tracing::warn!(key_id, error = %error, "Failed to update API key last used timestamp");
    }
}

/// Fire-and-forget writer for `last_used_at`
#[derive(Clone)]
pub struct LastUsedRecorder {
    store: Arc<dyn CredentialStore>,
    sink: Arc<dyn ErrorSink>,
}

impl LastUsedRecorder {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self::with_sink(store, Arc::new(TracingErrorSink))
    }

    pub fn with_sink(store: Arc<dyn CredentialStore>, sink: Arc<dyn ErrorSink>) -> Self {
        Self { store, sink }
    }

    /// Schedule a touch for `key_id` and return immediately
    ///
    /// Callers that may exit before the task runs should await the handle.
    pub fn record(&self, key_id: KeyId, at: DateTime<Utc>) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let sink = Arc::clone(&self.sink);

        tokio::spawn(async move {
            if let Err(e) = store.update_last_used(key_id, at).await {
                sink.report(key_id, &e);
            }
        })
    }
}

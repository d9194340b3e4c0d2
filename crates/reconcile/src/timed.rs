//! Time-bounded store access.

use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use projtrack_db::{CanonicalStore, StoreResult};

use crate::error::ReconcileError;

/// A store handle whose calls are each bounded by a timeout.
///
/// Derefs to the underlying store so call sites read
/// `store.timed("find_sites", store.find_sites(&filter))`.
#[derive(Clone)]
pub struct TimedStore {
    inner: Arc<dyn CanonicalStore>,
    timeout: Duration,
}

impl TimedStore {
    pub fn new(inner: Arc<dyn CanonicalStore>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Await a store future, failing with `StoreTimeout` if it does not
    /// finish in time. The future is dropped on timeout.
    pub async fn timed<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = StoreResult<T>>,
    ) -> Result<T, ReconcileError> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(ReconcileError::from),
            Err(_) => {
                tracing::error!(operation, timeout_ms = self.timeout_ms(), "Store operation timed out");
                Err(ReconcileError::StoreTimeout {
                    operation,
                    timeout_ms: self.timeout_ms(),
                })
            }
        }
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

impl Deref for TimedStore {
    type Target = dyn CanonicalStore;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl std::fmt::Debug for TimedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimedStore")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

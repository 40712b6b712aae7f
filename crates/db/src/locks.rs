use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use tripgate_core::domain::request::RequestId;

/// One async mutex per request id. Decisions on the same request run one at a time inside
/// this process; SQLite's write lock covers other processes.
#[derive(Clone, Default)]
pub struct RequestLocks {
    inner: Arc<Mutex<HashMap<RequestId, Arc<AsyncMutex<()>>>>>,
}

impl RequestLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, request_id: RequestId) -> OwnedMutexGuard<()> {
        let slot = {
            let mut registry = match self.inner.lock() {
                Ok(registry) => registry,
                Err(poisoned) => poisoned.into_inner(),
            };
            // Entries nobody holds or waits on can go.
            registry.retain(|id, slot| *id == request_id || Arc::strong_count(slot) > 1);
            Arc::clone(registry.entry(request_id).or_default())
        };
        slot.lock_owned().await
    }

    pub fn tracked(&self) -> usize {
        match self.inner.lock() {
            Ok(registry) => registry.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

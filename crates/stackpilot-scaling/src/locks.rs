//! Per-stack mutual exclusion for lifecycle operations.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Hands out one async mutex per stack id. Operations on different
/// stacks never contend.
#[derive(Debug, Clone, Default)]
pub struct StackLocks {
    inner: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl StackLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `stack_id`. Released on drop.
    pub async fn acquire(&self, stack_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(stack_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Drop the entry of a stack that no longer exists.
    pub async fn forget(&self, stack_id: &str) {
        self.inner.lock().await.remove(stack_id);
    }
}

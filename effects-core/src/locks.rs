//! Per-actor serialization of hit point and effect mutations.

use crate::actor::ActorId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per actor, created on first use.
#[derive(Debug, Clone, Default)]
pub struct ActorLocks {
    locks: Arc<Mutex<HashMap<ActorId, Arc<Mutex<()>>>>>,
}

impl ActorLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other task is mutating `actor`.
    pub async fn lock(&self, actor: ActorId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Only the map holds an idle entry; held or awaited ones have clones.
            locks.retain(|id, l| *id == actor || Arc::strong_count(l) > 1);
            locks.entry(actor).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of actors with a lock entry.
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

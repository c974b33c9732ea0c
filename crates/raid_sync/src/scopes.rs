//! Per-scope mutual exclusion
//!
//! Read reconciliation is a clear-then-insert sequence; two concurrent
//! operations on the same scope could interleave and leave the cache
//! partially cleared. Every coordinator operation therefore holds the
//! async mutex for its (entity-kind, scope-key) pair for its duration.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Identifies the cache region an operation touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Scope {
    Addresses,
    Users,
    Clubs,
    Raids,
    RacesOf(i64),
    PricesOf(i64),
    Teams,
    TeamsOf(i64),
    RegistrationsOf(i64),
    Queue,
}

#[derive(Default)]
pub(crate) struct ScopeLocks {
    locks: Mutex<HashMap<Scope, Arc<AsyncMutex<()>>>>,
}

impl ScopeLocks {
    /// Acquire the lock for `scope`, creating it on first use
    pub(crate) async fn hold(&self, scope: Scope) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().expect("scope lock table poisoned");
            locks
                .entry(scope)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

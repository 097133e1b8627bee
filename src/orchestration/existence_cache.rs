//! Target existence checks for idempotent mode.
//!
//! Results are cached per object for the run. A task's own object is
//! invalidated as soon as the task has executed, so later checks in the same
//! run go back to the target.

use super::sql_client::{SqlClient, SqlClientResult};
use crate::models::ObjectKey;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Default)]
pub struct ExistenceCache {
    entries: DashMap<ObjectKey, bool>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ExistenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached answer, or a fresh probe through `client`
    pub async fn exists(
        &self,
        key: &ObjectKey,
        client: &dyn SqlClient,
        timeout: Duration,
    ) -> SqlClientResult<bool> {
        if let Some(cached) = self.entries.get(key).map(|e| *e.value()) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(cached);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let present = client.object_exists(key, timeout).await?;
        self.entries.insert(key.clone(), present);
        debug!(object = %key, present, "Existence probed");
        Ok(present)
    }

    /// Cached answer only
    pub fn cached(&self, key: &ObjectKey) -> Option<bool> {
        self.entries.get(key).map(|e| *e.value())
    }

    pub fn invalidate(&self, key: &ObjectKey) {
        if self.entries.remove(key).is_some() {
            debug!(object = %key, "Existence entry invalidated");
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(hits, misses)`
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

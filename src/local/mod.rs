//! Process-Local Adapter
//!
//! Thin pass-through to a [`Segment`] living inside the current process.
//! All adapters over the same segment share its entries, so [`Cache::clear`]
//! is process-wide rather than scoped to one adapter.

mod segment;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::cache::{key, ttl_millis, Cache, Expiration, DEFAULT_TTL};
use crate::error::{CacheError, Result};

pub use segment::{EntryInfo, Segment, SharedSegment, ENABLE_ENV};

// == Local Cache ==
/// Cache adapter over an in-process [`Segment`].
#[derive(Debug)]
pub struct LocalCache<S: Segment = SharedSegment> {
    segment: Arc<S>,
}

impl LocalCache<SharedSegment> {
    // == Constructor ==
    /// Creates an adapter over the process-wide segment.
    pub fn new() -> Result<Self> {
        Self::with_segment(SharedSegment::global())
    }
}

impl<S: Segment> LocalCache<S> {
    /// Creates an adapter over an explicit segment handle.
    ///
    /// Fails when the segment is switched off.
    pub fn with_segment(segment: Arc<S>) -> Result<Self> {
        if !segment.is_enabled() {
            return Err(CacheError::Configuration(format!(
                "process-local cache is not enabled; unset {} or set it to 1",
                ENABLE_ENV
            )));
        }
        Ok(Self { segment })
    }

    fn find_entry(&self, identity: &str) -> Option<EntryInfo> {
        // The segment has no TTL lookup by key, so this walks every entry
        // held by every adapter in the process.
        self.segment
            .info()
            .into_iter()
            .find(|entry| entry.key == identity)
    }
}

impl<S: Segment> Cache for LocalCache<S> {
    // == Set ==
    /// Deletes any previous entry first, since the segment refuses to
    /// overwrite a live key.
    fn set(&mut self, key: &Value, value: &Value, ttl: Option<Duration>) -> Result<()> {
        let identity = key::identity(key)?;
        self.segment.delete(&identity);
        self.segment
            .add(&identity, value.clone(), ttl.unwrap_or(DEFAULT_TTL));
        Ok(())
    }

    fn get(&mut self, key: &Value, default: Value) -> Result<Value> {
        let identity = key::identity(key)?;
        Ok(self.segment.fetch(&identity).unwrap_or(default))
    }

    fn expire(&mut self, key: &Value) -> Result<()> {
        let identity = key::identity(key)?;
        self.segment.delete(&identity);
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.segment.clear();
        Ok(())
    }

    fn exists(&mut self, key: &Value) -> Result<bool> {
        let identity = key::identity(key)?;
        Ok(self.segment.exists(&identity))
    }

    // == Touch ==
    /// Re-inserts the entry with its own TTL (or `ttl` when given).
    ///
    /// Cost is O(n) in the number of entries in the whole segment.
    fn touch(&mut self, key: &Value, ttl: Option<Duration>) -> Result<()> {
        let identity = key::identity(key)?;
        if !self.segment.exists(&identity) {
            return Ok(());
        }

        let Some(entry) = self.find_entry(&identity) else {
            return Ok(());
        };
        let Some(value) = self.segment.fetch(&identity) else {
            return Ok(());
        };

        let ttl = ttl.unwrap_or(entry.ttl);
        self.segment.delete(&identity);
        self.segment.add(&identity, value, ttl);
        debug!(key = %identity, ttl_ms = ttl_millis(ttl), "local entry touched");
        Ok(())
    }

    fn expiration(&mut self, key: &Value) -> Result<Option<Expiration>> {
        let identity = key::identity(key)?;
        if !self.segment.exists(&identity) {
            return Ok(None);
        }
        Ok(self
            .find_entry(&identity)
            .and_then(|entry| entry.expiration()))
    }
}

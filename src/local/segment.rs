//! Shared Segment Module
//!
//! Process-wide key-value store with per-entry TTL, shared by every
//! [`LocalCache`](super::LocalCache) in the process.

use std::collections::HashMap;
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde_json::Value;

use crate::cache::{current_timestamp, ttl_millis, Expiration};

/// Runtime setting that switches the global segment off when set to `0`
pub const ENABLE_ENV: &str = "POLYCACHE_LOCAL_ENABLED";

static GLOBAL: Lazy<Arc<SharedSegment>> = Lazy::new(|| Arc::new(SharedSegment::from_env()));

// == Segment Trait ==
/// Operations of an in-process key-value segment.
///
/// Keys are the identity strings produced by [`crate::cache::key::identity`].
pub trait Segment: Send + Sync {
    /// False when the segment is present but switched off.
    fn is_enabled(&self) -> bool;

    /// Inserts an entry unless a live one already exists for `key`.
    ///
    /// A zero `ttl` never expires. Returns false if nothing was inserted.
    fn add(&self, key: &str, value: Value, ttl: Duration) -> bool;

    /// Returns the live value, `None` when absent or expired.
    fn fetch(&self, key: &str) -> Option<Value>;

    /// Removes an entry. Returns true if one was present.
    fn delete(&self, key: &str) -> bool;

    fn exists(&self, key: &str) -> bool;

    /// Drops every entry in the segment.
    fn clear(&self);

    /// Lists metadata for every entry currently held.
    fn info(&self) -> Vec<EntryInfo>;
}

// == Entry Info ==
/// Metadata of one segment entry as reported by [`Segment::info`].
#[derive(Debug, Clone, PartialEq)]
pub struct EntryInfo {
    /// Identity string of the key
    pub key: String,
    /// TTL the entry was inserted with
    pub ttl: Duration,
    /// Insertion time in Unix seconds
    pub created_at: f64,
}

impl EntryInfo {
    /// Expiry metadata, `None` for entries without a TTL.
    pub fn expiration(&self) -> Option<Expiration> {
        if self.ttl.is_zero() {
            return None;
        }
        Some(Expiration::new(
            self.created_at + self.ttl.as_secs_f64(),
            ttl_millis(self.ttl),
        ))
    }
}

// == Segment Entry ==
#[derive(Debug, Clone)]
struct SegmentEntry {
    value: Value,
    created_at: f64,
    ttl: Duration,
}

impl SegmentEntry {
    fn new(value: Value, ttl: Duration) -> Self {
        Self {
            value,
            created_at: current_timestamp(),
            ttl,
        }
    }

    /// Expired once the full TTL has elapsed; zero TTL never expires.
    fn is_expired(&self) -> bool {
        !self.ttl.is_zero() && current_timestamp() >= self.created_at + self.ttl.as_secs_f64()
    }
}

// == Shared Segment ==
/// In-memory [`Segment`] implementation.
#[derive(Debug)]
pub struct SharedSegment {
    entries: RwLock<HashMap<String, SegmentEntry>>,
    enabled: AtomicBool,
}

impl SharedSegment {
    // == Constructor ==
    /// Creates an empty, enabled segment.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            enabled: AtomicBool::new(true),
        }
    }

    /// Creates an empty segment honoring the `POLYCACHE_LOCAL_ENABLED` setting.
    pub fn from_env() -> Self {
        let segment = Self::new();
        let enabled = env::var(ENABLE_ENV)
            .map(|v| !matches!(v.trim(), "0" | "off" | "false"))
            .unwrap_or(true);
        segment.set_enabled(enabled);
        segment
    }

    /// Returns the segment shared by the whole process.
    pub fn global() -> Arc<SharedSegment> {
        Arc::clone(&GLOBAL)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Number of entries held, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for SharedSegment {
    fn default() -> Self {
        Self::new()
    }
}

impl Segment for SharedSegment {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn add(&self, key: &str, value: Value, ttl: Duration) -> bool {
        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(|entry| !entry.is_expired()) {
            return false;
        }
        entries.insert(key.to_string(), SegmentEntry::new(value, ttl));
        true
    }

    fn fetch(&self, key: &str) -> Option<Value> {
        {
            let entries = self.entries.read();
            match entries.get(key) {
                Some(entry) if !entry.is_expired() => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: drop it unless a writer replaced it since the read
        let mut entries = self.entries.write();
        if entries.get(key).is_some_and(SegmentEntry::is_expired) {
            entries.remove(key);
        }
        None
    }

    fn delete(&self, key: &str) -> bool {
        self.entries.write().remove(key).is_some()
    }

    fn exists(&self, key: &str) -> bool {
        self.entries
            .read()
            .get(key)
            .is_some_and(|entry| !entry.is_expired())
    }

    fn clear(&self) {
        self.entries.write().clear();
    }

    fn info(&self) -> Vec<EntryInfo> {
        self.entries
            .read()
            .iter()
            .map(|(key, entry)| EntryInfo {
                key: key.clone(),
                ttl: entry.ttl,
                created_at: entry.created_at,
            })
            .collect()
    }
}

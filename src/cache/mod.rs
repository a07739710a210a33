//! Cache Module
//!
//! The contract every backend adapter implements, plus the key and
//! expiration types shared between them.

mod expiration;
pub mod key;


use std::time::Duration;

use serde_json::Value;

use crate::error::Result;

// Re-export public types
pub use expiration::{current_timestamp, ttl_millis, Expiration};

// == Public Constants ==
/// TTL applied when a caller passes `None` (5 minutes)
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

// == Cache Contract ==
/// Uniform cache operations over interchangeable storage backends.
///
/// Keys must be non-empty strings or non-empty arrays/objects; every
/// operation taking a key fails with [`CacheError::InvalidKey`] otherwise.
///
/// [`CacheError::InvalidKey`]: crate::error::CacheError::InvalidKey
pub trait Cache {
    /// Stores `value` under `key`, replacing any previous entry.
    ///
    /// `None` selects [`DEFAULT_TTL`].
    ///
    /// A zero TTL is passed through to the backend as is, and backends
    /// read it differently: the process-local segment keeps the entry
    /// without expiry, the filesystem writes an artifact that is already
    /// expired, and the network backend sends `PEXPIRE key 0`, which
    /// removes the key on the server.
    fn set(&mut self, key: &Value, value: &Value, ttl: Option<Duration>) -> Result<()>;

    /// Returns the live value for `key`, or `default` on a miss.
    fn get(&mut self, key: &Value, default: Value) -> Result<Value>;

    /// Removes the entry for `key`. Missing keys are not an error.
    fn expire(&mut self, key: &Value) -> Result<()>;

    /// Removes every entry the backend holds.
    fn clear(&mut self) -> Result<()>;

    /// True if a live entry exists for `key`.
    fn exists(&mut self, key: &Value) -> Result<bool>;

    /// Restarts the lifetime of a live entry. No-op for missing keys.
    fn touch(&mut self, key: &Value, ttl: Option<Duration>) -> Result<()>;

    /// Returns the expiry metadata of a live entry.
    fn expiration(&mut self, key: &Value) -> Result<Option<Expiration>>;
}

impl<C: Cache + ?Sized> Cache for Box<C> {
    fn set(&mut self, key: &Value, value: &Value, ttl: Option<Duration>) -> Result<()> {
        (**self).set(key, value, ttl)
    }

    fn get(&mut self, key: &Value, default: Value) -> Result<Value> {
        (**self).get(key, default)
    }

    fn expire(&mut self, key: &Value) -> Result<()> {
        (**self).expire(key)
    }

    fn clear(&mut self) -> Result<()> {
        (**self).clear()
    }

    fn exists(&mut self, key: &Value) -> Result<bool> {
        (**self).exists(key)
    }

    fn touch(&mut self, key: &Value, ttl: Option<Duration>) -> Result<()> {
        (**self).touch(key, ttl)
    }

    fn expiration(&mut self, key: &Value) -> Result<Option<Expiration>> {
        (**self).expiration(key)
    }
}

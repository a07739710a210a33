//! Polycache - A uniform TTL cache facade
//!
//! Identical set/get/expire/clear/exists semantics over a process-local
//! store, a filesystem directory and a RESP key-value server.

pub mod cache;
pub mod config;
pub mod error;
pub mod filesystem;
pub mod local;
pub mod network;

pub use cache::{Cache, Expiration, DEFAULT_TTL};
pub use config::{Backend, Config};
pub use error::{CacheError, Result};
pub use filesystem::FileCache;
pub use local::LocalCache;
pub use network::{NetworkCache, NetworkConfig};

//! Filesystem Adapter
//!
//! Stores one artifact per key in a directory. The artifact name carries
//! the requested TTL and the absolute expiry instant, so expiry checks never
//! open the file.
//!
//! Expired artifacts are swept by probabilistic garbage collection: each
//! `set`/`get` runs [`FileCache::clear_expired`] with probability `1/p`.
//! Collection timing is therefore not guaranteed. No locking is done around
//! lookup, delete and create; concurrent writers on one key may observe
//! duplicate artifacts or lose a write.

mod file;
pub mod naming;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{current_timestamp, key, ttl_millis, Cache, Expiration, DEFAULT_TTL};
use crate::error::{CacheError, Result};

pub use file::CacheFile;

// == Public Constants ==
/// Default artifact extension
pub const DEFAULT_EXTENSION: &str = ".cache";

/// Default garbage collection probability denominator
pub const DEFAULT_PROBABILITY: u32 = 5;

// == File Cache ==
/// Cache adapter storing artifacts in a directory.
pub struct FileCache {
    /// Cache directory
    directory: PathBuf,
    /// Artifact extension, always with a leading dot
    extension: String,
    /// Garbage collection runs with probability 1/probability; 0 disables it
    probability: u32,
    /// Random source for the collection draw
    rng: Box<dyn RngCore + Send>,
}

impl FileCache {
    // == Constructor ==
    /// Creates an adapter over `directory`.
    ///
    /// Fails if the directory is missing, unreadable or not writable.
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        check_directory(&directory)?;

        Ok(Self {
            directory,
            extension: DEFAULT_EXTENSION.to_string(),
            probability: DEFAULT_PROBABILITY,
            rng: Box::new(StdRng::from_entropy()),
        })
    }

    /// Sets the artifact extension, with or without leading dot.
    pub fn with_extension(mut self, extension: &str) -> Self {
        self.extension = format!(".{}", extension.trim_start_matches('.'));
        self
    }

    /// Sets the collection probability denominator. `0` disables collection.
    pub fn with_probability(mut self, probability: u32) -> Self {
        self.probability = probability;
        self
    }

    /// Replaces the random source used for the collection draw.
    pub fn with_rng(mut self, rng: impl RngCore + Send + 'static) -> Self {
        self.rng = Box::new(rng);
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    // == Clear Expired ==
    /// Deletes every artifact whose expiry instant has passed.
    ///
    /// Returns the number of artifacts removed.
    pub fn clear_expired(&mut self) -> Result<usize> {
        let now = current_timestamp();
        let mut removed = 0;

        for file in self.artifacts()? {
            if naming::parse_name(&file.name()).time() <= now {
                file.delete()?;
                removed += 1;
            }
        }

        debug!(removed, directory = %self.directory.display(), "expired artifacts cleared");
        Ok(removed)
    }

    // == Garbage Collection ==
    fn garbage(&mut self) -> Result<()> {
        if self.probability == 0 {
            return Ok(());
        }
        if self.rng.gen_range(1..=self.probability) == 1 {
            self.clear_expired()?;
        }
        Ok(())
    }

    /// Lists every artifact in the directory, any extension.
    fn artifacts(&self) -> Result<Vec<CacheFile>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.directory)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            files.push(CacheFile::new(entry.path()));
        }
        files.sort_by(|a, b| a.path().cmp(b.path()));
        Ok(files)
    }

    /// Finds the artifacts stored for `key`.
    fn lookup(&self, key: &Value) -> Result<Vec<CacheFile>> {
        let hash = key::digest(key)?;
        let matcher = naming::matcher(&hash, &self.extension)?;
        Ok(self
            .artifacts()?
            .into_iter()
            .filter(|file| matcher.is_match(file.name()))
            .collect())
    }

    /// Returns the first artifact for `key` if it is still live.
    ///
    /// An expired artifact is deleted and reported as missing.
    fn live_artifact(&self, key: &Value) -> Result<Option<(CacheFile, Expiration)>> {
        let Some(file) = self.lookup(key)?.into_iter().next() else {
            return Ok(None);
        };

        let expiration = naming::parse_name(&file.name());
        if expiration.is_live() {
            return Ok(Some((file, expiration)));
        }

        if let Err(e) = file.delete() {
            warn!(path = %file.path().display(), error = %e, "failed to delete stale artifact");
        }
        Ok(None)
    }

    fn create_artifact(&self, hash: &str, value: &Value, ttl_ms: u64) -> Result<()> {
        let name = naming::generate_name(hash, ttl_ms, &self.extension);
        let file = CacheFile::new(self.directory.join(name));
        file.create()?;
        file.append(&serde_json::to_vec(value)?)?;
        Ok(())
    }
}

impl fmt::Debug for FileCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileCache")
            .field("directory", &self.directory)
            .field("extension", &self.extension)
            .field("probability", &self.probability)
            .finish_non_exhaustive()
    }
}

impl Cache for FileCache {
    // == Set ==
    fn set(&mut self, key: &Value, value: &Value, ttl: Option<Duration>) -> Result<()> {
        let hash = key::digest(key)?;
        self.garbage()?;

        for file in self.lookup(key)? {
            file.delete()?;
        }

        self.create_artifact(&hash, value, ttl_millis(ttl.unwrap_or(DEFAULT_TTL)))
    }

    // == Get ==
    fn get(&mut self, key: &Value, default: Value) -> Result<Value> {
        key::validate(key)?;
        self.garbage()?;

        let Some((file, _)) = self.live_artifact(key)? else {
            return Ok(default);
        };

        match file.content()? {
            Some(bytes) if !bytes.is_empty() => Ok(serde_json::from_slice(&bytes)?),
            _ => {
                // Deleted or not yet written by a concurrent caller
                debug!(path = %file.path().display(), "artifact vanished or empty");
                Ok(default)
            }
        }
    }

    fn expire(&mut self, key: &Value) -> Result<()> {
        for file in self.lookup(key)? {
            file.delete()?;
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        for file in self.artifacts()? {
            file.delete()?;
        }
        Ok(())
    }

    fn exists(&mut self, key: &Value) -> Result<bool> {
        Ok(self.live_artifact(key)?.is_some())
    }

    // == Touch ==
    /// Renames the artifact to a fresh expiry. Content is left untouched.
    ///
    /// Without `ttl` the artifact's own requested TTL is reused.
    fn touch(&mut self, key: &Value, ttl: Option<Duration>) -> Result<()> {
        let hash = key::digest(key)?;
        let Some((mut file, expiration)) = self.live_artifact(key)? else {
            return Ok(());
        };

        let ttl_ms = ttl.map(ttl_millis).unwrap_or(expiration.expiration());
        file.rename(&naming::generate_name(&hash, ttl_ms, &self.extension))?;
        Ok(())
    }

    /// Same lookup as `get`, without garbage collection.
    fn expiration(&mut self, key: &Value) -> Result<Option<Expiration>> {
        Ok(self.live_artifact(key)?.map(|(_, expiration)| expiration))
    }
}

/// Verifies the directory exists and can be listed and written to.
fn check_directory(directory: &Path) -> Result<()> {
    let metadata = fs::metadata(directory).map_err(|e| {
        CacheError::Configuration(format!(
            "Cache folder \"{}\" is not accessible: {e}",
            directory.display()
        ))
    })?;
    if !metadata.is_dir() {
        return Err(CacheError::Configuration(format!(
            "Cache folder \"{}\" is not a directory",
            directory.display()
        )));
    }

    fs::read_dir(directory).map_err(|_| {
        CacheError::Configuration(format!(
            "Cache folder \"{}\" is not readable",
            directory.display()
        ))
    })?;

    let probe = CacheFile::new(directory.join(format!(".polycache-probe-{}", std::process::id())));
    probe
        .create()
        .and_then(|()| probe.delete())
        .map_err(|_| {
            CacheError::Configuration(format!(
                "Cache folder \"{}\" is not writable",
                directory.display()
            ))
        })
}

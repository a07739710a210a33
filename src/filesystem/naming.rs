//! Artifact Naming Module
//!
//! Encodes TTL metadata into artifact file names:
//! `<hash>-<ttl ms>-<expiry unix seconds><extension>`.
//! The wildcard form `<hash>-*-*<extension>` is only ever used as a lookup
//! pattern.

use globset::{Glob, GlobMatcher};

use crate::cache::{current_timestamp, Expiration};
use crate::error::{CacheError, Result};

/// Placeholder for the ttl and expiry segments in lookup patterns
pub const WILDCARD: &str = "*";

const SEPARATOR: char = '-';

// == Generate Name ==
/// Builds the concrete artifact name for a TTL starting now.
pub fn generate_name(hash: &str, ttl_ms: u64, extension: &str) -> String {
    artifact_name(hash, ttl_ms, current_timestamp() + ttl_ms as f64 / 1000.0, extension)
}

/// Builds an artifact name from explicit metadata.
pub fn artifact_name(hash: &str, ttl_ms: u64, expires_at: f64, extension: &str) -> String {
    format!("{hash}{SEPARATOR}{ttl_ms}{SEPARATOR}{expires_at}{extension}")
}

/// Builds the lookup pattern matching any artifact of `hash`.
pub fn wildcard_name(hash: &str, extension: &str) -> String {
    format!("{hash}{SEPARATOR}{WILDCARD}{SEPARATOR}{WILDCARD}{extension}")
}

// == Matcher ==
/// Compiles the lookup pattern for `hash` into a glob matcher.
///
/// Glob metacharacters in the extension are matched literally.
pub fn matcher(hash: &str, extension: &str) -> Result<GlobMatcher> {
    let pattern = wildcard_name(hash, &escape_literal(extension));
    Glob::new(&pattern)
        .map(|glob| glob.compile_matcher())
        .map_err(|e| CacheError::Configuration(format!("invalid artifact pattern: {e}")))
}

fn escape_literal(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '*' | '?' | '[' | ']' | '{' | '}' => {
                escaped.push('[');
                escaped.push(c);
                escaped.push(']');
            }
            _ => escaped.push(c),
        }
    }
    escaped
}

// == Parse Name ==
/// Decodes the expiration carried by an artifact name.
///
/// Names with fewer than three segments decode to the zero expiration.
/// Unparseable segments decode to zero as well.
pub fn parse_name(name: &str) -> Expiration {
    let segments: Vec<&str> = name.split(SEPARATOR).collect();
    if segments.len() < 3 {
        return Expiration::default();
    }
    let ttl = segments[1].parse::<u64>().unwrap_or(0);
    let time = leading_float(segments[2]);
    Expiration::new(time, ttl)
}

/// Parses the numeric prefix of `text`, e.g. `1700000000.25` out of
/// `1700000000.25.cache`.
fn leading_float(text: &str) -> f64 {
    let mut end = 0;
    let mut seen_dot = false;
    for (i, c) in text.char_indices() {
        match c {
            '0'..='9' => end = i + 1,
            '.' if !seen_dot => seen_dot = true,
            _ => break,
        }
    }
    text[..end].parse::<f64>().unwrap_or(0.0)
}

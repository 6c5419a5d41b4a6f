//! Canonical cache-key construction.
//!
//! Two requests that differ only in symbol order or option insertion order
//! must land on the same key, or the cache silently fragments. The builder
//! therefore sorts everything it hashes and bounds the final key length for
//! storage backends with key-size limits.

use std::fmt;

use crate::request::CacheRequest;

/// Default key-length cap, sized for Redis-style backends.
pub const DEFAULT_MAX_KEY_LEN: usize = 250;

/// Hex digits of the md5 digest appended when a key is truncated.
const DIGEST_LEN: usize = 8;

/// Opaque, deterministic cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub struct CacheKeyBuilder {
    max_len: usize,
}

impl Default for CacheKeyBuilder {
    fn default() -> Self {
        Self {
            max_len: DEFAULT_MAX_KEY_LEN,
        }
    }
}

impl CacheKeyBuilder {
    /// `max_len` below the truncation overhead is clamped up; a cap that
    /// cannot even hold the digest suffix would produce colliding keys.
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len: max_len.max(DIGEST_LEN * 2),
        }
    }

    /// Build the canonical key for a request.
    ///
    /// Layout: `query_type:symbols:provider:market[:options]`, where
    /// symbols are uppercase-trimmed, sorted, deduplicated and
    /// comma-joined, and options are `k=v` pairs joined with `&` in key
    /// order (the request's `BTreeMap` already sorts them).
    pub fn build(&self, req: &CacheRequest) -> CacheKey {
        let mut symbols: Vec<String> = req
            .symbols
            .iter()
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        symbols.sort();
        symbols.dedup();

        let mut key = format!(
            "{}:{}:{}:{}",
            req.query_type,
            symbols.join(","),
            req.provider,
            req.market.as_deref().unwrap_or("-"),
        );

        if !req.options.is_empty() {
            let opts: Vec<String> = req
                .options
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            key.push(':');
            key.push_str(&opts.join("&"));
        }

        if key.chars().count() > self.max_len {
            let digest = format!("{:x}", md5::compute(key.as_bytes()));
            let keep = self.max_len - DIGEST_LEN - 1;
            let prefix: String = key.chars().take(keep).collect();
            key = format!("{}:{}", prefix, &digest[..DIGEST_LEN]);
        }

        CacheKey(key)
    }
}

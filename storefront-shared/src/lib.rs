//! # Storefront Shared Library
//!
//! Store-backed building blocks used by the storefront API edge: a fixed-window
//! rate limiter and a TTL-bound response cache, both running on one injected
//! key-value store handle.
//!
//! ## Module Organization
//!
//! - `kv`: Key-value store trait, Redis client and in-memory store
//! - `rate_limit`: Per-client, per-route fixed-window request counting
//! - `cache`: Response cache, read-through helper and cache key scheme

pub mod cache;
pub mod kv;
pub mod rate_limit;

/// Current version of the storefront shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! Cache key derivation and storage adapters for Forge.

pub mod archive;
pub mod keys;
pub mod store;

pub use archive::{CompressionKind, pack, unpack};
pub use keys::{manifest_key, manifest_key_for_paths, matches_prefix, sanitize_key};
pub use store::{FsCacheStore, MemoryCacheStore};

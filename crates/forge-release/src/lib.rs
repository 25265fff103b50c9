//! Release packaging and publishing for Forge.
//!
//! The terminal phase of a run: collect named artifacts, apply per-platform
//! packaging rules, and publish the complete bundle to an external target.
//! Publishing is all-or-nothing; a missing required platform package fails
//! the release before the target is ever invoked.

pub mod package;
pub mod publisher;
pub mod target;

pub use package::package;
pub use publisher::ReleasePublisher;
pub use target::{DirTarget, HttpTarget};

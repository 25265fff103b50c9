//! Command execution adapter for Forge.

pub mod executor;

pub use executor::ShellExecutor;

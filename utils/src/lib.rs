//! Shared infrastructure utilities for Syntest.
//!
//! Cross-cutting helpers that don't belong in the domain-pure `syntest-types` crate:
//!
//! - **`atomic_write`**: Crash-safe file persistence (temp + rename) used for the
//!   pending submission queue.

pub mod atomic_write;

pub use atomic_write::{SyncPolicy, atomic_write, atomic_write_with, recover_bak_file};

//! Shared test utilities for Raidlink test suites
//!
//! This crate provides common testing utilities to eliminate code
//! duplication across test suites and ensure consistent test
//! environments.
//!
//! # Modules
//!
//! - [`remote`]: Scripted in-memory [`raid_remote::Remote`] double
//! - [`fixtures`]: Entity builders with sensible defaults
//! - [`store`]: Pre-seeded in-memory and on-disk stores
//! - [`logging`]: Test logging configuration
//!
//! # Example
//!
//! ```rust
//! use raid_test_helpers::prelude::*;
//!
//! fn my_test() {
//!     let store = seeded_store();
//!     let remote = ScriptedRemote::offline();
//!     // Drive a coordinator against a cache that already holds
//!     // the standard fixture rows.
//! }
//! ```

pub mod fixtures;
pub mod logging;
pub mod remote;
pub mod store;

pub use remote::{RecordedCall, ScriptedRemote};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::logging::{init_test_logging, suppress_logs};
    pub use crate::remote::{RecordedCall, ScriptedRemote};
    pub use crate::store::{memory_store, seeded_store};
}

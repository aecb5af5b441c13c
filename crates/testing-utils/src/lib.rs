//! # Scheduler Testing Utils
//!
//! Shared testing utilities for the job scheduler workspace.
//! This crate provides in-memory repositories, a recording trigger engine,
//! job handlers and test data builders that can be used across all other
//! crates in the workspace.
//!
//! ## Usage
//!
//! Add this crate as a dev-dependency:
//!
//! ```toml
//! [dev-dependencies]
//! scheduler-testing-utils = { path = "../testing-utils" }
//! ```
//!
//! Then use the mocks in your tests:
//!
//! ```rust
//! use scheduler_testing_utils::{MockJobRepository, MockTriggerEngine, JobSpecBuilder};
//! ```

pub mod builders;
pub mod mocks;

// Re-export commonly used items
pub use builders::*;
pub use mocks::*;

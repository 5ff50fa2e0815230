//! Test utilities for datawarden.
//!
//! In-memory doubles for the filesystem and metadata store, with fault
//! injection, plus a builder for test configurations.
//!
//! # Feature Flag
//!
//! This module is only available when the `testing` feature is enabled or during tests:
//!
//! ```toml
//! [dev-dependencies]
//! common = { path = "../common", features = ["testing"] }
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use common::testing::{MemoryFileSystem, TestConfigBuilder};
//!
//! let fs = MemoryFileSystem::new();
//! fs.add_file("/repo/source=netflow/year=2024/f.avro", 1 << 30, Utc::now());
//!
//! let config = TestConfigBuilder::new().in_memory().with_dry_run(false).build();
//! ```

mod config_builder;
mod memory;

pub use config_builder::TestConfigBuilder;
pub use memory::{MemoryFileSystem, MemoryMetadataStore};

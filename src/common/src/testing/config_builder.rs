//! Test configuration builder for creating test setups quickly.

use std::path::Path;
use std::time::Duration;

use crate::config::{AgedDirConfig, Configuration, FilesystemBackend, MetadataConfig};

/// Builder for creating test configurations.
///
/// # Example
///
/// ```rust,ignore
/// use common::testing::TestConfigBuilder;
///
/// let config = TestConfigBuilder::new()
///     .in_memory()
///     .with_filesystem_root(temp.path())
///     .with_dry_run(false)
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct TestConfigBuilder {
    config: Configuration,
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestConfigBuilder {
    /// Defaults with an in-memory archive store.
    pub fn new() -> Self {
        let mut config = Configuration::default();
        config.archive.dsn = "memory://".to_string();
        Self { config }
    }

    /// Configure for fully in-memory operation (fastest for tests).
    ///
    /// This sets:
    /// - Archive DSN to `memory://`
    /// - Metadata DSN to `sqlite::memory:`
    pub fn in_memory(mut self) -> Self {
        self.config.archive.dsn = "memory://".to_string();
        self.config.metadata = MetadataConfig {
            table: self.config.metadata.table.clone(),
            ..MetadataConfig::in_memory()
        };
        self
    }

    /// Use a local filesystem mounted at `root`.
    pub fn with_filesystem_root(mut self, root: &Path) -> Self {
        self.config.filesystem.backend = FilesystemBackend::Local;
        self.config.filesystem.root = root.display().to_string();
        self
    }

    pub fn with_data_repo(mut self, repo: &str) -> Self {
        self.config.filesystem.data_repo = repo.to_string();
        self
    }

    pub fn with_metadata_dsn(mut self, dsn: &str) -> Self {
        self.config.metadata.dsn = dsn.to_string();
        self
    }

    pub fn with_metadata_table(mut self, table: &str) -> Self {
        self.config.metadata.table = table.to_string();
        self
    }

    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.config.metadata.acquire_timeout = timeout;
        self
    }

    pub fn with_archive_dsn(mut self, dsn: &str) -> Self {
        self.config.archive.dsn = dsn.to_string();
        self
    }

    pub fn with_archive_container(mut self, container: &str) -> Self {
        self.config.archive.container = container.to_string();
        self
    }

    /// Enable the cleaner with the given dry-run setting.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.config.cleaner.enabled = true;
        self.config.cleaner.dry_run = dry_run;
        self
    }

    pub fn with_general_dir(mut self, path: &str) -> Self {
        self.config.cleaner.general_dirs.push(path.to_string());
        self
    }

    pub fn with_aged_dir(mut self, path: &str, max_age: Duration) -> Self {
        self.config.cleaner.aged_dirs.push(AgedDirConfig {
            path: path.to_string(),
            max_age,
        });
        self
    }

    /// Configure a file-backed SQLite metadata store in `dir`.
    ///
    /// In-memory SQLite gives every pool its own database, so tests that
    /// open the store from more than one process component need a file.
    pub fn with_shared_metadata_dir(mut self, dir: &str) -> Self {
        self.config.metadata.dsn = format!("sqlite://{dir}/metadata.db");
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Configuration {
        self.config
    }
}

/// Common test utilities and helpers for integration tests
use common::config::Configuration;
use common::testing::TestConfigBuilder;
use tempfile::TempDir;

pub mod fixtures;
pub mod generators;

/// Create an in-memory test configuration with a local filesystem in a
/// temporary directory
pub fn create_test_config() -> (Configuration, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let config = TestConfigBuilder::new()
        .in_memory()
        .with_filesystem_root(temp_dir.path())
        .with_data_repo("/repo")
        .build();

    (config, temp_dir)
}

/// Initialize test logging
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

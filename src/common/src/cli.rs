use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Common CLI arguments shared across all binaries
#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
    #[arg(long, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, help = "Enable quiet mode (minimal output)")]
    pub quiet: bool,
}

/// Common subcommands available for all services
#[derive(Subcommand, Debug, Clone, Default)]
pub enum CommonCommands {
    /// Start the service (default behavior)
    #[default]
    Start,
    /// Show current configuration and exit
    Config {
        #[arg(long, help = "Show configuration in JSON format")]
        json: bool,
    },
    /// Validate configuration and exit
    Validate,
    /// Show version information and exit
    Version,
}

/// Utility functions for CLI operations
pub mod utils {
    use super::*;
    use crate::config::{Configuration, FilesystemBackend};
    use crate::discovery::Platform;
    use anyhow::{Context, Result};
    use tracing_subscriber::EnvFilter;

    fn log_level(args: &CommonArgs) -> &'static str {
        if args.quiet {
            "warn"
        } else if args.verbose {
            "debug"
        } else {
            "info"
        }
    }

    /// Initialize logging based on CLI arguments.
    ///
    /// `RUST_LOG` still wins when set.
    pub fn init_logging(args: &CommonArgs) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(log_level(args)));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    /// Load configuration with optional override from CLI
    pub fn load_config(config_path: Option<&PathBuf>) -> Result<Configuration> {
        match config_path {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Configuration::load_from_path(path).context("Failed to load configuration")
            }
            None => Configuration::load().context("Failed to load configuration"),
        }
    }

    /// Display configuration in human-readable or JSON format
    pub fn display_config(config: &Configuration, json: bool) -> Result<()> {
        if json {
            let json = serde_json::to_string_pretty(config)
                .context("Failed to serialize configuration to JSON")?;
            println!("{json}");
        } else {
            println!("datawarden configuration:");
            println!("=========================");
            println!("Metadata DSN: {}", config.metadata.dsn);
            println!("Metadata table: {}", config.metadata.table);
            println!("Filesystem backend: {:?}", config.filesystem.backend);
            match &config.filesystem.url {
                Some(url) => println!("Filesystem URL: {url}"),
                None => println!("Filesystem URL: (from discovery)"),
            }
            println!("Dataset repository: {}", config.filesystem.data_repo);
            println!("Archive DSN: {}", config.archive.dsn);
            println!("Archive container: {}", config.archive.container);
            println!("Discovery platform: {:?}", config.discovery.platform);
            println!("Catalog sync interval: {:?}", config.catalog.sync_interval);

            if config.cleaner.enabled {
                println!("Cleaner sweep interval: {:?}", config.cleaner.sweep_interval);
                println!("Cleaner dry run: {}", config.cleaner.dry_run);
                println!("General directories: {:?}", config.cleaner.general_dirs);
                println!("Aged directories: {}", config.cleaner.aged_dirs.len());
            } else {
                println!("Cleaner: disabled");
            }
        }
        Ok(())
    }

    /// Validate configuration and report any issues
    pub fn validate_config(config: &Configuration) -> Result<()> {
        log::info!("Validating configuration...");

        if config.metadata.dsn.is_empty() {
            anyhow::bail!("Metadata DSN cannot be empty");
        }

        if config.metadata.table.is_empty() {
            anyhow::bail!("Metadata table cannot be empty");
        }

        if config.metadata.pool_size == 0 {
            anyhow::bail!("Metadata pool size must be at least 1");
        }

        if config.archive.dsn.is_empty() {
            anyhow::bail!("Archive DSN cannot be empty");
        }

        if !config.filesystem.data_repo.starts_with('/') {
            anyhow::bail!(
                "Dataset repository must be an absolute path, got {}",
                config.filesystem.data_repo
            );
        }

        if config.discovery.platform == Platform::Cloudera {
            anyhow::bail!("Discovery platform 'cloudera' is not supported");
        }

        if config.filesystem.backend == FilesystemBackend::WebHdfs
            && config.filesystem.url.is_none()
            && config.discovery.hdfs_url.is_empty()
        {
            anyhow::bail!("WebHDFS backend needs filesystem.url or a discoverable namenode");
        }

        if config.catalog.sync_interval.is_zero() {
            anyhow::bail!("Catalog sync interval must be greater than zero");
        }

        log::info!("Configuration validation passed");
        Ok(())
    }

    /// Handle common CLI commands that don't require starting services
    pub async fn handle_common_command(
        command: &CommonCommands,
        config: &Configuration,
    ) -> Result<bool> {
        match command {
            CommonCommands::Config { json } => {
                display_config(config, *json)?;
                Ok(true)
            }
            CommonCommands::Validate => {
                validate_config(config)?;
                Ok(true)
            }
            CommonCommands::Version => {
                println!("{}", version_info());
                Ok(true)
            }
            CommonCommands::Start => Ok(false),
        }
    }

    /// Standard version information
    pub fn version_info() -> String {
        format!(
            "{} {} ({})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_RUST_VERSION")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use crate::discovery::Platform;

    #[test]
    fn test_common_commands_default() {
        let default_cmd = CommonCommands::default();
        assert!(matches!(default_cmd, CommonCommands::Start));
    }

    #[test]
    fn test_version_info() {
        let version = utils::version_info();
        assert!(version.contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_validate_default_config() {
        assert!(utils::validate_config(&Configuration::default()).is_ok());
    }

    #[test]
    fn test_validate_rejects_relative_repo() {
        let mut config = Configuration::default();
        config.filesystem.data_repo = "datasets".to_string();
        assert!(utils::validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_rejects_cloudera() {
        let mut config = Configuration::default();
        config.discovery.platform = Platform::Cloudera;
        let err = utils::validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("cloudera"));
    }
}

use std::sync::Arc;

use anyhow::{Context, Result};
use catalog::{CatalogService, spawn_sync_loop};
use clap::{Parser, Subcommand};
use cleaner::archive::ArchiveExecutor;
use cleaner::retention::{RetentionConfig, RetentionEnforcer, RetentionMetrics, spawn_sweep_loop};
use common::ServiceContext;
use common::cli::{CommonArgs, CommonCommands, utils};
use common::service_bootstrap::wait_for_shutdown_signal;

#[derive(Parser)]
#[command(name = "datawarden")]
#[command(about = "datawarden - dataset catalog and retention manager (monolithic mode)")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Option<DatawardenCommands>,
}

#[derive(Subcommand)]
enum DatawardenCommands {
    #[command(flatten)]
    Common(CommonCommands),
}

impl Default for DatawardenCommands {
    fn default() -> Self {
        Self::Common(CommonCommands::Start)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on CLI arguments
    utils::init_logging(&cli.common);

    // Load application configuration
    let config = utils::load_config(cli.common.config.as_ref())?;

    // Handle common commands that don't require starting the service
    let command = cli.command.unwrap_or_default();
    let DatawardenCommands::Common(ref common_cmd) = command;
    if utils::handle_common_command(common_cmd, &config).await? {
        return Ok(()); // Command handled, exit early
    }

    utils::validate_config(&config)?;
    let retention_config = RetentionConfig::from(&config.cleaner);
    retention_config
        .validate()
        .context("Invalid cleaner configuration")?;

    log::info!("Loaded configuration:");
    log::info!("  Metadata DSN: {}", config.metadata.dsn);
    log::info!("  Dataset repository: {}", config.filesystem.data_repo);
    log::info!("  Archive DSN: {}", config.archive.dsn);

    let context = ServiceContext::initialize(config)
        .await
        .context("Failed to initialize datawarden services")?;

    // One catalog shared by the reconciliation loop and the sweeper
    let catalog = Arc::new(CatalogService::from_context(&context));
    if !catalog.metadata_available() {
        log::warn!("Running without a metadata store; the catalog is read-only");
    }

    let sync_interval = context.config.catalog.sync_interval;
    log::info!("Starting catalog reconciliation every {sync_interval:?}");
    let sync_task = spawn_sync_loop(catalog.clone(), sync_interval);

    let metrics = RetentionMetrics::new();
    let sweep_task = if retention_config.enabled {
        let archive = Arc::new(ArchiveExecutor::from_context(
            &context,
            metrics.archive().clone(),
        ));
        let enforcer = Arc::new(RetentionEnforcer::new(
            context.filesystem.clone(),
            archive,
            retention_config.clone(),
            metrics.clone(),
        ));
        if retention_config.dry_run {
            log::warn!("Dry-run mode enabled: no files will be deleted or archived");
        }
        log::info!(
            "Starting retention sweeps every {:?}",
            retention_config.sweep_interval
        );
        Some(spawn_sweep_loop(
            enforcer,
            catalog.clone(),
            retention_config.sweep_interval,
            false,
        ))
    } else {
        log::info!("Cleaner is disabled in configuration (cleaner.enabled = false)");
        None
    };

    log::info!("datawarden running, waiting for shutdown signal");
    wait_for_shutdown_signal().await?;

    log::info!("Received shutdown signal, stopping services");
    sync_task.abort();
    if let Some(task) = sweep_task {
        task.abort();
        metrics.summary().log();
    }

    log::info!("datawarden stopped");
    Ok(())
}

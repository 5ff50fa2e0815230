//! datawarden cleaner service
//!
//! Sweeps static directories and catalog datasets on a fixed interval,
//! deleting or archiving what their retention policies select.

use std::sync::Arc;

use anyhow::{Context, Result};
use catalog::CatalogService;
use clap::{Parser, Subcommand};
use cleaner::archive::ArchiveExecutor;
use cleaner::retention::{RetentionConfig, RetentionEnforcer, RetentionMetrics, spawn_sweep_loop};
use common::ServiceContext;
use common::cli::{CommonArgs, CommonCommands, utils};
use common::service_bootstrap::wait_for_shutdown_signal;

#[derive(Parser)]
#[command(name = "datawarden-cleaner")]
#[command(about = "datawarden retention sweeper and archiver")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Option<CleanerCommands>,
}

#[derive(Subcommand)]
enum CleanerCommands {
    #[command(flatten)]
    Common(CommonCommands),
    /// Reconcile the catalog, run a single sweep and exit
    SweepOnce,
    /// List archived files under a prefix of the archive container
    Manifest {
        #[arg(long, default_value = "")]
        prefix: String,
    },
    /// Restore archived files under a prefix of the archive container
    Restore {
        #[arg(long, default_value = "")]
        prefix: String,
    },
}

impl Default for CleanerCommands {
    fn default() -> Self {
        Self::Common(CommonCommands::Start)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    utils::init_logging(&cli.common);

    let config = utils::load_config(cli.common.config.as_ref())?;

    let command = cli.command.unwrap_or_default();
    if let CleanerCommands::Common(ref common_cmd) = command
        && utils::handle_common_command(common_cmd, &config).await?
    {
        return Ok(());
    }

    utils::validate_config(&config)?;
    let retention_config = RetentionConfig::from(&config.cleaner);
    retention_config
        .validate()
        .context("Invalid cleaner configuration")?;

    if matches!(command, CleanerCommands::Common(_)) && !retention_config.enabled {
        log::info!("Cleaner is disabled in configuration (cleaner.enabled = false)");
        log::info!("Set DATAWARDEN__CLEANER__ENABLED=true or enable in config file to run sweeps");
        return Ok(());
    }

    let context = ServiceContext::initialize(config)
        .await
        .context("Failed to initialize cleaner service")?;

    let metrics = RetentionMetrics::new();
    let archive = Arc::new(ArchiveExecutor::from_context(
        &context,
        metrics.archive().clone(),
    ));

    match command {
        CleanerCommands::Manifest { prefix } => {
            let manifest = archive.manifest(&prefix).await?;
            for entry in &manifest.entries {
                println!("{}\t{}", entry.key, entry.path);
            }
            for (key, error) in &manifest.failures {
                log::warn!("{key}: {error}");
            }
            return Ok(());
        }
        CleanerCommands::Restore { prefix } => {
            let result = archive.restore_prefix(&prefix).await?;
            log::info!(
                "Restored {} file(s), {} failure(s)",
                result.restored.len(),
                result.failed.len()
            );
            for failure in &result.failed {
                log::error!("Failed to restore {}: {}", failure.key, failure.error);
            }
            if !result.is_complete() {
                anyhow::bail!("{} file(s) could not be restored", result.failed.len());
            }
            return Ok(());
        }
        CleanerCommands::SweepOnce | CleanerCommands::Common(_) => {}
    }

    let catalog = Arc::new(CatalogService::from_context(&context));
    let enforcer = Arc::new(RetentionEnforcer::new(
        context.filesystem.clone(),
        archive,
        retention_config.clone(),
        metrics.clone(),
    ));

    if retention_config.dry_run {
        log::warn!("Dry-run mode enabled: no files will be deleted or archived");
    }

    if matches!(command, CleanerCommands::SweepOnce) {
        catalog.refresh().await;
        let snapshot = catalog.snapshot().await;
        let result = enforcer.run_sweep(&snapshot).await;
        log::info!(
            "Sweep {} actioned {} file(s) with {} failure(s)",
            result.run_id,
            result.total_files_actioned,
            result.total_action_failures
        );
        metrics.summary().log();
        return Ok(());
    }

    log::info!(
        "Starting retention sweeps every {:?}",
        retention_config.sweep_interval
    );
    let sweep_task = spawn_sweep_loop(
        enforcer,
        catalog,
        retention_config.sweep_interval,
        true,
    );

    log::info!("Cleaner service running, waiting for shutdown signal");
    wait_for_shutdown_signal().await?;

    log::info!("Received shutdown signal, stopping cleaner service");
    sweep_task.abort();

    metrics.summary().log();
    log::info!("Cleaner service stopped");
    Ok(())
}

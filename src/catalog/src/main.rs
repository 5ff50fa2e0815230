//! datawarden catalog service
//!
//! Reconciles the dataset repository with persisted dataset records on a
//! fixed interval.

use std::sync::Arc;

use anyhow::{Context, Result};
use catalog::{CatalogService, spawn_sync_loop};
use clap::{Parser, Subcommand};
use common::ServiceContext;
use common::cli::{CommonArgs, CommonCommands, utils};
use common::service_bootstrap::wait_for_shutdown_signal;

#[derive(Parser)]
#[command(name = "datawarden-catalog")]
#[command(about = "datawarden dataset catalog reconciler")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Option<CatalogCommands>,
}

#[derive(Subcommand)]
enum CatalogCommands {
    #[command(flatten)]
    Common(CommonCommands),
    /// Reconcile once and print the catalog as JSON
    List,
    /// Reconcile once and print the partitions of one dataset
    Partitions {
        /// Dataset id
        id: String,
    },
}

impl Default for CatalogCommands {
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
    if let CatalogCommands::Common(ref common_cmd) = command
        && utils::handle_common_command(common_cmd, &config).await?
    {
        return Ok(());
    }

    utils::validate_config(&config)?;

    let context = ServiceContext::initialize(config)
        .await
        .context("Failed to initialize catalog service")?;
    let service = Arc::new(CatalogService::from_context(&context));

    match command {
        CatalogCommands::List => {
            service.refresh().await;
            let json = serde_json::to_string_pretty(&service.list().await)
                .context("Failed to serialize catalog")?;
            println!("{json}");
            return Ok(());
        }
        CatalogCommands::Partitions { id } => {
            service.refresh().await;
            for partition in service.partitions(&id).await? {
                println!("{partition}");
            }
            return Ok(());
        }
        CatalogCommands::Common(_) => {}
    }

    if !service.metadata_available() {
        log::warn!("Running without a metadata store; the catalog is read-only");
    }

    let sync_interval = context.config.catalog.sync_interval;
    log::info!("Starting catalog reconciliation every {sync_interval:?}");
    let sync_task = spawn_sync_loop(service.clone(), sync_interval);

    log::info!("Catalog service running, waiting for shutdown signal");
    wait_for_shutdown_signal().await?;

    log::info!("Received shutdown signal, stopping catalog service");
    sync_task.abort();

    log::info!("Catalog service stopped");
    Ok(())
}

//! ChatLake topology sync
//!
//! One-shot reconciliation of the chatbot analytics dataset: creates missing
//! tables, updates drifted ones, and prints what happened to each table.
//! Exits non-zero when reconciliation fails.

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use chatlake_write::{default_topology, ChatLakeConfig, ChatLakeSink, TableOutcome, Topology};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("chatlake_write=info".parse()?)
                .add_directive("chatlake_common=info".parse()?)
                .add_directive("chatlake_topology_sync=info".parse()?),
        )
        .init();

    info!("ChatLake topology sync - starting");

    let config = ChatLakeConfig::from_env().context("Failed to load configuration")?;
    info!(
        "Target dataset {}.{} via {}",
        config.project_id, config.dataset, config.api_endpoint
    );
    if config.passive_schema {
        warn!("CHATLAKE_PASSIVE_SCHEMA is set, nothing to reconcile");
        return Ok(());
    }

    let topology = Topology::new(default_topology()).context("Invalid topology")?;
    let sink = ChatLakeSink::from_config(&config, topology).context("Failed to create sink")?;

    if let Err(e) = sink.pre_heat().await {
        error!("Topology reconciliation failed: {}", e);
        return Err(e).context("Topology reconciliation failed");
    }

    let report = sink.last_report().unwrap_or_default();
    for table in &report.tables {
        match &table.outcome {
            TableOutcome::Failed(_) => warn!("{:<16} {}", table.table, table.outcome),
            _ => info!("{:<16} {}", table.table, table.outcome),
        }
    }

    info!(
        "Done: {} created, {} updated, {} unchanged, {} deferred, {} failed",
        report.created(),
        report.updated(),
        report.unchanged(),
        report.deferred(),
        report.failed()
    );
    Ok(())
}

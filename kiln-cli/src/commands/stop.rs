//! `kiln stop` command

use crate::context::Context;
use anyhow::Result;
use colored::Colorize;
use kiln_core::builder::{drivers_for_node_group, stop_node_group};

/// Stop every node of a builder.
pub async fn stop(ctx: &Context, name: Option<&str>) -> Result<()> {
    let txn = ctx.store.txn().await?;
    let ng = ctx.node_group(&txn, name).await?;
    txn.release();

    let nodes = drivers_for_node_group(&ctx.registry, &ng, &ctx.state_root())?;
    stop_node_group(&nodes, false).await?;

    println!("{} Builder stopped: {}", "✓".green().bold(), ng.name.bold());
    Ok(())
}

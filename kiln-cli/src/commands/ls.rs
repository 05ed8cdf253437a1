//! `kiln ls` command

use crate::context::Context;
use anyhow::Result;
use kiln_core::builder::{default_node_group, drivers_for_node_group, NodeDriver};
use kiln_core::{platform, NodeGroup};
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct BuilderRow {
    #[tabled(rename = "NAME/NODE")]
    name: String,
    #[tabled(rename = "DRIVER/ENDPOINT")]
    driver: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "PLATFORMS")]
    platforms: String,
}

/// Probe a node's status for display.
pub(crate) async fn node_status(node: &NodeDriver) -> String {
    match (&node.driver, &node.err) {
        (Some(driver), _) => match driver.info().await {
            Ok(info) => info.status.to_string(),
            Err(e) => format!("error: {}", e),
        },
        (None, Some(err)) => format!("error: {}", err),
        (None, None) => "unknown".to_string(),
    }
}

/// List builders and their nodes
pub async fn ls(ctx: &Context) -> Result<()> {
    let txn = ctx.store.txn().await?;
    let mut groups = txn.list().await?;
    let current = txn.current(&ctx.scope()).await?;
    txn.release();

    groups.push(default_node_group(&ctx.scope()));
    let current_name = current.map(|ng| ng.name).unwrap_or_else(|| "default".to_string());

    let mut rows = Vec::new();
    for ng in &groups {
        let marker = if ng.name == current_name { " *" } else { "" };
        rows.push(BuilderRow {
            name: format!("{}{}", ng.name, marker),
            driver: ng.driver.clone(),
            status: String::new(),
            platforms: String::new(),
        });
        rows.extend(node_rows(ctx, ng).await);
    }

    let mut table = Table::new(rows);
    table.with(Style::modern());

    println!("{}", table);

    Ok(())
}

async fn node_rows(ctx: &Context, ng: &NodeGroup) -> Vec<BuilderRow> {
    let nodes = match drivers_for_node_group(&ctx.registry, ng, &ctx.state_root()) {
        Ok(nodes) => nodes,
        Err(e) => {
            return vec![BuilderRow {
                name: "  -".to_string(),
                driver: String::new(),
                status: format!("error: {}", e),
                platforms: String::new(),
            }]
        }
    };

    let mut rows = Vec::with_capacity(nodes.len());
    for node in &nodes {
        rows.push(BuilderRow {
            name: format!("  {}", node.name),
            driver: if node.endpoint.is_empty() { "-".to_string() } else { node.endpoint.clone() },
            status: node_status(node).await,
            platforms: platform::format(&node.platforms).join(", "),
        });
    }
    rows
}

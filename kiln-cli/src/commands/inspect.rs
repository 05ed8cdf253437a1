//! `kiln inspect` command

use crate::commands::ls::node_status;
use crate::context::Context;
use crate::printer::Printer;
use anyhow::Result;
use colored::Colorize;
use kiln_core::builder::{boot_nodes, drivers_for_node_group};
use kiln_core::platform;

/// Show details of a builder and its nodes
pub async fn inspect(ctx: &Context, name: Option<&str>, bootstrap: bool) -> Result<()> {
    let txn = ctx.store.txn().await?;
    let ng = ctx.node_group(&txn, name).await?;
    txn.release();

    let nodes = drivers_for_node_group(&ctx.registry, &ng, &ctx.state_root())?;

    if bootstrap {
        let printer = Printer::new();
        let logger = printer.logger();
        let results = boot_nodes(&nodes, &logger).await;
        drop(logger);
        printer.wait().await;
        for (node, result) in nodes.iter().zip(results) {
            if let Err(e) = result {
                eprintln!("{} {}: {}", "⚠".yellow().bold(), node.name.bold(), e);
            }
        }
    }

    println!("{}: {}", "Name".bold(), ng.name);
    println!("{}: {}", "Driver".bold(), ng.driver);
    for (k, v) in &ng.driver_opts {
        println!("{}: {}={}", "Driver Option".bold(), k, v);
    }

    for node in &nodes {
        println!();
        println!("{}: {}", "Name".bold(), node.name);
        let endpoint = if node.endpoint.is_empty() { "-" } else { node.endpoint.as_str() };
        println!("{}: {}", "Endpoint".bold(), endpoint);
        println!("{}: {}", "Status".bold(), node_status(node).await);
        if let Some(err) = &node.err {
            println!("{}: {}", "Error".bold(), err.red());
        }
        if !node.platforms.is_empty() {
            println!("{}: {}", "Platforms".bold(), platform::format(&node.platforms).join(", "));
        }
        if let Some(driver) = &node.driver {
            let f = driver.features();
            let mut features = Vec::new();
            if f.multi_platform {
                features.push("multi-platform");
            }
            if f.cache_export {
                features.push("cache export");
            }
            if f.oci_exporter {
                features.push("oci exporter");
            }
            if f.docker_exporter {
                features.push("docker exporter");
            }
            if !features.is_empty() {
                println!("{}: {}", "Features".bold(), features.join(", "));
            }
        }
    }

    Ok(())
}

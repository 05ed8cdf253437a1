//! `kiln create` command

use crate::context::Context;
use crate::printer::Printer;
use anyhow::{anyhow, bail, Context as _, Result};
use colored::Colorize;
use kiln_core::builder::{boot_nodes, drivers_for_node_group, DEFAULT_BUILDER};
use kiln_core::types::validate_name;
use kiln_core::{EngineEndpoint, NodeGroup};
use std::collections::BTreeMap;

pub struct CreateOptions {
    pub endpoint: Option<String>,
    pub name: Option<String>,
    pub driver: Option<String>,
    pub driver_opts: BTreeMap<String, String>,
    pub node: Option<String>,
    pub platforms: Vec<String>,
    pub append: bool,
    pub leave: bool,
    pub use_builder: bool,
    pub bootstrap: bool,
}

/// Parse `KEY=VALUE` driver options.
pub fn parse_driver_opts(raw: &[String]) -> Result<BTreeMap<String, String>> {
    raw.iter()
        .map(|opt| {
            let (k, v) = opt
                .split_once('=')
                .ok_or_else(|| anyhow!("invalid driver option {}, expected KEY=VALUE", opt))?;
            if k.is_empty() {
                bail!("invalid driver option {}, expected KEY=VALUE", opt);
            }
            Ok((k.to_string(), v.to_string()))
        })
        .collect()
}

/// Create a builder, or add, change or remove one of its nodes.
pub async fn create(ctx: &Context, opts: CreateOptions) -> Result<()> {
    if opts.leave && opts.node.is_none() {
        bail!("leave requires --node");
    }
    let name = opts.name.as_deref().map(validate_name).transpose()?;
    if name.as_deref() == Some(DEFAULT_BUILDER) {
        bail!("{} is a reserved name and cannot be used", DEFAULT_BUILDER);
    }

    if let Some(ep) = &opts.endpoint {
        ep.parse::<EngineEndpoint>()?;
    }

    let txn = ctx.store.txn().await?;

    let existing = match &name {
        Some(name) => match txn.node_group_by_name(name).await {
            Ok(ng) => Some(ng),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        },
        None => None,
    };

    let mut ng = match existing {
        Some(ng) => {
            if !opts.append && !opts.leave && opts.node.is_none() {
                bail!(
                    "existing instance for {} but no append mode, specify --node to make changes for existing instances",
                    ng.name
                );
            }
            if let Some(driver) = &opts.driver {
                if driver != &ng.driver {
                    bail!("existing instance {} uses driver {}, not {}", ng.name, ng.driver, driver);
                }
            }
            ng
        }
        None => {
            if opts.append || opts.leave {
                bail!(
                    "failed to find instance {} for {}",
                    name.as_deref().unwrap_or(""),
                    if opts.leave { "leave" } else { "append" }
                );
            }
            let driver = match opts.driver.clone().or_else(|| ctx.config.default_driver.clone()) {
                Some(d) => d,
                None => {
                    let api = ctx.config.engine_endpoint().ok();
                    ctx.registry.default_factory(api.as_ref(), true).await?.name().to_string()
                }
            };
            let factory = ctx.registry.get(&driver)?;
            if !factory.allows_instances() {
                bail!("{} driver does not support named builder instances", driver);
            }
            let name = match name {
                Some(n) => n,
                None => txn.generate_name().await?,
            };
            NodeGroup::new(name, driver)
        }
    };

    ng.driver_opts.extend(opts.driver_opts);

    if opts.leave {
        let node = opts.node.as_deref().unwrap_or_default();
        ng.leave(node)?;
    } else {
        ng.update(
            opts.node.as_deref().unwrap_or_default(),
            opts.endpoint.as_deref().unwrap_or_default(),
            &opts.platforms,
            opts.endpoint.is_some(),
            opts.append,
        )?;
    }

    txn.save(&ng).await?;
    if opts.use_builder {
        txn.set_current(&ctx.scope(), &ng.name, false, false).await?;
    }
    txn.release();

    if opts.bootstrap {
        let nodes = drivers_for_node_group(&ctx.registry, &ng, &ctx.state_root())?;
        let printer = Printer::new();
        let logger = printer.logger();
        let results = boot_nodes(&nodes, &logger).await;
        drop(logger);
        printer.wait().await;

        for (node, result) in nodes.iter().zip(results) {
            result.with_context(|| format!("failed to boot node {}", node.name))?;
        }
    }

    println!("{}", ng.name);
    if opts.bootstrap {
        eprintln!("{} Builder ready: {}", "✓".green().bold(), ng.name.bold());
    }
    Ok(())
}

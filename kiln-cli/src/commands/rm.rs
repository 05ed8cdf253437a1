//! `kiln rm` command

use crate::context::Context;
use anyhow::{bail, Result};
use colored::Colorize;
use kiln_core::builder::{remove_node_group, DEFAULT_BUILDER};

/// Tear down a builder and delete it from the store.
///
/// Without a name the current builder is removed; with nothing selected there is
/// nothing to do.
pub async fn rm(ctx: &Context, name: Option<&str>) -> Result<()> {
    let txn = ctx.store.txn().await?;
    let ng = match name {
        Some(name) => ctx.node_group(&txn, Some(name)).await?,
        None => match txn.current(&ctx.scope()).await? {
            Some(ng) => ng,
            None => return Ok(()),
        },
    };
    if ng.name == DEFAULT_BUILDER {
        bail!("{} is a reserved name and cannot be removed", DEFAULT_BUILDER);
    }

    remove_node_group(&txn, &ctx.registry, &ng, &ctx.state_root()).await?;
    println!("{} Builder removed: {}", "✓".green().bold(), ng.name.bold());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::NodeGroup;

    #[tokio::test]
    async fn test_rm_without_selection_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = Context::for_dir(dir.path()).await;

        let mut ng = NodeGroup::new("keep", "process");
        ng.driver_opts.insert("cmd".to_string(), "true".to_string());
        ng.update("", "", &[], false, false).unwrap();
        let txn = ctx.store.txn().await.unwrap();
        txn.save(&ng).await.unwrap();
        txn.release();

        rm(&ctx, None).await.unwrap();

        let txn = ctx.store.txn().await.unwrap();
        assert!(txn.node_group_by_name("keep").await.is_ok());
        txn.release();

        let err = rm(&ctx, Some("default")).await.unwrap_err();
        assert!(err.to_string().contains("reserved name"));
    }
}

//! `kiln use` command

use crate::context::Context;
use anyhow::Result;
use kiln_core::builder::DEFAULT_BUILDER;

/// Select the current builder for the active endpoint.
pub async fn use_builder(ctx: &Context, name: &str, global: bool, default: bool) -> Result<()> {
    let txn = ctx.store.txn().await?;

    if name.eq_ignore_ascii_case(DEFAULT_BUILDER) {
        txn.clear_current(&ctx.scope()).await?;
        return Ok(());
    }

    let ng = txn.node_group_by_name(name).await?;
    txn.set_current(&ctx.scope(), &ng.name, global, default).await?;
    Ok(())
}

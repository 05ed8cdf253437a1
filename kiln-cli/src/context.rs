//! Shared state for commands: configuration, store and driver registry.

use anyhow::Result;
use kiln_core::builder::{default_node_group, DEFAULT_BUILDER};
use kiln_core::{Config, DriverRegistry, NodeGroup, Store, Txn};
use std::path::PathBuf;

pub struct Context {
    pub config: Config,
    pub store: Store,
    pub registry: DriverRegistry,
}

impl Context {
    pub async fn load() -> Result<Self> {
        let config = Config::load()?;
        let store = Store::open(&config.store_dir).await?;
        Ok(Self { config, store, registry: DriverRegistry::with_builtin() })
    }

    /// Scope key for current builder selection: the active engine endpoint.
    pub fn scope(&self) -> String {
        self.config.endpoint()
    }

    /// Context rooted at `dir`, scoped to an endpoint with no engine behind it.
    #[cfg(test)]
    pub async fn for_dir(dir: &std::path::Path) -> Self {
        let config = Config {
            default_endpoint: "unix:///nonexistent/engine.sock".to_string(),
            store_dir: dir.join("store").to_string_lossy().to_string(),
            state_dir: dir.join("state").to_string_lossy().to_string(),
            ..Default::default()
        };
        let store = Store::open(&config.store_dir).await.expect("open store");
        Self { config, store, registry: DriverRegistry::with_builtin() }
    }

    pub fn state_root(&self) -> PathBuf {
        PathBuf::from(&self.config.state_dir)
    }

    /// Resolve a builder by name, or the current one when `name` is `None`.
    ///
    /// Falls back to the implicit default builder when nothing is selected.
    pub async fn node_group(&self, txn: &Txn, name: Option<&str>) -> Result<NodeGroup> {
        match name {
            Some(DEFAULT_BUILDER) => Ok(default_node_group(&self.scope())),
            Some(name) => Ok(txn.node_group_by_name(name).await?),
            None => Ok(txn
                .current(&self.scope())
                .await?
                .unwrap_or_else(|| default_node_group(&self.scope()))),
        }
    }
}

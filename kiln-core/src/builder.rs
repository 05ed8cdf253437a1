//! Builder glue: turn a stored node group into live drivers.
//!
//! Resolves one driver per node, boots nodes concurrently and tears groups
//! down best-effort.

use crate::bootstrap;
use crate::drivers::{Driver, DriverRegistry, EngineConnection, EngineEndpoint, InitConfig};
use crate::error::{KilnError, Result};
use crate::observability::metrics::record_boot;
use crate::platform::Platform;
use crate::progress::Logger;
use crate::store::Txn;
use crate::types::node_group::{Node, NodeGroup};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

/// Name of the implicit builder used when nothing is selected.
pub const DEFAULT_BUILDER: &str = "default";

/// A node paired with the driver that realizes it.
#[derive(Clone)]
pub struct NodeDriver {
    pub name: String,
    pub endpoint: String,
    pub platforms: Vec<Platform>,
    pub driver: Option<Arc<dyn Driver>>,
    /// Why the driver could not be constructed
    pub err: Option<String>,
}

impl NodeDriver {
    fn driver(&self) -> Result<&Arc<dyn Driver>> {
        match &self.driver {
            Some(d) => Ok(d),
            None => Err(KilnError::InvalidDriverConfig {
                driver: self.name.clone(),
                reason: self.err.clone().unwrap_or_else(|| "no driver".to_string()),
            }),
        }
    }
}

impl fmt::Debug for NodeDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeDriver")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .field("platforms", &self.platforms)
            .field("driver", &self.driver.as_ref().map(|d| d.factory_name().to_string()))
            .field("err", &self.err)
            .finish()
    }
}

/// The implicit builder: one `engine` node at `endpoint`.
pub fn default_node_group(endpoint: &str) -> NodeGroup {
    let mut ng = NodeGroup::new(DEFAULT_BUILDER, "engine");
    ng.nodes.push(Node {
        name: DEFAULT_BUILDER.to_string(),
        endpoint: endpoint.to_string(),
        platforms: Vec::new(),
    });
    ng
}

/// Construct a driver for every node of `ng`.
///
/// Per-node construction failures are recorded in [`NodeDriver::err`]; an
/// unknown backend fails the whole call. Node state lives under
/// `<state_root>/<group>/<node>`, both lower-cased as the store keeps them.
#[instrument(skip(registry, ng, state_root), fields(builder = %ng.name))]
pub fn drivers_for_node_group(
    registry: &DriverRegistry,
    ng: &NodeGroup,
    state_root: &Path,
) -> Result<Vec<NodeDriver>> {
    let factory = registry.get(&ng.driver)?;
    let group_dir = state_root.join(ng.name.to_lowercase());

    let drivers = ng
        .nodes
        .iter()
        .map(|node| {
            let built = parse_endpoint(&node.endpoint).and_then(|endpoint| {
                factory.new_driver(InitConfig {
                    name: node.name.clone(),
                    endpoint,
                    platforms: node.platforms.clone(),
                    driver_opts: ng.driver_opts.clone(),
                    state_dir: group_dir.join(node.name.to_lowercase()),
                })
            });

            let (driver, err) = match built {
                Ok(d) => (Some(d), None),
                Err(e) => {
                    warn!(node = %node.name, error = %e, "Failed to create driver");
                    (None, Some(e.to_string()))
                }
            };
            NodeDriver {
                name: node.name.clone(),
                endpoint: node.endpoint.clone(),
                platforms: node.platforms.clone(),
                driver,
                err,
            }
        })
        .collect();
    Ok(drivers)
}

fn parse_endpoint(endpoint: &str) -> Result<Option<EngineEndpoint>> {
    if endpoint.is_empty() {
        return Ok(None);
    }
    endpoint.parse().map(Some)
}

/// Boot every node concurrently.
///
/// Progress from each node is prefixed with its name. Results are returned in
/// node order.
#[instrument(skip_all, fields(nodes = nodes.len()))]
pub async fn boot_nodes(nodes: &[NodeDriver], logger: &Logger) -> Vec<Result<EngineConnection>> {
    let mut results: Vec<Option<Result<EngineConnection>>> = Vec::with_capacity(nodes.len());
    let mut tasks = JoinSet::new();

    for (i, node) in nodes.iter().enumerate() {
        results.push(None);
        let driver = match node.driver() {
            Ok(d) => d.clone(),
            Err(e) => {
                results[i] = Some(Err(e));
                continue;
            }
        };
        let logger = logger.with_prefix(&node.name);
        tasks.spawn(async move {
            let start = Instant::now();
            let result = bootstrap::boot(driver.as_ref(), &logger).await;
            if result.is_ok() {
                record_boot(start.elapsed().as_secs_f64(), driver.factory_name());
            }
            (i, result)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((i, result)) => results[i] = Some(result),
            Err(e) => warn!(error = %e, "Boot task failed"),
        }
    }

    results
        .into_iter()
        .map(|r| r.unwrap_or_else(|| Err(KilnError::Internal("boot task aborted".to_string()))))
        .collect()
}

/// Stop every node, removing its resources too when `rm` is set.
///
/// Every node is attempted; the first failure is returned.
#[instrument(skip(nodes))]
pub async fn stop_node_group(nodes: &[NodeDriver], rm: bool) -> Result<()> {
    let mut first_err = None;
    for node in nodes {
        let result = match node.driver() {
            Ok(driver) => {
                let stopped = driver.stop(rm).await;
                match stopped {
                    Ok(()) if rm => driver.rm(true).await,
                    other => other,
                }
            }
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(node = %node.name, error = %e, "Failed to stop node");
            first_err.get_or_insert(e);
        }
    }
    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Tear down every node of `ng` and delete it from the store.
///
/// Node teardown is best-effort; the group is removed from the store even if
/// it fails. A store failure takes precedence over a teardown failure. After a
/// clean teardown the group's state directory is removed once empty.
#[instrument(skip(txn, registry, ng, state_root), fields(builder = %ng.name))]
pub async fn remove_node_group(
    txn: &Txn,
    registry: &DriverRegistry,
    ng: &NodeGroup,
    state_root: &Path,
) -> Result<()> {
    let teardown = match drivers_for_node_group(registry, ng, state_root) {
        Ok(nodes) => stop_node_group(&nodes, true).await,
        Err(e) => Err(e),
    };

    txn.remove(&ng.name).await?;
    info!("Removed builder {}", ng.name);

    if teardown.is_ok() {
        let group_dir = state_root.join(ng.name.to_lowercase());
        if let Err(e) = tokio::fs::remove_dir(&group_dir).await {
            debug!(path = %group_dir.display(), error = %e, "Kept builder state directory");
        }
    }
    teardown
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_node_group() {
        let ng = default_node_group("unix:///run/engine.sock");
        assert_eq!(ng.name, "default");
        assert_eq!(ng.driver, "engine");
        assert_eq!(ng.nodes.len(), 1);
        assert_eq!(ng.nodes[0].endpoint, "unix:///run/engine.sock");
    }

    #[test]
    fn test_drivers_for_node_group() {
        let dir = tempfile::tempdir().unwrap();
        let registry = DriverRegistry::with_builtin();

        let mut ng = NodeGroup::new("multi", "process");
        ng.driver_opts.insert("cmd".to_string(), "buildkitd".to_string());
        ng.update("a", "", &[], true, true).unwrap();
        ng.update("b", "ftp://nope", &[], true, true).unwrap();

        let nodes = drivers_for_node_group(&registry, &ng, dir.path()).unwrap();
        assert_eq!(nodes.len(), 2);
        assert!(nodes[0].driver.is_some());
        assert!(nodes[0].err.is_none());
        assert!(nodes[1].driver.is_none());
        assert!(nodes[1].err.as_deref().unwrap().contains("invalid endpoint"));

        ng.driver = "kubernetes".to_string();
        assert!(matches!(
            drivers_for_node_group(&registry, &ng, dir.path()),
            Err(KilnError::DriverNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_boot_nodes_reports_construct_errors_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let registry = DriverRegistry::with_builtin();

        let mut ng = NodeGroup::new("g", "engine");
        ng.update("bad", "ftp://nope", &[], true, true).unwrap();
        ng.update("gone", &format!("unix://{}", dir.path().join("x.sock").display()), &[], true, true)
            .unwrap();

        let nodes = drivers_for_node_group(&registry, &ng, dir.path()).unwrap();
        let results = boot_nodes(&nodes, &Logger::discard()).await;
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], Err(KilnError::InvalidDriverConfig { .. })));
        assert!(matches!(results[1], Err(KilnError::NotConnecting { .. })));
    }
}

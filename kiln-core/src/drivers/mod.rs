//! Driver abstraction.
//!
//! A driver realizes one node of a builder instance on some backend and hands
//! out connections to the build engine running there. kiln ships two backends:
//! - `engine`: fronts an already-running engine at a known endpoint
//! - `process`: launches and supervises a dedicated builder daemon per node
//!
//! Backends are registered explicitly in a [`DriverRegistry`].

use crate::error::Result;
use crate::platform::Platform;
use crate::progress::Logger;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

pub mod endpoint;
pub mod engine;
pub mod process;
mod registry;

pub use endpoint::{EngineConnection, EngineEndpoint, EngineStream};
pub use engine::{EngineDriver, EngineFactory};
pub use process::{ProcessDriver, ProcessFactory};
pub use registry::DriverRegistry;

/// Lifecycle state of a driver's backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverStatus {
    Inactive,
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Inactive => "inactive",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Result of a status probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverInfo {
    pub status: DriverStatus,
}

/// Capabilities of the engine behind a driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Features {
    /// Can export OCI image layouts
    pub oci_exporter: bool,

    /// Can export into a local image store
    pub docker_exporter: bool,

    /// Can export build cache
    pub cache_export: bool,

    /// Can build for several platforms in one request
    pub multi_platform: bool,
}

/// Driver trait.
///
/// One instance drives one node. Implementations must make `stop` and `rm`
/// idempotent: calling them on an absent backend succeeds.
#[async_trait]
pub trait Driver: Send + Sync {
    /// Name of the factory that created this driver.
    fn factory_name(&self) -> &str;

    /// Probe the backend status.
    ///
    /// Fails with `NotConnecting` when the backend cannot be queried at all.
    async fn info(&self) -> Result<DriverInfo>;

    /// Bring the backend up, reporting progress to `logger`.
    async fn bootstrap(&self, logger: &Logger) -> Result<()>;

    /// Stop the backend.
    async fn stop(&self, force: bool) -> Result<()>;

    /// Remove every resource owned by the backend.
    async fn rm(&self, force: bool) -> Result<()>;

    /// Connect to the engine. Fails with `NotRunning` while it is unreachable.
    async fn client(&self) -> Result<EngineConnection>;

    /// Capabilities of the engine.
    fn features(&self) -> Features;
}

/// Everything a factory needs to build a driver for one node.
#[derive(Debug, Clone, Default)]
pub struct InitConfig {
    /// Node name
    pub name: String,

    /// Node endpoint, if the node has one
    pub endpoint: Option<EngineEndpoint>,

    /// Platforms the node serves
    pub platforms: Vec<Platform>,

    /// Backend specific options
    pub driver_opts: BTreeMap<String, String>,

    /// Private directory for the driver's files
    pub state_dir: PathBuf,
}

/// Driver factory trait.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    /// Backend name, as stored in node groups.
    fn name(&self) -> &str;

    /// One-line description for listings.
    fn usage(&self) -> &str;

    /// How well this backend suits the ambient engine endpoint. Lower is better.
    async fn priority(&self, api: Option<&EngineEndpoint>) -> i32;

    /// Build a driver for one node.
    fn new_driver(&self, cfg: InitConfig) -> Result<Arc<dyn Driver>>;

    /// Whether named builder instances may use this backend.
    fn allows_instances(&self) -> bool;
}

/// Reject options a backend does not understand.
pub(crate) fn check_opts(
    driver: &str,
    opts: &BTreeMap<String, String>,
    known: &[&str],
) -> Result<()> {
    match opts.keys().find(|k| !known.contains(&k.as_str())) {
        Some(key) => Err(crate::error::KilnError::InvalidDriverConfig {
            driver: driver.to_string(),
            reason: format!("invalid driver option {}", key),
        }),
        None => Ok(()),
    }
}

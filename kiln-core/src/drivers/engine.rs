//! `engine` backend: an already-running build engine.
//!
//! kiln does not manage the engine's lifecycle here, so bootstrap, stop and rm
//! are no-ops. The backend backs the implicit `default` builder.

use crate::drivers::{
    check_opts, Driver, DriverFactory, DriverInfo, DriverStatus, EngineConnection,
    EngineEndpoint, Features, InitConfig,
};
use crate::error::{KilnError, Result};
use crate::progress::Logger;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};

const PRIORITY_DEFAULT: i32 = 10;
const PRIORITY_UNSUPPORTED: i32 = 99;

/// Factory for [`EngineDriver`].
#[derive(Debug, Default)]
pub struct EngineFactory;

#[async_trait]
impl DriverFactory for EngineFactory {
    fn name(&self) -> &str {
        "engine"
    }

    fn usage(&self) -> &str {
        "Use an already running build engine"
    }

    async fn priority(&self, api: Option<&EngineEndpoint>) -> i32 {
        let Some(api) = api else {
            return PRIORITY_UNSUPPORTED;
        };
        match api.connect().await {
            Ok(_) => PRIORITY_DEFAULT,
            Err(e) => {
                debug!(endpoint = %api, error = %e, "Engine endpoint not reachable");
                PRIORITY_UNSUPPORTED
            }
        }
    }

    fn new_driver(&self, cfg: InitConfig) -> Result<Arc<dyn Driver>> {
        check_opts(self.name(), &cfg.driver_opts, &[])?;
        let endpoint = cfg.endpoint.ok_or_else(|| KilnError::InvalidDriverConfig {
            driver: self.name().to_string(),
            reason: format!("node {} has no endpoint", cfg.name),
        })?;
        Ok(Arc::new(EngineDriver { endpoint }))
    }

    fn allows_instances(&self) -> bool {
        false
    }
}

/// Driver for an engine listening at a fixed endpoint.
#[derive(Debug)]
pub struct EngineDriver {
    endpoint: EngineEndpoint,
}

impl EngineDriver {
    pub fn new(endpoint: EngineEndpoint) -> Self {
        Self { endpoint }
    }

    pub fn endpoint(&self) -> &EngineEndpoint {
        &self.endpoint
    }
}

#[async_trait]
impl Driver for EngineDriver {
    fn factory_name(&self) -> &str {
        "engine"
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn info(&self) -> Result<DriverInfo> {
        self.endpoint
            .connect()
            .await
            .map_err(|e| KilnError::NotConnecting { reason: e.to_string() })?;
        Ok(DriverInfo { status: DriverStatus::Running })
    }

    async fn bootstrap(&self, _logger: &Logger) -> Result<()> {
        Ok(())
    }

    async fn stop(&self, _force: bool) -> Result<()> {
        Ok(())
    }

    async fn rm(&self, _force: bool) -> Result<()> {
        Ok(())
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn client(&self) -> Result<EngineConnection> {
        self.endpoint
            .connect()
            .await
            .map_err(|e| KilnError::NotRunning { reason: e.to_string() })
    }

    fn features(&self) -> Features {
        Features::default()
    }
}

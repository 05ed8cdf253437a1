//! Bootstrap sequencer.
//!
//! Brings a driver's backend to a connectable state: probe status, bootstrap
//! when not running, connect, and retry a bounded number of times while the
//! engine reports that it is not running yet.

use crate::drivers::{Driver, DriverStatus, EngineConnection};
use crate::error::{KilnError, Result};
use crate::progress::Logger;
use metrics::counter;
use tracing::{debug, info, instrument};

/// Attempts allowed before giving up on a backend that is not running.
pub const MAX_BOOT_ATTEMPTS: u32 = 2;

/// Return a ready connection to the engine behind `driver`.
///
/// Errors from `info` and `bootstrap` end the sequence immediately. A
/// `NotRunning` error from `client` is retried while attempts remain; any
/// other error is returned as-is.
#[instrument(skip(driver, logger), fields(driver = driver.factory_name()))]
pub async fn boot(driver: &dyn Driver, logger: &Logger) -> Result<EngineConnection> {
    let mut attempt = 0u32;
    loop {
        let info = driver.info().await?;
        attempt += 1;
        counter!("kiln_bootstrap_attempts_total", "driver" => driver.factory_name().to_string())
            .increment(1);
        debug!(attempt, status = %info.status, "Boot attempt");

        if info.status != DriverStatus::Running {
            if attempt > MAX_BOOT_ATTEMPTS {
                return Err(KilnError::BootstrapExhausted {
                    driver: driver.factory_name().to_string(),
                    attempts: MAX_BOOT_ATTEMPTS,
                });
            }
            driver.bootstrap(logger).await?;
        }

        match driver.client().await {
            Ok(conn) => {
                info!(attempt, endpoint = %conn.endpoint(), "Builder ready");
                return Ok(conn);
            }
            Err(e) if e.is_not_running() && attempt <= MAX_BOOT_ATTEMPTS => {
                debug!(attempt, error = %e, "Engine not running yet, retrying");
            }
            Err(e) => return Err(e),
        }
    }
}

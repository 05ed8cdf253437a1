//! `process` backend: a kiln-managed builder daemon per node.
//!
//! Lifecycle:
//! - Bootstrap: spawn the daemon, record its pid, wait for the engine socket
//! - Stop: SIGTERM (SIGKILL when forced), escalate after a grace period
//! - Rm: stop, then delete the node's state directory
//!
//! State files live in the node's state directory:
//! `engine.pid`, `engine.log` and, unless the node has an endpoint,
//! `engine.sock`.

use crate::drivers::{
    check_opts, Driver, DriverFactory, DriverInfo, DriverStatus, EngineConnection,
    EngineEndpoint, Features, InitConfig,
};
use crate::error::{KilnError, Result};
use crate::observability::metrics::record_driver_failure;
use crate::progress::{self, Logger};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

const DRIVER_NAME: &str = "process";
const PRIORITY: i32 = 30;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);
const STOP_GRACE: Duration = Duration::from_secs(10);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

const PID_FILE: &str = "engine.pid";
const LOG_FILE: &str = "engine.log";
const SOCKET_FILE: &str = "engine.sock";
/// Bytes of `engine.log` forwarded to progress when bootstrap fails.
const LOG_TAIL: usize = 4096;

/// Factory for [`ProcessDriver`].
#[derive(Debug, Default)]
pub struct ProcessFactory;

#[async_trait]
impl DriverFactory for ProcessFactory {
    fn name(&self) -> &str {
        DRIVER_NAME
    }

    fn usage(&self) -> &str {
        "Launch a dedicated builder daemon process"
    }

    async fn priority(&self, _api: Option<&EngineEndpoint>) -> i32 {
        PRIORITY
    }

    fn new_driver(&self, cfg: InitConfig) -> Result<Arc<dyn Driver>> {
        Ok(Arc::new(ProcessDriver::new(cfg)?))
    }

    fn allows_instances(&self) -> bool {
        true
    }
}

/// Driver supervising one builder daemon.
#[derive(Debug)]
pub struct ProcessDriver {
    name: String,
    state_dir: PathBuf,
    endpoint: EngineEndpoint,
    cmd: String,
    args: Vec<String>,
    timeout: Duration,
    stop_grace: Duration,
}

impl ProcessDriver {
    /// Build a driver from node config.
    ///
    /// Options: `cmd` (required), `args` (whitespace separated, `{socket}` is
    /// replaced by the engine address) and `timeout` (seconds).
    pub fn new(cfg: InitConfig) -> Result<Self> {
        check_opts(DRIVER_NAME, &cfg.driver_opts, &["cmd", "args", "timeout"])?;
        let invalid = |reason: String| KilnError::InvalidDriverConfig {
            driver: DRIVER_NAME.to_string(),
            reason,
        };

        let cmd = cfg
            .driver_opts
            .get("cmd")
            .filter(|c| !c.trim().is_empty())
            .cloned()
            .ok_or_else(|| invalid("option cmd is required".to_string()))?;

        let timeout = match cfg.driver_opts.get("timeout") {
            Some(v) => {
                let secs: f64 = v
                    .parse()
                    .map_err(|_| invalid(format!("invalid timeout {}", v)))?;
                if !secs.is_finite() || secs <= 0.0 {
                    return Err(invalid(format!("invalid timeout {}", v)));
                }
                Duration::from_secs_f64(secs)
            }
            None => DEFAULT_TIMEOUT,
        };

        let endpoint = cfg
            .endpoint
            .unwrap_or_else(|| EngineEndpoint::Unix(cfg.state_dir.join(SOCKET_FILE)));

        let address = endpoint.address();
        let args = cfg
            .driver_opts
            .get("args")
            .map(|a| a.split_whitespace().map(|s| s.replace("{socket}", &address)).collect())
            .unwrap_or_default();

        Ok(Self {
            name: cfg.name,
            state_dir: cfg.state_dir,
            endpoint,
            cmd,
            args,
            timeout,
            stop_grace: STOP_GRACE,
        })
    }

    pub fn endpoint(&self) -> &EngineEndpoint {
        &self.endpoint
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn pid_path(&self) -> PathBuf {
        self.state_dir.join(PID_FILE)
    }

    fn log_path(&self) -> PathBuf {
        self.state_dir.join(LOG_FILE)
    }

    /// Pid of the recorded daemon, if any.
    async fn read_pid(&self) -> Result<Option<i32>> {
        let path = self.pid_path();
        match fs::read_to_string(&path).await {
            Ok(s) => match s.trim().parse() {
                Ok(pid) => Ok(Some(pid)),
                Err(_) => {
                    warn!(path = %path.display(), "Ignoring malformed pid file");
                    Ok(None)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(KilnError::io(&path, e)),
        }
    }

    /// Spawn the daemon unless one is already alive.
    async fn start(&self) -> Result<i32> {
        if let Some(pid) = self.read_pid().await? {
            if process_alive(pid) {
                debug!(pid, "Builder process already running");
                return Ok(pid);
            }
        }

        fs::create_dir_all(&self.state_dir)
            .await
            .map_err(|e| KilnError::io(&self.state_dir, e))?;
        if let EngineEndpoint::Unix(path) = &self.endpoint {
            remove_if_exists(path).await?;
        }

        let log_path = self.log_path();
        let log = std::fs::File::create(&log_path).map_err(|e| KilnError::io(&log_path, e))?;
        let log_err = log.try_clone().map_err(|e| KilnError::io(&log_path, e))?;

        let mut command = Command::new(&self.cmd);
        command.args(&self.args).stdin(std::process::Stdio::null()).stdout(log).stderr(log_err);
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn().map_err(|e| {
            record_driver_failure(DRIVER_NAME, "spawn_failed");
            KilnError::BootstrapFailed {
                driver: DRIVER_NAME.to_string(),
                reason: format!("failed to spawn {}: {}", self.cmd, e),
            }
        })?;

        let pid = child.id().ok_or_else(|| KilnError::BootstrapFailed {
            driver: DRIVER_NAME.to_string(),
            reason: "failed to get process ID".to_string(),
        })? as i32;

        let pid_path = self.pid_path();
        fs::write(&pid_path, pid.to_string())
            .await
            .map_err(|e| KilnError::io(&pid_path, e))?;

        info!(pid, cmd = %self.cmd, "Started builder process");
        Ok(pid)
    }

    /// Wait until the engine accepts connections.
    async fn wait_for_socket(&self, pid: i32) -> Result<()> {
        let start = Instant::now();
        loop {
            if self.endpoint.connect().await.is_ok() {
                debug!(endpoint = %self.endpoint, "Engine socket ready");
                return Ok(());
            }

            if !process_alive(pid) {
                record_driver_failure(DRIVER_NAME, "process_exited");
                return Err(KilnError::BootstrapFailed {
                    driver: DRIVER_NAME.to_string(),
                    reason: format!(
                        "builder process exited, see {}",
                        self.log_path().display()
                    ),
                });
            }

            if start.elapsed() > self.timeout {
                record_driver_failure(DRIVER_NAME, "socket_timeout");
                return Err(KilnError::BootstrapFailed {
                    driver: DRIVER_NAME.to_string(),
                    reason: format!("engine socket did not appear within {:?}", self.timeout),
                });
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Last [`LOG_TAIL`] bytes of the daemon log.
    async fn log_tail(&self) -> Option<Vec<u8>> {
        let data = fs::read(self.log_path()).await.ok()?;
        let start = data.len().saturating_sub(LOG_TAIL);
        Some(data[start..].to_vec()).filter(|tail| !tail.is_empty())
    }

    /// Wait up to `grace` for `pid` to exit.
    async fn wait_for_exit(pid: i32, grace: Duration) -> bool {
        let start = Instant::now();
        while process_alive(pid) {
            if start.elapsed() > grace {
                return false;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        true
    }
}

#[async_trait]
impl Driver for ProcessDriver {
    fn factory_name(&self) -> &str {
        DRIVER_NAME
    }

    #[instrument(skip(self), fields(node = %self.name))]
    async fn info(&self) -> Result<DriverInfo> {
        let status = match self.read_pid().await? {
            None => DriverStatus::Inactive,
            Some(pid) if !process_alive(pid) => DriverStatus::Stopped,
            Some(_) => match self.endpoint.connect().await {
                Ok(_) => DriverStatus::Running,
                Err(_) => DriverStatus::Starting,
            },
        };
        Ok(DriverInfo { status })
    }

    #[instrument(skip(self, logger), fields(node = %self.name))]
    async fn bootstrap(&self, logger: &Logger) -> Result<()> {
        progress::wrap("[internal] booting builder", logger, |sub| async move {
            let pid = sub.wrap("starting builder process", self.start()).await?;
            let ready = sub.wrap("waiting for socket", self.wait_for_socket(pid)).await;
            if ready.is_err() {
                if let Some(tail) = self.log_tail().await {
                    sub.log(2, tail);
                }
            }
            ready
        })
        .await
    }

    #[instrument(skip(self), fields(node = %self.name))]
    async fn stop(&self, force: bool) -> Result<()> {
        if let Some(pid) = self.read_pid().await? {
            if process_alive(pid) {
                let signal = if force { libc::SIGKILL } else { libc::SIGTERM };
                send_signal(pid, signal);

                let mut exited = Self::wait_for_exit(pid, self.stop_grace).await;
                if !exited && !force {
                    warn!(pid, "Builder process ignored SIGTERM, killing");
                    send_signal(pid, libc::SIGKILL);
                    exited = Self::wait_for_exit(pid, self.stop_grace).await;
                }
                if !exited {
                    record_driver_failure(DRIVER_NAME, "stop_failed");
                    return Err(KilnError::StopFailed {
                        driver: DRIVER_NAME.to_string(),
                        reason: format!("builder process {} still running after SIGKILL", pid),
                    });
                }
                info!(pid, "Stopped builder process");
            }
        }

        remove_if_exists(&self.pid_path()).await?;
        if let EngineEndpoint::Unix(path) = &self.endpoint {
            if path.starts_with(&self.state_dir) {
                remove_if_exists(path).await?;
            }
        }
        Ok(())
    }

    #[instrument(skip(self), fields(node = %self.name))]
    async fn rm(&self, force: bool) -> Result<()> {
        self.stop(force).await?;
        match fs::remove_dir_all(&self.state_dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(KilnError::io(&self.state_dir, e)),
        }
    }

    async fn client(&self) -> Result<EngineConnection> {
        self.endpoint
            .connect()
            .await
            .map_err(|e| KilnError::NotRunning { reason: e.to_string() })
    }

    fn features(&self) -> Features {
        Features {
            oci_exporter: true,
            docker_exporter: false,
            cache_export: true,
            multi_platform: true,
        }
    }
}

async fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(KilnError::io(path, e)),
    }
}

/// Whether `pid` names a live process. Exited children of this process are
/// reaped first so they do not linger as zombies.
#[cfg(unix)]
fn process_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    let mut status = 0;
    if unsafe { libc::waitpid(pid, &mut status, libc::WNOHANG) } == pid {
        return false;
    }
    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn process_alive(_pid: i32) -> bool {
    false
}

#[cfg(unix)]
fn send_signal(pid: i32, signal: i32) {
    if unsafe { libc::kill(pid, signal) } != 0 {
        debug!(pid, signal, error = %std::io::Error::last_os_error(), "kill failed");
    }
}

#[cfg(not(unix))]
fn send_signal(pid: i32, signal: i32) {
    warn!(pid, signal, "Signals are not supported on this platform");
}

//! Progress events emitted while builders are brought up.
//!
//! Events follow the vertex model used by build engines: a vertex is a named
//! unit of work with start/completion timestamps, optionally carrying
//! sub-statuses and log lines. Rendering lives with the consumer.

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::mpsc;

/// A batch of progress updates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolveStatus {
    pub vertexes: Vec<Vertex>,
    pub statuses: Vec<VertexStatus>,
    pub logs: Vec<VertexLog>,
}

/// A named unit of work.
#[derive(Debug, Clone, PartialEq)]
pub struct Vertex {
    pub digest: String,
    pub name: String,
    pub started: Option<SystemTime>,
    pub completed: Option<SystemTime>,
    pub error: Option<String>,
}

/// Sub-status of a vertex, keyed by `id`.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexStatus {
    pub vertex: String,
    pub id: String,
    pub timestamp: SystemTime,
    pub started: Option<SystemTime>,
    pub completed: Option<SystemTime>,
}

/// Output produced while a vertex runs.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexLog {
    pub vertex: String,
    pub stream: u8,
    pub data: Vec<u8>,
    pub timestamp: SystemTime,
}

/// Sink for progress events.
#[derive(Clone)]
pub struct Logger {
    sink: Arc<dyn Fn(SolveStatus) + Send + Sync>,
}

impl Logger {
    pub fn new(sink: impl Fn(SolveStatus) + Send + Sync + 'static) -> Self {
        Self { sink: Arc::new(sink) }
    }

    /// A logger that drops every event.
    pub fn discard() -> Self {
        Self::new(|_| {})
    }

    /// Forward events into a channel. Events sent after the receiver is gone are dropped.
    pub fn from_sender(tx: mpsc::UnboundedSender<SolveStatus>) -> Self {
        Self::new(move |status| {
            let _ = tx.send(status);
        })
    }

    pub fn log(&self, status: SolveStatus) {
        (self.sink)(status)
    }

    /// Derive a logger that tags every vertex name with `prefix`.
    ///
    /// `[internal] boot` becomes `[node0 internal] boot`, `boot` becomes `[node0] boot`.
    pub fn with_prefix(&self, prefix: &str) -> Logger {
        let inner = self.clone();
        let prefix = prefix.to_string();
        Logger::new(move |mut status| {
            for v in &mut status.vertexes {
                v.name = add_prefix(&prefix, &v.name);
            }
            inner.log(status)
        })
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}

/// Handle for reporting progress inside a [`wrap`]ped vertex.
#[derive(Debug, Clone)]
pub struct SubLogger {
    digest: String,
    logger: Logger,
}

impl SubLogger {
    /// Run `fut` as a sub-status `id` of the enclosing vertex.
    pub async fn wrap<T, Fut>(&self, id: &str, fut: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let started = SystemTime::now();
        self.status(id, started, None);
        let result = fut.await;
        self.status(id, started, Some(SystemTime::now()));
        result
    }

    /// Attach output to the enclosing vertex.
    pub fn log(&self, stream: u8, data: impl Into<Vec<u8>>) {
        self.logger.log(SolveStatus {
            logs: vec![VertexLog {
                vertex: self.digest.clone(),
                stream,
                data: data.into(),
                timestamp: SystemTime::now(),
            }],
            ..Default::default()
        });
    }

    fn status(&self, id: &str, started: SystemTime, completed: Option<SystemTime>) {
        self.logger.log(SolveStatus {
            statuses: vec![VertexStatus {
                vertex: self.digest.clone(),
                id: id.to_string(),
                timestamp: SystemTime::now(),
                started: Some(started),
                completed,
            }],
            ..Default::default()
        });
    }
}

/// Run `f` as a vertex called `name`, reporting its start, completion and error.
pub async fn wrap<T, F, Fut>(name: &str, logger: &Logger, f: F) -> Result<T>
where
    F: FnOnce(SubLogger) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let digest = new_digest();
    let started = SystemTime::now();
    let vertex = Vertex {
        digest: digest.clone(),
        name: name.to_string(),
        started: Some(started),
        completed: None,
        error: None,
    };
    logger.log(SolveStatus { vertexes: vec![vertex.clone()], ..Default::default() });

    let result = f(SubLogger { digest, logger: logger.clone() }).await;

    let done = Vertex {
        completed: Some(SystemTime::now()),
        error: result.as_ref().err().map(|e| e.to_string()),
        ..vertex
    };
    logger.log(SolveStatus { vertexes: vec![done], ..Default::default() });
    result
}

fn new_digest() -> String {
    let id = uuid::Uuid::new_v4();
    format!("sha256:{:x}", Sha256::digest(id.as_bytes()))
}

fn add_prefix(prefix: &str, name: &str) -> String {
    match name.strip_prefix('[') {
        Some(rest) => format!("[{} {}", prefix, rest),
        None => format!("[{}] {}", prefix, name),
    }
}

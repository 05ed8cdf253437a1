//! Terminal rendering of builder progress.

use colored::Colorize;
use kiln_core::progress::{Logger, SolveStatus};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Prints progress events as they arrive.
pub struct Printer {
    tx: mpsc::UnboundedSender<SolveStatus>,
    handle: JoinHandle<()>,
}

impl Printer {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(render(rx));
        Self { tx, handle }
    }

    /// A logger feeding this printer.
    pub fn logger(&self) -> Logger {
        Logger::from_sender(self.tx.clone())
    }

    /// Wait until every logger is dropped and all events are printed.
    pub async fn wait(self) {
        drop(self.tx);
        let _ = self.handle.await;
    }
}

async fn render(mut rx: mpsc::UnboundedReceiver<SolveStatus>) {
    let mut names: HashMap<String, String> = HashMap::new();

    while let Some(status) = rx.recv().await {
        for v in status.vertexes {
            names.insert(v.digest.clone(), v.name.clone());
            match (v.completed, &v.error) {
                (None, _) => eprintln!("{} {}", "=>".cyan().bold(), v.name),
                (Some(_), Some(err)) => {
                    eprintln!("{} {}: {}", "✗".red().bold(), v.name, err.red())
                }
                (Some(done), None) => {
                    let took = v
                        .started
                        .and_then(|s| done.duration_since(s).ok())
                        .map(|d| format!(" {:.1}s", d.as_secs_f64()))
                        .unwrap_or_default();
                    eprintln!("{} {}{}", "✓".green().bold(), v.name, took.dimmed())
                }
            }
        }

        for s in status.statuses {
            if s.completed.is_some() {
                let vertex = names.get(&s.vertex).map(String::as_str).unwrap_or("");
                eprintln!("   {} {} {}", "•".dimmed(), vertex.dimmed(), s.id);
            }
        }

        for log in status.logs {
            let text = String::from_utf8_lossy(&log.data);
            for line in text.lines() {
                eprintln!("   {}", line.dimmed());
            }
        }
    }
}

//! File-backed builder instance store.
//!
//! Layout under the store root:
//! - `instances/<name>`: one JSON document per node group
//! - `current`: current selection pointers (global and per scope)
//! - `.lock`: sentinel file for the cross-process transaction lock
//!
//! Every read and write goes through a [`Txn`], which holds the exclusive lock
//! for its whole lifetime.

use crate::error::{KilnError, Result};
use crate::types::node_group::{validate_name, NodeGroup};
use lock::LockGuard;
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

mod lock;

#[cfg(test)]
mod tests;

const INSTANCES_DIR: &str = "instances";
const CURRENT_FILE: &str = "current";
const LOCK_FILE: &str = ".lock";

const NAME_ADJECTIVES: &[&str] = &[
    "brave", "calm", "eager", "fervent", "gifted", "happy", "jolly", "keen", "lucid", "nifty",
    "quirky", "serene", "sharp", "stoic", "tender", "vibrant", "wizardly", "zealous",
];

const NAME_NOUNS: &[&str] = &[
    "babbage", "curie", "darwin", "euler", "fermat", "galois", "hopper", "kepler", "lovelace",
    "noether", "pascal", "ritchie", "shannon", "thompson", "turing", "wozniak",
];

/// Current selection pointers.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Selection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    global: Option<String>,

    #[serde(default)]
    scopes: BTreeMap<String, String>,
}

/// Durable store of node groups.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    /// Open (or initialize) a store rooted at `root`.
    #[instrument(skip(root))]
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let instances = root.join(INSTANCES_DIR);
        tokio::fs::create_dir_all(&instances).await.map_err(|e| KilnError::io(&instances, e))?;

        debug!("Opened builder store at {:?}", root);
        Ok(Self { root })
    }

    /// Begin a transaction, waiting until no other transaction holds the lock.
    ///
    /// If the returned future is dropped while waiting, the lock is released as
    /// soon as the pending acquisition completes.
    #[instrument(skip(self))]
    pub async fn txn(&self) -> Result<Txn> {
        let lock_path = self.root.join(LOCK_FILE);
        let guard = tokio::task::spawn_blocking(move || LockGuard::acquire(&lock_path))
            .await
            .map_err(KilnError::internal)??;

        counter!("kiln_store_txn_total").increment(1);
        Ok(Txn { root: self.root.clone(), _guard: guard })
    }
}

/// An open store transaction.
///
/// Holds the store lock until [`Txn::release`] is called or the value is dropped.
#[derive(Debug)]
pub struct Txn {
    root: PathBuf,
    _guard: LockGuard,
}

impl Txn {
    /// Release the store lock.
    pub fn release(self) {
        drop(self);
    }

    /// Insert or replace a node group, keyed by its (lower-cased) name.
    #[instrument(skip(self, ng), fields(builder = %ng.name))]
    pub async fn save(&self, ng: &NodeGroup) -> Result<()> {
        let name = validate_name(&ng.name)?;
        let mut ng = ng.clone();
        ng.name = name;

        let data = serde_json::to_vec_pretty(&ng).map_err(KilnError::internal)?;
        write_atomic(&self.instance_path(&ng.name), &data).await?;

        info!("Saved builder {}", ng.name);
        Ok(())
    }

    /// Load a node group by name.
    #[instrument(skip(self))]
    pub async fn node_group_by_name(&self, name: &str) -> Result<NodeGroup> {
        let name = validate_name(name)?;
        let path = self.instance_path(&name);

        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(KilnError::NotFound { name });
            }
            Err(e) => return Err(KilnError::io(&path, e)),
        };

        serde_json::from_slice(&data)
            .map_err(|e| KilnError::Corrupt { path, reason: e.to_string() })
    }

    /// List all node groups, ordered by name.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<NodeGroup>> {
        let dir = self.root.join(INSTANCES_DIR);
        let mut entries = tokio::fs::read_dir(&dir).await.map_err(|e| KilnError::io(&dir, e))?;

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| KilnError::io(&dir, e))? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            names.push(name);
        }
        names.sort();

        let mut groups = Vec::with_capacity(names.len());
        for name in names {
            groups.push(self.node_group_by_name(&name).await?);
        }
        Ok(groups)
    }

    /// Delete a node group. Removing an absent group is not an error.
    ///
    /// Selections pointing at the group are left in place and resolve to nothing.
    #[instrument(skip(self))]
    pub async fn remove(&self, name: &str) -> Result<()> {
        let name = validate_name(name)?;
        let path = self.instance_path(&name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("Removed builder {}", name);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(KilnError::io(&path, e)),
        }
    }

    /// Resolve the current node group for `scope`.
    ///
    /// The scope selection wins over the global one; a selection whose group no
    /// longer exists is skipped. Returns `None` when nothing resolves.
    #[instrument(skip(self))]
    pub async fn current(&self, scope: &str) -> Result<Option<NodeGroup>> {
        let selection = self.read_selection().await?;

        if let Some(ng) = self.resolve(selection.scopes.get(scope)).await? {
            return Ok(Some(ng));
        }
        self.resolve(selection.global.as_ref()).await
    }

    /// Select `name` as current.
    ///
    /// With `global` the global pointer is written. Otherwise the pointer for
    /// `scope` is written, and `default` additionally makes `name` the global
    /// fallback when no valid global selection exists yet.
    #[instrument(skip(self))]
    pub async fn set_current(
        &self,
        scope: &str,
        name: &str,
        global: bool,
        default: bool,
    ) -> Result<()> {
        let name = validate_name(name)?;
        let mut selection = self.read_selection().await?;

        if global {
            selection.global = Some(name);
        } else {
            selection.scopes.insert(scope.to_string(), name.clone());
            if default && self.resolve(selection.global.as_ref()).await?.is_none() {
                selection.global = Some(name);
            }
        }

        self.write_selection(&selection).await
    }

    /// Drop the selection for `scope`, so it falls back to the global one.
    #[instrument(skip(self))]
    pub async fn clear_current(&self, scope: &str) -> Result<()> {
        let mut selection = self.read_selection().await?;
        if selection.scopes.remove(scope).is_none() {
            return Ok(());
        }
        self.write_selection(&selection).await
    }

    /// Generate a random builder name that is not used yet.
    pub async fn generate_name(&self) -> Result<String> {
        for _ in 0..6 {
            let bytes = *uuid::Uuid::new_v4().as_bytes();
            let name = format!(
                "{}_{}",
                NAME_ADJECTIVES[bytes[0] as usize % NAME_ADJECTIVES.len()],
                NAME_NOUNS[bytes[1] as usize % NAME_NOUNS.len()]
            );
            match self.node_group_by_name(&name).await {
                Err(e) if e.is_not_found() => return Ok(name),
                Err(e) => return Err(e),
                Ok(_) => continue,
            }
        }
        Err(KilnError::Internal("failed to generate random name".to_string()))
    }

    fn instance_path(&self, name: &str) -> PathBuf {
        self.root.join(INSTANCES_DIR).join(name)
    }

    async fn read_selection(&self) -> Result<Selection> {
        let path = self.root.join(CURRENT_FILE);
        match tokio::fs::read(&path).await {
            Ok(data) => serde_json::from_slice(&data)
                .map_err(|e| KilnError::Corrupt { path, reason: e.to_string() }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Selection::default()),
            Err(e) => Err(KilnError::io(&path, e)),
        }
    }

    async fn write_selection(&self, selection: &Selection) -> Result<()> {
        let data = serde_json::to_vec_pretty(selection).map_err(KilnError::internal)?;
        write_atomic(&self.root.join(CURRENT_FILE), &data).await
    }

    /// Look up a selected group, treating missing or invalid targets as unset.
    async fn resolve(&self, name: Option<&String>) -> Result<Option<NodeGroup>> {
        let Some(name) = name else {
            return Ok(None);
        };
        match self.node_group_by_name(name).await {
            Ok(ng) => Ok(Some(ng)),
            Err(KilnError::NotFound { .. }) | Err(KilnError::InvalidName { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Write `data` to `path` via a temporary file and rename.
async fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    let tmp = dir.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()));

    tokio::fs::write(&tmp, data).await.map_err(|e| KilnError::io(&tmp, e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(|e| KilnError::io(&tmp, e))?;
    }

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(KilnError::io(path, e));
    }
    Ok(())
}

//! Workdir dealing.
//!
//! A dealer hands out writable replicas of the project tree, keyed by an
//! opaque identifier (in practice the worker name). The first `get` for an
//! id deep-copies the source tree into a fresh directory under the staging
//! root; later calls return the cached path. Replicating the tree is
//! expensive, so workers keep reusing their replica for the whole run and
//! the test runner's build cache stays warm inside it.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use anyhow::{Context, Result};
use walkdir::WalkDir;

/// Thread-safe, per-id cached replica dealer.
///
/// Each id owns a slot with its own mutex: two `get` calls for distinct ids
/// copy concurrently, while two calls for the same id can never produce two
/// replicas.
pub struct CachedDealer {
    staging: PathBuf,
    src: PathBuf,
    slots: RwLock<HashMap<String, Arc<Mutex<Option<PathBuf>>>>>,
    next_dir: AtomicUsize,
}

impl CachedDealer {
    pub fn new(staging: PathBuf, src: PathBuf) -> Self {
        Self {
            staging,
            src,
            slots: RwLock::new(HashMap::new()),
            next_dir: AtomicUsize::new(0),
        }
    }

    /// Return the replica for `id`, creating it on first call.
    ///
    /// The returned path is fully populated before this returns. On copy
    /// failure the partial replica is removed and the slot stays empty, so
    /// a later call can retry.
    pub fn get(&self, id: &str) -> Result<PathBuf> {
        let slot = self.slot(id);
        let mut guard = slot.lock().unwrap_or_else(|p| p.into_inner());

        if let Some(path) = guard.as_ref() {
            return Ok(path.clone());
        }

        let seq = self.next_dir.fetch_add(1, Ordering::Relaxed);
        let dest = self.staging.join(format!("wd-{seq:03}"));

        if let Err(e) = copy_tree(&self.src, &dest) {
            let _ = fs::remove_dir_all(&dest);
            return Err(e).with_context(|| format!("failed to build replica for {id:?}"));
        }

        *guard = Some(dest.clone());
        Ok(dest)
    }

    /// The staging root every replica lives under.
    pub fn work_dir(&self) -> &Path {
        &self.staging
    }

    /// Remove every replica handed out so far. Subsequent `get` calls
    /// produce fresh replicas.
    pub fn clean(&self) {
        let mut slots = self.slots.write().unwrap_or_else(|p| p.into_inner());
        for (id, slot) in slots.drain() {
            let guard = slot.lock().unwrap_or_else(|p| p.into_inner());
            if let Some(path) = guard.as_ref() {
                if let Err(e) = fs::remove_dir_all(path) {
                    tracing::warn!("failed to remove workdir {:?} for {id:?}: {e}", path);
                }
            }
        }
    }

    fn slot(&self, id: &str) -> Arc<Mutex<Option<PathBuf>>> {
        {
            let slots = self.slots.read().unwrap_or_else(|p| p.into_inner());
            if let Some(slot) = slots.get(id) {
                return Arc::clone(slot);
            }
        }

        let mut slots = self.slots.write().unwrap_or_else(|p| p.into_inner());
        Arc::clone(slots.entry(id.to_string()).or_default())
    }
}

/// Recursively copy `src` into `dst`, preserving file modes and symlink
/// targets. Directory modes are applied after the walk so that a read-only
/// source directory does not block the copy of its own children.
fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    let mut dir_modes: Vec<(PathBuf, fs::Permissions)> = Vec::new();

    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry.with_context(|| format!("failed to walk {:?}", src))?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .expect("walkdir yields paths under its root");
        let target = dst.join(rel);

        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("failed to create {:?}", target))?;
            let meta = entry
                .metadata()
                .with_context(|| format!("failed to stat {:?}", entry.path()))?;
            dir_modes.push((target, meta.permissions()));
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())
                .with_context(|| format!("failed to read link {:?}", entry.path()))?;
            #[cfg(unix)]
            std::os::unix::fs::symlink(&link, &target)
                .with_context(|| format!("failed to link {:?}", target))?;
            #[cfg(not(unix))]
            {
                // Without symlink support, fall back to copying the target.
                fs::copy(entry.path(), &target)
                    .with_context(|| format!("failed to copy {:?}", entry.path()))?;
            }
        } else {
            fs::copy(entry.path(), &target)
                .with_context(|| format!("failed to copy {:?}", entry.path()))?;
        }
    }

    for (path, perms) in dir_modes.into_iter().rev() {
        fs::set_permissions(&path, perms)
            .with_context(|| format!("failed to set permissions on {:?}", path))?;
    }

    Ok(())
}

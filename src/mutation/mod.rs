//! Source mutation.
//!
//! A parsed file (`SourceTree`) is shared by every candidate derived from
//! it; candidates carry a byte span into it instead of a private copy of
//! the tree. Applying a candidate splices the replacement token into the
//! pristine source text and writes the result into the candidate's workdir,
//! so the shared tree is never modified and stays byte-identical for the
//! whole run.
//!
//! Since several candidates can target the same file, every apply and
//! rollback of one on-disk file is serialized through a process-global
//! lock table keyed by the project-relative path. Keeping a lock per file
//! instead of one big lock lets mutations on different files proceed in
//! parallel.

pub mod scanner;

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;

use crate::catalog::MutantKind;

/// Classification of a candidate mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutantStatus {
    /// No covered range contains the candidate; it is never executed.
    NotCovered,
    /// Ready to execute (and the terminal value of a dry run).
    Runnable,
    /// Tests passed despite the mutation.
    Lived,
    /// Tests failed; the mutation was detected.
    Killed,
    /// The test run exceeded its deadline.
    TimedOut,
    /// The mutation did not compile.
    NotViable,
    /// Drained without execution (cancellation or apply failure).
    Skipped,
}

impl MutantStatus {
    pub fn is_runnable(&self) -> bool {
        matches!(self, MutantStatus::Runnable)
    }
}

impl std::fmt::Display for MutantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MutantStatus::NotCovered => "NOT COVERED",
            MutantStatus::Runnable => "RUNNABLE",
            MutantStatus::Lived => "LIVED",
            MutantStatus::Killed => "KILLED",
            MutantStatus::TimedOut => "TIMED OUT",
            MutantStatus::NotViable => "NOT VIABLE",
            MutantStatus::Skipped => "SKIPPED",
        };
        write!(f, "{s}")
    }
}

/// A parsed source file, shared across all candidates derived from it.
///
/// The syntax tree itself lives only through enumeration (its token
/// buffers are not thread-safe); candidates keep the pristine source
/// buffer, which is all apply needs.
#[derive(Debug)]
pub struct SourceTree {
    rel_path: PathBuf,
    source: Arc<String>,
    ast: syn::File,
}

impl SourceTree {
    /// Parse `source` as a Rust file.
    ///
    /// Files starting with a BOM or shebang are rejected: the parser strips
    /// them, which would shift every span off the on-disk bytes.
    pub fn parse(rel_path: PathBuf, source: String) -> Result<Self> {
        if source.starts_with('\u{feff}') || source.starts_with("#!") {
            anyhow::bail!("{:?} starts with a BOM or shebang", rel_path);
        }

        let ast = syn::parse_file(&source)
            .with_context(|| format!("failed to parse {:?}", rel_path))?;

        Ok(Self {
            rel_path,
            source: Arc::new(source),
            ast,
        })
    }

    /// Path relative to the project root.
    pub fn rel_path(&self) -> &Path {
        &self.rel_path
    }

    /// The pristine source text spans index into.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Shared handle to the pristine source, passed into every candidate.
    pub fn shared_source(&self) -> Arc<String> {
        Arc::clone(&self.source)
    }

    pub fn ast(&self) -> &syn::File {
        &self.ast
    }
}

/// Location of one operator token: byte range plus 1-based line and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSpan {
    pub start: usize,
    pub end: usize,
    pub line: u32,
    pub column: u32,
}

/// A candidate mutation.
///
/// `source` is the pristine text shared with every other candidate from
/// the same file; `span` indexes into it.
#[derive(Debug)]
pub struct Mutant {
    pkg: String,
    file: PathBuf,
    source: Arc<String>,
    span: TokenSpan,
    kind: MutantKind,
    original: &'static str,
    replacement: &'static str,
    status: MutantStatus,
    workdir: Option<PathBuf>,
    orig_file: Option<Vec<u8>>,
    duration: Option<Duration>,
}

impl Mutant {
    pub fn new(
        pkg: &str,
        file: PathBuf,
        source: Arc<String>,
        span: TokenSpan,
        kind: MutantKind,
        original: &'static str,
        replacement: &'static str,
    ) -> Self {
        Self {
            pkg: pkg.to_string(),
            file,
            source,
            span,
            kind,
            original,
            replacement,
            status: MutantStatus::Runnable,
            workdir: None,
            orig_file: None,
            duration: None,
        }
    }

    pub fn pkg(&self) -> &str {
        &self.pkg
    }

    /// Path relative to the project root.
    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn span(&self) -> TokenSpan {
        self.span
    }

    pub fn kind(&self) -> MutantKind {
        self.kind
    }

    pub fn original(&self) -> &'static str {
        self.original
    }

    pub fn replacement(&self) -> &'static str {
        self.replacement
    }

    pub fn status(&self) -> MutantStatus {
        self.status
    }

    pub fn set_status(&mut self, status: MutantStatus) {
        self.status = status;
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration = Some(duration);
    }

    /// The workdir apply and rollback operate in. Unset until the executor
    /// draws one from the dealer.
    pub fn workdir(&self) -> Option<&Path> {
        self.workdir.as_deref()
    }

    pub fn set_workdir(&mut self, workdir: PathBuf) {
        self.workdir = Some(workdir);
    }

    /// Write the mutated file into the workdir.
    ///
    /// Holds the per-file lock for the whole read-splice-write sequence.
    /// The pre-apply bytes are stashed for `rollback`; the shared tree is
    /// left untouched. On error nothing is stashed and the candidate must
    /// not be rolled back.
    pub async fn apply(&mut self) -> Result<()> {
        let workdir = self
            .workdir
            .clone()
            .context("workdir not set before apply")?;

        let lock = file_lock(&self.file);
        let _guard = lock.lock().await;

        let target = workdir.join(&self.file);
        let current = tokio::fs::read(&target)
            .await
            .with_context(|| format!("failed to read {:?}", target))?;

        let mutated = splice(
            &self.source,
            self.span.start,
            self.span.end,
            self.replacement,
        );
        write_atomic(target, mutated.into_bytes()).await?;

        self.orig_file = Some(current);
        Ok(())
    }

    /// Put the pre-apply bytes back and drop the stash.
    pub async fn rollback(&mut self) -> Result<()> {
        let bytes = self
            .orig_file
            .take()
            .context("rollback without a preceding apply")?;
        let workdir = self
            .workdir
            .clone()
            .context("workdir not set before rollback")?;

        let lock = file_lock(&self.file);
        let _guard = lock.lock().await;

        let target = workdir.join(&self.file);
        tokio::fs::write(&target, &bytes)
            .await
            .with_context(|| format!("failed to restore {:?}", target))
    }
}

/// Replace `code[start..end]` with `replacement`.
fn splice(code: &str, start: usize, end: usize, replacement: &str) -> String {
    debug_assert!(
        start <= end && end <= code.len(),
        "span [{start}, {end}) out of bounds for code length {}",
        code.len()
    );

    let mut out = String::with_capacity(code.len() + replacement.len());
    out.push_str(&code[..start]);
    out.push_str(replacement);
    out.push_str(&code[end..]);
    out
}

/// Write `bytes` to `target` through a temp file in the same directory,
/// mode 0600 on unix.
async fn write_atomic(target: PathBuf, bytes: Vec<u8>) -> Result<()> {
    tokio::task::spawn_blocking(move || {
        let dir = target
            .parent()
            .with_context(|| format!("{:?} has no parent directory", target))?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("failed to create temp file in {:?}", dir))?;
        tmp.write_all(&bytes)
            .with_context(|| format!("failed to write mutated {:?}", target))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o600))
                .context("failed to set mutated file permissions")?;
        }

        tmp.persist(&target)
            .map_err(|e| e.error)
            .with_context(|| format!("failed to replace {:?}", target))?;
        Ok(())
    })
    .await
    .context("atomic write task panicked")?
}

/// Process-global per-file lock table. Created lazily, entries are small
/// and bounded by file count, so they are never reclaimed within a run.
static FILE_LOCKS: OnceLock<RwLock<HashMap<PathBuf, Arc<AsyncMutex<()>>>>> = OnceLock::new();

fn file_lock(path: &Path) -> Arc<AsyncMutex<()>> {
    let locks = FILE_LOCKS.get_or_init(|| RwLock::new(HashMap::new()));

    {
        let map = locks.read().unwrap_or_else(|p| p.into_inner());
        if let Some(lock) = map.get(path) {
            return Arc::clone(lock);
        }
    }

    let mut map = locks.write().unwrap_or_else(|p| p.into_inner());
    Arc::clone(map.entry(path.to_path_buf()).or_default())
}

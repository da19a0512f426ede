//! Changed-line filter from a unified diff.
//!
//! When a diff file is supplied, only candidates on lines the diff added
//! or modified are kept. The parser extracts added-line numbers per file;
//! removed lines have no position in the new tree and are ignored.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

#[derive(Debug, Default, Clone)]
pub struct DiffFilter {
    changed: HashMap<PathBuf, BTreeSet<u32>>,
}

impl DiffFilter {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read diff file {:?}", path))?;
        Ok(Self::parse(&text))
    }

    /// Parse a unified diff. Lines outside recognized hunks are ignored, so
    /// surrounding commit metadata is harmless.
    pub fn parse(text: &str) -> Self {
        let mut changed: HashMap<PathBuf, BTreeSet<u32>> = HashMap::new();
        let mut current_file: Option<PathBuf> = None;
        let mut new_line: u32 = 0;

        for line in text.lines() {
            if let Some(name) = line.strip_prefix("+++ ") {
                let name = name.split('\t').next().unwrap_or(name);
                current_file = match name {
                    "/dev/null" => None,
                    _ => Some(PathBuf::from(
                        name.strip_prefix("b/").unwrap_or(name),
                    )),
                };
            } else if line.starts_with("@@") {
                new_line = hunk_new_start(line).unwrap_or(0);
            } else if let Some(file) = &current_file {
                if line.starts_with("+") {
                    if new_line > 0 {
                        changed.entry(file.clone()).or_default().insert(new_line);
                        new_line += 1;
                    }
                } else if line.starts_with("-") || line.starts_with('\\') {
                    // Removed line or "\ No newline at end of file".
                } else if new_line > 0 {
                    new_line += 1;
                }
            }
        }

        Self { changed }
    }

    /// Does the diff touch `file` at `line`?
    pub fn is_changed(&self, file: &Path, line: u32) -> bool {
        self.changed
            .get(file)
            .is_some_and(|lines| lines.contains(&line))
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }
}

/// Extract the new-file start line from `@@ -a,b +c,d @@`.
fn hunk_new_start(header: &str) -> Option<u32> {
    let plus = header.split_whitespace().find(|p| p.starts_with('+'))?;
    let start = plus.trim_start_matches('+');
    let start = start.split(',').next()?;
    start.parse().ok()
}

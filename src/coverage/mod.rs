//! Coverage profile parsing and position lookup.
//!
//! The profile is a line-oriented text format: a `mode:` header followed by
//! records `<file>:<startLine>.<startCol>,<endLine>.<endCol> <stmts> <count>`.
//! Only records with a positive hit count are retained. Per file the
//! covered ranges are kept sorted and coalesced so that lookups are a
//! binary search.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// A covered source range. Start is inclusive, end is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverBlock {
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl CoverBlock {
    fn start(&self) -> (u32, u32) {
        (self.start_line, self.start_col)
    }

    fn end(&self) -> (u32, u32) {
        (self.end_line, self.end_col)
    }

    fn contains(&self, line: u32, col: u32) -> bool {
        let pos = (line, col);
        self.start() <= pos && pos < self.end()
    }
}

/// Per-file covered ranges with positive hit counts.
#[derive(Debug, Default, Clone)]
pub struct CoverageProfile {
    blocks: HashMap<PathBuf, Vec<CoverBlock>>,
}

impl CoverageProfile {
    /// Parse a profile from a reader.
    ///
    /// Unparseable lines are rejected rather than skipped: a malformed
    /// profile means the upstream coverage run went wrong.
    pub fn parse<R: BufRead>(reader: R) -> Result<Self> {
        let mut blocks: HashMap<PathBuf, Vec<CoverBlock>> = HashMap::new();

        for (idx, line) in reader.lines().enumerate() {
            let line = line.context("failed to read coverage profile")?;
            let line = line.trim();
            if line.is_empty() || line.starts_with("mode:") {
                continue;
            }

            let (file, block, count) = parse_record(line)
                .with_context(|| format!("malformed coverage record at line {}", idx + 1))?;
            if count == 0 {
                continue;
            }
            blocks.entry(file).or_default().push(block);
        }

        for ranges in blocks.values_mut() {
            ranges.sort_by_key(|b| (b.start(), b.end()));
            coalesce(ranges);
        }

        Ok(Self { blocks })
    }

    /// Parse a profile file from disk.
    pub fn from_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed to open coverage profile {:?}", path))?;
        Self::parse(std::io::BufReader::new(file))
    }

    /// Is the position inside any covered range of `file`?
    pub fn covers(&self, file: &Path, line: u32, col: u32) -> bool {
        let Some(ranges) = self.blocks.get(file) else {
            return false;
        };

        // Last block starting at or before the position is the only one
        // that can contain it once ranges are coalesced.
        let idx = ranges.partition_point(|b| b.start() <= (line, col));
        idx > 0 && ranges[idx - 1].contains(line, col)
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Number of files with at least one covered range.
    pub fn file_count(&self) -> usize {
        self.blocks.len()
    }
}

/// Parse one record: `<file>:<sl>.<sc>,<el>.<ec> <stmts> <count>`.
fn parse_record(line: &str) -> Result<(PathBuf, CoverBlock, u64)> {
    let (location, tail) = line.rsplit_once(' ').context("missing hit count")?;
    let count: u64 = tail.trim().parse().context("hit count is not a number")?;

    let (location, _stmts) = location.rsplit_once(' ').context("missing statement count")?;
    let (file, span) = location.rsplit_once(':').context("missing file separator")?;
    let (start, end) = span.split_once(',').context("missing range separator")?;

    let parse_pos = |s: &str| -> Result<(u32, u32)> {
        let (l, c) = s.split_once('.').context("position is not line.col")?;
        Ok((l.parse()?, c.parse()?))
    };
    let (start_line, start_col) = parse_pos(start)?;
    let (end_line, end_col) = parse_pos(end)?;

    Ok((
        PathBuf::from(file),
        CoverBlock {
            start_line,
            start_col,
            end_line,
            end_col,
        },
        count,
    ))
}

/// Merge overlapping or touching ranges in a sorted list.
fn coalesce(ranges: &mut Vec<CoverBlock>) {
    let mut merged: Vec<CoverBlock> = Vec::with_capacity(ranges.len());
    for block in ranges.drain(..) {
        match merged.last_mut() {
            Some(last) if block.start() <= last.end() => {
                if block.end() > last.end() {
                    last.end_line = block.end_line;
                    last.end_col = block.end_col;
                }
            }
            _ => merged.push(block),
        }
    }
    *ranges = merged;
}

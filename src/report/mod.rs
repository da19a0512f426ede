//! Result records and report output.
//!
//! The engine streams classified candidates; this module turns them into
//! log lines, a console summary, and an optional JSON report file. Rich
//! rendering (HTML and friends) belongs to external tooling consuming the
//! JSON.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::catalog::MutantKind;
use crate::engine::RunSummary;
use crate::mutation::{Mutant, MutantStatus};

/// One classified candidate, as reported.
#[derive(Debug, Clone, Serialize)]
pub struct MutantRecord {
    pub package: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub kind: MutantKind,
    pub original: String,
    pub replacement: String,
    pub status: MutantStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl MutantRecord {
    pub fn from_mutant(mutant: &Mutant) -> Self {
        Self {
            package: mutant.pkg().to_string(),
            file: mutant.file().display().to_string(),
            line: mutant.span().line,
            column: mutant.span().column,
            kind: mutant.kind(),
            original: mutant.original().to_string(),
            replacement: mutant.replacement().to_string(),
            status: mutant.status(),
            duration_ms: mutant.duration().map(|d| d.as_millis() as u64),
        }
    }
}

/// One line per classified candidate, for the live log.
pub fn format_result(mutant: &Mutant) -> String {
    let span = mutant.span();
    let replacement = match mutant.replacement() {
        "" => "<removed>",
        other => other,
    };
    let timing = match mutant.duration() {
        Some(d) => format!(" [{:.2}s]", d.as_secs_f64()),
        None => String::new(),
    };
    format!(
        "{} {} ({} -> {}) at {}:{}:{}{}",
        mutant.status(),
        mutant.kind(),
        mutant.original(),
        replacement,
        mutant.file().display(),
        span.line,
        span.column,
        timing
    )
}

#[derive(Debug, Serialize)]
struct JsonSummary {
    killed: usize,
    lived: usize,
    timed_out: usize,
    not_viable: usize,
    not_covered: usize,
    skipped: usize,
    runnable: usize,
    elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    test_efficacy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mutation_coverage: Option<f64>,
}

#[derive(Debug, Serialize)]
struct JsonReport<'a> {
    tool: &'static str,
    version: &'static str,
    summary: JsonSummary,
    mutants: &'a [MutantRecord],
}

/// Write the full run as pretty JSON.
pub fn write_json(
    path: &Path,
    summary: &RunSummary,
    dry_run: bool,
    records: &[MutantRecord],
) -> Result<()> {
    let report = JsonReport {
        tool: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        summary: json_summary(summary, dry_run),
        mutants: records,
    };

    let json = serde_json::to_string_pretty(&report).context("failed to serialize report")?;
    std::fs::write(path, json).with_context(|| format!("failed to write report {:?}", path))?;
    Ok(())
}

/// Console summary block. Efficacy and coverage are meaningless for a dry
/// run and are left out.
pub fn print_summary(summary: &RunSummary, dry_run: bool) {
    println!("--- mutation run summary ---");
    println!("candidates:    {}", summary.total());
    println!("killed:        {}", summary.killed);
    println!("lived:         {}", summary.lived);
    println!("timed out:     {}", summary.timed_out);
    println!("not viable:    {}", summary.not_viable);
    println!("not covered:   {}", summary.not_covered);
    println!("skipped:       {}", summary.skipped);
    if dry_run {
        println!("runnable:      {}", summary.runnable);
        println!("dry run: no tests were executed");
    } else {
        println!(
            "test efficacy:     {:.2}%",
            summary.efficacy() * 100.0
        );
        println!(
            "mutation coverage: {:.2}%",
            summary.mutation_coverage() * 100.0
        );
    }
    println!("elapsed:       {:.2}s", summary.elapsed.as_secs_f64());
}

fn json_summary(summary: &RunSummary, dry_run: bool) -> JsonSummary {
    JsonSummary {
        killed: summary.killed,
        lived: summary.lived,
        timed_out: summary.timed_out,
        not_viable: summary.not_viable,
        not_covered: summary.not_covered,
        skipped: summary.skipped,
        runnable: summary.runnable,
        elapsed_ms: summary.elapsed.as_millis() as u64,
        test_efficacy: (!dry_run).then(|| summary.efficacy()),
        mutation_coverage: (!dry_run).then(|| summary.mutation_coverage()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::TokenSpan;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn sample_mutant() -> Mutant {
        let source = Arc::new("pub fn f(a: i32, b: i32) -> bool { a < b }\n".to_string());
        let start = source.find('<').unwrap();
        let mut m = Mutant::new(
            "example",
            PathBuf::from("src/lib.rs"),
            Arc::clone(&source),
            TokenSpan {
                start,
                end: start + 1,
                line: 1,
                column: start as u32 + 1,
            },
            MutantKind::ConditionalsBoundary,
            "<",
            "<=",
        );
        m.set_status(MutantStatus::Killed);
        m.set_duration(Duration::from_millis(1500));
        m
    }

    #[test]
    fn test_record_carries_the_result_stream_fields() {
        let record = MutantRecord::from_mutant(&sample_mutant());
        assert_eq!(record.package, "example");
        assert_eq!(record.file, "src/lib.rs");
        assert_eq!(record.line, 1);
        assert_eq!(record.kind, MutantKind::ConditionalsBoundary);
        assert_eq!(record.original, "<");
        assert_eq!(record.replacement, "<=");
        assert_eq!(record.status, MutantStatus::Killed);
        assert_eq!(record.duration_ms, Some(1500));
    }

    #[test]
    fn test_format_result_line() {
        let line = format_result(&sample_mutant());
        assert!(line.starts_with("KILLED CONDITIONALS_BOUNDARY (< -> <=)"));
        assert!(line.contains("src/lib.rs:1:"));
        assert!(line.contains("[1.50s]"));
    }

    #[test]
    fn test_empty_replacement_is_readable() {
        let source = Arc::new("fn f(x: i32) -> i32 { -x }".to_string());
        let start = source.find("-x").unwrap();
        let m = Mutant::new(
            "example",
            PathBuf::from("a.rs"),
            Arc::clone(&source),
            TokenSpan {
                start,
                end: start + 1,
                line: 1,
                column: start as u32 + 1,
            },
            MutantKind::InvertNegatives,
            "-",
            "",
        );
        assert!(format_result(&m).contains("(- -> <removed>)"));
    }

    #[test]
    fn test_write_json_report() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.json");

        let mut summary = RunSummary::default();
        summary.killed = 2;
        summary.lived = 1;
        let records = vec![MutantRecord::from_mutant(&sample_mutant())];

        write_json(&path, &summary, false, &records).unwrap();

        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed["tool"], "mutiny");
        assert_eq!(parsed["summary"]["killed"], 2);
        assert_eq!(parsed["mutants"][0]["status"], "killed");
        assert_eq!(parsed["mutants"][0]["kind"], "conditionals_boundary");
        assert!(parsed["summary"]["test_efficacy"].is_number());
    }

    #[test]
    fn test_dry_run_report_omits_metrics() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.json");

        let mut summary = RunSummary::default();
        summary.runnable = 3;
        write_json(&path, &summary, true, &[]).unwrap();

        let parsed: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert!(parsed["summary"].get("test_efficacy").is_none());
        assert_eq!(parsed["summary"]["runnable"], 3);
    }
}

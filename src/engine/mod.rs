//! Engine driver: baseline, enumeration, execution, aggregation.

pub mod executor;
pub mod pool;

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::catalog::MutantKind;
use crate::coverage::CoverageProfile;
use crate::diff::DiffFilter;
use crate::mutation::{scanner, Mutant, MutantStatus, SourceTree};
use crate::project::{self, ProjectModule};
use crate::report::{self, MutantRecord};
use crate::runner::{mutation_deadline, TestRunner, TestVerdict};
use crate::workdir::CachedDealer;

use self::executor::Executor;
use self::pool::WorkerPool;

/// The unmutated suite gets a generous fixed ceiling; per-mutation
/// deadlines are derived from its measured duration.
const BASELINE_DEADLINE: Duration = Duration::from_secs(3600);

/// Everything the driver needs for one run, assembled from config and CLI.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub project: PathBuf,
    pub workers: usize,
    pub dry_run: bool,
    pub integration: bool,
    pub timeout_coefficient: u32,
    pub runner_bin: String,
    pub features: Option<String>,
    pub test_jobs: Option<u32>,
    pub coverage_profile: Option<PathBuf>,
    pub diff: Option<PathBuf>,
    pub output: Option<PathBuf>,
    /// Percent bounds in [0, 100].
    pub threshold_efficacy: f64,
    pub threshold_mcoverage: f64,
    pub enabled_kinds: Vec<MutantKind>,
}

/// Aggregated counters for one run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub killed: usize,
    pub lived: usize,
    pub timed_out: usize,
    pub not_viable: usize,
    pub not_covered: usize,
    pub skipped: usize,
    pub runnable: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn record(&mut self, status: MutantStatus) {
        match status {
            MutantStatus::Killed => self.killed += 1,
            MutantStatus::Lived => self.lived += 1,
            MutantStatus::TimedOut => self.timed_out += 1,
            MutantStatus::NotViable => self.not_viable += 1,
            MutantStatus::NotCovered => self.not_covered += 1,
            MutantStatus::Skipped => self.skipped += 1,
            MutantStatus::Runnable => self.runnable += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.killed
            + self.lived
            + self.timed_out
            + self.not_viable
            + self.not_covered
            + self.skipped
            + self.runnable
    }

    fn executed(&self) -> usize {
        self.killed + self.lived + self.timed_out
    }

    /// Fraction of executed mutations that were detected, in [0, 1].
    pub fn efficacy(&self) -> f64 {
        match self.executed() {
            0 => 0.0,
            executed => self.killed as f64 / executed as f64,
        }
    }

    /// Fraction of candidates the suite was able to exercise, in [0, 1].
    pub fn mutation_coverage(&self) -> f64 {
        match self.executed() + self.not_covered {
            0 => 0.0,
            denom => self.executed() as f64 / denom as f64,
        }
    }
}

/// Final result handed back to the CLI.
#[derive(Debug)]
pub struct EngineOutcome {
    pub summary: RunSummary,
    pub thresholds_met: bool,
}

/// Execute a full mutation-testing run.
///
/// `cancel` is flipped externally (interrupt handling lives in `main`);
/// once set, queued candidates drain as `Skipped`.
pub async fn run(options: EngineOptions, cancel: Arc<AtomicBool>) -> Result<EngineOutcome> {
    let started = Instant::now();

    let module = Arc::new(ProjectModule::discover(&options.project)?);
    tracing::info!("mutating package {} at {:?}", module.name, module.root);

    let runner = Arc::new(TestRunner::new(
        options.runner_bin.clone(),
        options.features.clone(),
        options.test_jobs,
        options.integration,
    ));

    // Phase 1: baseline. A red suite means nothing can be classified.
    tracing::info!("running baseline test suite");
    let baseline = runner
        .run(
            &module.enumeration_root(),
            Some(&module.name),
            BASELINE_DEADLINE,
            None,
        )
        .await;
    if baseline.verdict != TestVerdict::Passed {
        if let Some(output) = &baseline.output {
            tracing::error!("baseline output:\n{output}");
        }
        anyhow::bail!("baseline test run failed; nothing was mutated");
    }
    tracing::info!("baseline green in {:.2}s", baseline.duration.as_secs_f64());

    let coverage = options
        .coverage_profile
        .as_deref()
        .map(CoverageProfile::from_file)
        .transpose()?;
    if let Some(coverage) = &coverage {
        if coverage.is_empty() {
            tracing::warn!("coverage profile has no covered ranges; nothing will execute");
        } else {
            tracing::info!("coverage profile covers {} files", coverage.file_count());
        }
    }
    let diff = options
        .diff
        .as_deref()
        .map(DiffFilter::from_file)
        .transpose()?;
    if diff.as_ref().is_some_and(DiffFilter::is_empty) {
        tracing::warn!("diff filter has no added lines; every candidate will be dropped");
    }

    // Phase 2: enumeration.
    let candidates = enumerate(&module, &options.enabled_kinds, coverage.as_ref(), diff.as_ref())?;
    tracing::info!("discovered {} candidates", candidates.len());

    let mut summary = RunSummary::default();
    let mut records: Vec<MutantRecord> = Vec::new();

    if !candidates.is_empty() {
        // Phase 3: execution.
        let staging = tempfile::Builder::new()
            .prefix("mutiny-")
            .tempdir()
            .context("failed to create staging directory")?;
        let dealer = Arc::new(CachedDealer::new(
            staging.path().to_path_buf(),
            module.root.clone(),
        ));
        tracing::debug!("staging replicas under {:?}", dealer.work_dir());

        let deadline = mutation_deadline(baseline.duration, options.timeout_coefficient);
        tracing::debug!("per-mutation deadline: {:.2}s", deadline.as_secs_f64());

        let executor = Arc::new(Executor::new(
            Arc::clone(&module),
            Arc::clone(&dealer),
            Arc::clone(&runner),
            deadline,
            options.dry_run,
            Arc::clone(&cancel),
        ));
        let (pool, mut results) =
            WorkerPool::spawn(Arc::clone(&executor), options.workers, Arc::clone(&cancel));

        let submit = async move {
            for mutant in candidates {
                if pool.submit(mutant).await.is_err() {
                    break;
                }
            }
            // Dropping the pool closes the queue and lets workers finish.
        };

        // Phase 4: aggregation, single consumer.
        let aggregate = async {
            while let Some(mutant) = results.recv().await {
                tracing::info!("{}", report::format_result(&mutant));
                summary.record(mutant.status());
                records.push(MutantRecord::from_mutant(&mutant));
            }
        };

        tokio::join!(submit, aggregate);

        dealer.clean();
        if executor.failed() {
            anyhow::bail!("workdir dealer failed during execution");
        }
    }

    summary.elapsed = started.elapsed();

    let thresholds_met = options.dry_run
        || meets_thresholds(
            &summary,
            options.threshold_efficacy,
            options.threshold_mcoverage,
        );

    report::print_summary(&summary, options.dry_run);
    if let Some(path) = &options.output {
        report::write_json(path, &summary, options.dry_run, &records)?;
        tracing::info!("report written to {:?}", path);
    }
    if !thresholds_met {
        tracing::warn!(
            "thresholds unmet: efficacy {:.2}% (bound {:.2}%), coverage {:.2}% (bound {:.2}%)",
            summary.efficacy() * 100.0,
            options.threshold_efficacy,
            summary.mutation_coverage() * 100.0,
            options.threshold_mcoverage
        );
    }

    Ok(EngineOutcome {
        summary,
        thresholds_met,
    })
}

/// Walk the module's sources and produce every candidate, coverage-demoted
/// and diff-filtered. Unreadable or unparseable files degrade to a warning.
pub fn enumerate(
    module: &ProjectModule,
    enabled: &[MutantKind],
    coverage: Option<&CoverageProfile>,
    diff: Option<&DiffFilter>,
) -> Result<Vec<Mutant>> {
    let root = module.enumeration_root();
    let files = project::find_source_files(&root)?;

    let mut out = Vec::new();
    for rel in files {
        let abs = root.join(&rel);
        let source = match std::fs::read_to_string(&abs) {
            Ok(source) => source,
            Err(e) => {
                tracing::warn!("skipping unreadable {:?}: {e}", abs);
                continue;
            }
        };

        // Candidate paths are project-root-relative so that workdir joins
        // and coverage lookups agree.
        let tree_path = module.calling_dir.join(&rel);
        let tree = match SourceTree::parse(tree_path, source) {
            Ok(tree) => tree,
            Err(e) => {
                tracing::warn!("skipping {:?}: {e:#}", rel);
                continue;
            }
        };

        let mut mutants = scanner::scan_tree(&module.name, &tree, enabled);

        if let Some(diff) = diff {
            mutants.retain(|m| diff.is_changed(m.file(), m.span().line));
        }
        if let Some(coverage) = coverage {
            for m in &mut mutants {
                let span = m.span();
                if !coverage.covers(m.file(), span.line, span.column) {
                    m.set_status(MutantStatus::NotCovered);
                }
            }
        }

        out.extend(mutants);
    }

    Ok(out)
}

fn meets_thresholds(summary: &RunSummary, efficacy_bound: f64, coverage_bound: f64) -> bool {
    summary.efficacy() * 100.0 >= efficacy_bound
        && summary.mutation_coverage() * 100.0 >= coverage_bound
}

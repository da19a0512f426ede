//! Per-candidate execution pipeline.
//!
//! One worker runs one candidate at a time: draw the worker's workdir from
//! the dealer, apply the mutation, run the suite under the deadline,
//! classify, roll back, emit. Rollback happens regardless of the
//! classification; a candidate whose apply failed is never rolled back.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

use super::pool::Worker;
use crate::mutation::{Mutant, MutantStatus};
use crate::project::ProjectModule;
use crate::runner::{classify, TestRunner};
use crate::workdir::CachedDealer;

pub struct Executor {
    module: Arc<ProjectModule>,
    dealer: Arc<CachedDealer>,
    runner: Arc<TestRunner>,
    deadline: Duration,
    dry_run: bool,
    cancel: Arc<AtomicBool>,
    fatal: AtomicBool,
}

impl Executor {
    pub fn new(
        module: Arc<ProjectModule>,
        dealer: Arc<CachedDealer>,
        runner: Arc<TestRunner>,
        deadline: Duration,
        dry_run: bool,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            module,
            dealer,
            runner,
            deadline,
            dry_run,
            cancel,
            fatal: AtomicBool::new(false),
        }
    }

    /// Did a workdir failure abort the run?
    pub fn failed(&self) -> bool {
        self.fatal.load(Ordering::Relaxed)
    }

    /// Process one candidate and return it classified.
    pub async fn run(&self, worker: &Worker, mut mutant: Mutant) -> Mutant {
        // Uncovered or already-classified candidates pass through for
        // reporting only.
        if !mutant.status().is_runnable() {
            return mutant;
        }

        let workdir = match self.workdir_for(worker).await {
            Ok(path) => path,
            Err(e) => {
                // A dealer failure poisons the whole run, not one
                // candidate: flag it and drain.
                tracing::error!("workdir dealer failed for {}: {e:#}", worker.name);
                self.fatal.store(true, Ordering::Relaxed);
                self.cancel.store(true, Ordering::Relaxed);
                mutant.set_status(MutantStatus::Skipped);
                return mutant;
            }
        };
        mutant.set_workdir(workdir.clone());

        if let Err(e) = mutant.apply().await {
            tracing::warn!(
                "apply failed for {} at {}:{}: {e:#}",
                mutant.kind(),
                mutant.file().display(),
                mutant.span().line
            );
            mutant.set_status(MutantStatus::Skipped);
            return mutant;
        }

        if self.dry_run {
            // Everything but the test run; the candidate stays runnable.
            self.rollback(&mut mutant).await;
            return mutant;
        }

        let package_dir = if self.runner.integration {
            workdir.clone()
        } else {
            workdir.join(&self.module.calling_dir)
        };
        let run = self
            .runner
            .run(
                &package_dir,
                Some(mutant.pkg()),
                self.deadline,
                Some(&workdir),
            )
            .await;

        mutant.set_status(classify(run.verdict));
        mutant.set_duration(run.duration);

        self.rollback(&mut mutant).await;
        mutant
    }

    async fn rollback(&self, mutant: &mut Mutant) {
        if let Err(e) = mutant.rollback().await {
            // The replica is dirty but isolated; the run goes on.
            tracing::warn!(
                "rollback failed for {}: {e:#}",
                mutant.file().display()
            );
        }
    }

    async fn workdir_for(&self, worker: &Worker) -> Result<std::path::PathBuf> {
        let dealer = Arc::clone(&self.dealer);
        let id = worker.name.clone();
        tokio::task::spawn_blocking(move || dealer.get(&id))
            .await
            .context("workdir task panicked")?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MutantKind;
    use crate::mutation::{scanner, SourceTree};
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    const LIB_RS: &str = "pub fn min(a: i32, b: i32) -> i32 {\n    if a < b { a } else { b }\n}\n";

    fn fixture_project() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("Cargo.toml"),
            "[package]\nname = \"fixture\"\nversion = \"0.1.0\"\n",
        )
        .unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/lib.rs"), LIB_RS).unwrap();
        dir
    }

    fn first_candidate() -> Mutant {
        let tree = SourceTree::parse(PathBuf::from("src/lib.rs"), LIB_RS.to_string()).unwrap();
        scanner::scan_tree("fixture", &tree, &[MutantKind::ConditionalsBoundary])
            .into_iter()
            .next()
            .expect("fixture source has a boundary site")
    }

    fn executor_with_runner(
        src: &Path,
        staging: &Path,
        runner: TestRunner,
        dry_run: bool,
    ) -> Executor {
        let module = ProjectModule {
            name: "fixture".to_string(),
            root: src.to_path_buf(),
            calling_dir: PathBuf::new(),
        };
        let dealer = CachedDealer::new(staging.to_path_buf(), src.to_path_buf());
        Executor::new(
            Arc::new(module),
            Arc::new(dealer),
            Arc::new(runner),
            Duration::from_secs(5),
            dry_run,
            Arc::new(AtomicBool::new(false)),
        )
    }

    fn worker() -> Worker {
        Worker {
            id: 1,
            name: "test".to_string(),
        }
    }

    #[cfg(unix)]
    fn stub_runner(dir: &Path, script: &str) -> TestRunner {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("fake-runner");
        std::fs::write(&path, format!("#!/bin/sh\n{script}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        TestRunner::new(path.to_string_lossy().into_owned(), None, None, false)
    }

    #[tokio::test]
    async fn test_not_covered_passes_through_unexecuted() {
        let project = fixture_project();
        let staging = TempDir::new().unwrap();
        let exec = executor_with_runner(
            project.path(),
            staging.path(),
            TestRunner::new("cargo".to_string(), None, None, false),
            false,
        );

        let mut m = first_candidate();
        m.set_status(MutantStatus::NotCovered);
        let m = exec.run(&worker(), m).await;

        assert_eq!(m.status(), MutantStatus::NotCovered);
        assert!(m.workdir().is_none(), "no workdir drawn for skipped work");
        assert!(m.duration().is_none());
    }

    #[tokio::test]
    async fn test_dry_run_applies_and_restores_without_testing() {
        let project = fixture_project();
        let staging = TempDir::new().unwrap();
        // A runner pointing nowhere proves the suite is never invoked.
        let exec = executor_with_runner(
            project.path(),
            staging.path(),
            TestRunner::new("/definitely/not/a/binary".to_string(), None, None, false),
            true,
        );

        let m = exec.run(&worker(), first_candidate()).await;
        assert_eq!(m.status(), MutantStatus::Runnable);

        let replica_file = m.workdir().unwrap().join("src/lib.rs");
        assert_eq!(std::fs::read(replica_file).unwrap(), LIB_RS.as_bytes());
    }

    #[tokio::test]
    async fn test_dealer_failure_flags_the_run_fatal() {
        let staging = TempDir::new().unwrap();
        let exec = executor_with_runner(
            Path::new("nonexistent-source-tree"),
            staging.path(),
            TestRunner::new("cargo".to_string(), None, None, false),
            false,
        );

        let m = exec.run(&worker(), first_candidate()).await;
        assert_eq!(m.status(), MutantStatus::Skipped);
        assert!(exec.failed());
        assert!(exec.cancel.load(Ordering::Relaxed));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_passing_suite_means_lived() {
        let project = fixture_project();
        let staging = TempDir::new().unwrap();
        let runner = stub_runner(project.path(), "exit 0");
        let exec = executor_with_runner(project.path(), staging.path(), runner, false);

        let m = exec.run(&worker(), first_candidate()).await;
        assert_eq!(m.status(), MutantStatus::Lived);
        assert!(m.duration().is_some());

        // Rollback already ran: the replica matches the pristine source.
        let replica_file = m.workdir().unwrap().join("src/lib.rs");
        assert_eq!(std::fs::read(replica_file).unwrap(), LIB_RS.as_bytes());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_suite_means_killed() {
        let project = fixture_project();
        let staging = TempDir::new().unwrap();
        let runner = stub_runner(project.path(), "echo 'test min ... FAILED'; exit 1");
        let exec = executor_with_runner(project.path(), staging.path(), runner, false);

        let m = exec.run(&worker(), first_candidate()).await;
        assert_eq!(m.status(), MutantStatus::Killed);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_compile_error_means_not_viable() {
        let project = fixture_project();
        let staging = TempDir::new().unwrap();
        let runner = stub_runner(
            project.path(),
            "echo 'error[E0308]: mismatched types' >&2; exit 1",
        );
        let exec = executor_with_runner(project.path(), staging.path(), runner, false);

        let m = exec.run(&worker(), first_candidate()).await;
        assert_eq!(m.status(), MutantStatus::NotViable);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_deadline_means_timed_out() {
        let project = fixture_project();
        let staging = TempDir::new().unwrap();
        let runner = stub_runner(project.path(), "sleep 30");
        let module = ProjectModule {
            name: "fixture".to_string(),
            root: project.path().to_path_buf(),
            calling_dir: PathBuf::new(),
        };
        let dealer = CachedDealer::new(
            staging.path().to_path_buf(),
            project.path().to_path_buf(),
        );
        let exec = Executor::new(
            Arc::new(module),
            Arc::new(dealer),
            Arc::new(runner),
            Duration::from_millis(200),
            false,
            Arc::new(AtomicBool::new(false)),
        );

        let m = exec.run(&worker(), first_candidate()).await;
        assert_eq!(m.status(), MutantStatus::TimedOut);

        let replica_file = m.workdir().unwrap().join("src/lib.rs");
        assert_eq!(std::fs::read(replica_file).unwrap(), LIB_RS.as_bytes());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_worker_reuses_its_replica() {
        let project = fixture_project();
        let staging = TempDir::new().unwrap();
        let runner = stub_runner(project.path(), "exit 0");
        let exec = executor_with_runner(project.path(), staging.path(), runner, false);

        let w = worker();
        let first = exec.run(&w, first_candidate()).await;
        let second = exec.run(&w, first_candidate()).await;
        assert_eq!(first.workdir(), second.workdir());
    }
}

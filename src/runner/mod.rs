//! Test-runner invocation and verdict classification.
//!
//! `cargo` does not separate test failure from build failure by exit code,
//! so every invocation is first normalized into a [`TestVerdict`]: exit 0,
//! compile-error markers on stderr, any other non-zero exit, or a blown
//! deadline. Mutation status is then a pure function of the verdict.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;

use crate::mutation::MutantStatus;

/// Cap on stored runner output; full test logs are not worth keeping.
const MAX_OUTPUT_BYTES: usize = 10_000;

/// Normalized outcome of one test-runner invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestVerdict {
    /// All tests passed.
    Passed,
    /// At least one test failed.
    TestsFailed,
    /// The tree did not compile (or the runner could not be spawned).
    BuildFailed,
    /// The deadline expired; the child was killed.
    TimedOut,
}

/// Result of one test-runner invocation.
#[derive(Debug, Clone)]
pub struct TestRun {
    pub verdict: TestVerdict,
    pub duration: Duration,
    /// Captured output, truncated; `None` when there was nothing to keep.
    pub output: Option<String>,
}

/// Builds and runs `cargo test` invocations.
#[derive(Debug, Clone)]
pub struct TestRunner {
    /// Runner binary, `cargo` unless overridden.
    pub bin: String,
    /// `--features` passthrough.
    pub features: Option<String>,
    /// `-j` override.
    pub test_jobs: Option<u32>,
    /// Run the whole suite from the workdir root instead of scoping to one
    /// package.
    pub integration: bool,
}

impl TestRunner {
    pub fn new(
        bin: String,
        features: Option<String>,
        test_jobs: Option<u32>,
        integration: bool,
    ) -> Self {
        Self {
            bin,
            features,
            test_jobs,
            integration,
        }
    }

    /// Arguments for one invocation. `pkg` scopes the run in normal mode;
    /// integration mode ignores it and tests everything.
    pub fn command_args(&self, pkg: Option<&str>) -> Vec<String> {
        let mut args = vec!["test".to_string()];

        if let Some(features) = &self.features {
            args.push("--features".to_string());
            args.push(features.clone());
        }
        if !self.integration {
            if let Some(pkg) = pkg {
                args.push("-p".to_string());
                args.push(pkg.to_string());
            }
        }
        if let Some(jobs) = self.effective_jobs() {
            args.push("-j".to_string());
            args.push(jobs.to_string());
        }

        args
    }

    /// In integration mode many full-suite runs share the machine, so the
    /// requested job count is halved (never below one).
    fn effective_jobs(&self) -> Option<u32> {
        self.test_jobs.map(|jobs| {
            if self.integration {
                (jobs / 2).max(1)
            } else {
                jobs
            }
        })
    }

    /// Run the suite in `dir` with a hard deadline.
    ///
    /// `target_dir` isolates build artifacts per workdir via
    /// `CARGO_TARGET_DIR`. The child is spawned kill-on-drop, so a blown
    /// deadline kills the process before `TimedOut` is reported.
    pub async fn run(
        &self,
        dir: &Path,
        pkg: Option<&str>,
        deadline: Duration,
        target_dir: Option<&Path>,
    ) -> TestRun {
        let start = Instant::now();

        let mut cmd = Command::new(&self.bin);
        cmd.args(self.command_args(pkg))
            .current_dir(dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(target) = target_dir {
            cmd.env("CARGO_TARGET_DIR", target.join("target"));
        }

        let result = tokio::time::timeout(deadline, cmd.output()).await;
        let duration = start.elapsed();

        match result {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                let combined = truncate_output(&format!("{stdout}\n{stderr}"), MAX_OUTPUT_BYTES);

                let verdict = if output.status.success() {
                    TestVerdict::Passed
                } else if is_build_failure(&stderr) {
                    TestVerdict::BuildFailed
                } else {
                    TestVerdict::TestsFailed
                };

                TestRun {
                    verdict,
                    duration,
                    output: Some(combined),
                }
            }
            Ok(Err(e)) => TestRun {
                verdict: TestVerdict::BuildFailed,
                duration,
                output: Some(format!("failed to run {}: {e}", self.bin)),
            },
            Err(_) => TestRun {
                verdict: TestVerdict::TimedOut,
                duration,
                output: None,
            },
        }
    }
}

/// Status is a pure function of the verdict.
pub fn classify(verdict: TestVerdict) -> MutantStatus {
    match verdict {
        TestVerdict::Passed => MutantStatus::Lived,
        TestVerdict::TestsFailed => MutantStatus::Killed,
        TestVerdict::BuildFailed => MutantStatus::NotViable,
        TestVerdict::TimedOut => MutantStatus::TimedOut,
    }
}

/// Per-mutation deadline: a two-second floor plus the baseline duration
/// scaled by the coefficient (minimum 1).
pub fn mutation_deadline(baseline: Duration, coefficient: u32) -> Duration {
    Duration::from_secs(2) + baseline * coefficient.max(1)
}

fn is_build_failure(stderr: &str) -> bool {
    stderr.contains("error[E") || stderr.contains("could not compile")
}

fn truncate_output(output: &str, max_bytes: usize) -> String {
    if output.len() <= max_bytes {
        output.to_string()
    } else {
        format!("{}...(truncated)", &output[..max_bytes])
    }
}

mod catalog;
mod config;
mod coverage;
mod diff;
mod engine;
mod mutation;
mod project;
mod report;
mod runner;
mod workdir;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::FmtSubscriber;

use crate::config::Config;
use crate::engine::EngineOptions;

#[derive(Parser)]
#[command(name = "mutiny")]
#[command(version)]
#[command(about = "Mutation testing for Rust projects")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Run mutation testing
    Run {
        /// Path to the project root or any path inside it
        #[arg(long, default_value = ".")]
        project: PathBuf,

        /// Number of parallel workers
        #[arg(long)]
        workers: Option<usize>,

        /// Enumerate and apply but never run tests
        #[arg(long)]
        dry_run: bool,

        /// Run the whole suite per mutation instead of one package
        #[arg(long)]
        integration: bool,

        /// `--features` passthrough to the test runner
        #[arg(long)]
        features: Option<String>,

        /// `-j` override for mutation test runs
        #[arg(long)]
        test_jobs: Option<u32>,

        /// Per-mutation deadline is `2s + baseline * coefficient`
        #[arg(long)]
        timeout_coefficient: Option<u32>,

        /// Minimum test efficacy in percent
        #[arg(long)]
        threshold_efficacy: Option<f64>,

        /// Minimum mutation coverage in percent
        #[arg(long)]
        threshold_mcoverage: Option<f64>,

        /// Coverage profile restricting execution to covered positions
        #[arg(long)]
        coverage_profile: Option<PathBuf>,

        /// Unified diff restricting candidates to changed lines
        #[arg(long)]
        diff: Option<PathBuf>,

        /// Write a JSON report here
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// List mutation candidates without executing anything
    Scan {
        /// Path to the project root or any path inside it
        #[arg(long, default_value = ".")]
        project: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("mutiny: {e:#}");
            return ExitCode::from(2);
        }
    };

    init_logging(&config.general.log_level);

    match cli.command {
        Commands::Run {
            project,
            workers,
            dry_run,
            integration,
            features,
            test_jobs,
            timeout_coefficient,
            threshold_efficacy,
            threshold_mcoverage,
            coverage_profile,
            diff,
            output,
        } => {
            let options = EngineOptions {
                project,
                workers: workers.unwrap_or_else(|| config.workers()),
                dry_run,
                integration: integration || config.test.integration,
                timeout_coefficient: timeout_coefficient
                    .unwrap_or(config.test.timeout_coefficient),
                runner_bin: config.test.runner.clone(),
                features: features.or_else(|| config.test.features.clone()),
                test_jobs: test_jobs.or(config.test.jobs),
                coverage_profile,
                diff,
                output,
                threshold_efficacy: threshold_efficacy.unwrap_or(config.thresholds.efficacy),
                threshold_mcoverage: threshold_mcoverage
                    .unwrap_or(config.thresholds.mutant_coverage),
                enabled_kinds: config.enabled_kinds(),
            };

            let cancel = Arc::new(AtomicBool::new(false));
            spawn_interrupt_handler(Arc::clone(&cancel));

            match engine::run(options, cancel).await {
                Ok(outcome) => {
                    tracing::info!(
                        "{} candidates classified in {:.2}s",
                        outcome.summary.total(),
                        outcome.summary.elapsed.as_secs_f64()
                    );
                    if outcome.thresholds_met {
                        ExitCode::SUCCESS
                    } else {
                        ExitCode::from(1)
                    }
                }
                Err(e) => {
                    tracing::error!("{e:#}");
                    ExitCode::from(2)
                }
            }
        }

        Commands::Scan { project } => match scan(&project, &config) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                tracing::error!("{e:#}");
                ExitCode::from(2)
            }
        },
    }
}

/// Enumerate and print every candidate the configured operators produce.
fn scan(project: &std::path::Path, config: &Config) -> anyhow::Result<()> {
    let module = project::ProjectModule::discover(project)?;
    println!("package: {} at {}", module.name, module.root.display());

    let candidates = engine::enumerate(&module, &config.enabled_kinds(), None, None)?;
    for m in &candidates {
        println!("{}", report::format_result(m));
    }
    println!("{} candidates", candidates.len());
    Ok(())
}

fn init_logging(level: &str) {
    let level = level.parse().unwrap_or(tracing::Level::INFO);
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn spawn_interrupt_handler(cancel: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, draining pending candidates");
            cancel.store(true, Ordering::Relaxed);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse_run() {
        let cli = Cli::try_parse_from(["mutiny", "run"]).unwrap();
        match cli.command {
            Commands::Run { project, dry_run, .. } => {
                assert_eq!(project, PathBuf::from("."));
                assert!(!dry_run);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "mutiny",
            "run",
            "--project",
            "/repo",
            "--workers",
            "4",
            "--dry-run",
            "--threshold-efficacy",
            "75.5",
            "--diff",
            "changes.diff",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                project,
                workers,
                dry_run,
                threshold_efficacy,
                diff,
                ..
            } => {
                assert_eq!(project, PathBuf::from("/repo"));
                assert_eq!(workers, Some(4));
                assert!(dry_run);
                assert_eq!(threshold_efficacy, Some(75.5));
                assert_eq!(diff, Some(PathBuf::from("changes.diff")));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_parse_scan() {
        let cli = Cli::try_parse_from(["mutiny", "scan", "--project", "/repo"]).unwrap();
        assert_eq!(
            cli.command,
            Commands::Scan {
                project: PathBuf::from("/repo")
            }
        );
    }

    #[test]
    fn test_cli_parse_config_flag() {
        let cli = Cli::try_parse_from(["mutiny", "-c", "/path/config.toml", "scan"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/path/config.toml")));
    }

    #[test]
    fn test_cli_validate() {
        let cmd = Cli::command();
        cmd.debug_assert();
    }
}

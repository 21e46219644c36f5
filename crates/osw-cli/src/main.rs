use std::io::Write;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use osw_core::{ChangeId, LaneConfig, LaneName, ReleaseType, RunStatus, Stage};
use osw_runner::{
    Config, Orchestrator, ResumeChoice, RunOptions, RunOutcome, StageContext, StartDecision,
};
use osw_status::{FsStatusStore, MemoryStatusStore, StatusError, StatusStore};
use osw_tools::{GitCli, SystemTools};
use osw_version::VersionResolver;

// Stable exit codes for scripting around the tool.
const EXIT_COMPLETE: i32 = 0;
const EXIT_FAILED: i32 = 1;
const EXIT_TIMED_OUT: i32 = 2;
const EXIT_CONFIG: i32 = 3;

#[derive(Parser)]
#[command(name = "osw", version, about = "OpenSpec workflow orchestrator")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the workflow for a change (fresh or resumed)
    Run {
        /// Change identifier; doubles as the openspec/changes/ directory name
        change_id: String,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "unassigned")]
        owner: String,
        /// Execution lane: docs, standard or heavy
        #[arg(long, default_value = "standard")]
        lane: String,
        /// Release type for the version bump: patch, minor or major
        #[arg(long, default_value = "patch")]
        release_type: String,
        /// Branch for the remote version lookup and the PR (default: current)
        #[arg(long)]
        branch: Option<String>,
        /// Commit message; defaults to 'chore(<change-id>): <title>'
        #[arg(long)]
        commit_message: Option<String>,
        /// Preview every mutation without performing any
        #[arg(long)]
        dry_run: bool,
        /// Skip quality gates at Verification (logged loudly)
        #[arg(long)]
        skip_gates: bool,
        /// Run the middle band sequentially
        #[arg(long)]
        no_parallel: bool,
        /// Downgrade failing pre-stage hooks to warnings
        #[arg(long)]
        force_hooks: bool,
        /// Run a single stage by index
        #[arg(long, conflicts_with_all = ["from", "to"])]
        stage: Option<usize>,
        /// First stage index to run
        #[arg(long)]
        from: Option<usize>,
        /// Last stage index to run
        #[arg(long)]
        to: Option<usize>,
        /// Resume an interrupted run without prompting
        #[arg(long, conflicts_with = "restart")]
        resume: bool,
        /// Discard an interrupted run and start over without prompting
        #[arg(long)]
        restart: bool,
    },

    /// Show the checkpoint for a change
    Status { change_id: String },

    /// List the lanes and their profiles
    Lanes,

    /// Validate a conventional commit message
    CheckCommit { message: String },

    /// Resolve the next version for a release type without writing it
    NextVersion {
        #[arg(long, default_value = "patch")]
        release_type: String,
        #[arg(long)]
        branch: Option<String>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let code = match dispatch(cli) {
        Ok(code) => code,
        Err(err) => {
            // A checkpoint persistence failure is a runtime fatal, not a
            // configuration mistake; keep the exit codes apart.
            if err.downcast_ref::<StatusError>().is_some() {
                eprintln!("checkpoint failure: {err:#}");
            } else {
                eprintln!("error: {err:#}");
            }
            failure_exit_code(&err)
        }
    };
    std::process::exit(code);
}

fn failure_exit_code(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<StatusError>().is_some() {
        EXIT_FAILED
    } else {
        EXIT_CONFIG
    }
}

fn dispatch(cli: Cli) -> Result<i32> {
    let repo_root = std::env::current_dir().context("determine working directory")?;

    match cli.cmd {
        Command::Run {
            change_id,
            title,
            owner,
            lane,
            release_type,
            branch,
            commit_message,
            dry_run,
            skip_gates,
            no_parallel,
            force_hooks,
            stage,
            from,
            to,
            resume,
            restart,
        } => {
            let lane = LaneName::parse(&lane).map_err(|e| anyhow!(e))?;
            let release = ReleaseType::parse(&release_type)
                .ok_or_else(|| anyhow!("unknown release type '{release_type}' (expected patch, minor or major)"))?;
            let mut opts = RunOptions::new(ChangeId::from_str(change_id), title, owner);
            opts.lane = lane;
            opts.release = release;
            opts.branch = branch;
            opts.commit_message = commit_message;
            opts.dry_run = dry_run;
            opts.skip_gates = skip_gates;
            opts.no_parallel = no_parallel;
            opts.force_hooks = force_hooks;
            opts.stage_range = match (stage, from, to) {
                (Some(s), _, _) => Some((s, s)),
                (None, None, None) => None,
                (None, f, t) => Some((f.unwrap_or(0), t.unwrap_or(Stage::ALL.len() - 1))),
            };

            let cfg = Config::load_or_default(&repo_root)?;
            // Dry runs keep checkpoints in memory so nothing lands on disk.
            let store: Arc<dyn StatusStore> = if dry_run {
                Arc::new(MemoryStatusStore::new())
            } else {
                Arc::new(FsStatusStore::open(&repo_root))
            };
            let ctx = StageContext::new(repo_root, cfg, opts, Arc::new(SystemTools));
            let orch = Orchestrator::new(ctx, store)?;

            let choice = match orch.prepare()? {
                StartDecision::Fresh => ResumeChoice::Restart,
                StartDecision::ResumeAvailable(cp) if resume => {
                    println!(
                        "Resuming '{}' from stage {} ({} of {} stages done)",
                        cp.change_id.as_str(),
                        cp.current_stage,
                        cp.stages_completed.len(),
                        osw_core::stages_for_lane(cp.lane).len(),
                    );
                    ResumeChoice::Resume
                }
                StartDecision::ResumeAvailable(_) if restart => ResumeChoice::Restart,
                StartDecision::ResumeAvailable(cp) => prompt_resume(&cp)?,
            };

            let outcome = orch.execute(choice)?;
            print_outcome(&outcome);
            Ok(exit_code_for(outcome.status))
        }

        Command::Status { change_id } => {
            let store = FsStatusStore::open(&repo_root);
            let id = ChangeId::from_str(change_id);
            match store.load(&id)? {
                Some(cp) => {
                    println!("{}", serde_json::to_string_pretty(&cp)?);
                    Ok(EXIT_COMPLETE)
                }
                None => {
                    eprintln!("no run recorded for '{}'", id.as_str());
                    Ok(EXIT_FAILED)
                }
            }
        }

        Command::Lanes => {
            for name in [LaneName::Docs, LaneName::Standard, LaneName::Heavy] {
                let lane = LaneConfig::get(name);
                println!(
                    "{:<9} stages={:<2} gates={:<5} parallel={:<5} coverage>={:<3} pass>={:<3} sla={}s",
                    lane.name.as_str(),
                    lane.stages().len(),
                    lane.quality_gates_enabled,
                    lane.parallelization_enabled,
                    lane.coverage_threshold,
                    lane.pass_rate_threshold,
                    lane.sla_seconds,
                );
            }
            Ok(EXIT_COMPLETE)
        }

        Command::CheckCommit { message } => {
            let check = osw_commit::validate(&message);
            if check.is_valid {
                println!("ok");
                return Ok(EXIT_COMPLETE);
            }
            for error in &check.errors {
                eprintln!("- {error}");
            }
            if let Some(suggestion) = osw_commit::suggest_fix(&message) {
                eprintln!("suggestion: {suggestion}");
            }
            Ok(EXIT_FAILED)
        }

        Command::NextVersion { release_type, branch } => {
            let release = ReleaseType::parse(&release_type)
                .ok_or_else(|| anyhow!("unknown release type '{release_type}'"))?;
            let cfg = Config::load_or_default(&repo_root)?;
            let git = GitCli::new(Arc::new(SystemTools), repo_root);
            let resolver = VersionResolver::new(git, cfg.project.version_file);
            let next = resolver.resolve_next(release, branch.as_deref())?;
            println!("{next}");
            Ok(EXIT_COMPLETE)
        }
    }
}

fn prompt_resume(cp: &osw_core::Checkpoint) -> Result<ResumeChoice> {
    print!(
        "Found an interrupted run for '{}' at stage {} ({}% done). Resume? [Y/n] ",
        cp.change_id.as_str(),
        cp.current_stage,
        cp.progress_percent,
    );
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    match answer.trim().to_ascii_lowercase().as_str() {
        "" | "y" | "yes" => Ok(ResumeChoice::Resume),
        _ => Ok(ResumeChoice::Restart),
    }
}

fn print_outcome(outcome: &RunOutcome) {
    for (stage, detail) in &outcome.stage_details {
        println!("[{:>2}] {:<15} {}", stage.index(), stage.name(), detail);
    }
    for report in &outcome.gate_reports {
        let verdict = if report.passed { "pass" } else { "FAIL" };
        println!(
            "gate {:<11} {} (metric {:.0}, threshold {:.0})",
            report.gate.name(),
            verdict,
            report.metric_value,
            report.threshold,
        );
    }
    if let Some(failure) = &outcome.failure {
        match failure.stage {
            Some(stage) => eprintln!("{} failure at stage {}: {}", failure.component, stage, failure.detail),
            None => eprintln!("{} failure: {}", failure.component, failure.detail),
        }
    }
    println!(
        "run {}: {:?} ({}% complete)",
        outcome.checkpoint.change_id.as_str(),
        outcome.status,
        outcome.checkpoint.progress_percent,
    );
}

fn exit_code_for(status: RunStatus) -> i32 {
    match status {
        RunStatus::Complete => EXIT_COMPLETE,
        RunStatus::Failed => EXIT_FAILED,
        RunStatus::TimedOut => EXIT_TIMED_OUT,
        RunStatus::InProgress => EXIT_FAILED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_errors_exit_as_runtime_failures() {
        let err = anyhow::Error::from(StatusError::Io {
            change_id: "update-readme".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only fs"),
        });
        assert_eq!(failure_exit_code(&err), EXIT_FAILED);
        // Context layers do not hide the underlying store error.
        let wrapped = err.context("persist checkpoint after stage 3 (spec_definition)");
        assert_eq!(failure_exit_code(&wrapped), EXIT_FAILED);
    }

    #[test]
    fn other_dispatch_errors_exit_as_config_failures() {
        let err = anyhow!("unknown release type 'huge'");
        assert_eq!(failure_exit_code(&err), EXIT_CONFIG);
    }
}

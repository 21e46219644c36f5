use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};

use osw_core::{
    into_batches, restrict_to_range, stages_to_run, AttemptId, Batch, Checkpoint, LaneConfig,
    LaneName, RunStatus, Stage,
};
use osw_gates::{GateReport, GateRunner};
use osw_hooks::{default_registry, HookContext, HookOutcome, HookRegistry};
use osw_status::StatusStore;
use osw_tools::now_unix;

use crate::band::{run_band, BandTaskError};
use crate::context::{RunOptions, StageContext};
use crate::stages::StageTable;

/// What `prepare` found on disk before any stage ran.
pub enum StartDecision {
    Fresh,
    /// An interrupted run exists; the operator chooses resume or restart.
    ResumeAvailable(Checkpoint),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResumeChoice {
    Resume,
    Restart,
}

#[derive(Clone, Debug)]
pub struct FailureSummary {
    pub stage: Option<Stage>,
    /// Which layer failed: "hook", "stage", "band" or "gate".
    pub component: &'static str,
    pub detail: String,
}

pub struct RunOutcome {
    pub status: RunStatus,
    pub checkpoint: Checkpoint,
    /// Per-stage detail lines in execution order, for the CLI to print.
    pub stage_details: Vec<(Stage, String)>,
    pub gate_reports: Vec<GateReport>,
    pub failure: Option<FailureSummary>,
}

/// Drives one workflow run end to end: plans the remaining stages from
/// the lane and checkpoint, runs pre-stage hooks, dispatches the parallel
/// band, applies quality gates at Verification and persists a checkpoint
/// after every completed stage.
pub struct Orchestrator {
    ctx: Arc<StageContext>,
    table: Arc<StageTable>,
    hooks: HookRegistry,
    store: Arc<dyn StatusStore>,
}

impl Orchestrator {
    pub fn new(
        ctx: StageContext,
        store: Arc<dyn StatusStore>,
    ) -> Result<Self> {
        ctx.opts
            .change_id
            .validate()
            .map_err(|e| anyhow!(e))
            .context("invalid change id")?;
        let lane = LaneConfig::get(ctx.opts.lane);
        let gate_tools = if lane.quality_gates_enabled {
            gate_programs(&ctx)
        } else {
            Vec::new()
        };
        Ok(Self {
            ctx: Arc::new(ctx),
            table: Arc::new(StageTable::with_default_handlers()),
            hooks: default_registry(&gate_tools),
            store,
        })
    }

    /// Swap in a custom hook registry (tests, or a config-driven setup).
    pub fn with_hooks(mut self, hooks: HookRegistry) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn opts(&self) -> &RunOptions {
        &self.ctx.opts
    }

    /// Look for an interrupted run before touching anything.
    pub fn prepare(&self) -> Result<StartDecision> {
        match self.store.load(&self.ctx.opts.change_id)? {
            Some(cp) if osw_status::is_incomplete(&cp) => Ok(StartDecision::ResumeAvailable(cp)),
            _ => Ok(StartDecision::Fresh),
        }
    }

    pub fn execute(&self, choice: ResumeChoice) -> Result<RunOutcome> {
        let opts = &self.ctx.opts;

        let mut checkpoint = match (choice, self.store.load(&opts.change_id)?) {
            (ResumeChoice::Resume, Some(mut cp)) if osw_status::is_incomplete(&cp) => {
                info!(
                    change_id = opts.change_id.as_str(),
                    completed = cp.stages_completed.len(),
                    "resuming interrupted run"
                );
                cp.attempt_id = AttemptId::new();
                cp
            }
            _ => Checkpoint::new(
                opts.change_id.clone(),
                &opts.title,
                &opts.owner,
                LaneConfig::get(opts.lane),
                now_unix(),
            ),
        };
        self.store.save(&checkpoint)?;

        // The lane was resolved when the run started and rides with the
        // checkpoint; a resume keeps it even when the invocation asks for
        // a different one.
        let lane = LaneConfig::get(checkpoint.lane);
        let ctx = self.ctx_for_lane(checkpoint.lane);

        let mut stages = stages_to_run(lane, Some(&checkpoint));
        if let Some((from, to)) = opts.stage_range {
            stages = restrict_to_range(&stages, from, to);
        }
        let parallel = lane.parallelization_enabled && !opts.no_parallel;
        let batches = into_batches(&stages, parallel);
        info!(
            lane = lane.name.as_str(),
            stages = stages.len(),
            parallel,
            "run planned"
        );

        let mut details: Vec<(Stage, String)> = Vec::new();
        let mut gate_reports: Vec<GateReport> = Vec::new();

        for batch in &batches {
            if let Some(failure) = self.run_hooks_for_batch(batch, &ctx)? {
                return self.finish_failed(checkpoint, details, gate_reports, failure);
            }

            match batch {
                Batch::Single(stage) => {
                    match self.table.run(*stage, &ctx) {
                        Ok(detail) => details.push((*stage, detail)),
                        Err(err) => {
                            let failure = FailureSummary {
                                stage: Some(*stage),
                                component: "stage",
                                detail: format!("{err:#}"),
                            };
                            return self.finish_failed(checkpoint, details, gate_reports, failure);
                        }
                    }
                    if *stage == Stage::Verification {
                        match self.run_gates(lane, &ctx)? {
                            GateVerdict::Passed(reports) | GateVerdict::Skipped(reports) => {
                                gate_reports = reports;
                            }
                            GateVerdict::Blocked(reports, failure) => {
                                gate_reports = reports;
                                return self
                                    .finish_failed(checkpoint, details, gate_reports, failure);
                            }
                        }
                    }
                    checkpoint.record_stage(*stage, lane.stages().len(), now_unix());
                    self.store.save(&checkpoint)?;
                }
                Batch::Band(band_stages) => {
                    let timeout = Duration::from_secs(ctx.cfg.limits.band_task_timeout_secs);
                    let results = run_band(
                        Arc::clone(&self.table),
                        Arc::clone(&ctx),
                        band_stages,
                        ctx.cfg.limits.band_workers,
                        timeout,
                    );
                    let mut first_failure: Option<FailureSummary> = None;
                    let mut timed_out = false;
                    for (stage, result) in results {
                        match result {
                            Ok(detail) => {
                                details.push((stage, detail));
                                checkpoint.record_stage(stage, lane.stages().len(), now_unix());
                            }
                            Err(err) => {
                                if matches!(err, BandTaskError::TimedOut { .. }) {
                                    timed_out = true;
                                }
                                details.push((stage, format!("failed: {err}")));
                                if first_failure.is_none() {
                                    first_failure = Some(FailureSummary {
                                        stage: Some(stage),
                                        component: "band",
                                        detail: err.to_string(),
                                    });
                                }
                            }
                        }
                    }
                    // Completed siblings are checkpointed even when the band
                    // fails, so a resume skips them.
                    self.store.save(&checkpoint)?;
                    if let Some(failure) = first_failure {
                        let status = if timed_out { RunStatus::TimedOut } else { RunStatus::Failed };
                        checkpoint.mark(status, now_unix());
                        self.store.save(&checkpoint)?;
                        return Ok(RunOutcome {
                            status,
                            checkpoint,
                            stage_details: details,
                            gate_reports,
                            failure: Some(failure),
                        });
                    }
                }
            }
        }

        // An SLA breach observed during the run leaves TimedOut in place;
        // the work finished but outside its window.
        if checkpoint.status == RunStatus::InProgress {
            checkpoint.mark(RunStatus::Complete, now_unix());
        }
        self.store.save(&checkpoint)?;
        self.write_reports(&checkpoint, &gate_reports);
        Ok(RunOutcome {
            status: checkpoint.status,
            checkpoint: checkpoint.clone(),
            stage_details: details,
            gate_reports,
            failure: None,
        })
    }

    fn finish_failed(
        &self,
        mut checkpoint: Checkpoint,
        details: Vec<(Stage, String)>,
        gate_reports: Vec<GateReport>,
        failure: FailureSummary,
    ) -> Result<RunOutcome> {
        checkpoint.mark(RunStatus::Failed, now_unix());
        self.store.save(&checkpoint)?;
        self.write_reports(&checkpoint, &gate_reports);
        Ok(RunOutcome {
            status: RunStatus::Failed,
            checkpoint,
            stage_details: details,
            gate_reports,
            failure: Some(failure),
        })
    }

    /// The checkpoint's lane wins over the invocation's. When they differ
    /// the stage context is rebuilt so handlers see the effective lane.
    fn ctx_for_lane(&self, lane: LaneName) -> Arc<StageContext> {
        if self.ctx.opts.lane == lane {
            return Arc::clone(&self.ctx);
        }
        warn!(
            requested = self.ctx.opts.lane.as_str(),
            effective = lane.as_str(),
            "resumed run keeps its original lane"
        );
        let mut opts = self.ctx.opts.clone();
        opts.lane = lane;
        Arc::new(StageContext::new(
            self.ctx.repo_root.clone(),
            self.ctx.cfg.clone(),
            opts,
            Arc::clone(&self.ctx.tools),
        ))
    }

    /// Pre-stage hooks for every stage in the batch. A failing hook stops
    /// the run unless `--force-hooks` downgrades it to a warning.
    fn run_hooks_for_batch(
        &self,
        batch: &Batch,
        ctx: &StageContext,
    ) -> Result<Option<FailureSummary>> {
        if ctx.opts.dry_run {
            return Ok(None);
        }
        let hook_ctx = HookContext {
            tools: Arc::clone(&ctx.tools),
            repo_root: ctx.repo_root.clone(),
            version_file: ctx.cfg.project.version_file.clone(),
            allowed_dirty_prefixes: ctx.cfg.workflow_prefixes(),
        };
        for stage in batch.stages() {
            let outcomes: Vec<HookOutcome> = self.hooks.run_for_stage(*stage, &hook_ctx);
            for outcome in outcomes {
                if outcome.passed {
                    info!(stage = %stage, hook = outcome.hook_name, "hook passed");
                    continue;
                }
                if ctx.opts.force_hooks {
                    warn!(
                        stage = %stage,
                        hook = outcome.hook_name,
                        message = outcome.message,
                        "hook failed; continuing under --force-hooks"
                    );
                    continue;
                }
                return Ok(Some(FailureSummary {
                    stage: Some(*stage),
                    component: "hook",
                    detail: format!("{}: {}", outcome.hook_name, outcome.message),
                }));
            }
        }
        Ok(None)
    }

    fn run_gates(&self, lane: &LaneConfig, ctx: &StageContext) -> Result<GateVerdict> {
        if !lane.quality_gates_enabled {
            info!(lane = lane.name.as_str(), "quality gates bypassed for this lane");
            return Ok(GateVerdict::Skipped(Vec::new()));
        }
        if ctx.opts.skip_gates {
            warn!("quality gates skipped by operator request (--skip-gates)");
            return Ok(GateVerdict::Skipped(Vec::new()));
        }
        if ctx.opts.dry_run {
            info!("DRY RUN: quality gates would run here");
            return Ok(GateVerdict::Skipped(Vec::new()));
        }
        let runner = GateRunner::new(
            Arc::clone(&ctx.tools),
            ctx.repo_root.clone(),
            ctx.cfg.tools.clone(),
        );
        let reports = runner.run_all(lane)?;
        match reports.iter().find(|r| !r.passed) {
            Some(first) => {
                let detail = match &first.remediation {
                    Some(hint) => format!("{} gate failed: {}", first.gate.name(), hint),
                    None => format!("{} gate failed", first.gate.name()),
                };
                let failure = FailureSummary {
                    stage: Some(Stage::Verification),
                    component: "gate",
                    detail,
                };
                Ok(GateVerdict::Blocked(reports, failure))
            }
            None => Ok(GateVerdict::Passed(reports)),
        }
    }

    /// Gate reports are written beside the run summary; failures here are
    /// logged rather than fatal since the run itself already concluded.
    fn write_reports(&self, checkpoint: &Checkpoint, gate_reports: &[GateReport]) {
        if self.ctx.opts.dry_run || gate_reports.is_empty() {
            return;
        }
        let dir = self
            .ctx
            .cfg
            .report_dir(&self.ctx.repo_root, &checkpoint.change_id);
        let write = || -> Result<()> {
            std::fs::create_dir_all(&dir)?;
            let path = dir.join("gates.json");
            std::fs::write(&path, serde_json::to_vec_pretty(gate_reports)?)?;
            Ok(())
        };
        if let Err(err) = write() {
            warn!(error = %err, dir = %dir.display(), "failed to write gate reports");
        }
    }
}

enum GateVerdict {
    Passed(Vec<GateReport>),
    Skipped(Vec<GateReport>),
    Blocked(Vec<GateReport>, FailureSummary),
}

fn gate_programs(ctx: &StageContext) -> Vec<String> {
    [
        &ctx.cfg.tools.lint,
        &ctx.cfg.tools.type_check,
        &ctx.cfg.tools.tests,
        &ctx.cfg.tools.security,
    ]
    .iter()
    .filter_map(|argv| argv.first().cloned())
    .collect()
}

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};

use osw_core::Stage;
use osw_tools::run_checked;
use osw_version::VersionResolver;

use crate::config::Config;
use crate::context::StageContext;

/// One stage's behavior. Handlers are pure with respect to workflow
/// state: checkpointing, hooks and gates are orchestrator concerns.
pub trait StageHandler: Send + Sync {
    fn run(&self, ctx: &StageContext) -> Result<String>;
}

/// Enum-keyed dispatch table. Adding or reordering stages is a data
/// change here, not a control-flow rewrite.
pub struct StageTable {
    handlers: Vec<(Stage, Box<dyn StageHandler>)>,
}

impl StageTable {
    pub fn with_default_handlers() -> Self {
        let handlers: Vec<(Stage, Box<dyn StageHandler>)> = vec![
            (Stage::Setup, Box::new(SetupHandler)),
            (Stage::VersionBump, Box::new(VersionBumpHandler)),
            (Stage::Proposal, Box::new(ProposalHandler)),
            (Stage::SpecDefinition, Box::new(SpecDefinitionHandler)),
            (Stage::TaskBreakdown, Box::new(TaskBreakdownHandler)),
            (Stage::TestPlan, Box::new(TestPlanHandler)),
            (Stage::Scripts, Box::new(ScriptsHandler)),
            (Stage::Implementation, Box::new(ImplementationHandler)),
            (Stage::DocReview, Box::new(DocReviewHandler)),
            (Stage::Verification, Box::new(VerificationHandler)),
            (Stage::Commit, Box::new(CommitHandler)),
            (Stage::PullRequest, Box::new(PullRequestHandler)),
            (Stage::Finalize, Box::new(FinalizeHandler)),
        ];
        Self { handlers }
    }

    pub fn empty() -> Self {
        Self { handlers: Vec::new() }
    }

    pub fn set(&mut self, stage: Stage, handler: Box<dyn StageHandler>) {
        self.handlers.retain(|(s, _)| *s != stage);
        self.handlers.push((stage, handler));
    }

    pub fn run(&self, stage: Stage, ctx: &StageContext) -> Result<String> {
        let handler = self
            .handlers
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, h)| h.as_ref())
            .ok_or_else(|| anyhow!("no handler registered for stage {stage}"))?;
        handler.run(ctx)
    }
}

/// Create `content` at `path` unless it already exists (resumed runs must
/// not clobber documents a prior attempt produced).
fn scaffold(ctx: &StageContext, rel: &str, content: &str) -> Result<String> {
    let path = ctx.change_dir().join(rel);
    if ctx.opts.dry_run {
        return Ok(format!("DRY RUN: would write {}", path.display()));
    }
    if path.exists() {
        return Ok(format!("{} already present, left untouched", path.display()));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    std::fs::write(&path, content).with_context(|| format!("write {}", path.display()))?;
    Ok(format!("wrote {}", path.display()))
}

fn run_command_list(ctx: &StageContext, what: &str, commands: &[Vec<String>]) -> Result<String> {
    if commands.is_empty() {
        return Ok(format!("no {what} commands configured"));
    }
    if ctx.opts.dry_run {
        return Ok(format!("DRY RUN: would run {} {what} command(s)", commands.len()));
    }
    for argv in commands {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("empty {what} command entry"))?;
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        info!(program, "running {what} command");
        run_checked(ctx.tools.as_ref(), &ctx.repo_root, program, &args)?;
    }
    Ok(format!("ran {} {what} command(s)", commands.len()))
}

struct SetupHandler;

impl StageHandler for SetupHandler {
    fn run(&self, ctx: &StageContext) -> Result<String> {
        if ctx.opts.dry_run {
            return Ok(format!(
                "DRY RUN: would create {} and .openspec scaffolding",
                ctx.change_dir().display()
            ));
        }
        let change_dir = ctx.change_dir();
        std::fs::create_dir_all(&change_dir)
            .with_context(|| format!("create {}", change_dir.display()))?;
        std::fs::create_dir_all(Config::state_dir(&ctx.repo_root))?;
        let cfg_path = Config::config_path(&ctx.repo_root);
        if !cfg_path.exists() {
            ctx.cfg.save_to(&cfg_path)?;
        }
        Ok(format!("workspace ready at {}", change_dir.display()))
    }
}

struct VersionBumpHandler;

impl StageHandler for VersionBumpHandler {
    fn run(&self, ctx: &StageContext) -> Result<String> {
        let resolver = VersionResolver::new(ctx.git.clone(), ctx.cfg.project.version_file.clone());
        let branch = ctx.opts.branch.as_deref();
        let (current, next) = match resolver.current(branch) {
            Ok(current) => (current, current.bump(ctx.opts.release)),
            // Version metadata is advisory for later stages; a resolver
            // failure degrades the stage instead of failing the run.
            Err(err) => {
                warn!(error = %err, "version resolution unavailable; stage degraded");
                return Ok(format!("version resolution unavailable ({err:#}); skipped bump"));
            }
        };
        if ctx.opts.dry_run {
            return Ok(format!("DRY RUN: would bump version {current} -> {next}"));
        }
        let path = resolver.version_file_path();
        std::fs::write(&path, format!("{next}\n"))
            .with_context(|| format!("write {}", path.display()))?;
        Ok(format!("version {current} -> {next}"))
    }
}

struct ProposalHandler;

impl StageHandler for ProposalHandler {
    fn run(&self, ctx: &StageContext) -> Result<String> {
        let body = format!(
            "# Proposal: {}\n\n- Change-Id: {}\n- Owner: {}\n- Lane: {}\n\n## Why\n\n_TBD_\n\n## What Changes\n\n_TBD_\n\n## Impact\n\n_TBD_\n",
            ctx.opts.title,
            ctx.opts.change_id.as_str(),
            ctx.opts.owner,
            ctx.opts.lane.as_str(),
        );
        scaffold(ctx, "proposal.md", &body)
    }
}

struct SpecDefinitionHandler;

impl StageHandler for SpecDefinitionHandler {
    fn run(&self, ctx: &StageContext) -> Result<String> {
        let body = format!(
            "# Spec Delta: {}\n\n## ADDED Requirements\n\n_TBD_\n\n## MODIFIED Requirements\n\n_TBD_\n\n## REMOVED Requirements\n\n_None_\n",
            ctx.opts.title,
        );
        scaffold(ctx, "specs/spec.md", &body)
    }
}

struct TaskBreakdownHandler;

impl StageHandler for TaskBreakdownHandler {
    fn run(&self, ctx: &StageContext) -> Result<String> {
        let body = format!(
            "# Tasks: {}\n\n## 1. Implementation\n\n- [ ] 1.1 _TBD_\n\n## 2. Validation\n\n- [ ] 2.1 _TBD_\n",
            ctx.opts.title,
        );
        scaffold(ctx, "tasks.md", &body)
    }
}

struct TestPlanHandler;

impl StageHandler for TestPlanHandler {
    fn run(&self, ctx: &StageContext) -> Result<String> {
        let body = format!(
            "# Test Plan: {}\n\n## Unit\n\n_TBD_\n\n## Integration\n\n_TBD_\n\n## Coverage Goals\n\nSee lane thresholds.\n",
            ctx.opts.title,
        );
        scaffold(ctx, "test_plan.md", &body)
    }
}

struct ScriptsHandler;

impl StageHandler for ScriptsHandler {
    fn run(&self, ctx: &StageContext) -> Result<String> {
        let body = "#!/usr/bin/env bash\nset -euo pipefail\n\n# Change-local check runner; extend per task.\nruff check .\nmypy .\npytest --cov -q\n";
        scaffold(ctx, "scripts/check.sh", body)
    }
}

struct ImplementationHandler;

impl StageHandler for ImplementationHandler {
    fn run(&self, ctx: &StageContext) -> Result<String> {
        let commands = ctx.cfg.commands.implement.clone();
        run_command_list(ctx, "implementation", &commands)
    }
}

struct DocReviewHandler;

impl StageHandler for DocReviewHandler {
    fn run(&self, ctx: &StageContext) -> Result<String> {
        if ctx.opts.dry_run {
            return Ok("DRY RUN: would review scaffolded documents".to_string());
        }
        let dir = ctx.change_dir();
        let mut required = vec!["proposal.md", "specs/spec.md", "tasks.md"];
        if osw_core::stages_for_lane(ctx.opts.lane).contains(&Stage::TestPlan) {
            required.push("test_plan.md");
        }
        let missing: Vec<&str> = required
            .into_iter()
            .filter(|rel| !non_empty(&dir.join(rel)))
            .collect();
        if missing.is_empty() {
            Ok("all change documents present and non-empty".to_string())
        } else {
            Err(anyhow!(
                "document review failed; missing or empty: {}",
                missing.join(", ")
            ))
        }
    }
}

fn non_empty(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

struct VerificationHandler;

impl StageHandler for VerificationHandler {
    // Quality gates are orchestrator-run at this stage; the handler only
    // covers the operator's extra verify commands.
    fn run(&self, ctx: &StageContext) -> Result<String> {
        let commands = ctx.cfg.commands.verify.clone();
        run_command_list(ctx, "verification", &commands)
    }
}

struct CommitHandler;

impl StageHandler for CommitHandler {
    fn run(&self, ctx: &StageContext) -> Result<String> {
        let message = ctx.commit_message();
        let check = osw_commit::validate(&message);
        if !check.is_valid {
            let mut detail = format!(
                "commit message rejected: {}",
                check.errors.join("; ")
            );
            if let Some(suggestion) = osw_commit::suggest_fix(&message) {
                detail.push_str(&format!(
                    "; suggested fix (rerun with --commit-message to accept): '{suggestion}'"
                ));
            }
            return Err(anyhow!(detail));
        }
        if ctx.opts.dry_run {
            return Ok(format!("DRY RUN: would commit with message '{message}'"));
        }
        let prefixes = ctx.cfg.workflow_prefixes();
        let paths: Vec<&str> = prefixes.iter().map(String::as_str).collect();
        ctx.git.add(&paths)?;
        let rev = ctx.git.commit(&message)?;
        Ok(format!("committed {rev}"))
    }
}

struct PullRequestHandler;

impl StageHandler for PullRequestHandler {
    fn run(&self, ctx: &StageContext) -> Result<String> {
        if ctx.opts.dry_run {
            let branch = ctx.opts.branch.as_deref().unwrap_or("<current branch>");
            return Ok(format!(
                "DRY RUN: would push '{branch}' and open a PR titled '{}'",
                ctx.opts.title
            ));
        }
        let branch = match &ctx.opts.branch {
            Some(b) => b.clone(),
            None => ctx.git.current_branch()?,
        };
        if ctx.gh.pr_exists(&branch)? {
            return Ok(format!("open PR already exists for '{branch}'; skipped creation"));
        }
        ctx.git.push("origin", &branch)?;
        let body = format!(
            "Change `{}` via the {} lane.\n\nSee `openspec/changes/{}/proposal.md`.",
            ctx.opts.change_id.as_str(),
            ctx.opts.lane.as_str(),
            ctx.opts.change_id.as_str(),
        );
        let url = ctx.gh.pr_create(&ctx.opts.title, &body)?;
        Ok(format!("opened {url}"))
    }
}

struct FinalizeHandler;

impl StageHandler for FinalizeHandler {
    fn run(&self, ctx: &StageContext) -> Result<String> {
        if ctx.opts.dry_run {
            return Ok("DRY RUN: would write the run summary report".to_string());
        }
        let dir = ctx.cfg.report_dir(&ctx.repo_root, &ctx.opts.change_id);
        std::fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
        let summary = serde_json::json!({
            "change_id": ctx.opts.change_id.as_str(),
            "title": ctx.opts.title,
            "owner": ctx.opts.owner,
            "lane": ctx.opts.lane.as_str(),
            "finished_unix": osw_tools::now_unix(),
        });
        let path = dir.join("summary.json");
        std::fs::write(&path, serde_json::to_vec_pretty(&summary)?)
            .with_context(|| format!("write {}", path.display()))?;
        Ok(format!("summary written to {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use osw_core::{ChangeId, LaneName};
    use osw_tools::{ScriptedTools, ToolOutput};

    use crate::context::RunOptions;

    fn ctx_in(dir: &Path, tools: Arc<ScriptedTools>) -> StageContext {
        let opts = RunOptions::new(ChangeId::from_str("update-readme"), "Update README", "dev");
        StageContext::new(dir.to_path_buf(), Config::default_for_repo(), opts, tools)
    }

    fn dry_ctx(dir: &Path) -> StageContext {
        let mut opts = RunOptions::new(ChangeId::from_str("update-readme"), "Update README", "dev");
        opts.dry_run = true;
        StageContext::new(dir.to_path_buf(), Config::default_for_repo(), opts, Arc::new(ScriptedTools::new()))
    }

    #[test]
    fn scaffolding_stages_write_and_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_in(dir.path(), Arc::new(ScriptedTools::new()));
        let table = StageTable::with_default_handlers();

        let first = table.run(Stage::Proposal, &ctx).unwrap();
        assert!(first.starts_with("wrote"));
        let proposal = ctx.change_dir().join("proposal.md");
        let body = std::fs::read_to_string(&proposal).unwrap();
        assert!(body.contains("Update README"));
        assert!(body.contains("update-readme"));

        // A resumed run must not clobber prior output.
        std::fs::write(&proposal, "edited by hand").unwrap();
        let second = table.run(Stage::Proposal, &ctx).unwrap();
        assert!(second.contains("left untouched"));
        assert_eq!(std::fs::read_to_string(&proposal).unwrap(), "edited by hand");
    }

    #[test]
    fn dry_run_stages_write_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = dry_ctx(dir.path());
        let table = StageTable::with_default_handlers();
        for stage in [
            Stage::Setup,
            Stage::Proposal,
            Stage::SpecDefinition,
            Stage::TaskBreakdown,
            Stage::TestPlan,
            Stage::Scripts,
            Stage::Finalize,
        ] {
            let detail = table.run(stage, &ctx).unwrap();
            assert!(detail.starts_with("DRY RUN"), "{stage}: {detail}");
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn implementation_runs_configured_commands() {
        let dir = tempfile::tempdir().unwrap();
        let tools = Arc::new(ScriptedTools::new());
        tools.expect("make", ToolOutput::ok(""));
        let mut ctx = ctx_in(dir.path(), tools.clone());
        ctx.cfg.commands.implement = vec![vec!["make".to_string(), "build".to_string()]];
        let detail = StageTable::with_default_handlers()
            .run(Stage::Implementation, &ctx)
            .unwrap();
        assert_eq!(detail, "ran 1 implementation command(s)");
        assert_eq!(tools.calls_for("make"), 1);
    }

    #[test]
    fn implementation_command_failure_fails_the_stage() {
        let dir = tempfile::tempdir().unwrap();
        let tools = Arc::new(ScriptedTools::new());
        tools.expect("make", ToolOutput::failed(2, "", "build broke"));
        let mut ctx = ctx_in(dir.path(), tools);
        ctx.cfg.commands.implement = vec![vec!["make".to_string()]];
        let err = StageTable::with_default_handlers()
            .run(Stage::Implementation, &ctx)
            .unwrap_err();
        assert!(err.to_string().contains("build broke"));
    }

    #[test]
    fn doc_review_requires_the_scaffolded_documents() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_in(dir.path(), Arc::new(ScriptedTools::new()));
        let table = StageTable::with_default_handlers();
        let err = table.run(Stage::DocReview, &ctx).unwrap_err();
        assert!(err.to_string().contains("proposal.md"));

        for stage in [Stage::Proposal, Stage::SpecDefinition, Stage::TaskBreakdown, Stage::TestPlan] {
            table.run(stage, &ctx).unwrap();
        }
        assert!(table.run(Stage::DocReview, &ctx).is_ok());
    }

    #[test]
    fn docs_lane_doc_review_does_not_require_a_test_plan() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = ctx_in(dir.path(), Arc::new(ScriptedTools::new()));
        ctx.opts.lane = LaneName::Docs;
        let table = StageTable::with_default_handlers();
        for stage in [Stage::Proposal, Stage::SpecDefinition, Stage::TaskBreakdown] {
            table.run(stage, &ctx).unwrap();
        }
        assert!(table.run(Stage::DocReview, &ctx).is_ok());
    }

    #[test]
    fn commit_stage_rejects_invalid_messages_with_suggestion() {
        let dir = tempfile::tempdir().unwrap();
        let tools = Arc::new(ScriptedTools::new());
        let mut ctx = ctx_in(dir.path(), tools.clone());
        ctx.opts.commit_message = Some("Added new feature".to_string());
        let err = StageTable::with_default_handlers()
            .run(Stage::Commit, &ctx)
            .unwrap_err();
        let text = err.to_string();
        assert!(text.contains("commit message rejected"));
        assert!(text.contains("suggested fix"));
        // No git mutation happened.
        assert_eq!(tools.calls_for("git"), 0);
    }

    #[test]
    fn commit_stage_default_message_validates_and_commits() {
        let dir = tempfile::tempdir().unwrap();
        let tools = Arc::new(ScriptedTools::new());
        tools.expect("git", ToolOutput::ok("")); // add
        tools.expect("git", ToolOutput::ok("")); // commit
        tools.expect("git", ToolOutput::ok("abc123")); // rev-parse
        let ctx = ctx_in(dir.path(), tools.clone());
        let detail = StageTable::with_default_handlers()
            .run(Stage::Commit, &ctx)
            .unwrap();
        assert_eq!(detail, "committed abc123");
        let calls = tools.calls();
        assert_eq!(calls[1].1[0], "commit");
        assert_eq!(calls[1].1[2], "chore(update-readme): Update README");
    }

    #[test]
    fn pull_request_stage_detects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let tools = Arc::new(ScriptedTools::new());
        tools.expect("git", ToolOutput::ok("change/update-readme")); // current branch
        tools.expect("gh", ToolOutput::ok(r#"[{"number": 7}]"#));
        let ctx = ctx_in(dir.path(), tools.clone());
        let detail = StageTable::with_default_handlers()
            .run(Stage::PullRequest, &ctx)
            .unwrap();
        assert!(detail.contains("already exists"));
        // No push, no create.
        assert_eq!(tools.calls_for("git"), 1);
        assert_eq!(tools.calls_for("gh"), 1);
    }

    #[test]
    fn pull_request_dry_run_makes_no_platform_calls() {
        let dir = tempfile::tempdir().unwrap();
        let tools = Arc::new(ScriptedTools::new());
        let mut ctx = ctx_in(dir.path(), tools.clone());
        ctx.opts.dry_run = true;
        let detail = StageTable::with_default_handlers()
            .run(Stage::PullRequest, &ctx)
            .unwrap();
        assert!(detail.starts_with("DRY RUN"));
        assert_eq!(tools.calls_for("git"), 0);
        assert_eq!(tools.calls_for("gh"), 0);
    }

    #[test]
    fn version_bump_failure_degrades_instead_of_failing() {
        let dir = tempfile::tempdir().unwrap();
        // No VERSION file and git errors out: stage still succeeds.
        let tools = Arc::new(ScriptedTools::new());
        tools.expect("git", ToolOutput::failed(128, "", "no remote"));
        let ctx = ctx_in(dir.path(), tools);
        let detail = StageTable::with_default_handlers()
            .run(Stage::VersionBump, &ctx)
            .unwrap();
        assert!(detail.contains("version resolution unavailable"));
    }

    #[test]
    fn version_bump_writes_the_next_version() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("VERSION"), "0.1.26\n").unwrap();
        let tools = Arc::new(ScriptedTools::new());
        tools.expect("git", ToolOutput::ok("main")); // current branch
        tools.expect("git", ToolOutput::ok("")); // fetch
        tools.expect("git", ToolOutput::ok("0.1.26")); // show
        let ctx = ctx_in(dir.path(), tools);
        let detail = StageTable::with_default_handlers()
            .run(Stage::VersionBump, &ctx)
            .unwrap();
        assert_eq!(detail, "version 0.1.26 -> 0.1.27");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("VERSION")).unwrap(),
            "0.1.27\n"
        );
    }
}

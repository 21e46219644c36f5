use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use osw_core::LaneConfig;
use osw_tools::ToolRunner;

use crate::parse::{parse_bandit_json, parse_mypy_output, parse_pytest_output, parse_ruff_json};
use crate::types::{Finding, GateKind, GateReport, Severity};

/// Command vectors for each gate tool, overridable from the repo config.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GateCommands {
    pub lint: Vec<String>,
    pub type_check: Vec<String>,
    pub tests: Vec<String>,
    pub security: Vec<String>,
}

impl Default for GateCommands {
    fn default() -> Self {
        Self {
            lint: vec!["ruff", "check", "--output-format", "json", "."]
                .into_iter()
                .map(String::from)
                .collect(),
            type_check: vec!["mypy", "--no-error-summary", "."]
                .into_iter()
                .map(String::from)
                .collect(),
            tests: vec!["pytest", "--cov", "-q"]
                .into_iter()
                .map(String::from)
                .collect(),
            security: vec!["bandit", "-r", ".", "-f", "json", "-q"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl GateCommands {
    fn for_gate(&self, gate: GateKind) -> &[String] {
        match gate {
            GateKind::Lint => &self.lint,
            GateKind::TypeCheck => &self.type_check,
            GateKind::Tests => &self.tests,
            GateKind::Security => &self.security,
        }
    }
}

/// Invokes the external analysis tools and compares their output against
/// the lane's thresholds. The docs lane never reaches this type; that
/// bypass lives in the orchestrator.
pub struct GateRunner {
    tools: Arc<dyn ToolRunner>,
    repo_root: PathBuf,
    commands: GateCommands,
}

impl GateRunner {
    pub fn new(tools: Arc<dyn ToolRunner>, repo_root: PathBuf, commands: GateCommands) -> Self {
        Self { tools, repo_root, commands }
    }

    pub fn run_all(&self, lane: &LaneConfig) -> Result<Vec<GateReport>> {
        GateKind::ALL
            .iter()
            .map(|gate| self.run_gate(*gate, lane))
            .collect()
    }

    pub fn run_gate(&self, gate: GateKind, lane: &LaneConfig) -> Result<GateReport> {
        let argv = self.commands.for_gate(gate);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("no command configured for {} gate", gate.name()))?;
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        debug!(gate = gate.name(), program, "running quality gate");
        // Analysis tools exit non-zero when they find problems; that is a
        // finding, not an invocation failure. Spawn errors still bubble up.
        let out = self
            .tools
            .run(&self.repo_root, program, &args)
            .with_context(|| format!("invoke {} gate ({})", gate.name(), program))?;

        let report = match gate {
            GateKind::Lint => Self::zero_error_report(gate, parse_ruff_json(&out.stdout)?),
            GateKind::TypeCheck => Self::zero_error_report(gate, parse_mypy_output(&out.stdout)),
            GateKind::Tests => Self::tests_report(lane, &out.stdout),
            GateKind::Security => Self::security_report(parse_bandit_json(&out.stdout)?),
        };
        if !report.passed {
            warn!(
                gate = gate.name(),
                metric = report.metric_value,
                threshold = report.threshold,
                "quality gate failed"
            );
        }
        Ok(report)
    }

    /// lint and type_check pass only with zero reported errors.
    fn zero_error_report(gate: GateKind, findings: Vec<Finding>) -> GateReport {
        let count = findings.len() as f64;
        if findings.is_empty() {
            GateReport::passing(gate, 0.0, 0.0, findings)
        } else {
            let hint = format!(
                "{} reported {} error(s); first: {}",
                gate.name(),
                findings.len(),
                summarize(&findings[0]),
            );
            GateReport::failing(gate, count, 0.0, findings, hint)
        }
    }

    fn tests_report(lane: &LaneConfig, stdout: &str) -> GateReport {
        let stats = parse_pytest_output(stdout);
        let pass_rate = stats.pass_rate();
        let coverage = stats.coverage_percent.unwrap_or(0.0);

        if pass_rate < lane.pass_rate_threshold {
            return GateReport::failing(
                GateKind::Tests,
                pass_rate,
                lane.pass_rate_threshold,
                vec![],
                format!(
                    "pass rate {:.0}%, need {:.0}% ({} failed of {})",
                    pass_rate,
                    lane.pass_rate_threshold,
                    stats.failed,
                    stats.passed + stats.failed
                ),
            );
        }
        if coverage < lane.coverage_threshold {
            return GateReport::failing(
                GateKind::Tests,
                coverage,
                lane.coverage_threshold,
                vec![],
                format!(
                    "coverage {:.0}%, need {:.0}%; add tests for uncovered modules",
                    coverage, lane.coverage_threshold
                ),
            );
        }
        GateReport::passing(GateKind::Tests, coverage, lane.coverage_threshold, vec![])
    }

    /// Security passes when nothing at HIGH severity is present; lower
    /// severities are reported, not blocking.
    fn security_report(findings: Vec<Finding>) -> GateReport {
        let mut high = findings.iter().filter(|f| f.severity >= Severity::High);
        match high.next() {
            None => GateReport::passing(GateKind::Security, 0.0, 0.0, findings),
            Some(first) => {
                let hint = format!("high-severity finding: {}", summarize(first));
                let count = 1 + high.count();
                GateReport::failing(GateKind::Security, count as f64, 0.0, findings, hint)
            }
        }
    }
}

fn summarize(finding: &Finding) -> String {
    match finding.line {
        Some(line) => format!("{}:{} {}", finding.file, line, finding.message),
        None => format!("{} {}", finding.file, finding.message),
    }
}

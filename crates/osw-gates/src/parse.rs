use anyhow::{Context, Result};
use serde::Deserialize;

use crate::types::{Finding, Severity, TestStats};

#[derive(Debug, Deserialize)]
struct RuffDiagnostic {
    filename: String,
    #[serde(default)]
    location: Option<RuffLocation>,
    message: String,
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RuffLocation {
    row: u64,
}

/// ruff `--output-format json`: an array of diagnostics; empty array on a
/// clean tree.
pub fn parse_ruff_json(stdout: &str) -> Result<Vec<Finding>> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(vec![]);
    }
    let diags: Vec<RuffDiagnostic> =
        serde_json::from_str(trimmed).context("parse ruff json output")?;
    Ok(diags
        .into_iter()
        .map(|d| Finding {
            file: d.filename,
            line: d.location.map(|l| l.row),
            message: match d.code {
                Some(code) => format!("{code}: {}", d.message),
                None => d.message,
            },
            severity: Severity::Medium,
        })
        .collect())
}

/// mypy text output: one `path:line: error: message` line per error, plus
/// a trailing summary we ignore.
pub fn parse_mypy_output(stdout: &str) -> Vec<Finding> {
    stdout
        .lines()
        .filter_map(|line| {
            let (loc, message) = line.split_once(": error: ")?;
            let mut parts = loc.rsplitn(2, ':');
            let line_no = parts.next().and_then(|n| n.parse::<u64>().ok());
            let file = parts.next().unwrap_or(loc).to_string();
            Some(Finding {
                file,
                line: line_no,
                message: message.trim().to_string(),
                severity: Severity::High,
            })
        })
        .collect()
}

/// pytest terminal output: the `=== N passed, M failed ... ===` summary
/// line plus, when run under coverage, a `TOTAL ... NN%` row.
pub fn parse_pytest_output(stdout: &str) -> TestStats {
    let mut stats = TestStats::default();
    for line in stdout.lines() {
        let line = line.trim();
        if line.starts_with("TOTAL") {
            if let Some(pct) = line
                .split_whitespace()
                .last()
                .and_then(|tok| tok.strip_suffix('%'))
                .and_then(|n| n.parse::<f64>().ok())
            {
                stats.coverage_percent = Some(pct);
            }
            continue;
        }
        if line.contains("passed") || line.contains("failed") {
            for chunk in line.trim_matches(|c| c == '=' || c == ' ').split(',') {
                let mut words = chunk.split_whitespace();
                let (Some(count), Some(label)) = (words.next(), words.next()) else {
                    continue;
                };
                let Ok(count) = count.parse::<u64>() else { continue };
                match label.trim_end_matches(|c: char| !c.is_alphabetic()) {
                    "passed" => stats.passed = count,
                    "failed" => stats.failed = count,
                    _ => {}
                }
            }
        }
    }
    stats
}

#[derive(Debug, Deserialize)]
struct BanditOutput {
    #[serde(default)]
    results: Vec<BanditIssue>,
}

#[derive(Debug, Deserialize)]
struct BanditIssue {
    filename: String,
    line_number: u64,
    issue_severity: String,
    issue_text: String,
}

/// bandit `-f json`: findings under `results` with an upper-cased
/// severity string.
pub fn parse_bandit_json(stdout: &str) -> Result<Vec<Finding>> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Ok(vec![]);
    }
    let out: BanditOutput = serde_json::from_str(trimmed).context("parse bandit json output")?;
    Ok(out
        .results
        .into_iter()
        .map(|issue| Finding {
            file: issue.filename,
            line: Some(issue.line_number),
            message: issue.issue_text,
            severity: match issue.issue_severity.to_ascii_uppercase().as_str() {
                "HIGH" | "CRITICAL" => Severity::High,
                "MEDIUM" => Severity::Medium,
                _ => Severity::Low,
            },
        })
        .collect())
}

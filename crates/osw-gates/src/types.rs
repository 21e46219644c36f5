use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateKind {
    Lint,
    TypeCheck,
    Tests,
    Security,
}

impl GateKind {
    pub const ALL: [GateKind; 4] = [
        GateKind::Lint,
        GateKind::TypeCheck,
        GateKind::Tests,
        GateKind::Security,
    ];

    pub fn name(self) -> &'static str {
        match self {
            GateKind::Lint => "lint",
            GateKind::TypeCheck => "type_check",
            GateKind::Tests => "tests",
            GateKind::Security => "security",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub file: String,
    pub line: Option<u64>,
    pub message: String,
    pub severity: Severity,
}

/// Result of one gate run. Produced fresh each invocation; may be written
/// to a report artifact but is never load-bearing across runs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GateReport {
    pub gate: GateKind,
    pub passed: bool,
    /// The metric compared against the threshold: error count for
    /// lint/type_check, the failing percentage for tests, high-severity
    /// finding count for security.
    pub metric_value: f64,
    pub threshold: f64,
    pub findings: Vec<Finding>,
    pub remediation: Option<String>,
}

impl GateReport {
    pub fn passing(gate: GateKind, metric_value: f64, threshold: f64, findings: Vec<Finding>) -> Self {
        Self { gate, passed: true, metric_value, threshold, findings, remediation: None }
    }

    pub fn failing(
        gate: GateKind,
        metric_value: f64,
        threshold: f64,
        findings: Vec<Finding>,
        remediation: String,
    ) -> Self {
        Self { gate, passed: false, metric_value, threshold, findings, remediation: Some(remediation) }
    }
}

/// Test-runner stats extracted from the tool output.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TestStats {
    pub passed: u64,
    pub failed: u64,
    pub coverage_percent: Option<f64>,
}

impl TestStats {
    pub fn pass_rate(&self) -> f64 {
        let total = self.passed + self.failed;
        if total == 0 {
            // No tests collected reads as fully passing; the coverage
            // threshold still applies.
            100.0
        } else {
            (self.passed as f64 / total as f64) * 100.0
        }
    }
}

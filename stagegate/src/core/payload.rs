//! Validator payload types.
//!
//! A [`StagePayload`] is opaque to the scheduler. Only the aggregation
//! relevant fields are typed; everything else a validator reports is kept
//! in `extra`.

use super::Severity;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single problem reported by a validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Human readable description.
    pub message: String,
    /// How severe the issue is.
    #[serde(default)]
    pub severity: Severity,
    /// File the issue was found in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Line number, 1-based.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Rule or check identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    /// Suggested fix.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Issue {
    /// Creates a new issue.
    #[must_use]
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity,
            file: None,
            line: None,
            rule: None,
            suggestion: None,
        }
    }

    /// Sets the location of the issue.
    #[must_use]
    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    /// Sets the rule identifier.
    #[must_use]
    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }

    /// Sets the suggested fix.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Pass/fail judgment attached to a stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityGate {
    /// Whether the gate passed.
    pub passed: bool,
    /// Criteria that were violated.
    #[serde(default)]
    pub violations: Vec<String>,
    /// Summary message.
    #[serde(default)]
    pub message: String,
}

impl QualityGate {
    /// Creates a passing gate.
    #[must_use]
    pub fn passed(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            violations: Vec::new(),
            message: message.into(),
        }
    }

    /// Creates a failing gate.
    #[must_use]
    pub fn failed(violations: Vec<String>) -> Self {
        let message = format!("Gate failed with {} violation(s)", violations.len());
        Self {
            passed: false,
            violations,
            message,
        }
    }
}

/// Resource usage reported by a validator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceMetrics {
    /// Number of files inspected.
    #[serde(default)]
    pub files_analyzed: u64,
    /// Number of lines inspected.
    #[serde(default)]
    pub lines_of_code: u64,
    /// Peak memory in megabytes.
    #[serde(default)]
    pub memory_usage_mb: f64,
    /// Peak CPU usage.
    #[serde(default)]
    pub cpu_usage_percent: f64,
}

impl ResourceMetrics {
    /// Folds another stage's metrics into this total: counts are summed,
    /// peaks take the maximum.
    pub fn absorb(&mut self, other: &Self) {
        self.files_analyzed = self.files_analyzed.saturating_add(other.files_analyzed);
        self.lines_of_code = self.lines_of_code.saturating_add(other.lines_of_code);
        self.memory_usage_mb = self.memory_usage_mb.max(other.memory_usage_mb);
        self.cpu_usage_percent = self.cpu_usage_percent.max(other.cpu_usage_percent);
    }
}

/// A finding produced by a security scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityFinding {
    /// Finding identifier (CVE, rule id, ...).
    pub id: String,
    /// Short title.
    pub title: String,
    /// Severity of the finding.
    #[serde(default)]
    pub severity: Severity,
    /// File the finding refers to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// Line number, 1-based.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Longer description.
    #[serde(default)]
    pub description: String,
}

impl SecurityFinding {
    /// Creates a new security finding.
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>, severity: Severity) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            severity,
            file: None,
            line: None,
            description: String::new(),
        }
    }
}

/// The result body a validator hands back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StagePayload {
    /// Problems found.
    #[serde(default)]
    pub issues: Vec<Issue>,
    /// Recommendations for the change author.
    #[serde(default)]
    pub recommendations: Vec<String>,
    /// Whether recommendations should be deduplicated when merged.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub dedupe_recommendations: bool,
    /// Optional quality gate verdict.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_gate: Option<QualityGate>,
    /// Optional resource usage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ResourceMetrics>,
    /// Security findings; only read from security scan stages.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security_findings: Vec<SecurityFinding>,
    /// Validator specific fields.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl StagePayload {
    /// Creates an empty payload.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an issue.
    #[must_use]
    pub fn with_issue(mut self, issue: Issue) -> Self {
        self.issues.push(issue);
        self
    }

    /// Adds a recommendation.
    #[must_use]
    pub fn with_recommendation(mut self, recommendation: impl Into<String>) -> Self {
        self.recommendations.push(recommendation.into());
        self
    }

    /// Sets the quality gate.
    #[must_use]
    pub fn with_quality_gate(mut self, gate: QualityGate) -> Self {
        self.quality_gate = Some(gate);
        self
    }

    /// Sets the resource metrics.
    #[must_use]
    pub fn with_metrics(mut self, metrics: ResourceMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Adds a security finding.
    #[must_use]
    pub fn with_security_finding(mut self, finding: SecurityFinding) -> Self {
        self.security_findings.push(finding);
        self
    }

    /// Adds a validator specific field.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Returns the worst issue severity, if any issues exist.
    #[must_use]
    pub fn worst_severity(&self) -> Option<Severity> {
        self.issues.iter().map(|i| i.severity).max()
    }

    /// Returns the distinct files referenced by issues, in first-seen order.
    #[must_use]
    pub fn affected_files(&self) -> Vec<String> {
        let mut files: Vec<String> = Vec::new();
        for file in self.issues.iter().filter_map(|i| i.file.as_ref()) {
            if !files.contains(file) {
                files.push(file.clone());
            }
        }
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_payload_from_validator_json() {
        let json = serde_json::json!({
            "issues": [
                {
                    "message": "unused import",
                    "severity": "warning",
                    "file": "src/lib.rs",
                    "line": 3
                },
                {"message": "syntax error", "severity": "error", "file": "src/main.rs"}
            ],
            "recommendations": ["run rustfmt"],
            "quality_gate": {"passed": false, "violations": ["syntax error"]},
            "metrics": {"files_analyzed": 2, "lines_of_code": 120},
            "tool_version": "1.2.0"
        });

        let payload: StagePayload = serde_json::from_value(json).unwrap();

        assert_eq!(payload.issues.len(), 2);
        assert_eq!(payload.issues[0].severity, Severity::Medium);
        assert_eq!(payload.worst_severity(), Some(Severity::High));
        assert_eq!(payload.affected_files(), vec!["src/lib.rs", "src/main.rs"]);
        assert!(!payload.quality_gate.as_ref().unwrap().passed);
        assert_eq!(payload.metrics.unwrap().lines_of_code, 120);
        assert_eq!(payload.extra.get("tool_version"), Some(&serde_json::json!("1.2.0")));
    }

    #[test]
    fn test_resource_metrics_absorb() {
        let mut total = ResourceMetrics {
            files_analyzed: 3,
            lines_of_code: 100,
            memory_usage_mb: 64.0,
            cpu_usage_percent: 20.0,
        };
        total.absorb(&ResourceMetrics {
            files_analyzed: 2,
            lines_of_code: 50,
            memory_usage_mb: 32.0,
            cpu_usage_percent: 75.0,
        });

        assert_eq!(total.files_analyzed, 5);
        assert_eq!(total.lines_of_code, 150);
        assert!((total.memory_usage_mb - 64.0).abs() < f64::EPSILON);
        assert!((total.cpu_usage_percent - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_resource_metrics_absorb_saturates() {
        let mut total = ResourceMetrics {
            files_analyzed: u64::MAX,
            lines_of_code: u64::MAX - 1,
            ..ResourceMetrics::default()
        };
        total.absorb(&ResourceMetrics {
            files_analyzed: 1,
            lines_of_code: 10,
            ..ResourceMetrics::default()
        });

        assert_eq!(total.files_analyzed, u64::MAX);
        assert_eq!(total.lines_of_code, u64::MAX);
    }

    #[test]
    fn test_worst_severity_empty() {
        assert_eq!(StagePayload::new().worst_severity(), None);
    }

    #[test]
    fn test_quality_gate_failed_message() {
        let gate = QualityGate::failed(vec!["coverage below 80%".into()]);
        assert!(!gate.passed);
        assert_eq!(gate.message, "Gate failed with 1 violation(s)");
    }
}

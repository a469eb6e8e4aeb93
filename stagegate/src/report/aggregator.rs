//! Folding stage results into one verdict.

use crate::core::{
    Grade, OverallStatus, QualityGate, ResourceMetrics, SecurityFinding, Severity, StageStatus,
};
use crate::pipeline::{ExecutionMetrics, StageGraph};
use crate::stages::{Capability, StageResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Issue counts by severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueSummary {
    /// Informational issues.
    pub info: usize,
    /// Low severity issues.
    pub low: usize,
    /// Medium severity issues.
    pub medium: usize,
    /// High severity issues.
    pub high: usize,
    /// Critical issues.
    pub critical: usize,
}

impl IssueSummary {
    /// Counts one issue.
    pub fn record(&mut self, severity: Severity) {
        match severity {
            Severity::Info => self.info += 1,
            Severity::Low => self.low += 1,
            Severity::Medium => self.medium += 1,
            Severity::High => self.high += 1,
            Severity::Critical => self.critical += 1,
        }
    }

    /// Total number of issues.
    #[must_use]
    pub fn total(&self) -> usize {
        self.info + self.low + self.medium + self.high + self.critical
    }
}

/// The aggregated view of a run's stage results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    /// Verdict derived from stage outcomes alone.
    pub overall_status: OverallStatus,
    /// Percentage of stages that completed.
    pub overall_score: f64,
    /// Letter grade for the score.
    pub grade: Grade,
    /// Recommendations in stage declaration order.
    pub recommendations: Vec<String>,
    /// Quality gate verdicts by stage.
    pub quality_gates: BTreeMap<String, QualityGate>,
    /// Findings from security scan stages.
    pub security_findings: Vec<SecurityFinding>,
    /// Combined resource usage.
    pub resource_usage: ResourceMetrics,
    /// Issue counts by severity.
    pub issue_summary: IssueSummary,
    /// Duration of each stage that ran.
    pub stage_durations: BTreeMap<String, u64>,
}

/// Computes an [`Aggregate`] from a run's results.
#[derive(Debug, Clone, Default)]
pub struct ResultAggregator {
    declaration_order: Vec<String>,
}

impl ResultAggregator {
    /// Creates an aggregator that merges in the given stage order.
    #[must_use]
    pub fn new(declaration_order: Vec<String>) -> Self {
        Self { declaration_order }
    }

    /// Creates an aggregator for a graph's declaration order.
    #[must_use]
    pub fn for_graph(graph: &StageGraph) -> Self {
        Self::new(graph.declaration_order().to_vec())
    }

    /// Aggregates results.
    ///
    /// The score is the share of all stages that completed, so skipped and
    /// never-launched stages lower it. Stage criticality affects the status,
    /// never the score.
    #[must_use]
    pub fn aggregate(
        &self,
        results: &HashMap<String, StageResult>,
        metrics: &ExecutionMetrics,
    ) -> Aggregate {
        let ratio = completion_ratio(metrics);
        let mut aggregate = Aggregate {
            overall_status: status(results),
            overall_score: (ratio * 100.0).round() / 100.0,
            grade: Grade::from_score(ratio),
            recommendations: Vec::new(),
            quality_gates: BTreeMap::new(),
            security_findings: Vec::new(),
            resource_usage: ResourceMetrics::default(),
            issue_summary: IssueSummary::default(),
            stage_durations: BTreeMap::new(),
        };

        for result in self.declaration_order.iter().filter_map(|name| results.get(name)) {
            if result.status != StageStatus::Skipped {
                aggregate.stage_durations.insert(result.stage.clone(), result.duration_ms);
            }

            let Some(payload) = &result.payload else {
                continue;
            };

            if payload.dedupe_recommendations {
                let mut own: Vec<&String> = Vec::new();
                for rec in &payload.recommendations {
                    if !own.contains(&rec) {
                        own.push(rec);
                    }
                }
                aggregate.recommendations.extend(own.into_iter().cloned());
            } else {
                aggregate.recommendations.extend(payload.recommendations.iter().cloned());
            }

            if let Some(gate) = &payload.quality_gate {
                aggregate.quality_gates.insert(result.stage.clone(), gate.clone());
            }
            if result.capability == Capability::SecurityScan {
                aggregate.security_findings.extend(payload.security_findings.iter().cloned());
            }
            if let Some(metrics) = &payload.metrics {
                aggregate.resource_usage.absorb(metrics);
            }
            for issue in &payload.issues {
                aggregate.issue_summary.record(issue.severity);
            }
        }

        aggregate
    }
}

/// Unrounded completion percentage; the grade is taken from this value.
#[allow(clippy::cast_precision_loss)]
fn completion_ratio(metrics: &ExecutionMetrics) -> f64 {
    if metrics.total == 0 {
        return 0.0;
    }
    100.0 * metrics.completed as f64 / metrics.total as f64
}

fn status(results: &HashMap<String, StageResult>) -> OverallStatus {
    let mut any_failed = false;
    for result in results.values().filter(|r| r.status == StageStatus::Failed) {
        if result.critical {
            return OverallStatus::Failed;
        }
        any_failed = true;
    }
    if any_failed {
        OverallStatus::Warning
    } else {
        OverallStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Issue, StagePayload};
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn completed(stage: &str, capability: Capability, payload: StagePayload) -> StageResult {
        StageResult::completed(stage, capability, false, payload, Utc::now(), 10)
    }

    fn failed(stage: &str, capability: Capability, critical: bool, error: &str) -> StageResult {
        StageResult::failed(stage, capability, critical, error, Utc::now(), 3)
    }

    fn collect(results: Vec<StageResult>) -> (Vec<String>, HashMap<String, StageResult>) {
        let order = results.iter().map(|r| r.stage.clone()).collect();
        let map = results.into_iter().map(|r| (r.stage.clone(), r)).collect();
        (order, map)
    }

    fn run(results: Vec<StageResult>, total: usize) -> Aggregate {
        let (order, map) = collect(results);
        let metrics = ExecutionMetrics::from_results(total, &map);
        ResultAggregator::new(order).aggregate(&map, &metrics)
    }

    #[test]
    fn test_all_completed() {
        let agg = run(
            vec![
                completed("syntax_check", Capability::SyntaxCheck, StagePayload::new()),
                completed("linting", Capability::Linting, StagePayload::new()),
            ],
            2,
        );

        assert_eq!(agg.overall_status, OverallStatus::Success);
        assert!((agg.overall_score - 100.0).abs() < f64::EPSILON);
        assert_eq!(agg.grade, Grade::A);
    }

    #[test]
    fn test_critical_failure_and_skip() {
        let agg = run(
            vec![
                failed("syntax_check", Capability::SyntaxCheck, true, "parse error"),
                StageResult::skipped(
                    "unit_tests",
                    Capability::UnitTests,
                    true,
                    "dependency 'syntax_check' failed",
                ),
                completed("linting", Capability::Linting, StagePayload::new()),
            ],
            3,
        );

        assert_eq!(agg.overall_status, OverallStatus::Failed);
        assert!((agg.overall_score - 33.33).abs() < 0.01);
        assert_eq!(agg.grade, Grade::F);
        assert!(!agg.stage_durations.contains_key("unit_tests"));
    }

    #[test]
    fn test_non_critical_failure_is_warning() {
        let agg = run(
            vec![
                failed("linting", Capability::Linting, false, "lint crashed"),
                completed("type_check", Capability::TypeCheck, StagePayload::new()),
            ],
            2,
        );

        assert_eq!(agg.overall_status, OverallStatus::Warning);
        assert_eq!(agg.grade, Grade::F);
    }

    #[test]
    fn test_not_run_stages_lower_score() {
        let agg = run(vec![completed("a", Capability::Linting, StagePayload::new())], 4);
        assert!((agg.overall_score - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_grade_uses_unrounded_score() {
        let metrics = ExecutionMetrics {
            total: 20_000,
            completed: 17_999,
            ..ExecutionMetrics::default()
        };

        let agg = ResultAggregator::default().aggregate(&HashMap::new(), &metrics);

        assert!((agg.overall_score - 90.0).abs() < f64::EPSILON);
        assert_eq!(agg.grade, Grade::B);
    }

    #[test]
    fn test_empty_run_scores_zero() {
        let agg = run(Vec::new(), 0);
        assert!(agg.overall_score.abs() < f64::EPSILON);
        assert_eq!(agg.grade, Grade::F);
        assert_eq!(agg.overall_status, OverallStatus::Success);
    }

    #[test]
    fn test_merging() {
        let lint = StagePayload::new()
            .with_recommendation("enable clippy pedantic")
            .with_recommendation("enable clippy pedantic")
            .with_issue(Issue::new(Severity::Low, "long line"))
            .with_quality_gate(QualityGate::passed("lint clean enough"))
            .with_metrics(ResourceMetrics {
                files_analyzed: 4,
                lines_of_code: 400,
                memory_usage_mb: 30.0,
                cpu_usage_percent: 50.0,
            });
        let mut deduped = StagePayload::new()
            .with_recommendation("pin dependencies")
            .with_recommendation("pin dependencies")
            .with_security_finding(SecurityFinding::new("CVE-1", "old openssl", Severity::High))
            .with_issue(Issue::new(Severity::Critical, "leaked token"))
            .with_metrics(ResourceMetrics {
                files_analyzed: 6,
                lines_of_code: 100,
                memory_usage_mb: 80.0,
                cpu_usage_percent: 20.0,
            });
        deduped.dedupe_recommendations = true;
        let perf = StagePayload::new()
            .with_security_finding(SecurityFinding::new("X", "ignored", Severity::Low));

        let agg = run(
            vec![
                completed("linting", Capability::Linting, lint),
                completed("security_scan", Capability::SecurityScan, deduped),
                completed("performance_analysis", Capability::PerformanceAnalysis, perf),
            ],
            3,
        );

        assert_eq!(
            agg.recommendations,
            vec!["enable clippy pedantic", "enable clippy pedantic", "pin dependencies"]
        );
        assert_eq!(agg.security_findings.len(), 1);
        assert_eq!(agg.security_findings[0].id, "CVE-1");
        assert_eq!(agg.quality_gates.len(), 1);
        assert!(agg.quality_gates["linting"].passed);
        assert_eq!(
            agg.resource_usage,
            ResourceMetrics {
                files_analyzed: 10,
                lines_of_code: 500,
                memory_usage_mb: 80.0,
                cpu_usage_percent: 50.0,
            }
        );
        assert_eq!(agg.issue_summary.low, 1);
        assert_eq!(agg.issue_summary.critical, 1);
        assert_eq!(agg.issue_summary.total(), 2);
        assert_eq!(agg.stage_durations.len(), 3);
    }
}

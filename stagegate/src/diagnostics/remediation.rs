//! Remediation hints keyed by stage name.

/// Hints used for stages with no entry of their own.
const GENERIC_HINTS: &[&str] = &[
    "Review the stage output for the failing check",
    "Re-run the stage locally to reproduce the problem",
    "Consult the validator documentation for this check",
];

/// Returns the fixed hint list for a stage name.
fn hints_for(stage: &str) -> &'static [&'static str] {
    match stage {
        "syntax_check" => &[
            "Fix the reported syntax errors",
            "Check for unbalanced brackets and missing delimiters",
            "Make sure the file parses with the project's language version",
        ],
        "linting" => &[
            "Run the linter locally and apply its auto-fixes",
            "Address the remaining warnings by hand",
            "Align the code with the project style guide",
        ],
        "type_check" => &[
            "Fix the reported type mismatches",
            "Add missing type annotations",
            "Check that imported symbols exist with the expected signatures",
        ],
        "unit_tests" => &[
            "Fix failing unit tests",
            "Run the failing tests in isolation to see the assertion output",
            "Update expectations only if the behavior change is intended",
        ],
        "integration_tests" => &[
            "Fix failing integration tests",
            "Check that external services and fixtures are available",
            "Look for ordering or shared-state problems between tests",
        ],
        "security_scan" => &[
            "Rotate and redact any leaked secrets",
            "Upgrade dependencies with known vulnerabilities",
            "Validate and sanitize untrusted input",
        ],
        "performance_analysis" => &[
            "Optimize nested loops on hot paths",
            "Avoid repeated allocations inside loops",
            "Cache results of expensive computations",
        ],
        _ => GENERIC_HINTS,
    }
}

/// Returns the remediation hints for a stage, falling back to generic
/// advice for unknown names.
#[must_use]
pub fn remediation_for(stage: &str) -> Vec<String> {
    hints_for(stage).iter().map(|s| (*s).to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_stages() {
        assert!(remediation_for("security_scan")[0].contains("secrets"));
        assert!(remediation_for("performance_analysis")[0].contains("nested loops"));
        assert_eq!(remediation_for("unit_tests")[0], "Fix failing unit tests");
    }

    #[test]
    fn test_unknown_stage_falls_back() {
        assert_eq!(remediation_for("license_audit"), remediation_for("docs_check"));
        assert_eq!(remediation_for("license_audit").len(), GENERIC_HINTS.len());
        assert_eq!(remediation_for("license_audit")[0], GENERIC_HINTS[0]);
    }

    #[test]
    fn test_lookup_is_stable() {
        assert_eq!(remediation_for("linting"), remediation_for("linting"));
        assert_ne!(remediation_for("linting"), remediation_for("type_check"));
    }
}

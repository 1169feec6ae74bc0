//! Prompt templates for the test-writing and implementing agents.

use std::fmt::Write as _;

use super::extraction::{render_code_files, CodeFiles};
use super::testing::TestRunReport;
use crate::analysis::ErrorAnalyzer;
use crate::core::FeatureSpec;

const OUTPUT_FORMAT: &str = "Return every file as:
FILE: <relative/path>
```
<full file contents>
```
";

/// RED phase: ask for failing tests.
pub fn test_writer_prompt(
    requirement: &str,
    feature: Option<&FeatureSpec>,
    existing_tests: &CodeFiles,
    existing_code: &CodeFiles,
) -> String {
    let mut prompt = String::from("You are writing tests first (TDD RED phase).\n\n");
    let _ = writeln!(prompt, "REQUIREMENT:\n{}\n", requirement.trim());
    if let Some(feature) = feature {
        let _ = writeln!(prompt, "FEATURE: {}\nDESCRIPTION: {}\n", feature.title, feature.description);
        prompt.push_str("Write tests for this feature only. Earlier features are already implemented.\n\n");
    }
    if !existing_code.is_empty() {
        let _ = writeln!(prompt, "EXISTING CODE:\n{}", render_code_files(existing_code));
    }
    if !existing_tests.is_empty() {
        let _ = writeln!(prompt, "EXISTING TESTS:\n{}", render_code_files(existing_tests));
    }
    prompt.push_str("Write focused unit tests that fail until the behaviour is implemented.\n\n");
    prompt.push_str(OUTPUT_FORMAT);
    prompt
}

/// YELLOW phase: ask for an implementation that satisfies the tests.
pub fn implementation_prompt(
    requirement: &str,
    feature: Option<&FeatureSpec>,
    tests: &CodeFiles,
    existing_code: &CodeFiles,
) -> String {
    let mut prompt = String::from("You are implementing code to make tests pass (TDD YELLOW phase).\n\n");
    let _ = writeln!(prompt, "REQUIREMENT:\n{}\n", requirement.trim());
    if let Some(feature) = feature {
        let _ = writeln!(prompt, "FEATURE: {}\nDESCRIPTION: {}\n", feature.title, feature.description);
    }
    let _ = writeln!(prompt, "TESTS:\n{}", render_code_files(tests));
    if !existing_code.is_empty() {
        let _ = writeln!(
            prompt,
            "EXISTING CODE (keep it working):\n{}",
            render_code_files(existing_code)
        );
    }
    prompt.push_str("Write the minimal complete implementation that makes every test pass.\n\n");
    prompt.push_str(OUTPUT_FORMAT);
    prompt
}

/// Fix pass after a failed GREEN phase.
///
/// Timeouts and sandbox crashes are reported as-is, without analysis.
pub fn fix_prompt(
    requirement: &str,
    tests: &CodeFiles,
    code: &CodeFiles,
    report: &TestRunReport,
    analyzer: &ErrorAnalyzer,
) -> String {
    let mut prompt = implementation_prompt(requirement, None, tests, code);
    let _ = writeln!(prompt, "\nTEST RESULTS:\n{}\n", report.validation_output());

    if !report.is_execution_failure() {
        if let Some(first) = report.failures().next() {
            let info = analyzer.analyze_error(&first.message);
            let snippet = code.values().next().map(String::as_str);
            prompt.push_str(&analyzer.create_error_context_prompt(&info, requirement, snippet));
            prompt.push('\n');
        }
    }
    prompt.push_str("Fix the implementation so that all tests pass. Do not modify the tests.\n");
    prompt
}

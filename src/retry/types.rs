//! Retry configuration and test-failure data model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Default number of retries for a failed feature attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Default cap on test-driven hints injected into a retry prompt.
pub const DEFAULT_MAX_TEST_HINTS: usize = 5;

/// Retry behaviour for one workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts beyond the first that may be made for a feature.
    pub max_retries: u32,
    /// Scrape or synthesise an error context before retrying.
    pub extract_error_context: bool,
    /// Replace the coder prompt with an enriched retry prompt.
    pub modify_prompt_on_retry: bool,
    /// Include per-test failure detail and hints in retry prompts.
    pub include_test_context: bool,
    /// Report which tests started passing between attempts.
    pub track_test_progression: bool,
    /// Upper bound on test-driven hints per prompt.
    pub max_test_specific_hints: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            extract_error_context: true,
            modify_prompt_on_retry: true,
            include_test_context: true,
            track_test_progression: true,
            max_test_specific_hints: DEFAULT_MAX_TEST_HINTS,
        }
    }
}

impl RetryConfig {
    /// Create a config with the specified max retries.
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }
}

/// Kind of test failure, derived from the failure message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    Assertion,
    ImportError,
    AttributeError,
    NameError,
    TypeError,
    Other,
}

impl FailureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureType::Assertion => "assertion",
            FailureType::ImportError => "import_error",
            FailureType::AttributeError => "attribute_error",
            FailureType::NameError => "name_error",
            FailureType::TypeError => "type_error",
            FailureType::Other => "other",
        }
    }
}

impl std::fmt::Display for FailureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failing test in one attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFailureContext {
    pub test_file: String,
    pub test_name: String,
    pub failure_type: FailureType,
    pub failure_message: String,
    pub expected_value: Option<String>,
    pub actual_value: Option<String>,
    pub missing_component: Option<String>,
}

impl TestFailureContext {
    pub fn new(
        test_file: impl Into<String>,
        test_name: impl Into<String>,
        failure_type: FailureType,
        failure_message: impl Into<String>,
    ) -> Self {
        Self {
            test_file: test_file.into(),
            test_name: test_name.into(),
            failure_type,
            failure_message: failure_message.into(),
            expected_value: None,
            actual_value: None,
            missing_component: None,
        }
    }

    pub fn with_values(mut self, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        self.expected_value = Some(expected.into());
        self.actual_value = Some(actual.into());
        self
    }

    pub fn with_missing(mut self, component: impl Into<String>) -> Self {
        self.missing_component = Some(component.into());
        self
    }

    /// Stable `file::name` key used for progression tracking.
    pub fn key(&self) -> String {
        format!("{}::{}", self.test_file, self.test_name)
    }
}

/// Counts recorded after each tracked attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptSnapshot {
    pub attempt_index: u32,
    pub failing_count: usize,
    pub passed_count: usize,
}

/// Per-feature record of failing/passing tests across attempts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestProgressionTracker {
    pub failing_tests: BTreeSet<String>,
    pub passed_tests: BTreeSet<String>,
    pub persistent_failures: BTreeSet<String>,
    /// Tests that moved from failing to passing on the latest attempt.
    pub newly_passed: BTreeSet<String>,
    pub attempt_history: Vec<AttemptSnapshot>,
}

impl TestProgressionTracker {
    /// Fold a new failing set into the tracker.
    pub fn record(&mut self, current_failing: BTreeSet<String>, attempt_index: u32) {
        let newly_passed: BTreeSet<String> = self
            .failing_tests
            .difference(&current_failing)
            .cloned()
            .collect();
        self.persistent_failures = self
            .failing_tests
            .intersection(&current_failing)
            .cloned()
            .collect();
        self.passed_tests.extend(newly_passed.iter().cloned());
        self.newly_passed = newly_passed;
        self.failing_tests = current_failing;
        self.attempt_history.push(AttemptSnapshot {
            attempt_index,
            failing_count: self.failing_tests.len(),
            passed_count: self.passed_tests.len(),
        });
    }
}

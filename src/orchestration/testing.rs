//! Test run results and failure classification.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::time::Duration;

use crate::retry::{FailureType, TestFailureContext};

/// Message recorded when the sandbox exceeds its time limit.
pub const TIMEOUT_MESSAGE: &str = "Test execution timed out";

/// Message recorded when the sandbox itself fails.
pub const CRASH_MESSAGE: &str = "Test execution failed";

static MODULE_NOT_FOUND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"No module named '([^']+)'").expect("static pattern"));
static CANNOT_IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"cannot import name '([^']+)'").expect("static pattern"));
static OBJECT_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"'([^']+)' object has no attribute '([^']+)'").expect("static pattern")
});
static MODULE_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"module '([^']+)' has no attribute '([^']+)'").expect("static pattern")
});
static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"name '([^']+)' is not defined").expect("static pattern"));
static ASSERT_EQ_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"assert (.+?) == ([^\n]+)").expect("static pattern"));
static EXPECTED_GOT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)expected:?\s+(.+?),?\s+but got:?\s+([^\n]+)").expect("static pattern")
});

/// Outcome of a single test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    pub test_file: String,
    pub test_name: String,
    pub passed: bool,
    #[serde(default)]
    pub message: String,
}

impl TestResult {
    pub fn passed(test_file: impl Into<String>, test_name: impl Into<String>) -> Self {
        Self {
            test_file: test_file.into(),
            test_name: test_name.into(),
            passed: true,
            message: String::new(),
        }
    }

    pub fn failed(test_file: impl Into<String>, test_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            test_file: test_file.into(),
            test_name: test_name.into(),
            passed: false,
            message: message.into(),
        }
    }
}

/// Everything a test runner reports for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRunReport {
    pub results: Vec<TestResult>,
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub crashed: bool,
    #[serde(default)]
    pub duration_ms: u64,
}

impl TestRunReport {
    pub fn new(results: Vec<TestResult>) -> Self {
        Self {
            results,
            ..Default::default()
        }
    }

    /// Failed report for a run that hit the wall-clock limit.
    pub fn timed_out(limit: Duration) -> Self {
        Self {
            results: vec![TestResult::failed("", "test_run", TIMEOUT_MESSAGE)],
            stdout: String::new(),
            stderr: format!("{} after {}s", TIMEOUT_MESSAGE, limit.as_secs()),
            timed_out: true,
            crashed: false,
            duration_ms: limit.as_millis() as u64,
        }
    }

    /// Failed report for a sandbox that could not run the tests.
    pub fn crashed(reason: impl std::fmt::Display) -> Self {
        Self {
            results: vec![TestResult::failed("", "test_run", CRASH_MESSAGE)],
            stdout: String::new(),
            stderr: format!("{}: {}", CRASH_MESSAGE, reason),
            timed_out: false,
            crashed: true,
            duration_ms: 0,
        }
    }

    /// Timeout or sandbox crash; terminal for the attempt.
    pub fn is_execution_failure(&self) -> bool {
        self.timed_out || self.crashed
    }

    /// Attach the runner's captured stdout and stderr.
    pub fn with_output(mut self, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self.stderr = stderr.into();
        self
    }

    pub fn passed_count(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    pub fn failed_count(&self) -> usize {
        self.results.iter().filter(|r| !r.passed).count()
    }

    /// True only for a non-empty run with no failures that did not time out.
    pub fn all_passed(&self) -> bool {
        !self.is_execution_failure() && !self.results.is_empty() && self.failed_count() == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &TestResult> {
        self.results.iter().filter(|r| !r.passed)
    }

    pub fn summary(&self) -> String {
        if self.is_execution_failure() {
            return self.stderr.clone();
        }
        if self.results.is_empty() {
            return "No tests were run".to_string();
        }
        format!("{} passed, {} failed", self.passed_count(), self.failed_count())
    }

    pub fn failure_contexts(&self) -> Vec<TestFailureContext> {
        self.failures().map(TestFailureContext::from_result).collect()
    }

    /// Failure messages joined into one error string, if anything failed.
    pub fn error_message(&self) -> Option<String> {
        if self.timed_out {
            return Some(TIMEOUT_MESSAGE.to_string());
        }
        if self.crashed {
            return Some(CRASH_MESSAGE.to_string());
        }
        let messages: Vec<String> = self
            .failures()
            .map(|r| format!("{}: {}", r.test_name, r.message))
            .collect();
        if messages.is_empty() {
            if self.results.is_empty() {
                return Some("No tests were run".to_string());
            }
            return None;
        }
        Some(messages.join("\n"))
    }

    /// Summary plus a `DETAILS:` section carrying the raw failure text.
    pub fn validation_output(&self) -> String {
        let mut out = self.summary();
        let details: Vec<String> = self
            .failures()
            .map(|r| format!("{}::{}\n{}", r.test_file, r.test_name, r.message))
            .collect();
        if !details.is_empty() {
            out.push_str("\nDETAILS:\n");
            out.push_str(&details.join("\n"));
        }
        if !self.stderr.trim().is_empty() && !self.is_execution_failure() {
            out.push_str("\nSTDERR:\n");
            out.push_str(self.stderr.trim());
        }
        out
    }
}

impl TestFailureContext {
    /// Classify a failed test result by its message.
    pub fn from_result(result: &TestResult) -> Self {
        let message = result.message.as_str();
        let mut ctx = TestFailureContext::new(
            result.test_file.clone(),
            result.test_name.clone(),
            classify(message),
            message,
        );

        match ctx.failure_type {
            FailureType::ImportError => {
                ctx.missing_component = MODULE_NOT_FOUND_RE
                    .captures(message)
                    .or_else(|| CANNOT_IMPORT_RE.captures(message))
                    .map(|caps| caps[1].to_string());
            }
            FailureType::AttributeError => {
                ctx.missing_component = OBJECT_ATTR_RE
                    .captures(message)
                    .or_else(|| MODULE_ATTR_RE.captures(message))
                    .map(|caps| format!("{}.{}", &caps[1], &caps[2]));
            }
            FailureType::NameError => {
                ctx.missing_component = NAME_RE.captures(message).map(|caps| caps[1].to_string());
            }
            FailureType::Assertion => {
                if let Some(caps) = ASSERT_EQ_RE.captures(message) {
                    ctx.actual_value = Some(clean_value(&caps[1]));
                    ctx.expected_value = Some(clean_value(&caps[2]));
                } else if let Some(caps) = EXPECTED_GOT_RE.captures(message) {
                    ctx.expected_value = Some(clean_value(&caps[1]));
                    ctx.actual_value = Some(clean_value(&caps[2]));
                }
            }
            FailureType::TypeError | FailureType::Other => {}
        }
        ctx
    }
}

fn classify(message: &str) -> FailureType {
    if message.contains("ImportError")
        || message.contains("ModuleNotFoundError")
        || message.contains("No module named")
    {
        FailureType::ImportError
    } else if message.contains("AttributeError") || message.contains("has no attribute") {
        FailureType::AttributeError
    } else if message.contains("NameError") || NAME_RE.is_match(message) {
        FailureType::NameError
    } else if message.contains("TypeError") {
        FailureType::TypeError
    } else if message.contains("AssertionError")
        || message.contains("assert ")
        || EXPECTED_GOT_RE.is_match(message)
    {
        FailureType::Assertion
    } else {
        FailureType::Other
    }
}

fn clean_value(raw: &str) -> String {
    raw.trim().trim_matches(|c| c == '\'' || c == '"').to_string()
}

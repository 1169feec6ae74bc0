//! Retry gate and retry-prompt assembly for failed feature attempts.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Write as _;
use std::sync::LazyLock;

use regex::Regex;

use super::types::{FailureType, RetryConfig, TestFailureContext, TestProgressionTracker};
use crate::analysis::{ErrorAnalyzer, ErrorCategory};
use crate::core::FeatureSpec;
use crate::orchestration::extraction::render_code_files;
use crate::{zlog_debug, zlog_trace};

/// Substrings that mark an error as environmental, never worth a retry.
pub const NON_RETRYABLE_MARKERS: &[&str] = &[
    "PermissionError",
    "OSError",
    "TimeoutError",
    "MemoryError",
    "RecursionError",
];

/// Keys of the error-context map produced by [`RetryStrategy::extract_error_context`].
pub mod keys {
    pub const ERROR_TYPE: &str = "error_type";
    pub const ERROR_MESSAGE: &str = "error_message";
    pub const ERROR_CATEGORY: &str = "error_category";
    pub const RECOVERY_HINT: &str = "recovery_hint";
    pub const FILE_PATH: &str = "file_path";
    pub const LINE_NUMBER: &str = "line_number";
    pub const TEST_FAILURE_COUNT: &str = "test_failure_count";
    pub const PRIMARY_FAILURE_TYPE: &str = "primary_failure_type";
}

static DETAILS_SECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)DETAILS:\s*(.*)").expect("static details pattern"));

static DETAIL_ERROR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\w+(?:Error|Exception)):\s*([^\n]+)").expect("static detail error pattern")
});

/// Everything needed to render one retry prompt.
#[derive(Debug, Clone, Copy)]
pub struct RetryRequest<'a> {
    pub original_context: &'a str,
    pub feature: &'a FeatureSpec,
    pub validation_output: &'a str,
    pub error_context: &'a BTreeMap<String, String>,
    /// 1-based number of the retry being prepared.
    pub retry_count: u32,
    pub accumulated_code: &'a BTreeMap<String, String>,
    pub test_failures: Option<&'a [TestFailureContext]>,
    pub config: Option<&'a RetryConfig>,
}

/// Decides whether to retry and what to tell the coder when it does.
///
/// Owns one [`TestProgressionTracker`] per feature id for the lifetime of
/// the strategy.
#[derive(Debug, Default)]
pub struct RetryStrategy {
    analyzer: ErrorAnalyzer,
    trackers: HashMap<String, TestProgressionTracker>,
}

impl RetryStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    /// The single gate for whether a failed attempt may be repaired.
    pub fn should_retry(&self, error_message: Option<&str>, attempt_index: u32, config: &RetryConfig) -> bool {
        let message = match error_message {
            Some(m) if !m.trim().is_empty() => m,
            _ => return false,
        };
        if attempt_index >= config.max_retries {
            zlog_debug!(
                "Retry refused: attempt {} reached max_retries {}",
                attempt_index,
                config.max_retries
            );
            return false;
        }

        let info = self.analyzer.analyze_error(message);
        if info.category == ErrorCategory::Import {
            zlog_debug!("Retry refused: import errors are not recoverable by retrying");
            return false;
        }
        if let Some(marker) = NON_RETRYABLE_MARKERS.iter().find(|m| message.contains(*m)) {
            zlog_debug!("Retry refused: non-retryable error {}", marker);
            return false;
        }

        let retry = match info.category {
            ErrorCategory::Validation => attempt_index == 0,
            _ => true,
        };
        zlog_debug!(
            "Retry decision for {} error at attempt {}: {}",
            info.category,
            attempt_index,
            retry
        );
        retry
    }

    /// Summarise a failure, preferring structured test failures over text.
    pub fn extract_error_context(
        &self,
        validation_output: &str,
        test_failures: Option<&[TestFailureContext]>,
    ) -> BTreeMap<String, String> {
        let mut context = BTreeMap::new();

        if let Some(failures) = test_failures.filter(|f| !f.is_empty()) {
            context.insert(keys::TEST_FAILURE_COUNT.to_string(), failures.len().to_string());
            context.insert(
                keys::PRIMARY_FAILURE_TYPE.to_string(),
                failures[0].failure_type.to_string(),
            );
            let message = failures
                .iter()
                .map(|f| format!("{}: {}", f.test_name, f.failure_message))
                .collect::<Vec<_>>()
                .join("\n");
            context.insert(keys::ERROR_MESSAGE.to_string(), message);
            return context;
        }

        let details = match DETAILS_SECTION_RE.captures(validation_output) {
            Some(caps) => caps.get(1).map_or("", |m| m.as_str()),
            None => return context,
        };

        let info = self.analyzer.analyze_error(details);
        if let Some(caps) = DETAIL_ERROR_RE.captures(details) {
            context.insert(keys::ERROR_TYPE.to_string(), caps[1].to_string());
            context.insert(keys::ERROR_MESSAGE.to_string(), caps[2].trim().to_string());
        } else if let Some(error_type) = &info.error_type {
            context.insert(keys::ERROR_TYPE.to_string(), error_type.clone());
        }
        if let Some(file) = info.file_path {
            context.insert(keys::FILE_PATH.to_string(), file);
        }
        if let Some(line) = info.line_number {
            context.insert(keys::LINE_NUMBER.to_string(), line.to_string());
        }
        context.insert(keys::ERROR_CATEGORY.to_string(), info.category.to_string());
        context.insert(keys::RECOVERY_HINT.to_string(), info.recovery_hint);

        zlog_trace!("Extracted error context from DETAILS section: {:?}", context);
        context
    }

    /// One hint per failure-type group (assertions get one per failure).
    pub fn generate_test_specific_hints(&self, failures: &[TestFailureContext], max_hints: usize) -> Vec<String> {
        let mut groups: Vec<(FailureType, Vec<&TestFailureContext>)> = Vec::new();
        for failure in failures {
            match groups.iter_mut().find(|(t, _)| *t == failure.failure_type) {
                Some((_, members)) => members.push(failure),
                None => groups.push((failure.failure_type, vec![failure])),
            }
        }

        let mut hints = Vec::new();
        for (failure_type, members) in groups {
            match failure_type {
                FailureType::ImportError => {
                    let missing = missing_components(&members);
                    if missing.is_empty() {
                        hints.push(format!("Fix import errors in: {}", test_names(&members)));
                    } else {
                        hints.push(format!("Create missing modules/files: {}", join(&missing)));
                    }
                }
                FailureType::Assertion => {
                    for failure in members {
                        match (&failure.expected_value, &failure.actual_value) {
                            (Some(expected), Some(actual)) => hints.push(format!(
                                "Fix {}: Expected '{}' but got '{}'",
                                failure.test_name, expected, actual
                            )),
                            _ => hints.push(format!("Fix assertion in {}", failure.test_name)),
                        }
                    }
                }
                FailureType::AttributeError => {
                    for component in missing_components(&members) {
                        match component.rsplit_once('.') {
                            Some((owner, attr)) => {
                                hints.push(format!("Add method/attribute '{}' to {}", attr, owner))
                            }
                            None => hints.push(format!("Add missing attribute '{}'", component)),
                        }
                    }
                }
                FailureType::NameError => {
                    let missing = missing_components(&members);
                    if missing.is_empty() {
                        hints.push(format!("Define missing names used in: {}", test_names(&members)));
                    } else {
                        hints.push(format!("Define missing names: {}", join(&missing)));
                    }
                }
                FailureType::TypeError => {
                    hints.push(format!(
                        "Check argument types and call signatures in: {}",
                        test_names(&members)
                    ));
                }
                FailureType::Other => {
                    hints.push(format!("Investigate failures in: {}", test_names(&members)));
                }
            }
        }

        hints.truncate(max_hints);
        hints
    }

    /// Record this attempt's failing set for `feature_id`.
    pub fn track_test_progression(
        &mut self,
        feature_id: &str,
        current_failures: &[TestFailureContext],
        attempt_index: u32,
    ) -> TestProgressionTracker {
        let current: BTreeSet<String> = current_failures.iter().map(TestFailureContext::key).collect();
        let tracker = self.trackers.entry(feature_id.to_string()).or_default();
        tracker.record(current, attempt_index);
        zlog_debug!(
            "Progression for {}: {} failing, {} newly passing, {} passed so far",
            feature_id,
            tracker.failing_tests.len(),
            tracker.newly_passed.len(),
            tracker.passed_tests.len()
        );
        tracker.clone()
    }

    pub fn progression(&self, feature_id: &str) -> Option<&TestProgressionTracker> {
        self.trackers.get(feature_id)
    }

    pub fn reset_progression(&mut self, feature_id: &str) {
        self.trackers.remove(feature_id);
    }

    /// Build the prompt handed to the coder for a retry.
    pub fn create_retry_prompt(&mut self, request: &RetryRequest<'_>) -> String {
        let default_config = RetryConfig::default();
        let config = request.config.unwrap_or(&default_config);
        let ctx = request.error_context;
        let mut prompt = String::new();

        let _ = writeln!(
            prompt,
            "RETRY ATTEMPT {}: The previous implementation failed validation.\n",
            request.retry_count
        );
        if !request.original_context.trim().is_empty() {
            let _ = writeln!(prompt, "ORIGINAL CONTEXT:\n{}\n", request.original_context.trim());
        }
        let _ = writeln!(prompt, "FEATURE: {}", request.feature.title);
        let _ = writeln!(prompt, "DESCRIPTION: {}\n", request.feature.description);
        let _ = writeln!(prompt, "VALIDATION OUTPUT:\n{}\n", request.validation_output.trim());

        prompt.push_str("ERROR SUMMARY:\n");
        let lookup = |key: &str| ctx.get(key).map(String::as_str).unwrap_or("Unknown");
        let error_type = ctx
            .get(keys::ERROR_TYPE)
            .or_else(|| ctx.get(keys::PRIMARY_FAILURE_TYPE))
            .map(String::as_str)
            .unwrap_or("Unknown");
        let _ = writeln!(prompt, "- Type: {}", error_type);
        let _ = writeln!(prompt, "- Message: {}", lookup(keys::ERROR_MESSAGE));
        let _ = writeln!(prompt, "- Category: {}", lookup(keys::ERROR_CATEGORY));
        let _ = writeln!(prompt, "- Hint: {}", lookup(keys::RECOVERY_HINT));
        if let Some(file) = ctx.get(keys::FILE_PATH) {
            match ctx.get(keys::LINE_NUMBER) {
                Some(line) => {
                    let _ = writeln!(prompt, "- Location: {}:{}", file, line);
                }
                None => {
                    let _ = writeln!(prompt, "- Location: {}", file);
                }
            }
        }
        if let Some(count) = ctx.get(keys::TEST_FAILURE_COUNT) {
            let _ = writeln!(prompt, "- Failing tests: {}", count);
        }
        prompt.push('\n');

        if !request.accumulated_code.is_empty() {
            prompt.push_str("CURRENT CODE:\n");
            prompt.push_str(&render_code_files(request.accumulated_code));
            prompt.push('\n');
        }

        let failures = request.test_failures.filter(|f| !f.is_empty());
        if let (true, Some(failures)) = (config.include_test_context, failures) {
            prompt.push_str("FAILING TESTS (TDD):\n");
            for (i, failure) in failures.iter().enumerate() {
                let _ = writeln!(
                    prompt,
                    "{}. {}::{} [{}]",
                    i + 1,
                    failure.test_file,
                    failure.test_name,
                    failure.failure_type
                );
                let _ = writeln!(prompt, "   Message: {}", failure.failure_message);
                if let Some(expected) = &failure.expected_value {
                    let _ = writeln!(prompt, "   Expected: {}", expected);
                }
                if let Some(actual) = &failure.actual_value {
                    let _ = writeln!(prompt, "   Actual: {}", actual);
                }
            }
            prompt.push('\n');

            let hints = self.generate_test_specific_hints(failures, config.max_test_specific_hints);
            if !hints.is_empty() {
                prompt.push_str("TEST-DRIVEN HINTS:\n");
                for hint in hints {
                    let _ = writeln!(prompt, "- {}", hint);
                }
                prompt.push('\n');
            }
        }

        if config.track_test_progression {
            let tracker = self.track_test_progression(
                &request.feature.id,
                request.test_failures.unwrap_or(&[]),
                request.retry_count,
            );
            prompt.push_str("TEST PROGRESSION:\n");
            let _ = writeln!(
                prompt,
                "- Tests now passing since previous attempt: {}",
                tracker.newly_passed.len()
            );
            let _ = writeln!(prompt, "- Tests still failing: {}", tracker.persistent_failures.len());
            let _ = writeln!(prompt, "- Currently failing: {}", tracker.failing_tests.len());
            let _ = writeln!(prompt, "- Total tests passed so far: {}\n", tracker.passed_tests.len());
        }

        prompt.push_str(RETRY_INSTRUCTIONS);
        prompt.push('\n');
        prompt.push_str(OUTPUT_FORMAT);
        prompt
    }
}

const RETRY_INSTRUCTIONS: &str = "CRITICAL INSTRUCTIONS FOR RETRY:
1. Fix the specific errors listed above; do not rewrite working code.
2. Make every failing test pass without changing the tests.
3. Keep all previously implemented features working.
4. Define every module, class, function and attribute the tests reference.
";

const OUTPUT_FORMAT: &str = "OUTPUT FORMAT:
Return the COMPLETE corrected contents of every file you change, each as:
FILE: <relative/path>
```
<full file contents>
```
";

fn missing_components(members: &[&TestFailureContext]) -> BTreeSet<String> {
    members.iter().filter_map(|f| f.missing_component.clone()).collect()
}

fn test_names(members: &[&TestFailureContext]) -> String {
    members.iter().map(|f| f.test_name.as_str()).collect::<Vec<_>>().join(", ")
}

fn join(items: &BTreeSet<String>) -> String {
    items.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

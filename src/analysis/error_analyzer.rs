//! Error classification and recovery hints.
//!
//! `ErrorAnalyzer` turns a raw error or traceback string into an
//! [`ErrorInfo`]: a category, the exception type, an optional source
//! location and a recovery hint for the coding agent.
//!
//! ## Classification
//!
//! Categories are tested in a fixed order (syntax, import, runtime,
//! validation); the first category with a matching pattern wins and
//! anything left over is `unknown`.
//!
//! ## Hint resolution
//!
//! 1. exact `error_type` key in the category's hint table
//! 2. any other key (except `default`) found in the lowercased message
//! 3. the category's `default` hint
//!
//! ```
//! use tddflow::analysis::{ErrorAnalyzer, ErrorCategory};
//!
//! let info = ErrorAnalyzer::new().analyze_error("SyntaxError: invalid syntax");
//! assert_eq!(info.category, ErrorCategory::Syntax);
//! assert_eq!(info.error_type.as_deref(), Some("SyntaxError"));
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::zlog_debug;

/// Category of an analysed error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Syntax,
    Import,
    Runtime,
    Validation,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Syntax => "syntax",
            ErrorCategory::Import => "import",
            ErrorCategory::Runtime => "runtime",
            ErrorCategory::Validation => "validation",
            ErrorCategory::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "syntax" => Ok(ErrorCategory::Syntax),
            "import" => Ok(ErrorCategory::Import),
            "runtime" => Ok(ErrorCategory::Runtime),
            "validation" => Ok(ErrorCategory::Validation),
            "unknown" => Ok(ErrorCategory::Unknown),
            other => Err(format!("unknown error category: {}", other)),
        }
    }
}

/// Result of analysing one error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub category: ErrorCategory,
    pub message: String,
    pub file_path: Option<String>,
    pub line_number: Option<u32>,
    pub error_type: Option<String>,
    pub recovery_hint: String,
}

/// Ordered category pattern table. Order is significant.
static CATEGORY_PATTERNS: LazyLock<Vec<(ErrorCategory, Vec<Regex>)>> = LazyLock::new(|| {
    let table: [(ErrorCategory, &[&str]); 4] = [
        (
            ErrorCategory::Syntax,
            &[
                r"SyntaxError",
                r"IndentationError",
                r"TabError",
                r"(?i)invalid syntax",
                r"(?i)unexpected EOF",
                r"(?i)unexpected indent",
                r"(?i)unindent does not match",
                r"(?i)unterminated string",
            ],
        ),
        (
            ErrorCategory::Import,
            &[
                r"ImportError",
                r"ModuleNotFoundError",
                r"(?i)no module named",
                r"(?i)cannot import name",
            ],
        ),
        (
            ErrorCategory::Runtime,
            &[
                r"NameError",
                r"TypeError",
                r"AttributeError",
                r"KeyError",
                r"IndexError",
                r"ValueError",
                r"ZeroDivisionError",
                r"RuntimeError",
                r"RecursionError",
                r"(?i)is not defined",
                r"(?i)object has no attribute",
                r"(?i)division by zero",
            ],
        ),
        (
            ErrorCategory::Validation,
            &[
                r"AssertionError",
                r"(?i)\bassert\b",
                r"\bFAILED\b",
                r"(?i)\btests? failed\b",
                r"(?i)expected .+ but got",
                r"(?i)validation (?:failed|error)",
            ],
        ),
    ];

    table
        .into_iter()
        .map(|(category, patterns)| {
            let compiled = patterns
                .iter()
                .map(|p| Regex::new(p).expect("static category pattern"))
                .collect();
            (category, compiled)
        })
        .collect()
});

static ERROR_TYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+Error):").expect("static error type pattern"));

static TRACEBACK_LOCATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"File "([^"]+)", line (\d+)"#).expect("static traceback pattern")
});

static COLON_LOCATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([\w./\\-]+\.py):(\d+)").expect("static location pattern")
});

const DEFAULT_KEY: &str = "default";

const SYNTAX_HINTS: &[(&str, &str)] = &[
    (
        "SyntaxError",
        "Check for missing colons, unbalanced parentheses/brackets and unclosed quotes near the reported line",
    ),
    (
        "IndentationError",
        "Fix the indentation: use 4 spaces consistently and align blocks with their enclosing statement",
    ),
    ("TabError", "Replace tab characters with spaces so indentation is consistent"),
    ("unexpected eof", "Close every open bracket, parenthesis and string literal before the end of the file"),
    ("unterminated string", "Close the string literal on the reported line"),
    (DEFAULT_KEY, "Fix the syntax error at the reported location and re-check the surrounding block"),
];

const IMPORT_HINTS: &[(&str, &str)] = &[
    (
        "ModuleNotFoundError",
        "Create the missing module or fix the import path so it matches the generated file layout",
    ),
    (
        "ImportError",
        "Make sure the imported name is defined and exported by the target module",
    ),
    ("circular", "Break the circular import by moving the shared code into a separate module"),
    ("cannot import name", "Define the missing name in the module it is imported from"),
    (DEFAULT_KEY, "Check module names, file locations and import statements"),
];

const RUNTIME_HINTS: &[(&str, &str)] = &[
    (
        "ZeroDivisionError",
        "Add a zero-check before dividing and handle the zero case explicitly",
    ),
    ("TypeError", "Check argument types and counts passed to the failing call"),
    (
        "AttributeError",
        "Add the missing attribute or method, or fix the object type it is accessed on",
    ),
    ("NameError", "Define the missing variable or function before it is used"),
    ("KeyError", "Check that the key exists before accessing it, or use a default"),
    ("IndexError", "Check list bounds before indexing"),
    ("ValueError", "Validate input values before converting or using them"),
    ("nonetype", "Guard against None before accessing attributes or calling methods"),
    ("division by zero", "Add a zero-check before dividing"),
    (DEFAULT_KEY, "Trace the failing call path and fix the runtime logic error"),
];

const VALIDATION_HINTS: &[(&str, &str)] = &[
    (
        "AssertionError",
        "Compare the expected and actual values in the failing assertion and fix the implementation logic",
    ),
    ("expected", "Make the implementation return exactly the expected value"),
    (DEFAULT_KEY, "Re-read the test expectations and align the implementation with them"),
];

const UNKNOWN_HINTS: &[(&str, &str)] = &[(
    DEFAULT_KEY,
    "Review the full error message and stack trace to identify the root cause",
)];

fn hint_table(category: ErrorCategory) -> &'static [(&'static str, &'static str)] {
    match category {
        ErrorCategory::Syntax => SYNTAX_HINTS,
        ErrorCategory::Import => IMPORT_HINTS,
        ErrorCategory::Runtime => RUNTIME_HINTS,
        ErrorCategory::Validation => VALIDATION_HINTS,
        ErrorCategory::Unknown => UNKNOWN_HINTS,
    }
}

/// Pure, stateless error classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorAnalyzer;

impl ErrorAnalyzer {
    pub fn new() -> Self {
        Self
    }

    /// Classify `message` and attach a recovery hint.
    ///
    /// Never fails: empty or unrecognised input yields an `unknown`
    /// category with the generic hint.
    pub fn analyze_error(&self, message: &str) -> ErrorInfo {
        let category = categorize(message);
        let error_type = ERROR_TYPE_RE
            .captures(message)
            .map(|caps| caps[1].to_string());
        let (file_path, line_number) = extract_location(message);
        let recovery_hint = resolve_hint(category, error_type.as_deref(), message).to_string();

        zlog_debug!(
            "ErrorAnalyzer: category={} type={:?} location={:?}:{:?}",
            category,
            error_type,
            file_path,
            line_number
        );

        ErrorInfo {
            category,
            message: message.to_string(),
            file_path,
            line_number,
            error_type,
            recovery_hint,
        }
    }

    /// Render an error-context block suitable for a retry prompt.
    pub fn create_error_context_prompt(
        &self,
        error_info: &ErrorInfo,
        feature_description: &str,
        code_snippet: Option<&str>,
    ) -> String {
        let mut prompt = String::new();
        prompt.push_str("ERROR ANALYSIS:\n");
        prompt.push_str(&format!("Category: {}\n", error_info.category));
        prompt.push_str(&format!(
            "Type: {}\n",
            error_info.error_type.as_deref().unwrap_or("Unknown")
        ));
        prompt.push_str(&format!("Message: {}\n", error_info.message));

        if let Some(file) = &error_info.file_path {
            prompt.push_str(&format!("File: {}\n", file));
        }
        if let Some(line) = error_info.line_number {
            prompt.push_str(&format!("Line: {}\n", line));
        }

        prompt.push_str(&format!("\nRECOVERY HINT: {}\n", error_info.recovery_hint));
        prompt.push_str(&format!("\nFEATURE BEING IMPLEMENTED: {}\n", feature_description));

        if let Some(code) = code_snippet {
            prompt.push_str("\nRELEVANT CODE:\n```python\n");
            prompt.push_str(code);
            if !code.ends_with('\n') {
                prompt.push('\n');
            }
            prompt.push_str("```\n");
        }

        prompt
    }
}

fn categorize(message: &str) -> ErrorCategory {
    CATEGORY_PATTERNS
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|re| re.is_match(message)))
        .map(|(category, _)| *category)
        .unwrap_or(ErrorCategory::Unknown)
}

fn extract_location(message: &str) -> (Option<String>, Option<u32>) {
    [&*TRACEBACK_LOCATION_RE, &*COLON_LOCATION_RE]
        .into_iter()
        .find_map(|re| re.captures(message))
        .map(|caps| (Some(caps[1].to_string()), caps[2].parse().ok()))
        .unwrap_or((None, None))
}

fn resolve_hint(category: ErrorCategory, error_type: Option<&str>, message: &str) -> &'static str {
    let table = hint_table(category);

    if let Some(error_type) = error_type {
        if let Some((_, hint)) = table.iter().find(|(key, _)| *key == error_type) {
            return hint;
        }
    }

    let lowered = message.to_lowercase();
    if let Some((_, hint)) = table
        .iter()
        .filter(|(key, _)| *key != DEFAULT_KEY)
        .find(|(key, _)| lowered.contains(&key.to_lowercase()))
    {
        return hint;
    }

    table
        .iter()
        .find(|(key, _)| *key == DEFAULT_KEY)
        .map(|(_, hint)| *hint)
        .unwrap_or(UNKNOWN_HINTS[0].1)
}

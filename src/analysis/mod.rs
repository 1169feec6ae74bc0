//! Error analysis for failed implementation attempts.

mod error_analyzer;

pub use error_analyzer::{ErrorAnalyzer, ErrorCategory, ErrorInfo};

//! Integration test suite for tddflow.
//!
//! These tests drive the orchestrator end to end with scripted agents
//! and test runners, and exercise the on-disk pipeline store and
//! execution reports.
//!
//! # Test Categories
//!
//! - `workflow_e2e`: Single-requirement RED/YELLOW/GREEN runs
//! - `incremental`: Feature-by-feature runs with retries
//! - `pipeline_state`: Persistent pipeline store
//! - `tracer_report`: Execution reports written to disk
//!
//! # CI Compatibility
//!
//! No model or sandbox is contacted; every collaborator is scripted.

mod fixtures;

mod incremental;
mod pipeline_state;
mod tracer_report;
mod workflow_e2e;

//! Core domain models for incremental feature work.
//!
//! This module contains the feature data model and the dependency
//! parser that decides the order features are implemented in.

pub mod dependency;
pub mod feature;

pub use dependency::{order_by_heuristic, order_features_smart, parse_dependencies, topological_sort};
pub use feature::{Feature, FeatureItem, FeatureSpec};

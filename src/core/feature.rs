//! Feature data model for incremental implementation.
//!
//! A [`Feature`] is what the design parser recovers from a `FEATURE[n]`
//! block; a [`FeatureSpec`] is what callers hand to the orchestrator.
//! Both can be ordered through the [`FeatureItem`] view.

use serde::{Deserialize, Serialize};

/// A feature parsed from a design document.
///
/// Identity is `id` (`feature_<n>`); `dependencies` hold other feature ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub id: String,
    pub title: String,
    pub description: String,
    pub dependencies: Vec<String>,
}

impl Feature {
    pub fn new(id: &str, title: &str, description: &str, dependencies: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
        }
    }

    /// Canonical id for the `FEATURE[n]` marker.
    pub fn id_for(number: &str) -> String {
        format!("feature_{}", number)
    }
}

/// A unit of incremental work supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl FeatureSpec {
    pub fn new(id: impl Into<String>, title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
        }
    }

    /// Build specs from bare titles, numbering them `feature_1..`.
    pub fn from_titles<S: AsRef<str>>(titles: &[S]) -> Vec<Self> {
        titles
            .iter()
            .enumerate()
            .map(|(i, t)| Self::new(Feature::id_for(&(i + 1).to_string()), t.as_ref(), ""))
            .collect()
    }
}

impl From<&Feature> for FeatureSpec {
    fn from(feature: &Feature) -> Self {
        Self::new(feature.id.clone(), feature.title.clone(), feature.description.clone())
    }
}

/// Title/description view used by the ordering heuristics.
pub trait FeatureItem {
    fn title(&self) -> &str;
    fn description(&self) -> &str;
}

impl FeatureItem for Feature {
    fn title(&self) -> &str {
        &self.title
    }

    fn description(&self) -> &str {
        &self.description
    }
}

impl FeatureItem for FeatureSpec {
    fn title(&self) -> &str {
        &self.title
    }

    fn description(&self) -> &str {
        &self.description
    }
}

//! Feature dependency parsing and execution ordering.
//!
//! Design documents may describe features as blocks of the form:
//!
//! ```text
//! FEATURE[2]: Persist tasks
//! Description: Save tasks to disk
//! Files: storage.py
//! Dependencies: FEATURE[1]
//! Validation: tests pass
//! ```
//!
//! When such blocks exist they are ordered with Kahn's algorithm; when
//! they don't, features are bucketed by keyword so that structural work
//! comes before behaviour, and behaviour before docs.

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use regex::Regex;
use std::collections::{HashMap, VecDeque};
use std::sync::LazyLock;

use super::feature::{Feature, FeatureItem};
use crate::{zlog_debug, zlog_warn};

static FEATURE_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?s)FEATURE\[(\d+)\]:\s*(.+?)\n.*?Description:\s*(.+?)\n.*?Dependencies:\s*(.+?)(?:\n|$)",
    )
    .expect("static feature block pattern")
});

static FEATURE_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"FEATURE\[(\d+)\]").expect("static feature reference pattern"));

/// Keyword buckets for heuristic ordering, highest priority first.
const HEURISTIC_PHASES: [&[&str]; 5] = [
    &["class", "structure", "schema", "model", "interface"],
    &["add", "get", "set", "init", "constructor", "basic"],
    &["complex", "advanced", "process", "calculate"],
    &["error", "exception", "validate", "check"],
    &["test", "document", "example"],
];

/// Parse `FEATURE[n]` blocks out of a design document.
///
/// Text without any block yields an empty list.
pub fn parse_dependencies(design_text: &str) -> Vec<Feature> {
    let features: Vec<Feature> = FEATURE_BLOCK_RE
        .captures_iter(design_text)
        .map(|caps| {
            let deps_field = caps[4].trim();
            let dependencies = if deps_field.eq_ignore_ascii_case("none") {
                Vec::new()
            } else {
                FEATURE_REF_RE
                    .captures_iter(deps_field)
                    .map(|dep| Feature::id_for(&dep[1]))
                    .collect()
            };

            Feature {
                id: Feature::id_for(&caps[1]),
                title: caps[2].trim().to_string(),
                description: caps[3].trim().to_string(),
                dependencies,
            }
        })
        .collect();

    zlog_debug!("parse_dependencies: {} feature block(s) found", features.len());
    features
}

/// Order features so each one follows everything it depends on.
///
/// If the ordering comes up short (a cycle, or a dependency on an id that
/// is not in the set) the input order is returned untouched.
pub fn topological_sort(features: &[Feature]) -> Vec<Feature> {
    let mut in_degree: HashMap<&str, usize> = features
        .iter()
        .map(|f| (f.id.as_str(), f.dependencies.len()))
        .collect();

    let mut queue: VecDeque<&Feature> = features
        .iter()
        .filter(|f| f.dependencies.is_empty())
        .collect();
    let mut ordered: Vec<Feature> = Vec::with_capacity(features.len());

    while let Some(current) = queue.pop_front() {
        ordered.push(current.clone());

        for other in features {
            if other.id == current.id || !other.dependencies.contains(&current.id) {
                continue;
            }
            if let Some(degree) = in_degree.get_mut(other.id.as_str()) {
                *degree = degree.saturating_sub(1);
                if *degree == 0 {
                    queue.push_back(other);
                }
            }
        }
    }

    if ordered.len() < features.len() {
        match find_cycle_member(features) {
            Some(id) => zlog_warn!(
                "topological_sort: dependency cycle through {}, keeping original order",
                id
            ),
            None => zlog_warn!(
                "topological_sort: unresolvable dependencies ({} of {} ordered), keeping original order",
                ordered.len(),
                features.len()
            ),
        }
        return features.to_vec();
    }

    ordered
}

/// Locate one feature on a dependency cycle, for diagnostics.
fn find_cycle_member(features: &[Feature]) -> Option<String> {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let index: HashMap<&str, _> = features
        .iter()
        .map(|f| (f.id.as_str(), graph.add_node(f.id.as_str())))
        .collect();

    for feature in features {
        for dep in &feature.dependencies {
            if let (Some(&from), Some(&to)) = (index.get(dep.as_str()), index.get(feature.id.as_str())) {
                graph.add_edge(from, to, ());
            }
        }
    }

    toposort(&graph, None)
        .err()
        .and_then(|cycle| graph.node_weight(cycle.node_id()).map(|id| id.to_string()))
}

/// Order caller-supplied features using the design text when possible.
///
/// Explicit `FEATURE[n]` blocks win: they are sorted and matched back to
/// `features` by case-insensitive title containment; unmatched items are
/// appended in their original order. Without blocks the keyword
/// heuristic is used.
pub fn order_features_smart<T: FeatureItem + Clone>(features: &[T], design_text: &str) -> Vec<T> {
    let parsed = parse_dependencies(design_text);
    if parsed.is_empty() {
        zlog_debug!("order_features_smart: no explicit dependencies, using keyword heuristic");
        return order_by_heuristic(features);
    }

    let sorted = topological_sort(&parsed);
    let mut used = vec![false; features.len()];
    let mut ordered = Vec::with_capacity(features.len());

    for feature in &sorted {
        let needle = feature.title.to_lowercase();
        let matched = features.iter().enumerate().position(|(i, item)| {
            !used[i]
                && (item.title().to_lowercase().contains(&needle)
                    || item.description().to_lowercase().contains(&needle))
        });
        if let Some(i) = matched {
            used[i] = true;
            ordered.push(features[i].clone());
        }
    }

    ordered.extend(
        features
            .iter()
            .zip(&used)
            .filter(|(_, used)| !**used)
            .map(|(item, _)| item.clone()),
    );

    zlog_debug!(
        "order_features_smart: {} parsed feature(s) applied to {} item(s)",
        sorted.len(),
        ordered.len()
    );
    ordered
}

/// Stable keyword bucketing; each item lands in the first bucket it matches.
pub fn order_by_heuristic<T: FeatureItem + Clone>(features: &[T]) -> Vec<T> {
    let buckets: Vec<usize> = features.iter().map(heuristic_bucket).collect();

    (0..=HEURISTIC_PHASES.len())
        .flat_map(|bucket| {
            features
                .iter()
                .zip(&buckets)
                .filter(move |(_, b)| **b == bucket)
                .map(|(item, _)| item.clone())
        })
        .collect()
}

/// Index of the first matching phase, or `HEURISTIC_PHASES.len()` for none.
fn heuristic_bucket<T: FeatureItem>(item: &T) -> usize {
    let text = format!("{} {}", item.title(), item.description()).to_lowercase();
    HEURISTIC_PHASES
        .iter()
        .position(|keywords| keywords.iter().any(|kw| text.contains(kw)))
        .unwrap_or(HEURISTIC_PHASES.len())
}

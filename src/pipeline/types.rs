//! Job pipeline state types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// On-disk format version of the pipeline state file.
pub const PIPELINE_STATE_VERSION: u32 = 1;

/// Unique identifier for a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineId(pub Uuid);

impl PipelineId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for PipelineId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PipelineId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for PipelineId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Stages a job moves through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Planning,
    Design,
    TestGeneration,
    Implementation,
    Testing,
    Review,
    Complete,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 7] = [
        PipelineStage::Planning,
        PipelineStage::Design,
        PipelineStage::TestGeneration,
        PipelineStage::Implementation,
        PipelineStage::Testing,
        PipelineStage::Review,
        PipelineStage::Complete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Planning => "planning",
            PipelineStage::Design => "design",
            PipelineStage::TestGeneration => "test_generation",
            PipelineStage::Implementation => "implementation",
            PipelineStage::Testing => "testing",
            PipelineStage::Review => "review",
            PipelineStage::Complete => "complete",
        }
    }

    /// The following stage, or `None` at `Complete`.
    pub fn next(&self) -> Option<PipelineStage> {
        let idx = Self::ALL.iter().position(|s| s == self)?;
        Self::ALL.get(idx + 1).copied()
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PipelineStage {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| format!("unknown pipeline stage: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    #[default]
    Active,
    AwaitingFeedback,
    Completed,
    Failed,
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineStatus::Active => write!(f, "active"),
            PipelineStatus::AwaitingFeedback => write!(f, "awaiting_feedback"),
            PipelineStatus::Completed => write!(f, "completed"),
            PipelineStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Output produced at a stage (design doc, test file, report path...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub stage: PipelineStage,
    pub name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanFeedback {
    pub stage: PipelineStage,
    pub feedback: String,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageChange {
    pub from: PipelineStage,
    pub to: PipelineStage,
    pub at: DateTime<Utc>,
}

/// Persisted state of one job pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineState {
    pub id: PipelineId,
    pub feature_name: String,
    pub repo_name: String,
    pub stage: PipelineStage,
    pub status: PipelineStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    #[serde(default)]
    pub feedback: Vec<HumanFeedback>,
    #[serde(default)]
    pub history: Vec<StageChange>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl PipelineState {
    pub fn new(feature_name: impl Into<String>, repo_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: PipelineId::new(),
            feature_name: feature_name.into(),
            repo_name: repo_name.into(),
            stage: PipelineStage::Planning,
            status: PipelineStatus::Active,
            created_at: now,
            updated_at: now,
            artifacts: Vec::new(),
            feedback: Vec::new(),
            history: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Artifacts recorded at `stage`.
    pub fn artifacts_for(&self, stage: PipelineStage) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter().filter(move |a| a.stage == stage)
    }
}

/// The whole state file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineFile {
    pub version: u32,
    #[serde(default)]
    pub pipelines: BTreeMap<PipelineId, PipelineState>,
}

impl Default for PipelineFile {
    fn default() -> Self {
        Self {
            version: PIPELINE_STATE_VERSION,
            pipelines: BTreeMap::new(),
        }
    }
}

//! StateManager - shared, file-backed store of job pipelines.

use chrono::Utc;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::types::{
    Artifact, HumanFeedback, PipelineFile, PipelineId, PipelineStage, PipelineState, PipelineStatus, StageChange,
};
use crate::config::Config;
use crate::util::{blocking, write_atomic};
use crate::{zlog_debug, zlog_warn, Error, Result};

/// Pipeline store shared by concurrently running jobs.
///
/// Every mutation takes the single lock, changes the in-memory map and
/// rewrites the whole file before releasing, so writes are serialized and
/// on disk by the time the call returns.
#[derive(Debug)]
pub struct StateManager {
    path: PathBuf,
    state: Mutex<PipelineFile>,
}

impl StateManager {
    /// Open the store at `path`. A missing file starts empty; so does a
    /// corrupted one, with a warning.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let load_path = path.clone();
        let file = blocking(move || load_state(&load_path)).await?;
        Ok(Self {
            path,
            state: Mutex::new(file),
        })
    }

    /// Open the store at `~/.tddflow/pipelines.json`.
    pub async fn open_default() -> Result<Self> {
        Self::open(Config::pipeline_state_path()?).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn create_pipeline(&self, feature_name: &str, repo_name: &str) -> Result<PipelineState> {
        let mut guard = self.state.lock().await;
        let pipeline = PipelineState::new(feature_name, repo_name);
        zlog_debug!("Creating pipeline {}", pipeline.id.short());
        guard.pipelines.insert(pipeline.id, pipeline.clone());
        self.persist(&guard).await?;
        Ok(pipeline)
    }

    pub async fn get_pipeline(&self, id: PipelineId) -> Option<PipelineState> {
        self.state.lock().await.pipelines.get(&id).cloned()
    }

    /// All pipelines, oldest first.
    pub async fn list_pipelines(&self) -> Vec<PipelineState> {
        let guard = self.state.lock().await;
        let mut pipelines: Vec<PipelineState> = guard.pipelines.values().cloned().collect();
        pipelines.sort_by_key(|p| p.created_at);
        pipelines
    }

    /// Move to `stage`. Reaching `Complete` marks the pipeline completed;
    /// any other stage makes it active again.
    pub async fn update_pipeline_stage(&self, id: PipelineId, stage: PipelineStage) -> Result<PipelineState> {
        self.mutate(id, |pipeline| {
            if pipeline.stage != stage {
                pipeline.history.push(StageChange {
                    from: pipeline.stage,
                    to: stage,
                    at: Utc::now(),
                });
            }
            pipeline.stage = stage;
            pipeline.status = if stage == PipelineStage::Complete {
                PipelineStatus::Completed
            } else {
                PipelineStatus::Active
            };
        })
        .await
    }

    /// Attach an artifact to the pipeline's current stage.
    pub async fn add_artifact(&self, id: PipelineId, name: &str, content: &str) -> Result<PipelineState> {
        let name = name.to_string();
        let content = content.to_string();
        self.mutate(id, move |pipeline| {
            pipeline.artifacts.push(Artifact {
                stage: pipeline.stage,
                name,
                content,
                created_at: Utc::now(),
            });
        })
        .await
    }

    /// Record reviewer feedback. Rejection pauses the pipeline for more
    /// feedback; approval resumes a paused one.
    pub async fn add_human_feedback(&self, id: PipelineId, feedback: &str, approved: bool) -> Result<PipelineState> {
        let feedback = feedback.to_string();
        self.mutate(id, move |pipeline| {
            pipeline.feedback.push(HumanFeedback {
                stage: pipeline.stage,
                feedback,
                approved,
                created_at: Utc::now(),
            });
            if !approved {
                pipeline.status = PipelineStatus::AwaitingFeedback;
            } else if pipeline.status == PipelineStatus::AwaitingFeedback {
                pipeline.status = PipelineStatus::Active;
            }
        })
        .await
    }

    pub async fn set_status(&self, id: PipelineId, status: PipelineStatus) -> Result<PipelineState> {
        self.mutate(id, move |pipeline| pipeline.status = status).await
    }

    async fn mutate<F>(&self, id: PipelineId, f: F) -> Result<PipelineState>
    where
        F: FnOnce(&mut PipelineState) + Send,
    {
        let mut guard = self.state.lock().await;
        let pipeline = guard
            .pipelines
            .get_mut(&id)
            .ok_or_else(|| Error::PipelineNotFound(id.to_string()))?;
        f(pipeline);
        pipeline.touch();
        let updated = pipeline.clone();
        self.persist(&guard).await?;
        Ok(updated)
    }

    /// Rewrite the whole file. Caller holds the lock.
    async fn persist(&self, file: &PipelineFile) -> Result<()> {
        let contents = serde_json::to_string_pretty(file)?;
        let path = self.path.clone();
        blocking(move || write_atomic(&path, &contents)).await?;
        zlog_debug!("Pipeline state saved: {} pipeline(s)", file.pipelines.len());
        Ok(())
    }
}

fn load_state(path: &Path) -> Result<PipelineFile> {
    zlog_debug!("StateManager::load path={}", path.display());
    if !path.exists() {
        zlog_debug!("Pipeline state file not found, starting empty");
        return Ok(PipelineFile::default());
    }

    let contents = fs::read_to_string(path)?;
    match serde_json::from_str::<PipelineFile>(&contents) {
        Ok(file) => {
            zlog_debug!("Pipeline state loaded: {} pipeline(s)", file.pipelines.len());
            Ok(file)
        }
        Err(e) => {
            zlog_warn!(
                "Pipeline state at {} is corrupted ({}), starting empty",
                path.display(),
                e
            );
            Ok(PipelineFile::default())
        }
    }
}

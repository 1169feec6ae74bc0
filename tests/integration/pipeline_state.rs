//! Persistent pipeline store shared by concurrent jobs.

use std::sync::Arc;

use tempfile::TempDir;

use tddflow::pipeline::{PipelineFile, PipelineStage, PipelineStatus, StateManager};

#[tokio::test]
async fn test_pipeline_walks_every_stage() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pipelines.json");
    let manager = StateManager::open(&path).await.unwrap();
    let pipeline = manager.create_pipeline("todo-export", "todo-app").await.unwrap();

    let mut stage = pipeline.stage;
    while let Some(next) = stage.next() {
        let updated = manager.update_pipeline_stage(pipeline.id, next).await.unwrap();
        manager
            .add_artifact(pipeline.id, &format!("{}.md", next), "output")
            .await
            .unwrap();
        stage = updated.stage;
    }

    let done = manager.get_pipeline(pipeline.id).await.unwrap();
    assert_eq!(done.stage, PipelineStage::Complete);
    assert_eq!(done.status, PipelineStatus::Completed);
    assert_eq!(done.history.len(), 6);
    assert_eq!(done.artifacts.len(), 6);
    assert_eq!(done.artifacts_for(PipelineStage::Review).count(), 1);

    let on_disk: PipelineFile = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk.pipelines[&pipeline.id], done);
}

#[tokio::test]
async fn test_review_feedback_round_trip() {
    let dir = TempDir::new().unwrap();
    let manager = StateManager::open(dir.path().join("pipelines.json")).await.unwrap();
    let pipeline = manager.create_pipeline("todo-export", "todo-app").await.unwrap();

    manager
        .update_pipeline_stage(pipeline.id, PipelineStage::Review)
        .await
        .unwrap();
    let paused = manager
        .add_human_feedback(pipeline.id, "Export is missing", false)
        .await
        .unwrap();
    assert_eq!(paused.status, PipelineStatus::AwaitingFeedback);
    assert_eq!(paused.feedback[0].stage, PipelineStage::Review);

    let resumed = manager
        .update_pipeline_stage(pipeline.id, PipelineStage::Implementation)
        .await
        .unwrap();
    assert_eq!(resumed.status, PipelineStatus::Active);

    let failed = manager.set_status(pipeline.id, PipelineStatus::Failed).await.unwrap();
    assert_eq!(failed.status, PipelineStatus::Failed);
    assert!(failed.updated_at >= pipeline.updated_at);
}

#[tokio::test]
async fn test_concurrent_jobs_do_not_lose_writes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pipelines.json");
    let manager = Arc::new(StateManager::open(&path).await.unwrap());

    let mut handles = Vec::new();
    for job in 0..8 {
        let manager = Arc::clone(&manager);
        handles.push(tokio::spawn(async move {
            let pipeline = manager.create_pipeline(&format!("feature-{}", job), "todo-app").await?;
            manager
                .update_pipeline_stage(pipeline.id, PipelineStage::Design)
                .await?;
            manager.add_artifact(pipeline.id, "design.md", "# Design").await?;
            Ok::<_, tddflow::Error>(pipeline.id)
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap());
    }

    let reopened = StateManager::open(&path).await.unwrap();
    let pipelines = reopened.list_pipelines().await;
    assert_eq!(pipelines.len(), 8);
    for id in ids {
        let p = reopened.get_pipeline(id).await.unwrap();
        assert_eq!(p.stage, PipelineStage::Design);
        assert_eq!(p.artifacts.len(), 1);
    }
    assert!(!dir.path().join("pipelines.json.tmp").exists());
}

#[tokio::test]
async fn test_corrupted_store_recovers_empty() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pipelines.json");
    std::fs::write(&path, "{\"version\": 1, \"pipelines\": [").unwrap();

    let manager = StateManager::open(&path).await.unwrap();
    assert!(manager.list_pipelines().await.is_empty());
}

//! Per-journal workflow tasks and the top-level orchestrator process loop.
//! Each in-flight workflow runs as its own `tokio::task::spawn`, racing a
//! step loop against a shared [`CancellationToken`] so shutdown waits for
//! the current step to land rather than aborting it mid-write.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use minerva_curation::CurationStore;
use minerva_domain::{JournalEntry, PipelineState, Result, Stage};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::engine::{PipelineEngine, StepOutcome};

/// Drives one workflow from its current [`PipelineState`] to a terminal
/// stage, persisting a checkpoint after every [`PipelineEngine::step`]
/// call. A `WAIT_*_CURATION` state polls `heartbeat_interval` apart (the
/// spec's 2-minute curation heartbeat); a recoverable error backs off
/// `poll_interval` before the next retry. Every other state calls `step`
/// again immediately on success.
pub struct WorkflowScheduler {
    engine: Arc<PipelineEngine>,
    poll_interval: Duration,
    heartbeat_interval: Duration,
}

impl WorkflowScheduler {
    pub fn new(engine: Arc<PipelineEngine>, poll_interval: Duration, heartbeat_interval: Duration) -> Self {
        Self { engine, poll_interval, heartbeat_interval }
    }

    pub async fn run_workflow(&self, mut state: PipelineState, cancel: CancellationToken) -> Result<PipelineState> {
        loop {
            if cancel.is_cancelled() {
                info!(workflow_id = %state.workflow_id, "workflow cancelled before reaching DB_WRITE");
                return Ok(state);
            }

            let outcome = tokio::select! {
                _ = cancel.cancelled() => {
                    info!(workflow_id = %state.workflow_id, "cancellation observed mid-step");
                    return Ok(state);
                }
                result = self.engine.step(&mut state) => result?,
            };

            self.engine.curation().save_workflow_state(&state)?;

            match outcome {
                StepOutcome::Advanced => continue,
                StepOutcome::WaitingOnCuration => {
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(state),
                        _ = tokio::time::sleep(self.heartbeat_interval) => continue,
                    }
                }
                StepOutcome::WaitingToRetry => {
                    tokio::select! {
                        _ = cancel.cancelled() => return Ok(state),
                        _ = tokio::time::sleep(self.poll_interval) => continue,
                    }
                }
                StepOutcome::Done => {
                    info!(workflow_id = %state.workflow_id, "workflow completed");
                    return Ok(state);
                }
                StepOutcome::Failed => {
                    warn!(workflow_id = %state.workflow_id, error = ?state.last_error, "workflow failed");
                    return Ok(state);
                }
            }
        }
    }
}

/// Owns one background task per in-flight journal. New submissions spawn a
/// task immediately; process restart re-attaches to every workflow the
/// curation store still lists as active.
pub struct Orchestrator {
    scheduler: Arc<WorkflowScheduler>,
    curation: Arc<CurationStore>,
    cancel: CancellationToken,
    tasks: Mutex<HashMap<Uuid, JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn new(scheduler: Arc<WorkflowScheduler>, curation: Arc<CurationStore>) -> Self {
        Self { scheduler, curation, cancel: CancellationToken::new(), tasks: Mutex::new(HashMap::new()) }
    }

    /// Submit a journal entry: persist it, then checkpoint a fresh
    /// [`PipelineState`] and spawn its workflow task — unless a non-terminal
    /// checkpoint already exists for this journal's workflow id. In that
    /// case submission never resets the checkpoint: if the workflow task
    /// is already running in this process it is a pure no-op, and if it
    /// isn't (e.g. a restart happened without a `resume_all` call reaching
    /// it yet) the existing state is re-attached instead of replaced.
    /// Re-submitting a completed or failed workflow's id starts a fresh run,
    /// same as submitting a brand new journal. Returns the workflow id
    /// (equal to the journal's uuid).
    pub async fn submit(&self, journal: JournalEntry) -> Result<Uuid> {
        self.curation.save_journal(&journal)?;

        if let Some(existing) = self.curation.load_workflow_state(journal.uuid)? {
            if !existing.stage.is_terminal() {
                if self.tasks.lock().await.contains_key(&journal.uuid) {
                    info!(workflow_id = %journal.uuid, stage = ?existing.stage, "submit is a no-op: workflow already running");
                } else {
                    info!(workflow_id = %journal.uuid, stage = ?existing.stage, "submit re-attaches to existing in-flight workflow");
                    self.spawn_workflow(existing).await;
                }
                return Ok(journal.uuid);
            }
        }

        let state = PipelineState::new(journal.uuid);
        self.curation.save_workflow_state(&state)?;
        self.spawn_workflow(state).await;
        Ok(journal.uuid)
    }

    /// Re-attach every non-terminal workflow found in the curation store.
    /// Called once at process start.
    pub async fn resume_all(&self) -> Result<usize> {
        let ids = self.curation.active_workflow_ids()?;
        let mut resumed = 0;
        for workflow_id in ids {
            let Some(state) = self.curation.load_workflow_state(workflow_id)? else { continue };
            if state.stage.is_terminal() {
                continue;
            }
            info!(workflow_id = %workflow_id, stage = ?state.stage, "resuming workflow after restart");
            self.spawn_workflow(state).await;
            resumed += 1;
        }
        Ok(resumed)
    }

    async fn spawn_workflow(&self, state: PipelineState) {
        let workflow_id = state.workflow_id;
        let scheduler = self.scheduler.clone();
        let cancel = self.cancel.child_token();
        let handle = tokio::spawn(async move {
            if let Err(err) = scheduler.run_workflow(state, cancel).await {
                error!(workflow_id = %workflow_id, error = %err, "workflow task exited with an error");
            }
        });
        self.tasks.lock().await.insert(workflow_id, handle);
    }

    pub fn status(&self, workflow_id: Uuid) -> Result<Option<Stage>> {
        Ok(self.curation.load_workflow_state(workflow_id)?.map(|s| s.stage))
    }

    /// Signal every running workflow to stop at its next checkpoint and
    /// wait for the tasks to exit. Workflows already inside `DB_WRITE`
    /// finish that block rather than stopping mid-write — no partial
    /// write is ever left for a curator to find.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let mut tasks = self.tasks.lock().await;
        for (workflow_id, handle) in tasks.drain() {
            if let Err(err) = handle.await {
                error!(workflow_id = %workflow_id, error = %err, "workflow task panicked during shutdown");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use minerva_domain::{Chunk, ConceptRelation, Entity, Mention, Relation};
    use minerva_graph::GraphStore;
    use minerva_llm::{GenerationRequest, LlmGateway, LlmProvider};
    use minerva_vault::VaultIndex;
    use std::path::PathBuf;

    struct EmptyProvider;
    #[async_trait]
    impl LlmProvider for EmptyProvider {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
            Ok("{\"candidates\": []}".to_string())
        }
        async fn embed(&self, _model: &str, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![])
        }
    }

    struct NoopGraphStore;
    #[async_trait]
    impl GraphStore for NoopGraphStore {
        async fn upsert_day(&self, _date: NaiveDate) -> Result<()> {
            Ok(())
        }
        async fn link_journal_to_day(&self, _journal_uuid: Uuid, _date: NaiveDate) -> Result<()> {
            Ok(())
        }
        async fn upsert_entity(&self, _entity: &Entity) -> Result<()> {
            Ok(())
        }
        async fn create_full_relation(&self, _relation: &Relation) -> Result<()> {
            Ok(())
        }
        async fn update_relation(&self, _relation: &Relation) -> Result<()> {
            Ok(())
        }
        async fn delete_relation(&self, _edge_uuid: Uuid) -> Result<()> {
            Ok(())
        }
        async fn create_concept_relation(&self, _relation: &ConceptRelation) -> Result<()> {
            Ok(())
        }
        async fn create_mentions_batch(&self, mentions: &[Mention]) -> Result<usize> {
            Ok(mentions.len())
        }
        async fn create_chunks_batch(&self, _journal_uuid: Uuid, _nodes: &HashMap<Uuid, Chunk>, _roots: &[Uuid]) -> Result<()> {
            Ok(())
        }
    }

    fn test_engine(curation: Arc<CurationStore>, vault_root: PathBuf) -> Arc<PipelineEngine> {
        let llm = Arc::new(LlmGateway::new(Arc::new(EmptyProvider)));
        let vault_index = Arc::new(VaultIndex::build(&vault_root).unwrap());
        Arc::new(PipelineEngine::new(curation, Arc::new(NoopGraphStore), llm, vault_root, vault_index, "test-model", 7))
    }

    fn curation_store() -> Arc<CurationStore> {
        let dir = tempfile::tempdir().unwrap();
        Arc::new(CurationStore::open(dir.path().join("curation.redb")).unwrap())
    }

    #[tokio::test]
    async fn workflow_runs_until_it_blocks_on_entity_curation() {
        let curation = curation_store();
        let vault_dir = tempfile::tempdir().unwrap();
        let engine = test_engine(curation.clone(), vault_dir.path().to_path_buf());
        let scheduler = WorkflowScheduler::new(engine, Duration::from_millis(10), Duration::from_millis(10));

        let journal = JournalEntry::new(NaiveDate::from_ymd_opt(2026, 7, 28).unwrap(), "Dia tranquilo.");
        curation.save_journal(&journal).unwrap();
        let state = PipelineState::new(journal.uuid);

        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        cancel.cancel();
        let final_state = scheduler.run_workflow(state, cancel_clone).await.unwrap();
        assert_eq!(final_state.stage, Stage::Submitted);
    }

    #[tokio::test]
    async fn submit_checkpoints_a_fresh_workflow_and_resume_all_finds_it() {
        let curation = curation_store();
        let vault_dir = tempfile::tempdir().unwrap();
        let engine = test_engine(curation.clone(), vault_dir.path().to_path_buf());
        let scheduler = Arc::new(WorkflowScheduler::new(engine, Duration::from_secs(3600), Duration::from_secs(3600)));
        let orchestrator = Orchestrator::new(scheduler, curation.clone());

        let journal = JournalEntry::new(NaiveDate::from_ymd_opt(2026, 7, 28).unwrap(), "Dia tranquilo.");
        let workflow_id = orchestrator.submit(journal).await.unwrap();
        assert!(curation.load_workflow_state(workflow_id).unwrap().is_some());

        orchestrator.shutdown().await;

        let resumed = orchestrator.resume_all().await.unwrap();
        assert_eq!(resumed, 1);
        orchestrator.shutdown().await;
    }
}

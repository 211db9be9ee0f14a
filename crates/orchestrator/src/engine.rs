//! One workflow's state machine body: what each [`Stage`](minerva_domain::Stage)
//! does on entry, and the top-level `step` dispatcher the scheduler drives.
//! The machine itself (what stage follows what) lives in
//! [`minerva_domain::pipeline_state`]; this module supplies the side
//! effects.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use minerva_curation::CurationStore;
use minerva_domain::chunk::build_chunk_tree;
use minerva_domain::{CurationKind, CurationPhase, CurationStatus, JournalEntry, PipelineError, PipelineState, Result, Stage as WorkflowStage};
use minerva_extraction::{ExtractionContext, Stage as ExtractionStage, ENTITY_PROCESSING_ORDER, RELATION_PROCESSING_ORDER};
use minerva_graph::GraphStore;
use minerva_llm::retry::MAX_RETRIES;
use minerva_vault::writer;
use minerva_vault::{Frontmatter, VaultIndex};
use tracing::{info, instrument, warn};
use walkdir::WalkDir;

use crate::mapping::{concept_relation_from_item, entity_from_item, mentions_for_item, relation_from_item};
use crate::stages::{build_entity_stage, build_relation_stage};

/// What the scheduler should do after one [`PipelineEngine::step`] call.
pub enum StepOutcome {
    /// The state advanced; call `step` again immediately.
    Advanced,
    /// A `WAIT_*_CURATION` state is still waiting on human decisions; poll
    /// again after the heartbeat interval.
    WaitingOnCuration,
    /// A retryable error was recorded; poll again after the backoff
    /// interval.
    WaitingToRetry,
    /// `Stage::Completed` was reached.
    Done,
    /// `Stage::Failed` was reached; `reason` is `state.last_error`.
    Failed,
}

pub struct PipelineEngine {
    curation: Arc<CurationStore>,
    graph: Arc<dyn GraphStore>,
    llm: Arc<minerva_llm::LlmGateway>,
    vault_root: PathBuf,
    vault_index: Arc<VaultIndex>,
    model: String,
    /// Hard ceiling on how long a workflow may sit in a `WAIT_*_CURATION`
    /// stage before it is failed terminally with `DeadlineExceeded`.
    curation_deadline: ChronoDuration,
}

impl PipelineEngine {
    pub fn new(
        curation: Arc<CurationStore>,
        graph: Arc<dyn GraphStore>,
        llm: Arc<minerva_llm::LlmGateway>,
        vault_root: PathBuf,
        vault_index: Arc<VaultIndex>,
        model: impl Into<String>,
        curation_deadline_days: u64,
    ) -> Self {
        Self {
            curation,
            graph,
            llm,
            vault_root,
            vault_index,
            model: model.into(),
            curation_deadline: ChronoDuration::days(curation_deadline_days as i64),
        }
    }

    pub fn curation(&self) -> &CurationStore {
        &self.curation
    }

    /// Advance `state` by exactly one stage transition, or record a retry
    /// and leave `state` where it is. Callers persist `state` via
    /// [`CurationStore::save_workflow_state`] after every call regardless
    /// of outcome, so a crash mid-`step` resumes from the last checkpoint.
    #[instrument(skip(self, state), fields(workflow_id = %state.workflow_id, stage = ?state.stage))]
    pub async fn step(&self, state: &mut PipelineState) -> Result<StepOutcome> {
        if state.stage.is_terminal() {
            return Ok(if state.stage == WorkflowStage::Completed { StepOutcome::Done } else { StepOutcome::Failed });
        }

        if state.stage.is_wait_state() {
            let phase = match state.stage {
                WorkflowStage::WaitEntityCuration => CurationPhase::Entity,
                WorkflowStage::WaitRelationCuration => CurationPhase::Relation,
                _ => unreachable!(),
            };
            let pending = self.curation.pending_count(state.journal_uuid, phase)?;
            match phase {
                CurationPhase::Entity => state.entity_curation_pending = pending,
                CurationPhase::Relation => state.relation_curation_pending = pending,
            }
            if state.curation_phase_complete() {
                state.advance();
                return Ok(StepOutcome::Advanced);
            }

            let waiting_since = Utc::now() - state.updated_at;
            if waiting_since > self.curation_deadline {
                let reason = format!("{phase:?} curation deadline of {} day(s) exceeded", self.curation_deadline.num_days());
                warn!(workflow_id = %state.workflow_id, %reason, "wait state deadline exceeded");
                state.fail(PipelineError::deadline_exceeded(reason).to_string());
                return Ok(StepOutcome::Failed);
            }
            return Ok(StepOutcome::WaitingOnCuration);
        }

        let attempt = self.run_block(state).await;
        match attempt {
            Ok(()) => {
                state.advance();
                Ok(StepOutcome::Advanced)
            }
            Err(err) if err.is_retryable() && state.retry_count < MAX_RETRIES => {
                warn!(error = %err, retry_count = state.retry_count, "block failed, will retry");
                state.record_retry(err.to_string());
                Ok(StepOutcome::WaitingToRetry)
            }
            Err(err) => {
                state.fail(err.to_string());
                Ok(StepOutcome::Failed)
            }
        }
    }

    async fn run_block(&self, state: &mut PipelineState) -> Result<()> {
        match state.stage {
            WorkflowStage::Submitted => self.enter_submitted(state).await,
            WorkflowStage::EntityProcessing => self.enter_entity_processing(state).await,
            WorkflowStage::SubmitEntityCuration => self.enter_submit_curation(state, CurationPhase::Entity).await,
            WorkflowStage::RelationProcessing => self.enter_relation_processing(state).await,
            WorkflowStage::SubmitRelationCuration => self.enter_submit_curation(state, CurationPhase::Relation).await,
            WorkflowStage::DbWrite => self.enter_db_write(state).await,
            WorkflowStage::WaitEntityCuration | WorkflowStage::WaitRelationCuration | WorkflowStage::Completed | WorkflowStage::Failed => {
                Ok(())
            }
        }
    }

    async fn enter_submitted(&self, state: &PipelineState) -> Result<()> {
        let journal = self
            .curation
            .load_journal(state.journal_uuid)?
            .ok_or_else(|| PipelineError::consistency(format!("journal {} missing at SUBMITTED", state.journal_uuid)))?;

        let (nodes, roots) = build_chunk_tree(journal.uuid, &journal.narration);
        self.graph.create_chunks_batch(journal.uuid, &nodes, &roots).await?;
        self.graph.upsert_day(journal.date).await?;
        self.graph.link_journal_to_day(journal.uuid, journal.date).await?;
        Ok(())
    }

    #[instrument(skip(self, state))]
    async fn enter_entity_processing(&self, state: &mut PipelineState) -> Result<()> {
        let journal = self
            .curation
            .load_journal(state.journal_uuid)?
            .ok_or_else(|| PipelineError::consistency(format!("journal {} missing", state.journal_uuid)))?;
        let known_concepts = self.known_concepts()?;

        let mut prior_entities = Vec::new();
        for item in self.curation.items_for_phase(journal.uuid, CurationPhase::Entity)? {
            if let Some(entity) = entity_from_item(&item, journal.date) {
                prior_entities.push(entity);
            }
        }

        for &stage_id in ENTITY_PROCESSING_ORDER {
            if state.is_stage_complete(stage_id.tag()) {
                continue;
            }
            let stage = build_entity_stage(stage_id, self.llm.clone(), &self.model);
            let ctx = ExtractionContext {
                journal: &journal,
                narration: &journal.narration,
                prior_entities: &prior_entities,
                known_concepts: &known_concepts,
            };
            let items = stage.run(&ctx).await?;
            for item in &items {
                self.curation.enqueue(item)?;
                if let Some(entity) = entity_from_item(item, journal.date) {
                    prior_entities.push(entity);
                }
            }
            state.mark_stage_complete(stage_id.tag());
            self.curation.save_workflow_state(state)?;
            info!(stage = stage_id.tag(), emitted = items.len(), "entity stage complete");
        }

        state.entity_curation_items = self.curation.items_for_phase(journal.uuid, CurationPhase::Entity)?.len();
        state.entity_curation_pending = self.curation.pending_count(journal.uuid, CurationPhase::Entity)?;
        Ok(())
    }

    #[instrument(skip(self, state))]
    async fn enter_relation_processing(&self, state: &mut PipelineState) -> Result<()> {
        let journal = self
            .curation
            .load_journal(state.journal_uuid)?
            .ok_or_else(|| PipelineError::consistency(format!("journal {} missing", state.journal_uuid)))?;

        // Only curated (approved/edited) entities are visible here — a
        // rejected entity must not be referenceable by a relation.
        let prior_entities: Vec<_> = self
            .curation
            .items_for_phase(journal.uuid, CurationPhase::Entity)?
            .iter()
            .filter(|item| matches!(item.status, CurationStatus::Approved | CurationStatus::Edited))
            .filter_map(|item| entity_from_item(item, journal.date))
            .collect();

        for &stage_id in RELATION_PROCESSING_ORDER {
            if state.is_stage_complete(stage_id.tag()) {
                continue;
            }
            let stage = build_relation_stage(stage_id, self.llm.clone(), &self.model);
            let ctx = ExtractionContext { journal: &journal, narration: &journal.narration, prior_entities: &prior_entities, known_concepts: &[] };
            let items = stage.run(&ctx).await?;
            for item in &items {
                self.curation.enqueue(item)?;
            }
            state.mark_stage_complete(stage_id.tag());
            self.curation.save_workflow_state(state)?;
            info!(stage = stage_id.tag(), emitted = items.len(), "relation stage complete");
        }

        state.relation_curation_items = self.curation.items_for_phase(journal.uuid, CurationPhase::Relation)?.len();
        state.relation_curation_pending = self.curation.pending_count(journal.uuid, CurationPhase::Relation)?;
        Ok(())
    }

    /// `SUBMIT_*_CURATION` has nothing left to do: extraction stages
    /// already enqueue directly into the curation store as they run. This
    /// is a pass-through state kept only so the workflow's transition log
    /// shows a distinct, named step for "curation queue is now populated".
    async fn enter_submit_curation(&self, _state: &PipelineState, _phase: CurationPhase) -> Result<()> {
        Ok(())
    }

    #[instrument(skip(self, state))]
    async fn enter_db_write(&self, state: &PipelineState) -> Result<()> {
        let journal = self
            .curation
            .load_journal(state.journal_uuid)?
            .ok_or_else(|| PipelineError::consistency(format!("journal {} missing", state.journal_uuid)))?;
        let (chunk_nodes, _roots) = build_chunk_tree(journal.uuid, &journal.narration);

        let mut mentions = Vec::new();

        // Each write below is its own awaited call rather than one graph
        // transaction: every adapter write is MERGE-based and idempotent
        // by UUID, so a retry of this whole block after partial failure
        // never double-creates a node or edge.
        let entity_items = self.curation.approved(journal.uuid, CurationPhase::Entity)?;
        for item in &entity_items {
            let Some(entity) = entity_from_item(item, journal.date) else { continue };
            self.graph.upsert_entity(&entity).await?;
            self.write_vault_note(&entity)?;
            mentions.extend(mentions_for_item(item, &chunk_nodes));
        }

        let relation_items = self.curation.approved(journal.uuid, CurationPhase::Relation)?;
        for item in &relation_items {
            match item.kind {
                CurationKind::Relation => {
                    if let Some(relation) = relation_from_item(item) {
                        self.graph.create_full_relation(&relation).await?;
                        mentions.extend(mentions_for_item(item, &chunk_nodes));
                    }
                }
                CurationKind::ConceptRelation => {
                    if let Some(relation) = concept_relation_from_item(item) {
                        self.graph.create_concept_relation(&relation).await?;
                    }
                }
                CurationKind::FeelingEmotion | CurationKind::FeelingConcept => {
                    if let Some(entity) = entity_from_item(item, journal.date) {
                        self.graph.upsert_entity(&entity).await?;
                    }
                }
                _ => {}
            }
        }

        self.graph.create_mentions_batch(&mentions).await?;

        self.curation.mark_phase_complete(journal.uuid, CurationPhase::Entity)?;
        self.curation.mark_phase_complete(journal.uuid, CurationPhase::Relation)?;
        Ok(())
    }

    /// Names of `Concept` entities already in the vault, read from
    /// existing note frontmatter rather than the graph (the graph store
    /// exposes no read surface — every query it needs to answer is a
    /// write). Used to steer concept extraction away from minting a
    /// duplicate under a slightly different name.
    fn known_concepts(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in WalkDir::new(&self.vault_root).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("md") {
                continue;
            }
            if let Some((frontmatter, _body)) = writer::read(path)? {
                if frontmatter.entity_type == "Concept" {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        names.push(stem.to_string());
                    }
                }
            }
        }
        Ok(names)
    }

    fn write_vault_note(&self, entity: &minerva_domain::Entity) -> Result<()> {
        let path = self.vault_index.path_for(&entity.common.name);
        let frontmatter = Frontmatter {
            entity_id: entity.uuid(),
            entity_type: entity.type_name().to_string(),
            short_summary: entity.common.short_summary.clone(),
            summary: entity.common.long_summary.clone(),
            aliases: Vec::new(),
            concept_relations: Vec::new(),
        };
        writer::write(&path, &frontmatter, &entity.common.long_summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use minerva_domain::{Chunk, ConceptRelation, Entity, Mention, Relation};
    use minerva_llm::{GenerationRequest, LlmGateway, LlmProvider};
    use std::sync::Mutex;
    use uuid::Uuid;

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

    #[derive(Default)]
    struct RecordingGraphStore {
        entities: Mutex<Vec<Entity>>,
        mentions: Mutex<Vec<Mention>>,
    }

    #[async_trait]
    impl GraphStore for RecordingGraphStore {
        async fn upsert_day(&self, _date: NaiveDate) -> Result<()> {
            Ok(())
        }
        async fn link_journal_to_day(&self, _journal_uuid: Uuid, _date: NaiveDate) -> Result<()> {
            Ok(())
        }
        async fn upsert_entity(&self, entity: &Entity) -> Result<()> {
            self.entities.lock().unwrap().push(entity.clone());
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
            self.mentions.lock().unwrap().extend(mentions.iter().cloned());
            Ok(mentions.len())
        }
        async fn create_chunks_batch(&self, _journal_uuid: Uuid, _nodes: &HashMap<Uuid, Chunk>, _roots: &[Uuid]) -> Result<()> {
            Ok(())
        }
    }

    fn engine(graph: Arc<dyn GraphStore>, curation: Arc<CurationStore>, vault_root: PathBuf) -> PipelineEngine {
        let llm = Arc::new(LlmGateway::new(Arc::new(EmptyProvider)));
        let vault_index = Arc::new(VaultIndex::build(&vault_root).unwrap());
        PipelineEngine::new(curation, graph, llm, vault_root, vault_index, "test-model", 7)
    }

    fn curation_store() -> Arc<CurationStore> {
        let dir = tempfile::tempdir().unwrap();
        Arc::new(CurationStore::open(dir.path().join("curation.redb")).unwrap())
    }

    #[tokio::test]
    async fn submitted_persists_chunks_and_day_link() {
        let curation = curation_store();
        let journal = JournalEntry::new(NaiveDate::from_ymd_opt(2026, 7, 28).unwrap(), "Hoy trabaje en Minerva.");
        curation.save_journal(&journal).unwrap();
        let mut state = PipelineState::new(journal.uuid);

        let vault_dir = tempfile::tempdir().unwrap();
        let graph = Arc::new(RecordingGraphStore::default());
        let engine = engine(graph, curation.clone(), vault_dir.path().to_path_buf());

        let outcome = engine.step(&mut state).await.unwrap();
        assert!(matches!(outcome, StepOutcome::Advanced));
        assert_eq!(state.stage, minerva_domain::Stage::EntityProcessing);
    }

    #[tokio::test]
    async fn entity_processing_skips_stages_already_marked_complete() {
        let curation = curation_store();
        let journal = JournalEntry::new(NaiveDate::from_ymd_opt(2026, 7, 28).unwrap(), "Hoy trabaje en Minerva.");
        curation.save_journal(&journal).unwrap();
        let mut state = PipelineState::new(journal.uuid);
        state.stage = minerva_domain::Stage::EntityProcessing;
        for &id in ENTITY_PROCESSING_ORDER {
            state.mark_stage_complete(id.tag());
        }

        let vault_dir = tempfile::tempdir().unwrap();
        let graph = Arc::new(RecordingGraphStore::default());
        let engine = engine(graph, curation, vault_dir.path().to_path_buf());

        let outcome = engine.step(&mut state).await.unwrap();
        assert!(matches!(outcome, StepOutcome::Advanced));
        assert_eq!(state.stage, minerva_domain::Stage::SubmitEntityCuration);
    }

    #[tokio::test]
    async fn wait_state_advances_once_pending_reaches_zero() {
        let curation = curation_store();
        let journal_uuid = Uuid::new_v4();
        let mut state = PipelineState::new(journal_uuid);
        state.stage = minerva_domain::Stage::WaitEntityCuration;

        let vault_dir = tempfile::tempdir().unwrap();
        let graph = Arc::new(RecordingGraphStore::default());
        let engine = engine(graph, curation, vault_dir.path().to_path_buf());

        let outcome = engine.step(&mut state).await.unwrap();
        assert!(matches!(outcome, StepOutcome::Advanced));
        assert_eq!(state.stage, minerva_domain::Stage::RelationProcessing);
    }

    #[tokio::test]
    async fn wait_state_past_deadline_fails_terminally() {
        let curation = curation_store();
        let journal_uuid = Uuid::new_v4();
        let mut state = PipelineState::new(journal_uuid);
        state.stage = minerva_domain::Stage::WaitEntityCuration;
        state.entity_curation_pending = 1;
        state.updated_at = Utc::now() - ChronoDuration::days(8);

        let vault_dir = tempfile::tempdir().unwrap();
        let graph = Arc::new(RecordingGraphStore::default());
        let engine = engine(graph, curation, vault_dir.path().to_path_buf());

        let outcome = engine.step(&mut state).await.unwrap();
        assert!(matches!(outcome, StepOutcome::Failed));
        assert_eq!(state.stage, minerva_domain::Stage::Failed);
        assert!(state.last_error.unwrap().contains("deadline"));
    }

    #[tokio::test]
    async fn wait_state_within_deadline_keeps_waiting() {
        let curation = curation_store();
        let journal_uuid = Uuid::new_v4();
        let mut state = PipelineState::new(journal_uuid);
        state.stage = minerva_domain::Stage::WaitEntityCuration;
        state.entity_curation_pending = 1;
        state.updated_at = Utc::now() - ChronoDuration::days(1);

        let vault_dir = tempfile::tempdir().unwrap();
        let graph = Arc::new(RecordingGraphStore::default());
        let engine = engine(graph, curation, vault_dir.path().to_path_buf());

        let outcome = engine.step(&mut state).await.unwrap();
        assert!(matches!(outcome, StepOutcome::WaitingOnCuration));
        assert_eq!(state.stage, minerva_domain::Stage::WaitEntityCuration);
    }

    #[tokio::test]
    async fn db_write_persists_approved_entities_and_skips_rejected() {
        let curation = curation_store();
        let journal = JournalEntry::new(NaiveDate::from_ymd_opt(2026, 7, 28).unwrap(), "Trabaje con Ana hoy.");
        curation.save_journal(&journal).unwrap();

        let approved_payload = serde_json::json!({"name": "Ana", "short_summary": "s", "long_summary": "l", "attributes": {}});
        let mut approved = minerva_domain::CurationItem::new(
            journal.uuid,
            CurationPhase::Entity,
            CurationKind::Person,
            approved_payload,
            vec![],
            "ctx",
        );
        approved.approve();
        curation.enqueue(&approved).unwrap();

        let rejected_payload = serde_json::json!({"name": "Ghost", "short_summary": "s", "long_summary": "l", "attributes": {}});
        let mut rejected =
            minerva_domain::CurationItem::new(journal.uuid, CurationPhase::Entity, CurationKind::Person, rejected_payload, vec![], "ctx");
        rejected.reject();
        curation.enqueue(&rejected).unwrap();

        let mut state = PipelineState::new(journal.uuid);
        state.stage = minerva_domain::Stage::DbWrite;

        let vault_dir = tempfile::tempdir().unwrap();
        let graph = Arc::new(RecordingGraphStore::default());
        let engine = engine(graph.clone(), curation, vault_dir.path().to_path_buf());

        let outcome = engine.step(&mut state).await.unwrap();
        assert!(matches!(outcome, StepOutcome::Advanced));
        assert_eq!(state.stage, minerva_domain::Stage::Completed);
        let written = graph.entities.lock().unwrap();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].common.name, "Ana");
        assert!(vault_dir.path().join("Ana.md").exists());
        assert!(engine.curation().phase_complete(journal.uuid, CurationPhase::Entity).unwrap());
        assert!(engine.curation().phase_complete(journal.uuid, CurationPhase::Relation).unwrap());
    }
}

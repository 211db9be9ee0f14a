use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The durable workflow's stage. Transitions are strictly forward except
/// for retry-in-place on a recoverable error; the orchestrator never
/// skips a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Submitted,
    EntityProcessing,
    SubmitEntityCuration,
    WaitEntityCuration,
    RelationProcessing,
    SubmitRelationCuration,
    WaitRelationCuration,
    DbWrite,
    Completed,
    Failed,
}

impl Stage {
    /// The stage that follows this one on success. `Completed` and
    /// `Failed` have no successor.
    pub fn next(&self) -> Option<Stage> {
        match self {
            Self::Submitted => Some(Self::EntityProcessing),
            Self::EntityProcessing => Some(Self::SubmitEntityCuration),
            Self::SubmitEntityCuration => Some(Self::WaitEntityCuration),
            Self::WaitEntityCuration => Some(Self::RelationProcessing),
            Self::RelationProcessing => Some(Self::SubmitRelationCuration),
            Self::SubmitRelationCuration => Some(Self::WaitRelationCuration),
            Self::WaitRelationCuration => Some(Self::DbWrite),
            Self::DbWrite => Some(Self::Completed),
            Self::Completed | Self::Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn is_wait_state(&self) -> bool {
        matches!(self, Self::WaitEntityCuration | Self::WaitRelationCuration)
    }
}

/// The workflow's checkpointed state, persisted after every transition so
/// a crash mid-run resumes from the last committed stage instead of
/// restarting the journal entry from scratch.
///
/// The workflow id is derived deterministically from `(journal_uuid)` so
/// resubmitting the same entry after a crash finds, rather than
/// duplicates, the in-flight run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    pub workflow_id: Uuid,
    pub journal_uuid: Uuid,
    pub stage: Stage,
    pub entity_curation_items: usize,
    pub entity_curation_pending: usize,
    pub relation_curation_items: usize,
    pub relation_curation_pending: usize,
    pub retry_count: u32,
    pub last_error: Option<String>,
    /// Stage-id tags (e.g. `"Person"`, `"Relation"`) already run within the
    /// current `ENTITY_PROCESSING`/`RELATION_PROCESSING` attempt. A crash
    /// mid-block leaves the completed stages' curation items already
    /// enqueued; on resume the block re-enters and skips these rather than
    /// re-running and double-enqueuing them. Cleared on `advance()`.
    #[serde(default)]
    pub completed_stage_tags: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PipelineState {
    pub fn new(journal_uuid: Uuid) -> Self {
        let now = Utc::now();
        Self {
            workflow_id: journal_uuid,
            journal_uuid,
            stage: Stage::Submitted,
            entity_curation_items: 0,
            entity_curation_pending: 0,
            relation_curation_items: 0,
            relation_curation_pending: 0,
            retry_count: 0,
            last_error: None,
            completed_stage_tags: Vec::new(),
            started_at: now,
            updated_at: now,
        }
    }

    /// Advance to the next stage, resetting retry bookkeeping. Panics if
    /// called on a terminal stage — callers must check [`Stage::is_terminal`]
    /// first, since that indicates an orchestrator bug rather than a
    /// recoverable runtime condition.
    pub fn advance(&mut self) {
        self.stage = self.stage.next().expect("advance called on a terminal stage");
        self.retry_count = 0;
        self.last_error = None;
        self.completed_stage_tags.clear();
        self.updated_at = Utc::now();
    }

    pub fn record_retry(&mut self, error: impl Into<String>) {
        self.retry_count += 1;
        self.last_error = Some(error.into());
        self.updated_at = Utc::now();
    }

    pub fn mark_stage_complete(&mut self, tag: &str) {
        if !self.completed_stage_tags.iter().any(|t| t == tag) {
            self.completed_stage_tags.push(tag.to_string());
        }
        self.updated_at = Utc::now();
    }

    pub fn is_stage_complete(&self, tag: &str) -> bool {
        self.completed_stage_tags.iter().any(|t| t == tag)
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.stage = Stage::Failed;
        self.last_error = Some(error.into());
        self.updated_at = Utc::now();
    }

    /// Whether every curation item of the phase this wait-state is gating
    /// has reached a terminal decision.
    pub fn curation_phase_complete(&self) -> bool {
        match self.stage {
            Stage::WaitEntityCuration => self.entity_curation_pending == 0,
            Stage::WaitRelationCuration => self.relation_curation_pending == 0,
            _ => true,
        }
    }
}

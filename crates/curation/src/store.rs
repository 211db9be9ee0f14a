//! Durable curation queue: every extracted candidate is written to a
//! [`redb`] database before the orchestrator ever surfaces it to a human,
//! so a curator's pending decisions survive a process restart. Curation
//! items are keyed by `(journal_uuid, phase)` via a newline-joined
//! secondary index table alongside the primary item table.

use std::path::{Path, PathBuf};

use minerva_domain::{CurationItem, CurationPhase, CurationStatus, JournalEntry, PipelineError, PipelineState, Result};
use minerva_serde::PayloadTag;
use redb::{Database, ReadableTable, TableDefinition};
use uuid::Uuid;

/// Item table: `item uuid (str) -> tagged envelope(CurationItem)`.
const ITEMS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("items");
/// Phase index: `"{journal_uuid}:{phase}" -> newline-joined item uuid list`.
const PHASE_INDEX_TABLE: TableDefinition<&str, &str> = TableDefinition::new("phase_index");
/// One more table sharing the same database handle: `workflow_id (str) ->
/// tagged envelope(PipelineState)`, so the orchestrator's durable state
/// and the curation queue it waits on always checkpoint together.
const WORKFLOWS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("workflows");
/// `journal_uuid (str) -> tagged envelope(JournalEntry)`, written once on
/// `Submitted` entry. A workflow resumed after a crash has nothing but
/// its `workflow_id` to go on; this is where it finds the narration back.
const JOURNALS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("journals");
/// `"{journal_uuid}:{phase}" -> "1"`, written once by `mark_phase_complete`.
/// Presence means DB_WRITE has folded that phase's approved items into the
/// graph; absence is the default for any phase never marked.
const PHASE_COMPLETE_TABLE: TableDefinition<&str, &str> = TableDefinition::new("phase_complete");

fn phase_key(journal_uuid: Uuid, phase: CurationPhase) -> String {
    let phase_tag = match phase {
        CurationPhase::Entity => "entity",
        CurationPhase::Relation => "relation",
    };
    format!("{journal_uuid}:{phase_tag}")
}

pub struct CurationStore {
    db: Database,
    path: PathBuf,
}

impl CurationStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PipelineError::consistency(e.to_string()))?;
        }
        let db = Database::create(&path).map_err(|e| PipelineError::consistency(format!("opening curation store: {e}")))?;
        {
            let tx = db.begin_write().map_err(|e| PipelineError::consistency(e.to_string()))?;
            tx.open_table(ITEMS_TABLE).map_err(|e| PipelineError::consistency(e.to_string()))?;
            tx.open_table(PHASE_INDEX_TABLE).map_err(|e| PipelineError::consistency(e.to_string()))?;
            tx.open_table(WORKFLOWS_TABLE).map_err(|e| PipelineError::consistency(e.to_string()))?;
            tx.open_table(JOURNALS_TABLE).map_err(|e| PipelineError::consistency(e.to_string()))?;
            tx.open_table(PHASE_COMPLETE_TABLE).map_err(|e| PipelineError::consistency(e.to_string()))?;
            tx.commit().map_err(|e| PipelineError::consistency(e.to_string()))?;
        }
        Ok(Self { db, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist a new item and register it in its phase's index. Idempotent
    /// on `item.id` — re-enqueuing the same id overwrites the stored copy
    /// but only appends to the phase index on first insertion.
    pub fn enqueue(&self, item: &CurationItem) -> Result<()> {
        let id_str = item.id.to_string();
        let key = phase_key(item.journal_uuid, item.phase);
        let bytes = minerva_serde::encode(PayloadTag::CurationItem, item)?;

        let tx = self.db.begin_write().map_err(|e| PipelineError::consistency(e.to_string()))?;
        {
            let mut items = tx.open_table(ITEMS_TABLE).map_err(|e| PipelineError::consistency(e.to_string()))?;
            let already_present = items.get(id_str.as_str()).map_err(|e| PipelineError::consistency(e.to_string()))?.is_some();
            items.insert(id_str.as_str(), bytes.as_slice()).map_err(|e| PipelineError::consistency(e.to_string()))?;

            if !already_present {
                let mut phase_index = tx.open_table(PHASE_INDEX_TABLE).map_err(|e| PipelineError::consistency(e.to_string()))?;
                let existing = phase_index.get(key.as_str()).map_err(|e| PipelineError::consistency(e.to_string()))?.map(|v| v.value().to_string()).unwrap_or_default();
                let updated = if existing.is_empty() { id_str.clone() } else { format!("{existing}\n{id_str}") };
                phase_index.insert(key.as_str(), updated.as_str()).map_err(|e| PipelineError::consistency(e.to_string()))?;
            }
        }
        tx.commit().map_err(|e| PipelineError::consistency(e.to_string()))?;
        Ok(())
    }

    pub fn get(&self, id: Uuid) -> Result<Option<CurationItem>> {
        let tx = self.db.begin_read().map_err(|e| PipelineError::consistency(e.to_string()))?;
        let items = tx.open_table(ITEMS_TABLE).map_err(|e| PipelineError::consistency(e.to_string()))?;
        match items.get(id.to_string().as_str()).map_err(|e| PipelineError::consistency(e.to_string()))? {
            None => Ok(None),
            Some(v) => {
                let item: CurationItem = minerva_serde::decode(PayloadTag::CurationItem, v.value())?;
                Ok(Some(item))
            }
        }
    }

    /// Every item belonging to `(journal_uuid, phase)`, in enqueue order.
    pub fn items_for_phase(&self, journal_uuid: Uuid, phase: CurationPhase) -> Result<Vec<CurationItem>> {
        let key = phase_key(journal_uuid, phase);
        let tx = self.db.begin_read().map_err(|e| PipelineError::consistency(e.to_string()))?;
        let phase_index = tx.open_table(PHASE_INDEX_TABLE).map_err(|e| PipelineError::consistency(e.to_string()))?;
        let ids = phase_index
            .get(key.as_str())
            .map_err(|e| PipelineError::consistency(e.to_string()))?
            .map(|v| v.value().to_string())
            .unwrap_or_default();
        let items_table = tx.open_table(ITEMS_TABLE).map_err(|e| PipelineError::consistency(e.to_string()))?;

        let mut out = Vec::new();
        for id in ids.lines().filter(|l| !l.is_empty()) {
            if let Some(v) = items_table.get(id).map_err(|e| PipelineError::consistency(e.to_string()))? {
                let item: CurationItem = minerva_serde::decode(PayloadTag::CurationItem, v.value())?;
                out.push(item);
            }
        }
        Ok(out)
    }

    /// Count of items in `(journal_uuid, phase)` still awaiting a decision.
    /// The orchestrator's `WAIT_*_CURATION` states poll this until it
    /// reaches zero.
    pub fn pending_count(&self, journal_uuid: Uuid, phase: CurationPhase) -> Result<usize> {
        Ok(self.items_for_phase(journal_uuid, phase)?.into_iter().filter(|i| !i.status.is_terminal()).count())
    }

    /// Every item in `(journal_uuid, phase)` a human has approved or
    /// edited, carrying the payload DB_WRITE should persist
    /// ([`CurationItem::effective_payload`]). Rejected and still-pending
    /// items are excluded.
    pub fn approved(&self, journal_uuid: Uuid, phase: CurationPhase) -> Result<Vec<CurationItem>> {
        Ok(self
            .items_for_phase(journal_uuid, phase)?
            .into_iter()
            .filter(|i| matches!(i.status, CurationStatus::Approved | CurationStatus::Edited))
            .collect())
    }

    /// Record that `(journal_uuid, phase)` has been folded into the graph.
    /// Refuses while any item in the phase is still pending — a phase must
    /// be fully decided before DB_WRITE can consider it done.
    pub fn mark_phase_complete(&self, journal_uuid: Uuid, phase: CurationPhase) -> Result<()> {
        let pending = self.pending_count(journal_uuid, phase)?;
        if pending > 0 {
            return Err(PipelineError::consistency(format!(
                "cannot mark {phase:?} curation complete for journal {journal_uuid}: {pending} item(s) still pending"
            )));
        }
        let key = phase_key(journal_uuid, phase);
        let tx = self.db.begin_write().map_err(|e| PipelineError::consistency(e.to_string()))?;
        {
            let mut table = tx.open_table(PHASE_COMPLETE_TABLE).map_err(|e| PipelineError::consistency(e.to_string()))?;
            table.insert(key.as_str(), "1").map_err(|e| PipelineError::consistency(e.to_string()))?;
        }
        tx.commit().map_err(|e| PipelineError::consistency(e.to_string()))?;
        Ok(())
    }

    /// Whether `mark_phase_complete` has already run for `(journal_uuid,
    /// phase)`. DB_WRITE is retried wholesale on partial failure; this lets
    /// a future read confirm a retried run actually finished.
    pub fn phase_complete(&self, journal_uuid: Uuid, phase: CurationPhase) -> Result<bool> {
        let key = phase_key(journal_uuid, phase);
        let tx = self.db.begin_read().map_err(|e| PipelineError::consistency(e.to_string()))?;
        let table = tx.open_table(PHASE_COMPLETE_TABLE).map_err(|e| PipelineError::consistency(e.to_string()))?;
        Ok(table.get(key.as_str()).map_err(|e| PipelineError::consistency(e.to_string()))?.is_some())
    }

    fn put(&self, item: &CurationItem) -> Result<()> {
        let bytes = minerva_serde::encode(PayloadTag::CurationItem, item)?;
        let tx = self.db.begin_write().map_err(|e| PipelineError::consistency(e.to_string()))?;
        {
            let mut items = tx.open_table(ITEMS_TABLE).map_err(|e| PipelineError::consistency(e.to_string()))?;
            items.insert(item.id.to_string().as_str(), bytes.as_slice()).map_err(|e| PipelineError::consistency(e.to_string()))?;
        }
        tx.commit().map_err(|e| PipelineError::consistency(e.to_string()))?;
        Ok(())
    }

    /// Apply a human decision to a pending item and persist it. Deciding
    /// an already-terminal item is a consistency error: curation UIs must
    /// not let a second decision land on the same item.
    pub fn decide(&self, id: Uuid, apply: impl FnOnce(&mut CurationItem)) -> Result<CurationItem> {
        let mut item = self.get(id)?.ok_or_else(|| PipelineError::consistency(format!("curation item {id} not found")))?;
        if item.status != CurationStatus::Pending {
            return Err(PipelineError::consistency(format!("curation item {id} already decided")));
        }
        apply(&mut item);
        self.put(&item)?;
        Ok(item)
    }

    /// Checkpoint a workflow's durable state. Called by the orchestrator
    /// after every stage transition so a crash resumes from the last
    /// completed stage instead of from `Submitted`.
    pub fn save_workflow_state(&self, state: &PipelineState) -> Result<()> {
        let bytes = minerva_serde::encode(PayloadTag::PipelineState, state)?;
        let tx = self.db.begin_write().map_err(|e| PipelineError::consistency(e.to_string()))?;
        {
            let mut workflows = tx.open_table(WORKFLOWS_TABLE).map_err(|e| PipelineError::consistency(e.to_string()))?;
            workflows.insert(state.workflow_id.to_string().as_str(), bytes.as_slice()).map_err(|e| PipelineError::consistency(e.to_string()))?;
        }
        tx.commit().map_err(|e| PipelineError::consistency(e.to_string()))?;
        Ok(())
    }

    pub fn load_workflow_state(&self, workflow_id: Uuid) -> Result<Option<PipelineState>> {
        let tx = self.db.begin_read().map_err(|e| PipelineError::consistency(e.to_string()))?;
        let workflows = tx.open_table(WORKFLOWS_TABLE).map_err(|e| PipelineError::consistency(e.to_string()))?;
        match workflows.get(workflow_id.to_string().as_str()).map_err(|e| PipelineError::consistency(e.to_string()))? {
            None => Ok(None),
            Some(v) => {
                let state: PipelineState = minerva_serde::decode(PayloadTag::PipelineState, v.value())?;
                Ok(Some(state))
            }
        }
    }

    /// Persist the submitted journal so a crashed-and-resumed workflow can
    /// find its narration back by `journal_uuid` alone. Idempotent: a
    /// re-submit overwrites with the same bytes.
    pub fn save_journal(&self, journal: &JournalEntry) -> Result<()> {
        let bytes = minerva_serde::encode(PayloadTag::JournalEntry, journal)?;
        let tx = self.db.begin_write().map_err(|e| PipelineError::consistency(e.to_string()))?;
        {
            let mut journals = tx.open_table(JOURNALS_TABLE).map_err(|e| PipelineError::consistency(e.to_string()))?;
            journals.insert(journal.uuid.to_string().as_str(), bytes.as_slice()).map_err(|e| PipelineError::consistency(e.to_string()))?;
        }
        tx.commit().map_err(|e| PipelineError::consistency(e.to_string()))?;
        Ok(())
    }

    pub fn load_journal(&self, journal_uuid: Uuid) -> Result<Option<JournalEntry>> {
        let tx = self.db.begin_read().map_err(|e| PipelineError::consistency(e.to_string()))?;
        let journals = tx.open_table(JOURNALS_TABLE).map_err(|e| PipelineError::consistency(e.to_string()))?;
        match journals.get(journal_uuid.to_string().as_str()).map_err(|e| PipelineError::consistency(e.to_string()))? {
            None => Ok(None),
            Some(v) => {
                let journal: JournalEntry = minerva_serde::decode(PayloadTag::JournalEntry, v.value())?;
                Ok(Some(journal))
            }
        }
    }

    /// Every workflow whose last checkpointed stage is not terminal — what
    /// the orchestrator re-attaches to on startup after a crash.
    pub fn active_workflow_ids(&self) -> Result<Vec<Uuid>> {
        let tx = self.db.begin_read().map_err(|e| PipelineError::consistency(e.to_string()))?;
        let workflows = tx.open_table(WORKFLOWS_TABLE).map_err(|e| PipelineError::consistency(e.to_string()))?;
        let mut out = Vec::new();
        for entry in workflows.iter().map_err(|e| PipelineError::consistency(e.to_string()))? {
            let (_, v) = entry.map_err(|e| PipelineError::consistency(e.to_string()))?;
            let state: PipelineState = minerva_serde::decode(PayloadTag::PipelineState, v.value())?;
            if !state.stage.is_terminal() {
                out.push(state.workflow_id);
            }
        }
        Ok(out)
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chunk::Span;

/// Which processing phase a [`CurationItem`] belongs to; the orchestrator
/// gates on every item of a phase reaching a terminal [`CurationStatus`]
/// before advancing past the corresponding `WAIT_*_CURATION` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurationPhase {
    Entity,
    Relation,
}

/// What kind of payload a [`CurationItem`] carries — mirrors the
/// extraction stage that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurationKind {
    Person,
    Place,
    Concept,
    Content,
    Consumable,
    Event,
    Project,
    FeelingEmotion,
    FeelingConcept,
    Relation,
    ConceptRelation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CurationStatus {
    Pending,
    Approved,
    Rejected,
    Edited,
}

impl CurationStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// One extracted candidate awaiting a human decision before it is written
/// to the graph. `payload` is the raw LLM-extracted JSON;
/// `curated_payload` holds the human's edit when `status == Edited`, and
/// is `None` otherwise — approving or rejecting never needs a copy of the
/// unedited payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurationItem {
    pub id: Uuid,
    pub journal_uuid: Uuid,
    pub phase: CurationPhase,
    pub kind: CurationKind,
    pub payload: serde_json::Value,
    pub spans: Vec<Span>,
    /// Surrounding context text shown to the curator alongside the span
    /// (e.g. the enclosing chunk's text).
    pub context: String,
    pub status: CurationStatus,
    pub curated_payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl CurationItem {
    pub fn new(
        journal_uuid: Uuid,
        phase: CurationPhase,
        kind: CurationKind,
        payload: serde_json::Value,
        spans: Vec<Span>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            journal_uuid,
            phase,
            kind,
            payload,
            spans,
            context: context.into(),
            status: CurationStatus::Pending,
            curated_payload: None,
            created_at: Utc::now(),
            decided_at: None,
        }
    }

    pub fn approve(&mut self) {
        self.status = CurationStatus::Approved;
        self.decided_at = Some(Utc::now());
    }

    pub fn reject(&mut self) {
        self.status = CurationStatus::Rejected;
        self.decided_at = Some(Utc::now());
    }

    pub fn edit(&mut self, edited: serde_json::Value) {
        self.curated_payload = Some(edited);
        self.status = CurationStatus::Edited;
        self.decided_at = Some(Utc::now());
    }

    /// The payload that should be written to the graph: the human edit if
    /// there was one, otherwise the original extraction.
    pub fn effective_payload(&self) -> &serde_json::Value {
        self.curated_payload.as_ref().unwrap_or(&self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> CurationItem {
        CurationItem::new(
            Uuid::new_v4(),
            CurationPhase::Entity,
            CurationKind::Person,
            serde_json::json!({"name": "Ana"}),
            vec![Span::new(0, 3, "Ana")],
            "Trabajé con Ana hoy.",
        )
    }

    #[test]
    fn fresh_item_is_pending_and_not_terminal() {
        let item = item();
        assert_eq!(item.status, CurationStatus::Pending);
        assert!(!item.status.is_terminal());
    }

    #[test]
    fn approve_is_terminal_and_keeps_original_payload() {
        let mut item = item();
        item.approve();
        assert!(item.status.is_terminal());
        assert_eq!(item.effective_payload(), &item.payload);
    }

    #[test]
    fn edit_replaces_effective_payload_without_losing_original() {
        let mut item = item();
        let edited = serde_json::json!({"name": "Ana Garcia"});
        item.edit(edited.clone());
        assert_eq!(item.status, CurationStatus::Edited);
        assert_eq!(item.effective_payload(), &edited);
        assert_ne!(item.payload, edited);
    }

    #[test]
    fn reject_is_terminal() {
        let mut item = item();
        item.reject();
        assert!(item.status.is_terminal());
    }
}

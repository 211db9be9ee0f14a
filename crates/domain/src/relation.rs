use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A free-text relationship between two non-Concept entities, reified as a
/// direct edge plus a `Relation` node sharing the same `edge_uuid`. The
/// edge carries `type`/`summary_short` mirrored from the node so graph
/// queries can filter without a node hop; the node is the place curation
/// edits land.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation {
    /// Shared identity between the direct edge and this node.
    pub edge_uuid: Uuid,
    pub source_uuid: Uuid,
    pub target_uuid: Uuid,
    pub relation_type: String,
    pub summary_short: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Relation {
    pub fn new(source_uuid: Uuid, target_uuid: Uuid, relation_type: impl Into<String>, summary_short: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            edge_uuid: Uuid::new_v4(),
            source_uuid,
            target_uuid,
            relation_type: relation_type.into(),
            summary_short: summary_short.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a curation edit, mirroring the edge's denormalized fields.
    pub fn update(&mut self, relation_type: impl Into<String>, summary_short: impl Into<String>) {
        self.relation_type = relation_type.into();
        self.summary_short = summary_short.into();
        self.updated_at = Utc::now();
    }
}

/// Closed set of relation types between two `Concept` entities. Each
/// directional type has a fixed inverse emitted on the opposite edge;
/// symmetric types are their own inverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConceptRelationType {
    Generalizes,
    SpecificOf,
    PartOf,
    HasPart,
    Supports,
    SupportedBy,
    Opposes,
    SimilarTo,
    RelatesTo,
}

impl ConceptRelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generalizes => "GENERALIZES",
            Self::SpecificOf => "SPECIFIC_OF",
            Self::PartOf => "PART_OF",
            Self::HasPart => "HAS_PART",
            Self::Supports => "SUPPORTS",
            Self::SupportedBy => "SUPPORTED_BY",
            Self::Opposes => "OPPOSES",
            Self::SimilarTo => "SIMILAR_TO",
            Self::RelatesTo => "RELATES_TO",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "GENERALIZES" => Self::Generalizes,
            "SPECIFIC_OF" => Self::SpecificOf,
            "PART_OF" => Self::PartOf,
            "HAS_PART" => Self::HasPart,
            "SUPPORTS" => Self::Supports,
            "SUPPORTED_BY" => Self::SupportedBy,
            "OPPOSES" => Self::Opposes,
            "SIMILAR_TO" => Self::SimilarTo,
            "RELATES_TO" => Self::RelatesTo,
            _ => return None,
        })
    }

    /// Symmetric types are their own inverse; directional types pair up
    /// (`GENERALIZES`<->`SPECIFIC_OF`, `PART_OF`<->`HAS_PART`,
    /// `SUPPORTS`<->`SUPPORTED_BY`).
    pub fn inverse(&self) -> Self {
        match self {
            Self::Generalizes => Self::SpecificOf,
            Self::SpecificOf => Self::Generalizes,
            Self::PartOf => Self::HasPart,
            Self::HasPart => Self::PartOf,
            Self::Supports => Self::SupportedBy,
            Self::SupportedBy => Self::Supports,
            Self::Opposes => Self::Opposes,
            Self::SimilarTo => Self::SimilarTo,
            Self::RelatesTo => Self::RelatesTo,
        }
    }

    pub fn is_symmetric(&self) -> bool {
        matches!(self, Self::Opposes | Self::SimilarTo | Self::RelatesTo)
    }
}

/// A directed, typed edge between two `Concept` entities. Unlike
/// [`Relation`] this is not reified: `ConceptRelationType` is a closed
/// enum, so the type itself carries enough meaning that curation never
/// needs to edit free text on it.
///
/// For every non-symmetric relation the extraction stage that emits this
/// type also emits the inverse-typed edge on the opposite pair so the
/// graph is navigable in both directions; self-connections (`source ==
/// target`) and unrecognized type names are dropped rather than stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptRelation {
    pub source_uuid: Uuid,
    pub target_uuid: Uuid,
    pub relation_type: ConceptRelationType,
    pub created_at: DateTime<Utc>,
}

impl ConceptRelation {
    pub fn new(source_uuid: Uuid, target_uuid: Uuid, relation_type: ConceptRelationType) -> Self {
        Self { source_uuid, target_uuid, relation_type, created_at: Utc::now() }
    }

    /// The reverse-directed edge to emit alongside this one, unless the
    /// type is symmetric (in which case no separate edge is needed — the
    /// single edge already reads the same both ways).
    pub fn inverse(&self) -> Option<ConceptRelation> {
        if self.relation_type.is_symmetric() {
            return None;
        }
        Some(ConceptRelation {
            source_uuid: self.target_uuid,
            target_uuid: self.source_uuid,
            relation_type: self.relation_type.inverse(),
            created_at: self.created_at,
        })
    }
}

/// A `(Chunk)-[:MENTIONS]->(Entity|Relation)` link resolved by the span
/// resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mention {
    pub chunk_id: Uuid,
    pub target_uuid: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directional_inverses_pair_up() {
        assert_eq!(ConceptRelationType::Generalizes.inverse(), ConceptRelationType::SpecificOf);
        assert_eq!(ConceptRelationType::SpecificOf.inverse(), ConceptRelationType::Generalizes);
        assert_eq!(ConceptRelationType::PartOf.inverse(), ConceptRelationType::HasPart);
        assert_eq!(ConceptRelationType::Supports.inverse(), ConceptRelationType::SupportedBy);
    }

    #[test]
    fn symmetric_types_are_their_own_inverse_and_emit_no_extra_edge() {
        for t in [ConceptRelationType::Opposes, ConceptRelationType::SimilarTo, ConceptRelationType::RelatesTo] {
            assert_eq!(t.inverse(), t);
            let rel = ConceptRelation::new(Uuid::new_v4(), Uuid::new_v4(), t);
            assert!(rel.inverse().is_none());
        }
    }

    #[test]
    fn directional_relation_emits_reverse_edge() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let rel = ConceptRelation::new(a, b, ConceptRelationType::PartOf);
        let inv = rel.inverse().unwrap();
        assert_eq!(inv.source_uuid, b);
        assert_eq!(inv.target_uuid, a);
        assert_eq!(inv.relation_type, ConceptRelationType::HasPart);
    }

    #[test]
    fn relation_type_round_trips_through_strings() {
        for t in [
            ConceptRelationType::Generalizes,
            ConceptRelationType::SpecificOf,
            ConceptRelationType::PartOf,
            ConceptRelationType::HasPart,
            ConceptRelationType::Supports,
            ConceptRelationType::SupportedBy,
            ConceptRelationType::Opposes,
            ConceptRelationType::SimilarTo,
            ConceptRelationType::RelatesTo,
        ] {
            assert_eq!(ConceptRelationType::from_str(t.as_str()), Some(t));
        }
        assert_eq!(ConceptRelationType::from_str("NOT_A_TYPE"), None);
    }

    #[test]
    fn relation_update_mirrors_onto_edge_fields_and_bumps_timestamp() {
        let mut rel = Relation::new(Uuid::new_v4(), Uuid::new_v4(), "WORKED_WITH", "short");
        let created = rel.created_at;
        rel.update("COLLABORATED_WITH", "new short summary");
        assert_eq!(rel.relation_type, "COLLABORATED_WITH");
        assert_eq!(rel.created_at, created);
        assert!(rel.updated_at >= created);
    }
}

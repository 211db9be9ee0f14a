use minerva_domain::CurationKind;

/// Identifies one extraction stage. `ENTITY_PROCESSING_ORDER` and
/// `RELATION_PROCESSING_ORDER` are the only valid run orders — stages are
/// never run out of order or in parallel with each other, since later
/// entity stages (e.g. `Event.location`) can reference entities curated
/// by earlier ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageId {
    Person,
    Concept,
    Project,
    Consumable,
    Content,
    Event,
    Place,
    FeelingEmotion,
    FeelingConcept,
    Relation,
    ConceptRelation,
}

impl StageId {
    /// Stable string tag used as a [`minerva_domain::PipelineState`]
    /// `completed_stage_tags` entry, so a block's stage-level progress
    /// checkpoints across a crash.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Concept => "concept",
            Self::Project => "project",
            Self::Consumable => "consumable",
            Self::Content => "content",
            Self::Event => "event",
            Self::Place => "place",
            Self::FeelingEmotion => "feeling_emotion",
            Self::FeelingConcept => "feeling_concept",
            Self::Relation => "relation",
            Self::ConceptRelation => "concept_relation",
        }
    }

    pub fn curation_kind(&self) -> CurationKind {
        match self {
            Self::Person => CurationKind::Person,
            Self::Concept => CurationKind::Concept,
            Self::Project => CurationKind::Project,
            Self::Consumable => CurationKind::Consumable,
            Self::Content => CurationKind::Content,
            Self::Event => CurationKind::Event,
            Self::Place => CurationKind::Place,
            Self::FeelingEmotion => CurationKind::FeelingEmotion,
            Self::FeelingConcept => CurationKind::FeelingConcept,
            Self::Relation => CurationKind::Relation,
            Self::ConceptRelation => CurationKind::ConceptRelation,
        }
    }
}

/// Entity-extraction stage order during `ENTITY_PROCESSING`. People and
/// concepts are extracted before projects/consumables/content/events so
/// later stages can reference already-known names when disambiguating.
pub const ENTITY_PROCESSING_ORDER: &[StageId] = &[
    StageId::Person,
    StageId::Concept,
    StageId::Project,
    StageId::Consumable,
    StageId::Content,
    StageId::Event,
    StageId::Place,
];

/// Relation-extraction stage order during `RELATION_PROCESSING`. Feelings
/// stages run here, not during `ENTITY_PROCESSING`, because they need
/// curated (human-approved) person/concept UUIDs to attach to — a
/// deliberate divergence from the original, which ran an equivalent pass
/// twice.
pub const RELATION_PROCESSING_ORDER: &[StageId] =
    &[StageId::FeelingEmotion, StageId::FeelingConcept, StageId::Relation, StageId::ConceptRelation];

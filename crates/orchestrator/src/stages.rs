//! Builds one boxed [`Stage`] per [`StageId`], supplying the per-entity-type
//! prompt instruction `GenericEntityStage` is parameterized over.

use std::sync::Arc;

use minerva_extraction::{
    ConceptRelationStage, ConceptStage, FeelingConceptStage, FeelingEmotionStage, GenericEntityStage, RelationStage, Stage,
    StageId,
};
use minerva_llm::LlmGateway;

pub fn build_entity_stage(id: StageId, llm: Arc<LlmGateway>, model: &str) -> Box<dyn Stage> {
    match id {
        StageId::Person => Box::new(GenericEntityStage::new(
            StageId::Person,
            "Person",
            "Extract named people mentioned in the narration, with their occupation if stated.",
            llm,
            model,
        )),
        StageId::Project => Box::new(GenericEntityStage::new(
            StageId::Project,
            "Project",
            "Extract ongoing projects the author is working on, with their current status \
             (not-started, active, on-hold, completed, cancelled) if it can be inferred.",
            llm,
            model,
        )),
        StageId::Consumable => Box::new(GenericEntityStage::new(
            StageId::Consumable,
            "Consumable",
            "Extract consumable items mentioned (food, drink, media consumed once), with a \
             category if stated.",
            llm,
            model,
        )),
        StageId::Content => Box::new(GenericEntityStage::new(
            StageId::Content,
            "Content",
            "Extract books, articles, videos, or other named content referenced, with their \
             medium and author if stated.",
            llm,
            model,
        )),
        StageId::Event => Box::new(GenericEntityStage::new(
            StageId::Event,
            "Event",
            "Extract discrete events that happened on this day, with duration in minutes and \
             location if stated.",
            llm,
            model,
        )),
        StageId::Place => Box::new(GenericEntityStage::new(
            StageId::Place,
            "Place",
            "Extract named places visited or referenced, with their address if stated.",
            llm,
            model,
        )),
        StageId::Concept => Box::new(ConceptStage::new(llm, model)),
        StageId::FeelingEmotion | StageId::FeelingConcept | StageId::Relation | StageId::ConceptRelation => {
            unreachable!("{id:?} is a relation-phase stage, not entity-phase")
        }
    }
}

pub fn build_relation_stage(id: StageId, llm: Arc<LlmGateway>, model: &str) -> Box<dyn Stage> {
    match id {
        StageId::FeelingEmotion => Box::new(FeelingEmotionStage::new(llm, model)),
        StageId::FeelingConcept => Box::new(FeelingConceptStage::new(llm, model)),
        StageId::Relation => Box::new(RelationStage::new(llm, model)),
        StageId::ConceptRelation => Box::new(ConceptRelationStage::new(llm, model)),
        _ => unreachable!("{id:?} is an entity-phase stage, not relation-phase"),
    }
}

//! Closed-type `ConceptRelation` extraction between two `Concept`
//! entities. Unlike [`crate::relation_stage::RelationStage`] the type is a
//! closed enum rather than free text, so for every non-symmetric relation
//! this stage also emits the inverse-typed edge — the graph never ends up
//! navigable in only one direction.

use std::sync::Arc;

use async_trait::async_trait;
use minerva_domain::relation::ConceptRelationType;
use minerva_domain::{CurationItem, CurationPhase, Result};
use minerva_llm::{GenerationRequest, LlmGateway};
use serde::Deserialize;

use crate::context::ExtractionContext;
use crate::registry::StageId;
use crate::stage::Stage;

#[derive(Debug, Deserialize)]
struct RawConceptRelation {
    source_concept: String,
    target_concept: String,
    relation_type: String,
}

#[derive(Debug, Deserialize, Default)]
struct RawConceptRelationExtraction {
    #[serde(default)]
    candidates: Vec<RawConceptRelation>,
}

pub struct ConceptRelationStage {
    llm: Arc<LlmGateway>,
    model: String,
}

impl ConceptRelationStage {
    pub fn new(llm: Arc<LlmGateway>, model: impl Into<String>) -> Self {
        Self { llm, model: model.into() }
    }

    fn build_prompt(&self, narration: &str) -> String {
        format!(
            "Identify relationships between concepts mentioned in the narration below. \
             relation_type must be one of: GENERALIZES, SPECIFIC_OF, PART_OF, HAS_PART, \
             SUPPORTS, SUPPORTED_BY, OPPOSES, SIMILAR_TO, RELATES_TO.\n\n\
             Narration:\n{narration}\n\n\
             Respond with JSON: {{\"candidates\": [{{\"source_concept\": string, \
             \"target_concept\": string, \"relation_type\": string}}]}}. Only use concept \
             names already mentioned in the narration.",
        )
    }
}

#[async_trait]
impl Stage for ConceptRelationStage {
    fn id(&self) -> StageId {
        StageId::ConceptRelation
    }

    async fn run(&self, ctx: &ExtractionContext<'_>) -> Result<Vec<CurationItem>> {
        let request = GenerationRequest::new(&self.model, self.build_prompt(ctx.narration)).with_schema_name("ConceptRelation");
        let extraction: RawConceptRelationExtraction = self.llm.generate_structured(&request).await?;

        let mut items = Vec::new();
        for candidate in extraction.candidates {
            let Some(relation_type) = ConceptRelationType::from_str(&candidate.relation_type) else {
                continue;
            };
            let (Some(source), Some(target)) =
                (ctx.find_prior_by_name(&candidate.source_concept), ctx.find_prior_by_name(&candidate.target_concept))
            else {
                continue;
            };
            if source.uuid() == target.uuid() {
                continue;
            }

            let forward = minerva_domain::relation::ConceptRelation::new(source.uuid(), target.uuid(), relation_type);
            let context = format!("{} {} {}", candidate.source_concept, relation_type.as_str(), candidate.target_concept);
            items.push(item_for(ctx, &forward, context.clone()));

            if let Some(inverse) = forward.inverse() {
                let inverse_context = format!("{} {} {}", candidate.target_concept, inverse.relation_type.as_str(), candidate.source_concept);
                items.push(item_for(ctx, &inverse, inverse_context));
            }
        }
        Ok(items)
    }
}

fn item_for(
    ctx: &ExtractionContext<'_>,
    relation: &minerva_domain::relation::ConceptRelation,
    context: String,
) -> CurationItem {
    let payload = serde_json::json!({
        "source_uuid": relation.source_uuid,
        "target_uuid": relation.target_uuid,
        "relation_type": relation.relation_type.as_str(),
    });
    CurationItem::new(ctx.journal.uuid, CurationPhase::Relation, StageId::ConceptRelation.curation_kind(), payload, Vec::new(), context)
}

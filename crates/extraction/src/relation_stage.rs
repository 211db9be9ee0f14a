//! Free-text `Relation` extraction between two non-`Concept` entities
//! already known from this pass.

use std::sync::Arc;

use async_trait::async_trait;
use minerva_domain::{CurationItem, CurationPhase, Result};
use minerva_llm::{GenerationRequest, LlmGateway};
use serde::Deserialize;

use crate::context::ExtractionContext;
use crate::registry::StageId;
use crate::stage::Stage;

#[derive(Debug, Deserialize)]
struct RawRelation {
    source_name: String,
    target_name: String,
    relation_type: String,
    summary_short: String,
}

#[derive(Debug, Deserialize, Default)]
struct RawRelationExtraction {
    #[serde(default)]
    candidates: Vec<RawRelation>,
}

pub struct RelationStage {
    llm: Arc<LlmGateway>,
    model: String,
}

impl RelationStage {
    pub fn new(llm: Arc<LlmGateway>, model: impl Into<String>) -> Self {
        Self { llm, model: model.into() }
    }

    fn build_prompt(&self, narration: &str) -> String {
        format!(
            "Identify relationships between two named entities (people, places, projects, \
             events, content, consumables — not concepts) described in the narration below.\n\n\
             Narration:\n{narration}\n\n\
             Respond with JSON: {{\"candidates\": [{{\"source_name\": string, \"target_name\": string, \
             \"relation_type\": string (a short free-text label, e.g. \"works with\"), \
             \"summary_short\": string (<=30 words)}}]}}. Only use names already mentioned in the narration.",
        )
    }
}

#[async_trait]
impl Stage for RelationStage {
    fn id(&self) -> StageId {
        StageId::Relation
    }

    async fn run(&self, ctx: &ExtractionContext<'_>) -> Result<Vec<CurationItem>> {
        let request = GenerationRequest::new(&self.model, self.build_prompt(ctx.narration)).with_schema_name("Relation");
        let extraction: RawRelationExtraction = self.llm.generate_structured(&request).await?;

        let mut items = Vec::new();
        for candidate in extraction.candidates {
            let (Some(source), Some(target)) =
                (ctx.find_prior_by_name(&candidate.source_name), ctx.find_prior_by_name(&candidate.target_name))
            else {
                continue;
            };
            if source.uuid() == target.uuid() {
                continue;
            }
            let payload = serde_json::json!({
                "source_uuid": source.uuid(),
                "target_uuid": target.uuid(),
                "relation_type": candidate.relation_type,
                "summary_short": candidate.summary_short,
            });
            items.push(CurationItem::new(
                ctx.journal.uuid,
                CurationPhase::Relation,
                StageId::Relation.curation_kind(),
                payload,
                Vec::new(),
                format!("{} -> {}: {}", candidate.source_name, candidate.target_name, candidate.relation_type),
            ));
        }
        Ok(items)
    }
}

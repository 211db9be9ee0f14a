//! `FeelingEmotion`/`FeelingConcept` extraction. Both run during
//! `RELATION_PROCESSING`, after entity curation has settled, so they can
//! resolve the person/concept they attach to against curated UUIDs
//! instead of re-extracting them.

use std::sync::Arc;

use async_trait::async_trait;
use minerva_domain::entity::is_known_emotion;
use minerva_domain::{CurationItem, CurationPhase, Result};
use minerva_llm::{GenerationRequest, LlmGateway};
use serde::Deserialize;

use crate::context::ExtractionContext;
use crate::registry::StageId;
use crate::stage::Stage;

#[derive(Debug, Deserialize)]
struct RawFeelingEmotion {
    person_name: String,
    emotion: String,
}

#[derive(Debug, Deserialize, Default)]
struct RawFeelingEmotionExtraction {
    #[serde(default)]
    candidates: Vec<RawFeelingEmotion>,
}

pub struct FeelingEmotionStage {
    llm: Arc<LlmGateway>,
    model: String,
}

impl FeelingEmotionStage {
    pub fn new(llm: Arc<LlmGateway>, model: impl Into<String>) -> Self {
        Self { llm, model: model.into() }
    }

    fn build_prompt(&self, narration: &str) -> String {
        format!(
            "Identify moments in the narration below where a named person is described \
             feeling an emotion.\n\nNarration:\n{narration}\n\n\
             Respond with JSON: {{\"candidates\": [{{\"person_name\": string, \"emotion\": string}}]}}. \
             Only use a person already mentioned by name in the narration.",
        )
    }
}

#[async_trait]
impl Stage for FeelingEmotionStage {
    fn id(&self) -> StageId {
        StageId::FeelingEmotion
    }

    async fn run(&self, ctx: &ExtractionContext<'_>) -> Result<Vec<CurationItem>> {
        let request = GenerationRequest::new(&self.model, self.build_prompt(ctx.narration)).with_schema_name("FeelingEmotion");
        let extraction: RawFeelingEmotionExtraction = self.llm.generate_structured(&request).await?;

        let mut items = Vec::new();
        for candidate in extraction.candidates {
            if !is_known_emotion(&candidate.emotion) {
                continue;
            }
            let Some(person) = ctx.find_prior_by_name(&candidate.person_name) else {
                continue;
            };
            let payload = serde_json::json!({
                "person_uuid": person.uuid(),
                "emotion": candidate.emotion,
                "felt_at": ctx.journal.date.and_hms_opt(12, 0, 0).unwrap().and_utc(),
            });
            items.push(CurationItem::new(
                ctx.journal.uuid,
                CurationPhase::Relation,
                StageId::FeelingEmotion.curation_kind(),
                payload,
                Vec::new(),
                format!("{} feeling {}", candidate.person_name, candidate.emotion),
            ));
        }
        Ok(items)
    }
}

#[derive(Debug, Deserialize)]
struct RawFeelingConcept {
    person_name: String,
    concept_name: String,
}

#[derive(Debug, Deserialize, Default)]
struct RawFeelingConceptExtraction {
    #[serde(default)]
    candidates: Vec<RawFeelingConcept>,
}

pub struct FeelingConceptStage {
    llm: Arc<LlmGateway>,
    model: String,
}

impl FeelingConceptStage {
    pub fn new(llm: Arc<LlmGateway>, model: impl Into<String>) -> Self {
        Self { llm, model: model.into() }
    }

    fn build_prompt(&self, narration: &str) -> String {
        format!(
            "Identify moments in the narration below where a named person is described \
             being preoccupied with, or engaging deeply with, a concept or idea.\n\n\
             Narration:\n{narration}\n\n\
             Respond with JSON: {{\"candidates\": [{{\"person_name\": string, \"concept_name\": string}}]}}. \
             Only use names already mentioned in the narration.",
        )
    }
}

#[async_trait]
impl Stage for FeelingConceptStage {
    fn id(&self) -> StageId {
        StageId::FeelingConcept
    }

    async fn run(&self, ctx: &ExtractionContext<'_>) -> Result<Vec<CurationItem>> {
        let request = GenerationRequest::new(&self.model, self.build_prompt(ctx.narration)).with_schema_name("FeelingConcept");
        let extraction: RawFeelingConceptExtraction = self.llm.generate_structured(&request).await?;

        let mut items = Vec::new();
        for candidate in extraction.candidates {
            let (Some(person), Some(concept)) =
                (ctx.find_prior_by_name(&candidate.person_name), ctx.find_prior_by_name(&candidate.concept_name))
            else {
                continue;
            };
            let payload = serde_json::json!({
                "person_uuid": person.uuid(),
                "concept_uuid": concept.uuid(),
            });
            items.push(CurationItem::new(
                ctx.journal.uuid,
                CurationPhase::Relation,
                StageId::FeelingConcept.curation_kind(),
                payload,
                Vec::new(),
                format!("{} and {}", candidate.person_name, candidate.concept_name),
            ));
        }
        Ok(items)
    }
}

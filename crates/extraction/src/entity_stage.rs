//! `Person`/`Project`/`Consumable`/`Content`/`Event`/`Place` all extract
//! the same shape — a name, two summaries, and subtype-specific fields —
//! so they share one generic stage instead of six near-identical structs.
//! `Concept` alone gets a dedicated stage below because its prompt needs
//! a three-section context the others don't.

use std::sync::Arc;

use async_trait::async_trait;
use minerva_domain::chunk::Span;
use minerva_domain::{CurationItem, CurationPhase, Result};
use minerva_llm::{GenerationRequest, LlmGateway};
use serde::Deserialize;

use crate::context::ExtractionContext;
use crate::registry::StageId;
use crate::span::hydrate_span;
use crate::stage::Stage;

#[derive(Debug, Deserialize)]
struct RawEntityCandidate {
    name: String,
    short_summary: String,
    long_summary: String,
    #[serde(default)]
    mentions: Vec<String>,
    #[serde(flatten)]
    attributes: serde_json::Value,
}

#[derive(Debug, Deserialize, Default)]
struct RawEntityExtraction {
    #[serde(default)]
    candidates: Vec<RawEntityCandidate>,
}

pub struct GenericEntityStage {
    id: StageId,
    entity_label: &'static str,
    prompt_instruction: &'static str,
    llm: Arc<LlmGateway>,
    model: String,
}

impl GenericEntityStage {
    pub fn new(id: StageId, entity_label: &'static str, prompt_instruction: &'static str, llm: Arc<LlmGateway>, model: impl Into<String>) -> Self {
        Self { id, entity_label, prompt_instruction, llm, model: model.into() }
    }

    fn build_prompt(&self, narration: &str) -> String {
        format!(
            "{instruction}\n\nNarration:\n{narration}\n\n\
             Respond with JSON of the shape: {{\"candidates\": [{{\"name\": string, \
             \"short_summary\": string (<=30 words), \"long_summary\": string (<=100 words), \
             \"mentions\": [literal substrings of the narration naming this entity]}}]}}. \
             Omit the entity entirely rather than guessing at a field you are not confident about.",
            instruction = self.prompt_instruction,
        )
    }
}

#[async_trait]
impl Stage for GenericEntityStage {
    fn id(&self) -> StageId {
        self.id
    }

    async fn run(&self, ctx: &ExtractionContext<'_>) -> Result<Vec<CurationItem>> {
        let request = GenerationRequest::new(&self.model, self.build_prompt(ctx.narration)).with_schema_name(self.entity_label);
        let extraction: RawEntityExtraction = self.llm.generate_structured(&request).await?;
        Ok(candidates_to_items(ctx, self.id, extraction.candidates))
    }
}

fn candidates_to_items(ctx: &ExtractionContext<'_>, id: StageId, candidates: Vec<RawEntityCandidate>) -> Vec<CurationItem> {
    candidates
        .into_iter()
        .map(|candidate| {
            let spans: Vec<Span> = candidate.mentions.iter().filter_map(|m| hydrate_span(ctx.narration, m)).collect();
            let context = spans.first().map(|s| s.text.clone()).unwrap_or_else(|| candidate.name.clone());
            let payload = serde_json::json!({
                "name": candidate.name,
                "short_summary": candidate.short_summary,
                "long_summary": candidate.long_summary,
                "attributes": candidate.attributes,
            });
            CurationItem::new(ctx.journal.uuid, CurationPhase::Entity, id.curation_kind(), payload, spans, context)
        })
        .collect()
}

/// `Concept` extraction gets a three-section prompt: the narration, every
/// entity already extracted earlier in this pass (so a concept doesn't
/// duplicate a name already captured as a `Person`/`Project`/etc.), and
/// the concepts already known in the graph (so a recurring idea resolves
/// to the same node across journal entries instead of forking).
pub struct ConceptStage {
    llm: Arc<LlmGateway>,
    model: String,
}

impl ConceptStage {
    pub fn new(llm: Arc<LlmGateway>, model: impl Into<String>) -> Self {
        Self { llm, model: model.into() }
    }

    fn build_prompt(&self, ctx: &ExtractionContext<'_>) -> String {
        let prior_names: Vec<&str> = ctx.prior_entities.iter().map(|e| e.common.name.as_str()).collect();
        format!(
            "Extract abstract concepts (ideas, themes, practices — not people, places, or events) \
             mentioned in the narration below.\n\n\
             --- Narration ---\n{narration}\n\n\
             --- Already extracted this entry (do not re-extract these as concepts) ---\n{prior}\n\n\
             --- Known concepts already in the graph (reuse these names verbatim if the narration \
             refers to the same idea) ---\n{known}\n\n\
             Respond with JSON: {{\"candidates\": [{{\"name\": string, \"short_summary\": string, \
             \"long_summary\": string, \"mentions\": [literal substrings naming this concept]}}]}}",
            narration = ctx.narration,
            prior = if prior_names.is_empty() { "(none)".to_string() } else { prior_names.join(", ") },
            known = if ctx.known_concepts.is_empty() { "(none)".to_string() } else { ctx.known_concepts.join(", ") },
        )
    }
}

#[async_trait]
impl Stage for ConceptStage {
    fn id(&self) -> StageId {
        StageId::Concept
    }

    async fn run(&self, ctx: &ExtractionContext<'_>) -> Result<Vec<CurationItem>> {
        let request = GenerationRequest::new(&self.model, self.build_prompt(ctx)).with_schema_name("Concept");
        let extraction: RawEntityExtraction = self.llm.generate_structured(&request).await?;
        Ok(candidates_to_items(ctx, StageId::Concept, extraction.candidates))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minerva_domain::{Entity, EntityAttributes, EntityCommon, JournalEntry};

    fn journal() -> JournalEntry {
        JournalEntry::new(chrono::NaiveDate::from_ymd_opt(2026, 7, 28).unwrap(), "Texto de ejemplo.")
    }

    #[test]
    fn concept_prompt_includes_prior_entities_and_known_concepts() {
        let llm = Arc::new(LlmGateway::new(Arc::new(NoopProvider)));
        let stage = ConceptStage::new(llm, "test-model");
        let journal = journal();
        let prior = vec![Entity::new(EntityCommon::new("Ana", "s", "l"), EntityAttributes::Person { occupation: None })];
        let known = vec!["Minimalismo".to_string()];
        let ctx = ExtractionContext { journal: &journal, narration: &journal.raw_text, prior_entities: &prior, known_concepts: &known };
        let prompt = stage.build_prompt(&ctx);
        assert!(prompt.contains("Ana"));
        assert!(prompt.contains("Minimalismo"));
    }

    struct NoopProvider;

    #[async_trait::async_trait]
    impl minerva_llm::LlmProvider for NoopProvider {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
            Ok("{\"candidates\": []}".to_string())
        }
        async fn embed(&self, _model: &str, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn generic_stage_resolves_spans_and_emits_pending_items() {
        struct FakeProvider;
        #[async_trait::async_trait]
        impl minerva_llm::LlmProvider for FakeProvider {
            async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
                Ok(serde_json::json!({
                    "candidates": [{
                        "name": "Minerva",
                        "short_summary": "a personal project",
                        "long_summary": "a personal knowledge management project",
                        "mentions": ["Minerva"],
                        "status": "active"
                    }]
                })
                .to_string())
            }
            async fn embed(&self, _model: &str, _text: &str) -> Result<Vec<f32>> {
                Ok(vec![])
            }
        }

        let llm = Arc::new(LlmGateway::new(Arc::new(FakeProvider)));
        let stage = GenericEntityStage::new(StageId::Project, "Project", "Extract projects.", llm, "test-model");
        let journal = journal();
        let narration = "Trabaje en Minerva toda la tarde.".to_string();
        let ctx = ExtractionContext { journal: &journal, narration: &narration, prior_entities: &[], known_concepts: &[] };

        let items = stage.run(&ctx).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].spans.len(), 1);
        assert!(!items[0].status.is_terminal());
    }
}

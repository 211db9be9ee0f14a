//! Reconstructs domain objects (`Entity`, `Relation`, `ConceptRelation`,
//! `Mention`) from a decided [`CurationItem`]'s effective payload. This is
//! the boundary between the curation store's loosely-typed JSON and the
//! graph store's strongly-typed writes — validation failures here are
//! dropped rather than propagated, since a malformed payload should not
//! block the rest of `DB_WRITE` (the curator already approved it; a
//! reviewer inspecting the graph afterward is an acceptable fallback).

use std::collections::HashMap;

use chrono::NaiveDate;
use minerva_domain::chunk::{leaf_chunks_containing, Chunk};
use minerva_domain::relation::ConceptRelationType;
use minerva_domain::{ConceptRelation, CurationItem, CurationKind, Entity, EntityAttributes, EntityCommon, Mention, Relation};
use uuid::Uuid;

fn parse_uuid(value: &serde_json::Value) -> Option<Uuid> {
    value.as_str().and_then(|s| Uuid::parse_str(s).ok())
}

/// Build the [`Entity`] an approved/edited curation item describes, if its
/// kind carries one. `Relation` and `ConceptRelation` items don't — those
/// are handled by [`relation_from_item`]/[`concept_relation_from_item`].
pub fn entity_from_item(item: &CurationItem, journal_date: NaiveDate) -> Option<Entity> {
    let payload = item.effective_payload();
    match item.kind {
        CurationKind::Person
        | CurationKind::Place
        | CurationKind::Concept
        | CurationKind::Content
        | CurationKind::Consumable
        | CurationKind::Event
        | CurationKind::Project => entity_from_generic_payload(item.kind, item.id, payload, journal_date),
        CurationKind::FeelingEmotion => {
            let person_uuid = parse_uuid(payload.get("person_uuid")?)?;
            let emotion = payload.get("emotion")?.as_str()?.to_string();
            let felt_at = serde_json::from_value(payload.get("felt_at")?.clone()).ok()?;
            let mut common = EntityCommon::new(item.context.clone(), item.context.clone(), item.context.clone());
            common.uuid = item.id;
            Some(Entity::new(common, EntityAttributes::FeelingEmotion { person_uuid, emotion, felt_at }))
        }
        CurationKind::FeelingConcept => {
            let person_uuid = parse_uuid(payload.get("person_uuid")?)?;
            let concept_uuid = parse_uuid(payload.get("concept_uuid")?)?;
            let mut common = EntityCommon::new(item.context.clone(), item.context.clone(), item.context.clone());
            common.uuid = item.id;
            Some(Entity::new(common, EntityAttributes::FeelingConcept { person_uuid, concept_uuid }))
        }
        CurationKind::Relation | CurationKind::ConceptRelation => None,
    }
}

/// The seven entity-phase kinds share a payload shape: `{name,
/// short_summary, long_summary, attributes}`, where `attributes` is the
/// LLM candidate's subtype-specific fields with no `kind` discriminator.
/// Insert the discriminator (and any subtype field the candidate omitted
/// but the type requires) so `EntityAttributes`'s tagged representation
/// deserializes directly, rather than hand-writing one match arm per kind.
fn entity_from_generic_payload(kind: CurationKind, uuid: Uuid, payload: &serde_json::Value, journal_date: NaiveDate) -> Option<Entity> {
    let name = payload.get("name")?.as_str()?.to_string();
    let short_summary = payload.get("short_summary").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let long_summary = payload.get("long_summary").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let mut attributes_value = payload.get("attributes").cloned().unwrap_or_else(|| serde_json::json!({}));

    let kind_str = match kind {
        CurationKind::Person => "Person",
        CurationKind::Place => "Place",
        CurationKind::Concept => "Concept",
        CurationKind::Content => "Content",
        CurationKind::Consumable => "Consumable",
        CurationKind::Event => "Event",
        CurationKind::Project => "Project",
        _ => return None,
    };

    if let serde_json::Value::Object(map) = &mut attributes_value {
        map.entry("kind".to_string()).or_insert_with(|| serde_json::Value::String(kind_str.to_string()));
        match kind_str {
            "Event" => {
                map.entry("date".to_string()).or_insert_with(|| serde_json::Value::String(journal_date.to_string()));
            }
            "Content" => {
                map.entry("medium".to_string()).or_insert_with(|| serde_json::Value::String("unknown".to_string()));
            }
            "Project" => {
                map.entry("status".to_string()).or_insert_with(|| serde_json::Value::String("not-started".to_string()));
            }
            _ => {}
        }
    }

    let attributes: EntityAttributes = serde_json::from_value(attributes_value).ok()?;
    let mut common = EntityCommon::new(name, short_summary, long_summary);
    common.uuid = uuid;
    Some(Entity::new(common, attributes))
}

/// A free-text [`Relation`] from an approved/edited `Relation`-kind item.
/// `edge_uuid` is forced to `item.id` rather than `Relation::new`'s fresh
/// random one, so replaying this on a retried `DB_WRITE` reconstructs the
/// same edge identity and the graph's `MERGE`-free `create_full_relation`
/// stays idempotent.
pub fn relation_from_item(item: &CurationItem) -> Option<Relation> {
    let payload = item.effective_payload();
    let source_uuid = parse_uuid(payload.get("source_uuid")?)?;
    let target_uuid = parse_uuid(payload.get("target_uuid")?)?;
    let relation_type = payload.get("relation_type")?.as_str()?.to_string();
    let summary_short = payload.get("summary_short").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let mut relation = Relation::new(source_uuid, target_uuid, relation_type, summary_short);
    relation.edge_uuid = item.id;
    Some(relation)
}

pub fn concept_relation_from_item(item: &CurationItem) -> Option<ConceptRelation> {
    let payload = item.effective_payload();
    let source_uuid = parse_uuid(payload.get("source_uuid")?)?;
    let target_uuid = parse_uuid(payload.get("target_uuid")?)?;
    let relation_type = ConceptRelationType::from_str(payload.get("relation_type")?.as_str()?)?;
    Some(ConceptRelation::new(source_uuid, target_uuid, relation_type))
}

/// Every `(Chunk)-[:MENTIONS]->(item)` link implied by an item's resolved
/// spans, keyed by `item.id` (the same uuid the node or edge was built
/// with above).
pub fn mentions_for_item(item: &CurationItem, nodes: &HashMap<Uuid, Chunk>) -> Vec<Mention> {
    item.spans
        .iter()
        .flat_map(|span| leaf_chunks_containing(nodes, span).into_iter().map(|chunk| Mention { chunk_id: chunk.id, target_uuid: item.id }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use minerva_domain::{build_chunk_tree, CurationPhase, Span};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, 28).unwrap()
    }

    #[test]
    fn generic_payload_reconstructs_a_typed_entity() {
        let payload = serde_json::json!({
            "name": "Minerva",
            "short_summary": "a project",
            "long_summary": "a personal knowledge management project",
            "attributes": {"status": "active"},
        });
        let item = CurationItem::new(Uuid::new_v4(), CurationPhase::Entity, CurationKind::Project, payload, vec![], "ctx");
        let entity = entity_from_item(&item, day()).unwrap();
        assert_eq!(entity.common.name, "Minerva");
        assert_eq!(entity.type_name(), "Project");
        assert_eq!(entity.uuid(), item.id);
    }

    #[test]
    fn event_payload_defaults_its_date_to_the_journal_date_when_omitted() {
        let payload = serde_json::json!({
            "name": "Trip",
            "short_summary": "a trip",
            "long_summary": "a day trip",
            "attributes": {},
        });
        let item = CurationItem::new(Uuid::new_v4(), CurationPhase::Entity, CurationKind::Event, payload, vec![], "ctx");
        let entity = entity_from_item(&item, day()).unwrap();
        let EntityAttributes::Event { date, .. } = entity.attributes else {
            panic!("expected Event attributes");
        };
        assert_eq!(date, day());
    }

    #[test]
    fn edited_payload_wins_over_the_original() {
        let original = serde_json::json!({"name": "Ana", "short_summary": "s", "long_summary": "l", "attributes": {"occupation": null}});
        let mut item = CurationItem::new(Uuid::new_v4(), CurationPhase::Entity, CurationKind::Person, original, vec![], "ctx");
        item.edit(serde_json::json!({"name": "Ana Garcia", "short_summary": "s", "long_summary": "l", "attributes": {"occupation": null}}));
        let entity = entity_from_item(&item, day()).unwrap();
        assert_eq!(entity.common.name, "Ana Garcia");
    }

    #[test]
    fn relation_payload_reuses_the_item_id_as_the_edge_uuid() {
        let payload = serde_json::json!({
            "source_uuid": Uuid::new_v4(),
            "target_uuid": Uuid::new_v4(),
            "relation_type": "works with",
            "summary_short": "collaborated",
        });
        let item = CurationItem::new(Uuid::new_v4(), CurationPhase::Relation, CurationKind::Relation, payload, vec![], "ctx");
        let relation = relation_from_item(&item).unwrap();
        assert_eq!(relation.edge_uuid, item.id);
    }

    #[test]
    fn concept_relation_payload_parses_the_closed_enum() {
        let payload = serde_json::json!({
            "source_uuid": Uuid::new_v4(),
            "target_uuid": Uuid::new_v4(),
            "relation_type": "PART_OF",
        });
        let item = CurationItem::new(Uuid::new_v4(), CurationPhase::Relation, CurationKind::ConceptRelation, payload, vec![], "ctx");
        let relation = concept_relation_from_item(&item).unwrap();
        assert_eq!(relation.relation_type, ConceptRelationType::PartOf);
    }

    #[test]
    fn mentions_resolve_through_the_chunk_tree() {
        let journal_uuid = Uuid::new_v4();
        let text = "Trabaje con Ana hoy.";
        let (nodes, _roots) = build_chunk_tree(journal_uuid, text);
        let payload = serde_json::json!({"name": "Ana", "short_summary": "s", "long_summary": "l", "attributes": {}});
        let mut item = CurationItem::new(journal_uuid, CurationPhase::Entity, CurationKind::Person, payload, vec![Span::new(12, 15, "Ana")], "ctx");
        item.approve();
        let mentions = mentions_for_item(&item, &nodes);
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].target_uuid, item.id);
    }
}

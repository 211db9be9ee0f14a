use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use minerva_domain::{Chunk, ConceptRelation, Entity, Mention, PipelineError, Relation, Result};
use neo4rs::{Graph, Query};
use tracing::instrument;
use uuid::Uuid;

use crate::bolt::json_to_bolt;

/// The graph persistence surface the orchestrator's `DB_WRITE` stage and
/// the extraction stages write through. Every write here is idempotent on
/// `uuid` (`MERGE`, never a bare `CREATE`) so a retried or resumed
/// workflow never double-writes a node or edge.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn upsert_day(&self, date: NaiveDate) -> Result<()>;
    async fn link_journal_to_day(&self, journal_uuid: Uuid, date: NaiveDate) -> Result<()>;
    async fn upsert_entity(&self, entity: &Entity) -> Result<()>;
    async fn create_full_relation(&self, relation: &Relation) -> Result<()>;
    async fn update_relation(&self, relation: &Relation) -> Result<()>;
    async fn delete_relation(&self, edge_uuid: Uuid) -> Result<()>;
    async fn create_concept_relation(&self, relation: &ConceptRelation) -> Result<()>;
    async fn create_mentions_batch(&self, mentions: &[Mention]) -> Result<usize>;
    /// Persist every node of a journal's chunk tree, its `CONTAINS`/
    /// `NEXT_SIBLING` structure, and `(JournalEntry)-[:HAS_CHUNK]->(root)`
    /// for each top-level chunk. Must run before `create_mentions_batch`
    /// for the same journal, since mentions `MATCH` on an existing `Chunk`
    /// node rather than creating one.
    async fn create_chunks_batch(&self, journal_uuid: Uuid, nodes: &HashMap<Uuid, Chunk>, roots: &[Uuid]) -> Result<()>;
}

pub struct Neo4jGraphStore {
    graph: Graph,
}

impl Neo4jGraphStore {
    pub async fn connect(uri: &str, user: &str, password: &str) -> Result<Self> {
        let graph = Graph::new(uri, user, password)
            .await
            .map_err(|e| PipelineError::transport(format!("connecting to {uri}: {e}")))?;
        Ok(Self { graph })
    }
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    #[instrument(skip(self))]
    async fn upsert_day(&self, date: NaiveDate) -> Result<()> {
        let query = Query::new("MERGE (d:Day {date: $date})".to_string()).param("date", date.to_string());
        self.graph.run(query).await.map_err(|e| PipelineError::transport(e.to_string()))
    }

    #[instrument(skip(self))]
    async fn link_journal_to_day(&self, journal_uuid: Uuid, date: NaiveDate) -> Result<()> {
        let query = Query::new(
            "MATCH (d:Day {date: $date}) \
             MERGE (j:JournalEntry {uuid: $journal_uuid}) \
             MERGE (j)-[:ON_DAY]->(d)"
                .to_string(),
        )
        .param("date", date.to_string())
        .param("journal_uuid", journal_uuid.to_string());
        self.graph.run(query).await.map_err(|e| PipelineError::transport(e.to_string()))
    }

    /// `MERGE` on `uuid` under the label named by the entity's
    /// discriminator, then `SET n += $props` with every common and
    /// subtype-specific field flattened into one map. Cypher can't
    /// parameterize a node label, so the label is interpolated directly —
    /// safe here since it always comes from the closed
    /// [`minerva_domain::EntityAttributes::type_name`] set, never user text.
    #[instrument(skip(self, entity), fields(entity_type = entity.type_name()))]
    async fn upsert_entity(&self, entity: &Entity) -> Result<()> {
        let label = entity.type_name();
        let mut props = serde_json::to_value(&entity.attributes).map_err(|e| PipelineError::schema(e.to_string()))?;
        if let serde_json::Value::Object(map) = &mut props {
            map.remove("kind");
            map.insert("uuid".into(), serde_json::Value::String(entity.uuid().to_string()));
            map.insert("name".into(), serde_json::Value::String(entity.common.name.clone()));
            map.insert("short_summary".into(), serde_json::Value::String(entity.common.short_summary.clone()));
            map.insert("long_summary".into(), serde_json::Value::String(entity.common.long_summary.clone()));
            map.insert("created_at".into(), serde_json::Value::String(entity.common.created_at.to_rfc3339()));
        }

        let cypher = format!("MERGE (n:{label} {{uuid: $uuid}}) SET n += $props");
        let query = Query::new(cypher).param("uuid", entity.uuid().to_string()).param("props", json_to_bolt(&props));
        self.graph.run(query).await.map_err(|e| PipelineError::transport(e.to_string()))
    }

    /// Mirrors `create_full_relationship`: a direct `RELATED_TO` edge for
    /// traversal plus a reified `Relation` node linked from both
    /// endpoints via `HAS_RELATION`, sharing `edge_uuid`.
    #[instrument(skip(self, relation))]
    async fn create_full_relation(&self, relation: &Relation) -> Result<()> {
        let cypher = "
            MATCH (source {uuid: $source_uuid})
            MATCH (target {uuid: $target_uuid})
            CREATE (source)-[edge:RELATED_TO {
                uuid: $edge_uuid,
                type: $relation_type,
                summary_short: $summary_short,
                created_at: $created_at
            }]->(target)
            CREATE (r:Relation {
                uuid: $edge_uuid,
                edge_uuid: $edge_uuid,
                type: $relation_type,
                summary_short: $summary_short,
                created_at: $created_at
            })
            CREATE (source)-[:HAS_RELATION]->(r)
            CREATE (target)-[:HAS_RELATION]->(r)
        "
        .to_string();

        let query = Query::new(cypher)
            .param("source_uuid", relation.source_uuid.to_string())
            .param("target_uuid", relation.target_uuid.to_string())
            .param("edge_uuid", relation.edge_uuid.to_string())
            .param("relation_type", relation.relation_type.clone())
            .param("summary_short", relation.summary_short.clone())
            .param("created_at", relation.created_at.to_rfc3339());

        self.graph.run(query).await.map_err(|e| PipelineError::transport(e.to_string()))
    }

    /// `SET r += $updates` on the reified node, then mirror `type` and
    /// `summary_short` onto the direct edge found via the stored
    /// `edge_uuid` — never the node's own identity, per
    /// `update_relationship`'s edge/node sync.
    #[instrument(skip(self, relation))]
    async fn update_relation(&self, relation: &Relation) -> Result<()> {
        let cypher = "
            MATCH (r:Relation {uuid: $edge_uuid})
            SET r.type = $relation_type, r.summary_short = $summary_short, r.updated_at = $updated_at
            WITH r
            OPTIONAL MATCH ()-[edge:RELATED_TO {uuid: r.edge_uuid}]->()
            SET edge.type = $relation_type, edge.summary_short = $summary_short, edge.updated_at = $updated_at
        "
        .to_string();

        let query = Query::new(cypher)
            .param("edge_uuid", relation.edge_uuid.to_string())
            .param("relation_type", relation.relation_type.clone())
            .param("summary_short", relation.summary_short.clone())
            .param("updated_at", relation.updated_at.to_rfc3339());

        self.graph.run(query).await.map_err(|e| PipelineError::transport(e.to_string()))
    }

    /// Deletes the direct edge via the node's stored `edge_uuid`, then
    /// detaches and deletes the reified node — mirrors
    /// `delete_full_relationship`.
    #[instrument(skip(self))]
    async fn delete_relation(&self, edge_uuid: Uuid) -> Result<()> {
        let cypher = "
            MATCH (r:Relation {uuid: $edge_uuid})
            OPTIONAL MATCH ()-[edge:RELATED_TO {uuid: r.edge_uuid}]->()
            DELETE edge
            DETACH DELETE r
        "
        .to_string();
        let query = Query::new(cypher).param("edge_uuid", edge_uuid.to_string());
        self.graph.run(query).await.map_err(|e| PipelineError::transport(e.to_string()))
    }

    /// `ConceptRelation` is never reified: its type is a closed enum, so
    /// the relationship type itself is the data. The type name is
    /// interpolated into the Cypher (labels/rel-types can't be bound
    /// parameters) but is always one of
    /// [`minerva_domain::ConceptRelationType::as_str`]'s fixed outputs.
    #[instrument(skip(self, relation))]
    async fn create_concept_relation(&self, relation: &ConceptRelation) -> Result<()> {
        let rel_type = relation.relation_type.as_str();
        let cypher = format!(
            "MATCH (source:Concept {{uuid: $source_uuid}}) \
             MATCH (target:Concept {{uuid: $target_uuid}}) \
             MERGE (source)-[:{rel_type}]->(target)"
        );
        let query = Query::new(cypher)
            .param("source_uuid", relation.source_uuid.to_string())
            .param("target_uuid", relation.target_uuid.to_string());
        self.graph.run(query).await.map_err(|e| PipelineError::transport(e.to_string()))
    }

    /// Batched `UNWIND` + `MERGE`, mirroring `create_mentions_batch`.
    #[instrument(skip(self, mentions))]
    async fn create_mentions_batch(&self, mentions: &[Mention]) -> Result<usize> {
        if mentions.is_empty() {
            return Ok(0);
        }
        let items: Vec<serde_json::Value> = mentions
            .iter()
            .map(|m| serde_json::json!({"chunk_uuid": m.chunk_id.to_string(), "node_uuid": m.target_uuid.to_string()}))
            .collect();

        let cypher = "
            UNWIND $mentions as mention
            MATCH (c:Chunk {uuid: mention.chunk_uuid})
            MATCH (n {uuid: mention.node_uuid})
            MERGE (c)-[:MENTIONS]->(n)
        "
        .to_string();
        let query = Query::new(cypher).param("mentions", json_to_bolt(&serde_json::Value::Array(items)));
        self.graph.run(query).await.map_err(|e| PipelineError::transport(e.to_string()))?;
        Ok(mentions.len())
    }

    /// Three batched `UNWIND` passes: nodes, `CONTAINS` edges (parent to
    /// child), `NEXT_SIBLING` edges, then the journal's `HAS_CHUNK` links
    /// to its root chunks. Chunk ids are deterministic
    /// (`minerva_domain::chunk`'s `(journal_uuid, start, end)` seed), so
    /// this is safe to re-run against an already-written tree.
    #[instrument(skip(self, nodes, roots))]
    async fn create_chunks_batch(&self, journal_uuid: Uuid, nodes: &HashMap<Uuid, Chunk>, roots: &[Uuid]) -> Result<()> {
        if nodes.is_empty() {
            return Ok(());
        }

        let node_items: Vec<serde_json::Value> = nodes
            .values()
            .map(|c| serde_json::json!({"uuid": c.id.to_string(), "start": c.start, "end": c.end}))
            .collect();
        let create_nodes = Query::new(
            "UNWIND $nodes as n MERGE (c:Chunk {uuid: n.uuid}) SET c.start = n.start, c.end = n.end".to_string(),
        )
        .param("nodes", json_to_bolt(&serde_json::Value::Array(node_items)));
        self.graph.run(create_nodes).await.map_err(|e| PipelineError::transport(e.to_string()))?;

        let contains_items: Vec<serde_json::Value> = nodes
            .values()
            .flat_map(|c| c.children.iter().map(move |child| serde_json::json!({"parent": c.id.to_string(), "child": child.to_string()})))
            .collect();
        if !contains_items.is_empty() {
            let link_contains = Query::new(
                "UNWIND $edges as e \
                 MATCH (parent:Chunk {uuid: e.parent}) \
                 MATCH (child:Chunk {uuid: e.child}) \
                 MERGE (parent)-[:CONTAINS]->(child)"
                    .to_string(),
            )
            .param("edges", json_to_bolt(&serde_json::Value::Array(contains_items)));
            self.graph.run(link_contains).await.map_err(|e| PipelineError::transport(e.to_string()))?;
        }

        let sibling_items: Vec<serde_json::Value> = nodes
            .values()
            .filter_map(|c| c.next_sibling.map(|next| serde_json::json!({"a": c.id.to_string(), "b": next.to_string()})))
            .collect();
        if !sibling_items.is_empty() {
            let link_siblings = Query::new(
                "UNWIND $edges as e \
                 MATCH (a:Chunk {uuid: e.a}) \
                 MATCH (b:Chunk {uuid: e.b}) \
                 MERGE (a)-[:NEXT_SIBLING]->(b)"
                    .to_string(),
            )
            .param("edges", json_to_bolt(&serde_json::Value::Array(sibling_items)));
            self.graph.run(link_siblings).await.map_err(|e| PipelineError::transport(e.to_string()))?;
        }

        let root_items: Vec<serde_json::Value> = roots.iter().map(|r| serde_json::json!({"root": r.to_string()})).collect();
        let link_roots = Query::new(
            "UNWIND $edges as e \
             MATCH (j:JournalEntry {uuid: $journal_uuid}) \
             MATCH (root:Chunk {uuid: e.root}) \
             MERGE (j)-[:HAS_CHUNK]->(root)"
                .to_string(),
        )
        .param("journal_uuid", journal_uuid.to_string())
        .param("edges", json_to_bolt(&serde_json::Value::Array(root_items)));
        self.graph.run(link_roots).await.map_err(|e| PipelineError::transport(e.to_string()))?;

        Ok(())
    }
}

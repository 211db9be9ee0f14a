//! Graph persistence: a `GraphStore` trait over `neo4rs`, idempotent on
//! every write so the orchestrator's `DB_WRITE` stage can safely retry or
//! resume after a crash.

pub mod bolt;
pub mod store;

pub use store::{GraphStore, Neo4jGraphStore};

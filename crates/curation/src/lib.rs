//! Durable, redb-backed curation queue sitting between extraction and the
//! graph write-back, gating the orchestrator's `WAIT_*_CURATION` states on
//! every item of a phase reaching a terminal decision.

pub mod store;

pub use store::CurationStore;

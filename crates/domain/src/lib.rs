//! Shared data model for the Minerva extraction pipeline: entities, the
//! lexical chunk tree, relations, curation items, journal entries, and the
//! durable pipeline state. Every other crate in this workspace builds on
//! these types.

pub mod chunk;
pub mod curation;
pub mod entity;
pub mod error;
pub mod journal;
pub mod pipeline_state;
pub mod relation;

pub use chunk::{build_chunk_tree, leaf_chunks_containing, segment_sentences, Chunk, Span};
pub use curation::{CurationItem, CurationKind, CurationPhase, CurationStatus};
pub use entity::{is_known_emotion, Entity, EntityAttributes, EntityCommon, Partition, ProjectStatus, EMOTION_ENUM};
pub use error::{PipelineError, Result};
pub use journal::{JournalEntry, JournalValidationError};
pub use pipeline_state::{PipelineState, Stage};
pub use relation::{ConceptRelation, ConceptRelationType, Mention, Relation};

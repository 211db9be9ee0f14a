//! Tagged binary envelope for every domain type that crosses a suspension
//! boundary (a workflow checkpoint write, a curation-store value). Each
//! payload is wrapped with a string discriminator naming its type; decode
//! fails closed when the discriminator is unrecognized or doesn't match
//! what the caller expected, rather than attempting a best-effort parse.

use minerva_domain::{PipelineError, Result};
use serde::{de::DeserializeOwned, Serialize};

const BINCODE_CONFIG: bincode::config::Configuration = bincode::config::standard();

/// One entry per domain type persisted across a suspension boundary.
/// Adding a new persisted type means adding a variant here; removing one
/// is a breaking change to anything already checkpointed on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadTag {
    JournalEntry,
    Entity,
    Chunk,
    Relation,
    ConceptRelation,
    CurationItem,
    PipelineState,
}

impl PayloadTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::JournalEntry => "JournalEntry",
            Self::Entity => "Entity",
            Self::Chunk => "Chunk",
            Self::Relation => "Relation",
            Self::ConceptRelation => "ConceptRelation",
            Self::CurationItem => "CurationItem",
            Self::PipelineState => "PipelineState",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "JournalEntry" => Self::JournalEntry,
            "Entity" => Self::Entity,
            "Chunk" => Self::Chunk,
            "Relation" => Self::Relation,
            "ConceptRelation" => Self::ConceptRelation,
            "CurationItem" => Self::CurationItem,
            "PipelineState" => Self::PipelineState,
            _ => return None,
        })
    }
}

#[derive(Serialize, serde::Deserialize)]
struct RawEnvelope {
    tag: String,
    bytes: Vec<u8>,
}

/// Encode `value` tagged as `tag` into a binary envelope.
pub fn encode<T: Serialize>(tag: PayloadTag, value: &T) -> Result<Vec<u8>> {
    let inner = bincode::serde::encode_to_vec(value, BINCODE_CONFIG).map_err(|e| PipelineError::schema(e.to_string()))?;
    let envelope = RawEnvelope { tag: tag.as_str().to_string(), bytes: inner };
    bincode::serde::encode_to_vec(&envelope, BINCODE_CONFIG).map_err(|e| PipelineError::schema(e.to_string()))
}

/// Decode an envelope, requiring its discriminator to equal `expected`.
/// A discriminator the caller doesn't recognize (a future type written by
/// a newer build) or one that doesn't match `expected` is a
/// [`PipelineError::UnknownDiscriminant`], never a silent fallback to a
/// default value.
pub fn decode<T: DeserializeOwned>(expected: PayloadTag, bytes: &[u8]) -> Result<T> {
    let (envelope, _): (RawEnvelope, usize) =
        bincode::serde::decode_from_slice(bytes, BINCODE_CONFIG).map_err(|e| PipelineError::schema(e.to_string()))?;

    let tag = PayloadTag::from_str(&envelope.tag).ok_or_else(|| PipelineError::UnknownDiscriminant(envelope.tag.clone()))?;
    if tag != expected {
        return Err(PipelineError::UnknownDiscriminant(format!(
            "expected {} envelope, found {}",
            expected.as_str(),
            tag.as_str()
        )));
    }

    let (value, _): (T, usize) =
        bincode::serde::decode_from_slice(&envelope.bytes, BINCODE_CONFIG).map_err(|e| PipelineError::schema(e.to_string()))?;
    Ok(value)
}

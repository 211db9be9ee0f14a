use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Partition tag every node carries. Declared at creation, immutable
/// thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Partition {
    Domain,
    Lexical,
    Temporal,
}

/// `Project.status` enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectStatus {
    NotStarted,
    Active,
    OnHold,
    Completed,
    Cancelled,
}

/// Fields shared by every entity variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityCommon {
    pub uuid: Uuid,
    pub name: String,
    /// Descriptive summary, <=30 words.
    pub short_summary: String,
    /// Descriptive summary, <=100 words.
    pub long_summary: String,
    pub created_at: DateTime<Utc>,
    pub embedding: Option<Vec<f32>>,
    pub partition: Partition,
}

impl EntityCommon {
    pub fn new(name: impl Into<String>, short_summary: impl Into<String>, long_summary: impl Into<String>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            name: name.into(),
            short_summary: short_summary.into(),
            long_summary: long_summary.into(),
            created_at: Utc::now(),
            embedding: None,
            partition: Partition::Domain,
        }
    }

    /// Whether `short_summary`/`long_summary` respect the word-count caps.
    /// Extraction stages call this before enqueuing a mapping for curation;
    /// violations are not a hard error but should be logged by the caller.
    pub fn within_summary_limits(&self) -> bool {
        word_count(&self.short_summary) <= 30 && word_count(&self.long_summary) <= 100
    }
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Subtype-specific attributes, one variant per entity kind.
///
/// `Emotion` models the emotion *type* (e.g. "joy"); `FeelingEmotion` is an
/// instance of a person feeling that emotion at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum EntityAttributes {
    Person { occupation: Option<String> },
    Place { address: Option<String> },
    Concept,
    Content { medium: String, author: Option<String> },
    Consumable { category: Option<String> },
    Event {
        date: NaiveDate,
        duration_minutes: Option<u32>,
        location: Option<String>,
    },
    Project { status: ProjectStatus },
    Emotion,
    FeelingEmotion {
        person_uuid: Uuid,
        emotion: String,
        felt_at: DateTime<Utc>,
    },
    FeelingConcept {
        person_uuid: Uuid,
        concept_uuid: Uuid,
    },
}

impl EntityAttributes {
    /// The discriminator string used in serialized form and in the graph
    /// store's node label.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Person { .. } => "Person",
            Self::Place { .. } => "Place",
            Self::Concept => "Concept",
            Self::Content { .. } => "Content",
            Self::Consumable { .. } => "Consumable",
            Self::Event { .. } => "Event",
            Self::Project { .. } => "Project",
            Self::Emotion => "Emotion",
            Self::FeelingEmotion { .. } => "FeelingEmotion",
            Self::FeelingConcept { .. } => "FeelingConcept",
        }
    }
}

/// A polymorphic entity: shared fields plus one variant of subtype data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub common: EntityCommon,
    pub attributes: EntityAttributes,
}

impl Entity {
    pub fn new(common: EntityCommon, attributes: EntityAttributes) -> Self {
        Self { common, attributes }
    }

    pub fn uuid(&self) -> Uuid {
        self.common.uuid
    }

    pub fn type_name(&self) -> &'static str {
        self.attributes.type_name()
    }
}

/// Closed enumeration of named emotions an `Emotion`/`FeelingEmotion` may
/// reference.
pub const EMOTION_ENUM: &[&str] = &[
    "joy", "sadness", "anger", "fear", "disgust", "surprise", "trust", "anticipation",
    "anxiety", "contentment", "pride", "shame", "guilt", "gratitude", "love", "loneliness",
    "frustration", "relief", "hope", "boredom",
];

pub fn is_known_emotion(name: &str) -> bool {
    EMOTION_ENUM.iter().any(|e| e.eq_ignore_ascii_case(name))
}

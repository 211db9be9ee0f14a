use std::fmt;

/// Maximum length of a [`PipelineError`] message before it is truncated,
/// so a checkpointed error never blows past the state's own size limits.
const MAX_MESSAGE_LEN: usize = 500;

/// Structured error kind for every fallible operation in the pipeline.
///
/// The orchestrator matches on [`PipelineError::kind`] to decide whether a
/// failure is retryable (`Transport`, `Schema`, `Budget`) or terminal
/// (`Consistency`, `Cancelled`, `DeadlineExceeded`, `Config`).
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("schema validation failed: {0}")]
    Schema(String),
    #[error("budget exhausted: {0}")]
    Budget(String),
    #[error("consistency violation: {0}")]
    Consistency(String),
    #[error("cancelled")]
    Cancelled,
    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("unknown discriminant: {0}")]
    UnknownDiscriminant(String),
}

impl PipelineError {
    pub fn transport(msg: impl fmt::Display) -> Self {
        Self::Transport(truncate(&msg.to_string()))
    }
    pub fn schema(msg: impl fmt::Display) -> Self {
        Self::Schema(truncate(&msg.to_string()))
    }
    pub fn budget(msg: impl fmt::Display) -> Self {
        Self::Budget(truncate(&msg.to_string()))
    }
    pub fn consistency(msg: impl fmt::Display) -> Self {
        Self::Consistency(truncate(&msg.to_string()))
    }
    pub fn deadline_exceeded(msg: impl fmt::Display) -> Self {
        Self::DeadlineExceeded(truncate(&msg.to_string()))
    }
    pub fn config(msg: impl fmt::Display) -> Self {
        Self::Config(truncate(&msg.to_string()))
    }

    /// Whether the orchestrator should retry the owning state on this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Schema(_) | Self::Budget(_))
    }

    /// Short machine-readable kind label, used in the status query.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "Transport",
            Self::Schema(_) => "Schema",
            Self::Budget(_) => "Budget",
            Self::Consistency(_) => "Consistency",
            Self::Cancelled => "Cancelled",
            Self::DeadlineExceeded(_) => "DeadlineExceeded",
            Self::Config(_) => "Config",
            Self::UnknownDiscriminant(_) => "UnknownDiscriminant",
        }
    }
}

fn truncate(msg: &str) -> String {
    if msg.chars().count() <= MAX_MESSAGE_LEN {
        return msg.to_string();
    }
    let truncated: String = msg.chars().take(MAX_MESSAGE_LEN).collect();
    format!("{truncated}…")
}

pub type Result<T> = std::result::Result<T, PipelineError>;

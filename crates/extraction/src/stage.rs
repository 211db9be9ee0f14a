use async_trait::async_trait;
use minerva_domain::{CurationItem, Result};

use crate::context::ExtractionContext;
use crate::registry::StageId;

/// One unit of the extraction pipeline: given the journal's narration and
/// whatever context earlier stages produced, emit zero or more curation
/// items. A stage never writes to the graph directly — only
/// [`minerva_curation::CurationStore`], via whatever orchestrates the
/// registry.
#[async_trait]
pub trait Stage: Send + Sync {
    fn id(&self) -> StageId;
    async fn run(&self, ctx: &ExtractionContext<'_>) -> Result<Vec<CurationItem>>;
}

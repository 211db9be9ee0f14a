use minerva_domain::{Entity, JournalEntry};

/// Everything one extraction stage needs to build a prompt and resolve
/// spans. `prior_entities` holds every candidate extracted so far *in this
/// run* (not yet human-curated) so later stages can cross-reference
/// earlier ones — e.g. the `Concept` stage skips a name already extracted
/// as a `Person` in the same pass.
pub struct ExtractionContext<'a> {
    pub journal: &'a JournalEntry,
    pub narration: &'a str,
    pub prior_entities: &'a [Entity],
    /// Names of concepts already known in the graph/vault, used to steer
    /// the model away from minting duplicate concepts for the same idea
    /// under a slightly different name.
    pub known_concepts: &'a [String],
}

impl<'a> ExtractionContext<'a> {
    pub fn find_prior_by_name(&self, name: &str) -> Option<&Entity> {
        self.prior_entities.iter().find(|e| e.common.name.eq_ignore_ascii_case(name))
    }
}

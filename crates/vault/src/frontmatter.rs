//! YAML frontmatter for entity notes, with a fixed set of key names so
//! notes written by this pipeline stay readable by other tooling pointed
//! at the same vault.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const ENTITY_ID_KEY: &str = "entity_id";
pub const ENTITY_TYPE_KEY: &str = "entity_type";
pub const SHORT_SUMMARY_KEY: &str = "short_summary";
pub const SUMMARY_KEY: &str = "summary";
pub const ALIASES_KEY: &str = "aliases";
pub const CONCEPT_RELATIONS_KEY: &str = "concept_relations";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frontmatter {
    #[serde(rename = "entity_id")]
    pub entity_id: Uuid,
    #[serde(rename = "entity_type")]
    pub entity_type: String,
    #[serde(rename = "short_summary")]
    pub short_summary: String,
    #[serde(rename = "summary")]
    pub summary: String,
    #[serde(rename = "aliases", default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    #[serde(rename = "concept_relations", default, skip_serializing_if = "Vec::is_empty")]
    pub concept_relations: Vec<String>,
}

const DELIMITER: &str = "---";

/// Split a note's raw text into `(frontmatter, body)`. Returns `None` if
/// the file has no `---`-delimited frontmatter block at all, in which
/// case the caller should treat the whole file as body and synthesize
/// fresh frontmatter.
pub fn parse(raw: &str) -> Option<(Frontmatter, String)> {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let rest = raw.strip_prefix(DELIMITER)?;
    let rest = rest.strip_prefix('\n').unwrap_or(rest);
    let end = rest.find("\n---")?;
    let yaml = &rest[..end];
    let after = &rest[end + 4..];
    let body = after.strip_prefix('\n').unwrap_or(after);

    let frontmatter: Frontmatter = serde_yaml::from_str(yaml).ok()?;
    Some((frontmatter, body.to_string()))
}

/// Render `frontmatter` and `body` back into a full note file.
pub fn render(frontmatter: &Frontmatter, body: &str) -> String {
    let yaml = serde_yaml::to_string(frontmatter).expect("Frontmatter always serializes");
    format!("{DELIMITER}\n{yaml}{DELIMITER}\n\n{body}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Frontmatter {
        Frontmatter {
            entity_id: Uuid::nil(),
            entity_type: "Person".to_string(),
            short_summary: "a person".to_string(),
            summary: "a longer summary".to_string(),
            aliases: vec!["Ana".to_string()],
            concept_relations: vec![],
        }
    }

    #[test]
    fn renders_and_reparses_to_the_same_frontmatter() {
        let fm = sample();
        let rendered = render(&fm, "Body text here.");
        let (parsed, body) = parse(&rendered).unwrap();
        assert_eq!(parsed, fm);
        assert_eq!(body.trim(), "Body text here.");
    }

    #[test]
    fn missing_frontmatter_block_returns_none() {
        assert!(parse("Just a plain note, no frontmatter.").is_none());
    }

    #[test]
    fn uses_exact_key_names_from_the_original_schema() {
        let fm = sample();
        let yaml = serde_yaml::to_string(&fm).unwrap();
        for key in [ENTITY_ID_KEY, ENTITY_TYPE_KEY, SHORT_SUMMARY_KEY, SUMMARY_KEY, ALIASES_KEY] {
            assert!(yaml.contains(key), "missing key {key} in rendered frontmatter");
        }
    }

    #[test]
    fn empty_concept_relations_are_omitted_not_written_as_empty_list() {
        let fm = sample();
        let yaml = serde_yaml::to_string(&fm).unwrap();
        assert!(!yaml.contains(CONCEPT_RELATIONS_KEY));
    }
}

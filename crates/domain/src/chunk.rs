use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A `{start, end, text}` pointer into source narration. `end` is exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl Span {
    pub fn new(start: usize, end: usize, text: impl Into<String>) -> Self {
        Self { start, end, text: text.into() }
    }

    pub fn contains(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

/// A node in the hierarchical lexical chunk tree. Leaf chunks cover
/// sentence spans; interior chunks cover contiguous runs of children,
/// built pairwise bottom-up; a singleton leftover at any level is promoted
/// rather than wrapped in a one-child parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: Uuid,
    pub start: usize,
    pub end: usize,
    pub children: Vec<Uuid>,
    pub parent: Option<Uuid>,
    pub prev_sibling: Option<Uuid>,
    pub next_sibling: Option<Uuid>,
}

/// Namespace for chunk UUIDs: a chunk's id is derived from
/// `(journal_uuid, start, end)` rather than drawn at
/// random, so rebuilding the tree for the same journal on a retried or
/// resumed `DB_WRITE` reproduces the exact same node ids and the graph's
/// `MERGE`-based writes stay a no-op on replay.
const CHUNK_NAMESPACE: Uuid = Uuid::from_bytes([
    0x6d, 0x69, 0x6e, 0x65, 0x72, 0x76, 0x61, 0x2d, 0x63, 0x68, 0x75, 0x6e, 0x6b, 0x2d, 0x6e, 0x73,
]);

fn chunk_id(journal_uuid: Uuid, start: usize, end: usize) -> Uuid {
    Uuid::new_v5(&CHUNK_NAMESPACE, format!("{journal_uuid}:{start}:{end}").as_bytes())
}

impl Chunk {
    fn leaf(journal_uuid: Uuid, start: usize, end: usize) -> Self {
        Self {
            id: chunk_id(journal_uuid, start, end),
            start,
            end,
            children: Vec::new(),
            parent: None,
            prev_sibling: None,
            next_sibling: None,
        }
    }

    pub fn span_of<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start..self.end]
    }
}

/// Split `text` into sentence spans.
///
/// The original implementation this was distilled from used a Spanish NLP
/// tokenizer (`stanza`) for sentence boundaries; no example repo in this
/// workspace carries an NLP sentence-segmentation crate, so this is a
/// punctuation-driven heuristic: a boundary falls after `.`, `!`, `?`, or
/// `…` that is followed by whitespace and then an uppercase letter or EOF.
/// Ellipsis (`...`) and abbreviation periods followed by a lowercase letter
/// do not split.
pub fn segment_sentences(text: &str) -> Vec<Span> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut start = 0usize;
    let chars: Vec<(usize, char)> = text.char_indices().collect();

    let mut i = 0;
    while i < chars.len() {
        let (byte_idx, ch) = chars[i];
        if matches!(ch, '.' | '!' | '?' | '…') {
            // Don't split mid-ellipsis.
            let is_ellipsis_run = ch == '.' && i + 1 < chars.len() && chars[i + 1].1 == '.';
            if !is_ellipsis_run {
                let end_byte = byte_idx + ch.len_utf8();
                let rest = &text[end_byte..];
                let trimmed = rest.trim_start();
                let boundary = trimmed.is_empty()
                    || trimmed.chars().next().map(|c| c.is_uppercase() || c.is_ascii_digit()).unwrap_or(false);
                if boundary && end_byte > start {
                    let sentence = text[start..end_byte].trim();
                    if !sentence.is_empty() {
                        let trim_start_offset = text[start..end_byte].find(sentence).unwrap_or(0);
                        let s = start + trim_start_offset;
                        spans.push(Span::new(s, s + sentence.len(), sentence));
                    }
                    start = end_byte;
                }
            }
        }
        i += 1;
    }

    if start < bytes.len() {
        let tail = text[start..].trim();
        if !tail.is_empty() {
            let offset = text[start..].find(tail).unwrap_or(0);
            let s = start + offset;
            spans.push(Span::new(s, s + tail.len(), tail));
        }
    }

    spans
}

/// Build the chunk tree over `text`: sentence leaves, paired bottom-up into
/// interior nodes, singleton leftovers promoted (never wrapped in a
/// one-child parent). Returns every node keyed by UUID plus the top-level
/// (root-level, possibly plural if promotion left more than one) node ids
/// in left-to-right order.
pub fn build_chunk_tree(journal_uuid: Uuid, text: &str) -> (HashMap<Uuid, Chunk>, Vec<Uuid>) {
    let sentence_spans = segment_sentences(text);
    let mut nodes: HashMap<Uuid, Chunk> = HashMap::new();
    let mut leaves: Vec<Uuid> = Vec::new();

    for span in &sentence_spans {
        let node = Chunk::leaf(journal_uuid, span.start, span.end);
        let id = node.id;
        nodes.insert(id, node);
        leaves.push(id);
    }

    annotate_siblings(&mut nodes, &leaves);

    let mut current_level = leaves;
    while current_level.len() > 1 {
        let mut next_level = Vec::new();
        let mut i = 0;
        while i < current_level.len() {
            let left_id = current_level[i];
            let right_id = current_level.get(i + 1).copied();
            match right_id {
                None => {
                    // Promote the leftover; do not wrap in a single-child parent.
                    next_level.push(left_id);
                    i += 1;
                }
                Some(right_id) => {
                    let (left_start, right_end) = {
                        let left = &nodes[&left_id];
                        let right = &nodes[&right_id];
                        (left.start, right.end)
                    };
                    let mut parent = Chunk::leaf(journal_uuid, left_start, right_end);
                    parent.children = vec![left_id, right_id];
                    let parent_id = parent.id;
                    nodes.insert(parent_id, parent);

                    nodes.get_mut(&left_id).unwrap().parent = Some(parent_id);
                    nodes.get_mut(&right_id).unwrap().parent = Some(parent_id);

                    next_level.push(parent_id);
                    i += 2;
                }
            }
        }
        annotate_siblings(&mut nodes, &next_level);
        current_level = next_level;
    }

    (nodes, current_level)
}

fn annotate_siblings(nodes: &mut HashMap<Uuid, Chunk>, level: &[Uuid]) {
    for (i, id) in level.iter().enumerate() {
        let prev = if i > 0 { Some(level[i - 1]) } else { None };
        let next = if i + 1 < level.len() { Some(level[i + 1]) } else { None };
        let node = nodes.get_mut(id).unwrap();
        node.prev_sibling = prev;
        node.next_sibling = next;
    }
}

/// Locate every leaf chunk whose span fully contains `span` (used to wire
/// `(Chunk)-[:MENTIONS]->(Entity|Relation)` from extracted spans).
pub fn leaf_chunks_containing<'a>(nodes: &'a HashMap<Uuid, Chunk>, span: &Span) -> Vec<&'a Chunk> {
    nodes
        .values()
        .filter(|c| c.children.is_empty() && c.start <= span.start && span.end <= c.end)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jid() -> Uuid {
        Uuid::new_v4()
    }

    #[test]
    fn segments_simple_sentences() {
        let text = "Hoy trabajé en Minerva todo el día. Fue un día largo. ¿Y tú?";
        let spans = segment_sentences(text);
        assert_eq!(spans.len(), 3);
        assert!(spans[0].text.starts_with("Hoy"));
        assert!(spans[1].text.starts_with("Fue"));
    }

    #[test]
    fn single_sentence_produces_one_leaf_and_no_promotion_artifact() {
        let text = "Solo una oración.";
        let (nodes, roots) = build_chunk_tree(jid(), text);
        assert_eq!(nodes.len(), 1);
        assert_eq!(roots.len(), 1);
        let root = &nodes[&roots[0]];
        assert!(root.children.is_empty());
    }

    #[test]
    fn three_sentences_promote_leftover_not_wrap_singleton() {
        let text = "Uno. Dos. Tres.";
        let (nodes, roots) = build_chunk_tree(jid(), text);
        // 3 leaves -> pair (1,2) into one parent, promote leaf 3.
        assert_eq!(roots.len(), 2);
        let parent_count = nodes.values().filter(|n| !n.children.is_empty()).count();
        assert_eq!(parent_count, 1);
        // No node has exactly one child.
        assert!(nodes.values().all(|n| n.children.len() != 1));
    }

    #[test]
    fn sibling_links_are_consistent() {
        let text = "Uno. Dos. Tres. Cuatro.";
        let (nodes, _roots) = build_chunk_tree(jid(), text);
        let leaves: Vec<&Chunk> = nodes.values().filter(|n| n.children.is_empty()).collect();
        assert_eq!(leaves.len(), 4);
        for leaf in &leaves {
            if let Some(next) = leaf.next_sibling {
                assert_eq!(nodes[&next].prev_sibling, Some(leaf.id));
            }
        }
    }

    #[test]
    fn mentions_resolution_finds_containing_leaf() {
        let text = "Trabajé con Ana en Minerva hoy.";
        let (nodes, _roots) = build_chunk_tree(jid(), text);
        let needle = Span::new(12, 15, "Ana");
        let containing = leaf_chunks_containing(&nodes, &needle);
        assert_eq!(containing.len(), 1);
        assert!(containing[0].start <= needle.start && needle.end <= containing[0].end);
    }

    #[test]
    fn rebuilding_the_same_journal_reproduces_identical_chunk_ids() {
        let text = "Uno. Dos. Tres. Cuatro.";
        let journal_uuid = Uuid::new_v4();
        let (first, first_roots) = build_chunk_tree(journal_uuid, text);
        let (second, second_roots) = build_chunk_tree(journal_uuid, text);
        assert_eq!(first_roots, second_roots);
        let mut first_ids: Vec<Uuid> = first.keys().copied().collect();
        let mut second_ids: Vec<Uuid> = second.keys().copied().collect();
        first_ids.sort();
        second_ids.sort();
        assert_eq!(first_ids, second_ids);
    }

    #[test]
    fn different_journals_never_collide_on_chunk_ids() {
        let text = "Una sola oración.";
        let (a, _) = build_chunk_tree(Uuid::new_v4(), text);
        let (b, _) = build_chunk_tree(Uuid::new_v4(), text);
        assert!(a.keys().next() != b.keys().next());
    }
}

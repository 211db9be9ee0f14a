//! Span resolution: find where an LLM-extracted mention text actually
//! appears in the source narration, so curation items and graph
//! `MENTIONS` edges can point at a concrete character range instead of
//! trusting the model's own (often paraphrased) offsets.
//!
//! Tries an exact case-insensitive substring match first; if that fails
//! and the target is more than one word, slides a window of nearby sizes
//! over the text and scores each candidate with a string-similarity
//! ratio, accepting the best if it clears a minimum score. A single-word
//! target never falls back to the fuzzy pass — a fuzzy match *of* one
//! word against *a window of* words is how spurious single-token matches
//! slip through, so a miss here is dropped rather than guessed at.

use minerva_domain::chunk::Span;

const MIN_FUZZY_SCORE: f64 = 75.0;

/// A word and its byte range within the source text.
struct Word<'a> {
    text: &'a str,
    start: usize,
    end: usize,
}

fn words(text: &str) -> Vec<Word<'_>> {
    let mut out = Vec::new();
    let mut start: Option<usize> = None;
    for (idx, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if let Some(s) = start.take() {
                out.push(Word { text: &text[s..idx], start: s, end: idx });
            }
        } else if start.is_none() {
            start = Some(idx);
        }
    }
    if let Some(s) = start {
        out.push(Word { text: &text[s..], start: s, end: text.len() });
    }
    out
}

fn similarity_pct(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&a.to_lowercase(), &b.to_lowercase()) * 100.0
}

/// Resolve `target` within `text`: exact match, then (for multi-word
/// targets only) a fuzzy sliding-window phrase match. Returns `None` if
/// neither succeeds.
pub fn hydrate_span(text: &str, target: &str) -> Option<Span> {
    if let Some(span) = exact_match(text, target) {
        return Some(span);
    }

    let target_word_count = target.split_whitespace().count();
    if target_word_count <= 1 {
        return None;
    }

    fuzzy_phrase_match(text, target, target_word_count)
}

fn exact_match(text: &str, target: &str) -> Option<Span> {
    let lower_text = text.to_lowercase();
    let lower_target = target.to_lowercase();
    let byte_offset = lower_text.find(&lower_target)?;
    // `lower_text` and `text` only diverge in case, which never changes
    // UTF-8 byte-length for the alphabets this pipeline targets, so the
    // offset found in the lowercase copy is valid in the original.
    let end = byte_offset + lower_target.len();
    Some(Span::new(byte_offset, end, text[byte_offset..end].to_string()))
}

fn fuzzy_phrase_match(text: &str, target: &str, target_word_count: usize) -> Option<Span> {
    let text_words = words(text);
    let min_window = target_word_count.saturating_sub(1).max(1);
    let max_window = target_word_count + 2;

    let mut best: Option<(f64, Span)> = None;

    for window_size in min_window..=max_window {
        if window_size == 0 || window_size > text_words.len() {
            continue;
        }
        for start_idx in 0..=(text_words.len() - window_size) {
            let window = &text_words[start_idx..start_idx + window_size];
            let candidate_start = window.first().unwrap().start;
            let candidate_end = window.last().unwrap().end;
            let candidate_text = &text[candidate_start..candidate_end];
            let score = similarity_pct(candidate_text, target);

            let is_better = match &best {
                Some((best_score, _)) => score > *best_score,
                None => true,
            };
            if is_better {
                best = Some((score, Span::new(candidate_start, candidate_end, candidate_text.to_string())));
            }
        }
    }

    best.and_then(|(score, span)| if score >= MIN_FUZZY_SCORE { Some(span) } else { None })
}

use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Fixed lengths of the four psychometric vectors: PANAS+ (positive
/// affect), PANAS- (negative affect), BPNS (basic psychological needs
/// satisfaction), and Flourishing.
pub const PANAS_POSITIVE_LEN: usize = 10;
pub const PANAS_NEGATIVE_LEN: usize = 10;
pub const BPNS_LEN: usize = 7;
pub const FLOURISHING_LEN: usize = 8;

/// One day's journal submission: raw submitted text, the narration parsed
/// out of it, plus optional wake/sleep timestamps and four optional
/// psychometric score vectors.
///
/// A vector is `None`, never a zero-filled `Vec`, when its section of the
/// submission form was left blank — a missing section must not be
/// conflated with a respondent answering every item with the lowest score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    pub uuid: Uuid,
    pub date: NaiveDate,
    pub raw_text: String,
    /// The narration proper: everything before the first `---` delimiter
    /// or the first psychometric section heading. What extraction stages
    /// and the chunk tree are built over — never the raw text, which may
    /// still carry the score sections after it.
    pub narration: String,
    pub woke_at: Option<DateTime<Utc>>,
    pub slept_at: Option<DateTime<Utc>>,
    pub panas_positive: Option<Vec<i32>>,
    pub panas_negative: Option<Vec<i32>>,
    pub bpns: Option<Vec<i32>>,
    pub flourishing: Option<Vec<i32>>,
    pub created_at: DateTime<Utc>,
}

/// Why a [`JournalEntry`] failed validation at submission time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JournalValidationError {
    #[error("panas_positive must have {PANAS_POSITIVE_LEN} entries, got {0}")]
    PanasPositiveLength(usize),
    #[error("panas_negative must have {PANAS_NEGATIVE_LEN} entries, got {0}")]
    PanasNegativeLength(usize),
    #[error("bpns must have {BPNS_LEN} entries, got {0}")]
    BpnsLength(usize),
    #[error("flourishing must have {FLOURISHING_LEN} entries, got {0}")]
    FlourishingLength(usize),
    #[error("raw_text must not be empty")]
    EmptyText,
}

impl JournalEntry {
    /// Build an entry from already-plain narration text, with no score
    /// vectors or wake/sleep times. Used where the caller's text is not a
    /// full markdown submission (tests, programmatic construction).
    pub fn new(date: NaiveDate, raw_text: impl Into<String>) -> Self {
        let raw_text = raw_text.into();
        Self {
            uuid: Uuid::new_v4(),
            date,
            narration: raw_text.clone(),
            raw_text,
            woke_at: None,
            slept_at: None,
            panas_positive: None,
            panas_negative: None,
            bpns: None,
            flourishing: None,
            created_at: Utc::now(),
        }
    }

    /// Parse a full markdown journal submission: the narration split off
    /// the first `---` delimiter or psychometric section, the PANAS+/PANAS-
    /// /BPNS/Flourishing vectors from `<label>:: <integer>` lines under
    /// their `## ` headings, and the `Wake time:`/`Bedtime:` timestamps
    /// (applying the bedtime-before-wake-means-next-day rule).
    pub fn from_text(date: NaiveDate, raw_text: impl Into<String>) -> Self {
        let raw_text = raw_text.into();
        let narration = parse_narration(&raw_text);
        let (panas_positive, panas_negative) = parse_panas(&raw_text);
        let bpns = parse_scored_section(&raw_text, "bpns", BPNS_LEN);
        let flourishing = parse_scored_section(&raw_text, "flourishing scale", FLOURISHING_LEN);
        let (woke_at, slept_at) = parse_wake_bed(&raw_text, date);
        Self {
            uuid: Uuid::new_v4(),
            date,
            narration,
            raw_text,
            woke_at,
            slept_at,
            panas_positive,
            panas_negative,
            bpns,
            flourishing,
            created_at: Utc::now(),
        }
    }

    /// Whether `slept_at` falls on the calendar day after `woke_at` (a
    /// journal entry describing a day that runs past midnight, e.g. woke
    /// 2026-07-28 08:00, slept 2026-07-29 01:30).
    pub fn sleep_crosses_midnight(&self) -> bool {
        match (self.woke_at, self.slept_at) {
            (Some(woke), Some(slept)) => slept.date_naive() > woke.date_naive(),
            _ => false,
        }
    }

    pub fn validate(&self) -> Result<(), JournalValidationError> {
        if self.raw_text.trim().is_empty() {
            return Err(JournalValidationError::EmptyText);
        }
        if let Some(v) = &self.panas_positive {
            if v.len() != PANAS_POSITIVE_LEN {
                return Err(JournalValidationError::PanasPositiveLength(v.len()));
            }
        }
        if let Some(v) = &self.panas_negative {
            if v.len() != PANAS_NEGATIVE_LEN {
                return Err(JournalValidationError::PanasNegativeLength(v.len()));
            }
        }
        if let Some(v) = &self.bpns {
            if v.len() != BPNS_LEN {
                return Err(JournalValidationError::BpnsLength(v.len()));
            }
        }
        if let Some(v) = &self.flourishing {
            if v.len() != FLOURISHING_LEN {
                return Err(JournalValidationError::FlourishingLength(v.len()));
            }
        }
        Ok(())
    }
}

/// A `## ` heading line — deliberately excludes `###` and deeper, which
/// mark subsections (e.g. `### Positive Affect`) within a `## ` section
/// rather than a new one.
fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^##(?:[^#]|$)(.*)$").unwrap())
}

fn item_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^.*?::\s*(-?\d+)\s*$").unwrap())
}

fn divider_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^---\s*$").unwrap())
}

fn wake_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Wake time:\s*(\d{2}):?(\d{2})").unwrap())
}

fn bedtime_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Bedtime:\s*(\d{2}):?(\d{2})").unwrap())
}

/// The body of the first `## `-heading whose text starts with `prefix`
/// (case-insensitive), bounded by the next `## ` heading or end of text.
fn section_body<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let headings: Vec<_> = heading_re().captures_iter(text).map(|c| (c.get(0).unwrap().start(), c.get(0).unwrap().end(), c[1].trim().to_lowercase())).collect();
    let (idx, (_, body_start, _)) = headings.iter().enumerate().find(|(_, (_, _, h))| h.starts_with(prefix))?;
    let body_end = headings.get(idx + 1).map(|(start, _, _)| *start).unwrap_or(text.len());
    Some(&text[*body_start..body_end])
}

fn collect_ints(body: &str) -> Vec<i32> {
    item_re().captures_iter(body).filter_map(|c| c[1].parse().ok()).collect()
}

fn parse_scored_section(text: &str, heading_prefix: &str, len: usize) -> Option<Vec<i32>> {
    let values = collect_ints(section_body(text, heading_prefix)?);
    (values.len() >= len).then(|| values[..len].to_vec())
}

/// PANAS+ and PANAS- share a single `## PANAS` section: the first 10
/// scored items are the positive-affect items, the next 10 are negative.
fn parse_panas(text: &str) -> (Option<Vec<i32>>, Option<Vec<i32>>) {
    let Some(values) = section_body(text, "panas").map(collect_ints) else {
        return (None, None);
    };
    let positive = (values.len() >= PANAS_POSITIVE_LEN).then(|| values[..PANAS_POSITIVE_LEN].to_vec());
    let negative =
        (values.len() >= PANAS_POSITIVE_LEN + PANAS_NEGATIVE_LEN).then(|| values[PANAS_POSITIVE_LEN..PANAS_POSITIVE_LEN + PANAS_NEGATIVE_LEN].to_vec());
    (positive, negative)
}

fn parse_hm(hour: &str, minute: &str) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(hour.parse().ok()?, minute.parse().ok()?, 0)
}

/// Wake/bed times, combined with `date` into full timestamps. A bedtime
/// numerically earlier than wake time belongs to the following calendar
/// day — the respondent went to sleep after midnight.
fn parse_wake_bed(text: &str, date: NaiveDate) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    let wake = wake_re().captures(text).and_then(|c| parse_hm(&c[1], &c[2]));
    let bed = bedtime_re().captures(text).and_then(|c| parse_hm(&c[1], &c[2]));

    let woke_at = wake.map(|t| Utc.from_utc_datetime(&date.and_time(t)));
    let slept_at = bed.map(|bed_time| {
        let bed_date = match wake {
            Some(wake_time) if bed_time < wake_time => date.succ_opt().unwrap_or(date),
            _ => date,
        };
        Utc.from_utc_datetime(&bed_date.and_time(bed_time))
    });
    (woke_at, slept_at)
}

const SECTION_HEADING_PREFIXES: &[&str] = &["panas", "bpns", "flourishing scale", "sleep"];

fn parse_narration(text: &str) -> String {
    let divider_at = divider_re().find(text).map(|m| m.start());
    let section_at = heading_re()
        .captures_iter(text)
        .find(|c| SECTION_HEADING_PREFIXES.iter().any(|prefix| c[1].trim().to_lowercase().starts_with(prefix)))
        .map(|c| c.get(0).unwrap().start());

    let boundary = [divider_at, section_at].into_iter().flatten().min();
    match boundary {
        Some(idx) => text[..idx].trim_end().to_string(),
        None => text.trim_end().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn missing_section_stays_none_not_zero_vector() {
        let entry = JournalEntry::new(day(2026, 7, 28), "Hoy fue un buen día.");
        assert!(entry.panas_positive.is_none());
        assert!(entry.validate().is_ok());
    }

    #[test]
    fn wrong_length_vector_is_rejected() {
        let mut entry = JournalEntry::new(day(2026, 7, 28), "texto");
        entry.bpns = Some(vec![1, 2, 3]);
        assert_eq!(entry.validate(), Err(JournalValidationError::BpnsLength(3)));
    }

    #[test]
    fn empty_text_is_rejected() {
        let entry = JournalEntry::new(day(2026, 7, 28), "   ");
        assert_eq!(entry.validate(), Err(JournalValidationError::EmptyText));
    }

    #[test]
    fn detects_sleep_crossing_midnight() {
        let mut entry = JournalEntry::new(day(2026, 7, 28), "texto");
        entry.woke_at = Some(Utc.with_ymd_and_hms(2026, 7, 28, 8, 0, 0).unwrap());
        entry.slept_at = Some(Utc.with_ymd_and_hms(2026, 7, 29, 1, 30, 0).unwrap());
        assert!(entry.sleep_crosses_midnight());
    }

    #[test]
    fn same_day_sleep_does_not_cross_midnight() {
        let mut entry = JournalEntry::new(day(2026, 7, 28), "texto");
        entry.woke_at = Some(Utc.with_ymd_and_hms(2026, 7, 28, 8, 0, 0).unwrap());
        entry.slept_at = Some(Utc.with_ymd_and_hms(2026, 7, 28, 23, 30, 0).unwrap());
        assert!(!entry.sleep_crosses_midnight());
    }

    const FULL_SUBMISSION: &str = "\
Hoy trabajé en [[Minerva]] todo el día con [[Ana]].

Fue un buen día en general.
---
Wake time: 07:30
Bedtime: 0045

## PANAS
### Positive Affect
Interested:: 4
Excited:: 3
Strong:: 3
Enthusiastic:: 4
Proud:: 3
Alert:: 4
Inspired:: 3
Determined:: 4
Attentive:: 4
Active:: 3
### Negative Affect
Distressed:: 1
Upset:: 1
Guilty:: 1
Scared:: 1
Hostile:: 1
Irritable:: 2
Ashamed:: 1
Nervous:: 2
Jittery:: 1
Afraid:: 1

## BPNS
I feel like I can make choices about the things I do:: 5
I feel free to decide how I do my daily tasks:: 5
I feel capable at the things I do:: 4
I can successfully complete challenging tasks:: 4
I feel close and connected with the people around me:: 5
I get along well with the people I interact with daily:: 4
I feel supported by others in my life:: 5

## Flourishing Scale
I lead a purposeful and meaningful life:: 6
My social relationships are supportive and rewarding:: 6
I am engaged and interested in my daily activities:: 5
I actively contribute to the happiness and well-being of others:: 5
I am competent and capable in the activities that are important to me:: 6
I am a good person and live a good life:: 6
I am optimistic about my future:: 5
People respect me:: 5
";

    #[test]
    fn from_text_splits_narration_before_first_divider() {
        let entry = JournalEntry::from_text(day(2026, 7, 28), FULL_SUBMISSION);
        assert!(entry.narration.contains("Minerva"));
        assert!(!entry.narration.contains("Wake time"));
        assert!(!entry.narration.contains("---"));
    }

    #[test]
    fn from_text_parses_all_four_score_vectors() {
        let entry = JournalEntry::from_text(day(2026, 7, 28), FULL_SUBMISSION);
        assert_eq!(entry.panas_positive, Some(vec![4, 3, 3, 4, 3, 4, 3, 4, 4, 3]));
        assert_eq!(entry.panas_negative, Some(vec![1, 1, 1, 1, 1, 2, 1, 2, 1, 1]));
        assert_eq!(entry.bpns, Some(vec![5, 5, 4, 4, 5, 4, 5]));
        assert_eq!(entry.flourishing, Some(vec![6, 6, 5, 5, 6, 6, 5, 5]));
        assert!(entry.validate().is_ok());
    }

    #[test]
    fn from_text_applies_next_day_rule_when_bedtime_precedes_wake() {
        let entry = JournalEntry::from_text(day(2026, 7, 28), FULL_SUBMISSION);
        let woke = entry.woke_at.unwrap();
        let slept = entry.slept_at.unwrap();
        assert_eq!(woke, Utc.with_ymd_and_hms(2026, 7, 28, 7, 30, 0).unwrap());
        assert_eq!(slept, Utc.with_ymd_and_hms(2026, 7, 29, 0, 45, 0).unwrap());
        assert!(entry.sleep_crosses_midnight());
    }

    #[test]
    fn from_text_leaves_vectors_none_when_sections_absent() {
        let entry = JournalEntry::from_text(day(2026, 7, 28), "Solo narración, sin secciones.");
        assert!(entry.panas_positive.is_none());
        assert!(entry.bpns.is_none());
        assert!(entry.woke_at.is_none());
        assert_eq!(entry.narration, "Solo narración, sin secciones.");
    }

    #[test]
    fn from_text_does_not_cross_midnight_when_bedtime_is_after_wake() {
        let text = "Narración corta.\n---\nWake time: 07:00\nBedtime: 23:30\n";
        let entry = JournalEntry::from_text(day(2026, 7, 28), text);
        assert!(!entry.sleep_crosses_midnight());
        assert_eq!(entry.slept_at.unwrap().date_naive(), day(2026, 7, 28));
    }
}

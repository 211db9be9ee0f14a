//! Idempotent note writes: a write that would reproduce the file byte for
//! byte is skipped rather than touching the file's mtime, so re-running
//! the pipeline over an unchanged entity never spuriously dirties the
//! vault for a sync tool watching it.

use std::fs;
use std::path::Path;

use minerva_domain::{PipelineError, Result};

use crate::frontmatter::{self, Frontmatter};

/// Read a note's frontmatter and body, if the file exists and parses. A
/// missing file is `Ok(None)`, not an error — the caller is expected to
/// synthesize frontmatter for a brand-new entity note.
pub fn read(path: &Path) -> Result<Option<(Frontmatter, String)>> {
    match fs::read_to_string(path) {
        Ok(raw) => Ok(frontmatter::parse(&raw)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(PipelineError::consistency(format!("reading {}: {e}", path.display()))),
    }
}

/// Write `frontmatter` + `body` to `path`, creating parent directories as
/// needed. No-op if the rendered content already matches what's on disk.
pub fn write(path: &Path, frontmatter: &Frontmatter, body: &str) -> Result<()> {
    let rendered = frontmatter::render(frontmatter, body);

    if let Ok(existing) = fs::read_to_string(path) {
        if existing == rendered {
            return Ok(());
        }
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| PipelineError::consistency(e.to_string()))?;
    }
    fs::write(path, rendered).map_err(|e| PipelineError::consistency(format!("writing {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sample() -> Frontmatter {
        Frontmatter {
            entity_id: Uuid::new_v4(),
            entity_type: "Concept".to_string(),
            short_summary: "short".to_string(),
            summary: "long".to_string(),
            aliases: vec![],
            concept_relations: vec![],
        }
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Minerva.md");
        let fm = sample();
        write(&path, &fm, "Body.").unwrap();
        let (read_fm, body) = read(&path).unwrap().unwrap();
        assert_eq!(read_fm, fm);
        assert_eq!(body.trim(), "Body.");
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read(&dir.path().join("nope.md")).unwrap().is_none());
    }

    #[test]
    fn rewriting_identical_content_does_not_touch_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Minerva.md");
        let fm = sample();
        write(&path, &fm, "Body.").unwrap();
        let before = fs::metadata(&path).unwrap().modified().unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        write(&path, &fm, "Body.").unwrap();
        let after = fs::metadata(&path).unwrap().modified().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn writing_creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("dir").join("Minerva.md");
        write(&path, &sample(), "Body.").unwrap();
        assert!(path.exists());
    }
}

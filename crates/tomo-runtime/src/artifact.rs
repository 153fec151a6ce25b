//! Per-chapter status artifacts and the run summary.
//!
//! A chapter artifact is a flexible-width CSV of `key,value...` rows. Row one
//! is always `Status,incomplete`, written and synced before analysis starts;
//! completion appends a second `Status` row. Readers take the last `Status`
//! row as authoritative, so a crash at any point leaves a readable file.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tomo_core::{
    chapter_artifact_path, document_dir, summary_path, AnalysisResult, ChapterStatus,
    EntityCount, Error, PageRange, Result, RunSummary, SummaryRow,
};
use tracing::debug;

const STATUS: &str = "Status";
const COMPLETED_PREFIX: &str = "Completed at ";
const DOMINANT_EMOTION: &str = "Dominant emotion";
const ENTITY: &str = "Entity";
const SUMMARY: &str = "Summary";
const ERROR: &str = "Error";

const SUMMARY_HEADER: [&str; 3] = ["Chapter", "Page range", "Status"];

/// Handle to one chapter's status file.
#[derive(Debug, Clone)]
pub struct ChapterArtifact {
    path: PathBuf,
}

impl ChapterArtifact {
    /// Create (or truncate) the artifact with its `incomplete` marker, synced to disk.
    pub fn begin(output_dir: &Path, document: &str, chapter: u32) -> Result<Self> {
        std::fs::create_dir_all(document_dir(output_dir, document))?;
        let path = chapter_artifact_path(output_dir, document, chapter);
        let file = File::create(&path)?;
        write_rows(file, &[vec![STATUS.to_string(), ChapterStatus::InProgress.to_string()]])?;
        debug!("Chapter {} started: {}", chapter, path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append the completion marker and the result payload.
    pub fn complete(&self, result: &AnalysisResult, max_entities: usize) -> Result<()> {
        let mut rows = vec![
            vec![
                STATUS.to_string(),
                format!("{}{}", COMPLETED_PREFIX, Utc::now().to_rfc3339()),
            ],
            vec![DOMINANT_EMOTION.to_string(), result.dominant_emotion.clone()],
        ];
        for entity in result.entities.iter().take(max_entities) {
            rows.push(vec![
                ENTITY.to_string(),
                entity.name.clone(),
                entity.category.clone(),
                entity.count.to_string(),
            ]);
        }
        if let Some(summary) = &result.summary {
            rows.push(vec![SUMMARY.to_string(), summary.clone()]);
        }
        self.append(&rows)
    }

    /// Record why analysis failed. The last status stays `incomplete`.
    pub fn fail(&self, reason: &str) -> Result<()> {
        self.append(&[vec![ERROR.to_string(), reason.to_string()]])
    }

    fn append(&self, rows: &[Vec<String>]) -> Result<()> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        write_rows(file, rows)
    }
}

fn write_rows(file: File, rows: &[Vec<String>]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().flexible(true).from_writer(file);
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| Error::Io(e.into_error()))?;
    file.sync_all()?;
    Ok(())
}

/// Parsed contents of a chapter artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChapterRecord {
    pub chapter: u32,
    /// Last `Status` row.
    pub status: ChapterStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub dominant_emotion: Option<String>,
    pub entities: Vec<EntityCount>,
    pub summary: Option<String>,
    pub error: Option<String>,
}

/// Read a chapter artifact back.
pub fn read_chapter(output_dir: &Path, document: &str, chapter: u32) -> Result<ChapterRecord> {
    let path = chapter_artifact_path(output_dir, document, chapter);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(&path)?;

    let mut record = ChapterRecord {
        chapter,
        status: ChapterStatus::Pending,
        completed_at: None,
        dominant_emotion: None,
        entities: Vec::new(),
        summary: None,
        error: None,
    };
    let mut saw_status = false;

    for row in reader.records() {
        let row = row?;
        let field = |i: usize| row.get(i).unwrap_or("").to_string();
        match row.get(0).unwrap_or("") {
            STATUS => {
                saw_status = true;
                let value = field(1);
                if let Some(ts) = value.strip_prefix(COMPLETED_PREFIX) {
                    record.status = ChapterStatus::Complete;
                    record.completed_at = DateTime::parse_from_rfc3339(ts)
                        .ok()
                        .map(|t| t.with_timezone(&Utc));
                } else {
                    record.status = value.parse()?;
                    record.completed_at = None;
                }
            }
            DOMINANT_EMOTION => record.dominant_emotion = Some(field(1)),
            ENTITY => record.entities.push(EntityCount {
                name: field(1),
                category: field(2),
                count: field(3).parse().unwrap_or(0),
            }),
            SUMMARY => record.summary = Some(field(1)),
            ERROR => record.error = Some(field(1)),
            other => debug!("Ignoring unknown artifact row '{}' in {}", other, path.display()),
        }
    }

    if !saw_status {
        return Err(Error::Artifact(format!("{}: no Status row", path.display())));
    }
    Ok(record)
}

/// Final status of a chapter as seen from its artifact: only a completion
/// marker counts; missing, unreadable or incomplete artifacts are failures.
pub fn final_status(output_dir: &Path, document: &str, chapter: u32) -> ChapterStatus {
    match read_chapter(output_dir, document, chapter) {
        Ok(record) if record.status == ChapterStatus::Complete => ChapterStatus::Complete,
        Ok(_) => ChapterStatus::Failed,
        Err(e) => {
            debug!("Chapter {} artifact unreadable: {}", chapter, e);
            ChapterStatus::Failed
        }
    }
}

/// Delete every `chapter_<n>.csv` left in the document directory by an
/// earlier run. Returns how many were removed.
pub fn clear_chapters(output_dir: &Path, document: &str) -> Result<usize> {
    let dir = document_dir(output_dir, document);
    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let is_artifact = name
            .to_str()
            .and_then(|n| n.strip_prefix("chapter_"))
            .and_then(|n| n.strip_suffix(".csv"))
            .is_some_and(|n| n.parse::<u32>().is_ok());
        if is_artifact {
            std::fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    if removed > 0 {
        debug!("Removed {} stale chapter artifacts from {}", removed, dir.display());
    }
    Ok(removed)
}

/// Writes and reads `summary.csv`.
pub struct SummaryWriter;

impl SummaryWriter {
    /// Atomically replace the document's summary with `rows`, sorted by chapter.
    pub fn write(output_dir: &Path, document: &str, rows: &[SummaryRow]) -> Result<PathBuf> {
        let dir = document_dir(output_dir, document);
        std::fs::create_dir_all(&dir)?;

        let mut sorted = rows.to_vec();
        sorted.sort_by_key(|r| r.chapter);

        let tmp = tempfile::NamedTempFile::new_in(&dir)?;
        {
            let mut writer = csv::Writer::from_writer(tmp.as_file());
            writer.write_record(SUMMARY_HEADER)?;
            for row in &sorted {
                writer.write_record([
                    row.chapter.to_string(),
                    row.pages.to_string(),
                    row.status.to_string(),
                ])?;
            }
            writer.flush()?;
        }
        tmp.as_file().sync_all()?;

        let path = summary_path(output_dir, document);
        tmp.persist(&path).map_err(|e| Error::Io(e.error))?;
        debug!("Summary written: {} ({} rows)", path.display(), sorted.len());
        Ok(path)
    }

    /// Parse a previously written summary.
    pub fn read(output_dir: &Path, document: &str) -> Result<RunSummary> {
        let path = summary_path(output_dir, document);
        if !path.exists() {
            return Err(Error::NotFound(path.display().to_string()));
        }
        let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(&path)?;

        let mut rows = Vec::new();
        for row in reader.records() {
            let row = row?;
            let chapter = row
                .get(0)
                .and_then(|c| c.trim().parse().ok())
                .ok_or_else(|| Error::Artifact(format!("{}: bad chapter column", path.display())))?;
            let pages: PageRange = row.get(1).unwrap_or("").parse()?;
            // Two-column summaries carry no status; treat them as unknown/failed.
            let status = match row.get(2) {
                Some(s) => s.parse()?,
                None => ChapterStatus::Failed,
            };
            rows.push(SummaryRow {
                chapter,
                pages,
                status,
            });
        }
        Ok(RunSummary::new(document, rows))
    }

    /// Delete a stale summary. Returns whether one existed.
    pub fn remove(output_dir: &Path, document: &str) -> Result<bool> {
        let path = summary_path(output_dir, document);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result() -> AnalysisResult {
        AnalysisResult {
            entities: vec![
                EntityCount {
                    name: "Renzo".into(),
                    category: "PER".into(),
                    count: 4,
                },
                EntityCount {
                    name: "Lecco, town".into(),
                    category: "LOC".into(),
                    count: 1,
                },
            ],
            dominant_emotion: "fear".into(),
            emotion_scores: vec![("fear".into(), 1.5)],
            summary: Some("He left, \"at night\".".into()),
        }
    }

    #[test]
    fn test_begin_writes_incomplete_marker() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = ChapterArtifact::begin(dir.path(), "doc", 3).unwrap();
        let raw = std::fs::read_to_string(artifact.path()).unwrap();
        assert_eq!(raw, "Status,incomplete\n");

        let record = read_chapter(dir.path(), "doc", 3).unwrap();
        assert_eq!(record.status, ChapterStatus::InProgress);
        assert_eq!(final_status(dir.path(), "doc", 3), ChapterStatus::Failed);
    }

    #[test]
    fn test_complete_appends_payload() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = ChapterArtifact::begin(dir.path(), "doc", 1).unwrap();
        artifact.complete(&result(), 20).unwrap();

        let raw = std::fs::read_to_string(artifact.path()).unwrap();
        let lines: Vec<&str> = raw.lines().collect();
        assert_eq!(lines[0], "Status,incomplete");
        assert!(lines[1].starts_with("Status,Completed at "));
        assert_eq!(lines[2], "Dominant emotion,fear");

        let record = read_chapter(dir.path(), "doc", 1).unwrap();
        assert_eq!(record.status, ChapterStatus::Complete);
        assert!(record.completed_at.is_some());
        assert_eq!(record.dominant_emotion.as_deref(), Some("fear"));
        assert_eq!(record.entities, result().entities);
        assert_eq!(record.summary.as_deref(), Some("He left, \"at night\"."));
        assert_eq!(final_status(dir.path(), "doc", 1), ChapterStatus::Complete);
    }

    #[test]
    fn test_complete_caps_entities() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = ChapterArtifact::begin(dir.path(), "doc", 1).unwrap();
        artifact.complete(&result(), 1).unwrap();
        let record = read_chapter(dir.path(), "doc", 1).unwrap();
        assert_eq!(record.entities.len(), 1);
    }

    #[test]
    fn test_fail_keeps_incomplete_status() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = ChapterArtifact::begin(dir.path(), "doc", 2).unwrap();
        artifact.fail("emotion stage failed: boom").unwrap();

        let record = read_chapter(dir.path(), "doc", 2).unwrap();
        assert_eq!(record.status, ChapterStatus::InProgress);
        assert_eq!(record.error.as_deref(), Some("emotion stage failed: boom"));
        assert_eq!(final_status(dir.path(), "doc", 2), ChapterStatus::Failed);
    }

    #[test]
    fn test_missing_or_empty_artifact_is_failed() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(final_status(dir.path(), "doc", 9), ChapterStatus::Failed);

        std::fs::create_dir_all(document_dir(dir.path(), "doc")).unwrap();
        std::fs::write(chapter_artifact_path(dir.path(), "doc", 9), "").unwrap();
        assert!(read_chapter(dir.path(), "doc", 9).is_err());
        assert_eq!(final_status(dir.path(), "doc", 9), ChapterStatus::Failed);
    }

    #[test]
    fn test_summary_write_read() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![
            SummaryRow {
                chapter: 2,
                pages: PageRange::new(3, 5),
                status: ChapterStatus::Failed,
            },
            SummaryRow {
                chapter: 1,
                pages: PageRange::new(1, 3),
                status: ChapterStatus::Complete,
            },
        ];
        let path = SummaryWriter::write(dir.path(), "doc", &rows).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            raw,
            "Chapter,Page range,Status\n1,1-3,completed\n2,3-5,failed\n"
        );

        let summary = SummaryWriter::read(dir.path(), "doc").unwrap();
        assert_eq!(summary.rows.len(), 2);
        assert_eq!(summary.rows[0].chapter, 1);
        assert_eq!(summary.rows[1].status, ChapterStatus::Failed);

        // No temp files left behind.
        let entries = std::fs::read_dir(document_dir(dir.path(), "doc")).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_summary_replaces_previous_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let row = |chapter| SummaryRow {
            chapter,
            pages: PageRange::new(1, 1),
            status: ChapterStatus::Complete,
        };
        SummaryWriter::write(dir.path(), "doc", &[row(1), row(2), row(3)]).unwrap();
        SummaryWriter::write(dir.path(), "doc", &[row(1)]).unwrap();
        assert_eq!(SummaryWriter::read(dir.path(), "doc").unwrap().rows.len(), 1);

        assert!(SummaryWriter::remove(dir.path(), "doc").unwrap());
        assert!(!SummaryWriter::remove(dir.path(), "doc").unwrap());
        assert!(matches!(
            SummaryWriter::read(dir.path(), "doc"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_clear_chapters_keeps_summary() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(clear_chapters(dir.path(), "doc").unwrap(), 0);

        for chapter in [1, 2, 10] {
            ChapterArtifact::begin(dir.path(), "doc", chapter).unwrap();
        }
        let row = SummaryRow {
            chapter: 1,
            pages: PageRange::new(1, 1),
            status: ChapterStatus::Complete,
        };
        SummaryWriter::write(dir.path(), "doc", &[row]).unwrap();
        std::fs::write(document_dir(dir.path(), "doc").join("chapter_notes.csv"), "x").unwrap();

        assert_eq!(clear_chapters(dir.path(), "doc").unwrap(), 3);
        assert!(!chapter_artifact_path(dir.path(), "doc", 10).exists());
        assert!(summary_path(dir.path(), "doc").exists());
        assert!(document_dir(dir.path(), "doc").join("chapter_notes.csv").exists());
    }
}

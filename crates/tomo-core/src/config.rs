//! Pipeline configuration and output directory layout.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Bytes per page shared by detection, page mapping and the reader.
pub const DEFAULT_PAGE_SIZE: usize = 3300;
/// Pages per chapter when no structural markers are found.
pub const DEFAULT_CHAPTER_LENGTH: usize = 12;
/// Leading pages inspected for an index section.
pub const DEFAULT_INDEX_PAGES: usize = 5;

/// How each chapter worker is isolated from its siblings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerIsolation {
    /// Blocking task on the runtime's blocking pool; panics are contained by the join handle.
    /// Opt-in: an abort or stack overflow in a model takes the whole run down.
    Task,
    /// Separate OS process running `tomo worker`.
    #[default]
    Process,
}

impl std::fmt::Display for WorkerIsolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Task => write!(f, "task"),
            Self::Process => write!(f, "process"),
        }
    }
}

impl std::str::FromStr for WorkerIsolation {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "task" | "thread" => Ok(Self::Task),
            "process" => Ok(Self::Process),
            other => Err(crate::Error::Config(format!(
                "unknown isolation mode '{}'",
                other
            ))),
        }
    }
}

/// Top-level Tomo configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomoConfig {
    /// Bytes per page.
    pub page_size: usize,
    /// Pages per fixed-length fallback chapter.
    pub chapter_length: usize,
    /// Leading pages scanned for an index section.
    pub index_pages: usize,
    /// Root directory for per-document artifact directories.
    pub output_dir: PathBuf,
    /// Upper bound on concurrent workers; 0 means available parallelism.
    pub max_workers: usize,
    pub isolation: WorkerIsolation,
    /// Maximum bytes handed to a model in one call.
    pub max_model_input: usize,
    /// Cosine similarity above which two entities are the same mention.
    pub similarity_threshold: f32,
    /// Entity rows persisted per chapter.
    pub max_entities: usize,
    /// Sentences in the narrative summary; 0 disables it.
    pub summary_sentences: usize,
    /// Directory holding ONNX models (only read with the `onnx` feature).
    pub model_dir: PathBuf,
}

impl Default for TomoConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            chapter_length: DEFAULT_CHAPTER_LENGTH,
            index_pages: DEFAULT_INDEX_PAGES,
            output_dir: PathBuf::from("output"),
            max_workers: 0,
            isolation: WorkerIsolation::Process,
            max_model_input: 512,
            similarity_threshold: 0.8,
            max_entities: 20,
            summary_sentences: 3,
            model_dir: PathBuf::from("models"),
        }
    }
}

impl TomoConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            page_size: env_parse("TOMO_PAGE_SIZE")
                .filter(|v| *v > 0)
                .unwrap_or(default.page_size),
            chapter_length: env_parse("TOMO_CHAPTER_LENGTH")
                .filter(|v| *v > 0)
                .unwrap_or(default.chapter_length),
            index_pages: env_parse("TOMO_INDEX_PAGES").unwrap_or(default.index_pages),
            output_dir: std::env::var("TOMO_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.output_dir),
            max_workers: env_parse("TOMO_MAX_WORKERS").unwrap_or(default.max_workers),
            isolation: env_parse("TOMO_ISOLATION").unwrap_or(default.isolation),
            max_model_input: env_parse("TOMO_MAX_MODEL_INPUT")
                .filter(|v| *v > 0)
                .unwrap_or(default.max_model_input),
            similarity_threshold: env_parse("TOMO_SIMILARITY_THRESHOLD")
                .unwrap_or(default.similarity_threshold),
            max_entities: env_parse("TOMO_MAX_ENTITIES").unwrap_or(default.max_entities),
            summary_sentences: env_parse("TOMO_SUMMARY_SENTENCES")
                .unwrap_or(default.summary_sentences),
            model_dir: std::env::var("TOMO_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.model_dir),
        }
    }

    /// Worker budget: the configured cap, or the machine's available parallelism.
    pub fn worker_budget(&self) -> usize {
        if self.max_workers > 0 {
            self.max_workers
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }

    /// Directory holding every artifact for one document.
    pub fn document_dir(&self, document_name: &str) -> PathBuf {
        document_dir(&self.output_dir, document_name)
    }

    /// Flags handing the analysis settings to a `tomo worker` child, so the
    /// child analyzes with the parent's configuration rather than its own environment.
    pub fn worker_args(&self) -> Vec<String> {
        vec![
            WORKER_MAX_MODEL_INPUT.to_string(),
            self.max_model_input.to_string(),
            WORKER_SIMILARITY_THRESHOLD.to_string(),
            self.similarity_threshold.to_string(),
            WORKER_MAX_ENTITIES.to_string(),
            self.max_entities.to_string(),
            WORKER_SUMMARY_SENTENCES.to_string(),
            self.summary_sentences.to_string(),
            WORKER_MODEL_DIR.to_string(),
            self.model_dir.to_string_lossy().into_owned(),
        ]
    }

    /// Overlay settings passed by [`TomoConfig::worker_args`]. Absent flags keep
    /// their current value; other arguments are ignored.
    pub fn apply_worker_args(&mut self, args: &[String]) -> crate::Result<()> {
        if let Some(v) = flag_parse(args, WORKER_MAX_MODEL_INPUT)? {
            if v == 0 {
                return Err(crate::Error::Config(format!(
                    "{} must be positive",
                    WORKER_MAX_MODEL_INPUT
                )));
            }
            self.max_model_input = v;
        }
        if let Some(v) = flag_parse(args, WORKER_SIMILARITY_THRESHOLD)? {
            self.similarity_threshold = v;
        }
        if let Some(v) = flag_parse(args, WORKER_MAX_ENTITIES)? {
            self.max_entities = v;
        }
        if let Some(v) = flag_parse(args, WORKER_SUMMARY_SENTENCES)? {
            self.summary_sentences = v;
        }
        if let Some(v) = flag_parse::<String>(args, WORKER_MODEL_DIR)? {
            self.model_dir = PathBuf::from(v);
        }
        Ok(())
    }
}

const WORKER_MAX_MODEL_INPUT: &str = "--max-model-input";
const WORKER_SIMILARITY_THRESHOLD: &str = "--similarity-threshold";
const WORKER_MAX_ENTITIES: &str = "--max-entities";
const WORKER_SUMMARY_SENTENCES: &str = "--summary-sentences";
const WORKER_MODEL_DIR: &str = "--model-dir";

/// Parsed value following `flag`; a flag without a valid value is an error.
fn flag_parse<T: std::str::FromStr>(args: &[String], flag: &str) -> crate::Result<Option<T>> {
    let Some(i) = args.iter().position(|a| a == flag) else {
        return Ok(None);
    };
    args.get(i + 1)
        .and_then(|v| v.parse().ok())
        .map(Some)
        .ok_or_else(|| crate::Error::Config(format!("{} needs a valid value", flag)))
}

/// `<output_dir>/<document_name>`.
pub fn document_dir(output_dir: &Path, document_name: &str) -> PathBuf {
    output_dir.join(document_name)
}

/// Per-chapter status artifact path.
pub fn chapter_artifact_path(output_dir: &Path, document_name: &str, chapter: u32) -> PathBuf {
    document_dir(output_dir, document_name).join(format!("chapter_{}.csv", chapter))
}

/// Run summary artifact path.
pub fn summary_path(output_dir: &Path, document_name: &str) -> PathBuf {
    document_dir(output_dir, document_name).join("summary.csv")
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::extractor::ProfessorEntry;

/// One enriched researcher, ready to persist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputRow {
    pub name: String,
    pub email: String,
    pub research_field: String,
    pub paper_title: String,
    pub paper_link: String,
    pub paper_description: String,
}

/// Append-only destination for enriched rows, keyed by institution.
pub trait RowSink {
    /// Appends `rows` and returns how many were written.
    fn append(&mut self, institution: &str, rows: &[OutputRow]) -> Result<usize>;

    /// Where rows for `institution` end up, for the final report.
    fn location(&self, institution: &str) -> String;
}

/// `Tufts University` → `Tufts_University.csv`
pub fn institution_file_name(institution: &str) -> String {
    format!("{}.csv", institution.replace(' ', "_"))
}

/// Headerless CSV files, one per institution, inside `dir`.
pub struct CsvSink {
    dir: PathBuf,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, institution: &str) -> PathBuf {
        self.dir.join(institution_file_name(institution))
    }
}

impl RowSink for CsvSink {
    fn append(&mut self, institution: &str, rows: &[OutputRow]) -> Result<usize> {
        append_csv(&self.path_for(institution), rows)
    }

    fn location(&self, institution: &str) -> String {
        self.path_for(institution).display().to_string()
    }
}

/// Raw `name,email` pairs for the extraction-only mode.
pub fn append_entries_csv(path: &Path, entries: &[ProfessorEntry]) -> Result<usize> {
    append_csv(path, entries)
}

fn append_csv<T: Serialize>(path: &Path, records: &[T]) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory {:?}", parent))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {:?} for append", path))?;

    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    for record in records {
        wtr.serialize(record).context("Failed to write CSV record")?;
    }
    wtr.flush().context("Failed to flush CSV")?;
    Ok(records.len())
}

//! Directory page in, researcher rows out.
//!
//! A run renders the directory, extracts professors chunk by chunk, then
//! enriches every professor on its own task. One researcher failing, timing
//! out or panicking only costs that researcher's row.

use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};
use tracing::{info, warn};

use crate::chunker::{Chunker, DEFAULT_CHUNK_SIZE};
use crate::classifier::FieldClassifier;
use crate::extractor::{extract_entries, ProfessorEntry};
use crate::fetcher::PageRenderer;
use crate::llm::{Completion, LlmError};
use crate::output::{OutputRow, RowSink};
use crate::profile::{extract_description, parse_profile, Profile};
use crate::resolver::{canonicalize_profile_url, find_profile_url};
use crate::search::SearchEngine;

/// Stored when a paper has no reachable description.
pub const NO_DESCRIPTION: &str = "N/A";

/// Upper bound on researchers enriched at once.
pub const MAX_CONCURRENCY: usize = 64;

/// External collaborators shared by every researcher task.
pub struct Services {
    pub renderer: Arc<dyn PageRenderer>,
    pub llm: Arc<dyn Completion>,
    pub search: Arc<dyn SearchEngine>,
    pub classifier: Arc<FieldClassifier>,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub chunk_size: usize,
    pub concurrency: usize,
    pub researcher_timeout: Duration,
    pub year_window: RangeInclusive<i32>,
}

impl PipelineOptions {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.chunk_size > 0, "chunk size must be greater than zero");
        ensure!(
            (1..=MAX_CONCURRENCY).contains(&self.concurrency),
            "concurrency must be between 1 and {}, got {}",
            MAX_CONCURRENCY,
            self.concurrency
        );
        Ok(())
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            concurrency: 4,
            researcher_timeout: Duration::from_secs(120),
            year_window: 2023..=2025,
        }
    }
}

/// Why a researcher produced no row.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Skip {
    #[error("no Scholar profile found")]
    NotFound,

    #[error("profile unavailable: {0}")]
    ProfileUnavailable(String),

    #[error("no publication inside the year window")]
    NoRecentPublication,

    #[error("timed out")]
    TimedOut,

    #[error("{0}")]
    Failed(String),
}

#[derive(Debug)]
pub struct ChunkFailure {
    pub index: usize,
    pub error: LlmError,
}

impl fmt::Display for ChunkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chunk {}: {}", self.index + 1, self.error)
    }
}

#[derive(Debug, Default)]
pub struct Extraction {
    /// Chunk order, duplicates kept.
    pub entries: Vec<ProfessorEntry>,
    pub failed_chunks: Vec<ChunkFailure>,
    pub chunk_count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedResearcher {
    pub entry: ProfessorEntry,
    pub reason: Skip,
}

#[derive(Debug)]
pub struct RunReport {
    pub rows: Vec<OutputRow>,
    pub skipped: Vec<SkippedResearcher>,
    pub failed_chunks: Vec<ChunkFailure>,
    pub chunk_count: usize,
    pub written: usize,
    pub location: String,
}

type Outcome = Result<OutputRow, Skip>;

/// Renders the directory and pulls `Name, Email` pairs out of every chunk.
/// Only the directory fetch is fatal; a chunk whose completion fails is
/// recorded and skipped.
pub async fn extract_professors(
    renderer: &dyn PageRenderer,
    llm: &dyn Completion,
    url: &str,
    chunker: &Chunker,
) -> Result<Extraction> {
    let markdown = renderer
        .render_markdown(url)
        .await
        .with_context(|| format!("Failed to fetch directory {}", url))?;
    info!("Directory {} rendered ({} chars)", url, markdown.chars().count());

    let mut extraction = Extraction::default();
    for (index, chunk) in chunker.chunks(&markdown).enumerate() {
        extraction.chunk_count += 1;
        match extract_entries(llm, chunk).await {
            Ok(entries) => {
                info!("Chunk {}: {} professors", index + 1, entries.len());
                extraction.entries.extend(entries);
            }
            Err(error) => {
                warn!("Chunk {} extraction failed: {}", index + 1, error);
                extraction.failed_chunks.push(ChunkFailure { index, error });
            }
        }
    }
    Ok(extraction)
}

/// Search, canonicalize, render and parse a researcher's Scholar profile.
pub async fn resolve_profile(
    search: &dyn SearchEngine,
    renderer: &dyn PageRenderer,
    name: &str,
    institution: &str,
) -> Result<Profile, Skip> {
    let found = find_profile_url(search, name, institution)
        .await
        .map_err(|e| Skip::Failed(format!("search failed: {}", e)))?;
    let url = found.ok_or(Skip::NotFound)?;
    let url = canonicalize_profile_url(&url)
        .map_err(|e| Skip::Failed(format!("bad profile URL {}: {}", url, e)))?;

    let html = renderer
        .render_html(&url)
        .await
        .map_err(|e| Skip::ProfileUnavailable(e.to_string()))?;
    Ok(parse_profile(&html))
}

/// Abstract of the paper at `link`, or [`NO_DESCRIPTION`].
pub async fn fetch_paper_description(renderer: &dyn PageRenderer, link: &str) -> String {
    if link.is_empty() {
        return NO_DESCRIPTION.to_string();
    }
    match renderer.render_html(link).await {
        Ok(html) => extract_description(&html).unwrap_or_else(|| NO_DESCRIPTION.to_string()),
        Err(e) => {
            warn!("Description fetch failed: {}", e);
            NO_DESCRIPTION.to_string()
        }
    }
}

pub async fn enrich_professor(
    services: &Services,
    entry: &ProfessorEntry,
    institution: &str,
    year_window: &RangeInclusive<i32>,
) -> Outcome {
    let profile = resolve_profile(
        services.search.as_ref(),
        services.renderer.as_ref(),
        entry.name(),
        institution,
    )
    .await?;

    let paper = profile
        .recent_publication(year_window)
        .ok_or(Skip::NoRecentPublication)?;
    let description = fetch_paper_description(services.renderer.as_ref(), &paper.link).await;

    let classification = services
        .classifier
        .classify(&profile.titles_blob())
        .await
        .map_err(|e| Skip::Failed(format!("classification failed: {:#}", e)))?;

    Ok(OutputRow {
        name: entry.name().to_string(),
        email: entry.email().to_string(),
        research_field: classification.field,
        paper_title: paper.title.clone(),
        paper_link: paper.link.clone(),
        paper_description: description,
    })
}

/// Enriches every entry concurrently. Outcomes come back in entry order.
pub async fn enrich_all(
    services: Arc<Services>,
    entries: &[ProfessorEntry],
    institution: &str,
    opts: &PipelineOptions,
) -> Result<Vec<Outcome>> {
    opts.validate()?;
    let total = entries.len();
    let semaphore = Arc::new(Semaphore::new(opts.concurrency));

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} researchers (eta {eta})")?
            .progress_chars("=> "),
    );

    let (tx, mut rx) = mpsc::channel::<(usize, Outcome)>(opts.concurrency * 2);

    for (index, entry) in entries.iter().cloned().enumerate() {
        let services = Arc::clone(&services);
        let sem = Arc::clone(&semaphore);
        let tx = tx.clone();
        let institution = institution.to_string();
        let window = opts.year_window.clone();
        let limit = opts.researcher_timeout;

        tokio::spawn(async move {
            let Ok(_permit) = sem.acquire_owned().await else {
                return;
            };
            let work = enrich_professor(&services, &entry, &institution, &window);
            let outcome = match tokio::time::timeout(limit, work).await {
                Ok(outcome) => outcome,
                Err(_) => Err(Skip::TimedOut),
            };
            let _ = tx.send((index, outcome)).await;
        });
    }

    // Receiver closes once every task has sent or died.
    drop(tx);

    let mut outcomes: Vec<Option<Outcome>> = (0..total).map(|_| None).collect();
    while let Some((index, outcome)) = rx.recv().await {
        let entry = &entries[index];
        match &outcome {
            Ok(row) => info!("{}: {} / {}", entry.name(), row.research_field, row.paper_title),
            Err(skip) => warn!("Skipping {}: {}", entry.name(), skip),
        }
        outcomes[index] = Some(outcome);
        pb.inc(1);
    }
    pb.finish_and_clear();

    Ok(outcomes
        .into_iter()
        .enumerate()
        .map(|(index, outcome)| {
            outcome.unwrap_or_else(|| {
                warn!("Task for {} ended without a result", entries[index].name());
                Err(Skip::Failed("task aborted".to_string()))
            })
        })
        .collect())
}

/// Full pipeline for one directory URL, appending the rows to `sink`.
pub async fn run_directory(
    services: Arc<Services>,
    sink: &mut dyn RowSink,
    url: &str,
    institution: &str,
    opts: &PipelineOptions,
) -> Result<RunReport> {
    opts.validate()?;
    let chunker = Chunker::new(opts.chunk_size)?;
    let extraction = extract_professors(
        services.renderer.as_ref(),
        services.llm.as_ref(),
        url,
        &chunker,
    )
    .await?;
    info!(
        "Extracted {} professors from {} chunks ({} failed)",
        extraction.entries.len(),
        extraction.chunk_count,
        extraction.failed_chunks.len()
    );

    let outcomes = enrich_all(services, &extraction.entries, institution, opts).await?;

    let mut rows = Vec::new();
    let mut skipped = Vec::new();
    for (entry, outcome) in extraction.entries.into_iter().zip(outcomes) {
        match outcome {
            Ok(row) => rows.push(row),
            Err(reason) => skipped.push(SkippedResearcher { entry, reason }),
        }
    }

    let written = sink
        .append(institution, &rows)
        .with_context(|| format!("Failed to write rows for {}", institution))?;

    Ok(RunReport {
        rows,
        skipped,
        failed_chunks: extraction.failed_chunks,
        chunk_count: extraction.chunk_count,
        written,
        location: sink.location(institution),
    })
}

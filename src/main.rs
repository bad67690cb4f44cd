mod chunker;
mod classifier;
mod db;
mod embed;
mod extractor;
mod fetcher;
mod llm;
mod output;
mod pipeline;
mod profile;
mod resolver;
mod search;
mod settings;
mod throttle;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use crate::chunker::Chunker;
use crate::classifier::{FieldClassifier, Taxonomy};
use crate::db::SqliteSink;
use crate::embed::OpenAiEmbedder;
use crate::fetcher::SpiderRenderer;
use crate::llm::GroqClient;
use crate::output::{CsvSink, RowSink};
use crate::pipeline::{ChunkFailure, PipelineOptions, Services, Skip};
use crate::search::GoogleSearch;
use crate::settings::{require_env, Settings};

#[derive(Parser)]
#[command(
    name = "faculty_scout",
    about = "Faculty directory to researcher records via spider.cloud, Google Scholar and an LLM"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract professors from a directory page and enrich each from Google Scholar
    Run {
        /// Faculty directory URL
        #[arg(long)]
        url: String,
        /// Institution name, used in searches and as the output key
        #[arg(long)]
        institution: String,
        #[arg(long, value_enum, default_value_t = SinkKind::Csv)]
        sink: SinkKind,
        /// Directory for CSV output (default: config `out_dir`)
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Researchers enriched at once
        #[arg(short = 'c', long)]
        concurrency: Option<usize>,
        /// Max characters per extraction prompt
        #[arg(long)]
        chunk_size: Option<usize>,
    },
    /// Only extract `name,email` pairs and append them to a CSV file
    Extract {
        #[arg(long)]
        url: String,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        chunk_size: Option<usize>,
    },
    /// Print one researcher's Scholar profile as markdown
    Profile {
        #[arg(long)]
        name: String,
        #[arg(long)]
        institution: String,
    },
    /// Classify free text into the research-field taxonomy
    Classify {
        #[arg(long)]
        text: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SinkKind {
    Csv,
    Sqlite,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load()?;

    let result = match cli.command {
        Commands::Run {
            url,
            institution,
            sink,
            out_dir,
            concurrency,
            chunk_size,
        } => {
            let llm_key = require_env("GROQ_API_KEY")?;
            let spider_key = require_env("SPIDER_API_KEY")?;
            let search_key = require_env("GOOGLE_API_KEY")?;
            let engine_id = require_env("GOOGLE_CSE_ID")?;
            let embed_key = require_env("OPENAI_API_KEY")?;

            let classifier = build_classifier(&settings, embed_key).await?;
            let services = Arc::new(Services {
                renderer: Arc::new(SpiderRenderer::new(spider_key)?),
                llm: Arc::new(build_llm(&settings, llm_key)?),
                search: Arc::new(build_search(&settings, search_key, engine_id)?),
                classifier: Arc::new(classifier),
            });

            let mut sink: Box<dyn RowSink> = match sink {
                SinkKind::Csv => {
                    Box::new(CsvSink::new(out_dir.unwrap_or_else(|| settings.out_dir.clone())))
                }
                SinkKind::Sqlite => Box::new(SqliteSink::open(&settings.sqlite_path)?),
            };

            let opts = PipelineOptions {
                chunk_size: chunk_size.unwrap_or(settings.chunk_size),
                concurrency: concurrency.unwrap_or(settings.concurrency),
                researcher_timeout: settings.researcher_timeout(),
                year_window: settings.year_window(),
            };
            opts.validate()?;
            println!(
                "Scouting {} ({}), {} researchers at a time...",
                institution, url, opts.concurrency
            );
            let report =
                pipeline::run_directory(services, sink.as_mut(), &url, &institution, &opts).await?;

            println!(
                "Extracted {} professors from {} chunks ({} chunks failed)",
                report.rows.len() + report.skipped.len(),
                report.chunk_count,
                report.failed_chunks.len()
            );
            print_failed_chunks(&report.failed_chunks);
            if !report.skipped.is_empty() {
                println!("\n--- Skipped ---");
                for s in &report.skipped {
                    println!("  {:<28} {}", truncate(s.entry.name(), 28), s.reason);
                }
            }
            println!("\nWrote {} rows to {}", report.written, report.location);
            Ok(())
        }
        Commands::Extract {
            url,
            out,
            chunk_size,
        } => {
            let llm_key = require_env("GROQ_API_KEY")?;
            let spider_key = require_env("SPIDER_API_KEY")?;

            let renderer = SpiderRenderer::new(spider_key)?;
            let llm = build_llm(&settings, llm_key)?;
            let chunker = Chunker::new(chunk_size.unwrap_or(settings.chunk_size))?;

            println!(
                "Extracting professors from {} ({} chars per chunk)...",
                url,
                chunker.max_chars()
            );
            let extraction = pipeline::extract_professors(&renderer, &llm, &url, &chunker).await?;
            let written = output::append_entries_csv(&out, &extraction.entries)?;
            println!(
                "Appended {} entries to {} ({} of {} chunks failed)",
                written,
                out.display(),
                extraction.failed_chunks.len(),
                extraction.chunk_count
            );
            print_failed_chunks(&extraction.failed_chunks);
            Ok(())
        }
        Commands::Profile { name, institution } => {
            let spider_key = require_env("SPIDER_API_KEY")?;
            let search_key = require_env("GOOGLE_API_KEY")?;
            let engine_id = require_env("GOOGLE_CSE_ID")?;

            let renderer = SpiderRenderer::new(spider_key)?;
            let search = build_search(&settings, search_key, engine_id)?;

            match pipeline::resolve_profile(&search, &renderer, &name, &institution).await {
                Ok(profile) if profile.has_recent_publication(settings.min_year) => {
                    println!("{}", profile.to_markdown());
                }
                Ok(_) => info!("{} has nothing published since {}", name, settings.min_year),
                Err(Skip::NotFound) => println!("No Scholar profile found for {}", name),
                Err(skip) => warn!("Could not load profile for {}: {}", name, skip),
            }
            Ok(())
        }
        Commands::Classify { text } => {
            let embed_key = require_env("OPENAI_API_KEY")?;
            let classifier = build_classifier(&settings, embed_key).await?;
            let result = classifier.classify(&text).await?;

            println!("Field: {}\n", result.field);
            for (field, score) in &result.scores {
                println!("  {:<32} {:.4}", truncate(field, 32), score);
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn build_llm(settings: &Settings, api_key: String) -> anyhow::Result<GroqClient> {
    GroqClient::new(
        api_key,
        &settings.llm_base_url,
        settings.llm_model.clone(),
        settings.http_timeout(),
        settings.llm_interval(),
    )
}

fn build_search(
    settings: &Settings,
    api_key: String,
    engine_id: String,
) -> anyhow::Result<GoogleSearch> {
    GoogleSearch::new(
        api_key,
        engine_id,
        settings.search_base_url.clone(),
        settings.http_timeout(),
        settings.search_interval(),
    )
}

async fn build_classifier(settings: &Settings, api_key: String) -> anyhow::Result<FieldClassifier> {
    let taxonomy = Taxonomy::load(&settings.taxonomy_path)?;
    let embedder = OpenAiEmbedder::new(
        api_key,
        &settings.embedding_base_url,
        settings.embedding_model.clone(),
        settings.http_timeout(),
        settings.embedding_max_retries,
        settings.embedding_batch_size,
    )?;
    FieldClassifier::new(Arc::new(embedder), &taxonomy).await
}

fn print_failed_chunks(failures: &[ChunkFailure]) {
    if failures.is_empty() {
        return;
    }
    println!("\n--- Failed chunks ---");
    for failure in failures {
        println!("  {}", truncate(&failure.to_string(), 100));
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

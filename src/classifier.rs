//! Research-field classification by nearest example title.
//!
//! Each field in the taxonomy carries a handful of representative paper
//! titles. Their embeddings are computed once when the classifier is built;
//! a researcher's score for a field is the best cosine match against any of
//! that field's examples.

use std::path::Path;
use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::embed::{cosine_similarity, Embedder};

#[derive(Debug, Clone, Deserialize)]
pub struct ResearchField {
    pub field: String,
    pub examples: Vec<String>,
}

/// Ordered field list. Order decides ties.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    fields: Vec<ResearchField>,
}

impl Taxonomy {
    pub fn new(fields: Vec<ResearchField>) -> Result<Self> {
        ensure!(!fields.is_empty(), "taxonomy has no fields");
        for f in &fields {
            ensure!(!f.field.trim().is_empty(), "taxonomy field with empty name");
            ensure!(!f.examples.is_empty(), "field {:?} has no example titles", f.field);
        }
        Ok(Self { fields })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let fields: Vec<ResearchField> =
            serde_json::from_str(json).context("taxonomy must be a JSON array of {field, examples}")?;
        Self::new(fields)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read taxonomy {:?}", path))?;
        Self::from_json(&json)
    }

    pub fn fields(&self) -> &[ResearchField] {
        &self.fields
    }
}

/// Example embeddings for one field.
#[derive(Debug, Clone)]
pub struct FieldExamples {
    pub name: String,
    pub embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub field: String,
    /// Every field with its best example similarity, in taxonomy order.
    pub scores: Vec<(String, f32)>,
}

pub struct FieldClassifier {
    embedder: Arc<dyn Embedder>,
    fields: Vec<FieldExamples>,
}

impl FieldClassifier {
    /// Embeds every example title up front, batching by the embedder's limit.
    pub async fn new(embedder: Arc<dyn Embedder>, taxonomy: &Taxonomy) -> Result<Self> {
        let titles: Vec<&str> = taxonomy
            .fields()
            .iter()
            .flat_map(|f| f.examples.iter().map(String::as_str))
            .collect();

        let mut vectors = Vec::with_capacity(titles.len());
        for batch in titles.chunks(embedder.batch_size().max(1)) {
            vectors.extend(
                embedder
                    .embed_batch(batch)
                    .await
                    .context("Failed to embed taxonomy examples")?,
            );
        }
        ensure!(
            vectors.len() == titles.len(),
            "embedded {} of {} example titles",
            vectors.len(),
            titles.len()
        );

        let mut vectors = vectors.into_iter();
        let fields: Vec<FieldExamples> = taxonomy
            .fields()
            .iter()
            .map(|f| FieldExamples {
                name: f.field.clone(),
                embeddings: vectors.by_ref().take(f.examples.len()).collect(),
            })
            .collect();

        info!(
            "Classifier ready: {} fields, {} example titles",
            fields.len(),
            titles.len()
        );
        Ok(Self { embedder, fields })
    }

    #[cfg(test)]
    pub fn fields(&self) -> &[FieldExamples] {
        &self.fields
    }

    pub async fn classify(&self, text: &str) -> Result<Classification> {
        let input = self
            .embedder
            .embed_batch(&[text])
            .await?
            .into_iter()
            .next()
            .context("embedder returned no vector for classification input")?;
        classify_embedding(&input, &self.fields)
    }
}

/// Best field for an already-embedded input.
pub fn classify_embedding(input: &[f32], fields: &[FieldExamples]) -> Result<Classification> {
    let scores = score_fields(input, fields);
    let mut best: Option<&(String, f32)> = None;
    for entry in &scores {
        if best.map_or(true, |b| entry.1 > b.1) {
            best = Some(entry);
        }
    }
    let field = best.context("no fields to classify against")?.0.clone();
    Ok(Classification { field, scores })
}

/// Max cosine similarity per field, in field order.
pub fn score_fields(input: &[f32], fields: &[FieldExamples]) -> Vec<(String, f32)> {
    fields
        .iter()
        .map(|f| {
            let best = f
                .embeddings
                .iter()
                .map(|e| cosine_similarity(input, e))
                .fold(f32::NEG_INFINITY, f32::max);
            (f.name.clone(), best)
        })
        .collect()
}

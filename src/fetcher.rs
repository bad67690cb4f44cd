use std::sync::LazyLock;
use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use spider_client::shapes::request::{ReturnFormat, ReturnFormatHandling};
use spider_client::{RequestParams, Spider};
use thiserror::Error;
use tracing::debug;

static IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").unwrap());
static BLANKS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("render failed for {url}: {message}")]
    Render { url: String, message: String },

    #[error("{url} returned status {status}")]
    Status { url: String, status: i64 },

    #[error("no content returned for {0}")]
    Empty(String),
}

/// Turns a URL into fully rendered page content.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Rendered body as markdown, with image syntax stripped.
    async fn render_markdown(&self, url: &str) -> Result<String, FetchError>;

    /// Rendered page as raw HTML.
    async fn render_html(&self, url: &str) -> Result<String, FetchError>;
}

/// Renderer backed by spider.cloud, which loads pages in a headless browser
/// before returning their content.
pub struct SpiderRenderer {
    spider: Spider,
}

impl SpiderRenderer {
    pub fn new(api_key: String) -> Result<Self> {
        let spider = Spider::new(Some(api_key))
            .map_err(|e| anyhow::anyhow!("Failed to create Spider client: {}", e))?;
        Ok(Self { spider })
    }

    async fn scrape(&self, url: &str, format: ReturnFormat) -> Result<String, FetchError> {
        let params = RequestParams {
            return_format: Some(ReturnFormatHandling::Single(format)),
            ..Default::default()
        };

        let start = Instant::now();
        let response = self
            .spider
            .scrape_url(url, Some(params), "application/json")
            .await
            .map_err(|e| FetchError::Render {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        debug!("Rendered {} in {}ms", url, start.elapsed().as_millis());

        let page = first_page(response);
        if let Some(status) = page.status.filter(|s| *s >= 400) {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }
        page.content
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| FetchError::Empty(url.to_string()))
    }
}

#[async_trait]
impl PageRenderer for SpiderRenderer {
    async fn render_markdown(&self, url: &str) -> Result<String, FetchError> {
        let markdown = self.scrape(url, ReturnFormat::Markdown).await?;
        Ok(strip_images(&markdown))
    }

    async fn render_html(&self, url: &str) -> Result<String, FetchError> {
        self.scrape(url, ReturnFormat::Raw).await
    }
}

#[derive(Debug, Default, PartialEq)]
struct RenderedPage {
    content: Option<String>,
    status: Option<i64>,
}

/// Spider answers with a JSON array (sometimes itself encoded as a string);
/// only the first page matters for a single-URL scrape.
fn first_page(value: serde_json::Value) -> RenderedPage {
    let parsed: serde_json::Value = match value.as_str() {
        Some(s) => serde_json::from_str(s).unwrap_or(value.clone()),
        None => value,
    };

    let Some(first) = parsed.as_array().and_then(|arr| arr.first()) else {
        return RenderedPage::default();
    };

    RenderedPage {
        content: first
            .get("content")
            .and_then(|c| c.as_str())
            .map(str::to_string),
        status: first.get("status").and_then(|s| s.as_i64()),
    }
}

/// Remove markdown image syntax: ![alt](url) and [![alt](url)](link)
pub fn strip_images(md: &str) -> String {
    let cleaned = IMAGE_RE.replace_all(md, "");
    BLANKS_RE.replace_all(&cleaned, "\n\n").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strips_inline_and_linked_images() {
        let md = "# Faculty\n![logo](/logo.png)\n[![photo](/a.jpg)](/people/a)\nJane Doe";
        let out = strip_images(md);
        assert!(!out.contains("logo.png"));
        assert!(!out.contains("a.jpg"));
        assert!(out.contains("[](/people/a)"));
        assert!(out.contains("Jane Doe"));
    }

    #[test]
    fn collapses_blank_runs() {
        assert_eq!(strip_images("a\n\n\n\n\nb"), "a\n\nb");
        assert_eq!(strip_images("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn first_page_reads_array_response() {
        let value = json!([{ "content": "# Hello", "status": 200 }]);
        let page = first_page(value);
        assert_eq!(page.content.as_deref(), Some("# Hello"));
        assert_eq!(page.status, Some(200));
    }

    #[test]
    fn first_page_reads_string_encoded_response() {
        let value = json!(r#"[{"content":"<html></html>","status":404}]"#);
        let page = first_page(value);
        assert_eq!(page.content.as_deref(), Some("<html></html>"));
        assert_eq!(page.status, Some(404));
    }

    #[test]
    fn first_page_missing_content() {
        assert_eq!(first_page(json!([])), RenderedPage::default());
        assert_eq!(first_page(json!({"error": "bad key"})), RenderedPage::default());
        assert_eq!(first_page(json!([{ "status": 500 }])).content, None);
    }
}

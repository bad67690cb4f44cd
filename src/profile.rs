use std::fmt::Write as _;
use std::ops::RangeInclusive;
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use url::Url;

pub const SCHOLAR_BASE_URL: &str = "https://scholar.google.com";
pub const MAX_PUBLICATIONS: usize = 5;

static NAME_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("#gsc_prf_in").unwrap());
static AFFILIATION_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(".gsc_prf_il").unwrap());
static METRIC_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("td.gsc_rsb_std").unwrap());
static ROW_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("tr.gsc_a_tr").unwrap());
static TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a.gsc_a_at").unwrap());
static AUTHORS_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse(".gs_gray").unwrap());
static YEAR_SEL: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span.gsc_a_h").unwrap());

/// Containers a citation page may use for the abstract, in priority order.
static DESCRIPTION_SELS: LazyLock<[Selector; 3]> = LazyLock::new(|| {
    [
        Selector::parse("div.gsh_csp").unwrap(),
        Selector::parse("div.gs_rs").unwrap(),
        Selector::parse("div.gsh_small").unwrap(),
    ]
});

#[derive(Debug, Clone, PartialEq)]
pub struct Publication {
    pub title: String,
    /// Absolute citation URL, empty when the row has no title link.
    pub link: String,
    pub authors: String,
    pub year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub name: String,
    pub affiliation: String,
    pub citations: String,
    pub h_index: String,
    /// Site order, at most [`MAX_PUBLICATIONS`].
    pub publications: Vec<Publication>,
}

impl Profile {
    /// First publication (newest-first listing) published inside `window`.
    pub fn recent_publication(&self, window: &RangeInclusive<i32>) -> Option<&Publication> {
        self.publications
            .iter()
            .find(|p| p.year.is_some_and(|y| window.contains(&y)))
    }

    pub fn has_recent_publication(&self, min_year: i32) -> bool {
        self.publications
            .iter()
            .filter_map(|p| p.year)
            .max()
            .is_some_and(|newest| newest >= min_year)
    }

    /// All publication titles joined into one classification input.
    pub fn titles_blob(&self) -> String {
        self.publications
            .iter()
            .map(|p| p.title.as_str())
            .collect::<Vec<_>>()
            .join(". ")
    }

    pub fn to_markdown(&self) -> String {
        let mut md = format!("# {}\n", self.name);
        let _ = writeln!(md, "**Affiliation**: {}\n", self.affiliation);
        let _ = writeln!(md, "- **Citations**: {}", self.citations);
        let _ = writeln!(md, "- **h-index**: {}\n", self.h_index);
        md.push_str("## Recent Publications\n");
        for p in &self.publications {
            let _ = write!(md, "- [{}]({})", p.title, p.link);
            if let Some(year) = p.year {
                let _ = write!(md, " ({})", year);
            }
            md.push('\n');
            let _ = writeln!(md, "  - _{}_", p.authors);
        }
        md
    }
}

/// Parses a rendered Scholar profile page. Missing elements fall back to
/// placeholder values instead of failing.
pub fn parse_profile(html: &str) -> Profile {
    let doc = Html::parse_document(html);

    let name = first_text(&doc, &NAME_SEL).unwrap_or_else(|| "Unknown".to_string());
    let affiliation = first_text(&doc, &AFFILIATION_SEL).unwrap_or_else(|| "N/A".to_string());

    let metrics: Vec<String> = doc.select(&METRIC_SEL).map(element_text).collect();
    let metric = |idx: usize| metrics.get(idx).cloned().unwrap_or_else(|| "N/A".to_string());

    let publications = doc
        .select(&ROW_SEL)
        .take(MAX_PUBLICATIONS)
        .map(parse_publication)
        .collect();

    Profile {
        name,
        affiliation,
        citations: metric(0),
        h_index: metric(2),
        publications,
    }
}

fn parse_publication(row: ElementRef<'_>) -> Publication {
    let title_el = row.select(&TITLE_SEL).next();
    let title = title_el
        .map(element_text)
        .unwrap_or_else(|| "Untitled".to_string());
    let link = title_el
        .and_then(|el| el.value().attr("href"))
        .map(absolute_link)
        .unwrap_or_default();
    let authors = row
        .select(&AUTHORS_SEL)
        .next()
        .map(element_text)
        .unwrap_or_default();
    let year = row
        .select(&YEAR_SEL)
        .next()
        .map(element_text)
        .and_then(|y| parse_year(&y));

    Publication {
        title,
        link,
        authors,
        year,
    }
}

/// Abstract text from a publication's citation page.
pub fn extract_description(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    DESCRIPTION_SELS.iter().find_map(|sel| {
        doc.select(sel)
            .map(element_text)
            .find(|t| !t.is_empty())
    })
}

fn parse_year(text: &str) -> Option<i32> {
    let t = text.trim();
    if t.is_empty() || !t.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    t.parse().ok()
}

fn absolute_link(href: &str) -> String {
    Url::parse(SCHOLAR_BASE_URL)
        .and_then(|base| base.join(href))
        .map(String::from)
        .unwrap_or_else(|_| format!("{}{}", SCHOLAR_BASE_URL, href))
}

fn first_text(doc: &Html, sel: &Selector) -> Option<String> {
    doc.select(sel).next().map(element_text)
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    fn publication(year: Option<i32>) -> Publication {
        Publication {
            title: format!("Paper {:?}", year),
            link: String::new(),
            authors: String::new(),
            year,
        }
    }

    fn profile_with(publications: Vec<Publication>) -> Profile {
        Profile {
            name: "Amy Lin".into(),
            affiliation: "Tufts University".into(),
            citations: "10".into(),
            h_index: "2".into(),
            publications,
        }
    }

    #[test]
    fn parses_profile_header_and_metrics() {
        let profile = parse_profile(&fixture("scholar_profile"));
        assert_eq!(profile.name, "Amy Lin");
        assert_eq!(profile.affiliation, "Assistant Professor of Computer Science, Tufts University");
        assert_eq!(profile.citations, "1482");
        assert_eq!(profile.h_index, "17");
    }

    #[test]
    fn keeps_first_five_publications_in_site_order() {
        let profile = parse_profile(&fixture("scholar_profile"));
        assert_eq!(profile.publications.len(), MAX_PUBLICATIONS);

        let first = &profile.publications[0];
        assert_eq!(first.title, "Graph Neural Networks for X");
        assert_eq!(
            first.link,
            "https://scholar.google.com/citations?view_op=view_citation&hl=en&user=AMY123&citation_for_view=AMY123:u5HHmVD_uO8C"
        );
        assert_eq!(first.authors, "A Lin, B Chen, C Osei");
        assert_eq!(first.year, Some(2024));

        let titles: Vec<&str> = profile.publications.iter().map(|p| p.title.as_str()).collect();
        assert!(!titles.contains(&"Sixth row is never read"));
    }

    #[test]
    fn row_fallbacks() {
        let profile = parse_profile(&fixture("scholar_profile"));
        // Row without a title link.
        let untitled = &profile.publications[2];
        assert_eq!(untitled.title, "Untitled");
        assert_eq!(untitled.link, "");
        // Non-numeric year cell.
        assert_eq!(untitled.year, None);
        // Row with an empty year cell and no author line.
        let bare = &profile.publications[3];
        assert_eq!(bare.year, None);
        assert_eq!(bare.authors, "");
    }

    #[test]
    fn empty_page_uses_defaults() {
        let profile = parse_profile("<html><body><p>Please show you're not a robot</p></body></html>");
        assert_eq!(profile.name, "Unknown");
        assert_eq!(profile.affiliation, "N/A");
        assert_eq!(profile.citations, "N/A");
        assert_eq!(profile.h_index, "N/A");
        assert!(profile.publications.is_empty());
    }

    #[test]
    fn short_metrics_table_falls_back_for_h_index() {
        let html = r#"<table><tr><td class="gsc_rsb_std">88</td><td class="gsc_rsb_std">40</td></tr></table>"#;
        let profile = parse_profile(html);
        assert_eq!(profile.citations, "88");
        assert_eq!(profile.h_index, "N/A");
    }

    #[test]
    fn selects_first_publication_inside_window() {
        let profile = profile_with(vec![
            publication(Some(2022)),
            publication(Some(2024)),
            publication(None),
        ]);
        let picked = profile.recent_publication(&(2023..=2025)).unwrap();
        assert_eq!(picked.year, Some(2024));
    }

    #[test]
    fn rejects_profiles_without_recent_work() {
        let old = profile_with(vec![publication(Some(2020))]);
        assert!(old.recent_publication(&(2023..=2025)).is_none());

        let undated = profile_with(vec![publication(None), publication(Some(2021))]);
        assert!(undated.recent_publication(&(2023..=2025)).is_none());

        let future = profile_with(vec![publication(Some(2026))]);
        assert!(future.recent_publication(&(2023..=2025)).is_none());
    }

    #[test]
    fn has_recent_publication_uses_newest_year() {
        assert!(profile_with(vec![publication(Some(2019)), publication(Some(2023))])
            .has_recent_publication(2023));
        assert!(!profile_with(vec![publication(Some(2022)), publication(None)])
            .has_recent_publication(2023));
        assert!(!profile_with(vec![]).has_recent_publication(2023));
    }

    #[test]
    fn titles_blob_joins_with_periods() {
        let profile = parse_profile(&fixture("scholar_profile"));
        assert!(profile
            .titles_blob()
            .starts_with("Graph Neural Networks for X. Message passing on molecular graphs. Untitled"));
    }

    #[test]
    fn markdown_summary() {
        let profile = parse_profile(&fixture("scholar_profile"));
        let md = profile.to_markdown();
        assert!(md.starts_with("# Amy Lin\n"));
        assert!(md.contains("- **Citations**: 1482\n"));
        assert!(md.contains("- **h-index**: 17\n"));
        assert!(md.contains("- [Graph Neural Networks for X](https://scholar.google.com/citations?"));
        assert!(md.contains(") (2024)\n  - _A Lin, B Chen, C Osei_\n"));
    }

    #[test]
    fn description_prefers_csp_container() {
        let desc = extract_description(&fixture("scholar_citation")).unwrap();
        assert!(desc.starts_with("We introduce a graph neural network"));
    }

    #[test]
    fn description_falls_back_through_containers() {
        let html = r#"<div class="gsh_small">Short abstract.</div><div class="gs_rs">Snippet text.</div>"#;
        assert_eq!(extract_description(html).as_deref(), Some("Snippet text."));

        let html = r#"<div class="gsh_small">  Short abstract. </div>"#;
        assert_eq!(extract_description(html).as_deref(), Some("Short abstract."));

        assert_eq!(extract_description("<div>nothing here</div>"), None);
    }

    #[test]
    fn empty_container_falls_through_to_next_pattern() {
        let html = r#"<div class="gsh_csp">  </div><div class="gs_rs">Real snippet.</div>"#;
        assert_eq!(extract_description(html).as_deref(), Some("Real snippet."));

        let html = r#"<div class="gsh_csp"></div><div class="gs_rs"></div>"#;
        assert_eq!(extract_description(html), None);
    }

    #[test]
    fn year_must_be_all_digits() {
        assert_eq!(parse_year(" 2024 "), Some(2024));
        assert_eq!(parse_year("2024a"), None);
        assert_eq!(parse_year("-2024"), None);
        assert_eq!(parse_year(""), None);
    }
}

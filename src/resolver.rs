use tracing::info;
use url::Url;

use crate::search::{SearchEngine, SearchError};

pub const PROFILE_URL_MARKER: &str = "scholar.google.com/citations?";
pub const MAX_SEARCH_RESULTS: usize = 10;

/// Query parameters forcing the full works list, newest first.
const PROFILE_VIEW_PARAMS: [(&str, &str); 2] = [("view_op", "list_works"), ("sortby", "pubdate")];

pub fn profile_query(name: &str, institution: &str) -> String {
    format!("{} {} google scholar", name, institution)
}

/// First search hit that points at a Scholar profile, if any.
pub async fn find_profile_url(
    search: &dyn SearchEngine,
    name: &str,
    institution: &str,
) -> Result<Option<String>, SearchError> {
    let query = profile_query(name, institution);
    info!("Searching: {}", query);
    let results = search.search(&query, MAX_SEARCH_RESULTS).await?;
    let found = results
        .into_iter()
        .find(|url| url.contains(PROFILE_URL_MARKER));
    if let Some(url) = &found {
        info!("Found Scholar profile: {}", url);
    }
    Ok(found)
}

/// Rewrites a profile URL so it lists all works sorted by publication date.
///
/// Existing parameters keep their order (first value wins when repeated), the
/// two view parameters are overwritten or appended, and the fragment is dropped.
pub fn canonicalize_profile_url(raw: &str) -> Result<String, url::ParseError> {
    let mut url = Url::parse(raw)?;

    let mut params: Vec<(String, String)> = Vec::new();
    for (key, value) in url.query_pairs() {
        if !params.iter().any(|(seen, _)| *seen == key) {
            params.push((key.into_owned(), value.into_owned()));
        }
    }
    for (key, value) in PROFILE_VIEW_PARAMS {
        match params.iter_mut().find(|(k, _)| k == key) {
            Some(param) => param.1 = value.to_string(),
            None => params.push((key.to_string(), value.to_string())),
        }
    }

    url.set_fragment(None);
    url.query_pairs_mut().clear().extend_pairs(&params);
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    struct StaticSearch {
        results: Vec<String>,
        queries: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl SearchEngine for StaticSearch {
        async fn search(&self, query: &str, max_results: usize) -> Result<Vec<String>, SearchError> {
            self.queries.lock().unwrap().push((query.to_string(), max_results));
            Ok(self.results.clone())
        }
    }

    fn static_search(results: &[&str]) -> StaticSearch {
        StaticSearch {
            results: results.iter().map(|s| s.to_string()).collect(),
            queries: Mutex::new(Vec::new()),
        }
    }

    fn query_values(url: &str, key: &str) -> Vec<String> {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
            .collect()
    }

    #[tokio::test]
    async fn picks_first_profile_result() {
        let search = static_search(&[
            "https://engineering.tufts.edu/people/amy-lin",
            "https://scholar.google.com/citations?user=AMY123&hl=en",
            "https://scholar.google.com/citations?user=OTHER&hl=en",
        ]);
        let url = find_profile_url(&search, "Dr. Amy Lin", "Tufts University")
            .await
            .unwrap();
        assert_eq!(url.as_deref(), Some("https://scholar.google.com/citations?user=AMY123&hl=en"));

        let queries = search.queries.lock().unwrap();
        assert_eq!(
            queries[0],
            ("Dr. Amy Lin Tufts University google scholar".to_string(), MAX_SEARCH_RESULTS)
        );
    }

    #[tokio::test]
    async fn not_found_is_none() {
        let search = static_search(&[
            "https://scholar.google.com/scholar?q=amy+lin",
            "https://www.linkedin.com/in/amylin",
        ]);
        let url = find_profile_url(&search, "Amy Lin", "Tufts University").await.unwrap();
        assert!(url.is_none());
    }

    #[test]
    fn adds_view_params_when_absent() {
        let url = canonicalize_profile_url("https://scholar.google.com/citations?user=AMY123&hl=en")
            .unwrap();
        assert_eq!(
            url,
            "https://scholar.google.com/citations?user=AMY123&hl=en&view_op=list_works&sortby=pubdate"
        );
    }

    #[test]
    fn overrides_existing_view_params() {
        let url = canonicalize_profile_url(
            "https://scholar.google.com/citations?hl=en&sortby=title&user=AMY123&view_op=search_authors",
        )
        .unwrap();
        assert_eq!(query_values(&url, "sortby"), vec!["pubdate"]);
        assert_eq!(query_values(&url, "view_op"), vec!["list_works"]);
        assert_eq!(query_values(&url, "user"), vec!["AMY123"]);
        assert!(url.starts_with("https://scholar.google.com/citations?hl=en&sortby=pubdate"));
    }

    #[test]
    fn repeated_params_collapse_to_first_value() {
        let url = canonicalize_profile_url(
            "https://scholar.google.com/citations?user=A&user=B&sortby=title&sortby=pubdate#top",
        )
        .unwrap();
        assert_eq!(query_values(&url, "user"), vec!["A"]);
        assert_eq!(query_values(&url, "sortby"), vec!["pubdate"]);
        assert!(!url.contains('#'));
    }

    #[test]
    fn canonicalization_is_idempotent() {
        for raw in [
            "https://scholar.google.com/citations?user=AMY123&hl=en",
            "https://scholar.google.com/citations?user=AMY123&view_op=list_works&sortby=pubdate",
            "https://scholar.google.com/citations?hl=de&user=x%20y&oi=ao",
        ] {
            let once = canonicalize_profile_url(raw).unwrap();
            let twice = canonicalize_profile_url(&once).unwrap();
            assert_eq!(once, twice);
            assert_eq!(query_values(&once, "view_op").len(), 1);
            assert_eq!(query_values(&once, "sortby").len(), 1);
        }
    }

    #[test]
    fn rejects_unparseable_url() {
        assert!(canonicalize_profile_url("not a url").is_err());
    }
}

//! Public web search used to widen the context: Wikipedia and DuckDuckGo
//! instant answers.
//!
//! Every engine returns ready-to-cite [`SourceRef`]s with `content` filled.
//! [`CompositeWebSearch`] queries engines in order and tolerates individual
//! failures; an engine error is logged and its results are simply missing.
//!
//! Limitation: the DuckDuckGo Instant Answer API only knows entities with a
//! curated abstract, so it returns nothing for most geoscience questions
//! ("subsidence rates in the Po delta"). It is not a general results page.
//! [`CompositeWebSearch::public`] therefore asks Wikipedia first and keeps
//! DuckDuckGo as a best-effort second engine; an empty answer from it is
//! normal and not logged as a failure.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    api_types::{SourceKind, SourceRef},
    error::ContextorError,
    prompt::{excerpt, truncate_chars},
};

const WIKIPEDIA: &str = "wikipedia";
const DUCKDUCKGO: &str = "duckduckgo";

const WIKI_CONTENT_CHARS: usize = 1500;
const WEB_CONTENT_CHARS: usize = 1000;
const WIKI_PAGES: usize = 2;
const WIKI_SCORE: f32 = 0.9;
const WEB_SCORE: f32 = 0.8;

#[async_trait]
pub trait WebSearch: Send + Sync {
    /// Up to `max_results` sources for `query`.
    async fn search(&self, query: &str, max_results: usize)
    -> Result<Vec<SourceRef>, ContextorError>;
}

fn http_client(timeout_secs: u64) -> Result<reqwest::Client, ContextorError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("geogpt-rag/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(ContextorError::http("web search"))
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn web_source(
    kind: SourceKind,
    title: &str,
    url: &str,
    summary: &str,
    content: &str,
    score: f32,
) -> SourceRef {
    SourceRef {
        kind,
        filename: None,
        title: Some(title.to_string()),
        url: (!url.is_empty()).then(|| url.to_string()),
        relevance_score: score,
        excerpt: excerpt(summary),
        content: Some(content.to_string()),
        page_number: None,
        section: None,
        timestamp: Some(now_rfc3339()),
    }
}

/// MediaWiki search followed by one plain-text extract per hit.
pub struct WikipediaSearch {
    client: reqwest::Client,
    api_url: String,
}

impl WikipediaSearch {
    /// `base_url` like `https://en.wikipedia.org`.
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, ContextorError> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            api_url: format!("{}/w/api.php", base_url.trim_end_matches('/')),
        })
    }

    async fn get_json(&self, params: &[(&str, &str)]) -> Result<Value, ContextorError> {
        let resp = self
            .client
            .get(&self.api_url)
            .query(params)
            .send()
            .await
            .map_err(ContextorError::http(WIKIPEDIA))?;
        if !resp.status().is_success() {
            return Err(ContextorError::WebDecode {
                service: WIKIPEDIA,
                reason: format!("HTTP {}", resp.status()),
            });
        }
        resp.json().await.map_err(ContextorError::http(WIKIPEDIA))
    }

    async fn page(&self, title: &str) -> Result<Option<SourceRef>, ContextorError> {
        let v = self
            .get_json(&[
                ("action", "query"),
                ("prop", "extracts|info"),
                ("inprop", "url"),
                ("explaintext", "1"),
                ("redirects", "1"),
                ("format", "json"),
                ("titles", title),
            ])
            .await?;
        Ok(parse_wiki_page(&v))
    }
}

#[async_trait]
impl WebSearch for WikipediaSearch {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SourceRef>, ContextorError> {
        let limit = WIKI_PAGES.min(max_results).to_string();
        let v = self
            .get_json(&[
                ("action", "query"),
                ("list", "search"),
                ("format", "json"),
                ("srlimit", &limit),
                ("srsearch", query),
            ])
            .await?;

        let mut out = Vec::new();
        for title in parse_wiki_titles(&v) {
            match self.page(&title).await {
                Ok(Some(src)) => out.push(src),
                Ok(None) => debug!(%title, "wikipedia page had no extract"),
                Err(e) => warn!(%title, error = %e, "failed to fetch wikipedia page"),
            }
        }
        Ok(out)
    }
}

fn parse_wiki_titles(v: &Value) -> Vec<String> {
    v.pointer("/query/search")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .filter_map(|h| h.get("title").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_wiki_page(v: &Value) -> Option<SourceRef> {
    let page = v
        .pointer("/query/pages")
        .and_then(Value::as_object)?
        .values()
        .next()?;
    let extract = page.get("extract").and_then(Value::as_str)?.trim();
    if extract.is_empty() {
        return None;
    }
    let title = page.get("title").and_then(Value::as_str).unwrap_or_default();
    let url = page.get("fullurl").and_then(Value::as_str).unwrap_or_default();
    let summary = extract.split("\n\n").next().unwrap_or(extract);
    Some(web_source(
        SourceKind::Wikipedia,
        title,
        url,
        summary,
        truncate_chars(extract, WIKI_CONTENT_CHARS),
        WIKI_SCORE,
    ))
}

/// DuckDuckGo Instant Answer API: the abstract plus related topics.
///
/// Answers only for well-known entities; expect an empty list for
/// free-form or regional queries.
pub struct DuckDuckGoSearch {
    client: reqwest::Client,
    base_url: String,
}

impl DuckDuckGoSearch {
    /// `base_url` like `https://api.duckduckgo.com`.
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, ContextorError> {
        Ok(Self {
            client: http_client(timeout_secs)?,
            base_url: format!("{}/", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl WebSearch for DuckDuckGoSearch {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SourceRef>, ContextorError> {
        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .map_err(ContextorError::http(DUCKDUCKGO))?;
        if !resp.status().is_success() {
            return Err(ContextorError::WebDecode {
                service: DUCKDUCKGO,
                reason: format!("HTTP {}", resp.status()),
            });
        }
        // The API answers with `application/x-javascript`; decode the body by hand.
        let body = resp.text().await.map_err(ContextorError::http(DUCKDUCKGO))?;
        let v: Value = serde_json::from_str(&body).map_err(|e| ContextorError::WebDecode {
            service: DUCKDUCKGO,
            reason: e.to_string(),
        })?;
        Ok(parse_ddg(&v, max_results))
    }
}

fn parse_ddg(v: &Value, max_results: usize) -> Vec<SourceRef> {
    let s = |k: &str| v.get(k).and_then(Value::as_str).unwrap_or_default().trim();
    let mut out = Vec::new();

    let abstract_text = s("AbstractText");
    if !abstract_text.is_empty() {
        out.push(web_source(
            SourceKind::WebSearch,
            s("Heading"),
            s("AbstractURL"),
            abstract_text,
            truncate_chars(abstract_text, WEB_CONTENT_CHARS),
            WEB_SCORE,
        ));
    }

    let mut topics: Vec<&Value> = Vec::new();
    if let Some(related) = v.get("RelatedTopics").and_then(Value::as_array) {
        for t in related {
            // Grouped topics nest their entries under `Topics`.
            match t.get("Topics").and_then(Value::as_array) {
                Some(nested) => topics.extend(nested.iter()),
                None => topics.push(t),
            }
        }
    }

    for t in topics {
        if out.len() >= max_results {
            break;
        }
        let text = t.get("Text").and_then(Value::as_str).unwrap_or_default().trim();
        if text.is_empty() {
            continue;
        }
        let url = t.get("FirstURL").and_then(Value::as_str).unwrap_or_default();
        let title = text.split(" - ").next().unwrap_or(text);
        out.push(web_source(
            SourceKind::WebSearch,
            truncate_chars(title, 120),
            url,
            text,
            truncate_chars(text, WEB_CONTENT_CHARS),
            WEB_SCORE,
        ));
    }

    out.truncate(max_results);
    out
}

/// Runs every engine in order and concatenates their results.
pub struct CompositeWebSearch {
    engines: Vec<Arc<dyn WebSearch>>,
}

impl CompositeWebSearch {
    pub fn new(engines: Vec<Arc<dyn WebSearch>>) -> Self {
        Self { engines }
    }

    /// Wikipedia then DuckDuckGo against the public endpoints.
    pub fn public(timeout_secs: u64) -> Result<Self, ContextorError> {
        Ok(Self::new(vec![
            Arc::new(WikipediaSearch::new("https://en.wikipedia.org", timeout_secs)?),
            Arc::new(DuckDuckGoSearch::new("https://api.duckduckgo.com", timeout_secs)?),
        ]))
    }

    pub fn engine_count(&self) -> usize {
        self.engines.len()
    }
}

#[async_trait]
impl WebSearch for CompositeWebSearch {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SourceRef>, ContextorError> {
        let mut out = Vec::new();
        for engine in &self.engines {
            match engine.search(query, max_results).await {
                Ok(found) if found.is_empty() => debug!(%query, "web search engine had no answer"),
                Ok(found) => out.extend(found),
                Err(e) => warn!(error = %e, "web search engine failed; continuing"),
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ddg_abstract_and_nested_topics() {
        let v = json!({
            "Heading": "Geoid",
            "AbstractText": "The geoid is the shape the ocean surface would take.",
            "AbstractURL": "https://en.wikipedia.org/wiki/Geoid",
            "RelatedTopics": [
                { "Text": "Ellipsoid - A surface of revolution", "FirstURL": "https://duckduckgo.com/Ellipsoid" },
                { "Name": "See also", "Topics": [
                    { "Text": "Datum - Reference frame", "FirstURL": "https://duckduckgo.com/Datum" }
                ]}
            ]
        });
        let out = parse_ddg(&v, 5);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].title.as_deref(), Some("Geoid"));
        assert_eq!(out[1].title.as_deref(), Some("Ellipsoid"));
        assert_eq!(out[2].url.as_deref(), Some("https://duckduckgo.com/Datum"));
        assert!(out.iter().all(|s| s.kind == SourceKind::WebSearch && s.relevance_score == 0.8));

        assert_eq!(parse_ddg(&v, 1).len(), 1);
    }

    #[test]
    fn wiki_page_extract_is_capped() {
        let v = json!({ "query": { "pages": { "42": {
            "title": "Geoid",
            "fullurl": "https://en.wikipedia.org/wiki/Geoid",
            "extract": format!("Intro.\n\n{}", "x".repeat(3000))
        }}}});
        let src = parse_wiki_page(&v).unwrap();
        assert_eq!(src.kind, SourceKind::Wikipedia);
        assert_eq!(src.excerpt, "Intro.");
        assert_eq!(src.content.as_ref().unwrap().chars().count(), 1500);
        assert_eq!(src.relevance_score, 0.9);

        let titles = parse_wiki_titles(&json!({ "query": { "search": [{ "title": "A" }, { "title": "B" }] } }));
        assert_eq!(titles, vec!["A", "B"]);
    }

    struct Failing;

    #[async_trait]
    impl WebSearch for Failing {
        async fn search(&self, _: &str, _: usize) -> Result<Vec<SourceRef>, ContextorError> {
            Err(ContextorError::WebDecode {
                service: "test",
                reason: "down".into(),
            })
        }
    }

    struct Fixed;

    #[async_trait]
    impl WebSearch for Fixed {
        async fn search(&self, q: &str, _: usize) -> Result<Vec<SourceRef>, ContextorError> {
            Ok(vec![web_source(SourceKind::WebSearch, q, "", q, q, WEB_SCORE)])
        }
    }

    struct Empty;

    #[async_trait]
    impl WebSearch for Empty {
        async fn search(&self, _: &str, _: usize) -> Result<Vec<SourceRef>, ContextorError> {
            Ok(Vec::new())
        }
    }

    struct Named(&'static str, SourceKind);

    #[async_trait]
    impl WebSearch for Named {
        async fn search(&self, _: &str, _: usize) -> Result<Vec<SourceRef>, ContextorError> {
            Ok(vec![web_source(self.1, self.0, "", self.0, self.0, WEB_SCORE)])
        }
    }

    #[tokio::test]
    async fn encyclopedia_results_lead_and_survive_an_empty_instant_answer() {
        let wiki: Arc<dyn WebSearch> = Arc::new(Named("Po Delta", SourceKind::Wikipedia));
        let web = CompositeWebSearch::new(vec![wiki.clone(), Arc::new(Empty)]);
        let out = web.search("subsidence rates in the Po delta", 5).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, SourceKind::Wikipedia);

        let web = CompositeWebSearch::new(vec![
            wiki,
            Arc::new(Failing),
            Arc::new(Named("Geoid", SourceKind::WebSearch)),
        ]);
        let kinds: Vec<_> = web
            .search("geoid", 5)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.kind)
            .collect();
        assert_eq!(kinds, vec![SourceKind::Wikipedia, SourceKind::WebSearch]);
    }

    #[test]
    fn ddg_without_abstract_or_topics_is_empty() {
        let v = json!({ "Heading": "", "AbstractText": "", "RelatedTopics": [] });
        assert!(parse_ddg(&v, 5).is_empty());
    }

    #[test]
    fn public_search_has_both_engines() {
        assert_eq!(CompositeWebSearch::public(5).unwrap().engine_count(), 2);
    }

    #[tokio::test]
    async fn composite_skips_failing_engines() {
        let web = CompositeWebSearch::new(vec![Arc::new(Failing), Arc::new(Fixed)]);
        let out = web.search("geoid", 5).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].title.as_deref(), Some("geoid"));
    }
}

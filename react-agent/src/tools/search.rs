//! Web search tools.
//!
//! - SerpApi (Google results, needs SERPAPI_API_KEY)
//! - DuckDuckGo HTML (free, no API key, best-effort)
//!
//! Both return plain text observations, including on failure.

use reqwest::Client;
use serde_json::Value;

use super::{ToolFuture, ToolTrait};

const SERPAPI_ENDPOINT: &str = "https://serpapi.com/search.json";
const DUCKDUCKGO_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const MAX_RESULTS: usize = 3;
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

fn not_found(query: &str) -> String {
    format!("Sorry, no information found about '{}'.", query)
}

fn search_error(e: impl std::fmt::Display) -> String {
    format!("Error during search: {}", e)
}

fn value_text(value: &Value) -> String {
    match value.as_str() {
        Some(s) => s.to_string(),
        None => value.to_string(),
    }
}

pub struct SerpApiSearch {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
}

impl SerpApiSearch {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.filter(|k| !k.is_empty()),
            endpoint: SERPAPI_ENDPOINT.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub async fn search(&self, query: &str) -> String {
        tracing::info!(query = %query, "Executing [SerpApi] web search");

        let Some(api_key) = &self.api_key else {
            return "Error: SERPAPI_API_KEY not configured.".to_string();
        };

        match self.fetch(query, api_key).await {
            Ok(results) => summarize_serpapi(query, &results),
            Err(e) => {
                tracing::warn!(error = %e, "SerpApi search failed");
                search_error(e)
            }
        }
    }

    async fn fetch(&self, query: &str, api_key: &str) -> Result<Value, reqwest::Error> {
        self.client
            .get(&self.endpoint)
            .query(&[
                ("engine", "google"),
                ("q", query),
                ("api_key", api_key),
                ("google_domain", "google.com"),
                ("gl", "sg"),
                ("hl", "en"),
            ])
            .send()
            .await?
            .json::<Value>()
            .await
    }
}

impl ToolTrait for SerpApiSearch {
    fn invoke<'a>(&'a self, input: &'a str) -> ToolFuture<'a> {
        Box::pin(self.search(input))
    }
}

/// Picks the most direct answer out of a SerpApi result document.
///
/// Priority: answer box list, answer box answer, knowledge graph description,
/// then the top organic snippets.
pub fn summarize_serpapi(query: &str, results: &Value) -> String {
    if let Some(error) = results.get("error") {
        return search_error(value_text(error));
    }

    if let Some(list) = results.get("answer_box_list").and_then(|l| l.as_array()) {
        return list.iter().map(value_text).collect::<Vec<_>>().join("\n");
    }

    if let Some(answer) = results.pointer("/answer_box/answer") {
        return value_text(answer);
    }

    if let Some(description) = results.pointer("/knowledge_graph/description") {
        return value_text(description);
    }

    if let Some(organic) = results.get("organic_results").and_then(|o| o.as_array())
        && !organic.is_empty()
    {
        return organic
            .iter()
            .take(MAX_RESULTS)
            .enumerate()
            .map(|(i, r)| {
                format!(
                    "[{}] {}\n{}",
                    i + 1,
                    r["title"].as_str().unwrap_or(""),
                    r["snippet"].as_str().unwrap_or("")
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n");
    }

    not_found(query)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

pub struct DuckDuckGoSearch {
    client: Client,
    endpoint: String,
}

impl Default for DuckDuckGoSearch {
    fn default() -> Self {
        Self::new()
    }
}

impl DuckDuckGoSearch {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            endpoint: DUCKDUCKGO_ENDPOINT.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub async fn search(&self, query: &str) -> String {
        tracing::info!(query = %query, "Executing [DuckDuckGo] web search");

        match self.fetch(query).await {
            Ok(html) => {
                let hits = parse_duckduckgo_html(&html, MAX_RESULTS);
                if hits.is_empty() {
                    not_found(query)
                } else {
                    format_hits(&hits)
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "DuckDuckGo search failed");
                search_error(e)
            }
        }
    }

    async fn fetch(&self, query: &str) -> Result<String, reqwest::Error> {
        let url = format!("{}?q={}", self.endpoint, urlencoding::encode(query));
        self.client
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
    }
}

impl ToolTrait for DuckDuckGoSearch {
    fn invoke<'a>(&'a self, input: &'a str) -> ToolFuture<'a> {
        Box::pin(self.search(input))
    }
}

pub fn format_hits(hits: &[SearchHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| format!("[{}] {}\n{}\n{}", i + 1, hit.title, hit.snippet, hit.url))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Parse the DuckDuckGo HTML results page.
pub fn parse_duckduckgo_html(html: &str, max_results: usize) -> Vec<SearchHit> {
    use scraper::{Html, Selector};

    let (Ok(result_sel), Ok(link_sel), Ok(snippet_sel)) = (
        Selector::parse(".result"),
        Selector::parse(".result__a"),
        Selector::parse(".result__snippet"),
    ) else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let mut hits = Vec::new();

    for element in document.select(&result_sel) {
        if hits.len() >= max_results {
            break;
        }

        let link = element.select(&link_sel).next();
        let title = link
            .map(|el| el.text().collect::<String>())
            .unwrap_or_default()
            .trim()
            .to_string();
        let url = normalize_duckduckgo_url(link.and_then(|el| el.value().attr("href")).unwrap_or(""));
        let snippet = element
            .select(&snippet_sel)
            .next()
            .map(|el| el.text().collect::<String>())
            .unwrap_or_default()
            .trim()
            .to_string();

        if !title.is_empty() && !url.is_empty() {
            hits.push(SearchHit { title, url, snippet });
        }
    }

    hits
}

/// DuckDuckGo wraps result links as `https://duckduckgo.com/l/?uddg=<target>`.
fn normalize_duckduckgo_url(raw_url: &str) -> String {
    let absolute = if raw_url.starts_with("//") {
        format!("https:{}", raw_url)
    } else {
        raw_url.to_string()
    };

    let Ok(parsed) = url::Url::parse(&absolute) else {
        return raw_url.to_string();
    };

    if parsed.domain() == Some("duckduckgo.com")
        && parsed.path().starts_with("/l/")
        && let Some((_, target)) = parsed.query_pairs().find(|(key, _)| key == "uddg")
    {
        return target.into_owned();
    }

    absolute
}

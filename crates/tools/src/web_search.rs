//! Web search tool backed by DuckDuckGo's HTML endpoint (no API key needed).
//!
//! Output contract: this tool never raises a search failure to its caller.
//! Results become a numbered text digest, an empty result set becomes a
//! "no results" line, and a failed fetch becomes an error line — all returned
//! as text, because the consuming model only understands text-shaped tool
//! outputs.

use async_trait::async_trait;
use tracing::debug;
use websage_core::error::ToolError;
use websage_core::tool::{Tool, ToolResult};

const SEARCH_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const MAX_RESULTS: usize = 5;

/// A single extracted search result. Missing fields stay empty rather than
/// dropping the entry.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub title: String,
    pub snippet: String,
    pub url: String,
}

pub struct WebSearchTool {
    client: reqwest::Client,
    endpoint: String,
    max_results: usize,
}

impl WebSearchTool {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent("Mozilla/5.0 (compatible; websage/0.1)")
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            endpoint: SEARCH_ENDPOINT.into(),
            max_results: MAX_RESULTS,
        }
    }

    /// Cap the number of results folded into the digest (hard ceiling 5).
    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max.clamp(1, MAX_RESULTS);
        self
    }

    /// Point the tool at a different search endpoint. Used by tests to
    /// exercise the failure path without a live network.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    async fn fetch(&self, query: &str) -> Result<String, reqwest::Error> {
        let url = format!("{}?q={}", self.endpoint, urlencoding::encode(query));
        let response = self.client.get(&url).send().await?;
        response.error_for_status()?.text().await
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web with DuckDuckGo. Returns up to 5 results with titles, \
         snippets, and source URLs. Use for questions that need current or \
         external information."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Number of results to return (default 5, max 5)",
                    "default": 5
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;

        let limit = arguments["max_results"]
            .as_u64()
            .map(|n| (n as usize).clamp(1, MAX_RESULTS))
            .unwrap_or(self.max_results);

        debug!(query, limit, "Running web search");

        match self.fetch(query).await {
            Ok(html) => {
                let results = extract_results(&html, limit);
                Ok(ToolResult {
                    call_id: String::new(),
                    success: true,
                    output: render_digest(query, &results),
                })
            }
            Err(e) => Ok(ToolResult {
                call_id: String::new(),
                success: false,
                output: format!("Error during search: {e}"),
            }),
        }
    }
}

/// Fold extracted results into the text digest handed back to the model.
pub(crate) fn render_digest(query: &str, results: &[SearchResult]) -> String {
    if results.is_empty() {
        return format!("No search results found for: {query}");
    }

    let mut summary = format!("Search results for '{query}':\n\n");
    for (i, r) in results.iter().enumerate() {
        summary.push_str(&format!(
            "{}. **{}**\n   {}\n   Source: {}\n\n",
            i + 1,
            r.title,
            r.snippet,
            r.url
        ));
    }
    summary
}

/// Extract up to `limit` results from DuckDuckGo's HTML result page.
///
/// Each result lives in a `result__body` block with `result__a` (title),
/// `result__snippet`, and `result__url` elements. Fields that fail to parse
/// are kept as empty strings.
pub(crate) fn extract_results(html: &str, limit: usize) -> Vec<SearchResult> {
    let mut results = Vec::new();

    for chunk in html.split("class=\"result__body\"").skip(1) {
        if results.len() >= limit {
            break;
        }

        let title = element_text(chunk, "result__a");
        let snippet = element_text(chunk, "result__snippet");
        let url = chunk
            .split("class=\"result__url\"")
            .nth(1)
            .and_then(|s| s.split('>').nth(1))
            .and_then(|s| s.split('<').next())
            .map(str::trim)
            .unwrap_or("")
            .to_string();

        results.push(SearchResult {
            title,
            snippet,
            url,
        });
    }

    results
}

/// Text content of the first element with the given class, tags stripped.
fn element_text(chunk: &str, class: &str) -> String {
    let marker = format!("class=\"{class}\"");
    let Some(after_class) = chunk.split(marker.as_str()).nth(1) else {
        return String::new();
    };
    let Some((_, inner)) = after_class.split_once('>') else {
        return String::new();
    };
    let inner = inner
        .split("</a>")
        .next()
        .unwrap_or("")
        .split("</td>")
        .next()
        .unwrap_or("");

    html_decode(&strip_tags(inner)).trim().to_string()
}

/// Remove HTML tags, keeping only text content.
fn strip_tags(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_tag = false;
    for c in s.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out
}

/// Basic HTML entity decoding.
fn html_decode(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::{SearchConfig, SearchDepth};

/// What a search provider found for one query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResults {
    /// Synthesized answer over all hits, when the provider offers one
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub content: String,
}

pub trait SearchProvider: Send + Sync {
    fn search(&self, query: &str) -> impl Future<Output = anyhow::Result<SearchResults>> + Send;
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    search_depth: SearchDepth,
    max_results: u32,
    include_answer: bool,
    include_raw_content: bool,
}

/// Web search over the Tavily REST API.
pub struct TavilySearch {
    client: Client,
    endpoint: String,
    api_key: String,
    max_results: u32,
    depth: SearchDepth,
}

impl TavilySearch {
    pub fn new(config: &SearchConfig, api_key: String) -> anyhow::Result<Self> {
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/search", config.api_base.trim_end_matches('/')),
            api_key,
            max_results: config.max_results,
            depth: config.depth,
        })
    }
}

impl SearchProvider for TavilySearch {
    fn search(&self, query: &str) -> impl Future<Output = anyhow::Result<SearchResults>> + Send {
        let request = SearchRequest {
            query,
            search_depth: self.depth,
            max_results: self.max_results,
            include_answer: true,
            include_raw_content: false,
        };
        async move {
            let response = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&request)
                .send()
                .await?;
            if !response.status().is_success() {
                let status = response.status();
                let error_text = response.text().await.unwrap_or_default();
                anyhow::bail!("search API error {status}: {error_text}");
            }
            Ok(response.json::<SearchResults>().await?)
        }
    }
}

//! Content generation: optional web search enrichment, a prompt per request
//! kind, then an ordered waterfall over generation backends.

pub mod backend;
pub mod search;

use std::str::FromStr;

use schemars::schema_for;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

use self::{backend::GenerationBackend, search::SearchProvider};
use crate::{
    content::quiz::QuizQuestion,
    error::{Error, Result},
    utils::truncate_chars,
};

pub const NO_SEARCH_DATA: &str = "No real-time data available. Rely on internal knowledge.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationKind {
    /// Write a full post from its title
    FromTitle,
    /// Expand the current draft
    ExpandContent,
    Tags,
    Quiz,
}

impl GenerationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationKind::FromTitle => "generate_from_title",
            GenerationKind::ExpandContent => "expand_content",
            GenerationKind::Tags => "generate_tags",
            GenerationKind::Quiz => "generate_quiz",
        }
    }

    pub fn needs_search(&self) -> bool {
        matches!(self, GenerationKind::FromTitle | GenerationKind::ExpandContent)
    }

    pub fn json_mode(&self) -> bool {
        matches!(self, GenerationKind::Tags | GenerationKind::Quiz)
    }
}

impl FromStr for GenerationKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "generate_from_title" => Ok(GenerationKind::FromTitle),
            "expand_content" => Ok(GenerationKind::ExpandContent),
            "generate_tags" => Ok(GenerationKind::Tags),
            "generate_quiz" => Ok(GenerationKind::Quiz),
            other => Err(Error::InvalidRequest(format!(
                "Invalid generation type: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    /// One of generate_from_title, expand_content, generate_tags, generate_quiz
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub prompt: String,
    pub current_content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GenerationOutput {
    pub output: String,
}

/// Outcome of trying one backend.
#[derive(Debug, Clone, PartialEq)]
pub enum Attempt {
    Success { output: String },
    Failure { backend: String, detail: String },
}

impl Attempt {
    pub async fn run<B: GenerationBackend>(backend: &B, prompt: &str, json_mode: bool) -> Self {
        info!("generating with {}", backend.name());
        match backend.generate(prompt, json_mode).await {
            Ok(output) => {
                info!("generation succeeded with {}", backend.name());
                Attempt::Success { output }
            }
            Err(e) => {
                let detail = e.to_string();
                warn!(
                    "generation failed with {}: {}",
                    backend.name(),
                    truncate_chars(&detail, 100)
                );
                Attempt::Failure {
                    backend: backend.name().to_string(),
                    detail,
                }
            }
        }
    }

    pub fn into_result(self) -> Result<String> {
        match self {
            Attempt::Success { output } => Ok(output),
            Attempt::Failure { backend, detail } => Err(Error::Upstream { backend, detail }),
        }
    }
}

/// Try `backends` strictly in order. The first success wins; when every
/// backend fails the last failure is returned.
pub async fn waterfall<B: GenerationBackend>(
    backends: &[B],
    prompt: &str,
    json_mode: bool,
) -> Result<String> {
    let mut last = Attempt::Failure {
        backend: "none".to_string(),
        detail: "no generation backend configured".to_string(),
    };
    for backend in backends {
        last = Attempt::run(backend, prompt, json_mode).await;
        if matches!(last, Attempt::Success { .. }) {
            break;
        }
    }
    last.into_result()
}

pub struct Pipeline<S, B> {
    search: S,
    backends: Vec<B>,
    quiz_content_limit: usize,
}

impl<S: SearchProvider, B: GenerationBackend> Pipeline<S, B> {
    pub fn new(search: S, backends: Vec<B>, quiz_content_limit: usize) -> Self {
        Self {
            search,
            backends,
            quiz_content_limit,
        }
    }

    pub async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let kind: GenerationKind = request.kind.parse()?;
        info!("generation request {}", kind.as_str());
        let context = if kind.needs_search() {
            self.enrichment(&request.prompt).await
        } else {
            String::new()
        };
        let prompt = self.build_prompt(kind, request, &context);
        waterfall(&self.backends, &prompt, kind.json_mode()).await
    }

    /// Search context for `query`. Never fails; a failed search yields the marker text.
    async fn enrichment(&self, query: &str) -> String {
        info!("researching topic: {query:?}");
        match self.search.search(query).await {
            Ok(found) => {
                let sources = found
                    .results
                    .iter()
                    .enumerate()
                    .map(|(i, hit)| {
                        format!(
                            "[Source {}]: {}\nURL: {}\nContent Excerpt: {}",
                            i + 1,
                            hit.title,
                            hit.url,
                            hit.content
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n\n");
                format!(
                    "REAL-TIME MARKET DATA & COMPETITOR CONTENT:\n\
                     -------------------------------------------------------------\n\
                     Search Summary: {}\n\n\
                     TOP SEARCH RESULTS (Use these facts/stats to write the blog):\n\
                     {sources}\n\
                     -------------------------------------------------------------",
                    found.answer.as_deref().unwrap_or("")
                )
            }
            Err(e) => {
                warn!("search failed, falling back to internal knowledge: {e}");
                NO_SEARCH_DATA.to_string()
            }
        }
    }

    fn build_prompt(&self, kind: GenerationKind, request: &GenerationRequest, context: &str) -> String {
        let draft = request.current_content.as_deref().unwrap_or("");
        match kind {
            GenerationKind::FromTitle => format!(
                "You are a Senior Technical Blog Writer.\n\
                 TASK: Write a comprehensive, long-form blog post (1500+ words) based on the Title and Market Data.\n\
                 GUIDELINES:\n\
                 1. Accuracy: Prioritize the real-time market data.\n\
                 2. Structure: Catchy H1, Intro, Bullet points, Deep Dive H2/H3s, Code Examples, Conclusion.\n\
                 3. Formatting: Use semantic HTML.\n\n\
                 {context}\n\n\
                 BLOG TITLE: \"{}\"\n\n\
                 WRITE THE BLOG POST HTML NOW:",
                request.prompt
            ),
            GenerationKind::ExpandContent => format!(
                "You are a Senior Editor.\n\
                 TASK: Expand the user's draft using the latest market data found in the search context.\n\
                 GUIDELINES: Keep the original tone. Inject new statistics and updates. Fix factual errors.\n\n\
                 {context}\n\n\
                 USER'S CURRENT DRAFT:\n{draft}"
            ),
            GenerationKind::Tags => format!(
                "Analyze the Title and Market Context. Generate 5 trending SEO tags.\n\
                 Return ONLY a JSON array of strings. Example: [\"Next.js 15\", \"AI Agents\"]\n\
                 {context}\n\
                 TITLE: \"{}\"",
                request.prompt
            ),
            GenerationKind::Quiz => {
                let schema = serde_json::to_string_pretty(&schema_for!(Vec<QuizQuestion>))
                    .unwrap_or_default();
                format!(
                    "You are an expert Teacher.\n\
                     Analyze the provided text content.\n\
                     Generate 3 Multiple Choice Questions (MCQ) to test the student's understanding.\n\n\
                     RETURN FORMAT:\n\
                     You MUST return a raw JSON array. Do not wrap in markdown code blocks.\n\
                     Each question has exactly 4 options and correctAnswer is the index (0-3) of the correct one.\n\
                     JSON Schema:\n{schema}\n\n\
                     CHAPTER CONTENT:\n{}",
                    truncate_chars(draft, self.quiz_content_limit)
                )
            }
        }
    }
}

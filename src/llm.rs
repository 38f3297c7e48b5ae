use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::model::ProgramRecord;

pub const MODEL: &str = "gpt-3.5-turbo";
pub const TEMPERATURE: f32 = 0.3;
pub const MAX_TOKENS: u32 = 2000;
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Program categories the model is asked to keep.
pub const CATEGORIES: [&str; 7] = [
    "Computer Science",
    "Programming/Coding",
    "Software Engineering",
    "Data Science",
    "AI/Machine Learning",
    "Web Development",
    "Game Development",
];

static OPEN_FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^```[A-Za-z0-9_+-]*").unwrap());

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

/// Chat-completion client that turns a page excerpt into program records.
pub struct ProgramExtractor {
    client: reqwest::Client,
    api_base: String,
    api_key: Option<String>,
}

impl ProgramExtractor {
    pub fn new(api_base: impl Into<String>, api_key: Option<String>) -> Self {
        ProgramExtractor {
            client: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    pub fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }

    /// Ask the model for the programs in `content` (scraped from `url`).
    /// An empty vec means the model found nothing; unparseable output is a
    /// `PipelineError::Parse` carrying the raw reply.
    pub async fn extract(&self, content: &str, url: &str) -> Result<Vec<ProgramRecord>, PipelineError> {
        let api_key = self.api_key.as_deref().ok_or(PipelineError::MissingCredential)?;
        let prompt = build_prompt(content, url);
        let request = ChatRequest {
            model: MODEL,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        info!("Requesting completion ({} prompt chars)", prompt.chars().count());
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(PipelineError::api(format!("{}: {}", status, body.trim())));
        }

        let reply: ChatResponse = resp.json().await?;
        let text = reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| PipelineError::api("completion contained no message content"))?;
        debug!("Completion: {}", text);

        let programs = parse_completion(&text)?;
        info!("Model returned {} programs", programs.len());
        Ok(programs)
    }
}

/// Instruction sent to the model, with the excerpt and URL embedded verbatim.
pub fn build_prompt(content: &str, url: &str) -> String {
    let categories = CATEGORIES
        .iter()
        .map(|c| format!("- {c}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"
Extract computer science and programming summer programs from this university website content.

Website URL: {url}
Content: {content}

Extract ONLY programs related to:
{categories}

For each program found, return a JSON object with these exact fields (all are required):
- "university": Name of University/Summer School/College
- "name": Program title
- "description": What students learn (max 150 words)
- "eligibility": Who can apply (age, education level, requirements)
- "duration": Program length and dates
- "pricing": Cost of enrolling in the program, or "Free" if no cost is clearly stated
- "link": Program URL (use the base URL if specific link not found)

Return ONLY a valid JSON array. If no programs found, return [].

Example format:
[
  {{
    "university": "University of Energy and Natural Resources - Sunyani, Ghana",
    "name": "Python Summer Bootcamp",
    "description": "6-week intensive program teaching Python programming, web development with Django, and data analysis",
    "eligibility": "High school students ages 16-18",
    "duration": "6 weeks, June-July 2024",
    "pricing": "Free",
    "link": "{url}"
  }}
]
"#
    )
}

/// Remove one surrounding markdown code fence, with or without a language tag.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(open) = OPEN_FENCE.find(trimmed) else {
        return trimmed;
    };
    let inner = &trimmed[open.end()..];
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Parse a completion into records. Non-array JSON yields no records.
pub fn parse_completion(text: &str) -> Result<Vec<ProgramRecord>, PipelineError> {
    let body = strip_code_fence(text);
    let value: Value = serde_json::from_str(body).map_err(|source| PipelineError::Parse {
        raw: body.to_string(),
        source,
    })?;

    let Value::Array(items) = value else {
        warn!("Model output is JSON but not an array; treating as no programs");
        return Ok(Vec::new());
    };

    let records = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(ProgramRecord(map)),
            other => {
                warn!("Skipping non-object program entry: {}", other);
                None
            }
        })
        .collect();
    Ok(records)
}

use std::path::PathBuf;

use thiserror::Error;

/// Failure of one pipeline stage. None of these end the process; the caller
/// reports them and the user can retry with corrected input.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("no API key supplied (use --api-key, OPENAI_API_KEY or SUMMER_API_KEY)")]
    MissingCredential,

    #[error("completion API error: {message}")]
    Api {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    #[error("failed to parse AI response as JSON: {source}")]
    Parse {
        raw: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to save database to {}: {source}", .path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn api(message: impl Into<String>) -> Self {
        PipelineError::Api {
            message: message.into(),
            source: None,
        }
    }

    /// Raw model output, when the failure is a JSON parse of it.
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            PipelineError::Parse { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(e: reqwest::Error) -> Self {
        PipelineError::Api {
            message: e.to_string(),
            source: Some(e),
        }
    }
}

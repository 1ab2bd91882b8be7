use notice_common::openai::OpenAiClientError;

use crate::model::NoticeId;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("network error fetching notice {id}: {source}")]
    Network {
        id: NoticeId,
        #[source]
        source: reqwest::Error,
    },

    #[error("notice {id} returned HTTP {status}")]
    HttpStatus {
        id: NoticeId,
        status: reqwest::StatusCode,
    },

    #[error(transparent)]
    OpenAi(#[from] OpenAiClientError),

    #[error("model response carried no structured output")]
    MissingToolCall,

    #[error("structured output is not a JSON object: {0}")]
    MalformedSchemaResponse(#[source] serde_json::Error),

    #[error("extraction failed after {attempts} attempts: {source}")]
    Extraction {
        attempts: u32,
        #[source]
        source: Box<AppError>,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// Fetch-layer failures: transport errors and non-2xx responses.
    pub fn is_network(&self) -> bool {
        matches!(self, AppError::Network { .. } | AppError::HttpStatus { .. })
    }
}

use std::path::PathBuf;

use notice_common::openai::OpenAiClientConfig;
use notice_common::retry::RetryPolicy;

use crate::error::AppError;
use crate::fetch::FetcherConfig;

/// Everything the extraction pipeline needs, assembled once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub openai: OpenAiClientConfig,
    /// Chat model used for extraction.
    pub model: String,
    pub fetch: FetcherConfig,
    /// Directory holding one `<id>.txt` per fetched notice.
    pub pages_dir: PathBuf,
    pub retry: RetryPolicy,
}

impl Config {
    /// Required:
    /// - `OPENAI_API_KEY`
    /// - `OPENAI_MODEL`
    ///
    /// Optional:
    /// - `OPENAI_BASE_URL`, `OPENAI_TIMEOUT_SECS`, `OPENAI_MAX_ERROR_BODY_BYTES`
    /// - `NOTICE_URL_TEMPLATE` (default: AAVSO alert notice pages, `{id}` placeholder)
    /// - `NOTICE_CONTAINER_SELECTOR` (default: "div.main-container")
    /// - `NOTICE_FOOTER_BYTES` (default: 1200)
    /// - `NOTICE_PAGES_DIR` (default: "data/pages")
    /// - `EXTRACT_MAX_ATTEMPTS` (default: 3), `EXTRACT_RETRY_DELAY_SECS` (default: 5)
    pub fn from_env() -> Result<Self, AppError> {
        let openai = OpenAiClientConfig::from_env();
        if openai.api_key.is_none() {
            return Err(AppError::Config(
                "OPENAI_API_KEY environment variable is required".to_string(),
            ));
        }

        let model = std::env::var("OPENAI_MODEL")
            .ok()
            .filter(|m| !m.trim().is_empty())
            .ok_or_else(|| {
                AppError::Config("OPENAI_MODEL environment variable is required".to_string())
            })?;

        let fetch = FetcherConfig::from_env()?;

        let pages_dir = std::env::var("NOTICE_PAGES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/pages"));

        Ok(Self {
            openai,
            model,
            fetch,
            pages_dir,
            retry: RetryPolicy::from_env("EXTRACT"),
        })
    }
}

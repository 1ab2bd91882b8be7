use scraper::Selector;
use tracing::{info, warn};

use crate::error::AppError;
use crate::model::NoticeId;
use crate::parser;

const DEFAULT_URL_TEMPLATE: &str = "https://www.aavso.org/aavso-alert-notice-{id}";
const DEFAULT_CONTAINER_SELECTOR: &str = "div.main-container";
const DEFAULT_FOOTER_BYTES: usize = 1200;

#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Page URL with an `{id}` placeholder.
    pub url_template: String,
    /// CSS selector of the element holding the notice body.
    pub container_selector: String,
    /// Trailing bytes of rendered text cut off as site footer.
    pub footer_bytes: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
            container_selector: DEFAULT_CONTAINER_SELECTOR.to_string(),
            footer_bytes: DEFAULT_FOOTER_BYTES,
        }
    }
}

impl FetcherConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let url_template = std::env::var("NOTICE_URL_TEMPLATE")
            .unwrap_or_else(|_| DEFAULT_URL_TEMPLATE.to_string());
        if !url_template.contains("{id}") {
            return Err(AppError::Config(format!(
                "NOTICE_URL_TEMPLATE must contain an {{id}} placeholder: {url_template}"
            )));
        }

        let container_selector = std::env::var("NOTICE_CONTAINER_SELECTOR")
            .unwrap_or_else(|_| DEFAULT_CONTAINER_SELECTOR.to_string());

        let footer_bytes = match std::env::var("NOTICE_FOOTER_BYTES") {
            Ok(raw) => raw.trim().parse::<usize>().map_err(|e| {
                AppError::Config(format!("NOTICE_FOOTER_BYTES is not a byte count ({raw}): {e}"))
            })?,
            Err(_) => DEFAULT_FOOTER_BYTES,
        };

        Ok(Self {
            url_template,
            container_selector,
            footer_bytes,
        })
    }
}

/// Downloads one alert notice page and reduces it to plain text.
///
/// No retries here: transport failures and non-2xx statuses go straight back
/// to the caller.
#[derive(Debug, Clone)]
pub struct Fetcher {
    http: reqwest::Client,
    config: FetcherConfig,
    container: Selector,
}

impl Fetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, AppError> {
        let container = Selector::parse(&config.container_selector).map_err(|e| {
            AppError::Config(format!(
                "invalid container selector {:?}: {e:?}",
                config.container_selector
            ))
        })?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("alert-notices/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http,
            config,
            container,
        })
    }

    pub fn notice_url(&self, id: NoticeId) -> String {
        self.config.url_template.replace("{id}", &id.to_string())
    }

    pub async fn fetch(&self, id: NoticeId) -> Result<String, AppError> {
        let url = self.notice_url(id);
        info!(id, url = %url, "fetching alert notice");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| AppError::Network { id, source })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::HttpStatus { id, status });
        }
        let html = resp
            .text()
            .await
            .map_err(|source| AppError::Network { id, source })?;

        Ok(self.page_text(id, &html))
    }

    /// Container text minus the footer span. Empty when the container is missing.
    pub fn page_text(&self, id: NoticeId, html: &str) -> String {
        let Some(text) = parser::container_text(html, &self.container) else {
            warn!(
                id,
                selector = %self.config.container_selector,
                "notice container not found, treating page as empty"
            );
            return String::new();
        };
        parser::trim_footer(&text, self.config.footer_bytes).to_string()
    }
}

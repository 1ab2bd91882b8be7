use notice_common::openai::{ChatCompletionRequest, Message, OpenAiClient};
use notice_common::retry::RetryPolicy;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::AppError;
use crate::schema::ExtractionSchema;

const INSTRUCTIONS: &str = "The following text is an AAVSO Alert Notice announcing an observing \
campaign. Record the campaign using the provided function: Title, Principal Investigator, \
Abstract, Justification, Target Object, Spectral Lines, Filters, Start Date, End Date and Status. \
Mark unknown text fields as N/A and unknown boolean fields as false.";

/// Turns notice text into a field map through a schema-constrained model call.
pub struct Extractor {
    client: OpenAiClient,
    model: String,
    retry: RetryPolicy,
}

impl Extractor {
    pub fn new(client: OpenAiClient, model: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            client,
            model: model.into(),
            retry,
        }
    }

    /// Empty text returns an empty map without calling the model. Otherwise the
    /// call and the JSON parse are retried together under the retry policy.
    pub async fn extract(
        &self,
        text: &str,
        schema: &ExtractionSchema,
    ) -> Result<Map<String, Value>, AppError> {
        if text.is_empty() {
            return Ok(Map::new());
        }

        let request = self.request(text, schema);
        let attempts = self.retry.attempts();
        self.retry
            .run("extract", || self.attempt(&request))
            .await
            .map_err(|e| AppError::Extraction {
                attempts,
                source: Box::new(e),
            })
    }

    fn request(&self, text: &str, schema: &ExtractionSchema) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![Message::user(format!("{INSTRUCTIONS}\n\n{text}"))],
            tools: vec![schema.tool()],
            tool_choice: Some(schema.tool_choice()),
        }
    }

    async fn attempt(&self, request: &ChatCompletionRequest) -> Result<Map<String, Value>, AppError> {
        let response = self.client.chat_completions(request).await?;
        if let Some(usage) = &response.usage {
            debug!(
                model = %self.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "extraction call complete"
            );
        }
        let payload = response.first_payload().ok_or(AppError::MissingToolCall)?;
        serde_json::from_str::<Map<String, Value>>(payload).map_err(AppError::MalformedSchemaResponse)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use notice_common::openai::OpenAiClientConfig;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn schema() -> ExtractionSchema {
        ExtractionSchema::parse(include_str!("../../../schema/output_format.json")).unwrap()
    }

    fn extractor_for(server: &MockServer) -> Extractor {
        let client = OpenAiClient::new(OpenAiClientConfig {
            base_url: server.uri(),
            api_key: Some("test-key".to_string()),
            timeout: None,
            max_error_body_bytes: 1024,
        })
        .unwrap();
        Extractor::new(
            client,
            "test-model",
            RetryPolicy::new(3, Duration::from_millis(10)),
        )
    }

    fn tool_response(arguments: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "record_observing_campaign", "arguments": arguments}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        }))
    }

    #[tokio::test]
    async fn empty_text_skips_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(tool_response("{}"))
            .expect(0)
            .mount(&server)
            .await;

        let fields = extractor_for(&server).extract("", &schema()).await.unwrap();
        assert!(fields.is_empty());
    }

    #[tokio::test]
    async fn sends_schema_and_page_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(json!({
                "model": "test-model",
                "tool_choice": {"type": "function", "function": {"name": "record_observing_campaign"}}
            })))
            .and(body_string_contains("Monitor SS Cyg"))
            .respond_with(tool_response(r#"{"Title": "SS Cyg outburst", "Status": "Active"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let fields = extractor_for(&server)
            .extract("Monitor SS Cyg during outburst.", &schema())
            .await
            .unwrap();
        assert_eq!(fields["Title"], json!("SS Cyg outburst"));
        assert_eq!(fields["Status"], json!("Active"));
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(tool_response(r#"{"Title": "T CrB"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let fields = extractor_for(&server).extract("text", &schema()).await.unwrap();
        assert_eq!(fields["Title"], json!("T CrB"));
    }

    #[tokio::test]
    async fn gives_up_after_three_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let err = extractor_for(&server)
            .extract("text", &schema())
            .await
            .expect_err("all attempts fail");
        match err {
            AppError::Extraction { attempts, source } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*source, AppError::OpenAi(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn malformed_payload_is_retried_then_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(tool_response("Title: not json"))
            .expect(3)
            .mount(&server)
            .await;

        let err = extractor_for(&server)
            .extract("text", &schema())
            .await
            .expect_err("payload never parses");
        match err {
            AppError::Extraction { source, .. } => {
                assert!(matches!(*source, AppError::MalformedSchemaResponse(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn response_without_payload_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let err = extractor_for(&server).extract("text", &schema()).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Extraction { ref source, .. } if matches!(**source, AppError::MissingToolCall)
        ));
    }
}

//! School lookups through a web-search capable language model.
//!
//! [`LookupClient`] is the seam the rest of the workspace depends on: a batch
//! of names goes in, one [`LookupOutcome`] per name comes out. The
//! [`OpenAiClient`] implementation talks to an OpenAI-compatible Responses
//! endpoint with the web search tool enabled.

mod prompt;
mod response;

use std::future::Future;
use std::time::Duration;

use census_shared::{CensusError, LookupConfig, ReasoningEffort, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use url::Url;

pub use prompt::build_prompt;
pub use response::{is_placeholder, parse_response};

/// User-Agent string for lookup requests.
const USER_AGENT: &str = concat!("cohort-census/", env!("CARGO_PKG_VERSION"));

/// Maximum characters of an error body echoed into messages.
const MAX_ERROR_BODY: usize = 200;

// ---------------------------------------------------------------------------
// Client contract
// ---------------------------------------------------------------------------

/// Result of looking up one name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome {
    /// The service named a school.
    Resolved(String),
    /// The service answered but could not determine a school.
    Unknown,
    /// The request for this name failed. Transient, retryable.
    Failed(String),
}

/// Resolves names to undergraduate schools.
pub trait LookupClient {
    /// Look up a batch. Returns exactly one entry per requested name, in
    /// request order. Never fails as a whole: transport errors surface as
    /// [`LookupOutcome::Failed`] per name.
    fn lookup(
        &self,
        names: &[String],
        effort: Option<ReasoningEffort>,
    ) -> impl Future<Output = Vec<(String, LookupOutcome)>> + Send;
}

// ---------------------------------------------------------------------------
// Wire types (Responses API)
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    tools: Vec<Tool>,
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning: Option<Reasoning>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Tool {
    WebSearch,
    CodeInterpreter { container: Container },
}

#[derive(Debug, Serialize)]
struct Container {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct Reasoning {
    effort: ReasoningEffort,
}

#[derive(Debug, Deserialize)]
struct ResponsesReply {
    #[serde(default)]
    output_text: Option<String>,
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

impl ResponsesReply {
    /// The answer text: `output_text` when present, otherwise every
    /// `output_text` part of every message item.
    fn text(&self) -> Option<String> {
        if let Some(text) = self.output_text.as_deref().filter(|t| !t.trim().is_empty()) {
            return Some(text.to_string());
        }

        let parts: Vec<&str> = self
            .output
            .iter()
            .filter(|item| item.kind == "message")
            .flat_map(|item| &item.content)
            .filter(|part| part.kind == "output_text")
            .filter_map(|part| part.text.as_deref())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n"))
        }
    }
}

// ---------------------------------------------------------------------------
// OpenAiClient
// ---------------------------------------------------------------------------

/// Lookup client for an OpenAI-compatible Responses endpoint.
pub struct OpenAiClient {
    client: Client,
    endpoint: Url,
    api_key: String,
    model: String,
    cohort: String,
    code_interpreter: bool,
}

impl OpenAiClient {
    /// Build a client from the `[lookup]` config section and a resolved API key.
    pub fn new(config: &LookupConfig, api_key: impl Into<String>) -> Result<Self> {
        let endpoint = format!("{}/responses", config.base_url.trim_end_matches('/'));
        let endpoint = Url::parse(&endpoint).map_err(|e| {
            CensusError::config(format!("invalid lookup endpoint '{endpoint}': {e}"))
        })?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CensusError::Lookup(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.into(),
            model: config.model.clone(),
            cohort: config.cohort.clone(),
            code_interpreter: config.code_interpreter,
        })
    }

    fn tools(&self) -> Vec<Tool> {
        let mut tools = Vec::with_capacity(2);
        if self.code_interpreter {
            tools.push(Tool::CodeInterpreter {
                container: Container { kind: "auto" },
            });
        }
        tools.push(Tool::WebSearch);
        tools
    }

    /// Send one prompt and return the answer text.
    async fn request_text(&self, input: &str, effort: Option<ReasoningEffort>) -> Result<String> {
        let request = ResponsesRequest {
            model: &self.model,
            tools: self.tools(),
            input,
            reasoning: effort.map(|effort| Reasoning { effort }),
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| CensusError::Lookup(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(MAX_ERROR_BODY).collect();
            return Err(CensusError::Lookup(format!(
                "{}: HTTP {status}: {snippet}",
                self.endpoint
            )));
        }

        let reply: ResponsesReply = response
            .json()
            .await
            .map_err(|e| CensusError::Lookup(format!("invalid response body: {e}")))?;

        reply
            .text()
            .ok_or_else(|| CensusError::Lookup("response contained no output text".into()))
    }
}

impl LookupClient for OpenAiClient {
    #[instrument(skip_all, fields(names = names.len(), effort = ?effort))]
    async fn lookup(
        &self,
        names: &[String],
        effort: Option<ReasoningEffort>,
    ) -> Vec<(String, LookupOutcome)> {
        let input = build_prompt(&self.cohort, names);
        info!(model = %self.model, "sending lookup batch");

        match self.request_text(&input, effort).await {
            Ok(text) => {
                debug!(chars = text.len(), "lookup answer received");
                parse_response(&text, names)
            }
            Err(e) => {
                warn!(error = %e, "lookup request failed");
                let message = e.to_string();
                names
                    .iter()
                    .map(|n| (n.clone(), LookupOutcome::Failed(message.clone())))
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(server: &MockServer) -> LookupConfig {
        LookupConfig {
            base_url: format!("{}/v1", server.uri()),
            cohort: "current CMU PhDs".into(),
            timeout_secs: 5,
            ..LookupConfig::default()
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn request_serializes_tools_and_effort() {
        let request = ResponsesRequest {
            model: "gpt-5",
            tools: vec![
                Tool::CodeInterpreter {
                    container: Container { kind: "auto" },
                },
                Tool::WebSearch,
            ],
            input: "hi",
            reasoning: Some(Reasoning {
                effort: ReasoningEffort::High,
            }),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "model": "gpt-5",
                "tools": [
                    {"type": "code_interpreter", "container": {"type": "auto"}},
                    {"type": "web_search"}
                ],
                "input": "hi",
                "reasoning": {"effort": "high"}
            })
        );
    }

    #[test]
    fn reply_text_prefers_output_text() {
        let reply: ResponsesReply = serde_json::from_value(json!({
            "output_text": "A | MIT",
            "output": []
        }))
        .unwrap();
        assert_eq!(reply.text().as_deref(), Some("A | MIT"));
    }

    #[test]
    fn reply_text_collects_message_parts() {
        let reply: ResponsesReply = serde_json::from_value(json!({
            "output": [
                {"type": "web_search_call", "id": "ws_1"},
                {"type": "message", "content": [
                    {"type": "output_text", "text": "A | MIT"},
                    {"type": "output_text", "text": "B | unknown"}
                ]}
            ]
        }))
        .unwrap();
        assert_eq!(reply.text().as_deref(), Some("A | MIT\nB | unknown"));
    }

    #[tokio::test]
    async fn lookup_against_mock_server() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/responses"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "model": "gpt-5",
                "reasoning": {"effort": "high"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "output": [{
                    "type": "message",
                    "content": [{"type": "output_text", "text": "Alice | MIT\nBob | unknown"}]
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&config_for(&server), "test-key").unwrap();
        let out = client
            .lookup(&names(&["Alice", "Bob"]), Some(ReasoningEffort::High))
            .await;

        assert_eq!(
            out,
            vec![
                ("Alice".into(), LookupOutcome::Resolved("MIT".into())),
                ("Bob".into(), LookupOutcome::Unknown),
            ]
        );
    }

    #[tokio::test]
    async fn http_errors_fail_every_name_in_the_batch() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/responses"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&config_for(&server), "test-key").unwrap();
        let out = client.lookup(&names(&["Alice", "Bob"]), None).await;

        assert_eq!(out.len(), 2);
        for (_, outcome) in &out {
            match outcome {
                LookupOutcome::Failed(msg) => {
                    assert!(msg.contains("429"));
                    assert!(msg.contains("rate limited"));
                }
                other => panic!("expected Failed, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn empty_answer_is_a_failure() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/responses"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"output": []})))
            .mount(&server)
            .await;

        let client = OpenAiClient::new(&config_for(&server), "test-key").unwrap();
        let out = client.lookup(&names(&["Alice"]), None).await;
        assert!(matches!(out[0].1, LookupOutcome::Failed(_)));
    }
}

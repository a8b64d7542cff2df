use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument, warn};

use crate::config::Credential;
use crate::constants;
use crate::session::Message;

/// Reply used when no credential was resolved. No request is made.
pub const NOT_CONFIGURED_REPLY: &str = "❌ API Key 未配置，无法连接服务。";

const FAILURE_MARKER: &str = "❌ 连接波动";
const FAILURE_HINT: &str = "请检查 API Key 是否填对，或者余额是否充足。";

/// Produces one assistant reply for a transcript.
///
/// Implementations never fail: errors are turned into a reply string so the
/// conversation stays usable.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn get_reply(&self, transcript: &[Message]) -> String;

    /// Whether the client can reach a model at all.
    fn is_configured(&self) -> bool {
        true
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("API returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("failed to parse completion response: {0}")]
    Decode(#[source] reqwest::Error),
    #[error("completion response contained no choices")]
    NoChoices,
    #[error("completion response had no message content")]
    NoContent,
}

/// Formats a caught failure the way it is shown in the chat.
pub fn failure_reply(err: &CompletionError) -> String {
    format!("{}: {}\n{}", FAILURE_MARKER, err, FAILURE_HINT)
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool, // We want the full response, not a stream
}

#[derive(Deserialize, Debug)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    // usage, id, created etc. are ignored
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Client for DeepSeek's OpenAI-compatible chat completion endpoint.
#[derive(Debug, Clone)]
pub struct DeepSeekClient {
    http: Client,
    base_url: String,
    model: String,
    credential: Option<Credential>,
}

impl DeepSeekClient {
    /// Client against the default endpoint and model.
    pub fn new(credential: Option<Credential>) -> Self {
        Self::with_endpoint(
            credential,
            constants::DEEPSEEK_BASE_URL.as_str(),
            constants::DEEPSEEK_MODEL.as_str(),
        )
    }

    pub fn with_endpoint(
        credential: Option<Credential>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            credential,
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    async fn request_completion(
        &self,
        credential: &Credential,
        transcript: &[Message],
    ) -> Result<String, CompletionError> {
        let url = self.completions_url();
        let payload = ChatCompletionRequest {
            model: &self.model,
            messages: transcript,
            stream: false,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(credential.expose())
            .json(&payload)
            .send()
            .await
            .map_err(|source| CompletionError::Transport {
                url: url.clone(),
                source,
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            error!(%status, %body, "Chat completion request failed");
            return Err(CompletionError::Status { status, body });
        }

        let completion = response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(CompletionError::Decode)?;

        completion
            .choices
            .into_iter()
            .next()
            .ok_or(CompletionError::NoChoices)?
            .message
            .content
            .ok_or(CompletionError::NoContent)
    }
}

#[async_trait]
impl CompletionClient for DeepSeekClient {
    #[instrument(skip(self, transcript), fields(model = %self.model, messages = transcript.len()))]
    async fn get_reply(&self, transcript: &[Message]) -> String {
        let Some(credential) = &self.credential else {
            warn!("Completion requested without a configured API key");
            return NOT_CONFIGURED_REPLY.to_string();
        };

        match self.request_completion(credential, transcript).await {
            Ok(reply) => {
                debug!(chars = reply.chars().count(), "Received completion");
                reply
            }
            Err(e) => {
                error!("Chat completion failed: {}", e);
                failure_reply(&e)
            }
        }
    }

    fn is_configured(&self) -> bool {
        self.credential.is_some()
    }
}

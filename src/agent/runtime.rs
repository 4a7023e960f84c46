//! Agent runtime client
//!
//! The front end's only view of the agent: send a prompt for a
//! (user, session) pair, get text back.

use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::RuntimeConfig;
use crate::error::ChatError;
use crate::Result;

pub const SESSION_HEADER: &str = "X-Amzn-Bedrock-AgentCore-Runtime-Session-Id";
pub const USER_HEADER: &str = "X-Amzn-Bedrock-AgentCore-Runtime-User-Id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationRequest {
    pub runtime_id: String,
    pub user_id: String,
    pub session_id: String,
    pub prompt: String,
}

/// Trait for remote agent execution
#[async_trait::async_trait]
pub trait AgentRuntime: Send + Sync {
    async fn invoke(&self, request: InvocationRequest) -> Result<String>;
}

/// =============================
/// Wire Models
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct InvocationPayload {
    #[serde(default)]
    pub input: InvocationInput,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct InvocationInput {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvocationReply {
    pub output: InvocationOutput,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvocationOutput {
    pub message: OutputMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OutputMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl InvocationReply {
    pub fn assistant(text: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            output: InvocationOutput {
                message: OutputMessage {
                    role: "assistant".to_string(),
                    content: vec![ContentBlock {
                        text: Some(text.into()),
                    }],
                },
                timestamp: Some(chrono::Utc::now().to_rfc3339()),
                model: Some(model.into()),
            },
        }
    }

    /// `output.message.content[0].text`
    pub fn answer(self) -> Option<String> {
        self.output.message.content.into_iter().next().and_then(|block| block.text)
    }
}

/// Agent runtime reached over HTTP
pub struct HttpAgentRuntime {
    client: Client,
    endpoint: Url,
    api_token: Option<String>,
}

impl HttpAgentRuntime {
    pub fn new(config: &RuntimeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()?;

        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            ChatError::Config(format!("invalid runtime endpoint {}: {}", config.endpoint, e))
        })?;

        Ok(Self {
            client,
            endpoint,
            api_token: config.api_token.clone(),
        })
    }

    fn invocation_url(&self, runtime_id: &str) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| ChatError::Config(format!("endpoint cannot be a base: {}", self.endpoint)))?
            .pop_if_empty()
            .extend(["runtimes", runtime_id, "invocations"]);
        Ok(url)
    }
}

#[async_trait::async_trait]
impl AgentRuntime for HttpAgentRuntime {
    async fn invoke(&self, request: InvocationRequest) -> Result<String> {
        let url = self.invocation_url(&request.runtime_id)?;
        let payload = InvocationPayload {
            input: InvocationInput {
                user_id: Some(request.user_id.clone()),
                prompt: Some(request.prompt.clone()),
            },
        };
        debug!(?payload, session_id = %request.session_id, "invoking agent runtime");

        let mut call = self
            .client
            .post(url)
            .header(SESSION_HEADER, &request.session_id)
            .header(USER_HEADER, &request.user_id)
            .json(&payload);
        if let Some(token) = &self.api_token {
            call = call.bearer_auth(token);
        }

        let response = call.send().await.map_err(|e| {
            error!("Agent runtime request failed: {}", e);
            ChatError::Upstream(format!("agent runtime request failed: {}", e))
        })?;

        let status = response.status();
        info!("Status Code: {}", status.as_u16());
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            error!("Agent runtime error response: {}", body);
            return Err(ChatError::Upstream(format!(
                "agent runtime returned an http {}",
                status.as_u16()
            )));
        }

        let reply: InvocationReply = response.json().await.map_err(|e| {
            error!("Failed to parse agent runtime response: {}", e);
            ChatError::Upstream(format!("malformed agent runtime response: {}", e))
        })?;

        reply
            .answer()
            .ok_or_else(|| ChatError::Upstream("agent runtime returned no answer text".to_string()))
    }
}

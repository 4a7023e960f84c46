//! HTTP client for the managed memory service
//!
//! Uses a long-lived reqwest::Client with explicit timeouts so a hung upstream
//! call cannot block a request forever.

use chrono::Utc;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use super::store::{EventPage, EventStore, NewMessage, PageRequest, SessionPage, StoreResult};
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::models::{Conversational, Event, PayloadItem, SessionDescriptor};
use crate::Result;

/// Event store backed by the managed memory REST API
pub struct HttpEventStore {
    client: Client,
    endpoint: Url,
    memory_id: String,
    api_token: Option<String>,
}

impl HttpEventStore {
    pub fn new(config: &StoreConfig, memory_id: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .build()?;

        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            crate::error::ChatError::Config(format!(
                "invalid memory endpoint {}: {}",
                config.endpoint, e
            ))
        })?;

        Ok(Self {
            client,
            endpoint,
            memory_id: memory_id.into(),
            api_token: config.api_token.clone(),
        })
    }

    fn url(&self, segments: &[&str]) -> StoreResult<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Fatal(format!("endpoint cannot be a base: {}", self.endpoint)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn post<B, R>(&self, url: Url, body: &B) -> StoreResult<R>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        debug!("POST {}", url);

        let mut request = self.client.post(url).json(body);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(classify_transport)?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        response.json::<R>().await.map_err(|e| {
            error!("Failed to parse memory service response: {}", e);
            StoreError::Fatal(format!("malformed memory service response: {}", e))
        })
    }
}

fn classify_transport(err: reqwest::Error) -> StoreError {
    if err.is_timeout() || err.is_connect() {
        StoreError::Transient(err.to_string())
    } else {
        StoreError::Fatal(err.to_string())
    }
}

fn classify_status(status: StatusCode, body: String) -> StoreError {
    let message = format!("memory service returned http {}: {}", status.as_u16(), body);

    if status == StatusCode::NOT_FOUND || body.contains("ResourceNotFoundException") {
        StoreError::NotFound(message)
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        StoreError::Transient(message)
    } else {
        StoreError::Fatal(message)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListEventsBody<'a> {
    include_payloads: bool,
    max_results: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListSessionsBody<'a> {
    max_results: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListEventsReply {
    #[serde(default)]
    events: Vec<Event>,
    next_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListSessionsReply {
    #[serde(default)]
    session_summaries: Vec<SessionDescriptor>,
    next_token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateEventBody<'a> {
    actor_id: &'a str,
    session_id: &'a str,
    /// Epoch seconds
    event_timestamp: f64,
    payload: Vec<PayloadItem>,
}

#[derive(Debug, Deserialize)]
struct CreateEventReply {}

#[async_trait::async_trait]
impl EventStore for HttpEventStore {
    async fn list_events(
        &self,
        actor_id: &str,
        session_id: &str,
        page: PageRequest,
    ) -> StoreResult<EventPage> {
        let url = self.url(&["memories", self.memory_id.as_str(), "actor", actor_id, "sessions", session_id])?;
        let body = ListEventsBody {
            include_payloads: true,
            max_results: page.max_results,
            next_token: page.next_token.as_deref(),
        };

        let reply: ListEventsReply = self.post(url, &body).await?;
        Ok(EventPage {
            events: reply.events,
            next_token: reply.next_token,
        })
    }

    async fn list_sessions(&self, actor_id: &str, page: PageRequest) -> StoreResult<SessionPage> {
        let url = self.url(&["memories", self.memory_id.as_str(), "actor", actor_id, "sessions"])?;
        let body = ListSessionsBody {
            max_results: page.max_results,
            next_token: page.next_token.as_deref(),
        };

        let reply: ListSessionsReply = self.post(url, &body).await?;
        Ok(SessionPage {
            sessions: reply.session_summaries,
            next_token: reply.next_token,
        })
    }

    async fn create_event(
        &self,
        actor_id: &str,
        session_id: &str,
        message: NewMessage,
    ) -> StoreResult<()> {
        let url = self.url(&["memories", self.memory_id.as_str(), "events"])?;
        let now = Utc::now();
        let body = CreateEventBody {
            actor_id,
            session_id,
            event_timestamp: now.timestamp_millis() as f64 / 1000.0,
            payload: vec![PayloadItem {
                conversational: Some(Conversational::new(message.role, message.text)),
            }],
        };

        let _: CreateEventReply = self.post(url, &body).await?;
        Ok(())
    }
}

//! Agent container
//!
//! Serves `/invocations` for the front end. Each (user, session) pair gets its
//! own agent state from the registry; every user prompt and assistant answer
//! is written back to the memory service so the front end can rebuild the
//! conversation.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::model::{LanguageModel, ModelMessage};
use super::registry::SessionRegistry;
use super::runtime::{InvocationPayload, InvocationReply, SESSION_HEADER};
use crate::error::ChatError;
use crate::memory::{ConversationReconstructor, EventStore, NewMessage};
use crate::models::{Role, Turn};
use crate::Result;

pub const SYSTEM_PROMPT: &str = r#"Your name as the AI is "AI Chatbot" and you have been created by AnyCompany as an expert in their business.
Answer the user's questions using what you know about the business and the conversation so far.
If you do not have the information needed to answer a question, you should say you do not know the answer.
You should try to completely avoid outputting bulleted lists and sub lists, unless it's absolutely necessary."#;

/// State for one (user, session) pair
pub struct AgentSession {
    pub user_id: String,
    pub session_id: String,
    pub system_prompt: String,
    /// Messages exchanged since this container first saw the session
    transcript: Mutex<Vec<ModelMessage>>,
}

impl AgentSession {
    pub fn new(user_id: &str, session_id: &str, recent: &[Turn]) -> Self {
        Self {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            system_prompt: system_prompt_with_history(recent),
            transcript: Mutex::new(Vec::new()),
        }
    }
}

/// Base prompt, plus the recent turns of a resumed session
pub fn system_prompt_with_history(recent: &[Turn]) -> String {
    if recent.is_empty() {
        return SYSTEM_PROMPT.to_string();
    }

    let context = recent
        .iter()
        .map(|turn| format!("USER: {}\nASSISTANT: {}", turn.q, turn.a))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{}\n\nRecent conversation:\n{}", SYSTEM_PROMPT, context)
}

pub struct AgentService {
    store: Arc<dyn EventStore>,
    reconstructor: ConversationReconstructor,
    model: Arc<dyn LanguageModel>,
    sessions: SessionRegistry<AgentSession>,
    context_turns: usize,
}

impl AgentService {
    pub fn new(
        store: Arc<dyn EventStore>,
        reconstructor: ConversationReconstructor,
        model: Arc<dyn LanguageModel>,
        context_turns: usize,
        session_idle: Duration,
        max_sessions: usize,
    ) -> Self {
        Self {
            store,
            reconstructor,
            model,
            sessions: SessionRegistry::new(session_idle, max_sessions),
            context_turns,
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Answer a prompt within a session, recording both sides in memory
    pub async fn invoke(&self, user_id: &str, session_id: &str, prompt: &str) -> Result<String> {
        let key = format!("{}/{}", user_id, session_id);
        let session = self
            .sessions
            .get_or_try_insert_with(&key, || self.open_session(user_id, session_id))
            .await?;

        // One prompt at a time per session
        let mut transcript = session.transcript.lock().await;

        self.remember(&session, NewMessage::new(Role::User, prompt)).await;
        transcript.push(ModelMessage::user(prompt));

        match self.model.complete(&session.system_prompt, &transcript).await {
            Ok(answer) => {
                transcript.push(ModelMessage::assistant(answer.clone()));
                self.remember(&session, NewMessage::new(Role::Assistant, answer.clone()))
                    .await;
                Ok(answer)
            }
            Err(e) => {
                transcript.pop();
                Err(e)
            }
        }
    }

    async fn open_session(&self, user_id: &str, session_id: &str) -> Result<AgentSession> {
        info!(user_id, session_id, "agent initializing");

        let recent = match self
            .reconstructor
            .last_turns(user_id, session_id, self.context_turns)
            .await
        {
            Ok(turns) => {
                if !turns.is_empty() {
                    info!("Loaded {} conversation turns", turns.len());
                }
                turns
            }
            Err(e) => {
                error!(user_id, session_id, error = %e, "Memory load error");
                Vec::new()
            }
        };

        Ok(AgentSession::new(user_id, session_id, &recent))
    }

    async fn remember(&self, session: &AgentSession, message: NewMessage) {
        let role = message.role;
        if let Err(e) = self
            .store
            .create_event(&session.user_id, &session.session_id, message)
            .await
        {
            warn!(
                user_id = %session.user_id,
                session_id = %session.session_id,
                role = role.as_str(),
                error = %e,
                "failed to record message in memory"
            );
        }
    }
}

/// =============================
/// HTTP Surface
/// =============================

type ErrorReply = (StatusCode, Json<serde_json::Value>);

fn reject(status: StatusCode, detail: impl Into<String>) -> ErrorReply {
    (status, Json(json!({ "detail": detail.into() })))
}

async fn ping() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

async fn invocations(
    State(service): State<Arc<AgentService>>,
    headers: HeaderMap,
    Json(payload): Json<InvocationPayload>,
) -> std::result::Result<Json<InvocationReply>, ErrorReply> {
    let prompt = payload
        .input
        .prompt
        .filter(|p| !p.is_empty())
        .ok_or_else(|| {
            reject(
                StatusCode::BAD_REQUEST,
                "No prompt found in input. Please provide a 'prompt' key in the input.",
            )
        })?;

    let user_id = payload
        .input
        .user_id
        .filter(|u| !u.is_empty())
        .ok_or_else(|| {
            reject(
                StatusCode::BAD_REQUEST,
                "No user_id found in input. Please provide a 'user_id' key in the input.",
            )
        })?;

    let session_id = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            reject(
                StatusCode::BAD_REQUEST,
                format!("Missing header {}", SESSION_HEADER),
            )
        })?
        .to_string();

    match service.invoke(&user_id, &session_id, &prompt).await {
        Ok(answer) => Ok(Json(InvocationReply::assistant(answer, service.model_name()))),
        Err(e) => {
            error!(user_id = %user_id, session_id = %session_id, kind = e.kind(), "agent processing failed: {}", e);
            Err(reject(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Agent processing failed: {}", public_detail(&e)),
            ))
        }
    }
}

fn public_detail(err: &ChatError) -> String {
    match err {
        ChatError::Model(message) => message.clone(),
        other => other.public_message(),
    }
}

pub fn create_router(service: Arc<AgentService>) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/invocations", post(invocations))
        .with_state(service)
}

pub async fn start_server(
    service: Arc<AgentService>,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(service);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("Agent listening on http://0.0.0.0:{}", port);

    axum::serve(listener, router)
        .with_graceful_shutdown(crate::api::shutdown_signal())
        .await?;

    Ok(())
}

//! Web front end
//!
//! HTML fragments for the htmx chat UI plus the JSON API. Both surfaces go
//! through the same orchestrator and memory views.

use axum::{
    extract::{rejection::JsonRejection, Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};

use crate::agent::AgentRuntime;
use crate::config::WebConfig;
use crate::error::ChatError;
use crate::memory::{ConversationReconstructor, EventStore, SessionSummarizer};
use crate::memory::timestamp::now_created;
use crate::models::{Conversation, SessionSummary, Source};
use crate::orchestrator::{ConversationRef, Orchestrator};
use crate::views::Views;
use crate::Result;

/// =============================
/// Request / Response Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct AskForm {
    pub conversation_id: Option<String>,
    pub question: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AskRequest {
    pub question: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AskResponse {
    #[serde(rename = "conversationId")]
    pub conversation_id: String,
    pub answer: String,
    pub sources: Vec<Source>,
}

/// JSON error body for the `/api` routes
pub struct ApiError(ChatError);

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();
        (status, Json(serde_json::json!({ "error": self.0.public_message() }))).into_response()
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        (self.status_code(), self.public_message()).into_response()
    }
}

/// =============================
/// App State
/// =============================

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub reconstructor: Arc<ConversationReconstructor>,
    pub summarizer: Arc<SessionSummarizer>,
    pub views: Arc<Views>,
    pub user_id: String,
    pub history_size: usize,
    pub display_offset: FixedOffset,
}

impl AppState {
    pub fn new(
        config: &WebConfig,
        store: Arc<dyn EventStore>,
        runtime: Arc<dyn AgentRuntime>,
    ) -> Result<Self> {
        let paging = config.memory.paging();
        let reconstructor = Arc::new(ConversationReconstructor::new(store.clone(), paging));
        let summarizer = Arc::new(SessionSummarizer::new(store, paging, config.display_offset));
        let orchestrator = Arc::new(Orchestrator::new(
            runtime,
            config.agent_runtime.clone(),
            reconstructor.clone(),
        ));

        Ok(Self {
            orchestrator,
            reconstructor,
            summarizer,
            views: Arc::new(Views::new()?),
            user_id: config.user_id.clone(),
            history_size: config.history_size,
            display_offset: config.display_offset,
        })
    }

    /// The currently logged in user
    // TODO: resolve the user from the authenticated session once auth is in front of the app
    fn current_user_id(&self) -> &str {
        &self.user_id
    }
}

fn validation(message: &str) -> ChatError {
    error!("{}", message);
    ChatError::Validation(message.to_string())
}

/// Malformed or mistyped JSON bodies are validation errors on the `/api` routes
fn json_body<T>(
    payload: std::result::Result<Json<T>, JsonRejection>,
) -> std::result::Result<T, ApiError> {
    match payload {
        Ok(Json(body)) => Ok(body),
        Err(rejection) => {
            let message = format!("invalid request body: {}", rejection.body_text());
            Err(validation(&message).into())
        }
    }
}

/// =============================
/// Health
/// =============================

async fn health() -> &'static str {
    "healthy"
}

/// =============================
/// HTML Routes
/// =============================

async fn index(State(state): State<AppState>) -> Result<Html<String>> {
    let conversation = Conversation::empty(state.current_user_id());
    Ok(Html(state.views.index(&conversation)?))
}

async fn new_conversation(State(state): State<AppState>) -> Result<Html<String>> {
    let conversation = Conversation::empty(state.current_user_id());
    Ok(Html(state.views.chat(&conversation, &[])?))
}

async fn conversations(State(state): State<AppState>) -> Result<Html<String>> {
    let user_id = state.current_user_id();
    info!("fetching chat history for user {}", user_id);

    let history = match state.summarizer.summarize(user_id, state.history_size).await {
        Ok(history) => history,
        Err(e) => {
            warn!(user_id, kind = e.kind(), "showing empty history: {}", e);
            Vec::new()
        }
    };

    Ok(Html(state.views.conversations(&history)?))
}

async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Html<String>> {
    let conversation = state.reconstructor.get(&id, state.current_user_id()).await?;
    Ok(Html(state.views.chat(&conversation, &[])?))
}

async fn ask(State(state): State<AppState>, Form(form): Form<AskForm>) -> Result<Html<String>> {
    let id = form
        .conversation_id
        .ok_or_else(|| validation("missing required form data: conversation_id"))?;
    info!("conversation id: {}", id);

    let question = form
        .question
        .ok_or_else(|| validation("missing required form data: question"))?;
    let question = question.trim_end();
    info!("question: {}", question);

    let user_id = state.current_user_id().to_string();
    info!("user_id: {}", user_id);

    let is_new_conversation = id.is_empty();
    let conversation_id = if is_new_conversation {
        let id = uuid::Uuid::new_v4().to_string();
        info!("created new conversation id: {}", id);
        id
    } else {
        id
    };

    let target = ConversationRef {
        conversation_id: conversation_id.clone(),
        user_id,
    };
    let outcome = state.orchestrator.ask(&target, question).await?;

    let mut response = state.views.chat(&outcome.conversation, &outcome.sources)?;

    // Prepend the new conversation to the history list
    if is_new_conversation {
        let item = SessionSummary {
            conversation_id,
            initial_question: question.to_string(),
            created: now_created(&state.display_offset),
        };
        let item_html = state.views.conversation_item(&item)?;
        response.push_str(&format!(
            r#"<div hx-swap-oob="afterbegin:#conversation-list">{}</div>"#,
            item_html
        ));
    }

    Ok(Html(response))
}

/// =============================
/// JSON API
/// =============================

async fn api_ask_new(
    State(state): State<AppState>,
    payload: std::result::Result<Json<AskRequest>, JsonRejection>,
) -> std::result::Result<Json<AskResponse>, ApiError> {
    let body = json_body(payload)?;
    debug!(?body, "api ask (new conversation)");
    let question = body
        .question
        .ok_or_else(|| validation("missing field: question"))?;

    let target = ConversationRef {
        conversation_id: uuid::Uuid::new_v4().to_string(),
        user_id: state.current_user_id().to_string(),
    };
    let outcome = state.orchestrator.ask(&target, &question).await?;

    Ok(Json(AskResponse {
        conversation_id: outcome.conversation.conversation_id,
        answer: outcome.answer,
        sources: outcome.sources,
    }))
}

async fn api_ask(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: std::result::Result<Json<AskRequest>, JsonRejection>,
) -> std::result::Result<Json<AskResponse>, ApiError> {
    let body = json_body(payload)?;
    debug!(?body, conversation_id = %id, "api ask");
    let question = body
        .question
        .ok_or_else(|| validation("missing field: question"))?;

    if id.trim().is_empty() {
        return Err(validation("conversation id is required").into());
    }

    let target = ConversationRef {
        conversation_id: id.clone(),
        user_id: state.current_user_id().to_string(),
    };
    let outcome = state.orchestrator.ask(&target, &question).await?;

    Ok(Json(AskResponse {
        conversation_id: id,
        answer: outcome.answer,
        sources: outcome.sources,
    }))
}

async fn api_conversations(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> std::result::Result<Json<Vec<SessionSummary>>, ApiError> {
    let history = state.summarizer.summarize(&user_id, state.history_size).await?;
    Ok(Json(history))
}

/// =============================
/// Request Logging
/// =============================

/// Log every request and response except health checks
async fn log_requests(req: Request, next: Next) -> Response {
    if req.uri().path() == "/health" {
        return next.run(req).await;
    }

    let method = req.method().clone();
    let uri = req.uri().clone();
    info!("HTTP {} {}", method, uri);

    let response = next.run(req).await;
    let status: StatusCode = response.status();
    info!("HTTP {} {} {}", method, uri, status.as_u16());
    response
}

/// =============================
/// Router
/// =============================

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/", get(index))
        .route("/new", post(new_conversation))
        .route("/conversations", get(conversations))
        .route("/conversation/:id", get(get_conversation))
        .route("/ask", post(ask))
        .route("/api/ask", post(api_ask_new))
        .route("/api/ask/:id", post(api_ask))
        .route("/api/conversations/users/:user_id", get(api_conversations))
        .with_state(state)
        .layer(middleware::from_fn(log_requests))
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

/// Resolves on Ctrl-C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => warn!("Ctrl-C received, exiting..."),
        _ = terminate => warn!("SIGTERM received, exiting..."),
    }
}

pub async fn start_server(
    state: AppState,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

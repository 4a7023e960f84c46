//! Ask flow shared by the HTML and JSON surfaces
//!
//! INPUT → INVOKE AGENT → RE-READ CONVERSATION → COMPLETE

use std::sync::Arc;
use tracing::{error, info};

use crate::agent::{AgentRuntime, InvocationRequest};
use crate::memory::ConversationReconstructor;
use crate::models::{Conversation, Source};
use crate::Result;

/// Identifies the conversation a question belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationRef {
    pub conversation_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone)]
pub struct AskOutcome {
    pub answer: String,
    /// Canonical view, rebuilt from memory after the agent answered
    pub conversation: Conversation,
    pub sources: Vec<Source>,
}

pub struct Orchestrator {
    runtime: Arc<dyn AgentRuntime>,
    runtime_id: String,
    reconstructor: Arc<ConversationReconstructor>,
}

impl Orchestrator {
    pub fn new(
        runtime: Arc<dyn AgentRuntime>,
        runtime_id: impl Into<String>,
        reconstructor: Arc<ConversationReconstructor>,
    ) -> Self {
        Self {
            runtime,
            runtime_id: runtime_id.into(),
            reconstructor,
        }
    }

    pub async fn ask(&self, conversation: &ConversationRef, question: &str) -> Result<AskOutcome> {
        info!(
            conversation_id = %conversation.conversation_id,
            user_id = %conversation.user_id,
            "invoking agent runtime"
        );

        let answer = self
            .runtime
            .invoke(InvocationRequest {
                runtime_id: self.runtime_id.clone(),
                user_id: conversation.user_id.clone(),
                session_id: conversation.conversation_id.clone(),
                prompt: question.to_string(),
            })
            .await
            .map_err(|e| {
                error!(
                    conversation_id = %conversation.conversation_id,
                    user_id = %conversation.user_id,
                    kind = e.kind(),
                    "agent invocation failed: {}",
                    e
                );
                e
            })?;
        info!("Orchestrator completed. Answer length: {}", answer.len());

        let conversation = self
            .reconstructor
            .get(&conversation.conversation_id, &conversation.user_id)
            .await?;
        info!(
            "Database fetch completed. Questions count: {}",
            conversation.questions.len()
        );

        Ok(AskOutcome {
            answer,
            conversation,
            sources: Vec::new(),
        })
    }
}

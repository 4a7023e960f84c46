//! Language model seam used by the agent container

use crate::models::Role;
use crate::Result;

/// One message of the running transcript sent to the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelMessage {
    pub role: Role,
    pub text: String,
}

impl ModelMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    /// Reported back to callers in the `model` field
    fn name(&self) -> &str;

    async fn complete(&self, system_prompt: &str, messages: &[ModelMessage]) -> Result<String>;
}

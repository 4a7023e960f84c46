//! Core data models
//!
//! Events are owned by the managed memory service and read as-is; turns,
//! conversations and session summaries are derived fresh on every request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::timestamp;

//
// ================= Events (external) =================
//

/// Role attached to a conversational payload
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Assistant,
    Tool,
    #[default]
    #[serde(other)]
    Other,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Assistant => "ASSISTANT",
            Role::Tool => "TOOL",
            Role::Other => "OTHER",
        }
    }
}

/// Event instant as it arrives on the wire: an ISO-8601 string or a
/// numeric epoch-seconds value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventTimestamp {
    Text(String),
    Epoch(f64),
}

impl EventTimestamp {
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        timestamp::normalize(self)
    }
}

impl From<DateTime<Utc>> for EventTimestamp {
    fn from(instant: DateTime<Utc>) -> Self {
        EventTimestamp::Text(instant.to_rfc3339())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversational {
    #[serde(default)]
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
}

impl Conversational {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(Content {
                text: Some(text.into()),
            }),
        }
    }

    /// `content.text`, absent if either level is missing
    pub fn text(&self) -> Option<&str> {
        self.content.as_ref().and_then(|c| c.text.as_deref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PayloadItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversational: Option<Conversational>,
}

/// One immutable record appended to a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    pub event_timestamp: EventTimestamp,
    #[serde(default)]
    pub payload: Option<Vec<PayloadItem>>,
}

impl Event {
    /// Single-message conversational event
    pub fn message(timestamp: impl Into<EventTimestamp>, role: Role, text: impl Into<String>) -> Self {
        Self {
            event_id: None,
            event_timestamp: timestamp.into(),
            payload: Some(vec![PayloadItem {
                conversational: Some(Conversational::new(role, text)),
            }]),
        }
    }

    /// Conversational records carried by this event, in payload order
    pub fn conversational(&self) -> impl Iterator<Item = &Conversational> {
        self.payload
            .iter()
            .flatten()
            .filter_map(|item| item.conversational.as_ref())
    }
}

/// Session listing entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDescriptor {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<EventTimestamp>,
}

//
// ================= Derived views =================
//

/// A reconstructed question/answer pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub q: String,
    pub a: String,
}

impl Turn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            q: question.into(),
            a: answer.into(),
        }
    }
}

/// Source document backing an answer. Never populated yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(rename = "conversationId")]
    pub conversation_id: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub questions: Vec<Turn>,
    pub sources: Vec<Source>,
}

impl Conversation {
    pub fn new(conversation_id: impl Into<String>, user_id: impl Into<String>, questions: Vec<Turn>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            user_id: user_id.into(),
            questions,
            sources: Vec::new(),
        }
    }

    /// A conversation that has not been started
    pub fn empty(user_id: impl Into<String>) -> Self {
        Self::new(String::new(), user_id, Vec::new())
    }
}

/// One row of the history list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    #[serde(rename = "conversationId")]
    pub conversation_id: String,
    pub initial_question: String,
    pub created: String,
}

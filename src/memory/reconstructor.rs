//! Conversation reconstruction
//!
//! Turns the raw event stream of one (user, conversation) pair into ordered
//! question/answer turns.

use std::sync::Arc;
use tracing::{debug, error, info};

use super::store::{collect_events, EventStore, Paging};
use crate::error::StoreError;
use crate::models::{Conversation, Event, Role, Turn};
use crate::Result;

/// Rebuilds conversations from the memory service
pub struct ConversationReconstructor {
    store: Arc<dyn EventStore>,
    paging: Paging,
}

impl ConversationReconstructor {
    pub fn new(store: Arc<dyn EventStore>, paging: Paging) -> Self {
        Self { store, paging }
    }

    /// Fetch a conversation by id and user.
    ///
    /// A user or conversation the store has never seen yields a conversation
    /// with no questions. Other store failures propagate.
    pub async fn get(&self, conversation_id: &str, user_id: &str) -> Result<Conversation> {
        let events = self.fetch_events(user_id, conversation_id).await?;
        info!("found {} events", events.len());
        debug!(?events, "raw events");

        let conversation = Conversation::new(conversation_id, user_id, reconstruct(&events));
        debug!(
            conversation_id,
            questions = conversation.questions.len(),
            "translated events into conversation"
        );
        Ok(conversation)
    }

    /// The trailing `k` turns of a conversation, oldest first
    pub async fn last_turns(&self, user_id: &str, conversation_id: &str, k: usize) -> Result<Vec<Turn>> {
        let events = self.fetch_events(user_id, conversation_id).await?;
        let mut turns = reconstruct(&events);
        let skip = turns.len().saturating_sub(k);
        Ok(turns.split_off(skip))
    }

    async fn fetch_events(&self, user_id: &str, conversation_id: &str) -> Result<Vec<Event>> {
        match collect_events(self.store.as_ref(), user_id, conversation_id, &self.paging).await {
            Ok(events) => Ok(events),
            Err(StoreError::NotFound(what)) => {
                debug!(user_id, conversation_id, "no events yet: {}", what);
                Ok(Vec::new())
            }
            Err(e) => {
                error!(
                    user_id,
                    conversation_id,
                    error = %e,
                    "failed to list conversation events"
                );
                Err(e.into())
            }
        }
    }
}

/// Build turns from events as the memory service returns them: newest first.
///
/// The slice is reversed before pairing. If a store ever returns events oldest
/// first, call [`pair_turns`] directly instead.
pub fn reconstruct(events_newest_first: &[Event]) -> Vec<Turn> {
    pair_turns(events_newest_first.iter().rev())
}

/// Pair USER and ASSISTANT records from chronologically ordered events.
///
/// A USER record closes the pending pair (emitting it if both halves are set),
/// clears the pending answer, and becomes the new question. The last ASSISTANT
/// record before the next USER wins. TOOL and unknown roles are skipped.
/// Records without text count as absent. A question still unanswered at the
/// end is dropped.
pub fn pair_turns<'a>(events_oldest_first: impl IntoIterator<Item = &'a Event>) -> Vec<Turn> {
    let mut turns = Vec::new();
    let mut question: Option<&str> = None;
    let mut answer: Option<&str> = None;

    for record in events_oldest_first.into_iter().flat_map(Event::conversational) {
        let text = record.text().filter(|t| !t.is_empty());

        match record.role {
            Role::User => {
                if let (Some(q), Some(a)) = (question, answer) {
                    turns.push(Turn::new(q, a));
                }
                answer = None;
                question = text;
            }
            Role::Assistant => answer = text,
            Role::Tool | Role::Other => {}
        }
    }

    if let (Some(q), Some(a)) = (question, answer) {
        turns.push(Turn::new(q, a));
    }

    turns
}

//! Session history summarization
//!
//! Builds the recency-sorted history list: one entry per session carrying its
//! opening question and the time of its latest activity.

use chrono::{DateTime, FixedOffset, Utc};
use std::sync::Arc;
use tracing::{debug, error, info};

use super::store::{collect_events, collect_sessions, EventStore, Paging};
use super::timestamp::format_created;
use crate::error::StoreError;
use crate::models::{Event, SessionSummary};
use crate::Result;

/// Shown when a session's first event carries no question text
pub const NO_QUESTION: &str = "No question found";

/// Summarizes a user's sessions from the memory service
pub struct SessionSummarizer {
    store: Arc<dyn EventStore>,
    paging: Paging,
    display_offset: FixedOffset,
}

/// A session with at least one timestamped event
#[derive(Debug, Clone)]
struct SessionActivity {
    session_id: String,
    initial_question: String,
    latest: DateTime<Utc>,
}

impl SessionActivity {
    fn from_events(session_id: String, events: Vec<Event>) -> Option<Self> {
        let mut stamped: Vec<(DateTime<Utc>, Event)> = events
            .into_iter()
            .filter_map(|event| match event.event_timestamp.instant() {
                Some(instant) => Some((instant, event)),
                None => {
                    debug!(
                        session_id = %session_id,
                        timestamp = ?event.event_timestamp,
                        "ignoring event with unparseable timestamp"
                    );
                    None
                }
            })
            .collect();

        stamped.sort_by_key(|(instant, _)| *instant);

        let (_, first) = stamped.first()?;
        let (latest, _) = stamped.last()?;

        Some(Self {
            initial_question: initial_question(first),
            latest: *latest,
            session_id,
        })
    }

    fn into_summary(self, offset: &FixedOffset) -> SessionSummary {
        SessionSummary {
            conversation_id: self.session_id,
            initial_question: self.initial_question,
            created: format_created(self.latest, offset),
        }
    }
}

/// Text of the first payload item of an event, or [`NO_QUESTION`]
fn initial_question(event: &Event) -> String {
    event
        .payload
        .as_ref()
        .and_then(|payload| payload.first())
        .and_then(|item| item.conversational.as_ref())
        .and_then(|record| record.text())
        .map(str::to_string)
        .unwrap_or_else(|| NO_QUESTION.to_string())
}

/// Most recent first; ties keep their listing order
fn rank(mut sessions: Vec<SessionActivity>, top_n: usize) -> Vec<SessionActivity> {
    sessions.sort_by(|a, b| b.latest.cmp(&a.latest));
    sessions.truncate(top_n);
    sessions
}

impl SessionSummarizer {
    pub fn new(store: Arc<dyn EventStore>, paging: Paging, display_offset: FixedOffset) -> Self {
        Self {
            store,
            paging,
            display_offset,
        }
    }

    /// Up to `top_n` sessions for a user, most recently active first.
    ///
    /// A user the store has never seen has no history. Sessions without
    /// events are left out. Other store failures propagate.
    pub async fn summarize(&self, user_id: &str, top_n: usize) -> Result<Vec<SessionSummary>> {
        let sessions = match collect_sessions(self.store.as_ref(), user_id, &self.paging).await {
            Ok(sessions) => sessions,
            Err(StoreError::NotFound(what)) => {
                debug!(user_id, "no sessions yet: {}", what);
                return Ok(Vec::new());
            }
            Err(e) => {
                error!(user_id, error = %e, "failed to list sessions");
                return Err(e.into());
            }
        };
        info!("Found {} total sessions", sessions.len());

        let mut active = Vec::with_capacity(sessions.len());
        for session in sessions {
            let events = match collect_events(
                self.store.as_ref(),
                user_id,
                &session.session_id,
                &self.paging,
            )
            .await
            {
                Ok(events) => events,
                Err(StoreError::NotFound(_)) => continue,
                Err(e) => {
                    error!(
                        user_id,
                        session_id = %session.session_id,
                        error = %e,
                        "failed to list session events"
                    );
                    return Err(e.into());
                }
            };
            debug!(session_id = %session.session_id, events = events.len(), "session events");

            if let Some(activity) = SessionActivity::from_events(session.session_id, events) {
                active.push(activity);
            }
        }

        Ok(rank(active, top_n)
            .into_iter()
            .map(|activity| activity.into_summary(&self.display_offset))
            .collect())
    }
}

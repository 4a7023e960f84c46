//! Event store seam
//!
//! The managed memory service owns all events. This module defines the read
//! (and append) interface the rest of the crate uses, pagination helpers, and
//! an in-memory implementation for development and tests.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Event, EventTimestamp, Role, SessionDescriptor};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// How many events/sessions to pull per call, and how many calls to make
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub page_size: u32,
    /// Pages fetched before giving up on `nextToken`. Always at least one.
    pub max_pages: u32,
}

impl Default for Paging {
    fn default() -> Self {
        Self {
            page_size: 100,
            max_pages: 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub max_results: u32,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct EventPage {
    /// Newest first, as the managed service returns them
    pub events: Vec<Event>,
    pub next_token: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionPage {
    pub sessions: Vec<SessionDescriptor>,
    pub next_token: Option<String>,
}

/// A message to append to a session
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub role: Role,
    pub text: String,
}

impl NewMessage {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

/// Trait for the external memory service
#[async_trait::async_trait]
pub trait EventStore: Send + Sync {
    /// One page of a session's events, newest first.
    /// Unknown actor or session is `StoreError::NotFound`.
    async fn list_events(
        &self,
        actor_id: &str,
        session_id: &str,
        page: PageRequest,
    ) -> StoreResult<EventPage>;

    /// One page of an actor's sessions. Unknown actor is `StoreError::NotFound`.
    async fn list_sessions(&self, actor_id: &str, page: PageRequest) -> StoreResult<SessionPage>;

    async fn create_event(
        &self,
        actor_id: &str,
        session_id: &str,
        message: NewMessage,
    ) -> StoreResult<()>;
}

/// Follow `nextToken` across up to `paging.max_pages` pages of events
pub async fn collect_events(
    store: &dyn EventStore,
    actor_id: &str,
    session_id: &str,
    paging: &Paging,
) -> StoreResult<Vec<Event>> {
    let mut events = Vec::new();
    let mut next_token = None;

    for _ in 0..paging.max_pages.max(1) {
        let page = store
            .list_events(
                actor_id,
                session_id,
                PageRequest {
                    max_results: paging.page_size,
                    next_token: next_token.take(),
                },
            )
            .await?;
        events.extend(page.events);

        match page.next_token {
            Some(token) => next_token = Some(token),
            None => break,
        }
    }

    Ok(events)
}

/// Follow `nextToken` across up to `paging.max_pages` pages of sessions
pub async fn collect_sessions(
    store: &dyn EventStore,
    actor_id: &str,
    paging: &Paging,
) -> StoreResult<Vec<SessionDescriptor>> {
    let mut sessions = Vec::new();
    let mut next_token = None;

    for _ in 0..paging.max_pages.max(1) {
        let page = store
            .list_sessions(
                actor_id,
                PageRequest {
                    max_results: paging.page_size,
                    next_token: next_token.take(),
                },
            )
            .await?;
        sessions.extend(page.sessions);

        match page.next_token {
            Some(token) => next_token = Some(token),
            None => break,
        }
    }

    Ok(sessions)
}

#[derive(Debug, Clone)]
struct SessionLog {
    session_id: String,
    /// Oldest first
    events: Vec<Event>,
}

/// In-memory event store for development and tests
pub struct InMemoryEventStore {
    actors: Arc<RwLock<HashMap<String, Vec<SessionLog>>>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self {
            actors: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Append a prebuilt event, creating the actor and session if needed
    pub async fn append(&self, actor_id: &str, session_id: &str, event: Event) {
        let mut actors = self.actors.write().await;
        let sessions = actors.entry(actor_id.to_string()).or_default();

        match sessions.iter_mut().find(|s| s.session_id == session_id) {
            Some(log) => log.events.push(event),
            None => sessions.push(SessionLog {
                session_id: session_id.to_string(),
                events: vec![event],
            }),
        }
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

fn page_bounds(page: &PageRequest, len: usize) -> StoreResult<(usize, usize)> {
    let start = match &page.next_token {
        Some(token) => token
            .parse::<usize>()
            .map_err(|_| StoreError::Fatal(format!("invalid next token: {}", token)))?,
        None => 0,
    };
    let size = if page.max_results == 0 {
        len
    } else {
        page.max_results as usize
    };
    let start = start.min(len);
    Ok((start, (start + size).min(len)))
}

#[async_trait::async_trait]
impl EventStore for InMemoryEventStore {
    async fn list_events(
        &self,
        actor_id: &str,
        session_id: &str,
        page: PageRequest,
    ) -> StoreResult<EventPage> {
        let actors = self.actors.read().await;
        let log = actors
            .get(actor_id)
            .ok_or_else(|| StoreError::NotFound(format!("actor {}", actor_id)))?
            .iter()
            .find(|s| s.session_id == session_id)
            .ok_or_else(|| StoreError::NotFound(format!("session {}", session_id)))?;

        let (start, end) = page_bounds(&page, log.events.len())?;
        let events = log.events.iter().rev().skip(start).take(end - start).cloned().collect();

        Ok(EventPage {
            events,
            next_token: (end < log.events.len()).then(|| end.to_string()),
        })
    }

    async fn list_sessions(&self, actor_id: &str, page: PageRequest) -> StoreResult<SessionPage> {
        let actors = self.actors.read().await;
        let sessions = actors
            .get(actor_id)
            .ok_or_else(|| StoreError::NotFound(format!("actor {}", actor_id)))?;

        let (start, end) = page_bounds(&page, sessions.len())?;
        let descriptors = sessions[start..end]
            .iter()
            .map(|log| SessionDescriptor {
                session_id: log.session_id.clone(),
                actor_id: Some(actor_id.to_string()),
                created_at: log.events.first().map(|e| e.event_timestamp.clone()),
            })
            .collect();

        Ok(SessionPage {
            sessions: descriptors,
            next_token: (end < sessions.len()).then(|| end.to_string()),
        })
    }

    async fn create_event(
        &self,
        actor_id: &str,
        session_id: &str,
        message: NewMessage,
    ) -> StoreResult<()> {
        let mut event = Event::message(EventTimestamp::from(Utc::now()), message.role, message.text);
        event.event_id = Some(Uuid::new_v4().to_string());
        self.append(actor_id, session_id, event).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    fn message(n: usize) -> Event {
        Event::message(
            EventTimestamp::Epoch(1_700_000_000.0 + n as f64),
            Role::User,
            format!("message {}", n),
        )
    }

    #[tokio::test]
    async fn test_unknown_actor_and_session_are_not_found() {
        let store = InMemoryEventStore::new();
        let err = store
            .list_sessions("nobody", PageRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        store.append("user-1", "s-1", message(0)).await;
        let err = store
            .list_events("user-1", "s-2", PageRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_events_are_returned_newest_first() {
        let store = InMemoryEventStore::new();
        for n in 0..3 {
            store.append("user-1", "s-1", message(n)).await;
        }

        let page = assert_ok!(store.list_events("user-1", "s-1", PageRequest::default()).await);
        let texts: Vec<_> = page
            .events
            .iter()
            .flat_map(|e| e.conversational())
            .filter_map(|c| c.text())
            .collect();
        assert_eq!(texts, vec!["message 2", "message 1", "message 0"]);
        assert!(page.next_token.is_none());
    }

    #[tokio::test]
    async fn test_collect_events_respects_max_pages() {
        let store = InMemoryEventStore::new();
        for n in 0..5 {
            store.append("user-1", "s-1", message(n)).await;
        }

        let one_page = Paging {
            page_size: 2,
            max_pages: 1,
        };
        let events = assert_ok!(collect_events(&store, "user-1", "s-1", &one_page).await);
        assert_eq!(events.len(), 2);

        let all_pages = Paging {
            page_size: 2,
            max_pages: 10,
        };
        let events = assert_ok!(collect_events(&store, "user-1", "s-1", &all_pages).await);
        assert_eq!(events.len(), 5);
        assert_eq!(events[0], message(4));
        assert_eq!(events[4], message(0));
    }

    #[tokio::test]
    async fn test_collect_sessions_in_listing_order() {
        let store = InMemoryEventStore::new();
        for session in ["a", "b", "c"] {
            store.append("user-1", session, message(0)).await;
        }

        let paging = Paging {
            page_size: 1,
            max_pages: 5,
        };
        let sessions = assert_ok!(collect_sessions(&store, "user-1", &paging).await);
        let ids: Vec<_> = sessions.iter().map(|s| s.session_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_create_event_appends_message() {
        let store = InMemoryEventStore::new();
        assert_ok!(
            store
                .create_event("user-1", "s-1", NewMessage::new(Role::Assistant, "hello"))
                .await
        );

        let page = assert_ok!(store.list_events("user-1", "s-1", PageRequest::default()).await);
        let record = page.events[0].conversational().next().unwrap();
        assert_eq!(record.role, Role::Assistant);
        assert_eq!(record.text(), Some("hello"));
        assert!(page.events[0].event_timestamp.instant().is_some());
    }
}

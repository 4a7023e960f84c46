//! Conversation memory
//!
//! Read access to the managed memory service, and the logic that turns its
//! event stream into conversations and history lists.

pub mod client;
pub mod reconstructor;
pub mod store;
pub mod summarizer;
pub mod timestamp;

pub use client::HttpEventStore;
pub use reconstructor::{pair_turns, reconstruct, ConversationReconstructor};
pub use store::{EventStore, InMemoryEventStore, NewMessage, Paging};
pub use summarizer::SessionSummarizer;

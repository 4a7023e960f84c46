//! Chat Accelerator
//!
//! A chat Q&A front end over a managed agent runtime and memory store:
//! - Sends each question to a remote agent for a (user, conversation) pair
//! - Rebuilds conversations from the memory service's raw event log
//! - Summarizes a user's recent conversations for the history sidebar
//! - Serves an htmx chat UI and a JSON API
//!
//! The `agent` binary is the container behind the runtime: it answers with a
//! language model and writes every message back to memory.
//!
//! ASK FLOW:
//! INPUT → INVOKE AGENT → RE-READ MEMORY → RENDER

pub mod agent;
pub mod api;
pub mod config;
pub mod error;
pub mod gemini;
pub mod memory;
pub mod models;
pub mod orchestrator;
pub mod telemetry;
pub mod views;

pub use error::Result;

// Re-export common types
pub use models::*;

//! Agent runtime
//!
//! The client the front end uses to reach the agent, and the agent container
//! itself: per-session state, memory hooks and the language model seam.

pub mod model;
pub mod registry;
pub mod runtime;
pub mod service;

pub use model::{LanguageModel, ModelMessage};
pub use registry::SessionRegistry;
pub use runtime::{AgentRuntime, HttpAgentRuntime, InvocationRequest};
pub use service::{AgentService, AgentSession};

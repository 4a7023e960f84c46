use chat_accelerator::{
    agent::{service::start_server, AgentService},
    config::AgentConfig,
    gemini::GeminiClient,
    memory::{ConversationReconstructor, HttpEventStore},
    telemetry::init_tracing,
};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AgentConfig::from_env()?;

    if config.gemini_api_key.is_empty() {
        warn!("GEMINI_API_KEY not set, every invocation will fail");
        warn!("export GEMINI_API_KEY=<value>");
    }

    info!("Chat Accelerator - agent container");
    info!("Port: {}", config.port);
    info!("Memory: {} ({})", config.memory_id, config.region);

    let store = Arc::new(HttpEventStore::new(&config.store, config.memory_id.clone())?);
    let reconstructor = ConversationReconstructor::new(store.clone(), config.store.paging());
    let model = Arc::new(GeminiClient::new(config.gemini_api_key.clone(), config.model_timeout)?);

    let service = Arc::new(AgentService::new(
        store,
        reconstructor,
        model,
        config.context_turns,
        config.session_idle,
        config.max_sessions,
    ));

    info!("Agent initialized with model {}", service.model_name());
    start_server(service, config.port).await?;

    Ok(())
}

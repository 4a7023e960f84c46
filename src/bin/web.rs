use chat_accelerator::{
    agent::HttpAgentRuntime,
    api::{start_server, AppState},
    config::WebConfig,
    memory::HttpEventStore,
    telemetry::init_tracing,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();
    init_tracing();

    let config = WebConfig::from_env()?;

    info!("Chat Accelerator - web front end");
    info!("Port: {}", config.port);
    info!("Agent runtime: {}", config.agent_runtime);
    info!("Memory: {} ({})", config.memory_id, config.region);

    let store = Arc::new(HttpEventStore::new(&config.memory, config.memory_id.clone())?);
    let runtime = Arc::new(HttpAgentRuntime::new(&config.runtime)?);
    let state = AppState::new(&config, store, runtime)?;

    info!("Starting web server...");
    start_server(state, config.port).await?;

    Ok(())
}

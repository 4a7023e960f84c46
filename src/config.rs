//! Process configuration
//!
//! Read once at startup from the environment (an optional `.env` file is loaded
//! first by the binaries) and passed into constructors.

use crate::error::ChatError;
use crate::memory::Paging;
use crate::Result;
use chrono::FixedOffset;
use std::str::FromStr;
use std::time::Duration;
use tracing::{error, info};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_USER_ID: &str = "user-1";
const DEFAULT_HISTORY_SIZE: usize = 10;
const DEFAULT_PAGE_SIZE: u32 = 100;
const DEFAULT_MAX_PAGES: u32 = 1;
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CONTEXT_TURNS: usize = 5;
const DEFAULT_SESSION_IDLE_SECS: u64 = 900;
const DEFAULT_MAX_SESSIONS: usize = 256;

/// Event store client settings
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub endpoint: String,
    pub api_token: Option<String>,
    pub page_size: u32,
    pub max_pages: u32,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl StoreConfig {
    pub fn paging(&self) -> Paging {
        Paging {
            page_size: self.page_size,
            max_pages: self.max_pages,
        }
    }
}

/// Agent runtime client settings
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub endpoint: String,
    pub api_token: Option<String>,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

/// Configuration for the web front end
#[derive(Debug, Clone)]
pub struct WebConfig {
    /// Agent runtime identifier (ARN) to invoke
    pub agent_runtime: String,
    pub region: String,
    pub memory_id: String,
    pub port: u16,
    /// Identity used for every request until authentication is wired in
    pub user_id: String,
    /// Number of conversations shown in the history list
    pub history_size: usize,
    pub memory: StoreConfig,
    pub runtime: RuntimeConfig,
    /// Offset used when formatting timestamps for display
    pub display_offset: FixedOffset,
}

/// Configuration for the agent container
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub port: u16,
    pub region: String,
    pub memory_id: String,
    pub store: StoreConfig,
    pub gemini_api_key: String,
    pub model_timeout: Duration,
    /// Turns loaded from memory when a session is first seen
    pub context_turns: usize,
    pub session_idle: Duration,
    pub max_sessions: usize,
}

impl WebConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);
        let required = env.require(&["AGENT_RUNTIME", "AWS_REGION", "MEMORY_ID"])?;
        let [agent_runtime, region, memory_id] = required;

        let timeout = Duration::from_secs(env.parse("UPSTREAM_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?);
        let connect_timeout = Duration::from_secs(
            env.parse("UPSTREAM_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS)?,
        );
        let default_endpoint = default_endpoint(&region);

        let memory = StoreConfig {
            endpoint: env.string("MEMORY_ENDPOINT").unwrap_or_else(|| default_endpoint.clone()),
            api_token: env.string("MEMORY_API_TOKEN"),
            page_size: env.parse("MEMORY_PAGE_SIZE", DEFAULT_PAGE_SIZE)?,
            max_pages: env.parse("MEMORY_MAX_PAGES", DEFAULT_MAX_PAGES)?,
            timeout,
            connect_timeout,
        };

        let runtime = RuntimeConfig {
            endpoint: env.string("RUNTIME_ENDPOINT").unwrap_or(default_endpoint),
            api_token: env.string("RUNTIME_API_TOKEN"),
            timeout,
            connect_timeout,
        };

        let offset_minutes: i32 = env.parse("DISPLAY_UTC_OFFSET_MINUTES", 0)?;
        let display_offset = FixedOffset::east_opt(offset_minutes * 60).ok_or_else(|| {
            ChatError::Config(format!(
                "DISPLAY_UTC_OFFSET_MINUTES out of range: {}",
                offset_minutes
            ))
        })?;

        Ok(Self {
            agent_runtime,
            region,
            memory_id,
            port: env.parse("PORT", DEFAULT_PORT)?,
            user_id: env
                .string("APP_USER_ID")
                .unwrap_or_else(|| DEFAULT_USER_ID.to_string()),
            history_size: env.parse("HISTORY_SIZE", DEFAULT_HISTORY_SIZE)?,
            memory,
            runtime,
            display_offset,
        })
    }
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);
        let [region, memory_id] = env.require(&["AWS_REGION", "MEMORY_ID"])?;

        let timeout = Duration::from_secs(env.parse("UPSTREAM_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?);
        let store = StoreConfig {
            endpoint: env
                .string("MEMORY_ENDPOINT")
                .unwrap_or_else(|| default_endpoint(&region)),
            api_token: env.string("MEMORY_API_TOKEN"),
            page_size: env.parse("MEMORY_PAGE_SIZE", DEFAULT_PAGE_SIZE)?,
            max_pages: env.parse("MEMORY_MAX_PAGES", DEFAULT_MAX_PAGES)?,
            timeout,
            connect_timeout: Duration::from_secs(
                env.parse("UPSTREAM_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS)?,
            ),
        };

        Ok(Self {
            port: env.parse("PORT", DEFAULT_PORT)?,
            region,
            memory_id,
            store,
            gemini_api_key: env.string("GEMINI_API_KEY").unwrap_or_default(),
            model_timeout: timeout,
            context_turns: env.parse("CONTEXT_TURNS", DEFAULT_CONTEXT_TURNS)?,
            session_idle: Duration::from_secs(
                env.parse("SESSION_IDLE_SECS", DEFAULT_SESSION_IDLE_SECS)?,
            ),
            max_sessions: env.parse("MAX_SESSIONS", DEFAULT_MAX_SESSIONS)?,
        })
    }
}

fn default_endpoint(region: &str) -> String {
    format!("https://bedrock-agentcore.{}.amazonaws.com", region)
}

/// Thin wrapper over a variable lookup function
struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<'a, F: Fn(&str) -> Option<String>> Env<'a, F> {
    /// Non-empty value of a variable
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn parse<T: FromStr>(&self, key: &str, default: T) -> Result<T> {
        match self.string(key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|_| {
                ChatError::Config(format!("invalid value for {}: {:?}", key, raw))
            }),
        }
    }

    /// Fetch every required variable, failing with all the missing names at once
    fn require<const N: usize>(&self, keys: &[&str; N]) -> Result<[String; N]> {
        let values: Vec<Option<String>> = keys.iter().map(|k| self.string(k)).collect();
        let missing: Vec<&str> = keys
            .iter()
            .zip(&values)
            .filter(|(_, v)| v.is_none())
            .map(|(k, _)| *k)
            .collect();

        if !missing.is_empty() {
            let message = format!(
                "Missing required environment variables: {}",
                missing.join(", ")
            );
            error!("{}", message);
            error!("Please set the following environment variables:");
            for var in &missing {
                error!("  export {}=<value>", var);
            }
            return Err(ChatError::Config(message));
        }

        info!("Environment validation passed");
        let values: Vec<String> = values.into_iter().flatten().collect();
        for (key, value) in keys.iter().zip(&values) {
            info!("  {}: {}", key, preview(value));
        }

        values
            .try_into()
            .map_err(|_| ChatError::Config("environment lookup mismatch".to_string()))
    }
}

/// First 20 characters of a value, for startup logs
fn preview(value: &str) -> String {
    if value.chars().count() > 20 {
        format!("{}...", value.chars().take(20).collect::<String>())
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_required_variables_are_all_named() {
        let err = WebConfig::from_lookup(lookup(&[("AWS_REGION", "us-east-1")])).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("AGENT_RUNTIME"));
        assert!(message.contains("MEMORY_ID"));
        assert!(!message.contains("AWS_REGION"));
    }

    #[test]
    fn test_web_defaults() {
        let config = WebConfig::from_lookup(lookup(&[
            ("AGENT_RUNTIME", "arn:aws:bedrock-agentcore:us-east-1:123:runtime/chat"),
            ("AWS_REGION", "us-east-1"),
            ("MEMORY_ID", "mem-123"),
        ]))
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.user_id, "user-1");
        assert_eq!(config.history_size, 10);
        assert_eq!(config.memory.page_size, 100);
        assert_eq!(config.memory.max_pages, 1);
        assert_eq!(
            config.memory.endpoint,
            "https://bedrock-agentcore.us-east-1.amazonaws.com"
        );
        assert_eq!(config.runtime.timeout, Duration::from_secs(60));
        assert_eq!(config.display_offset.local_minus_utc(), 0);
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let err = WebConfig::from_lookup(lookup(&[
            ("AGENT_RUNTIME", "arn"),
            ("AWS_REGION", "us-east-1"),
            ("MEMORY_ID", "mem-123"),
            ("PORT", "eighty"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_agent_config_overrides() {
        let config = AgentConfig::from_lookup(lookup(&[
            ("AWS_REGION", "eu-west-1"),
            ("MEMORY_ID", "mem-1"),
            ("CONTEXT_TURNS", "3"),
            ("MAX_SESSIONS", "4"),
            ("MEMORY_ENDPOINT", "http://localhost:9000"),
        ]))
        .unwrap();
        assert_eq!(config.context_turns, 3);
        assert_eq!(config.max_sessions, 4);
        assert_eq!(config.store.endpoint, "http://localhost:9000");
        assert!(config.gemini_api_key.is_empty());
    }

    #[test]
    fn test_preview_truncates_long_values() {
        assert_eq!(preview("short"), "short");
        assert_eq!(
            preview("arn:aws:bedrock-agentcore:us-east-1"),
            "arn:aws:bedrock-agen..."
        );
    }
}

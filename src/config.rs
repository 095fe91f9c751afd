use crate::llm::{LlmSettings, Provider, RetryConfig};
use crate::mcp::config::CONFIG_PATH_ENV;
use clap::Parser;
use config::{Config, Environment};
use serde::Deserialize;

/// Gemini's OpenAI-compatible endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai/";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Credential variables, first match wins.
pub const API_KEY_ENVS: [&str; 2] = ["GOOGLE_API_KEY", "LLM_API_KEY"];

#[derive(Parser, Debug)]
#[command(author, version, about = "Chat with an LLM that can call tools from MCP servers", long_about = None)]
pub struct Cli {
    /// MCP server config file (JSON)
    #[arg(short, long, env = CONFIG_PATH_ENV)]
    pub config: Option<String>,

    /// Model identifier
    #[arg(long)]
    pub model: Option<String>,

    /// Base URL of the OpenAI-compatible API
    #[arg(long)]
    pub base_url: Option<String>,

    /// Retries for transient API failures
    #[arg(long)]
    pub max_retries: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    pub llm: LlmConfig,
    /// Path of the MCP server file, if one was given.
    #[serde(default)]
    pub server_config: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_retries: u32,
    pub max_tool_iterations: usize,
}

impl ClientConfig {
    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Self::from_cli(cli)
    }

    /// Priority: CLI flag > `MCP_CHAT__*` env > defaults.
    pub fn from_cli(cli: Cli) -> Result<Self, config::ConfigError> {
        let mut builder = Config::builder()
            .set_default("llm.base_url", DEFAULT_BASE_URL)?
            .set_default("llm.model", DEFAULT_MODEL)?
            .set_default("llm.temperature", 0.0)?
            .set_default("llm.max_retries", 2)?
            .set_default("llm.max_tool_iterations", 10)?;

        // E.g. MCP_CHAT__LLM__MODEL=gemini-2.5-flash
        builder = builder.add_source(
            Environment::with_prefix("MCP_CHAT")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(path) = cli.config {
            builder = builder.set_override("server_config", path)?;
        }
        if let Some(model) = cli.model {
            builder = builder.set_override("llm.model", model)?;
        }
        if let Some(base_url) = cli.base_url {
            builder = builder.set_override("llm.base_url", base_url)?;
        }
        if let Some(retries) = cli.max_retries {
            builder = builder.set_override("llm.max_retries", retries)?;
        }

        builder.build()?.try_deserialize()
    }
}

fn api_key_from_env() -> Option<String> {
    API_KEY_ENVS
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .find(|s| !s.trim().is_empty())
}

pub fn load_llm_settings(cfg: &LlmConfig) -> Result<LlmSettings, String> {
    if cfg.base_url.trim().is_empty() {
        return Err("llm.base_url cannot be empty".to_string());
    }
    if cfg.model.trim().is_empty() {
        return Err("llm.model cannot be empty".to_string());
    }
    if cfg.max_tool_iterations == 0 {
        return Err("llm.max_tool_iterations must be at least 1".to_string());
    }

    let api_key = api_key_from_env();
    if api_key.is_none() {
        tracing::warn!(
            vars = ?API_KEY_ENVS,
            "No API key set; requests will be sent unauthenticated"
        );
    }

    Ok(LlmSettings {
        base_url: cfg.base_url.clone(),
        api_key,
        model: cfg.model.clone(),
        temperature: cfg.temperature,
        provider: Provider::detect_from_url(&cfg.base_url),
        retry: RetryConfig {
            max_retries: cfg.max_retries,
            ..RetryConfig::default()
        },
        max_tool_iterations: cfg.max_tool_iterations,
    })
}

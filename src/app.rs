//! Startup sequence: server config, connections, agent, query loop, teardown.

use std::io::Write;

use tokio::io::AsyncBufRead;

use crate::llm::ChatAgent;
use crate::mcp::config::{ConfigError, ConfigSource, McpConfig, load_mcp_config};
use crate::mcp::{ToolDescriptor, ToolHub};
use crate::repl::{self, EXIT_KEYWORD};

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The config named no servers; nothing was started.
    NoServers,
    /// No connected server contributed a tool; the agent was not built.
    NoTools,
    /// The query loop ran and ended normally.
    Finished {
        /// Queries answered before the loop ended.
        queries: usize,
    },
}

/// Load the server config, announcing the fallback path when no explicit
/// path was given.
pub fn load_server_config(source: &ConfigSource, out: &mut dyn Write) -> Result<McpConfig, ConfigError> {
    if let ConfigSource::Fallback(path) = source {
        let _ = writeln!(
            out,
            "Warning: config environment variable not set. Falling back to: {}",
            path.display()
        );
        tracing::warn!(path = %path.display(), "Using fallback server config path");
    }
    load_mcp_config(source.path())
}

/// Connect to every configured server, build the agent from the collected
/// tools, and run the query loop.
///
/// Every session opened here is closed, last first, before this returns,
/// including when the loop fails.
pub async fn run_session<F, R, W>(
    cfg: &McpConfig,
    build_agent: F,
    input: R,
    out: &mut W,
) -> anyhow::Result<SessionOutcome>
where
    F: FnOnce(Vec<ToolDescriptor>) -> Box<dyn ChatAgent>,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    if cfg.is_empty() {
        writeln!(out, "No MCP servers found in the configuration.")?;
        return Ok(SessionOutcome::NoServers);
    }

    let mut hub = ToolHub::new();
    if let Err(e) = hub.connect_all(cfg, out).await {
        let (_, mut guards) = hub.into_parts();
        guards.close_all().await;
        return Err(e.into());
    }

    run_with_hub(hub, build_agent, input, out).await
}

/// Build the agent from the tools already collected in `hub` and run the
/// query loop.
///
/// The hub's sessions are closed, last first, before this returns, whether
/// the loop ends normally or with an error.
pub async fn run_with_hub<F, R, W>(
    hub: ToolHub,
    build_agent: F,
    input: R,
    out: &mut W,
) -> anyhow::Result<SessionOutcome>
where
    F: FnOnce(Vec<ToolDescriptor>) -> Box<dyn ChatAgent>,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let (tools, mut guards) = hub.into_parts();

    let result = serve(tools, guards.len(), build_agent, input, out).await;

    let closed = guards.close_all().await;
    tracing::info!(servers = ?closed, "MCP sessions closed");

    result
}

async fn serve<F, R, W>(
    tools: Vec<ToolDescriptor>,
    server_count: usize,
    build_agent: F,
    input: R,
    out: &mut W,
) -> anyhow::Result<SessionOutcome>
where
    F: FnOnce(Vec<ToolDescriptor>) -> Box<dyn ChatAgent>,
    R: AsyncBufRead + Unpin,
    W: Write,
{
    if tools.is_empty() {
        writeln!(out, "No tools loaded from any server. Exiting.")?;
        return Ok(SessionOutcome::NoTools);
    }

    tracing::info!(
        tool_count = tools.len(),
        server_count = server_count,
        "Building agent"
    );
    let agent = build_agent(tools);

    writeln!(out, "\nMCP Client Ready! Type '{EXIT_KEYWORD}' to exit.")?;
    let queries = repl::run(agent.as_ref(), input, out).await?;
    Ok(SessionOutcome::Finished { queries })
}

use crate::mcp::config::{McpConfig, McpServerEntry, expand_env_map};
use crate::mcp::tool::{MAX_TOOL_NAME_LEN, ToolDescriptor, namespaced_tool_name};
use anyhow::Context;
use rmcp::{
    service::{RoleClient, ServiceExt},
    transport::{IntoTransport, TokioChildProcess},
};
use std::{collections::HashSet, io::Write};
use tokio::process::Command;

type DynClientService = rmcp::service::RunningService<
    RoleClient,
    Box<dyn rmcp::service::DynService<RoleClient>>,
>;

/// Open MCP sessions, closed together in reverse acquisition order.
#[derive(Default)]
pub struct SessionGuards {
    sessions: Vec<(String, DynClientService)>,
}

impl std::fmt::Debug for SessionGuards {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGuards")
            .field("servers", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

impl SessionGuards {
    fn push(&mut self, server: String, service: DynClientService) {
        self.sessions.push((server, service));
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Server names in acquisition order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sessions.iter().map(|(name, _)| name.as_str())
    }

    /// Close every session, last opened first. Returns the names in the
    /// order they were closed.
    pub async fn close_all(&mut self) -> Vec<String> {
        let mut closed = Vec::with_capacity(self.sessions.len());
        while let Some((server, service)) = self.sessions.pop() {
            match service.cancel().await {
                Ok(reason) => {
                    tracing::debug!(server = %server, reason = ?reason, "MCP session closed");
                }
                Err(e) => {
                    tracing::warn!(server = %server, error = %e, "MCP session task failed during close");
                }
            }
            closed.push(server);
        }
        closed
    }
}

/// Connects to MCP servers and collects their tools.
///
/// Connections are attempted one at a time. A server that fails to spawn,
/// handshake or list its tools is reported and skipped; the others are
/// still attempted.
#[derive(Default)]
pub struct ToolHub {
    guards: SessionGuards,
    tools: Vec<ToolDescriptor>,
    names: HashSet<String>,
}

impl std::fmt::Debug for ToolHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolHub")
            .field("tool_count", &self.tools.len())
            .field("service_count", &self.guards.len())
            .finish()
    }
}

impl ToolHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect every configured server in order, writing progress to `out`.
    pub async fn connect_all(&mut self, cfg: &McpConfig, out: &mut dyn Write) -> std::io::Result<()> {
        for (name, entry) in &cfg.mcp_servers {
            writeln!(out, "\nConnecting to MCP server: {name}...")?;
            if let Err(e) = self.connect_stdio(name, entry, out).await {
                tracing::warn!(server = %name, error = %format!("{e:#}"), "MCP server skipped");
                writeln!(out, "Failed to connect to server {name}: {e:#}")?;
            }
        }
        Ok(())
    }

    /// Spawn one stdio server and load its tools.
    pub async fn connect_stdio(
        &mut self,
        name: &str,
        entry: &McpServerEntry,
        out: &mut dyn Write,
    ) -> anyhow::Result<usize> {
        let mut cmd = Command::new(&entry.command);
        cmd.args(&entry.args);
        for (k, v) in expand_env_map(&entry.env) {
            cmd.env(k, v);
        }

        let transport = TokioChildProcess::new(cmd)
            .with_context(|| format!("failed to spawn '{}'", entry.command))?;
        self.connect_transport(name, transport, out).await
    }

    /// Handshake over an arbitrary transport and load the server's tools.
    ///
    /// On success the session joins the guard stack and the number of tools
    /// loaded is returned. If listing fails, the session is closed and no
    /// tools from it are kept.
    pub async fn connect_transport<T, E, A>(
        &mut self,
        name: &str,
        transport: T,
        out: &mut dyn Write,
    ) -> anyhow::Result<usize>
    where
        T: IntoTransport<RoleClient, E, A>,
        E: std::error::Error + Send + Sync + 'static,
    {
        // store as dyn to keep a homogeneous collection
        let service = ()
            .into_dyn()
            .serve(transport)
            .await
            .with_context(|| format!("MCP handshake failed for '{name}'"))?;

        tracing::info!(server = %name, "MCP session initialized");

        let listed = match service.list_all_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                let _ = service.cancel().await;
                return Err(e).with_context(|| format!("tools/list failed for MCP server '{name}'"));
            }
        };

        let peer = service.peer().clone();
        let mut loaded = Vec::with_capacity(listed.len());
        for tool in &listed {
            let ns_name = self.claim_name(name, &tool.name);
            loaded.push(ToolDescriptor::from_mcp(ns_name, name, tool, peer.clone()));
        }

        for tool in &loaded {
            tracing::info!(server = %name, tool = %tool.name(), "MCP tool discovered");
            writeln!(out, "\nLoaded tool: {}", tool.name())?;
        }
        writeln!(out, "\n{} tools loaded from {name}.", loaded.len())?;

        let count = loaded.len();
        self.tools.extend(loaded);
        self.guards.push(name.to_string(), service);
        Ok(count)
    }

    /// Reserve a unique namespaced name, suffixing `_2`, `_3`, ... on
    /// collision. Suffixed names still fit [`MAX_TOOL_NAME_LEN`].
    fn claim_name(&mut self, server: &str, tool: &str) -> String {
        let base = namespaced_tool_name(server, tool);
        let mut candidate = base.clone();
        let mut n = 2;
        while self.names.contains(&candidate) {
            let suffix = format!("_{n}");
            let keep = base.len().min(MAX_TOOL_NAME_LEN - suffix.len());
            candidate = format!("{}{suffix}", &base[..keep]);
            n += 1;
        }
        self.names.insert(candidate.clone());
        candidate
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn session_count(&self) -> usize {
        self.guards.len()
    }

    /// Split into the tool collection and the session guards that keep it
    /// callable.
    pub fn into_parts(self) -> (Vec<ToolDescriptor>, SessionGuards) {
        (self.tools, self.guards)
    }
}

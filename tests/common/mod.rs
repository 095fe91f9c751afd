//! In-process MCP servers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use mcp_multiserver_chat::llm::{LlmSettings, Provider, RetryConfig};
use rmcp::{
    ErrorData, RoleServer, ServerHandler, ServiceExt,
    model::{
        CallToolRequestParam, CallToolResult, Content, ListToolsResult, PaginatedRequestParam,
        ServerCapabilities, ServerInfo, Tool,
    },
    service::RequestContext,
};
use tokio::io::DuplexStream;

/// Serves a fixed tool list. `echo` returns its `text` argument, `fail`
/// returns an error result, every other tool replies with its own name.
#[derive(Debug, Clone)]
pub struct FakeServer {
    tools: Vec<&'static str>,
}

impl FakeServer {
    pub fn new(tools: &[&'static str]) -> Self {
        Self {
            tools: tools.to_vec(),
        }
    }
}

fn schema() -> Arc<serde_json::Map<String, serde_json::Value>> {
    let value = serde_json::json!({
        "type": "object",
        "properties": { "text": { "type": "string" } }
    });
    match value {
        serde_json::Value::Object(map) => Arc::new(map),
        _ => unreachable!(),
    }
}

impl ServerHandler for FakeServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, ErrorData> {
        let tools = self
            .tools
            .iter()
            .map(|name| Tool::new(*name, format!("fake {name} tool"), schema()))
            .collect();
        Ok(ListToolsResult::with_all_items(tools))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, ErrorData> {
        match request.name.as_ref() {
            "echo" => {
                let text = request
                    .arguments
                    .as_ref()
                    .and_then(|args| args.get("text"))
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            "fail" => Ok(CallToolResult::error(vec![Content::text("boom")])),
            other => Ok(CallToolResult::success(vec![Content::text(other.to_string())])),
        }
    }
}

/// Start `server` on one end of an in-memory pipe and return the other end.
pub fn spawn_server(server: FakeServer) -> DuplexStream {
    let (client_io, server_io) = tokio::io::duplex(64 * 1024);
    tokio::spawn(async move {
        if let Ok(running) = server.serve(server_io).await {
            let _ = running.waiting().await;
        }
    });
    client_io
}

pub fn test_settings(base_url: &str) -> LlmSettings {
    LlmSettings {
        base_url: base_url.to_string(),
        api_key: Some("test-key".to_string()),
        model: "test-model".to_string(),
        temperature: 0.0,
        provider: Provider::detect_from_url(base_url),
        retry: RetryConfig {
            max_retries: 2,
            initial_delay_ms: 1,
            max_delay_ms: 5,
            backoff_factor: 2.0,
        },
        max_tool_iterations: 5,
    }
}

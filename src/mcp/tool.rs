//! Agent-callable tool descriptors backed by an MCP peer.

use anyhow::{Context, anyhow};
use rmcp::{
    model::{CallToolRequestParam, Tool},
    service::{Peer, RoleClient},
};

/// One tool discovered on a connected MCP server.
///
/// The descriptor keeps a clone of the server's peer handle, so it stays
/// callable for as long as the owning session is open. Once the session is
/// closed, [`ToolDescriptor::invoke`] returns an error.
#[derive(Clone)]
pub struct ToolDescriptor {
    /// Agent-visible name, namespaced as `<server>__<tool>`.
    name: String,
    /// Server the tool came from.
    server: String,
    /// Tool name as the server knows it.
    remote_name: String,
    description: String,
    input_schema: serde_json::Value,
    peer: Peer<RoleClient>,
}

impl std::fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.name)
            .field("server", &self.server)
            .field("remote_name", &self.remote_name)
            .finish_non_exhaustive()
    }
}

impl ToolDescriptor {
    pub fn from_mcp(name: String, server: &str, tool: &Tool, peer: Peer<RoleClient>) -> Self {
        // rmcp Tool uses input_schema as an Arc<JsonObject>; convert to serde_json.
        let input_schema = serde_json::to_value(&*tool.input_schema)
            .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}));

        Self {
            name,
            server: server.to_string(),
            remote_name: tool.name.to_string(),
            description: tool.description.as_deref().unwrap_or("").to_string(),
            input_schema,
            peer,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn remote_name(&self) -> &str {
        &self.remote_name
    }

    /// Function-tool entry in `OpenAI` chat-completions format.
    pub fn openai_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.input_schema
            }
        })
    }

    /// Call the tool on its server and return the result as text.
    ///
    /// Text content blocks are joined with newlines. A result without any
    /// text is returned as its raw JSON.
    pub async fn invoke(&self, arguments: serde_json::Value) -> anyhow::Result<String> {
        let arguments = match arguments {
            serde_json::Value::Object(map) => Some(map),
            serde_json::Value::Null => None,
            other => return Err(anyhow!("tool arguments must be a JSON object, got {other}")),
        };

        let res = self
            .peer
            .call_tool(CallToolRequestParam {
                name: self.remote_name.clone().into(),
                arguments,
            })
            .await
            .with_context(|| format!("tools/call failed for {}::{}", self.server, self.remote_name))?;

        let raw = serde_json::to_value(res)?;
        let text = result_text(&raw);

        if raw.get("isError").and_then(serde_json::Value::as_bool) == Some(true) {
            return Err(anyhow!("{}::{} reported an error: {text}", self.server, self.remote_name));
        }
        Ok(text)
    }
}

fn result_text(raw: &serde_json::Value) -> String {
    let texts: Vec<&str> = raw
        .get("content")
        .and_then(serde_json::Value::as_array)
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(serde_json::Value::as_str))
                .collect()
        })
        .unwrap_or_default();

    if texts.is_empty() {
        raw.to_string()
    } else {
        texts.join("\n")
    }
}

/// Longest function name chat-completions APIs accept.
pub const MAX_TOOL_NAME_LEN: usize = 64;

/// Agent-visible name for `tool` on `server`: `<server>__<tool>`, sanitized,
/// starting with a letter or underscore, and at most [`MAX_TOOL_NAME_LEN`]
/// bytes.
///
/// The server prefix is shortened first. Only when the tool name alone does
/// not fit is its tail cut.
pub fn namespaced_tool_name(server: &str, tool: &str) -> String {
    let server = sanitize_tool_name(server);
    let tool = sanitize_tool_name(tool);
    // Gemini rejects names starting with a digit or '-'.
    let lead = if server.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        ""
    } else {
        "_"
    };

    let fixed = lead.len() + 2 + tool.len();
    let mut name = if fixed + server.len() <= MAX_TOOL_NAME_LEN {
        format!("{lead}{server}__{tool}")
    } else if fixed < MAX_TOOL_NAME_LEN {
        // sanitized names are ASCII, so byte slicing is safe
        let keep = MAX_TOOL_NAME_LEN - fixed;
        format!("{lead}{}__{tool}", &server[..keep])
    } else {
        format!("{lead}{server}__{tool}")
    };
    name.truncate(MAX_TOOL_NAME_LEN);
    name
}

/// Sanitize tool names for `OpenAI` API compatibility.
///
/// `OpenAI` requires `^[a-zA-Z0-9_-]+$`.
pub fn sanitize_tool_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sanitizes_dots_and_colons() {
        assert_eq!(sanitize_tool_name("fs.read::file"), "fs_read__file");
        assert_eq!(sanitize_tool_name("ok-name_1"), "ok-name_1");
    }

    #[test]
    fn namespaced_names_fit_the_api_limit() {
        let name = namespaced_tool_name(
            "github-enterprise-server",
            "list_pull_request_review_comments_for_repo",
        );
        assert_eq!(name.len(), MAX_TOOL_NAME_LEN);
        assert_eq!(
            name,
            "github-enterprise-se__list_pull_request_review_comments_for_repo"
        );

        let long_tool = "x".repeat(80);
        let name = namespaced_tool_name("srv", &long_tool);
        assert_eq!(name.len(), MAX_TOOL_NAME_LEN);
        assert!(name.starts_with("srv__xxx"));
    }

    #[test]
    fn namespaced_names_start_with_letter_or_underscore() {
        assert_eq!(namespaced_tool_name("1password", "get_item"), "_1password__get_item");
        assert_eq!(namespaced_tool_name("-dash", "ls"), "_-dash__ls");
        assert_eq!(namespaced_tool_name("_private", "ls"), "_private__ls");
        assert_eq!(namespaced_tool_name("fs", "read"), "fs__read");
    }

    #[test]
    fn joins_text_blocks() {
        let raw = json!({
            "content": [
                {"type": "text", "text": "first"},
                {"type": "image", "data": "...", "mimeType": "image/png"},
                {"type": "text", "text": "second"}
            ]
        });
        assert_eq!(result_text(&raw), "first\nsecond");
    }

    #[test]
    fn falls_back_to_raw_json() {
        let raw = json!({"content": [], "structuredContent": {"n": 1}});
        assert_eq!(result_text(&raw), raw.to_string());
    }
}

//! Agent responses and their JSON rendering.
//!
//! An [`AgentResponse`] is the transcript of one agent turn: the user's
//! message, every assistant message, and every tool result. Rendering goes
//! through [`ResponseNode`], a tagged tree whose leaves are either native
//! JSON, message objects exposing text content ([`HasTextContent`]), or
//! opaque values that have no JSON form.
//!
//! # Example
//!
//! ```rust
//! use mcp_multiserver_chat::response::{AgentMessage, AgentResponse, render};
//!
//! let response = AgentResponse {
//!     messages: vec![AgentMessage::human("what time is it?")],
//! };
//! let text = render(&response);
//! assert!(text.contains("\"type\": \"HumanMessage\""));
//! ```

use std::fmt;

use crate::llm::ToolCall;

/// Capability of objects that carry a text payload.
///
/// Such objects encode as `{"type": <kind>, "content": <content>}`.
pub trait HasTextContent: fmt::Debug + Send + Sync {
    /// Concrete kind name, e.g. `AIMessage`.
    fn kind_name(&self) -> &'static str;

    /// The content payload.
    fn text_content(&self) -> serde_json::Value;
}

/// A node in a renderable response tree.
#[derive(Debug)]
pub enum ResponseNode<'a> {
    /// Natively serializable JSON.
    Value(serde_json::Value),
    /// Ordered sequence.
    List(Vec<ResponseNode<'a>>),
    /// Ordered mapping.
    Object(Vec<(String, ResponseNode<'a>)>),
    /// Object encoded through its text content.
    Content(&'a dyn HasTextContent),
    /// Value with no JSON representation.
    Opaque {
        /// Kind name used in diagnostics.
        kind: String,
        /// Plain-text representation.
        repr: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Object of type {kind} is not JSON serializable")]
    Unsupported { kind: String },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Encode a node tree as a JSON value.
pub fn encode(node: &ResponseNode<'_>) -> Result<serde_json::Value, RenderError> {
    match node {
        ResponseNode::Value(v) => Ok(v.clone()),
        ResponseNode::List(items) => items
            .iter()
            .map(encode)
            .collect::<Result<Vec<_>, _>>()
            .map(serde_json::Value::Array),
        ResponseNode::Object(fields) => {
            let mut map = serde_json::Map::with_capacity(fields.len());
            for (key, value) in fields {
                map.insert(key.clone(), encode(value)?);
            }
            Ok(serde_json::Value::Object(map))
        }
        ResponseNode::Content(obj) => Ok(serde_json::json!({
            "type": obj.kind_name(),
            "content": obj.text_content(),
        })),
        ResponseNode::Opaque { kind, .. } => Err(RenderError::Unsupported { kind: kind.clone() }),
    }
}

/// Encode a node tree as indented JSON text.
pub fn to_pretty_json(node: &ResponseNode<'_>) -> Result<String, RenderError> {
    let value = encode(node)?;
    Ok(serde_json::to_string_pretty(&value)?)
}

/// Something the interactive loop can print.
pub trait Renderable: fmt::Display {
    fn to_node(&self) -> ResponseNode<'_>;
}

/// Render as indented JSON, or as the value's `Display` text when encoding
/// fails.
pub fn render<R: Renderable + ?Sized>(value: &R) -> String {
    match to_pretty_json(&value.to_node()) {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!(error = %e, "Response not JSON-encodable, using plain text");
            value.to_string()
        }
    }
}

impl Renderable for ResponseNode<'_> {
    fn to_node(&self) -> ResponseNode<'_> {
        match self {
            Self::Value(v) => ResponseNode::Value(v.clone()),
            Self::List(items) => ResponseNode::List(items.iter().map(Renderable::to_node).collect()),
            Self::Object(fields) => ResponseNode::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_node()))
                    .collect(),
            ),
            Self::Content(obj) => ResponseNode::Content(*obj),
            Self::Opaque { kind, repr } => ResponseNode::Opaque {
                kind: kind.clone(),
                repr: repr.clone(),
            },
        }
    }
}

impl fmt::Display for ResponseNode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "{v}"),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Object(fields) => {
                f.write_str("{")?;
                for (i, (key, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "'{key}': {value}")?;
                }
                f.write_str("}")
            }
            Self::Content(obj) => write!(f, "{}(content={})", obj.kind_name(), obj.text_content()),
            Self::Opaque { repr, .. } => f.write_str(repr),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Agent transcript
// ─────────────────────────────────────────────────────────────────────────────

/// One message in an agent turn.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentMessage {
    /// The user's query.
    Human { content: String },
    /// Assistant output, possibly requesting tool calls.
    Ai {
        content: String,
        tool_calls: Vec<ToolCall>,
    },
    /// Result of one tool call.
    Tool {
        content: String,
        tool_call_id: String,
        name: String,
        is_error: bool,
    },
}

impl AgentMessage {
    pub fn human(content: impl Into<String>) -> Self {
        Self::Human {
            content: content.into(),
        }
    }

    pub fn ai(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self::Ai {
            content: content.into(),
            tool_calls,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Self::Human { content } | Self::Ai { content, .. } | Self::Tool { content, .. } => content,
        }
    }
}

impl HasTextContent for AgentMessage {
    fn kind_name(&self) -> &'static str {
        match self {
            Self::Human { .. } => "HumanMessage",
            Self::Ai { .. } => "AIMessage",
            Self::Tool { .. } => "ToolMessage",
        }
    }

    fn text_content(&self) -> serde_json::Value {
        serde_json::Value::String(self.content().to_string())
    }
}

/// Transcript of one agent turn, keyed by `messages`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentResponse {
    pub messages: Vec<AgentMessage>,
}

impl AgentResponse {
    /// Text of the last assistant message, if any.
    pub fn final_answer(&self) -> Option<&str> {
        self.messages.iter().rev().find_map(|m| match m {
            AgentMessage::Ai { content, .. } => Some(content.as_str()),
            _ => None,
        })
    }
}

impl Renderable for AgentResponse {
    fn to_node(&self) -> ResponseNode<'_> {
        ResponseNode::Object(vec![(
            "messages".to_string(),
            ResponseNode::List(
                self.messages
                    .iter()
                    .map(|m| ResponseNode::Content(m as &dyn HasTextContent))
                    .collect(),
            ),
        )])
    }
}

impl fmt::Display for AgentResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.to_node(), f)
    }
}

//! Tool-calling agent.
//!
//! One call to [`Agent::invoke`] runs a complete turn:
//! 1. Send the user's text and the tool schemas to the model
//! 2. Collect the streamed reply, assembling any tool calls
//! 3. Execute each tool call through its MCP descriptor
//! 4. Feed the results back and repeat until the model answers directly
//!
//! The transcript of the turn is returned as an [`AgentResponse`].

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{Context, anyhow, bail};
use async_trait::async_trait;
use futures::StreamExt;
use uuid::Uuid;

use crate::mcp::ToolDescriptor;
use crate::normalized::NormalizedEvent;
use crate::response::{AgentMessage, AgentResponse};

use super::{
    ChatCompletionsDriver, EventStream, LlmDriver, LlmRequest, LlmSettings, ToolCall,
    ToolCallFunction,
};

/// Something that answers a single user query.
#[async_trait]
pub trait ChatAgent: Send + Sync {
    async fn invoke(&self, query: &str) -> anyhow::Result<AgentResponse>;
}

/// Accumulated state for a streaming tool call.
#[derive(Debug, Default, Clone)]
struct ToolCallAccumulator {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

/// LLM agent bound to a fixed tool set.
#[derive(Clone)]
pub struct Agent {
    settings: LlmSettings,
    tools: Arc<[ToolDescriptor]>,
    tool_index: Arc<HashMap<String, usize>>,
    tool_schemas: Arc<Vec<serde_json::Value>>,
    driver: Arc<dyn LlmDriver>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("settings", &self.settings)
            .field("tool_count", &self.tools.len())
            .finish_non_exhaustive()
    }
}

impl Agent {
    /// Build an agent that talks to the configured chat-completions API.
    pub fn new(settings: LlmSettings, tools: Vec<ToolDescriptor>) -> Self {
        let driver: Arc<dyn LlmDriver> = Arc::new(ChatCompletionsDriver::new(settings.clone()));
        Self::with_driver(settings, tools, driver)
    }

    /// Build an agent on top of an arbitrary driver.
    pub fn with_driver(
        settings: LlmSettings,
        tools: Vec<ToolDescriptor>,
        driver: Arc<dyn LlmDriver>,
    ) -> Self {
        let tool_index = tools
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name().to_string(), i))
            .collect();
        let tool_schemas = tools.iter().map(ToolDescriptor::openai_schema).collect();

        Self {
            settings,
            tools: tools.into(),
            tool_index: Arc::new(tool_index),
            tool_schemas: Arc::new(tool_schemas),
            driver,
        }
    }

    /// Execute one tool call. Failures become the tool's reply so the
    /// model can react to them.
    async fn execute(&self, request_id: &str, call: &ToolCall) -> (String, bool) {
        let name = &call.function.name;
        let Some(tool) = self.tool_index.get(name).map(|&i| &self.tools[i]) else {
            tracing::warn!(request_id = %request_id, tool_name = %name, "Model requested unknown tool");
            return (format!("Error: unknown tool: {name}"), true);
        };

        let raw_args = call.function.arguments.trim();
        let arguments = if raw_args.is_empty() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            match serde_json::from_str(raw_args) {
                Ok(v) => v,
                Err(e) => return (format!("Error: invalid tool arguments: {e}"), true),
            }
        };

        tracing::info!(
            request_id = %request_id,
            tool_id = %call.id,
            tool_name = %name,
            server = %tool.server(),
            "Executing tool call"
        );

        match tool.invoke(arguments).await {
            Ok(content) => {
                tracing::debug!(
                    request_id = %request_id,
                    tool_id = %call.id,
                    result_length = content.len(),
                    "Tool call succeeded"
                );
                (content, false)
            }
            Err(e) => {
                tracing::error!(
                    request_id = %request_id,
                    tool_id = %call.id,
                    tool_name = %name,
                    error = %format!("{e:#}"),
                    "Tool call failed"
                );
                (format!("Error: {e:#}"), true)
            }
        }
    }
}

#[async_trait]
impl ChatAgent for Agent {
    async fn invoke(&self, query: &str) -> anyhow::Result<AgentResponse> {
        let request_id = Uuid::new_v4().to_string();
        let max_iterations = self.settings.max_tool_iterations;

        tracing::info!(
            request_id = %request_id,
            tool_count = self.tools.len(),
            model = %self.settings.model,
            "Starting agent turn"
        );

        let mut transcript = vec![AgentMessage::human(query)];
        let mut message_json = vec![serde_json::json!({"role": "user", "content": query})];

        for iteration in 1..=max_iterations {
            let req = LlmRequest {
                messages: message_json.clone(),
                tools: (*self.tool_schemas).clone(),
            };

            tracing::debug!(
                request_id = %request_id,
                iteration = iteration,
                message_count = req.messages.len(),
                "Sending request to LLM driver"
            );

            let stream = self
                .driver
                .stream(req)
                .await
                .context("model request failed")?;
            let (assistant_text, tool_calls) = collect_turn(stream).await?;

            transcript.push(AgentMessage::ai(assistant_text.clone(), tool_calls.clone()));

            if tool_calls.is_empty() {
                tracing::info!(
                    request_id = %request_id,
                    iteration = iteration,
                    "Model answered without tool calls"
                );
                return Ok(AgentResponse {
                    messages: transcript,
                });
            }

            message_json.push(serde_json::json!({
                "role": "assistant",
                "content": if assistant_text.is_empty() { serde_json::Value::Null } else { serde_json::Value::String(assistant_text) },
                "tool_calls": tool_calls,
            }));

            for call in &tool_calls {
                let (content, is_error) = self.execute(&request_id, call).await;

                message_json.push(serde_json::json!({
                    "role": "tool",
                    "tool_call_id": call.id,
                    "content": content,
                }));
                transcript.push(AgentMessage::Tool {
                    content,
                    tool_call_id: call.id.clone(),
                    name: call.function.name.clone(),
                    is_error,
                });
            }
        }

        tracing::error!(
            request_id = %request_id,
            max_iterations = max_iterations,
            "Maximum tool loop iterations exceeded"
        );
        bail!("maximum tool loop iterations ({max_iterations}) exceeded")
    }
}

/// Drain one model reply into its text and the tool calls it requested.
async fn collect_turn(mut stream: EventStream) -> anyhow::Result<(String, Vec<ToolCall>)> {
    let mut accumulators: BTreeMap<usize, ToolCallAccumulator> = BTreeMap::new();
    let mut text = String::new();

    while let Some(event) = stream.next().await {
        match event? {
            NormalizedEvent::MessageDelta { text: delta } => text.push_str(&delta),
            NormalizedEvent::ToolCallDelta {
                call_index,
                id,
                name,
                arguments_delta,
            } => {
                let acc = accumulators.entry(call_index).or_default();
                if acc.id.is_none() {
                    acc.id = id;
                }
                if acc.name.is_none() {
                    acc.name = name;
                }
                if let Some(delta) = arguments_delta {
                    acc.arguments.push_str(&delta);
                }
            }
            // The driver's assembled call replaces whatever the deltas built.
            NormalizedEvent::ToolCallComplete {
                call_index,
                id,
                name,
                arguments_json,
            } => {
                let acc = accumulators.entry(call_index).or_default();
                if id.is_some() {
                    acc.id = id;
                }
                acc.name = Some(name);
                acc.arguments = arguments_json;
            }
            NormalizedEvent::Error { message, code } => {
                return Err(match code {
                    Some(code) => anyhow!("model stream error ({code}): {message}"),
                    None => anyhow!("model stream error: {message}"),
                });
            }
            NormalizedEvent::Done => break,
        }
    }

    let tool_calls = accumulators
        .into_values()
        .filter_map(|acc| {
            let name = acc.name?;
            Some(ToolCall {
                id: acc.id.unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple())),
                call_type: "function".to_string(),
                function: ToolCallFunction {
                    name,
                    arguments: acc.arguments,
                },
            })
        })
        .collect();

    Ok((text, tool_calls))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Provider, RetryConfig};
    use std::sync::Mutex;

    /// Replays one scripted event list per request.
    struct ScriptedDriver {
        turns: Mutex<Vec<Vec<NormalizedEvent>>>,
        requests: Mutex<Vec<LlmRequest>>,
    }

    impl ScriptedDriver {
        fn new(mut turns: Vec<Vec<NormalizedEvent>>) -> Arc<Self> {
            turns.reverse();
            Arc::new(Self {
                turns: Mutex::new(turns),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmDriver for ScriptedDriver {
        async fn stream(&self, req: LlmRequest) -> anyhow::Result<EventStream> {
            self.requests.lock().unwrap().push(req);
            let events = self
                .turns
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| anyhow!("no scripted turn left"))?;
            Ok(Box::pin(futures::stream::iter(events.into_iter().map(Ok::<_, anyhow::Error>))))
        }
    }

    fn settings() -> LlmSettings {
        LlmSettings {
            base_url: "http://localhost".to_string(),
            api_key: None,
            model: "test-model".to_string(),
            temperature: 0.0,
            provider: Provider::Generic,
            retry: RetryConfig::default(),
            max_tool_iterations: 3,
        }
    }

    fn text(s: &str) -> NormalizedEvent {
        NormalizedEvent::MessageDelta { text: s.to_string() }
    }

    fn call(index: usize, id: &str, name: &str, args: &str) -> NormalizedEvent {
        NormalizedEvent::ToolCallDelta {
            call_index: index,
            id: Some(id.to_string()),
            name: Some(name.to_string()),
            arguments_delta: Some(args.to_string()),
        }
    }

    #[tokio::test]
    async fn direct_answer_ends_turn() {
        let driver = ScriptedDriver::new(vec![vec![text("Hel"), text("lo"), NormalizedEvent::Done]]);
        let agent = Agent::with_driver(settings(), vec![], driver.clone());

        let response = agent.invoke("hi").await.unwrap();

        assert_eq!(
            response.messages,
            vec![AgentMessage::human("hi"), AgentMessage::ai("Hello", vec![])]
        );
        let requests = driver.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].messages, vec![serde_json::json!({"role": "user", "content": "hi"})]);
    }

    #[tokio::test]
    async fn unknown_tool_result_is_fed_back() {
        let driver = ScriptedDriver::new(vec![
            vec![call(0, "call_1", "ghost__tool", "{}"), NormalizedEvent::Done],
            vec![text("Sorry, that tool is unavailable."), NormalizedEvent::Done],
        ]);
        let agent = Agent::with_driver(settings(), vec![], driver.clone());

        let response = agent.invoke("use the ghost").await.unwrap();

        assert_eq!(response.messages.len(), 4);
        assert!(matches!(
            &response.messages[2],
            AgentMessage::Tool { is_error: true, content, tool_call_id, .. }
                if content == "Error: unknown tool: ghost__tool" && tool_call_id == "call_1"
        ));
        assert_eq!(response.final_answer(), Some("Sorry, that tool is unavailable."));

        let requests = driver.requests.lock().unwrap();
        let second = &requests[1].messages;
        assert_eq!(second.len(), 3);
        assert_eq!(second[1]["tool_calls"][0]["function"]["name"], "ghost__tool");
        assert_eq!(second[2]["role"], "tool");
        assert_eq!(second[2]["tool_call_id"], "call_1");
    }

    #[tokio::test]
    async fn split_argument_deltas_are_joined() {
        let stream: EventStream = Box::pin(futures::stream::iter(
            vec![
                call(0, "call_a", "srv__add", "{\"a\":"),
                NormalizedEvent::ToolCallDelta {
                    call_index: 0,
                    id: None,
                    name: None,
                    arguments_delta: Some("1}".to_string()),
                },
                NormalizedEvent::ToolCallDelta {
                    call_index: 1,
                    id: None,
                    name: Some("srv__now".to_string()),
                    arguments_delta: None,
                },
                NormalizedEvent::Done,
            ]
            .into_iter()
            .map(Ok::<_, anyhow::Error>),
        ));

        let (text, calls) = collect_turn(stream).await.unwrap();
        assert!(text.is_empty());
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].function.arguments, "{\"a\":1}");
        assert_eq!(calls[0].id, "call_a");
        assert!(calls[1].id.starts_with("call_"));
        assert_eq!(calls[1].function.arguments, "");
    }

    #[tokio::test]
    async fn completed_call_overrides_partial_deltas() {
        let stream: EventStream = Box::pin(futures::stream::iter(
            vec![
                call(0, "call_a", "srv__add", "{\"a\":"),
                NormalizedEvent::ToolCallComplete {
                    call_index: 0,
                    id: None,
                    name: "srv__add".to_string(),
                    arguments_json: "{\"a\":2}".to_string(),
                },
                NormalizedEvent::ToolCallComplete {
                    call_index: 1,
                    id: Some("call_b".to_string()),
                    name: "srv__now".to_string(),
                    arguments_json: "{}".to_string(),
                },
                NormalizedEvent::Done,
            ]
            .into_iter()
            .map(Ok::<_, anyhow::Error>),
        ));

        let (_, calls) = collect_turn(stream).await.unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].function.arguments, "{\"a\":2}");
        assert_eq!(calls[1].id, "call_b");
        assert_eq!(calls[1].function.name, "srv__now");
    }

    #[tokio::test]
    async fn stops_after_max_iterations() {
        let looping = || vec![call(0, "c", "x__y", "{}"), NormalizedEvent::Done];
        let driver = ScriptedDriver::new(vec![looping(), looping(), looping()]);
        let agent = Agent::with_driver(settings(), vec![], driver);

        let err = agent.invoke("loop forever").await.unwrap_err();
        assert!(err.to_string().contains("maximum tool loop iterations (3)"));
    }

    #[tokio::test]
    async fn stream_error_propagates() {
        let driver = ScriptedDriver::new(vec![vec![NormalizedEvent::Error {
            message: "quota exhausted".to_string(),
            code: Some("429".to_string()),
        }]]);
        let agent = Agent::with_driver(settings(), vec![], driver);

        let err = agent.invoke("hi").await.unwrap_err();
        assert_eq!(err.to_string(), "model stream error (429): quota exhausted");
    }

    #[tokio::test]
    async fn driver_failure_propagates() {
        let driver = ScriptedDriver::new(vec![]);
        let agent = Agent::with_driver(settings(), vec![], driver);

        let err = agent.invoke("hi").await.unwrap_err();
        assert!(format!("{err:#}").contains("no scripted turn left"));
    }
}

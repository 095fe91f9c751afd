//! OpenAI-compatible Chat Completions driver.
//!
//! This module implements the [`LlmDriver`] trait for `chat/completions`
//! endpoints, streaming responses and tool calls as [`NormalizedEvent`]s.

use std::collections::BTreeMap;

use futures::StreamExt;

use crate::normalized::NormalizedEvent;

use super::retry::{ApiError, with_retry};
use super::{EventStream, LlmDriver, LlmRequest, LlmSettings};

/// Accumulated state for a streaming tool call.
#[derive(Default)]
struct ToolAccum {
    id: Option<String>,
    name: Option<String>,
    args: String,
}

/// Driver for OpenAI-compatible Chat Completions APIs.
#[derive(Clone)]
pub struct ChatCompletionsDriver {
    http: reqwest::Client,
    settings: LlmSettings,
}

impl std::fmt::Debug for ChatCompletionsDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatCompletionsDriver")
            .field("settings", &self.settings)
            .finish()
    }
}

impl ChatCompletionsDriver {
    /// Create a new Chat Completions driver with the given settings.
    #[must_use]
    pub fn new(settings: LlmSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }

    fn request_body(&self, req: LlmRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.settings.model,
            "stream": true,
            "temperature": self.settings.temperature,
            "messages": req.messages,
        });
        if !req.tools.is_empty() {
            body["tools"] = serde_json::Value::Array(req.tools);
        }
        body
    }

    async fn send_once(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, ApiError> {
        let mut rb = self.http.post(url).json(body);
        if let Some(k) = &self.settings.api_key {
            rb = rb.bearer_auth(k);
        }

        let resp = rb.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let retry_after_ms = retry_after_ms(resp.headers());
        let message = resp.text().await.unwrap_or_default();
        Err(ApiError::from_status(status.as_u16(), retry_after_ms, message))
    }
}

#[async_trait::async_trait]
impl LlmDriver for ChatCompletionsDriver {
    async fn stream(&self, req: LlmRequest) -> anyhow::Result<EventStream> {
        let url = self
            .settings
            .provider
            .build_chat_url(&self.settings.base_url);
        let body = self.request_body(req);

        let resp = with_retry(&self.settings.retry, || self.send_once(&url, &body)).await?;
        let byte_stream = resp.bytes_stream();

        let out = async_stream::try_stream! {
            let mut buf = Vec::<u8>::new();
            let mut tool_accum: BTreeMap<usize, ToolAccum> = BTreeMap::new();

            futures::pin_mut!(byte_stream);
            while let Some(chunk) = byte_stream.next().await {
                let chunk = chunk?;
                buf.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

                while let Some(pos) = find_double_newline(&buf) {
                    let frame = buf.drain(..pos + 2).collect::<Vec<_>>();
                    for event in parse_frame(&String::from_utf8_lossy(&frame), &mut tool_accum)? {
                        yield event;
                    }
                }
            }

            // The body may end without a blank line after its last frame.
            if !buf.iter().all(u8::is_ascii_whitespace) {
                tracing::debug!(bytes = buf.len(), "Parsing unterminated final SSE frame");
                for event in parse_frame(&String::from_utf8_lossy(&buf), &mut tool_accum)? {
                    yield event;
                }
            }

            // Calls still open here never saw a finish_reason.
            for event in complete_tool_calls(&mut tool_accum) {
                yield event;
            }
        };

        Ok(Box::pin(out))
    }
}

/// Translate one SSE frame into normalized events, folding tool call
/// deltas into `tool_accum`.
fn parse_frame(
    frame: &str,
    tool_accum: &mut BTreeMap<usize, ToolAccum>,
) -> anyhow::Result<Vec<NormalizedEvent>> {
    let mut events = Vec::new();

    for line in frame.lines() {
        let line = line.trim();
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();

        if data == "[DONE]" {
            events.extend(complete_tool_calls(tool_accum));
            events.push(NormalizedEvent::Done);
            continue;
        }

        let v: serde_json::Value = serde_json::from_str(data)?;
        if let Some(err) = v.get("error") {
            events.push(NormalizedEvent::Error {
                message: err
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map_or_else(|| err.to_string(), ToString::to_string),
                code: err.get("code").map(|c| c.to_string()),
            });
            continue;
        }

        let choice = &v["choices"][0];
        let delta = &choice["delta"];

        // Assistant text delta
        if let Some(s) = delta.get("content").and_then(|x| x.as_str()) {
            if !s.is_empty() {
                events.push(NormalizedEvent::MessageDelta { text: s.to_string() });
            }
        }

        // Tool calls streaming deltas
        if let Some(arr) = delta.get("tool_calls").and_then(|x| x.as_array()) {
            for tc in arr {
                let id = tc
                    .get("id")
                    .and_then(|x| x.as_str())
                    .filter(|s| !s.is_empty())
                    .map(ToString::to_string);
                // Some providers omit `index` and send each call whole.
                let idx = match tc.get("index").and_then(serde_json::Value::as_u64) {
                    Some(i) => i as usize,
                    None if id.is_some() || tool_accum.is_empty() => tool_accum.len(),
                    None => tool_accum.len() - 1,
                };
                let function = tc.get("function");
                let name = function
                    .and_then(|f| f.get("name"))
                    .and_then(|x| x.as_str())
                    .map(ToString::to_string);
                let args_delta = function
                    .and_then(|f| f.get("arguments"))
                    .and_then(|x| x.as_str())
                    .map(ToString::to_string);

                let entry = tool_accum.entry(idx).or_default();
                if entry.id.is_none() {
                    entry.id.clone_from(&id);
                }
                if entry.name.is_none() {
                    entry.name.clone_from(&name);
                }
                if let Some(ad) = &args_delta {
                    entry.args.push_str(ad);
                }

                events.push(NormalizedEvent::ToolCallDelta {
                    call_index: idx,
                    id,
                    name,
                    arguments_delta: args_delta,
                });
            }
        }

        if choice.get("finish_reason").and_then(|x| x.as_str()).is_some() {
            events.extend(complete_tool_calls(tool_accum));
        }
    }

    Ok(events)
}

/// Emit every named call in `tool_accum` as complete and clear it.
fn complete_tool_calls(tool_accum: &mut BTreeMap<usize, ToolAccum>) -> Vec<NormalizedEvent> {
    std::mem::take(tool_accum)
        .into_iter()
        .filter_map(|(idx, a)| {
            Some(NormalizedEvent::ToolCallComplete {
                call_index: idx,
                id: a.id,
                name: a.name?,
                arguments_json: a.args,
            })
        })
        .collect()
}

fn retry_after_ms(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|secs| secs.saturating_mul(1000))
}

/// Find the position of a double newline in the buffer.
fn find_double_newline(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_frame_boundary() {
        assert_eq!(find_double_newline(b"data: {}\n\ndata: x"), Some(8));
        assert_eq!(find_double_newline(b"data: {}\n"), None);
    }

    #[test]
    fn huge_retry_after_saturates() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::RETRY_AFTER,
            reqwest::header::HeaderValue::from_static("18446744073709551615"),
        );
        assert_eq!(retry_after_ms(&headers), Some(u64::MAX));

        headers.insert(
            reqwest::header::RETRY_AFTER,
            reqwest::header::HeaderValue::from_static("3"),
        );
        assert_eq!(retry_after_ms(&headers), Some(3000));
    }

    #[test]
    fn finish_reason_completes_pending_calls() {
        let mut accum = BTreeMap::new();
        let events = parse_frame(
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c1","function":{"name":"s__t","arguments":"{}"}}]},"finish_reason":"tool_calls"}]}"#,
            &mut accum,
        )
        .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(
            events[1],
            NormalizedEvent::ToolCallComplete {
                call_index: 0,
                id: Some("c1".to_string()),
                name: "s__t".to_string(),
                arguments_json: "{}".to_string(),
            }
        );
        assert!(accum.is_empty());
    }
}

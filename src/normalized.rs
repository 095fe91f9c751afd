//! Normalized event types for streaming LLM responses.
//!
//! Drivers translate their wire protocol into these events so the agent's
//! tool loop does not depend on a particular API dialect.

/// Normalized streaming events emitted by an LLM driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedEvent {
    /// Incremental text delta from the assistant's response.
    MessageDelta {
        /// The text fragment to append.
        text: String,
    },

    /// Incremental tool call delta (streaming tool call assembly).
    ToolCallDelta {
        /// Index of this tool call in the current batch.
        call_index: usize,
        /// Tool call ID (may arrive in first delta or later).
        id: Option<String>,
        /// Tool/function name (may arrive in first delta or later).
        name: Option<String>,
        /// Incremental arguments JSON fragment.
        arguments_delta: Option<String>,
    },

    /// Tool call is fully assembled and ready for execution. Supersedes
    /// the deltas seen for the same `call_index`.
    ToolCallComplete {
        /// Index of this tool call in the current batch.
        call_index: usize,
        /// Tool call ID, when the provider sent one.
        id: Option<String>,
        /// Tool/function name.
        name: String,
        /// Complete arguments as JSON string.
        arguments_json: String,
    },

    /// The provider reported an error inside the stream.
    Error {
        /// Error message.
        message: String,
        /// Optional error code for programmatic handling.
        code: Option<String>,
    },

    /// Stream has completed successfully.
    Done,
}

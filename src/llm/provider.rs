//! Provider-specific URL handling.
//!
//! All supported providers speak the `OpenAI` chat-completions dialect but
//! mount it under different paths.

/// Supported LLM providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    /// Google Gemini through its OpenAI-compatible endpoint.
    Gemini,
    /// `OpenAI` (api.openai.com)
    OpenAI,
    /// `OpenRouter` (openrouter.ai)
    OpenRouter,
    /// Groq (groq.com)
    Groq,
    /// Generic OpenAI-compatible provider
    Generic,
}

impl Provider {
    /// Detect provider from base URL.
    ///
    /// # Example
    ///
    /// ```rust
    /// use mcp_multiserver_chat::llm::Provider;
    ///
    /// let provider = Provider::detect_from_url("https://api.openai.com");
    /// assert_eq!(provider, Provider::OpenAI);
    /// ```
    #[must_use]
    pub fn detect_from_url(base_url: &str) -> Self {
        let lower = base_url.to_lowercase();

        if lower.contains("generativelanguage.googleapis.com") {
            Self::Gemini
        } else if lower.contains("openrouter.ai") {
            Self::OpenRouter
        } else if lower.contains("groq.com") {
            Self::Groq
        } else if lower.contains("openai.com") {
            Self::OpenAI
        } else {
            Self::Generic
        }
    }

    /// Build the chat completions URL for this provider.
    ///
    /// Gemini's compatibility layer already ends in `/openai`; any base
    /// ending in a version segment gets `/chat/completions` appended as-is.
    #[must_use]
    pub fn build_chat_url(self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');

        match self {
            Self::Gemini => format!("{base}/chat/completions"),
            _ if has_version_suffix(base) => format!("{base}/chat/completions"),
            _ => format!("{base}/v1/chat/completions"),
        }
    }
}

fn has_version_suffix(base: &str) -> bool {
    base.rsplit('/').next().is_some_and(|seg| {
        seg.len() > 1 && seg.starts_with('v') && seg[1..].chars().all(|c| c.is_ascii_digit())
    })
}

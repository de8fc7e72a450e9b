//! Shared chat-completion client used by both `enrichment::llm` and
//! `messaging`. The source drives each call site through its own
//! `langchain_groq.ChatGroq` instance; here both share one `reqwest`
//! client hitting Groq's OpenAI-compatible `/chat/completions` endpoint
//! directly, following the teacher's `proxy/upstream.rs` retry-middleware
//! pattern rather than depending on a chat-framework crate for a single
//! HTTP call.

use std::time::Duration;

use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::{Deserialize, Serialize};

const GROQ_CHAT_COMPLETIONS_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

pub struct LlmClient {
    client: ClientWithMiddleware,
    api_key: Option<String>,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

impl LlmClient {
    pub fn new(api_key: Option<String>, model: String) -> Self {
        let reqwest_client = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("failed to build HTTP client");

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(2);
        let client = ClientBuilder::new(reqwest_client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Self {
            client,
            api_key,
            model,
        }
    }

    pub fn is_configured(&self) -> bool {
        matches!(&self.api_key, Some(k) if !k.is_empty() && k != "local_test_mode")
    }

    /// Sends a system+user prompt pair and returns the raw assistant
    /// message content. Returns `Ok(None)` when no API key is configured
    /// (mirrors the source's "skip LLM enrichment" branch) rather than
    /// erroring, since this is an expected, non-exceptional state.
    pub async fn complete(&self, system: &str, user: &str) -> anyhow::Result<Option<String>> {
        let Some(api_key) = &self.api_key else {
            return Ok(None);
        };
        if !self.is_configured() {
            return Ok(None);
        }

        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            temperature: 0.0,
            max_tokens: 500,
        };

        let response = self
            .client
            .post(GROQ_CHAT_COMPLETIONS_URL)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("groq request failed: {e}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("groq returned {status}: {body}");
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("failed to parse groq response: {e}"))?;

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content))
    }
}

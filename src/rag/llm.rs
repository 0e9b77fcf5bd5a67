//! Summarization clients for the supported LLM providers.
//!
//! All clients are synchronous (blocking HTTP); the enricher fans them out
//! on a thread pool. A failed call logs and yields `None` so the pipeline
//! never aborts on a flaky endpoint; the node is simply left un-summarized.

use super::RagError;
use reqwest::blocking::Client;
use serde_json::{Value, json};
use std::str::FromStr;
use std::time::Duration;
use tracing::error;

const REMOTE_TIMEOUT: Duration = Duration::from_secs(120);
const LOCAL_TIMEOUT: Duration = Duration::from_secs(300);

/// A summarization backend.
pub trait LlmClient: Send + Sync {
    fn generate_summary(&self, prompt: &str) -> Option<String>;

    /// Local backends get the smaller `num_local_workers` fan-out.
    fn is_local(&self) -> bool {
        false
    }
}

/// Provider selection from the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmApi {
    OpenAi,
    DeepSeek,
    Ollama,
    Fake,
}

impl FromStr for LlmApi {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "deepseek" => Ok(Self::DeepSeek),
            "ollama" => Ok(Self::Ollama),
            "fake" => Ok(Self::Fake),
            other => Err(format!(
                "unknown LLM API '{other}' (expected openai, deepseek, ollama, or fake)"
            )),
        }
    }
}

pub fn create_llm_client(api: LlmApi) -> Result<Box<dyn LlmClient>, RagError> {
    match api {
        LlmApi::OpenAi => Ok(Box::new(ChatCompletionsClient::from_env(
            "OPENAI_API_KEY",
            "https://api.openai.com/v1/chat/completions",
            std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into()),
        )?)),
        LlmApi::DeepSeek => Ok(Box::new(ChatCompletionsClient::from_env(
            "DEEPSEEK_API_KEY",
            "https://api.deepseek.com/chat/completions",
            std::env::var("DEEPSEEK_MODEL").unwrap_or_else(|_| "deepseek-coder".into()),
        )?)),
        LlmApi::Ollama => Ok(Box::new(OllamaClient::from_env()?)),
        LlmApi::Fake => Ok(Box::new(FakeLlmClient)),
    }
}

/// OpenAI-compatible chat completions endpoint (OpenAI, DeepSeek).
struct ChatCompletionsClient {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl ChatCompletionsClient {
    fn from_env(key_var: &str, api_url: &str, model: String) -> Result<Self, RagError> {
        let api_key =
            std::env::var(key_var).map_err(|_| RagError::MissingApiKey(key_var.to_string()))?;
        let client = Client::builder()
            .timeout(REMOTE_TIMEOUT)
            .build()
            .map_err(RagError::Http)?;
        Ok(Self {
            client,
            api_url: api_url.to_string(),
            api_key,
            model,
        })
    }
}

impl LlmClient for ChatCompletionsClient {
    fn generate_summary(&self, prompt: &str) -> Option<String> {
        let payload = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
        });
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json::<Value>());
        match response {
            Ok(body) => body["choices"][0]["message"]["content"]
                .as_str()
                .map(str::to_string),
            Err(e) => {
                error!("Chat completions request failed: {e}");
                None
            }
        }
    }
}

/// Local Ollama instance.
struct OllamaClient {
    client: Client,
    api_url: String,
    model: String,
}

impl OllamaClient {
    fn from_env() -> Result<Self, RagError> {
        let base_url =
            std::env::var("OLLAMA_BASE_URL").unwrap_or_else(|_| "http://localhost:11434".into());
        let client = Client::builder()
            .timeout(LOCAL_TIMEOUT)
            .build()
            .map_err(RagError::Http)?;
        Ok(Self {
            client,
            api_url: format!("{}/api/generate", base_url.trim_end_matches('/')),
            model: std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "codellama".into()),
        })
    }
}

impl LlmClient for OllamaClient {
    fn generate_summary(&self, prompt: &str) -> Option<String> {
        let payload = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });
        let response = self
            .client
            .post(&self.api_url)
            .json(&payload)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json::<Value>());
        match response {
            Ok(body) => body["response"].as_str().map(str::to_string),
            Err(e) => {
                error!("Ollama request failed: {e}");
                None
            }
        }
    }

    fn is_local(&self) -> bool {
        true
    }
}

/// Deterministic offline client for tests and dry runs.
pub struct FakeLlmClient;

impl LlmClient for FakeLlmClient {
    fn generate_summary(&self, prompt: &str) -> Option<String> {
        let head: String = prompt.chars().take(48).collect();
        Some(format!("[fake summary] {head}"))
    }

    fn is_local(&self) -> bool {
        true
    }
}

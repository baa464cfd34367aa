//! LLM collaborator
//!
//! The core only needs "run one conversational turn and return the text".
//! [`HttpLlmTurn`] provides that over the Ollama, Anthropic and OpenAI HTTP
//! APIs, keeping the conversation so follow-up turns see earlier ones.

use crate::config::{LlmConfig, LlmProvider};
use crate::error::{Error, Result};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};
use std::time::Duration;

/// One conversational turn with an LLM.
pub trait LlmTurn {
    fn run_turn(&mut self, prompt: &str) -> Result<String>;
}

impl<F> LlmTurn for F
where
    F: FnMut(&str) -> Result<String>,
{
    fn run_turn(&mut self, prompt: &str) -> Result<String> {
        self(prompt)
    }
}

/// A message in the running conversation
#[derive(Debug, Clone, PartialEq, Eq)]
struct Turn {
    role: &'static str,
    content: String,
}

/// HTTP-backed [`LlmTurn`].
///
/// Requests block on a private current-thread runtime; the caller never
/// needs to be async.
pub struct HttpLlmTurn {
    model: String,
    provider: LlmProvider,
    endpoint: String,
    api_key: Option<String>,
    max_tokens: u32,
    temperature: f32,
    system: Option<String>,
    conversation: Vec<Turn>,
    runtime: tokio::runtime::Runtime,
    http: reqwest::Client,
}

impl HttpLlmTurn {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| config.provider.default_endpoint().to_string());
        let api_key = match config.provider {
            LlmProvider::Ollama => None,
            LlmProvider::Claude => config
                .api_key
                .clone()
                .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok()),
            LlmProvider::OpenAI => config
                .api_key
                .clone()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok()),
        };

        if config.provider != LlmProvider::Ollama && api_key.is_none() {
            return Err(Error::Config(format!(
                "llm.api_key (or the {} env var) is required for {}",
                match config.provider {
                    LlmProvider::OpenAI => "OPENAI_API_KEY",
                    _ => "ANTHROPIC_API_KEY",
                },
                config.provider.as_str()
            )));
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Llm(format!("failed to build tokio runtime: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| Error::Llm(format!("failed to build HTTP client: {e}")))?;

        tracing::info!(
            provider = config.provider.as_str(),
            model = %config.model,
            endpoint = %endpoint,
            "LLM client ready"
        );

        Ok(Self {
            model: config.model.clone(),
            provider: config.provider,
            endpoint,
            api_key,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            system: None,
            conversation: Vec::new(),
            runtime,
            http,
        })
    }

    /// Set the system instruction sent with every request
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Number of user and assistant messages exchanged so far
    pub fn conversation_len(&self) -> usize {
        self.conversation.len()
    }

    fn url(&self) -> String {
        let base = self.endpoint.trim_end_matches('/');
        match self.provider {
            LlmProvider::Ollama => format!("{}/api/chat", base),
            LlmProvider::Claude => format!("{}/v1/messages", base),
            LlmProvider::OpenAI => format!("{}/v1/chat/completions", base),
        }
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let key = self.api_key.as_deref().unwrap_or_default();

        match self.provider {
            LlmProvider::Ollama => {}
            LlmProvider::Claude => {
                headers.insert(
                    "x-api-key",
                    HeaderValue::from_str(key)
                        .map_err(|e| Error::Llm(format!("invalid claude api key header: {e}")))?,
                );
                headers.insert("anthropic-version", HeaderValue::from_static("2023-06-01"));
            }
            LlmProvider::OpenAI => {
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Bearer {}", key))
                        .map_err(|e| Error::Llm(format!("invalid auth header: {e}")))?,
                );
            }
        }
        Ok(headers)
    }

    fn send(&self, body: &Value) -> Result<Value> {
        let provider = self.provider.as_str();
        self.runtime.block_on(async {
            let resp = self
                .http
                .post(self.url())
                .headers(self.headers()?)
                .json(body)
                .send()
                .await
                .map_err(|e| Error::Llm(format!("{provider} request failed: {e}")))?;
            let status = resp.status();
            let text = resp
                .text()
                .await
                .map_err(|e| Error::Llm(format!("{provider} read body failed: {e}")))?;
            if !status.is_success() {
                return Err(Error::Llm(format!(
                    "{} returned {}: {}",
                    provider,
                    status.as_u16(),
                    text
                )));
            }
            Ok(serde_json::from_str(&text)?)
        })
    }
}

impl LlmTurn for HttpLlmTurn {
    fn run_turn(&mut self, prompt: &str) -> Result<String> {
        self.conversation.push(Turn {
            role: "user",
            content: prompt.to_string(),
        });

        let body = request_body(
            self.provider,
            &self.model,
            self.system.as_deref(),
            &self.conversation,
            self.max_tokens,
            self.temperature,
        );

        let started = std::time::Instant::now();
        let result = self.send(&body).and_then(|json| response_text(self.provider, &json));

        match result {
            Ok(text) => {
                tracing::info!(
                    provider = self.provider.as_str(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    response_chars = text.len(),
                    "LLM turn completed"
                );
                self.conversation.push(Turn {
                    role: "assistant",
                    content: text.clone(),
                });
                Ok(text)
            }
            Err(e) => {
                // Keep the conversation alternating for the next attempt
                self.conversation.pop();
                tracing::warn!(provider = self.provider.as_str(), error = %e, "LLM turn failed");
                Err(e)
            }
        }
    }
}

fn request_body(
    provider: LlmProvider,
    model: &str,
    system: Option<&str>,
    conversation: &[Turn],
    max_tokens: u32,
    temperature: f32,
) -> Value {
    let mut messages: Vec<Value> = Vec::new();
    if provider != LlmProvider::Claude {
        if let Some(system) = system {
            messages.push(json!({ "role": "system", "content": system }));
        }
    }
    messages.extend(
        conversation
            .iter()
            .map(|t| json!({ "role": t.role, "content": t.content })),
    );

    match provider {
        LlmProvider::Ollama => json!({
            "model": model,
            "messages": messages,
            "stream": false,
            "options": { "temperature": temperature, "num_predict": max_tokens },
        }),
        LlmProvider::Claude => {
            let mut body = json!({
                "model": model,
                "max_tokens": max_tokens,
                "temperature": temperature,
                "messages": messages,
            });
            if let Some(system) = system {
                body["system"] = json!(system);
            }
            body
        }
        LlmProvider::OpenAI => json!({
            "model": model,
            "max_tokens": max_tokens,
            "temperature": temperature,
            "messages": messages,
        }),
    }
}

fn response_text(provider: LlmProvider, json: &Value) -> Result<String> {
    match provider {
        LlmProvider::Ollama => json
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| Error::Llm("ollama response missing message.content".to_string())),
        LlmProvider::Claude => {
            let blocks = json
                .get("content")
                .and_then(Value::as_array)
                .ok_or_else(|| Error::Llm("claude response missing content".to_string()))?;
            let text: Vec<&str> = blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect();
            if text.is_empty() {
                return Err(Error::Llm("claude response has no text blocks".to_string()));
            }
            Ok(text.join("\n"))
        }
        LlmProvider::OpenAI => json
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|arr| arr.first())
            .and_then(|v| v.get("message"))
            .and_then(|v| v.get("content"))
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| {
                Error::Llm("openai response missing choices[0].message.content".to_string())
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conversation() -> Vec<Turn> {
        vec![
            Turn {
                role: "user",
                content: "research grills".to_string(),
            },
            Turn {
                role: "assistant",
                content: "done".to_string(),
            },
            Turn {
                role: "user",
                content: "add prices".to_string(),
            },
        ]
    }

    #[test]
    fn test_claude_body_uses_top_level_system() {
        let body = request_body(
            LlmProvider::Claude,
            "claude-sonnet-4-5",
            Some("be thorough"),
            &conversation(),
            16000,
            0.7,
        );
        assert_eq!(body["system"], "be thorough");
        assert_eq!(body["max_tokens"], 16000);
        assert_eq!(body["messages"].as_array().unwrap().len(), 3);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn test_openai_and_ollama_bodies_prepend_system_message() {
        for provider in [LlmProvider::OpenAI, LlmProvider::Ollama] {
            let body = request_body(provider, "m", Some("sys"), &conversation(), 100, 0.2);
            let messages = body["messages"].as_array().unwrap();
            assert_eq!(messages.len(), 4);
            assert_eq!(messages[0]["role"], "system");
            assert_eq!(messages[3]["content"], "add prices");
            assert!(body.get("system").is_none());
        }
        let ollama = request_body(LlmProvider::Ollama, "m", None, &conversation(), 100, 0.2);
        assert_eq!(ollama["stream"], false);
        assert_eq!(ollama["options"]["num_predict"], 100);
    }

    #[test]
    fn test_response_text_per_provider() {
        let ollama = json!({"message": {"role": "assistant", "content": "hi"}});
        assert_eq!(response_text(LlmProvider::Ollama, &ollama).unwrap(), "hi");

        let claude = json!({"content": [
            {"type": "text", "text": "part one"},
            {"type": "tool_use", "name": "x"},
            {"type": "text", "text": "part two"}
        ]});
        assert_eq!(
            response_text(LlmProvider::Claude, &claude).unwrap(),
            "part one\npart two"
        );

        let openai = json!({"choices": [{"message": {"content": "ok"}}]});
        assert_eq!(response_text(LlmProvider::OpenAI, &openai).unwrap(), "ok");

        assert!(response_text(LlmProvider::OpenAI, &json!({})).is_err());
        assert!(response_text(LlmProvider::Claude, &json!({"content": []})).is_err());
    }

    #[test]
    fn test_api_key_required_for_hosted_providers() {
        let mut config = LlmConfig::new(LlmProvider::OpenAI, "gpt-4o-mini");
        config.api_key = None;
        if std::env::var("OPENAI_API_KEY").is_err() {
            assert!(matches!(HttpLlmTurn::new(&config), Err(Error::Config(_))));
        }

        config.api_key = Some("sk-test".to_string());
        assert!(HttpLlmTurn::new(&config).is_ok());
        assert!(HttpLlmTurn::new(&LlmConfig::new(LlmProvider::Ollama, "llama3.2")).is_ok());
    }

    #[test]
    fn test_closures_are_turns() {
        let mut calls = 0;
        let mut turn = |prompt: &str| -> Result<String> {
            calls += 1;
            Ok(format!("echo: {}", prompt))
        };
        assert_eq!(turn.run_turn("hi").unwrap(), "echo: hi");
        drop(turn);
        assert_eq!(calls, 1);
    }
}

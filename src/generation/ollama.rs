// src/generation/ollama.rs
use async_trait::async_trait;
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{PromoError, PromoResult};
use crate::generation::{GenerationPrompt, GenerationService};

static JSON_ARRAY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\[.*\]").expect("JSON array pattern is valid"));

/// OLLAMA generate request with a JSON schema for structured output
#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    system: String,
    format: serde_json::Value,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct OllamaResponse {
    response: String,
}

#[derive(Deserialize)]
struct MessagesEnvelope {
    messages: Vec<String>,
}

/// Candidate message generator backed by an Ollama `/api/generate` endpoint.
#[derive(Debug, Clone)]
pub struct OllamaGenerator {
    client: Client,
    base_url: String,
    model: String,
    max_retries: usize,
    retry_delay: Duration,
}

impl OllamaGenerator {
    pub fn new(client: Client, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
        }
    }

    pub fn with_retries(mut self, max_retries: usize, retry_delay: Duration) -> Self {
        self.max_retries = max_retries.max(1);
        self.retry_delay = retry_delay;
        self
    }

    fn build_request(&self, prompt: &GenerationPrompt) -> OllamaRequest {
        OllamaRequest {
            model: self.model.clone(),
            prompt: prompt.user_message(),
            system: prompt.system.clone(),
            format: serde_json::json!({
                "type": "object",
                "properties": {
                    "messages": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Standalone promotional messages"
                    }
                },
                "required": ["messages"]
            }),
            stream: false,
            options: OllamaOptions {
                temperature: 0.9,
                top_p: 0.9,
                num_predict: 1024,
            },
        }
    }

    async fn attempt_generation(&self, request: &OllamaRequest) -> PromoResult<Vec<String>> {
        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(request)
            .send()
            .await
            .map_err(|e| PromoError::Generation(format!("failed to send request to OLLAMA: {}", e)))?;

        if !response.status().is_success() {
            return Err(PromoError::Generation(format!(
                "OLLAMA returned status: {}",
                response.status()
            )));
        }

        let ollama_response: OllamaResponse = response
            .json()
            .await
            .map_err(|e| PromoError::Generation(format!("failed to parse OLLAMA response: {}", e)))?;
        debug!("Raw generation response: {}", ollama_response.response);

        let messages = parse_messages(&ollama_response.response).ok_or_else(|| {
            PromoError::Generation("response did not contain a list of messages".to_string())
        })?;
        if messages.is_empty() {
            return Err(PromoError::Generation("service returned no messages".to_string()));
        }
        Ok(messages)
    }
}

#[async_trait]
impl GenerationService for OllamaGenerator {
    async fn generate(&self, prompt: &GenerationPrompt) -> PromoResult<Vec<String>> {
        let request = self.build_request(prompt);
        let mut last_error = None;

        for attempt in 1..=self.max_retries {
            match self.attempt_generation(&request).await {
                Ok(messages) => {
                    info!(
                        "Generated {} candidate messages (model: {}, attempt {})",
                        messages.len(),
                        self.model,
                        attempt
                    );
                    return Ok(messages);
                }
                Err(e) => {
                    warn!("Generation attempt {} of {} failed: {}", attempt, self.max_retries, e);
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        tokio::time::sleep(self.retry_delay * attempt as u32).await;
                    }
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| PromoError::Generation("no generation attempts made".to_string())))
    }
}

/// Pulls the list of messages out of a model response.
///
/// Accepts a bare JSON array, an object with a `messages` array, or either
/// of those wrapped in prose or code fences. Blank entries are dropped.
pub fn parse_messages(response: &str) -> Option<Vec<String>> {
    let cleaned = response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let parsed = serde_json::from_str::<Vec<String>>(cleaned)
        .ok()
        .or_else(|| {
            serde_json::from_str::<MessagesEnvelope>(cleaned)
                .ok()
                .map(|env| env.messages)
        })
        .or_else(|| {
            JSON_ARRAY_RE
                .find(cleaned)
                .and_then(|m| serde_json::from_str::<Vec<String>>(m.as_str()).ok())
        })?;

    Some(
        parsed
            .into_iter()
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_bare_array() {
        let parsed = parse_messages(r#"["one", "two"]"#).unwrap();
        assert_eq!(parsed, vec!["one", "two"]);
    }

    #[test]
    fn test_parses_envelope_and_fenced_output() {
        let parsed = parse_messages(r#"{"messages": ["a", "  ", "b "]}"#).unwrap();
        assert_eq!(parsed, vec!["a", "b"]);

        let fenced = "```json\n[\"x\", \"y\"]\n```";
        assert_eq!(parse_messages(fenced).unwrap(), vec!["x", "y"]);

        let chatty = "Sure! Here you go: [\"first\", \"second\"] Hope that helps.";
        assert_eq!(parse_messages(chatty).unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_rejects_non_list_output() {
        assert!(parse_messages("I cannot help with that.").is_none());
        assert!(parse_messages(r#"{"text": "nope"}"#).is_none());
    }

    #[test]
    fn test_request_carries_prompt_parts() {
        let generator = OllamaGenerator::new(Client::new(), "http://localhost:11434/", "llama3.1");
        let prompt = GenerationPrompt::for_profile("Purchase", "First-time buyer", 10);
        let request = generator.build_request(&prompt);
        assert_eq!(generator.base_url, "http://localhost:11434");
        assert_eq!(request.model, "llama3.1");
        assert!(!request.stream);
        assert_eq!(request.system, prompt.system);
        assert!(request.prompt.contains("First-time buyer"));
        assert_eq!(request.format["required"][0], "messages");
        assert_eq!(request.format["properties"]["messages"]["type"], "array");
        assert!(request.prompt.contains(r#"{"messages": [...]}"#));
    }
}

//! Anthropic Messages API 适配

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::{build_prompt, parse_answer, AiError, FuzzyProvider};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 1024;

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

pub struct AnthropicProvider {
    client: Client,
    model: String,
    api_key: String,
}

impl AnthropicProvider {
    pub fn new(model: &str, api_key: &str, timeout: Duration) -> Result<Self, AiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }
}

impl FuzzyProvider for AnthropicProvider {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn send(&self, page_text: &str, targets: &[String]) -> Result<Vec<String>, AiError> {
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            messages: vec![Message {
                role: "user",
                content: build_prompt(page_text, targets),
            }],
        };
        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(AiError::Status(status.as_u16()));
        }
        let parsed: MessagesResponse = response.json().map_err(|e| AiError::Parse(e.to_string()))?;
        let answer = parsed
            .content
            .first()
            .map(|block| block.text.as_str())
            .unwrap_or("");
        parse_answer(answer)
    }
}

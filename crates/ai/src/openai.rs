//! OpenAI Chat Completions API 适配

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::{build_prompt, parse_answer, AiError, FuzzyProvider};

const API_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AnswerMessage,
}

#[derive(Debug, Deserialize)]
struct AnswerMessage {
    #[serde(default)]
    content: String,
}

pub struct OpenAiProvider {
    client: Client,
    model: String,
    api_key: String,
}

impl OpenAiProvider {
    pub fn new(model: &str, api_key: &str, timeout: Duration) -> Result<Self, AiError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            model: model.to_string(),
            api_key: api_key.to_string(),
        })
    }
}

impl FuzzyProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn send(&self, page_text: &str, targets: &[String]) -> Result<Vec<String>, AiError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: build_prompt(page_text, targets),
            }],
        };
        let response = self
            .client
            .post(API_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(AiError::Status(status.as_u16()));
        }
        let parsed: ChatResponse = response.json().map_err(|e| AiError::Parse(e.to_string()))?;
        let answer = parsed
            .choices
            .first()
            .map(|choice| choice.message.content.as_str())
            .unwrap_or("");
        parse_answer(answer)
    }
}

//! Blocking client for an OpenAI-compatible vision chat endpoint.
//!
//! The screening and taxa passes only ever need one exchange per image:
//! a prompt plus one inline picture, answered with a short string. The
//! client speaks the `/v1/chat/completions` wire format so any local
//! llama.cpp / vLLM style server works.

use crate::config::ModelConfig;
use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("API error (status {status}): {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },
}

pub type ChatResult<T> = Result<T, ChatError>;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Message {
    pub role: String,
    pub content: MessageContent,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<MessagePart>),
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum MessagePart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

/// One prompt-plus-image exchange. Object-safe so batches can run against
/// a canned stand-in under test.
pub trait VisionModel {
    fn complete(&self, image: &Path, prompt: &str) -> ChatResult<String>;
}

pub struct ChatClient {
    http: reqwest::blocking::Client,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl ChatClient {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            http: reqwest::blocking::Client::new(),
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            model: config.name.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    fn prepare_message(&self, prompt: &str, image: &Path) -> ChatResult<Message> {
        let bytes = fs::read(image)?;
        let mime_type = infer::get(&bytes).map_or("image/jpeg", |kind| kind.mime_type());
        let b64 = general_purpose::STANDARD.encode(&bytes);
        let parts = vec![
            MessagePart::Text {
                text: prompt.to_string(),
            },
            MessagePart::ImageUrl {
                image_url: ImageUrl {
                    url: format!("data:{mime_type};base64,{b64}"),
                },
            },
        ];
        Ok(Message {
            role: "user".to_string(),
            content: MessageContent::Parts(parts),
        })
    }

    fn call(&self, messages: Vec<Message>) -> ChatResult<String> {
        let req_body = ChatRequest {
            model: self.model.clone(),
            messages,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };
        let url = format!("{}/v1/chat/completions", self.base_url);
        let response = self.http.post(url).json(&req_body).send()?;
        if !response.status().is_success() {
            return Err(ChatError::Api {
                status: response.status(),
                body: response.text().unwrap_or_default(),
            });
        }
        let full: ChatResponse = response.json()?;
        Ok(full
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default()
            .trim()
            .to_string())
    }
}

impl VisionModel for ChatClient {
    fn complete(&self, image: &Path, prompt: &str) -> ChatResult<String> {
        let msg = self.prepare_message(prompt, image)?;
        self.call(vec![msg])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn image_message_carries_data_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("petal.png");
        // minimal valid PNG signature so mime sniffing resolves
        let png_magic: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
        std::fs::write(&path, png_magic).unwrap();

        let client = ChatClient::new(&ModelConfig::default());
        let msg = client.prepare_message("Is there a flower?", &path).unwrap();

        assert_eq!(msg.role, "user");
        let MessageContent::Parts(parts) = &msg.content else {
            panic!("expected multipart content");
        };
        assert_eq!(parts.len(), 2);
        match &parts[1] {
            MessagePart::ImageUrl { image_url } => {
                assert!(image_url.url.starts_with("data:image/png;base64,"));
            }
            other => panic!("unexpected part {other:?}"),
        }
    }

    #[test]
    fn request_serializes_to_openai_shape() {
        let req = ChatRequest {
            model: "qwen-vl".to_string(),
            messages: vec![Message {
                role: "user".to_string(),
                content: MessageContent::Parts(vec![MessagePart::Text {
                    text: "hello".to_string(),
                }]),
            }],
            max_tokens: 10,
            temperature: 0.0,
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["model"], "qwen-vl");
        assert_eq!(value["max_tokens"], 10);
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["content"][0]["type"], "text");
        assert_eq!(value["messages"][0]["content"][0]["text"], "hello");
    }

    #[test]
    fn response_content_is_extracted() {
        let body = json!({
            "choices": [
                {"message": {"role": "assistant", "content": "Yes"}}
            ]
        });
        let parsed: ChatResponse = serde_json::from_value(body).unwrap();
        assert_eq!(parsed.choices[0].message.content.as_deref(), Some("Yes"));
    }

    #[test]
    fn empty_choices_parse_cleanly() {
        let parsed: ChatResponse = serde_json::from_value(json!({"choices": []})).unwrap();
        assert!(parsed.choices.is_empty());
    }
}

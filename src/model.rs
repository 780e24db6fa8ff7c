use anyhow::Context;
use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ModelConfig;

/// Image bytes sent inline with a generation request.
#[derive(Debug, Clone)]
pub struct InlineImage {
    pub data: Bytes,
    pub mime_type: String,
}

/// Vision-capable text generation service.
///
/// Returns the raw model text. Callers must expect surrounding commentary
/// around any JSON the prompt asked for.
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    async fn generate(&self, prompt: &str, image: Option<InlineImage>) -> anyhow::Result<String>;
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inline_data")]
        inline_data: InlineData,
    },
}

#[derive(Serialize, Deserialize)]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

/// Google Gemini `generateContent` client.
#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    api_base: String,
}

impl GeminiClient {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl GenerativeClient for GeminiClient {
    async fn generate(&self, prompt: &str, image: Option<InlineImage>) -> anyhow::Result<String> {
        let mut parts = vec![Part::Text {
            text: prompt.to_string(),
        }];
        if let Some(img) = image {
            parts.push(Part::InlineData {
                inline_data: InlineData {
                    mime_type: img.mime_type,
                    data: base64::engine::general_purpose::STANDARD.encode(&img.data),
                },
            });
        }

        let url = format!("{}/models/{}:generateContent", self.api_base, self.model);
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&GenerateRequest {
                contents: vec![Content { parts }],
            })
            .send()
            .await
            .context("model request")?;

        let status = response.status();
        let body: GenerateResponse = response
            .json()
            .await
            .with_context(|| format!("decode model response (status {status})"))?;

        if let Some(err) = body.error {
            anyhow::bail!("model API error ({status}): {}", err.message);
        }

        let text: String = body
            .candidates
            .unwrap_or_default()
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| match p {
                Part::Text { text } => Some(text),
                Part::InlineData { .. } => None,
            })
            .collect();

        debug!(chars = text.len(), "model response received");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serializes_with_inline_image() {
        let req = GenerateRequest {
            contents: vec![Content {
                parts: vec![
                    Part::Text {
                        text: "what is this".into(),
                    },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: "image/jpeg".into(),
                            data: "aGVsbG8=".into(),
                        },
                    },
                ],
            }],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "what is this");
        assert_eq!(
            json["contents"][0]["parts"][1]["inline_data"]["mime_type"],
            "image/jpeg"
        );
    }

    #[test]
    fn response_text_is_concatenated() {
        let body: GenerateResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"Hello "},{"text":"world"}]}}]}"#,
        )
        .unwrap();
        let text: String = body
            .candidates
            .unwrap()
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| match p {
                Part::Text { text } => Some(text),
                Part::InlineData { .. } => None,
            })
            .collect();
        assert_eq!(text, "Hello world");
    }
}

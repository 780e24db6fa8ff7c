use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::model::{GenerativeClient, InlineImage};

pub const UNKNOWN_DISH: &str = "unknown";

/// One food item extracted from a photo. Produced only by [`ImageAnalyzer`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DishCandidate {
    #[serde(default = "unknown_dish_name")]
    pub dish_name: String,
    #[serde(default)]
    pub portion: String,
    #[serde(default)]
    pub confidence: f64,
}

impl DishCandidate {
    pub fn is_unknown(&self) -> bool {
        self.dish_name == UNKNOWN_DISH
    }
}

fn unknown_dish_name() -> String {
    UNKNOWN_DISH.to_string()
}

fn unknown_sentinel() -> DishCandidate {
    DishCandidate {
        dish_name: unknown_dish_name(),
        portion: String::new(),
        confidence: 0.0,
    }
}

const ANALYSIS_PROMPT: &str = r#"You are a food recognition assistant. Identify every food item or branded food product visible in the attached photo.

Rules:
- Use "unknown" as the dish_name when you cannot tell what an item is.
- portion is a short free-text serving description, e.g. "1 plate" or "2 pieces".
- confidence is a number between 0 and 1.
- Always answer with a JSON array of {"dish_name", "portion", "confidence"} objects, even for a single item.

Examples:

Photo of one plate of noodles:
[{"dish_name": "pad thai", "portion": "1 plate", "confidence": 0.9}]

Photo of a table with several dishes:
[{"dish_name": "green curry", "portion": "1 bowl", "confidence": 0.85}, {"dish_name": "fried rice", "portion": "1 plate", "confidence": 0.8}, {"dish_name": "spring rolls", "portion": "3 pieces", "confidence": 0.7}]

Blurry photo where nothing is recognizable:
[{"dish_name": "unknown", "portion": "", "confidence": 0.1}]"#;

/// Typed result of decoding the model's raw text.
///
/// `Unparsed` keeps the raw text for diagnostics; it never escapes this
/// module as anything other than the unknown sentinel.
#[derive(Debug)]
enum Decoded {
    Candidates(Vec<DishCandidate>),
    Unparsed(String),
}

/// Extracts an ordered list of dish candidates from one photo.
pub struct ImageAnalyzer {
    model: Arc<dyn GenerativeClient>,
    http: reqwest::Client,
}

impl ImageAnalyzer {
    pub fn new(model: Arc<dyn GenerativeClient>) -> Self {
        Self {
            model,
            http: reqwest::Client::new(),
        }
    }

    /// Analyze the photo at `image_url`.
    ///
    /// The returned sequence is never empty: unreadable model output degrades
    /// to a single "unknown" candidate. Only the image fetch and the model
    /// call itself can error.
    pub async fn analyze(&self, image_url: &str) -> anyhow::Result<Vec<DishCandidate>> {
        let response = self
            .http
            .get(image_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .context("fetch image")?;

        let mime_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/jpeg")
            .to_string();
        let data = response.bytes().await.context("read image bytes")?;

        let raw = self
            .model
            .generate(ANALYSIS_PROMPT, Some(InlineImage { data, mime_type }))
            .await
            .context("vision model call")?;

        Ok(match decode_response(&raw) {
            Decoded::Candidates(candidates) => {
                debug!(count = candidates.len(), "dish candidates extracted");
                candidates
            }
            Decoded::Unparsed(raw) => {
                warn!(raw = %raw, "unparseable vision response, degrading to unknown");
                vec![unknown_sentinel()]
            }
        })
    }
}

/// First bracket-delimited substring of the raw model text, if any.
fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    (end >= start).then(|| &text[start..=end])
}

fn decode_response(raw: &str) -> Decoded {
    let Some(array) = extract_json_array(raw) else {
        return Decoded::Unparsed(raw.to_string());
    };
    match serde_json::from_str::<Vec<DishCandidate>>(array) {
        Ok(candidates) if !candidates.is_empty() => Decoded::Candidates(
            candidates
                .into_iter()
                .map(|mut c| {
                    c.confidence = c.confidence.clamp(0.0, 1.0);
                    c
                })
                .collect(),
        ),
        _ => Decoded::Unparsed(raw.to_string()),
    }
}

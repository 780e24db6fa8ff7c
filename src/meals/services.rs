use futures::future::join_all;
use time::OffsetDateTime;
use tracing::{error, info, instrument};
use uuid::Uuid;

use super::repo::{self, NewMealRecord};
use crate::analysis::DishCandidate;
use crate::errors::PipelineError;
use crate::nutrition::NutritionFacts;
use crate::state::AppState;
use crate::users;

pub const ACK_MESSAGE: &str = "Got your photo! Give me a moment to look at it...";
pub const APOLOGY_MESSAGE: &str =
    "Sorry, something went wrong while logging your meal. Please try again.";
const NO_DISHES_MESSAGE: &str =
    "I couldn't identify any dishes in that photo. Try a closer or brighter shot?";

/// Presigned photo URLs stay valid long enough for the vision call and for
/// later viewing from a summary.
const IMAGE_URL_TTL_SECS: u64 = 7 * 24 * 3600;

/// Detached follow-up for one inbound photo. Never returns an error: every
/// failure is caught here and converted into a push message, so the webhook
/// can acknowledge and move on.
pub async fn run_image_pipeline(state: AppState, external_id: String, message_id: String) {
    let messages = match process_image_event(&state, &external_id, &message_id).await {
        Ok(messages) => messages,
        Err(e) => {
            error!(error = %e, %external_id, %message_id, "image pipeline failed");
            vec![APOLOGY_MESSAGE.to_string()]
        }
    };
    if let Err(e) = state.channel.push(&external_id, &messages).await {
        error!(error = %e, %external_id, "failed to deliver pipeline result");
    }
}

/// analyze -> estimate per candidate (concurrently) -> persist -> format.
#[instrument(skip(state), fields(external_id = %external_id))]
pub async fn process_image_event(
    state: &AppState,
    external_id: &str,
    message_id: &str,
) -> Result<Vec<String>, PipelineError> {
    let user = users::repo::upsert_by_external_id(&state.db, external_id, None)
        .await
        .map_err(PipelineError::Persistence)?;

    let bytes = state
        .channel
        .message_content(message_id)
        .await
        .map_err(PipelineError::Fetch)?;
    let (mime_type, ext) = sniff_image_type(&bytes);

    let key = format!("meals/{}/{}.{}", user.id, Uuid::new_v4(), ext);
    state
        .storage
        .put_object(&key, bytes, mime_type)
        .await
        .map_err(PipelineError::Fetch)?;
    let image_url = state
        .storage
        .presign_get(&key, IMAGE_URL_TTL_SECS)
        .await
        .map_err(PipelineError::Fetch)?;

    let candidates = state
        .analyzer
        .analyze(&image_url)
        .await
        .map_err(PipelineError::Fetch)?;

    // Fan out one estimation per candidate; join_all keeps candidate order.
    let facts = join_all(candidates.iter().map(|c| {
        state
            .estimator
            .estimate(&c.dish_name, Some(c.portion.as_str()))
    }))
    .await;

    let taken_at = OffsetDateTime::now_utc();
    let records: Vec<NewMealRecord> = candidates
        .iter()
        .zip(facts.iter())
        .map(|(candidate, nutrition)| NewMealRecord {
            user_id: user.id,
            taken_at,
            image_url: image_url.clone(),
            dish_name: candidate.dish_name.clone(),
            portion: candidate.portion.clone(),
            confidence: candidate.confidence,
            nutrition: nutrition.clone(),
            raw_ai: serde_json::json!({
                "candidate": candidate,
                "nutrition": nutrition,
            }),
        })
        .collect();

    repo::insert_all(&state.db, &records)
        .await
        .map_err(PipelineError::Persistence)?;

    info!(user_id = %user.id, count = records.len(), "meal records logged");
    let pairs: Vec<(DishCandidate, NutritionFacts)> = candidates
        .into_iter()
        .zip(facts.into_iter())
        .collect();
    Ok(build_reply(&pairs))
}

/// Format the user-facing result. Unidentified candidates are logged but
/// excluded from the displayed list and kcal total.
pub fn build_reply(items: &[(DishCandidate, NutritionFacts)]) -> Vec<String> {
    let identified: Vec<&(DishCandidate, NutritionFacts)> =
        items.iter().filter(|(c, _)| !c.is_unknown()).collect();

    if identified.is_empty() {
        return vec![NO_DISHES_MESSAGE.to_string()];
    }

    let total_kcal: f64 = identified.iter().map(|(_, n)| n.kcal).sum();
    let mut text = format!(
        "Logged {} item{}:\n",
        identified.len(),
        if identified.len() == 1 { "" } else { "s" },
    );
    for (candidate, nutrition) in &identified {
        text.push_str(&format!(
            "- {}: {} kcal\n",
            candidate.dish_name,
            nutrition.kcal.round() as i64
        ));
    }
    text.push_str(&format!("Total: {} kcal", total_kcal.round() as i64));
    vec![text]
}

/// Detect the uploaded image type from magic bytes. Falls back to JPEG,
/// which is what photo messages overwhelmingly are.
fn sniff_image_type(bytes: &[u8]) -> (&'static str, &'static str) {
    if bytes.starts_with(&[0x89, b'P', b'N', b'G']) {
        ("image/png", "png")
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        ("image/webp", "webp")
    } else {
        ("image/jpeg", "jpg")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nutrition::NutritionSource;

    fn candidate(dish: &str, confidence: f64) -> DishCandidate {
        DishCandidate {
            dish_name: dish.into(),
            portion: "1 plate".into(),
            confidence,
        }
    }

    fn facts(kcal: f64) -> NutritionFacts {
        NutritionFacts {
            kcal,
            protein_g: 10.0,
            carbs_g: 20.0,
            fat_g: 5.0,
            source: NutritionSource::Model,
        }
    }

    #[test]
    fn reply_lists_identified_dishes_with_total() {
        let items = vec![
            (candidate("pad thai", 0.9), facts(600.0)),
            (candidate("tom yum", 0.8), facts(250.0)),
        ];
        let messages = build_reply(&items);
        assert_eq!(messages.len(), 1);
        let text = &messages[0];
        assert!(text.starts_with("Logged 2 items:"), "{text}");
        assert!(text.contains("- pad thai: 600 kcal"));
        assert!(text.contains("- tom yum: 250 kcal"));
        assert!(text.ends_with("Total: 850 kcal"));
    }

    #[test]
    fn unknown_candidates_are_excluded_from_list_and_total() {
        let items = vec![
            (candidate("unknown", 0.0), facts(500.0)),
            (candidate("pad thai", 0.9), facts(600.0)),
        ];
        let messages = build_reply(&items);
        let text = &messages[0];
        assert!(text.starts_with("Logged 1 item:"), "{text}");
        assert!(!text.contains("unknown"));
        assert!(text.ends_with("Total: 600 kcal"));
    }

    #[test]
    fn all_unknown_yields_distinct_message_not_zero_items() {
        let items = vec![
            (candidate("unknown", 0.0), facts(500.0)),
            (candidate("unknown", 0.1), facts(500.0)),
        ];
        let messages = build_reply(&items);
        assert_eq!(messages, vec![NO_DISHES_MESSAGE.to_string()]);
        assert!(!messages[0].contains("Logged 0"));
    }

    #[test]
    fn sniffs_common_image_types() {
        assert_eq!(sniff_image_type(&[0x89, b'P', b'N', b'G', 0, 0]), ("image/png", "png"));
        assert_eq!(
            sniff_image_type(b"RIFF\x00\x00\x00\x00WEBPVP8 "),
            ("image/webp", "webp")
        );
        assert_eq!(sniff_image_type(&[0xFF, 0xD8, 0xFF, 0xE0]), ("image/jpeg", "jpg"));
        assert_eq!(sniff_image_type(b""), ("image/jpeg", "jpg"));
    }
}

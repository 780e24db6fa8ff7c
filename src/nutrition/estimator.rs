use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use super::{table, NutritionFacts, NutritionSource};
use crate::model::GenerativeClient;

const DEFAULT_KCAL: f64 = 500.0;
const DEFAULT_PROTEIN_G: f64 = 20.0;
const DEFAULT_CARBS_G: f64 = 60.0;
const DEFAULT_FAT_G: f64 = 18.0;

const DEFAULT_PORTION: &str = "typical one-serving";

/// Resolves nutrition facts for one dish name.
///
/// Resolution order: curated table (no network), one generative-model
/// request, fixed default vector. Never fails and never returns a partially
/// populated result.
pub struct NutritionEstimator {
    model: Arc<dyn GenerativeClient>,
}

impl NutritionEstimator {
    pub fn new(model: Arc<dyn GenerativeClient>) -> Self {
        Self { model }
    }

    pub async fn estimate(&self, dish_name: &str, portion: Option<&str>) -> NutritionFacts {
        if let Some(key) = table::match_dish(dish_name) {
            if let Some(facts) = table::facts_for(key) {
                return facts;
            }
        }

        let portion = portion
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_PORTION);

        let raw = match self
            .model
            .generate(&estimation_prompt(dish_name, portion), None)
            .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, dish_name, "nutrition model call failed, using defaults");
                return default_facts();
            }
        };

        match decode_model_facts(&raw) {
            Some(facts) => facts,
            None => {
                warn!(dish_name, raw = %raw, "no usable JSON in nutrition response, using defaults");
                default_facts()
            }
        }
    }
}

fn estimation_prompt(dish_name: &str, portion: &str) -> String {
    format!(
        "Estimate the nutrition of the dish \"{dish_name}\" for a portion of \
         \"{portion}\". Respond with a single JSON object with exactly these \
         numeric fields: kcal, protein_g, carbs_g, fat_g. \
         Example: {{\"kcal\": 540, \"protein_g\": 21, \"carbs_g\": 62, \"fat_g\": 19}}"
    )
}

fn default_facts() -> NutritionFacts {
    NutritionFacts {
        kcal: DEFAULT_KCAL,
        protein_g: DEFAULT_PROTEIN_G,
        carbs_g: DEFAULT_CARBS_G,
        fat_g: DEFAULT_FAT_G,
        source: NutritionSource::Default,
    }
}

/// First brace-delimited substring of the raw model text, if any.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end >= start).then(|| &text[start..=end])
}

/// Strict decode of the extracted object. Each field is coerced to a number,
/// falling back to its fixed default; negatives are clamped to zero.
fn decode_model_facts(raw: &str) -> Option<NutritionFacts> {
    let object = extract_json_object(raw)?;
    let value: Value = serde_json::from_str(object).ok()?;

    let field = |name: &str, default: f64| -> f64 {
        let v = value.get(name);
        v.and_then(Value::as_f64)
            .or_else(|| v.and_then(Value::as_str).and_then(|s| s.trim().parse().ok()))
            .unwrap_or(default)
            .max(0.0)
    };

    Some(NutritionFacts {
        kcal: field("kcal", DEFAULT_KCAL),
        protein_g: field("protein_g", DEFAULT_PROTEIN_G),
        carbs_g: field("carbs_g", DEFAULT_CARBS_G),
        fat_g: field("fat_g", DEFAULT_FAT_G),
        source: NutritionSource::Model,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::model::InlineImage;

    struct CannedModel {
        response: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl CannedModel {
        fn answering(response: &'static str) -> Self {
            Self { response: Some(response), calls: AtomicUsize::new(0) }
        }

        fn failing() -> Self {
            Self { response: None, calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl GenerativeClient for CannedModel {
        async fn generate(
            &self,
            _prompt: &str,
            _image: Option<InlineImage>,
        ) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.response {
                Some(text) => Ok(text.to_string()),
                None => anyhow::bail!("model unreachable"),
            }
        }
    }

    fn estimator(model: CannedModel) -> (NutritionEstimator, Arc<CannedModel>) {
        let model = Arc::new(model);
        (NutritionEstimator::new(model.clone()), model)
    }

    #[tokio::test]
    async fn table_hit_makes_no_model_call() {
        let (estimator, model) = estimator(CannedModel::failing());
        let facts = estimator.estimate("Pad Thai", None).await;
        assert_eq!(facts.kcal, 600.0);
        assert_eq!(facts.protein_g, 24.0);
        assert_eq!(facts.carbs_g, 85.0);
        assert_eq!(facts.fat_g, 18.0);
        assert_eq!(facts.source, NutritionSource::Table("pad thai".into()));
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn model_json_survives_surrounding_prose() {
        let (estimator, model) = estimator(CannedModel::answering(
            "Sure! {\"kcal\": 720, \"protein_g\": 35, \"carbs_g\": 40, \"fat_g\": 44} hope that helps",
        ));
        let facts = estimator.estimate("wagyu donburi", None).await;
        assert_eq!(facts.kcal, 720.0);
        assert_eq!(facts.protein_g, 35.0);
        assert_eq!(facts.carbs_g, 40.0);
        assert_eq!(facts.fat_g, 44.0);
        assert_eq!(facts.source, NutritionSource::Model);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_and_bad_fields_fall_back_per_field() {
        let (estimator, _) = estimator(CannedModel::answering(
            "{\"kcal\": \"480\", \"protein_g\": \"lots\", \"fat_g\": -3}",
        ));
        let facts = estimator.estimate("mystery bowl", None).await;
        assert_eq!(facts.kcal, 480.0); // numeric string coerced
        assert_eq!(facts.protein_g, 20.0); // non-numeric -> default
        assert_eq!(facts.carbs_g, 60.0); // absent -> default
        assert_eq!(facts.fat_g, 0.0); // negative clamped
        assert_eq!(facts.source, NutritionSource::Model);
    }

    #[tokio::test]
    async fn unparseable_response_yields_full_default_vector() {
        let (estimator, _) = estimator(CannedModel::answering("I could not estimate that."));
        let facts = estimator.estimate("random gibberish xyz", None).await;
        assert_eq!(
            facts,
            NutritionFacts {
                kcal: 500.0,
                protein_g: 20.0,
                carbs_g: 60.0,
                fat_g: 18.0,
                source: NutritionSource::Default,
            }
        );
    }

    #[tokio::test]
    async fn model_transport_failure_yields_defaults() {
        let (estimator, model) = estimator(CannedModel::failing());
        let facts = estimator.estimate("random gibberish xyz", None).await;
        assert_eq!(facts.source, NutritionSource::Default);
        assert_eq!(facts.kcal, 500.0);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn extract_json_object_spans_first_to_last_brace() {
        assert_eq!(extract_json_object("x {\"a\":1} y"), Some("{\"a\":1}"));
        assert_eq!(extract_json_object("no braces"), None);
        assert_eq!(extract_json_object("} reversed {"), None);
    }
}

mod estimator;
pub mod table;

pub use estimator::NutritionEstimator;

use serde::{Serialize, Serializer};

/// Where a nutrition estimate came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NutritionSource {
    /// Curated table hit, carrying the canonical key.
    Table(String),
    /// Generative-model estimate.
    Model,
    /// Fixed fallback vector.
    Default,
}

impl NutritionSource {
    pub fn as_tag(&self) -> String {
        match self {
            Self::Table(key) => format!("map:{key}"),
            Self::Model => "model".to_string(),
            Self::Default => "default".to_string(),
        }
    }
}

impl Serialize for NutritionSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.as_tag())
    }
}

/// Fully-populated macro/calorie values. No field is ever missing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NutritionFacts {
    pub kcal: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
    pub source: NutritionSource,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_tags() {
        assert_eq!(NutritionSource::Table("pad thai".into()).as_tag(), "map:pad thai");
        assert_eq!(NutritionSource::Model.as_tag(), "model");
        assert_eq!(NutritionSource::Default.as_tag(), "default");
    }

    #[test]
    fn facts_serialize_with_tag() {
        let facts = NutritionFacts {
            kcal: 600.0,
            protein_g: 24.0,
            carbs_g: 85.0,
            fat_g: 18.0,
            source: NutritionSource::Table("pad thai".into()),
        };
        let json = serde_json::to_value(&facts).unwrap();
        assert_eq!(json["source"], "map:pad thai");
        assert_eq!(json["kcal"], 600.0);
    }
}

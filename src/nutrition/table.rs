use std::collections::HashSet;

use super::{NutritionFacts, NutritionSource};

pub struct TableEntry {
    pub key: &'static str,
    pub kcal: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
}

/// Curated per-serving nutrition table, keyed by canonical dish name.
///
/// Slice order is the tie-break order for substring and token matching, so
/// keep more specific names before generic ones.
pub const TABLE: &[TableEntry] = &[
    TableEntry { key: "pad thai", kcal: 600.0, protein_g: 24.0, carbs_g: 85.0, fat_g: 18.0 },
    TableEntry { key: "pad krapow", kcal: 650.0, protein_g: 30.0, carbs_g: 70.0, fat_g: 25.0 },
    TableEntry { key: "tom yum", kcal: 250.0, protein_g: 20.0, carbs_g: 12.0, fat_g: 12.0 },
    TableEntry { key: "green curry", kcal: 450.0, protein_g: 22.0, carbs_g: 20.0, fat_g: 32.0 },
    TableEntry { key: "khao man gai", kcal: 600.0, protein_g: 28.0, carbs_g: 75.0, fat_g: 20.0 },
    TableEntry { key: "fried rice", kcal: 550.0, protein_g: 18.0, carbs_g: 78.0, fat_g: 18.0 },
    TableEntry { key: "papaya salad", kcal: 120.0, protein_g: 4.0, carbs_g: 20.0, fat_g: 3.0 },
    TableEntry { key: "mango sticky rice", kcal: 420.0, protein_g: 6.0, carbs_g: 80.0, fat_g: 10.0 },
    TableEntry { key: "spring rolls", kcal: 300.0, protein_g: 8.0, carbs_g: 35.0, fat_g: 14.0 },
    TableEntry { key: "grilled chicken", kcal: 330.0, protein_g: 40.0, carbs_g: 2.0, fat_g: 18.0 },
    TableEntry { key: "noodle soup", kcal: 380.0, protein_g: 18.0, carbs_g: 55.0, fat_g: 8.0 },
    TableEntry { key: "omelette rice", kcal: 520.0, protein_g: 18.0, carbs_g: 65.0, fat_g: 20.0 },
    TableEntry { key: "pizza", kcal: 285.0, protein_g: 12.0, carbs_g: 36.0, fat_g: 10.0 },
    TableEntry { key: "burger", kcal: 540.0, protein_g: 25.0, carbs_g: 45.0, fat_g: 28.0 },
    TableEntry { key: "salad", kcal: 150.0, protein_g: 5.0, carbs_g: 12.0, fat_g: 9.0 },
];

/// Deterministic lookup of a free-text dish name against the table.
///
/// Precedence: exact normalized equality, then first key contained in the
/// input as a substring, then highest token overlap (ties break to earlier
/// table order, at least one shared token required).
pub fn match_dish(name: &str) -> Option<&'static str> {
    let needle = name.trim().to_lowercase();

    if let Some(entry) = TABLE.iter().find(|e| e.key == needle) {
        return Some(entry.key);
    }
    if let Some(entry) = TABLE.iter().find(|e| needle.contains(e.key)) {
        return Some(entry.key);
    }

    let input_tokens = tokenize(&needle);
    let mut best: Option<(&'static str, usize)> = None;
    for entry in TABLE {
        let score = tokenize(entry.key)
            .iter()
            .filter(|t| input_tokens.contains(*t))
            .count();
        if score >= 1 && best.map_or(true, |(_, top)| score > top) {
            best = Some((entry.key, score));
        }
    }
    best.map(|(key, _)| key)
}

/// Stored facts for a canonical key, tagged with its provenance.
pub fn facts_for(key: &str) -> Option<NutritionFacts> {
    TABLE.iter().find(|e| e.key == key).map(|e| NutritionFacts {
        kcal: e.kcal,
        protein_g: e.protein_g,
        carbs_g: e.carbs_g,
        fat_g: e.fat_g,
        source: NutritionSource::Table(e.key.to_string()),
    })
}

fn tokenize(s: &str) -> HashSet<&str> {
    s.split(|c: char| c.is_whitespace() || c == ',' || c == '-')
        .filter(|t| !t.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_key_matches_itself() {
        for entry in TABLE {
            assert_eq!(match_dish(entry.key), Some(entry.key));
        }
    }

    #[test]
    fn exact_match_ignores_case_and_whitespace() {
        assert_eq!(match_dish("PAD THAI"), Some("pad thai"));
        assert_eq!(match_dish("  Tom Yum  "), Some("tom yum"));
    }

    #[test]
    fn substring_match_picks_first_table_key() {
        assert_eq!(match_dish("shrimp pad thai with lime"), Some("pad thai"));
        // contains both "fried rice" and (token-wise) "salad"; substring wins
        assert_eq!(match_dish("crab fried rice"), Some("fried rice"));
    }

    #[test]
    fn token_overlap_scores_shared_tokens() {
        // no key is a substring of this, but "sticky" and "mango" overlap
        assert_eq!(match_dish("sticky mango dessert"), Some("mango sticky rice"));
        // single shared token is enough
        assert_eq!(match_dish("thai stir fry"), Some("pad thai"));
    }

    #[test]
    fn token_ties_resolve_to_earlier_table_order() {
        // "rice" alone overlaps khao man gai? no; it overlaps fried rice,
        // mango sticky rice and omelette rice with score 1 each. The first of
        // those in table order must win.
        assert_eq!(match_dish("plain rice"), Some("fried rice"));
    }

    #[test]
    fn no_shared_tokens_is_no_match() {
        assert_eq!(match_dish("random gibberish xyz"), None);
        assert_eq!(match_dish(""), None);
        assert_eq!(match_dish("   "), None);
    }

    #[test]
    fn matcher_is_deterministic() {
        for _ in 0..3 {
            assert_eq!(match_dish("chicken basil stir-fry"), match_dish("chicken basil stir-fry"));
        }
    }

    #[test]
    fn facts_for_known_key() {
        let facts = facts_for("pad thai").unwrap();
        assert_eq!(facts.kcal, 600.0);
        assert_eq!(facts.protein_g, 24.0);
        assert_eq!(facts.carbs_g, 85.0);
        assert_eq!(facts.fat_g, 18.0);
        assert_eq!(facts.source, NutritionSource::Table("pad thai".into()));
        assert!(facts_for("not a dish").is_none());
    }
}

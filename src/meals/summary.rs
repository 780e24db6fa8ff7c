use sqlx::PgPool;
use time::{Duration, OffsetDateTime, Time, UtcOffset};
use tracing::instrument;

use super::repo::{self, MealRecord};
use crate::users;

/// Summary window. Weeks start on Monday.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Span {
    Day,
    Week,
}

impl Span {
    /// Recognize a summary command from inbound text.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "today" | "summary" | "day" => Some(Self::Day),
            "week" | "this week" => Some(Self::Week),
            _ => None,
        }
    }

    fn phrase(self) -> &'static str {
        match self {
            Self::Day => "today",
            Self::Week => "this week",
        }
    }
}

/// Sent when the user has never logged anything. Distinct from the
/// empty-window message below.
pub const NO_MEALS_YET: &str =
    "You haven't logged any meals yet. Send me a food photo to get started!";

fn no_meals_in(span: Span) -> String {
    format!("No meals logged {} yet.", span.phrase())
}

/// Start of the current calendar day/week in `tz`, as an absolute instant.
pub fn window_start(span: Span, now: OffsetDateTime, tz: UtcOffset) -> OffsetDateTime {
    let local = now.to_offset(tz);
    let day_start = local.replace_time(Time::MIDNIGHT);
    let start = match span {
        Span::Day => day_start,
        Span::Week => {
            day_start - Duration::days(i64::from(local.weekday().number_days_from_monday()))
        }
    };
    start.to_offset(UtcOffset::UTC)
}

/// Render a non-empty window: header, exact-sum totals rounded at display
/// time, then one line per record with its non-zero macros.
pub fn render_summary(span: Span, records: &[MealRecord]) -> String {
    let kcal: f64 = records.iter().map(|r| r.kcal).sum();
    let protein: f64 = records.iter().map(|r| r.protein_g).sum();
    let carbs: f64 = records.iter().map(|r| r.carbs_g).sum();
    let fat: f64 = records.iter().map(|r| r.fat_g).sum();

    let mut out = format!(
        "Your meals {} ({} item{}):\n",
        span.phrase(),
        records.len(),
        if records.len() == 1 { "" } else { "s" },
    );
    out.push_str(&format!(
        "Total: {} kcal | P {}g | C {}g | F {}g\n",
        round(kcal),
        round(protein),
        round(carbs),
        round(fat),
    ));
    for record in records {
        out.push_str(&format!("- {}: {} kcal", record.dish_name, round(record.kcal)));
        let macros: Vec<String> = [
            ("P", record.protein_g),
            ("C", record.carbs_g),
            ("F", record.fat_g),
        ]
        .iter()
        .filter(|(_, v)| *v > 0.0)
        .map(|(label, v)| format!("{label} {}g", round(*v)))
        .collect();
        if !macros.is_empty() {
            out.push_str(&format!(" ({})", macros.join(", ")));
        }
        out.push('\n');
    }
    out.trim_end().to_string()
}

fn round(v: f64) -> i64 {
    v.round() as i64
}

/// Summarize a user's intake over the current day or week.
#[instrument(skip(db))]
pub async fn summarize(
    db: &PgPool,
    tz: UtcOffset,
    external_id: &str,
    span: Span,
) -> anyhow::Result<String> {
    let Some(user) = users::repo::find_by_external_id(db, external_id).await? else {
        return Ok(NO_MEALS_YET.to_string());
    };

    let now = OffsetDateTime::now_utc();
    let start = window_start(span, now, tz);
    let records = repo::list_between(db, user.id, start, now).await?;

    if records.is_empty() {
        return Ok(no_meals_in(span));
    }
    Ok(render_summary(span, &records))
}

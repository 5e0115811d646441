//! Prompt assembly.
//!
//! One prompt per invocation: a role-framing sentence, the context sections
//! selected for the question's intent, fixed answer directives, then the
//! verbatim question. Rendering shapes match what the deployed model was
//! tuned on; keep them stable.

use serde_json::Value;

use crate::backend::ContextMap;
use crate::intent::Intent;

/// Context source names used as [`ContextMap`] keys.
pub mod sources {
    pub const CURRENT: &str = "current";
    pub const LAST_WEEK: &str = "last_week";
    pub const SUSPICIOUS: &str = "suspicious";
    pub const ENTRY_EXIT: &str = "entry_exit";
    pub const EXTREMES: &str = "max_min";
    pub const PREDICTIONS: &str = "predictions";
    pub const HOURLY: &str = "hourly";
    pub const WEATHER: &str = "weather";
    pub const ZONES: &str = "zones";
}

/// Row cap applied to list-valued sections of the question prompt.
const MAX_LIST_ROWS: usize = 5;

/// Character cap applied to reference document text.
const DOC_TEXT_CAP: usize = 500;

const ROLE_FRAMING: &str =
    "You are an assistant analysing how the building is used. Answer the user's question accurately, based on the data below.";

const ANSWER_GUIDELINES: &str = r#"Answer guidelines:
1. Always present times as "YYYY/MM/DD HH:MM"; never use ISO 8601 (e.g. yyyy-mm-ddThh:mm:ss+00:00).
2. Always give people counts as a number of people.
3. When asked about entry and exit times, include both the entry and the exit time.
4. If the data does not cover the question, say so clearly."#;

/// Read a field off a row, rendering missing or null values as `N/A`.
fn field(row: &Value, key: &str) -> String {
    match row.get(key) {
        None | Some(Value::Null) => "N/A".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Read a timestamp field, reformatted to `YYYY/MM/DD HH:MM`.
///
/// Backend rows carry ISO 8601 timestamps; the answer directives forbid that
/// shape, so it is normalised before the model ever sees it. Anything that
/// does not parse is passed through unchanged.
fn time_field(row: &Value, key: &str) -> String {
    let raw = field(row, key);
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(&raw) {
        return dt.format("%Y/%m/%d %H:%M").to_string();
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S") {
        return dt.format("%Y/%m/%d %H:%M").to_string();
    }
    raw
}

fn capped(rows: &[Value]) -> &[Value] {
    &rows[..rows.len().min(MAX_LIST_ROWS)]
}

fn occupancy_line(row: &Value, time_key: &str) -> String {
    format!(
        "• Time: {} - Number of People: {}",
        time_field(row, time_key),
        field(row, "num")
    )
}

fn render_current(rows: &[Value]) -> String {
    rows.iter().map(|r| occupancy_line(r, "time")).collect::<Vec<_>>().join("\n")
}

fn render_suspicious(rows: &[Value]) -> String {
    rows.iter().map(|r| occupancy_line(r, "event_time")).collect::<Vec<_>>().join("\n")
}

fn render_entry_exit(rows: &[Value]) -> String {
    rows.iter()
        .map(|r| format!("• Entry: {}, Exit: {}", time_field(r, "start_time"), time_field(r, "last_time")))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_extremes(rows: &[Value]) -> String {
    rows.iter()
        .map(|r| {
            format!(
                "• Busiest: {} at {}\n• Quietest: {} at {}",
                field(r, "max_num"),
                time_field(r, "max_time"),
                field(r, "min_num"),
                time_field(r, "min_time")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_predictions(rows: &[Value]) -> String {
    rows.iter()
        .map(|r| {
            format!(
                "• Time: {} - Number of People: {} - Reason: {}",
                field(r, "time"),
                field(r, "num"),
                field(r, "reasons")
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

const WEATHER_KEYS: [&str; 9] = [
    "weather_time",
    "temperature_2m_celsius",
    "relative_humidity_2m_percent",
    "apparent_temperature_celsius",
    "precipitation_mm",
    "snowfall_cm",
    "weather_code_wmo_code",
    "cloud_cover_percent",
    "wind_speed_10m_kmh",
];

fn render_weather(rows: &[Value]) -> String {
    rows.iter()
        .map(|r| {
            let attrs = WEATHER_KEYS
                .iter()
                .map(|key| format!("{key}: {}", field(r, key)))
                .collect::<Vec<_>>()
                .join(", ");
            format!("• {attrs}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

const ZONE_KEYS: [&str; 6] = ["zone_id", "zone_no", "zone_name", "geometry", "count_type", "capacity"];

fn render_zones(rows: &[Value]) -> String {
    rows.iter()
        .map(|r| {
            let attrs = ZONE_KEYS
                .iter()
                .map(|key| format!("{key}: {}", field(r, key)))
                .collect::<Vec<_>>()
                .join(", ");
            format!("• {attrs}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn section(title: &str, body: String) -> String {
    format!("\n{title}:\n{body}\n")
}

/// Render one named source into its prompt section, or nothing when the
/// source was not fetched or came back empty.
fn render_source(context: &ContextMap, name: &str) -> Option<String> {
    let rows = context.get(name)?.as_deref()?;
    if rows.is_empty() {
        return None;
    }
    let rows = capped(rows);
    let rendered = match name {
        sources::CURRENT | sources::HOURLY => section("Occupancy", render_current(rows)),
        sources::LAST_WEEK => section("Last week", render_current(rows)),
        sources::SUSPICIOUS => section("Suspicious activity", render_suspicious(rows)),
        sources::ENTRY_EXIT => section("Entry/exit times", render_entry_exit(rows)),
        sources::EXTREMES => section("Extremes", render_extremes(rows)),
        sources::PREDICTIONS => section("Forecasts", render_predictions(rows)),
        sources::WEATHER => section("Weather forecast", render_weather(rows)),
        sources::ZONES => section("Zones", render_zones(rows)),
        other => section(other, render_current(rows)),
    };
    Some(rendered)
}

/// Which sources the relevance selector admits for an intent.
fn selected_sources(intent: Intent) -> &'static [&'static str] {
    match intent {
        Intent::Current => &[sources::CURRENT],
        Intent::Suspicious => &[sources::SUSPICIOUS],
        Intent::EntryExit => &[sources::ENTRY_EXIT],
        Intent::Extremes => &[sources::EXTREMES],
        // Prediction questions also get last week's counts as history.
        Intent::Prediction => &[sources::PREDICTIONS, sources::LAST_WEEK],
        Intent::All => &[
            sources::CURRENT,
            sources::LAST_WEEK,
            sources::SUSPICIOUS,
            sources::ENTRY_EXIT,
            sources::EXTREMES,
            sources::PREDICTIONS,
        ],
    }
}

/// Assemble the question-answering prompt for the ask handler.
pub fn question_prompt(question: &str, intent: Intent, context: &ContextMap) -> String {
    let body: String = selected_sources(intent)
        .iter()
        .filter_map(|name| render_source(context, name))
        .collect();

    format!(
        "{ROLE_FRAMING}\n\nAvailable data:\n{body}\n{ANSWER_GUIDELINES}\n\nAnswer the following question: {question}\n\nPlease provide a clear, concise answer based on the available data:"
    )
}

/// Assemble the forecast prompt (Stage A). Keeps the full fetched history
/// and demands a JSON-object answer.
pub fn forecast_prompt(question: &str, context: &ContextMap, document: Option<&str>) -> String {
    let mut body = String::new();
    for name in [sources::HOURLY, sources::WEATHER, sources::ZONES] {
        if let Some(rows) = context.get(name).and_then(|r| r.as_deref()) {
            if rows.is_empty() {
                continue;
            }
            let rendered = match name {
                sources::HOURLY => section("Occupancy", render_current(rows)),
                sources::WEATHER => section("Weather forecast", render_weather(rows)),
                _ => section("Zones", render_zones(rows)),
            };
            body.push_str(&rendered);
        }
    }
    if let Some(text) = document {
        let text = truncate_chars(text, DOC_TEXT_CAP);
        body.push_str(&section("Schedule document", text));
    }

    format!(
        "{ROLE_FRAMING}\n\nAvailable data:\n{body}\n\
The occupancy rows are the third-floor canteen counts, the weather rows are the campus forecast, the zone rows describe the third-floor areas, and the schedule document lists campus events. Forecast the number of people 30 minutes ahead so catering can be prepared.\n\n\
Answer the following question: {question}\n\n\
Answer with a single JSON object only:\n\
{{\"time\": \"yyyy-mm-dd:hh:mm+00:00\", \"num\": <predicted number of people>, \"reasons\": \"<short explanation in English>\"}}"
    )
}

/// Truncate to at most `cap` characters on a char boundary.
fn truncate_chars(text: &str, cap: usize) -> String {
    text.chars().take(cap).collect()
}

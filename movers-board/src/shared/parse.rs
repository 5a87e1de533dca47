/// Observation parsing at the feed boundary
///
/// Backends report movers in loosely typed JSON: numbers as strings with
/// currency symbols, percent signs and thousands separators, ids under
/// different keys, rows wrapped in different envelopes. Everything is
/// coerced here so the engine only ever sees clean `RawObservation`s.
///
/// Fallback rules:
/// - missing or empty id: row dropped
/// - non-numeric score or price: `0.0`
/// - missing or unparseable timestamp: time the snapshot was received

use crate::shared::types::RawObservation;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use smol_str::SmolStr;
use tracing::debug;

const ID_KEYS: [&str; 3] = ["id", "symbol", "ticker"];
const SCORE_KEYS: [&str; 4] = ["rawScore", "raw_score", "changePercent", "change_percent"];
const PRICE_KEYS: [&str; 2] = ["price", "last"];
const TIME_KEYS: [&str; 2] = ["observedAt", "observed_at"];
const ENVELOPE_KEYS: [&str; 4] = ["data", "movers", "results", "items"];

/// Coerce a loosely typed JSON value into a finite number, `0.0` otherwise
pub fn parse_number(value: &Value) -> f64 {
    let parsed = match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => numeric_chars(s).parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };

    if parsed.is_finite() {
        parsed
    } else {
        0.0
    }
}

/// Strip everything but digits, signs and decimal points
///
/// An `e`/`E` survives only as an exponent marker: after a digit and before a
/// digit or a signed digit.
fn numeric_chars(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let is_digit = |i: usize| chars.get(i).is_some_and(char::is_ascii_digit);

    chars
        .iter()
        .enumerate()
        .filter(|(i, c)| match c {
            '0'..='9' | '.' | '-' | '+' => true,
            'e' | 'E' => {
                *i > 0
                    && is_digit(*i - 1)
                    && (is_digit(*i + 1)
                        || (matches!(chars.get(*i + 1), Some('-' | '+')) && is_digit(*i + 2)))
            }
            _ => false,
        })
        .map(|(_, c)| *c)
        .collect()
}

fn parse_id(value: &Value) -> Option<SmolStr> {
    let id = match value {
        Value::String(s) => SmolStr::new(s.trim()),
        Value::Number(n) => SmolStr::new(n.to_string()),
        _ => return None,
    };
    (!id.is_empty()).then_some(id)
}

fn parse_time(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s.trim())
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Number(n) => n.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis),
        _ => None,
    }
}

/// Remove the first present key from a row
fn take_first(row: &mut Map<String, Value>, keys: &[&str]) -> Option<Value> {
    keys.iter().find_map(|key| row.remove(*key))
}

/// Parse one row object into an observation, `None` when it carries no usable id
pub fn parse_observation(row: &Value, received_at: DateTime<Utc>) -> Option<RawObservation> {
    let mut fields = row.as_object()?.clone();

    let id = take_first(&mut fields, &ID_KEYS).as_ref().and_then(parse_id)?;
    let raw_score = take_first(&mut fields, &SCORE_KEYS)
        .as_ref()
        .map(parse_number)
        .unwrap_or(0.0);
    let price = take_first(&mut fields, &PRICE_KEYS)
        .as_ref()
        .map(parse_number)
        .unwrap_or(0.0);
    let observed_at = take_first(&mut fields, &TIME_KEYS)
        .as_ref()
        .and_then(parse_time)
        .unwrap_or(received_at);

    Some(RawObservation {
        id,
        raw_score,
        price,
        observed_at,
        extra: fields,
    })
}

/// Flatten the response shapes backends use into a list of row objects
pub fn extract_rows(snapshot: &Value) -> Vec<Value> {
    match snapshot {
        Value::Array(rows) => rows.clone(),
        Value::Object(map) => {
            if let Some(rows) = ENVELOPE_KEYS
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_array))
            {
                return rows.clone();
            }

            // Keyed by id: {"BTC": {...}, "ETH": {...}}
            map.iter()
                .filter_map(|(key, value)| {
                    let mut row = value.as_object()?.clone();
                    if !ID_KEYS.iter().any(|k| row.contains_key(*k)) {
                        row.insert("id".to_string(), Value::String(key.clone()));
                    }
                    Some(Value::Object(row))
                })
                .collect()
        }
        _ => Vec::new(),
    }
}

/// Parse a whole snapshot, silently skipping malformed rows
pub fn parse_batch(snapshot: &Value, received_at: DateTime<Utc>) -> Vec<RawObservation> {
    let rows = extract_rows(snapshot);
    let total = rows.len();
    let batch: Vec<RawObservation> = rows
        .iter()
        .filter_map(|row| parse_observation(row, received_at))
        .collect();

    if batch.len() < total {
        debug!(
            dropped = total - batch.len(),
            total, "Skipped malformed rows in snapshot"
        );
    }
    batch
}

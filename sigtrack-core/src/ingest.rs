//! Normalization of loosely typed producer input.
//!
//! Scanners hand over whatever they have: scores as strings, prices with
//! currency formatting, keys in any casing. Nothing here ever rejects a value;
//! unusable fields collapse to a safe default.

use chrono::NaiveDate;
use serde_json::Value;

/// Trim and uppercase a ticker symbol.
pub fn normalize_ticker(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

/// Trim a scan type label. Casing is preserved.
pub fn normalize_scan_type(raw: &str) -> String {
    raw.trim().to_string()
}

/// Coerce a score to an integer, defaulting to 0.
///
/// Integers pass through, floats truncate toward zero, numeric strings are
/// parsed the same way. Anything else (null, bools, arrays, junk text) is 0.
pub fn coerce_score(value: &Value) -> i64 {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .map(|f| f.trunc() as i64)
                })
                .unwrap_or(0)
        }
        _ => 0,
    }
}

/// Parse a price from a number or a currency-formatted string (`$1,234.50`).
///
/// Returns `None` for anything unparsable or non-finite.
pub fn parse_price(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => {
            let cleaned: String = s.chars().filter(|c| *c != '$' && *c != ',').collect();
            cleaned.trim().parse::<f64>().ok().filter(|f| f.is_finite())
        }
        _ => None,
    }
}

/// Fields pulled out of one ingestion row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowFields {
    pub ticker: Option<String>,
    pub score: Value,
    pub price: Value,
    pub signal_date: Option<NaiveDate>,
}

/// Canonical field a row key maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Ticker,
    Score,
    /// Price aliases; lower rank wins when a row carries several.
    Price(u8),
    Date,
}

fn canonical_field(key: &str) -> Option<Field> {
    match key.trim().to_ascii_lowercase().as_str() {
        "ticker" | "symbol" => Some(Field::Ticker),
        "score" => Some(Field::Score),
        "price_at_signal" => Some(Field::Price(0)),
        "price" => Some(Field::Price(1)),
        "close" => Some(Field::Price(2)),
        "last" => Some(Field::Price(3)),
        "signal_date" | "date" => Some(Field::Date),
        _ => None,
    }
}

/// Map one producer row onto canonical fields.
///
/// This is the single place where key casing (`ticker`/`Ticker`/`TICKER`,
/// `score`/`Score`/`SCORE`, ...) is resolved. Returns `None` when the row is
/// not a key/value object at all.
pub fn map_row_fields(row: &Value) -> Option<RowFields> {
    let object = row.as_object()?;

    let mut fields = RowFields {
        ticker: None,
        score: Value::Null,
        price: Value::Null,
        signal_date: None,
    };
    let mut price_rank = u8::MAX;

    for (key, value) in object {
        match canonical_field(key) {
            Some(Field::Ticker) => {
                if let Some(s) = value.as_str() {
                    let ticker = normalize_ticker(s);
                    if !ticker.is_empty() {
                        fields.ticker = Some(ticker);
                    }
                }
            }
            Some(Field::Score) => fields.score = value.clone(),
            Some(Field::Price(rank)) => {
                if rank < price_rank && !value.is_null() {
                    fields.price = value.clone();
                    price_rank = rank;
                }
            }
            Some(Field::Date) => {
                fields.signal_date = value
                    .as_str()
                    .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok());
            }
            None => {}
        }
    }

    Some(fields)
}

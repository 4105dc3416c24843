// src/coerce.rs

//! Serde helpers for columns whose JSON shape is not guaranteed.
//!
//! The hosted store serializes `numeric` columns either as JSON numbers or as
//! strings depending on precision, and the provider returns user ids as
//! numbers. Everything is normalized here so no caller ever sees a string
//! where a number is expected.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serializer};
use serde_json::Value;
use std::str::FromStr;

/// Hours and money are kept to two decimal places.
pub const SCALE: u32 = 2;

fn decimal_from_str(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(Decimal::ZERO);
    }
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .ok()
}

fn decimal_from_value(value: &Value) -> Result<Decimal, String> {
    match value {
        Value::Null => Ok(Decimal::ZERO),
        Value::Number(n) => {
            decimal_from_str(&n.to_string()).ok_or_else(|| format!("invalid decimal number {}", n))
        }
        Value::String(s) => {
            decimal_from_str(s).ok_or_else(|| format!("invalid decimal string '{}'", s))
        }
        other => Err(format!("expected a decimal, found {}", other)),
    }
}

/// Number, numeric string or null (as zero) into a `Decimal`.
pub fn decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    decimal_from_value(&value).map_err(D::Error::custom)
}

pub fn optional_decimal<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        value => decimal_from_value(&value).map(Some).map_err(D::Error::custom),
    }
}

/// External ids arrive as numbers from the provider and as text from the
/// store. Blank strings count as "no id".
pub fn optional_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::String(s) => {
            let trimmed = s.trim();
            Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
        }
        other => Err(D::Error::custom(format!("expected an id, found {}", other))),
    }
}

pub fn id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    optional_id(deserializer)?.ok_or_else(|| D::Error::custom("missing id"))
}

/// Hours and money leave the service as JSON numbers, never strings.
pub fn number<S>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    rust_decimal::serde::float::serialize(value, serializer)
}

/// Provider hours are floats; rounded to [`SCALE`] places on the way in.
pub fn hours_from_f64(hours: f64) -> Decimal {
    Decimal::from_f64(hours)
        .map(|h| h.round_dp(SCALE))
        .unwrap_or(Decimal::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde::{Deserialize, Serialize};

    #[derive(Deserialize)]
    struct Row {
        #[serde(deserialize_with = "decimal", default)]
        hours: Decimal,
        #[serde(deserialize_with = "optional_decimal", default)]
        rate: Option<Decimal>,
        #[serde(deserialize_with = "optional_id", default)]
        external_id: Option<String>,
    }

    #[test]
    fn string_and_number_decimals_coerce_to_same_value() {
        let from_str: Row = serde_json::from_str(r#"{"hours":"37.50","rate":"22.5"}"#).unwrap();
        let from_num: Row = serde_json::from_str(r#"{"hours":37.5,"rate":22.5}"#).unwrap();
        assert_eq!(from_str.hours, dec!(37.5));
        assert_eq!(from_str.hours, from_num.hours);
        assert_eq!(from_str.rate, Some(dec!(22.5)));
    }

    #[test]
    fn null_and_missing_decimals() {
        let row: Row = serde_json::from_str(r#"{"hours":null,"rate":null}"#).unwrap();
        assert_eq!(row.hours, Decimal::ZERO);
        assert_eq!(row.rate, None);

        let row: Row = serde_json::from_str("{}").unwrap();
        assert_eq!(row.hours, Decimal::ZERO);
        assert_eq!(row.external_id, None);
    }

    #[test]
    fn garbage_decimal_is_rejected() {
        let result: Result<Row, _> = serde_json::from_str(r#"{"hours":"lots"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn numeric_and_blank_ids() {
        let row: Row = serde_json::from_str(r#"{"external_id":9182734}"#).unwrap();
        assert_eq!(row.external_id.as_deref(), Some("9182734"));

        let row: Row = serde_json::from_str(r#"{"external_id":"  "}"#).unwrap();
        assert_eq!(row.external_id, None);
    }

    #[test]
    fn float_hours_are_rounded() {
        assert_eq!(hours_from_f64(7.499999), dec!(7.50));
        assert_eq!(hours_from_f64(f64::NAN), Decimal::ZERO);
    }

    #[derive(Serialize)]
    struct Out {
        #[serde(serialize_with = "number")]
        total: Decimal,
    }

    #[test]
    fn decimals_serialize_as_numbers() {
        let value = serde_json::to_value(Out { total: dec!(45.50) }).unwrap();
        assert!(value["total"].is_number());
        assert_eq!(value["total"].as_f64(), Some(45.5));
    }
}

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single row as produced by any record source: named fields, in source order.
pub type FlatRecord = Map<String, Value>;

/// The composite key every stream is joined on.
pub type JoinKey = (i64, i64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpressionRecord {
    pub ad_id: i64,
    pub user_id: i64,
    pub timestamp: String,
    pub impression_cost: f64,
}

// Clicks and conversions share one shape, a conversion is a click that carries a conversion_value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickRecord {
    pub ad_id: i64,
    pub user_id: i64,
    pub timestamp: String,
    pub click_cost: f64,
    pub conversion_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelatedRecord {
    pub ad_id: i64,
    pub user_id: i64,
    pub impression_timestamp: String,
    pub impression_cost: f64,
    pub click_info: Option<ClickRecord>,
    pub conversion_info: Option<ClickRecord>,
}

impl ImpressionRecord {
    pub fn key(&self) -> JoinKey {
        (self.ad_id, self.user_id)
    }
}

impl ClickRecord {
    pub fn key(&self) -> JoinKey {
        (self.ad_id, self.user_id)
    }
}

impl CorrelatedRecord {
    pub fn key(&self) -> JoinKey {
        (self.ad_id, self.user_id)
    }
}

/// Why a flat record could not be turned into a typed one.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FieldError {
    #[error("missing required field {0}")]
    Missing(&'static str),
    #[error("field {field} has invalid value {value}")]
    Invalid { field: &'static str, value: String },
}

impl TryFrom<&FlatRecord> for ImpressionRecord {
    type Error = FieldError;

    fn try_from(record: &FlatRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            ad_id: int_field(record, "ad_id")?,
            user_id: int_field(record, "user_id")?,
            timestamp: text_field(record, "timestamp")?,
            impression_cost: decimal_field(record, "impression_cost")?,
        })
    }
}

impl TryFrom<&FlatRecord> for ClickRecord {
    type Error = FieldError;

    fn try_from(record: &FlatRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            ad_id: int_field(record, "ad_id")?,
            user_id: int_field(record, "user_id")?,
            timestamp: text_field(record, "timestamp")?,
            click_cost: decimal_field(record, "click_cost")?,
            conversion_value: optional_decimal_field(record, "conversion_value")?,
        })
    }
}

fn required<'a>(record: &'a FlatRecord, field: &'static str) -> Result<&'a Value, FieldError> {
    match record.get(field) {
        None | Some(Value::Null) => Err(FieldError::Missing(field)),
        Some(value) => Ok(value),
    }
}

fn invalid(field: &'static str, value: &Value) -> FieldError {
    FieldError::Invalid {
        field,
        value: value.to_string(),
    }
}

// CSV sources hand us everything as strings, so numeric fields accept numeric strings too
fn int_field(record: &FlatRecord, field: &'static str) -> Result<i64, FieldError> {
    let value = required(record, field)?;
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| is_integral(*f)).map(|f| f as i64))
            .ok_or_else(|| invalid(field, value)),
        Value::String(s) => s.trim().parse().map_err(|_| invalid(field, value)),
        _ => Err(invalid(field, value)),
    }
}

// i64::MAX as f64 rounds up to 2^63, so the upper bound is exclusive
fn is_integral(f: f64) -> bool {
    f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64
}

fn decimal_field(record: &FlatRecord, field: &'static str) -> Result<f64, FieldError> {
    let value = required(record, field)?;
    parse_decimal(value).ok_or_else(|| invalid(field, value))
}

fn optional_decimal_field(
    record: &FlatRecord,
    field: &'static str,
) -> Result<Option<f64>, FieldError> {
    match record.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(value) => parse_decimal(value)
            .map(Some)
            .ok_or_else(|| invalid(field, value)),
    }
}

// NaN and infinities can't be stored as JSON, so they count as malformed
fn parse_decimal(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|f| f.is_finite())
}

fn text_field(record: &FlatRecord, field: &'static str) -> Result<String, FieldError> {
    let value = required(record, field)?;
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(invalid(field, value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn flat(value: Value) -> FlatRecord {
        match value {
            Value::Object(map) => map,
            _ => panic!("test fixture must be an object"),
        }
    }

    #[test]
    fn test_impression_from_json_types() {
        let record = flat(json!({
            "ad_id": 1,
            "user_id": 9,
            "timestamp": "2024-01-01T00:00:00Z",
            "impression_cost": 0.5
        }));
        let impression = ImpressionRecord::try_from(&record).unwrap();
        assert_eq!(impression.key(), (1, 9));
        assert_eq!(impression.impression_cost, 0.5);
    }

    #[test]
    fn test_click_from_csv_strings() {
        let record = flat(json!({
            "ad_id": "1",
            "user_id": " 9",
            "timestamp": "t2",
            "click_cost": "0.1",
            "conversion_value": ""
        }));
        let click = ClickRecord::try_from(&record).unwrap();
        assert_eq!(click.key(), (1, 9));
        assert_eq!(click.click_cost, 0.1);
        assert_eq!(click.conversion_value, None);
    }

    #[test]
    fn test_click_with_conversion_value() {
        let record = flat(json!({
            "ad_id": 3,
            "user_id": 4,
            "timestamp": "t",
            "click_cost": 1,
            "conversion_value": "12.5"
        }));
        let click = ClickRecord::try_from(&record).unwrap();
        assert_eq!(click.conversion_value, Some(12.5));
    }

    #[test]
    fn test_missing_field_is_reported() {
        let record = flat(json!({"ad_id": 1, "timestamp": "t", "impression_cost": 1.0}));
        assert_eq!(
            ImpressionRecord::try_from(&record),
            Err(FieldError::Missing("user_id"))
        );

        let record = flat(json!({"ad_id": 1, "user_id": null, "timestamp": "t", "impression_cost": 1.0}));
        assert_eq!(
            ImpressionRecord::try_from(&record),
            Err(FieldError::Missing("user_id"))
        );
    }

    #[test]
    fn test_invalid_field_is_reported() {
        let record = flat(json!({"ad_id": "abc", "user_id": 2, "timestamp": "t", "impression_cost": 1.0}));
        assert!(matches!(
            ImpressionRecord::try_from(&record),
            Err(FieldError::Invalid { field: "ad_id", .. })
        ));

        let record = flat(json!({"ad_id": 1.5, "user_id": 2, "timestamp": "t", "impression_cost": 1.0}));
        assert!(matches!(
            ImpressionRecord::try_from(&record),
            Err(FieldError::Invalid { field: "ad_id", .. })
        ));
    }

    #[test]
    fn test_out_of_range_ids_are_rejected() {
        for ad_id in [json!(1e19), json!(9.3e18), json!(10000000000000000000u64), json!(-1e19)] {
            let record = flat(json!({"ad_id": ad_id, "user_id": 1, "timestamp": "t", "impression_cost": 1.0}));
            assert!(
                matches!(
                    ImpressionRecord::try_from(&record),
                    Err(FieldError::Invalid { field: "ad_id", .. })
                ),
                "{ad_id} should not decode"
            );
        }

        let record = flat(json!({"ad_id": "10000000000000000000", "user_id": 1, "timestamp": "t", "impression_cost": 1.0}));
        assert!(ImpressionRecord::try_from(&record).is_err());

        let record = flat(json!({"ad_id": 4e3, "user_id": -2.0, "timestamp": "t", "impression_cost": 1.0}));
        assert_eq!(ImpressionRecord::try_from(&record).unwrap().key(), (4000, -2));
    }

    #[test]
    fn test_non_finite_decimals_are_rejected() {
        let record = flat(json!({
            "ad_id": "1",
            "user_id": "1",
            "timestamp": "t",
            "click_cost": "NaN",
            "conversion_value": ""
        }));
        assert!(matches!(
            ClickRecord::try_from(&record),
            Err(FieldError::Invalid { field: "click_cost", .. })
        ));

        for value in ["inf", "-inf", "NaN"] {
            let record = flat(json!({
                "ad_id": "1",
                "user_id": "1",
                "timestamp": "t",
                "click_cost": "0.5",
                "conversion_value": value
            }));
            assert!(matches!(
                ClickRecord::try_from(&record),
                Err(FieldError::Invalid { field: "conversion_value", .. })
            ));
        }
    }
}

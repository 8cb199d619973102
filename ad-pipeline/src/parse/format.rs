use serde_json::Value;
use tracing::error;

use crate::{error::IngestionError, types::FlatRecord};

use super::Parsed;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatConfig {
    // A single JSON array of objects
    JsonArray,
    // A delimited table with a header row
    Delimited { delimiter: u8 },
    // An Avro object container file of records
    Avro,
}

impl FormatConfig {
    pub fn csv() -> Self {
        Self::Delimited { delimiter: b',' }
    }

    pub fn parse(
        &self,
        origin: &str,
        data: &[u8],
    ) -> Result<Parsed<Vec<FlatRecord>>, IngestionError> {
        match self {
            Self::JsonArray => json_array(origin, data),
            Self::Delimited { delimiter } => delimited(origin, data, *delimiter),
            Self::Avro => avro_container(origin, data),
        }
    }
}

pub fn json_array(origin: &str, data: &[u8]) -> Result<Parsed<Vec<FlatRecord>>, IngestionError> {
    let document: Value =
        serde_json::from_slice(data).map_err(|source| IngestionError::Json {
            origin: origin.to_string(),
            source,
        })?;

    let Value::Array(items) = document else {
        return Err(IngestionError::Malformed {
            origin: origin.to_string(),
            reason: "expected a top level array of objects".to_string(),
        });
    };

    let mut records = Vec::with_capacity(items.len());
    let mut skipped = 0;
    for (idx, item) in items.into_iter().enumerate() {
        match item {
            Value::Object(record) => records.push(record),
            other => {
                error!(
                    "Skipping element {} of {}: expected an object, got {}",
                    idx, origin, other
                );
                skipped += 1;
            }
        }
    }

    Ok(Parsed {
        data: records,
        skipped,
    })
}

// Every field comes out as a string, typed decoding happens later
pub fn delimited(
    origin: &str,
    data: &[u8],
    delimiter: u8,
) -> Result<Parsed<Vec<FlatRecord>>, IngestionError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(data);

    let headers = reader
        .headers()
        .map_err(|source| IngestionError::Csv {
            origin: origin.to_string(),
            source,
        })?
        .clone();

    let mut records = Vec::new();
    let mut skipped = 0;
    for row in reader.records() {
        match row {
            Ok(row) => records.push(
                headers
                    .iter()
                    .zip(row.iter())
                    .map(|(name, value)| (name.to_string(), Value::String(value.to_string())))
                    .collect(),
            ),
            Err(e) => {
                error!("Skipping row of {}: {}", origin, e);
                skipped += 1;
            }
        }
    }

    Ok(Parsed {
        data: records,
        skipped,
    })
}

pub fn avro_container(
    origin: &str,
    data: &[u8],
) -> Result<Parsed<Vec<FlatRecord>>, IngestionError> {
    let reader = apache_avro::Reader::new(data).map_err(|source| IngestionError::Avro {
        origin: origin.to_string(),
        source: Box::new(source),
    })?;

    let mut records = Vec::new();
    let mut skipped = 0;
    for (idx, value) in reader.enumerate() {
        match value.map_err(|e| e.to_string()).and_then(flatten_avro) {
            Ok(record) => records.push(record),
            Err(reason) => {
                error!("Skipping avro datum {} of {}: {}", idx, origin, reason);
                skipped += 1;
            }
        }
    }

    Ok(Parsed {
        data: records,
        skipped,
    })
}

fn flatten_avro(value: apache_avro::types::Value) -> Result<FlatRecord, String> {
    let fields = match value {
        apache_avro::types::Value::Record(fields) => fields,
        other => return Err(format!("expected a record, got {other:?}")),
    };
    fields
        .into_iter()
        .map(|(name, field)| {
            Value::try_from(field)
                .map(|json| (name.clone(), json))
                .map_err(|e| format!("field {name}: {e}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use apache_avro::{types::Record, Schema, Writer};

    const BID_SCHEMA: &str = r#"
    {
        "type": "record",
        "name": "bid_request",
        "fields": [
            {"name": "ad_id", "type": "long"},
            {"name": "user_id", "type": "long"},
            {"name": "bid_price", "type": "double"},
            {"name": "timestamp", "type": "string"}
        ]
    }
    "#;

    fn avro_bids(count: i64) -> Vec<u8> {
        let schema = Schema::parse_str(BID_SCHEMA).unwrap();
        let mut writer = Writer::new(&schema, Vec::new());
        for i in 0..count {
            let mut record = Record::new(writer.schema()).unwrap();
            record.put("ad_id", i);
            record.put("user_id", i * 10);
            record.put("bid_price", 0.5);
            record.put("timestamp", format!("2024-01-01T00:00:0{i}Z"));
            writer.append(record).unwrap();
        }
        writer.into_inner().unwrap()
    }

    #[test]
    fn test_json_array() {
        let data = br#"[
            {"ad_id": 1, "user_id": 9, "timestamp": "t1", "impression_cost": 0.5},
            {"ad_id": 2, "user_id": 5, "timestamp": "t2", "impression_cost": 0.7}
        ]"#;
        let parsed = json_array("impressions.json", data).unwrap();
        assert_eq!(parsed.data.len(), 2);
        assert_eq!(parsed.skipped, 0);
        assert_eq!(parsed.data[1]["user_id"], Value::from(5));

        // Field order is kept as it appears in the document
        let keys: Vec<_> = parsed.data[0].keys().cloned().collect();
        assert_eq!(keys, vec!["ad_id", "user_id", "timestamp", "impression_cost"]);
    }

    #[test]
    fn test_json_array_skips_non_objects() {
        let data = br#"[{"ad_id": 1}, 42, "nope", {"ad_id": 2}]"#;
        let parsed = json_array("impressions.json", data).unwrap();
        assert_eq!(parsed.data.len(), 2);
        assert_eq!(parsed.skipped, 2);
    }

    #[test]
    fn test_json_not_an_array() {
        let err = json_array("impressions.json", br#"{"ad_id": 1}"#).unwrap_err();
        assert!(matches!(err, IngestionError::Malformed { .. }));

        let err = json_array("impressions.json", b"[{\"ad_id\": ").unwrap_err();
        assert!(matches!(err, IngestionError::Json { .. }));
        assert!(err.to_string().contains("impressions.json"));
    }

    #[test]
    fn test_csv_rows_as_strings() {
        let data = b"ad_id,user_id,timestamp,click_cost,conversion_value\n1,9,t2,0.1,\n2,5,t3,0.2,4.5\n";
        let parsed = delimited("clicks.csv", data, b',').unwrap();
        assert_eq!(parsed.data.len(), 2);
        assert_eq!(parsed.data[0]["ad_id"], Value::String("1".to_string()));
        assert_eq!(parsed.data[0]["conversion_value"], Value::String("".to_string()));
        assert_eq!(parsed.data[1]["conversion_value"], Value::String("4.5".to_string()));
    }

    #[test]
    fn test_csv_one_bad_row_in_ten() {
        let mut data = String::from("ad_id,user_id,timestamp,click_cost,conversion_value\n");
        for i in 0..10 {
            if i == 4 {
                data.push_str("5,5,broken\n");
            } else {
                data.push_str(&format!("{i},{i},t{i},0.1,\n"));
            }
        }
        let parsed = delimited("clicks.csv", data.as_bytes(), b',').unwrap();
        assert_eq!(parsed.data.len(), 9);
        assert_eq!(parsed.skipped, 1);
    }

    #[test]
    fn test_tab_delimited() {
        let parsed = FormatConfig::Delimited { delimiter: b'\t' }
            .parse("clicks.tsv", b"ad_id\tuser_id\n1\t2\n")
            .unwrap();
        assert_eq!(parsed.data[0]["user_id"], Value::String("2".to_string()));
    }

    #[test]
    fn test_avro_container() {
        let parsed = FormatConfig::Avro
            .parse("bids.avro", &avro_bids(3))
            .unwrap();
        assert_eq!(parsed.data.len(), 3);
        assert_eq!(parsed.skipped, 0);
        assert_eq!(parsed.data[2]["user_id"], Value::from(20));
        assert_eq!(parsed.data[0]["bid_price"], Value::from(0.5));
    }

    #[test]
    fn test_avro_garbage() {
        let err = avro_container("bids.avro", b"definitely not avro").unwrap_err();
        assert!(matches!(err, IngestionError::Avro { .. }));
    }
}

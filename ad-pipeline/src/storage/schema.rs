use std::fmt;

use crate::types::{ClickRecord, CorrelatedRecord, ImpressionRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    AdImpressions,
    Clicks,
    CorrelatedData,
}

pub struct Column {
    pub name: &'static str,
    pub sql_type: &'static str,
}

const fn column(name: &'static str, sql_type: &'static str) -> Column {
    Column { name, sql_type }
}

const AD_IMPRESSIONS_COLUMNS: [Column; 4] = [
    column("ad_id", "INTEGER NOT NULL"),
    column("user_id", "INTEGER NOT NULL"),
    column("timestamp", "TEXT"),
    column("impression_cost", "REAL"),
];

const CLICKS_COLUMNS: [Column; 5] = [
    column("ad_id", "INTEGER NOT NULL"),
    column("user_id", "INTEGER NOT NULL"),
    column("timestamp", "TEXT"),
    column("click_cost", "REAL"),
    column("conversion_value", "REAL"),
];

// click_info and conversion_info hold the matched ClickRecord as JSON text, NULL when absent
const CORRELATED_DATA_COLUMNS: [Column; 6] = [
    column("ad_id", "INTEGER NOT NULL"),
    column("user_id", "INTEGER NOT NULL"),
    column("impression_timestamp", "TEXT"),
    column("impression_cost", "REAL"),
    column("click_info", "TEXT"),
    column("conversion_info", "TEXT"),
];

impl Table {
    pub const ALL: [Table; 3] = [Table::AdImpressions, Table::Clicks, Table::CorrelatedData];

    pub fn name(&self) -> &'static str {
        match self {
            Table::AdImpressions => "ad_impressions",
            Table::Clicks => "clicks",
            Table::CorrelatedData => "correlated_data",
        }
    }

    pub fn columns(&self) -> &'static [Column] {
        match self {
            Table::AdImpressions => &AD_IMPRESSIONS_COLUMNS,
            Table::Clicks => &CLICKS_COLUMNS,
            Table::CorrelatedData => &CORRELATED_DATA_COLUMNS,
        }
    }

    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns().iter().map(|c| c.name).collect()
    }

    pub(crate) fn create_statement(&self) -> String {
        let columns = self
            .columns()
            .iter()
            .map(|c| format!("{} {}", c.name, c.sql_type))
            .collect::<Vec<_>>()
            .join(", ");
        format!("CREATE TABLE IF NOT EXISTS {} ({columns})", self.name())
    }

    // Always name the columns, never rely on the table's declared order
    pub(crate) fn insert_statement(&self) -> String {
        let names = self.column_names();
        let placeholders = vec!["?"; names.len()].join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            self.name(),
            names.join(", ")
        )
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Integer(i64),
    Real(f64),
    Text(String),
    Null,
}

/// Explicit field-to-column mapping for a record type. `values` must yield one value per
/// entry in `COLUMNS`, in the same order.
pub trait TableRow {
    const COLUMNS: &'static [&'static str];

    fn values(&self) -> Vec<SqlValue>;
}

impl TableRow for ImpressionRecord {
    const COLUMNS: &'static [&'static str] = &["ad_id", "user_id", "timestamp", "impression_cost"];

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Integer(self.ad_id),
            SqlValue::Integer(self.user_id),
            SqlValue::Text(self.timestamp.clone()),
            SqlValue::Real(self.impression_cost),
        ]
    }
}

impl TableRow for ClickRecord {
    const COLUMNS: &'static [&'static str] = &[
        "ad_id",
        "user_id",
        "timestamp",
        "click_cost",
        "conversion_value",
    ];

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Integer(self.ad_id),
            SqlValue::Integer(self.user_id),
            SqlValue::Text(self.timestamp.clone()),
            SqlValue::Real(self.click_cost),
            self.conversion_value.map_or(SqlValue::Null, SqlValue::Real),
        ]
    }
}

impl TableRow for CorrelatedRecord {
    const COLUMNS: &'static [&'static str] = &[
        "ad_id",
        "user_id",
        "impression_timestamp",
        "impression_cost",
        "click_info",
        "conversion_info",
    ];

    fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Integer(self.ad_id),
            SqlValue::Integer(self.user_id),
            SqlValue::Text(self.impression_timestamp.clone()),
            SqlValue::Real(self.impression_cost),
            click_json(self.click_info.as_ref()),
            click_json(self.conversion_info.as_ref()),
        ]
    }
}

fn click_json(click: Option<&ClickRecord>) -> SqlValue {
    // Serializing a struct of plain numbers and strings can't fail
    click
        .and_then(|c| serde_json::to_string(c).ok())
        .map_or(SqlValue::Null, SqlValue::Text)
}

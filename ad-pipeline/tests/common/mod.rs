#![allow(dead_code)]

use std::{collections::HashMap, fs, path::Path};

use ad_pipeline::config::Config;
use apache_avro::{types::Record, Schema, Writer};
use envconfig::Envconfig;
use tempfile::TempDir;

pub const IMPRESSIONS_JSON: &str = r#"[
    {"ad_id": 1, "user_id": 9, "timestamp": "t1", "impression_cost": 0.5},
    {"ad_id": 2, "user_id": 5, "timestamp": "t3", "impression_cost": 0.7}
]"#;

pub const CLICKS_CSV: &str = "ad_id,user_id,timestamp,click_cost,conversion_value
1,9,t2,0.1,
1,9,t4,0.3,
";

const BID_SCHEMA: &str = r#"
{
    "type": "record",
    "name": "bid_request",
    "fields": [
        {"name": "ad_id", "type": "long"},
        {"name": "user_id", "type": "long"},
        {"name": "bid_price", "type": "double"}
    ]
}
"#;

pub struct Fixture {
    pub dir: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self, name: &str) -> String {
        self.dir.path().join(name).to_str().unwrap().to_string()
    }

    pub fn write(&self, name: &str, contents: &str) -> String {
        fs::write(self.dir.path().join(name), contents).unwrap();
        self.path(name)
    }

    pub fn write_bids(&self, name: &str, count: i64) -> String {
        let schema = Schema::parse_str(BID_SCHEMA).unwrap();
        let mut writer = Writer::new(&schema, Vec::new());
        for i in 0..count {
            let mut record = Record::new(writer.schema()).unwrap();
            record.put("ad_id", i);
            record.put("user_id", i);
            record.put("bid_price", 1.25);
            writer.append(record).unwrap();
        }
        let bytes = writer.into_inner().unwrap();
        fs::write(self.dir.path().join(name), bytes).unwrap();
        self.path(name)
    }

    // Defaults point every input at files inside the fixture dir, which may or may not exist
    pub fn config(&self, overrides: &[(&str, String)]) -> Config {
        let mut env = HashMap::from([
            ("IMPRESSIONS_PATH".to_string(), self.path("ad_impressions.json")),
            ("CLICKS_PATH".to_string(), self.path("clicks_conversions.csv")),
            ("BIDS_PATH".to_string(), self.path("bid_requests.avro")),
            ("DB_PATH".to_string(), self.path("advertising.db")),
            ("LOG_PATH".to_string(), self.path("advertising.log")),
        ]);
        for (key, value) in overrides {
            env.insert(key.to_string(), value.clone());
        }
        Config::init_from_hashmap(&env).unwrap()
    }
}

pub fn db_exists(path: &str) -> bool {
    Path::new(path).exists()
}

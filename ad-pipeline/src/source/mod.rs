use async_trait::async_trait;

use crate::{
    error::IngestionError,
    parse::{format::FormatConfig, Parsed},
    types::FlatRecord,
};

pub mod file;

#[async_trait]
pub trait DataSource: Send + Sync {
    // Human readable name of where the bytes come from, used in logs and errors
    fn origin(&self) -> String;

    async fn read_all(&self) -> Result<Vec<u8>, IngestionError>;
}

/// A named origin plus the format its bytes are in. Yields flat records in source order, or
/// fails as a whole.
pub struct RecordSource {
    source: Box<dyn DataSource>,
    format: FormatConfig,
}

impl RecordSource {
    pub fn new(source: Box<dyn DataSource>, format: FormatConfig) -> Self {
        Self { source, format }
    }

    pub fn origin(&self) -> String {
        self.source.origin()
    }

    pub async fn read(&self) -> Result<Parsed<Vec<FlatRecord>>, IngestionError> {
        let data = self.source.read_all().await?;
        self.format.parse(&self.origin(), &data)
    }
}

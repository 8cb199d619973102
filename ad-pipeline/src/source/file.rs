use std::path::PathBuf;

use async_trait::async_trait;

use super::DataSource;
use crate::error::IngestionError;

pub struct FileSource {
    pub path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DataSource for FileSource {
    fn origin(&self) -> String {
        self.path.display().to_string()
    }

    async fn read_all(&self) -> Result<Vec<u8>, IngestionError> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|source| IngestionError::Io {
                origin: self.origin(),
                source,
            })
    }
}

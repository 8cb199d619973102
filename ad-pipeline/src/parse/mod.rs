use tracing::warn;

use crate::types::{FieldError, FlatRecord};

pub mod format;

#[derive(Debug)]
pub struct Parsed<T> {
    pub data: T,
    // How many input records were dropped on the way to `data`. Every one of them has been logged.
    pub skipped: usize,
}

impl<T> Parsed<Vec<T>> {
    pub fn empty() -> Self {
        Self {
            data: Vec::new(),
            skipped: 0,
        }
    }
}

/// Decodes flat records into a typed record, skipping (and logging) any record with a
/// missing or ill-typed required field. Order of the surviving records is preserved.
pub fn decode_records<T>(origin: &str, records: &[FlatRecord]) -> Parsed<Vec<T>>
where
    T: for<'a> TryFrom<&'a FlatRecord, Error = FieldError>,
{
    let mut data = Vec::with_capacity(records.len());
    let mut skipped = 0;
    for (idx, record) in records.iter().enumerate() {
        match T::try_from(record) {
            Ok(decoded) => data.push(decoded),
            Err(e) => {
                warn!("Skipping record {} from {}: {}", idx, origin, e);
                skipped += 1;
            }
        }
    }
    Parsed { data, skipped }
}

use std::collections::{hash_map::Entry, HashMap};

use tracing::debug;

use crate::{
    error::CorrelationError,
    parse::{decode_records, Parsed},
    types::{ClickRecord, CorrelatedRecord, FlatRecord, ImpressionRecord, JoinKey},
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CorrelationStats {
    pub impressions: usize,
    pub clicks_matched: usize,
    pub conversions_matched: usize,
    // Input records dropped because a required field was missing or ill-typed
    pub skipped_records: usize,
    // Records that shared a key with an earlier record, and so were never attached
    pub duplicate_clicks: usize,
    pub duplicate_conversions: usize,
}

pub struct Correlation {
    pub records: Vec<CorrelatedRecord>,
    pub stats: CorrelationStats,
}

// The first record seen for each key. Later records with the same key are counted, then ignored.
struct FirstMatchIndex<'a> {
    first: HashMap<JoinKey, &'a ClickRecord>,
    duplicates: usize,
}

impl<'a> FirstMatchIndex<'a> {
    fn build(records: &'a [ClickRecord]) -> Self {
        let mut first = HashMap::with_capacity(records.len());
        let mut duplicates = 0;
        for record in records {
            match first.entry(record.key()) {
                Entry::Vacant(slot) => {
                    slot.insert(record);
                }
                Entry::Occupied(_) => duplicates += 1,
            }
        }
        Self { first, duplicates }
    }

    fn empty() -> Self {
        Self {
            first: HashMap::new(),
            duplicates: 0,
        }
    }

    fn get(&self, key: &JoinKey) -> Option<ClickRecord> {
        self.first.get(key).map(|r| (*r).clone())
    }
}

/// Joins every impression, in input order, with the first click and the first conversion that
/// share its `(ad_id, user_id)`. Produces exactly one record per impression.
///
/// Passing the same collection as both `clicks` and `conversions` means conversions were not
/// ingested on their own, in which case `conversion_info` is always absent.
pub fn correlate(
    impressions: &[ImpressionRecord],
    clicks: &[ClickRecord],
    conversions: &[ClickRecord],
) -> Vec<CorrelatedRecord> {
    correlate_with_stats(impressions, clicks, conversions).records
}

pub fn correlate_with_stats(
    impressions: &[ImpressionRecord],
    clicks: &[ClickRecord],
    conversions: &[ClickRecord],
) -> Correlation {
    let click_index = FirstMatchIndex::build(clicks);
    let conversion_index = if std::ptr::eq(clicks, conversions) {
        FirstMatchIndex::empty()
    } else {
        FirstMatchIndex::build(conversions)
    };

    let mut stats = CorrelationStats {
        impressions: impressions.len(),
        duplicate_clicks: click_index.duplicates,
        duplicate_conversions: conversion_index.duplicates,
        ..Default::default()
    };

    let records = impressions
        .iter()
        .map(|impression| {
            let key = impression.key();
            let click_info = click_index.get(&key);
            let conversion_info = conversion_index.get(&key);
            stats.clicks_matched += usize::from(click_info.is_some());
            stats.conversions_matched += usize::from(conversion_info.is_some());
            CorrelatedRecord {
                ad_id: impression.ad_id,
                user_id: impression.user_id,
                impression_timestamp: impression.timestamp.clone(),
                impression_cost: impression.impression_cost,
                click_info,
                conversion_info,
            }
        })
        .collect();

    if stats.duplicate_clicks > 0 || stats.duplicate_conversions > 0 {
        debug!(
            "Kept first match per key, ignored {} later clicks and {} later conversions",
            stats.duplicate_clicks, stats.duplicate_conversions
        );
    }

    Correlation { records, stats }
}

/// A batch of raw records decoded into typed ones. Malformed records have already been
/// skipped and logged.
pub struct DecodedBatch {
    pub impressions: Vec<ImpressionRecord>,
    pub clicks: Vec<ClickRecord>,
    // None when conversions were not ingested on their own
    pub conversions: Option<Vec<ClickRecord>>,
    pub impressions_received: usize,
    pub skipped: usize,
}

impl DecodedBatch {
    pub fn decode(
        impressions: &[FlatRecord],
        clicks: &[FlatRecord],
        conversions: Option<&[FlatRecord]>,
    ) -> Self {
        let decoded_impressions: Parsed<Vec<ImpressionRecord>> =
            decode_records("impressions", impressions);
        let decoded_clicks: Parsed<Vec<ClickRecord>> = decode_records("clicks", clicks);
        let decoded_conversions: Option<Parsed<Vec<ClickRecord>>> =
            conversions.map(|c| decode_records("conversions", c));

        let skipped = decoded_impressions.skipped
            + decoded_clicks.skipped
            + decoded_conversions.as_ref().map_or(0, |c| c.skipped);

        Self {
            impressions: decoded_impressions.data,
            clicks: decoded_clicks.data,
            conversions: decoded_conversions.map(|c| c.data),
            impressions_received: impressions.len(),
            skipped,
        }
    }

    /// Fails only when impressions were received but not a single one could be decoded.
    pub fn correlate(&self) -> Result<Correlation, CorrelationError> {
        if self.impressions_received > 0 && self.impressions.is_empty() {
            return Err(CorrelationError::MalformedBatch {
                total: self.impressions_received,
            });
        }

        let conversions = self.conversions.as_deref().unwrap_or(&self.clicks);
        let mut correlation = correlate_with_stats(&self.impressions, &self.clicks, conversions);
        correlation.stats.skipped_records = self.skipped;
        Ok(correlation)
    }
}

/// Decodes raw records and correlates them. Individual malformed records are skipped and
/// logged; a batch in which no impression at all can be decoded fails as a whole.
pub fn correlate_batch(
    impressions: &[FlatRecord],
    clicks: &[FlatRecord],
    conversions: Option<&[FlatRecord]>,
) -> Result<Correlation, CorrelationError> {
    DecodedBatch::decode(impressions, clicks, conversions).correlate()
}

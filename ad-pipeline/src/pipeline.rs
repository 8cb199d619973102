use std::{fmt, time::Duration};

use tokio::time::Instant;
use tracing::{error, info};

use crate::{
    config::Config,
    correlate::{Correlation, DecodedBatch},
    error::PipelineError,
    metrics_consts::{
        BATCH_DURATION, CLICKS_MATCHED, CONVERSIONS_MATCHED, RECORDS_CORRELATED,
        RECORDS_INGESTED, RECORDS_SKIPPED, ROWS_WRITTEN, STAGE_FAILURES,
    },
    parse::format::FormatConfig,
    source::{file::FileSource, RecordSource},
    storage::{Store, Table, TableRow, WriteSummary},
    types::{CorrelatedRecord, FlatRecord},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Ingest(String),
    Correlate,
    Open,
    Schema,
    Store(Table),
}

impl Stage {
    fn label(&self) -> &'static str {
        match self {
            Stage::Ingest(_) => "ingest",
            Stage::Correlate => "correlate",
            Stage::Open => "open",
            Stage::Schema => "schema",
            Stage::Store(_) => "store",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Ingest(origin) => write!(f, "ingest {origin}"),
            Stage::Store(table) => write!(f, "store {table}"),
            other => f.write_str(other.label()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub stage: Stage,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub impressions_ingested: usize,
    pub clicks_ingested: usize,
    pub conversions_ingested: usize,
    pub bids_ingested: usize,
    // Dropped at ingestion or decoding, each one logged
    pub records_skipped: usize,
    pub correlated: usize,
    pub writes: Vec<WriteSummary>,
    pub failures: Vec<StageFailure>,
}

impl RunSummary {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }

    pub fn rows_written(&self, table: Table) -> usize {
        self.writes
            .iter()
            .filter(|w| w.table == table)
            .map(|w| w.rows_written)
            .sum()
    }

    // Every failure is logged here and nowhere else, so nothing is swallowed silently
    fn fail(&mut self, stage: Stage, message: String) {
        error!("{} failed: {}", stage, message);
        metrics::counter!(STAGE_FAILURES, "stage" => stage.label()).increment(1);
        self.failures.push(StageFailure { stage, message });
    }
}

/// One batch: ingest every source, correlate, persist. Each stage degrades to an empty result
/// on failure rather than aborting the run.
pub struct Pipeline {
    impressions: RecordSource,
    clicks: RecordSource,
    conversions: Option<RecordSource>,
    bids: RecordSource,
    db_path: String,
    max_connections: u32,
    timeout: Duration,
}

impl Pipeline {
    pub fn new(config: &Config) -> Self {
        Self {
            impressions: file_source(&config.impressions_path, FormatConfig::JsonArray),
            clicks: file_source(&config.clicks_path, FormatConfig::csv()),
            conversions: config
                .conversions_path
                .as_deref()
                .map(|path| file_source(path, FormatConfig::csv())),
            bids: file_source(&config.bids_path, FormatConfig::Avro),
            db_path: config.db_path.clone(),
            max_connections: config.max_sqlite_connections,
            timeout: config.batch_timeout(),
        }
    }

    /// Runs the batch under the configured deadline. On expiry the in-flight work is dropped,
    /// which rolls back any open write transaction.
    pub async fn run(&self) -> Result<RunSummary, PipelineError> {
        let started = Instant::now();
        let result = tokio::time::timeout(self.timeout, self.run_batch()).await;
        metrics::histogram!(BATCH_DURATION).record(started.elapsed().as_millis() as f64);

        result.map_err(|_| {
            let err = PipelineError::Timeout {
                seconds: self.timeout.as_secs(),
            };
            error!("{}", err);
            metrics::counter!(STAGE_FAILURES, "stage" => "timeout").increment(1);
            err
        })
    }

    pub async fn run_batch(&self) -> RunSummary {
        let mut summary = RunSummary::default();
        info!("Starting batch");

        let raw_impressions = ingest(&self.impressions, &mut summary).await;
        let raw_clicks = ingest(&self.clicks, &mut summary).await;
        let raw_conversions = match &self.conversions {
            Some(source) => Some(ingest(source, &mut summary).await),
            None => None,
        };
        let raw_bids = ingest(&self.bids, &mut summary).await;

        summary.impressions_ingested = raw_impressions.len();
        summary.clicks_ingested = raw_clicks.len();
        summary.conversions_ingested = raw_conversions.as_ref().map_or(0, Vec::len);
        // Bid requests aren't joined on yet, they're only read and counted
        summary.bids_ingested = raw_bids.len();

        let batch = DecodedBatch::decode(&raw_impressions, &raw_clicks, raw_conversions.as_deref());
        summary.records_skipped += batch.skipped;
        metrics::counter!(RECORDS_SKIPPED, "stage" => "decode")
            .increment(batch.skipped as u64);

        let correlated = match batch.correlate() {
            Ok(Correlation { records, stats }) => {
                info!(
                    "Correlated {} impressions, {} with a click, {} with a conversion",
                    stats.impressions, stats.clicks_matched, stats.conversions_matched
                );
                metrics::counter!(RECORDS_CORRELATED).increment(records.len() as u64);
                metrics::counter!(CLICKS_MATCHED).increment(stats.clicks_matched as u64);
                metrics::counter!(CONVERSIONS_MATCHED)
                    .increment(stats.conversions_matched as u64);
                records
            }
            Err(e) => {
                summary.fail(Stage::Correlate, e.to_string());
                Vec::new()
            }
        };
        summary.correlated = correlated.len();

        self.persist(&batch, &correlated, &mut summary).await;

        info!(
            "Finished batch: {} correlated records, {} rows written, {} failures",
            summary.correlated,
            summary.writes.iter().map(|w| w.rows_written).sum::<usize>(),
            summary.failures.len()
        );
        summary
    }

    async fn persist(
        &self,
        batch: &DecodedBatch,
        correlated: &[CorrelatedRecord],
        summary: &mut RunSummary,
    ) {
        let store = match Store::open(&self.db_path, self.max_connections).await {
            Ok(store) => store,
            Err(e) => {
                summary.fail(Stage::Open, e.to_string());
                return;
            }
        };

        if let Err(e) = store.ensure_schema().await {
            summary.fail(Stage::Schema, e.to_string());
            store.close().await;
            return;
        }

        write(&store, Table::AdImpressions, &batch.impressions, summary).await;
        write(&store, Table::Clicks, &batch.clicks, summary).await;
        if let Some(conversions) = &batch.conversions {
            write(&store, Table::Clicks, conversions, summary).await;
        }
        write(&store, Table::CorrelatedData, correlated, summary).await;

        store.close().await;
    }
}

fn file_source(path: &str, format: FormatConfig) -> RecordSource {
    RecordSource::new(Box::new(FileSource::new(path)), format)
}

async fn ingest(source: &RecordSource, summary: &mut RunSummary) -> Vec<FlatRecord> {
    let origin = source.origin();
    match source.read().await {
        Ok(parsed) => {
            info!(
                "Ingested {} records from {} ({} skipped)",
                parsed.data.len(),
                origin,
                parsed.skipped
            );
            metrics::counter!(RECORDS_INGESTED, "source" => origin.clone())
                .increment(parsed.data.len() as u64);
            metrics::counter!(RECORDS_SKIPPED, "stage" => "ingest")
                .increment(parsed.skipped as u64);
            summary.records_skipped += parsed.skipped;
            parsed.data
        }
        Err(e) => {
            summary.fail(Stage::Ingest(origin), e.to_string());
            Vec::new()
        }
    }
}

async fn write<R: TableRow>(
    store: &Store,
    table: Table,
    records: &[R],
    summary: &mut RunSummary,
) {
    match store.write_batch(table, records).await {
        Ok(written) => {
            info!("Wrote {} rows to {}", written.rows_written, table);
            metrics::counter!(ROWS_WRITTEN, "table" => table.name())
                .increment(written.rows_written as u64);
            summary.writes.push(written);
        }
        Err(e) => {
            let kind = e.kind();
            summary.fail(Stage::Store(table), format!("{kind}: {e}"));
        }
    }
}

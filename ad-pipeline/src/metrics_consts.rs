pub const RECORDS_INGESTED: &str = "ad_pipeline_records_ingested";
pub const RECORDS_SKIPPED: &str = "ad_pipeline_records_skipped";
pub const RECORDS_CORRELATED: &str = "ad_pipeline_records_correlated";
pub const CLICKS_MATCHED: &str = "ad_pipeline_clicks_matched";
pub const CONVERSIONS_MATCHED: &str = "ad_pipeline_conversions_matched";
pub const ROWS_WRITTEN: &str = "ad_pipeline_rows_written";
pub const STAGE_FAILURES: &str = "ad_pipeline_stage_failures";
pub const BATCH_DURATION: &str = "ad_pipeline_batch_duration_ms";

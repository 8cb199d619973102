pub mod config;
pub mod correlate;
pub mod error;
pub mod logging;
pub mod metrics_consts;
pub mod parse;
pub mod pipeline;
pub mod source;
pub mod storage;
pub mod types;

use thiserror::Error;

pub mod aggregate;
pub mod chunkenc;
pub mod emit;
mod export;
pub mod matcher;
pub mod store;
pub mod utils;

#[cfg(test)]
mod test;

pub use aggregate::{Aggregation, Aggregator, DEFAULT_WINDOW_MS};
pub use emit::{Emitter, JsonSink, ParquetSink, RecordSink, SeriesLabels, SinkError};
pub use export::{export, export_stream, ExportOptions, ExportStats};
pub use matcher::{MatchKind, Matcher, MatcherError};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("dial {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: tonic::transport::Error,
    },
    #[error("stream read: {0}")]
    Stream(tonic::Status),
    #[error("store warning: {0}")]
    Warning(String),
    #[error("decode chunk {chunk} of series {labels}: {source}")]
    Decode {
        labels: String,
        chunk: usize,
        #[source]
        source: chunkenc::DecodeError,
    },
    #[error("write output: {0}")]
    Sink(#[from] SinkError),
    #[error("invalid matcher: {0}")]
    InvalidMatcher(#[from] MatcherError),
    #[error("invalid time range: min time {min} is after max time {max}")]
    InvalidTimeRange { min: i64, max: i64 },
    #[error("invalid window length {0}ms, must be positive")]
    InvalidWindow(i64),
    #[error("export cancelled")]
    Cancelled,
}

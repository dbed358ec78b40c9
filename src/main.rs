use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use log::*;
use tokio_util::sync::CancellationToken;

use parquet_export::utils::parse_timestamp;
use parquet_export::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Parquet,
    Json,
}

/// Export windowed aggregations of a Thanos store to parquet.
#[derive(Debug, Clone, Parser)]
#[command(version, author)]
struct Opts {
    /// Debug level
    #[arg(short, long, default_value = "info")]
    level: log::LevelFilter,
    /// Store API gRPC endpoint
    #[arg(short, long, default_value = "http://127.0.0.1:10901")]
    endpoint: String,
    /// Series selector, e.g. `__name__=~"http_.*"`. May be repeated.
    #[arg(short, long = "matcher", default_value = r#"__name__!="""#)]
    matchers: Vec<Matcher>,
    /// Range start, milliseconds or RFC 3339. Defaults to the epoch.
    #[arg(long, value_parser = parse_timestamp)]
    min_time: Option<i64>,
    /// Range end, milliseconds or RFC 3339. Defaults to now.
    #[arg(long, value_parser = parse_timestamp)]
    max_time: Option<i64>,
    /// Aggregation window in milliseconds
    #[arg(short, long, default_value_t = DEFAULT_WINDOW_MS)]
    window: i64,
    /// Output format
    #[arg(short, long, value_enum, default_value_t = Format::Parquet)]
    format: Format,
    /// Output file. JSON goes to stdout when omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Series read ahead of aggregation, 0 to read and aggregate in lockstep
    #[arg(short, long, default_value_t = 0)]
    pipeline_depth: usize,
}

fn open_sink(opts: &Opts) -> Result<Box<dyn RecordSink>> {
    let sink: Box<dyn RecordSink> = match (opts.format, &opts.output) {
        (Format::Parquet, Some(path)) => {
            Box::new(ParquetSink::try_new(BufWriter::new(File::create(path)?))?)
        }
        (Format::Parquet, None) => bail!("parquet output requires --output"),
        (Format::Json, Some(path)) => Box::new(JsonSink::new(BufWriter::new(File::create(path)?))),
        (Format::Json, None) => Box::new(JsonSink::new(io::stdout())),
    };
    Ok(sink)
}

#[tokio::main]
async fn main() -> Result<()> {
    let opts: Opts = Opts::parse();

    std::env::set_var(
        "RUST_LOG",
        format!("parquet_export={level}", level = opts.level),
    );
    env_logger::init();

    let min_time = opts.min_time.unwrap_or(0);
    let max_time = opts
        .max_time
        .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
    let sink = open_sink(&opts)?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling export");
                cancel.cancel();
            }
        }
    });

    let options = ExportOptions {
        window_ms: opts.window,
        pipeline_depth: opts.pipeline_depth,
    };
    let stats = export(
        &opts.endpoint,
        &opts.matchers,
        min_time,
        max_time,
        sink,
        &options,
        &cancel,
    )
    .await?;
    info!(
        "done: {} series, {} samples, {} rows",
        stats.series, stats.samples, stats.rows
    );
    Ok(())
}

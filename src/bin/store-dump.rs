use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use parquet_export::chunkenc::{ChunkDecoder, DecodeError, Encoding, Sample, StandardDecoder};
use parquet_export::matcher::convert_label_matchers;
use parquet_export::store::{Label, Series, SeriesRequest, SeriesStream};
use parquet_export::utils::{labels_to_string, parse_timestamp};
use parquet_export::Matcher;

/// Print the raw series a Thanos store returns, one JSON object per line.
#[derive(Debug, Clone, Parser)]
#[command(version, author)]
struct Opts {
    /// Debug level
    #[arg(short, long, default_value = "info")]
    level: log::LevelFilter,
    /// Store API gRPC endpoint
    #[arg(short, long, default_value = "http://127.0.0.1:10901")]
    endpoint: String,
    /// Series selector, may be repeated
    #[arg(short, long = "matcher", default_value = r#"__name__!="""#)]
    matchers: Vec<Matcher>,
    /// Range start, milliseconds or RFC 3339
    #[arg(long, value_parser = parse_timestamp, default_value = "0")]
    min_time: i64,
    /// Range end, milliseconds or RFC 3339. Defaults to now.
    #[arg(long, value_parser = parse_timestamp)]
    max_time: Option<i64>,
    /// Output json, stdout when omitted
    json: Option<PathBuf>,
    /// Pretty print
    #[arg(short, long)]
    pretty: bool,
}

#[derive(Debug, serde::Serialize)]
struct DumpedSeries<'a> {
    labels: &'a [Label],
    samples: Vec<Sample>,
}

fn decode_series(series: &Series) -> Result<Vec<Sample>> {
    let mut samples = Vec::new();
    for (index, chunk) in series.chunks.iter().enumerate() {
        let decoded = chunk
            .raw
            .as_ref()
            .ok_or(DecodeError::MissingRaw)
            .and_then(|raw| {
                StandardDecoder
                    .decode(Encoding::from_wire(raw.r#type)?, &raw.data)?
                    .collect::<Result<Vec<_>, _>>()
            })
            .with_context(|| {
                format!("chunk {} of {}", index, labels_to_string(&series.labels))
            })?;
        samples.extend(decoded);
    }
    Ok(samples)
}

#[tokio::main]
async fn main() -> Result<()> {
    let opts = Opts::parse();
    std::env::set_var(
        "RUST_LOG",
        format!("parquet_export={level},store_dump={level}", level = opts.level),
    );
    env_logger::init();

    let request = SeriesRequest {
        min_time: opts.min_time,
        max_time: opts
            .max_time
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
        matchers: convert_label_matchers(&opts.matchers)?,
        ..Default::default()
    };
    let mut output: Box<dyn Write> = match &opts.json {
        None => Box::new(io::stdout()),
        Some(path) => Box::new(io::BufWriter::new(std::fs::File::create(path)?)),
    };

    let mut stream = SeriesStream::open(&opts.endpoint, request).await?;
    while let Some(series) = stream.next_series().await? {
        let dumped = DumpedSeries {
            labels: &series.labels,
            samples: decode_series(&series)?,
        };
        if opts.pretty {
            serde_json::to_writer_pretty(&mut output, &dumped)?;
        } else {
            serde_json::to_writer(&mut output, &dumped)?;
        }
        writeln!(output)?;
    }
    output.flush()?;
    log::info!("dumped {} series", stream.series_count());
    Ok(())
}

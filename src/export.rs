use futures::Stream;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::Status;

use crate::aggregate::{aggregate_series, DEFAULT_WINDOW_MS};
use crate::chunkenc::StandardDecoder;
use crate::emit::{Emitter, RecordSink, SeriesLabels};
use crate::matcher::{convert_label_matchers, Matcher};
use crate::store::{Series, SeriesRequest, SeriesResponse, SeriesStream};
use crate::utils::labels_to_string;
use crate::ExportError;

#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Aggregation window length in milliseconds.
    pub window_ms: i64,
    /// Series buffered between the stream reader and the aggregator.
    /// Zero reads and aggregates in lockstep.
    pub pipeline_depth: usize,
}

impl Default for ExportOptions {
    fn default() -> Self {
        ExportOptions {
            window_ms: DEFAULT_WINDOW_MS,
            pipeline_depth: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ExportStats {
    pub series: usize,
    pub samples: u64,
    pub rows: u64,
}

/// Stream series matching `matchers` in `[min_time, max_time)` from the store at
/// `endpoint`, and write their windowed aggregations to `sink`.
pub async fn export<S: RecordSink>(
    endpoint: &str,
    matchers: &[Matcher],
    min_time: i64,
    max_time: i64,
    sink: S,
    options: &ExportOptions,
    cancel: &CancellationToken,
) -> Result<ExportStats, ExportError> {
    if min_time > max_time {
        return Err(ExportError::InvalidTimeRange {
            min: min_time,
            max: max_time,
        });
    }
    check_window(options)?;
    let request = SeriesRequest {
        min_time,
        max_time,
        matchers: convert_label_matchers(matchers)?,
        ..Default::default()
    };
    let stream = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Err(ExportError::Cancelled),
        stream = SeriesStream::open(endpoint, request) => stream?,
    };
    export_stream(stream, sink, options, cancel).await
}

/// Aggregate an already opened series stream into `sink`.
pub async fn export_stream<F, S>(
    stream: SeriesStream<F>,
    sink: S,
    options: &ExportOptions,
    cancel: &CancellationToken,
) -> Result<ExportStats, ExportError>
where
    F: Stream<Item = Result<SeriesResponse, Status>> + Unpin + Send + 'static,
    S: RecordSink,
{
    check_window(options)?;
    let emitter = Emitter::new(sink);
    let stats = if options.pipeline_depth == 0 {
        sequential(stream, emitter, options, cancel).await?
    } else {
        pipelined(stream, emitter, options, cancel).await?
    };
    info!(
        "exported {} series, {} samples, {} rows",
        stats.series, stats.samples, stats.rows
    );
    Ok(stats)
}

fn check_window(options: &ExportOptions) -> Result<(), ExportError> {
    if options.window_ms <= 0 {
        return Err(ExportError::InvalidWindow(options.window_ms));
    }
    Ok(())
}

async fn sequential<F, S>(
    mut stream: SeriesStream<F>,
    mut emitter: Emitter<S>,
    options: &ExportOptions,
    cancel: &CancellationToken,
) -> Result<ExportStats, ExportError>
where
    F: Stream<Item = Result<SeriesResponse, Status>> + Unpin,
    S: RecordSink,
{
    let mut samples = 0;
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("export cancelled after {} series", stream.series_count());
                return Err(ExportError::Cancelled);
            }
            next = stream.next_series() => next?,
        };
        match next {
            Some(series) => samples += emit_series(&series, &mut emitter, options.window_ms)?,
            None => break,
        }
    }
    let (rows, _) = emitter.finish()?;
    Ok(ExportStats {
        series: stream.series_count(),
        samples,
        rows,
    })
}

/// Reads the stream on a separate task so the next series is fetched while
/// the current one is aggregated. Series are still aggregated one at a time,
/// in stream order.
async fn pipelined<F, S>(
    stream: SeriesStream<F>,
    mut emitter: Emitter<S>,
    options: &ExportOptions,
    cancel: &CancellationToken,
) -> Result<ExportStats, ExportError>
where
    F: Stream<Item = Result<SeriesResponse, Status>> + Unpin + Send + 'static,
    S: RecordSink,
{
    let (tx, mut rx) = mpsc::channel(options.pipeline_depth);
    let stop = cancel.child_token();
    let reader = tokio::spawn(read_series(stream, tx, stop.clone()));

    let mut series = 0;
    let mut samples = 0;
    let result = loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("export cancelled after {} series", series);
                break Err(ExportError::Cancelled);
            }
            next = rx.recv() => next,
        };
        match next {
            Some(Ok(s)) => {
                series += 1;
                match emit_series(&s, &mut emitter, options.window_ms) {
                    Ok(n) => samples += n,
                    Err(err) => break Err(err),
                }
            }
            Some(Err(err)) => break Err(err),
            None => break Ok(()),
        }
    };

    // Drop the call on early exit; on success the reader has already finished.
    stop.cancel();
    drop(rx);
    if let Err(err) = reader.await {
        error!("series reader task failed: {}", err);
    }
    result?;

    let (rows, _) = emitter.finish()?;
    Ok(ExportStats {
        series,
        samples,
        rows,
    })
}

async fn read_series<F>(
    mut stream: SeriesStream<F>,
    tx: mpsc::Sender<Result<Series, ExportError>>,
    stop: CancellationToken,
) where
    F: Stream<Item = Result<SeriesResponse, Status>> + Unpin,
{
    loop {
        let next = tokio::select! {
            biased;
            _ = stop.cancelled() => return,
            next = stream.next_series() => next,
        };
        let (item, last) = match next {
            Ok(Some(series)) => (Ok(series), false),
            Ok(None) => return,
            Err(err) => (Err(err), true),
        };
        let sent = tokio::select! {
            biased;
            _ = stop.cancelled() => return,
            sent = tx.send(item) => sent.is_ok(),
        };
        if !sent || last {
            return;
        }
    }
}

fn emit_series<S: RecordSink>(
    series: &Series,
    emitter: &mut Emitter<S>,
    window_ms: i64,
) -> Result<u64, ExportError> {
    let labels = SeriesLabels::from_labels(&series.labels);
    let rows_before = emitter.rows();
    let samples = aggregate_series(series, &StandardDecoder, window_ms, |aggr| {
        emitter.emit(&labels, &aggr)?;
        Ok(())
    })?;
    emitter.end_series()?;
    debug!(
        "series {}: {} samples in {} windows",
        labels_to_string(&series.labels),
        samples,
        emitter.rows() - rows_before
    );
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Aggregation;
    use crate::chunkenc::DecodeError;
    use crate::emit::{JsonSink, ParquetSink, SinkError};
    use crate::matcher::MatchKind;
    use crate::store::{chunk, AggrChunk, Chunk};
    use crate::test::*;

    type Rows = Vec<(SeriesLabels, Aggregation)>;

    fn frame_stream(
        frames: Vec<SeriesResponse>,
    ) -> SeriesStream<futures::stream::Iter<std::vec::IntoIter<Result<SeriesResponse, Status>>>>
    {
        let frames: Vec<_> = frames.into_iter().map(Ok).collect();
        SeriesStream::new(futures::stream::iter(frames))
    }

    fn options(pipeline_depth: usize) -> ExportOptions {
        ExportOptions {
            pipeline_depth,
            ..Default::default()
        }
    }

    fn all_series() -> Vec<Matcher> {
        vec![Matcher::new(MatchKind::Neq, "__name__", "")]
    }

    fn row(
        target: &str,
        timestamp: i64,
        count: i64,
        sum: f64,
        min: f64,
        max: f64,
    ) -> (SeriesLabels, Aggregation) {
        (
            SeriesLabels {
                name: "continuous_app_metric0".into(),
                target: target.into(),
                cluster: "eu-1".into(),
                replica: "0".into(),
            },
            Aggregation {
                timestamp,
                count,
                sum,
                min,
                max,
            },
        )
    }

    fn expected_rows() -> Rows {
        vec![
            row("1", 300_000, 3, -1., -10., 10.),
            row("1", 720_000, 2, 0., -20., 20.),
            row("1", 1_200_000, 3, 24., -1., 15.),
            row("2", 300_000, 3, -99., -99., 10.),
            row("2", 720_000, 2, 0., -20., 20.),
            row("2", 1_200_000, 3, -74., -99., 15.),
        ]
    }

    /// Collects rows and cancels the export once the first series is done.
    struct CancelAfterFirstSeries {
        rows: Rows,
        cancel: CancellationToken,
    }

    impl RecordSink for CancelAfterFirstSeries {
        fn write(&mut self, labels: &SeriesLabels, aggr: &Aggregation) -> Result<(), SinkError> {
            self.rows.push((labels.clone(), *aggr));
            Ok(())
        }

        fn end_series(&mut self) -> Result<(), SinkError> {
            self.cancel.cancel();
            Ok(())
        }

        fn finish(&mut self) -> Result<(), SinkError> {
            panic!("a cancelled export must not finish the sink");
        }
    }

    /// Fails every write and records what the exporter asked of it.
    #[derive(Default)]
    struct FailingSink {
        writes: usize,
        finished: bool,
    }

    impl RecordSink for FailingSink {
        fn write(&mut self, _: &SeriesLabels, _: &Aggregation) -> Result<(), SinkError> {
            self.writes += 1;
            Err(SinkError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )))
        }

        fn finish(&mut self) -> Result<(), SinkError> {
            self.finished = true;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_parquet_export() {
        use arrow::array::{Array, Float64Array, Int64Array, StringArray, TimestampMillisecondArray};
        use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

        let store = MockStore {
            frames: fixture_frames(),
            ..Default::default()
        };
        let last_request = store.last_request.clone();
        let addr = serve(store).await;

        for depth in [0, 1, 4] {
            let mut buf = Vec::new();
            let stats = export(
                &addr.to_string(),
                &all_series(),
                0,
                1,
                ParquetSink::try_new(&mut buf).unwrap(),
                &options(depth),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
            assert_eq!(
                stats,
                ExportStats {
                    series: 2,
                    samples: 16,
                    rows: 6
                }
            );

            let request = last_request.lock().unwrap().clone().unwrap();
            assert_eq!((request.min_time, request.max_time), (0, 1));
            assert_eq!(request.matchers.len(), 1);
            assert_eq!(request.matchers[0].name, "__name__");
            assert_eq!(request.matchers[0].r#type, 1);

            let batches = ParquetRecordBatchReaderBuilder::try_new(bytes::Bytes::from(buf))
                .unwrap()
                .build()
                .unwrap()
                .collect::<Result<Vec<_>, _>>()
                .unwrap();
            let mut rows = Rows::new();
            for batch in &batches {
                let string = |name: &str| {
                    batch
                        .column_by_name(name)
                        .unwrap()
                        .as_any()
                        .downcast_ref::<StringArray>()
                        .unwrap()
                        .clone()
                };
                let float = |name: &str| {
                    batch
                        .column_by_name(name)
                        .unwrap()
                        .as_any()
                        .downcast_ref::<Float64Array>()
                        .unwrap()
                        .clone()
                };
                let (names, targets, clusters, replicas) = (
                    string("__name__"),
                    string("__blockgen_target__"),
                    string("cluster"),
                    string("replica"),
                );
                let ts = batch
                    .column_by_name("_timestamp_millis")
                    .unwrap()
                    .as_any()
                    .downcast_ref::<TimestampMillisecondArray>()
                    .unwrap()
                    .clone();
                let counts = batch
                    .column_by_name("_count")
                    .unwrap()
                    .as_any()
                    .downcast_ref::<Int64Array>()
                    .unwrap()
                    .clone();
                let (sums, mins, maxs) = (float("_sum"), float("_min"), float("_max"));
                for i in 0..batch.num_rows() {
                    rows.push((
                        SeriesLabels {
                            name: names.value(i).into(),
                            target: targets.value(i).into(),
                            cluster: clusters.value(i).into(),
                            replica: replicas.value(i).into(),
                        },
                        Aggregation {
                            timestamp: ts.value(i),
                            count: counts.value(i),
                            sum: sums.value(i),
                            min: mins.value(i),
                            max: maxs.value(i),
                        },
                    ));
                }
                assert_eq!(ts.len(), batch.num_rows());
            }
            assert_eq!(rows, expected_rows(), "pipeline depth {}", depth);
        }
    }

    #[tokio::test]
    async fn test_export_is_deterministic() {
        let addr = serve(MockStore {
            frames: fixture_frames(),
            ..Default::default()
        })
        .await;
        let mut outputs = Vec::new();
        for _ in 0..2 {
            let mut buf = Vec::new();
            export(
                &addr.to_string(),
                &all_series(),
                0,
                1,
                JsonSink::new(&mut buf),
                &ExportOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
            outputs.push(buf);
        }
        assert!(!outputs[0].is_empty());
        assert_eq!(outputs[0], outputs[1]);
    }

    #[tokio::test]
    async fn test_warning_before_series() {
        for depth in [0, 2] {
            let mut frames = vec![warning_frame("store unavailable")];
            frames.extend(fixture_frames());
            let mut rows = Rows::new();
            let err = export_stream(
                frame_stream(frames),
                &mut rows,
                &options(depth),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
            assert!(matches!(err, ExportError::Warning(ref w) if w == "store unavailable"));
            assert!(rows.is_empty());
        }
    }

    #[tokio::test]
    async fn test_warning_over_grpc() {
        let addr = serve(MockStore {
            frames: vec![warning_frame("partial response")],
            ..Default::default()
        })
        .await;
        let mut rows = Rows::new();
        let err = export(
            &format!("http://{}", addr),
            &all_series(),
            0,
            1,
            &mut rows,
            &ExportOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ExportError::Warning(_)));
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_decode_error_has_context() {
        let mut frames = fixture_frames();
        frames.push(series_frame(
            labels(&[("__name__", "broken")]),
            vec![
                chunk_from_samples(&[(0, 1.)]),
                AggrChunk {
                    raw: Some(Chunk {
                        r#type: chunk::Encoding::Xor as i32,
                        data: vec![0, 3, 0x80],
                    }),
                    ..Default::default()
                },
            ],
        ));
        for depth in [0, 3] {
            let mut rows = Rows::new();
            let err = export_stream(
                frame_stream(frames.clone()),
                &mut rows,
                &options(depth),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
            match err {
                ExportError::Decode {
                    labels,
                    chunk,
                    source: DecodeError::Truncated,
                } => {
                    assert_eq!(labels, r#"{__name__="broken"}"#);
                    assert_eq!(chunk, 1);
                }
                other => panic!("unexpected error {:?}", other),
            }
            // Series before the broken one were already written.
            assert_eq!(rows, expected_rows());
        }
    }

    #[tokio::test]
    async fn test_unsupported_encoding_and_missing_raw() {
        let bad = [
            AggrChunk {
                raw: Some(Chunk {
                    r#type: 5,
                    data: vec![],
                }),
                ..Default::default()
            },
            AggrChunk::default(),
        ];
        for chunk in bad {
            let frames = vec![series_frame(labels(&[("__name__", "x")]), vec![chunk])];
            let err = export_stream(
                frame_stream(frames),
                Rows::new(),
                &ExportOptions::default(),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
            assert!(matches!(
                err,
                ExportError::Decode {
                    source: DecodeError::UnsupportedEncoding(5) | DecodeError::MissingRaw,
                    ..
                }
            ));
        }
    }

    #[tokio::test]
    async fn test_sink_error_stops_export() {
        for depth in [0, 2] {
            let mut sink = FailingSink::default();
            let err = export_stream(
                frame_stream(fixture_frames()),
                &mut sink,
                &options(depth),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
            assert!(
                matches!(err, ExportError::Sink(SinkError::Io(ref e)) if e.to_string() == "disk full"),
                "depth {}: {:?}",
                depth,
                err
            );
            assert_eq!(sink.writes, 1, "depth {}", depth);
            assert!(!sink.finished, "depth {}", depth);
        }
    }

    #[tokio::test]
    async fn test_cancel_between_series() {
        for depth in [0, 1] {
            let cancel = CancellationToken::new();
            let mut sink = CancelAfterFirstSeries {
                rows: Rows::new(),
                cancel: cancel.clone(),
            };
            let err = export_stream(
                frame_stream(fixture_frames()),
                &mut sink,
                &options(depth),
                &cancel,
            )
            .await
            .unwrap_err();
            assert!(matches!(err, ExportError::Cancelled));
            assert_eq!(sink.rows, expected_rows()[..3].to_vec());
        }
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_on_stream() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let stream =
            SeriesStream::new(futures::stream::pending::<Result<SeriesResponse, Status>>());
        let err = export_stream(stream, Rows::new(), &ExportOptions::default(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Cancelled));

        let err = export(
            "127.0.0.1:1",
            &all_series(),
            0,
            1,
            Rows::new(),
            &ExportOptions::default(),
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ExportError::Cancelled));
    }

    #[tokio::test]
    async fn test_rejects_bad_input() {
        let cancel = CancellationToken::new();
        let err = export(
            "127.0.0.1:1",
            &all_series(),
            10,
            1,
            Rows::new(),
            &ExportOptions::default(),
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ExportError::InvalidTimeRange { min: 10, max: 1 }));

        for window_ms in [0, -DEFAULT_WINDOW_MS] {
            let options = ExportOptions {
                window_ms,
                ..Default::default()
            };
            let err = export(
                "127.0.0.1:1",
                &all_series(),
                0,
                1,
                Rows::new(),
                &options,
                &cancel,
            )
            .await
            .unwrap_err();
            assert!(matches!(err, ExportError::InvalidWindow(w) if w == window_ms));

            let mut rows = Rows::new();
            let err = export_stream(frame_stream(fixture_frames()), &mut rows, &options, &cancel)
                .await
                .unwrap_err();
            assert!(matches!(err, ExportError::InvalidWindow(_)));
            assert!(rows.is_empty());
        }

        let matchers = vec![Matcher::new(MatchKind::Re, "__name__", "(")];
        let err = export(
            "127.0.0.1:1",
            &matchers,
            0,
            1,
            Rows::new(),
            &ExportOptions::default(),
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ExportError::InvalidMatcher(_)));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = export(
            &addr.to_string(),
            &all_series(),
            0,
            1,
            Rows::new(),
            &ExportOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ExportError::Connect { .. }), "{:?}", err);
    }

    #[tokio::test]
    async fn test_empty_stream() {
        let stats = export_stream(
            frame_stream(vec![]),
            Rows::new(),
            &options(2),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(stats, ExportStats::default());
    }
}

use futures::{Stream, StreamExt};
use log::{debug, info, trace, warn};
use tonic::codec::Streaming;
use tonic::Status;

use super::series_response::Result as Frame;
use super::store_client::StoreClient;
use super::{Series, SeriesRequest, SeriesResponse};
use crate::ExportError;

pub type StoreStreaming = Streaming<SeriesResponse>;

/// Incremental reader over the frames of one `Series` call.
///
/// Series are handed out one at a time; the first warning frame ends the
/// stream with [`ExportError::Warning`].
pub struct SeriesStream<S = StoreStreaming> {
    frames: S,
    series: usize,
    finished: bool,
}

impl SeriesStream<StoreStreaming> {
    /// Dial `endpoint` and open the server-streaming call.
    pub async fn open(endpoint: &str, request: SeriesRequest) -> Result<Self, ExportError> {
        let endpoint = if endpoint.contains("://") {
            endpoint.to_string()
        } else {
            format!("http://{}", endpoint)
        };
        info!(
            "open series stream to {}, time range [{}, {}], {} matchers",
            endpoint,
            request.min_time,
            request.max_time,
            request.matchers.len()
        );
        let client = StoreClient::connect(endpoint.clone())
            .await
            .map_err(|source| ExportError::Connect { endpoint, source })?;
        let frames = client
            .max_decoding_message_size(usize::MAX)
            .series(request)
            .await
            .map_err(ExportError::Stream)?
            .into_inner();
        Ok(SeriesStream::new(frames))
    }
}

impl<S> SeriesStream<S>
where
    S: Stream<Item = Result<SeriesResponse, Status>> + Unpin,
{
    pub fn new(frames: S) -> Self {
        SeriesStream {
            frames,
            series: 0,
            finished: false,
        }
    }

    /// Series received so far.
    pub fn series_count(&self) -> usize {
        self.series
    }

    /// Read the next series, `Ok(None)` once the stream is exhausted.
    pub async fn next_series(&mut self) -> Result<Option<Series>, ExportError> {
        if self.finished {
            return Ok(None);
        }
        loop {
            let frame = match self.frames.next().await {
                None => {
                    debug!("series stream finished after {} series", self.series);
                    self.finished = true;
                    return Ok(None);
                }
                Some(Err(status)) => {
                    self.finished = true;
                    return Err(ExportError::Stream(status));
                }
                Some(Ok(SeriesResponse { result })) => result,
            };
            match frame {
                Some(Frame::Series(series)) => {
                    self.series += 1;
                    trace!(
                        "received series #{} with {} chunks",
                        self.series,
                        series.chunks.len()
                    );
                    return Ok(Some(series));
                }
                Some(Frame::Warning(warning)) => {
                    warn!("store returned warning: {}", warning);
                    self.finished = true;
                    return Err(ExportError::Warning(warning));
                }
                None => trace!("skip empty frame"),
            }
        }
    }
}

#[cfg(test)]
fn frames(
    frames: Vec<Result<SeriesResponse, Status>>,
) -> SeriesStream<futures::stream::Iter<std::vec::IntoIter<Result<SeriesResponse, Status>>>> {
    SeriesStream::new(futures::stream::iter(frames))
}

#[cfg(test)]
fn series_frame(name: &str) -> Result<SeriesResponse, Status> {
    Ok(SeriesResponse {
        result: Some(Frame::Series(Series {
            labels: vec![super::Label {
                name: "__name__".into(),
                value: name.into(),
            }],
            chunks: vec![],
        })),
    })
}

#[tokio::test]
async fn test_series_then_end() {
    let mut stream = frames(vec![
        series_frame("a"),
        Ok(SeriesResponse { result: None }),
        series_frame("b"),
    ]);
    assert_eq!(stream.next_series().await.unwrap().unwrap().labels[0].value, "a");
    assert_eq!(stream.next_series().await.unwrap().unwrap().labels[0].value, "b");
    assert!(stream.next_series().await.unwrap().is_none());
    assert!(stream.next_series().await.unwrap().is_none());
    assert_eq!(stream.series_count(), 2);
}

#[tokio::test]
async fn test_warning_stops_stream() {
    let mut stream = frames(vec![
        series_frame("a"),
        Ok(SeriesResponse {
            result: Some(Frame::Warning("partial response".into())),
        }),
        series_frame("b"),
    ]);
    assert!(stream.next_series().await.unwrap().is_some());
    match stream.next_series().await {
        Err(ExportError::Warning(w)) => assert_eq!(w, "partial response"),
        other => panic!("expected warning, got {:?}", other),
    }
    assert!(stream.next_series().await.unwrap().is_none());
    assert_eq!(stream.series_count(), 1);
}

#[tokio::test]
async fn test_status_is_stream_error() {
    let mut stream = frames(vec![Err(Status::unavailable("store down"))]);
    assert!(matches!(
        stream.next_series().await,
        Err(ExportError::Stream(status)) if status.code() == tonic::Code::Unavailable
    ));
}

use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use futures::Stream;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{Request, Response, Status};

use crate::chunkenc::XorChunk;
use crate::store::series_response::Result as Frame;
use crate::store::store_server::{Store, StoreServer};
use crate::store::{chunk, AggrChunk, Chunk, Label, Series, SeriesRequest, SeriesResponse};

/// Store that replays fixed frames and remembers the last request.
#[derive(Default)]
pub struct MockStore {
    pub frames: Vec<SeriesResponse>,
    pub last_request: Arc<Mutex<Option<SeriesRequest>>>,
}

#[tonic::async_trait]
impl Store for MockStore {
    type SeriesStream = Pin<Box<dyn Stream<Item = Result<SeriesResponse, Status>> + Send>>;

    async fn series(
        &self,
        request: Request<SeriesRequest>,
    ) -> Result<Response<Self::SeriesStream>, Status> {
        *self.last_request.lock().unwrap() = Some(request.into_inner());
        let frames = self.frames.clone().into_iter().map(Ok);
        Ok(Response::new(Box::pin(futures::stream::iter(frames))))
    }
}

/// Serve `store` on an ephemeral localhost port for the lifetime of the test runtime.
pub async fn serve(store: MockStore) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(
        tonic::transport::Server::builder()
            .add_service(StoreServer::new(store))
            .serve_with_incoming(TcpListenerStream::new(listener)),
    );
    addr
}

pub fn labels(pairs: &[(&str, &str)]) -> Vec<Label> {
    pairs
        .iter()
        .map(|(name, value)| Label {
            name: name.to_string(),
            value: value.to_string(),
        })
        .collect()
}

pub fn chunk_from_samples(samples: &[(i64, f64)]) -> AggrChunk {
    let mut xor = XorChunk::new();
    for (t, v) in samples {
        xor.append(*t, *v);
    }
    AggrChunk {
        min_time: samples.first().map(|s| s.0).unwrap_or_default(),
        max_time: samples.last().map(|s| s.0).unwrap_or_default(),
        raw: Some(Chunk {
            r#type: chunk::Encoding::Xor as i32,
            data: xor.into_bytes(),
        }),
    }
}

pub fn series_frame(labels: Vec<Label>, chunks: Vec<AggrChunk>) -> SeriesResponse {
    SeriesResponse {
        result: Some(Frame::Series(Series { labels, chunks })),
    }
}

pub fn warning_frame(warning: &str) -> SeriesResponse {
    SeriesResponse {
        result: Some(Frame::Warning(warning.to_string())),
    }
}

/// The two-series fixture used across export tests: 16 samples that fold
/// into three 5m windows per series.
pub fn fixture_frames() -> Vec<SeriesResponse> {
    const M: i64 = 60 * 1000;
    [("1", -1.), ("2", -99.)]
        .iter()
        .map(|(target, first)| {
            series_frame(
                labels(&[
                    ("__blockgen_target__", *target),
                    ("__name__", "continuous_app_metric0"),
                    ("cluster", "eu-1"),
                    ("replica", "0"),
                ]),
                vec![
                    chunk_from_samples(&[
                        (0, *first),
                        (2 * M, 10.),
                        (5 * M, -10.),
                        (7 * M, 20.),
                        (10 * M, -20.),
                        (15 * M, 15.),
                    ]),
                    chunk_from_samples(&[(17 * M, *first), (20 * M, 10.)]),
                ],
            )
        })
        .collect()
}

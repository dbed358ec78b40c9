//! Client side of the store API `Series` call.

#[cfg(feature = "protoc")]
mod types {
    include!(concat!(env!("OUT_DIR"), "/thanos.rs"));
}
#[cfg(not(feature = "protoc"))]
mod types;
mod stream;

pub use stream::{SeriesStream, StoreStreaming};
pub use types::*;

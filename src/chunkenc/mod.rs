mod bstream;
mod xor;

use thiserror::Error;

pub use xor::{XorChunk, XorIterator};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unsupported chunk encoding {0}")]
    UnsupportedEncoding(i32),
    #[error("chunk has no raw data")]
    MissingRaw,
    #[error("chunk data truncated")]
    Truncated,
    #[error("corrupted chunk: {0}")]
    Corrupted(String),
}

/// One decoded (timestamp, value) pair, timestamp in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Sample {
    pub timestamp: i64,
    pub value: f64,
}

/// Chunk encodings as numbered by the storage engine.
///
/// The store API numbers the same encodings from zero, see [`Encoding::from_wire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Encoding {
    None = 0,
    Xor = 1,
}

impl Encoding {
    pub fn from_wire(tag: i32) -> Result<Self, DecodeError> {
        match tag.checked_add(1) {
            Some(1) => Ok(Encoding::Xor),
            _ => Err(DecodeError::UnsupportedEncoding(tag)),
        }
    }
}

pub type SampleIter<'a> = Box<dyn Iterator<Item = Result<Sample, DecodeError>> + Send + 'a>;

/// Turns raw chunk bytes into an ordered, forward-only sample sequence.
pub trait ChunkDecoder: Send + Sync {
    fn decode<'a>(&self, encoding: Encoding, data: &'a [u8]) -> Result<SampleIter<'a>, DecodeError>;
}

/// Decoder for the encodings the store API can carry.
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardDecoder;

impl ChunkDecoder for StandardDecoder {
    fn decode<'a>(&self, encoding: Encoding, data: &'a [u8]) -> Result<SampleIter<'a>, DecodeError> {
        match encoding {
            Encoding::Xor => Ok(Box::new(XorIterator::new(data)?)),
            Encoding::None => Err(DecodeError::UnsupportedEncoding(encoding as i32)),
        }
    }
}

#[test]
fn test_encoding_from_wire() {
    assert_eq!(Encoding::from_wire(0).unwrap(), Encoding::Xor);
    assert!(matches!(
        Encoding::from_wire(1),
        Err(DecodeError::UnsupportedEncoding(1))
    ));
    assert!(Encoding::from_wire(i32::MAX).is_err());
}

#[test]
fn test_standard_decoder() {
    let mut chunk = XorChunk::new();
    chunk.append(10, 1.);
    chunk.append(20, 2.);
    let samples = StandardDecoder
        .decode(Encoding::Xor, chunk.bytes())
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(
        samples,
        vec![
            Sample {
                timestamp: 10,
                value: 1.
            },
            Sample {
                timestamp: 20,
                value: 2.
            },
        ]
    );
    assert!(StandardDecoder.decode(Encoding::None, &[]).is_err());
}

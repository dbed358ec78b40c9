//! Prometheus XOR chunk: a 2-byte big-endian sample count followed by a
//! Gorilla-style bit stream (delta-of-delta timestamps, XOR'd float values).

use super::bstream::{BitReader, BitWriter};
use super::{DecodeError, Sample};

const HEADER_SIZE: usize = 2;

#[derive(Debug, Clone)]
pub struct XorChunk {
    stream: BitWriter,
    t: i64,
    v: f64,
    t_delta: i64,
    leading: u8,
    trailing: u8,
}

impl Default for XorChunk {
    fn default() -> Self {
        Self::new()
    }
}

impl XorChunk {
    pub fn new() -> Self {
        XorChunk {
            stream: BitWriter::from_bytes(vec![0; HEADER_SIZE]),
            t: 0,
            v: 0.,
            t_delta: 0,
            leading: 0xff,
            trailing: 0,
        }
    }

    pub fn num_samples(&self) -> u16 {
        let b = self.stream.bytes();
        u16::from_be_bytes([b[0], b[1]])
    }

    pub fn bytes(&self) -> &[u8] {
        self.stream.bytes()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.stream.bytes().to_vec()
    }

    /// Append a sample. Timestamps must be appended in increasing order and a
    /// chunk holds at most `u16::MAX` samples.
    pub fn append(&mut self, t: i64, v: f64) {
        let num = self.num_samples();
        match num {
            0 => {
                self.stream.write_varint(t);
                self.stream.write_bits(v.to_bits(), 64);
            }
            1 => {
                let t_delta = t - self.t;
                self.stream.write_uvarint(t_delta as u64);
                self.write_value_delta(v);
                self.t_delta = t_delta;
            }
            _ => {
                let t_delta = t - self.t;
                let dod = t_delta - self.t_delta;
                match dod {
                    0 => self.stream.write_bit(false),
                    dod if bit_range(dod, 14) => {
                        self.stream.write_bits(0b10, 2);
                        self.stream.write_bits(dod as u64, 14);
                    }
                    dod if bit_range(dod, 17) => {
                        self.stream.write_bits(0b110, 3);
                        self.stream.write_bits(dod as u64, 17);
                    }
                    dod if bit_range(dod, 20) => {
                        self.stream.write_bits(0b1110, 4);
                        self.stream.write_bits(dod as u64, 20);
                    }
                    dod => {
                        self.stream.write_bits(0b1111, 4);
                        self.stream.write_bits(dod as u64, 64);
                    }
                }
                self.write_value_delta(v);
                self.t_delta = t_delta;
            }
        }
        self.t = t;
        self.v = v;
        let header = num.wrapping_add(1).to_be_bytes();
        self.stream.bytes_mut()[..HEADER_SIZE].copy_from_slice(&header);
    }

    fn write_value_delta(&mut self, v: f64) {
        let delta = v.to_bits() ^ self.v.to_bits();
        if delta == 0 {
            self.stream.write_bit(false);
            return;
        }
        self.stream.write_bit(true);

        // 5 bits hold the leading zero count.
        let leading = (delta.leading_zeros() as u8).min(31);
        let trailing = delta.trailing_zeros() as u8;

        if self.leading != 0xff && leading >= self.leading && trailing >= self.trailing {
            self.stream.write_bit(false);
            let sigbits = 64 - self.leading - self.trailing;
            self.stream.write_bits(delta >> self.trailing, sigbits);
        } else {
            self.leading = leading;
            self.trailing = trailing;
            self.stream.write_bit(true);
            self.stream.write_bits(leading as u64, 5);
            // 64 significant bits do not fit in 6 bits and wrap to 0.
            let sigbits = 64 - leading - trailing;
            self.stream.write_bits(sigbits as u64, 6);
            self.stream.write_bits(delta >> trailing, sigbits);
        }
    }
}

fn bit_range(x: i64, nbits: u8) -> bool {
    -((1 << (nbits - 1)) - 1) <= x && x <= 1 << (nbits - 1)
}

/// Forward-only iterator over the samples of one XOR chunk.
#[derive(Debug, Clone)]
pub struct XorIterator<'a> {
    reader: BitReader<'a>,
    total: u16,
    read: u16,
    t: i64,
    v: u64,
    t_delta: i64,
    leading: u8,
    trailing: u8,
    failed: bool,
}

impl<'a> XorIterator<'a> {
    pub fn new(data: &'a [u8]) -> Result<Self, DecodeError> {
        if data.len() < HEADER_SIZE {
            return Err(DecodeError::Truncated);
        }
        Ok(XorIterator {
            reader: BitReader::new(&data[HEADER_SIZE..]),
            total: u16::from_be_bytes([data[0], data[1]]),
            read: 0,
            t: 0,
            v: 0,
            t_delta: 0,
            leading: 0,
            trailing: 0,
            failed: false,
        })
    }

    fn read_sample(&mut self) -> Result<Sample, DecodeError> {
        match self.read {
            0 => {
                self.t = self.reader.read_varint()?;
                self.v = self.reader.read_bits(64)?;
            }
            1 => {
                self.t_delta = self.reader.read_uvarint()? as i64;
                self.t = self.t.wrapping_add(self.t_delta);
                self.read_value()?;
            }
            _ => {
                let mut prefix = 0u8;
                for _ in 0..4 {
                    prefix <<= 1;
                    if !self.reader.read_bit()? {
                        break;
                    }
                    prefix |= 1;
                }
                let dod = match prefix {
                    0b0 => 0,
                    0b10 => self.read_dod(14)?,
                    0b110 => self.read_dod(17)?,
                    0b1110 => self.read_dod(20)?,
                    _ => self.reader.read_bits(64)? as i64,
                };
                self.t_delta = self.t_delta.wrapping_add(dod);
                self.t = self.t.wrapping_add(self.t_delta);
                self.read_value()?;
            }
        }
        self.read += 1;
        Ok(Sample {
            timestamp: self.t,
            value: f64::from_bits(self.v),
        })
    }

    fn read_dod(&mut self, size: u8) -> Result<i64, DecodeError> {
        let mut bits = self.reader.read_bits(size)? as i64;
        if bits > 1 << (size - 1) {
            bits -= 1 << size;
        }
        Ok(bits)
    }

    fn read_value(&mut self) -> Result<(), DecodeError> {
        if !self.reader.read_bit()? {
            return Ok(());
        }
        if self.reader.read_bit()? {
            self.leading = self.reader.read_bits(5)? as u8;
            let mut sigbits = self.reader.read_bits(6)? as u8;
            if sigbits == 0 {
                sigbits = 64;
            }
            if self.leading + sigbits > 64 {
                return Err(DecodeError::Corrupted(format!(
                    "{} leading zeros with {} significant bits",
                    self.leading, sigbits
                )));
            }
            self.trailing = 64 - self.leading - sigbits;
        }
        let sigbits = 64 - self.leading - self.trailing;
        let bits = self.reader.read_bits(sigbits)?;
        self.v ^= bits << self.trailing;
        Ok(())
    }
}

impl<'a> Iterator for XorIterator<'a> {
    type Item = Result<Sample, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.read >= self.total {
            return None;
        }
        let sample = self.read_sample();
        if sample.is_err() {
            self.failed = true;
        }
        Some(sample)
    }
}

#[cfg(test)]
fn samples(data: &[u8]) -> Vec<(i64, f64)> {
    XorIterator::new(data)
        .unwrap()
        .map(|s| s.map(|s| (s.timestamp, s.value)).unwrap())
        .collect()
}

#[test]
fn test_xor_chunk_samples() {
    // Exercises every delta-of-delta bucket plus repeated and changing values.
    let input = vec![
        (1_000, 1.5),
        (16_000, 1.5),
        (31_000, 2.25),
        (31_500, -7.0),
        (100_000, -7.0),
        (250_000, 1e300),
        (900_000, f64::MIN_POSITIVE),
        (10_000_000_000, 0.),
        (10_000_000_001, 42.),
    ];
    let mut chunk = XorChunk::new();
    for (t, v) in &input {
        chunk.append(*t, *v);
    }
    assert_eq!(chunk.num_samples() as usize, input.len());
    assert_eq!(samples(chunk.bytes()), input);
}

#[test]
fn test_xor_negative_first_timestamp() {
    let mut chunk = XorChunk::new();
    chunk.append(-5_000, 3.);
    chunk.append(-4_000, 4.);
    assert_eq!(samples(chunk.bytes()), vec![(-5_000, 3.), (-4_000, 4.)]);
}

#[test]
fn test_xor_empty_and_truncated() {
    assert!(samples(XorChunk::new().bytes()).is_empty());
    assert!(matches!(XorIterator::new(&[0]), Err(DecodeError::Truncated)));

    let mut chunk = XorChunk::new();
    chunk.append(0, 1.);
    chunk.append(60_000, 2.);
    chunk.append(120_000, 5.);
    let bytes = chunk.bytes();
    let cut = &bytes[..bytes.len() - 1];
    let decoded: Vec<_> = XorIterator::new(cut).unwrap().collect();
    assert!(decoded.last().unwrap().is_err());
    assert_eq!(decoded.iter().filter(|s| s.is_err()).count(), 1);
}

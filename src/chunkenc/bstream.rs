//! MSB-first bit stream used by the XOR chunk format.

use super::DecodeError;

type Result<T> = std::result::Result<T, DecodeError>;

#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    stream: Vec<u8>,
    /// Bits still free in the last byte of `stream`.
    free: u8,
}

impl BitWriter {
    pub fn from_bytes(stream: Vec<u8>) -> Self {
        BitWriter { stream, free: 0 }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.stream
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.stream
    }

    pub fn write_bit(&mut self, bit: bool) {
        if self.free == 0 {
            self.stream.push(0);
            self.free = 8;
        }
        if bit {
            let last = self.stream.len() - 1;
            self.stream[last] |= 1 << (self.free - 1);
        }
        self.free -= 1;
    }

    /// Write the lowest `nbits` of `value`, most significant first.
    pub fn write_bits(&mut self, value: u64, nbits: u8) {
        for i in (0..nbits).rev() {
            self.write_bit((value >> i) & 1 == 1);
        }
    }

    pub fn write_byte(&mut self, byte: u8) {
        self.write_bits(byte as u64, 8);
    }

    pub fn write_uvarint(&mut self, mut value: u64) {
        while value >= 0x80 {
            self.write_byte(value as u8 | 0x80);
            value >>= 7;
        }
        self.write_byte(value as u8);
    }

    /// Zig-zag encoded signed varint.
    pub fn write_varint(&mut self, value: i64) {
        let mut ux = (value as u64) << 1;
        if value < 0 {
            ux = !ux;
        }
        self.write_uvarint(ux);
    }
}

#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    stream: &'a [u8],
    /// Absolute bit offset of the next read.
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(stream: &'a [u8]) -> Self {
        BitReader { stream, pos: 0 }
    }

    pub fn read_bit(&mut self) -> Result<bool> {
        Ok(self.read_bits(1)? == 1)
    }

    pub fn read_bits(&mut self, nbits: u8) -> Result<u64> {
        debug_assert!(nbits <= 64);
        let mut value = 0u64;
        let mut remaining = nbits;
        while remaining > 0 {
            let byte = *self.stream.get(self.pos / 8).ok_or(DecodeError::Truncated)?;
            let avail = 8 - (self.pos % 8) as u8;
            let take = avail.min(remaining);
            let bits = (byte >> (avail - take)) as u64 & ((1u64 << take) - 1);
            value = (value << take) | bits;
            self.pos += take as usize;
            remaining -= take;
        }
        Ok(value)
    }

    pub fn read_byte(&mut self) -> Result<u8> {
        Ok(self.read_bits(8)? as u8)
    }

    pub fn read_uvarint(&mut self) -> Result<u64> {
        let mut value = 0u64;
        let mut shift = 0u32;
        for i in 0..10 {
            let byte = self.read_byte()?;
            if byte < 0x80 {
                if i == 9 && byte > 1 {
                    break;
                }
                return Ok(value | (byte as u64) << shift);
            }
            value |= ((byte & 0x7f) as u64) << shift;
            shift += 7;
        }
        Err(DecodeError::Corrupted("varint overflows a 64-bit integer".into()))
    }

    pub fn read_varint(&mut self) -> Result<i64> {
        let ux = self.read_uvarint()?;
        let mut x = (ux >> 1) as i64;
        if ux & 1 != 0 {
            x = !x;
        }
        Ok(x)
    }
}

#[test]
fn test_bits_across_byte_boundaries() {
    let mut w = BitWriter::default();
    w.write_bit(true);
    w.write_bits(0b1011, 4);
    w.write_bits(0x1ffff, 17);
    w.write_varint(-300);
    w.write_uvarint(u64::MAX);

    let mut r = BitReader::new(w.bytes());
    assert!(r.read_bit().unwrap());
    assert_eq!(r.read_bits(4).unwrap(), 0b1011);
    assert_eq!(r.read_bits(17).unwrap(), 0x1ffff);
    assert_eq!(r.read_varint().unwrap(), -300);
    assert_eq!(r.read_uvarint().unwrap(), u64::MAX);
}

#[test]
fn test_read_past_end() {
    let mut r = BitReader::new(&[0xff]);
    assert_eq!(r.read_bits(8).unwrap(), 0xff);
    assert!(matches!(r.read_bit(), Err(DecodeError::Truncated)));
}

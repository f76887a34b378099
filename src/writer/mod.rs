//! Bit-addressed sink that mirrors `reader::BitReader`: the same MSB-first
//! composition, run in reverse. Generalizes a `BitWriter` built around a
//! single fixed `PgnBytes` buffer into one backed by a growable `Vec<u8>`,
//! and adds the measurement variant the engine needs for `measure()` and
//! length-determinant lookahead.
use alloc::string::String;
use alloc::vec::Vec;

use crate::error::WriterError;
use crate::reader::MASKS;

#[cfg(test)]
#[path = "tests.rs"]
mod tests;

/// Common write surface shared by `BitWriter` (produces bytes) and
/// `MeasuringWriter` (counts bits only). The record engine's `write_fields`
/// is written once against this trait and reused for both a real
/// serialization pass and a `measure()` pass.
pub trait BitSink {
    fn write(&mut self, value: u128, n: u32) -> Result<(), WriterError>;
    fn write_signed(&mut self, value: i128, n: u32) -> Result<(), WriterError>;
    fn write_float(&mut self, value: f64, width: u32) -> Result<(), WriterError>;
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), WriterError>;
    fn write_string(&mut self, s: &str, opts: StringWriteOptions) -> Result<(), WriterError>;
    fn bit_len(&self) -> usize;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StringWriteOptions {
    pub null_terminated: bool,
    #[cfg(feature = "utf16")]
    pub utf16: bool,
}

/// Growable byte-buffer bit sink.
#[derive(Debug, Default)]
pub struct BitWriter {
    buf: Vec<u8>,
    bit_len: usize,
    flush_threshold: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            bit_len: 0,
            flush_threshold: usize::MAX,
        }
    }

    /// `threshold` is a byte count past which `should_flush` starts
    /// returning true; draining itself is always explicit via
    /// `drain_ready`.
    pub fn with_flush_threshold(threshold: usize) -> Self {
        let mut w = Self::new();
        w.flush_threshold = threshold;
        w
    }

    fn write_bits_raw(&mut self, value: u128, n: u32) {
        let mut remaining = n;
        while remaining > 0 {
            let bit_in_byte = (self.bit_len % 8) as u32;
            let space_in_byte = 8 - bit_in_byte;
            let take = space_in_byte.min(remaining);
            let shift = remaining - take;
            let chunk_bits = ((value >> shift) & MASKS[take as usize]) as u8;
            let byte_idx = self.bit_len / 8;
            if byte_idx == self.buf.len() {
                self.buf.push(0);
            }
            let dest_shift = space_in_byte - take;
            self.buf[byte_idx] |= chunk_bits << dest_shift;
            self.bit_len += take as usize;
            remaining -= take;
        }
    }

    /// Fully-written bytes available to drain; the trailing partial byte
    /// (if any) stays behind until it's completed.
    pub fn drain_ready(&mut self) -> Vec<u8> {
        let ready_bytes = self.bit_len / 8;
        let drained: Vec<u8> = self.buf.drain(0..ready_bytes).collect();
        self.bit_len -= ready_bytes * 8;
        drained
    }

    pub fn should_flush(&self) -> bool {
        self.buf.len() >= self.flush_threshold
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.bit_len = 0;
    }

    /// Consume the writer, returning the accumulated bytes. Any partial
    /// trailing byte is zero-padded (buffer bytes are always
    /// zero-initialized, so this requires no extra work).
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }
}

impl BitSink for BitWriter {
    fn write(&mut self, value: u128, n: u32) -> Result<(), WriterError> {
        if !(1..=128).contains(&n) {
            return Err(WriterError::TooLongForType { max: 128, asked: n });
        }
        self.write_bits_raw(value & MASKS[n as usize], n);
        Ok(())
    }

    fn write_signed(&mut self, value: i128, n: u32) -> Result<(), WriterError> {
        if !(1..=128).contains(&n) {
            return Err(WriterError::TooLongForType { max: 128, asked: n });
        }
        self.write_bits_raw((value as u128) & MASKS[n as usize], n);
        Ok(())
    }

    fn write_float(&mut self, value: f64, width: u32) -> Result<(), WriterError> {
        match width {
            32 => {
                self.write((value as f32).to_bits() as u128, 32)?;
                Ok(())
            }
            64 => {
                self.write(value.to_bits() as u128, 64)?;
                Ok(())
            }
            _ => Err(WriterError::InvalidFloatWidth { width }),
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), WriterError> {
        for &b in bytes {
            self.write(b as u128, 8)?;
        }
        Ok(())
    }

    fn write_string(&mut self, s: &str, opts: StringWriteOptions) -> Result<(), WriterError> {
        write_string_to(self, s, opts)
    }

    fn bit_len(&self) -> usize {
        self.bit_len
    }
}

/// Discards output, counts bits only. Used by `engine::measure` and by
/// length determinants that need "how many bits would this field take"
/// without materializing bytes.
#[derive(Debug, Default)]
pub struct MeasuringWriter {
    bit_len: usize,
}

impl MeasuringWriter {
    pub fn new() -> Self {
        Self { bit_len: 0 }
    }
}

impl BitSink for MeasuringWriter {
    fn write(&mut self, _value: u128, n: u32) -> Result<(), WriterError> {
        if !(1..=128).contains(&n) {
            return Err(WriterError::TooLongForType { max: 128, asked: n });
        }
        self.bit_len += n as usize;
        Ok(())
    }

    fn write_signed(&mut self, _value: i128, n: u32) -> Result<(), WriterError> {
        self.write(0, n)
    }

    fn write_float(&mut self, _value: f64, width: u32) -> Result<(), WriterError> {
        match width {
            32 | 64 => {
                self.bit_len += width as usize;
                Ok(())
            }
            _ => Err(WriterError::InvalidFloatWidth { width }),
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), WriterError> {
        self.bit_len += bytes.len() * 8;
        Ok(())
    }

    fn write_string(&mut self, s: &str, opts: StringWriteOptions) -> Result<(), WriterError> {
        let mut scratch = BitWriter::new();
        write_string_to(&mut scratch, s, opts)?;
        self.bit_len += scratch.bit_len();
        Ok(())
    }

    fn bit_len(&self) -> usize {
        self.bit_len
    }
}

fn write_string_to(
    sink: &mut impl BitSink,
    s: &str,
    opts: StringWriteOptions,
) -> Result<(), WriterError> {
    #[cfg(feature = "utf16")]
    if opts.utf16 {
        for unit in s.encode_utf16() {
            sink.write(unit as u128, 16)?;
        }
        if opts.null_terminated {
            sink.write(0, 16)?;
        }
        return Ok(());
    }
    sink.write_bytes(s.as_bytes())?;
    if opts.null_terminated {
        sink.write(0, 8)?;
    }
    Ok(())
}

/// Convenience used by the registry for building an encoded `String` copy
/// (e.g. padding/truncating against a declared byte length).
pub fn encode_utf8(s: &str) -> String {
    String::from(s)
}

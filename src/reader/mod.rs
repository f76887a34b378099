//! Bit-addressed cursor over a queue of byte buffers. Generalizes a
//! single-slice `BitReader` to a buffer-list-backed, resumable reader: bits
//! are composed
//! most-significant-bit-first within each byte ("network order"), chunks are
//! consumed lazily from the front unless the retain flag is set, and a short
//! read never mutates state — callers always see the cursor exactly where it
//! was before an attempt that couldn't be satisfied.
use alloc::collections::VecDeque;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;

use crate::error::ReaderError;


/// An immutable contiguous byte sequence supplied by the host. Reference
/// counted so pushing an already-owned buffer never copies it.
pub type Chunk = Rc<[u8]>;

/// Byte order for byte-aligned, whole-byte-multiple reads/writes. Unaligned
/// or non-byte-multiple reads are always MSB-first regardless of this
/// setting (see module docs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    #[default]
    BigEndian,
    LittleEndian,
}

/// String decoding options for `read_string`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringEncoding {
    Utf8,
    #[cfg(feature = "utf16")]
    Utf16Le,
    #[cfg(feature = "utf16")]
    Ucs2,
}

impl Default for StringEncoding {
    fn default() -> Self {
        StringEncoding::Utf8
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StringOptions {
    pub encoding: StringEncoding,
    pub null_terminated: bool,
}

impl Default for StringOptions {
    fn default() -> Self {
        Self {
            encoding: StringEncoding::Utf8,
            null_terminated: true,
        }
    }
}

const fn build_masks() -> [u128; 129] {
    let mut table = [0u128; 129];
    let mut i = 0;
    while i < 128 {
        table[i] = (1u128 << i) - 1;
        i += 1;
    }
    table[128] = u128::MAX;
    table
}

/// Masks `(1 << k) - 1` for k in [0, 128], precomputed once.
pub(crate) const MASKS: [u128; 129] = build_masks();

/// Bit-addressed cursor over a queue of byte buffers.
///
/// See the crate-level invariants: `global_offset = spent_bits +
/// bits_consumed_in_retained_chunks`, and `buffered_bits = (sum of queued
/// chunk bit lengths) - bits_already_consumed`.
#[derive(Debug)]
pub struct BitReader {
    chunks: VecDeque<Chunk>,
    /// Index of the chunk the cursor currently points into. Pinned at 0
    /// whenever `retain` is false.
    chunk_index: usize,
    /// Bit offset into `chunks[chunk_index]`, MSB-first.
    bit_in_chunk: usize,
    /// Bits consumed from chunks that have since been discarded.
    spent_bits: usize,
    /// Bits requested by `skip` but not yet materialized into the cursor.
    skip_pending: usize,
    retain: bool,
    ended: bool,
    outstanding: bool,
}

impl Default for BitReader {
    fn default() -> Self {
        Self::new()
    }
}

impl BitReader {
    /// Create an empty reader. Chunks are discarded as consumed (no rewind,
    /// no simulation) until `set_retain(true)` is called.
    pub fn new() -> Self {
        Self {
            chunks: VecDeque::new(),
            chunk_index: 0,
            bit_in_chunk: 0,
            spent_bits: 0,
            skip_pending: 0,
            retain: false,
            ended: false,
            outstanding: false,
        }
    }

    /// Create a reader that retains consumed chunks from the start, enabling
    /// `peek`/`simulate`/backward `set_offset` immediately.
    pub fn with_retain() -> Self {
        let mut r = Self::new();
        r.retain = true;
        r
    }

    pub fn retain(&self) -> bool {
        self.retain
    }

    pub fn set_retain(&mut self, retain: bool) {
        self.retain = retain;
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    //======================================================== chunk queue

    /// Enqueue a chunk. Illegal after `end()`.
    pub fn push(&mut self, chunk: impl Into<Chunk>) -> Result<(), ReaderError> {
        if self.ended {
            return Err(ReaderError::EndedReader);
        }
        self.chunks.push_back(chunk.into());
        Ok(())
    }

    /// Signal that no more input will ever be pushed.
    pub fn end(&mut self) {
        self.ended = true;
    }

    //======================================================== outstanding-read guard

    /// Used by resumable/async wrappers to enforce the outstanding-read
    /// invariant: at most one suspension in flight per reader.
    pub fn begin_suspension(&mut self) -> Result<(), ReaderError> {
        if self.outstanding {
            return Err(ReaderError::OutstandingRead);
        }
        self.outstanding = true;
        Ok(())
    }

    pub fn end_suspension(&mut self) {
        self.outstanding = false;
    }

    //======================================================== skip materialization

    fn current_chunk_bits_remaining(&self) -> Option<usize> {
        self.chunks
            .get(self.chunk_index)
            .map(|c| c.len() * 8 - self.bit_in_chunk)
    }

    fn drop_or_advance_one_chunk(&mut self) {
        if self.retain {
            self.chunk_index += 1;
        } else if let Some(front) = self.chunks.pop_front() {
            self.spent_bits += front.len() * 8;
        }
        self.bit_in_chunk = 0;
    }

    /// Drops whole chunks lying entirely inside the pending skip, then folds
    /// the remainder into `bit_in_chunk`. Lets `skip` be O(1) regardless of
    /// distance until the next read actually needs the cursor to be exact.
    fn materialize_skip(&mut self) {
        while self.skip_pending > 0 {
            let Some(remaining_here) = self.current_chunk_bits_remaining() else {
                break;
            };
            if self.skip_pending >= remaining_here {
                self.skip_pending -= remaining_here;
                self.drop_or_advance_one_chunk();
            } else {
                self.bit_in_chunk += self.skip_pending;
                self.skip_pending = 0;
            }
        }
    }

    /// Lazily advance the cursor by `n` bits; materialized on the next read.
    pub fn skip(&mut self, n: usize) {
        self.skip_pending += n;
    }

    //======================================================== position & availability

    fn raw_available_from_cursor(&self) -> usize {
        let mut total = 0usize;
        for (i, c) in self.chunks.iter().enumerate() {
            if i < self.chunk_index {
                continue;
            }
            total += c.len() * 8;
        }
        total - self.bit_in_chunk
    }

    /// Bits buffered beyond the cursor.
    pub fn available(&mut self) -> usize {
        self.materialize_skip();
        self.raw_available_from_cursor()
    }

    pub fn is_available(&mut self, n: usize) -> bool {
        self.available() >= n
    }

    fn offset_raw(&self) -> usize {
        let mut consumed = 0usize;
        for (i, c) in self.chunks.iter().enumerate() {
            if i >= self.chunk_index {
                break;
            }
            consumed += c.len() * 8;
        }
        self.spent_bits + consumed + self.bit_in_chunk
    }

    /// Global bit offset from the start of the stream.
    pub fn offset(&mut self) -> usize {
        self.materialize_skip();
        self.offset_raw()
    }

    /// Move the cursor to an absolute bit offset. Rejects offsets below
    /// `spent_bits`, and rejects any backward move unless `retain` is set.
    pub fn set_offset(&mut self, pos: usize) -> Result<(), ReaderError> {
        self.materialize_skip();
        let cur = self.offset_raw();
        if pos >= cur {
            self.skip(pos - cur);
            self.materialize_skip();
            return Ok(());
        }
        if pos < self.spent_bits || !self.retain {
            return Err(ReaderError::InvalidOffset {
                requested: pos,
                floor: self.spent_bits,
            });
        }
        let mut remaining = pos - self.spent_bits;
        let mut idx = 0;
        while idx < self.chunks.len() {
            let len_bits = self.chunks[idx].len() * 8;
            if remaining < len_bits {
                break;
            }
            remaining -= len_bits;
            idx += 1;
        }
        self.chunk_index = idx;
        self.bit_in_chunk = remaining;
        Ok(())
    }

    /// Discard up to `k` fully-consumed chunks. Only meaningful when
    /// `retain` is set (chunks are discarded automatically otherwise).
    pub fn clean(&mut self, k: usize) {
        if !self.retain {
            return;
        }
        let n = k.min(self.chunk_index);
        for _ in 0..n {
            if let Some(front) = self.chunks.pop_front() {
                self.spent_bits += front.len() * 8;
                self.chunk_index -= 1;
            }
        }
    }

    /// Clear all position/buffer state. Illegal while a suspension is
    /// outstanding.
    pub fn reset(&mut self) -> Result<(), ReaderError> {
        if self.outstanding {
            return Err(ReaderError::OutstandingRead);
        }
        self.chunks.clear();
        self.chunk_index = 0;
        self.bit_in_chunk = 0;
        self.spent_bits = 0;
        self.skip_pending = 0;
        self.ended = false;
        Ok(())
    }

    /// Run `f` with `retain` forced on; restores the cursor offset and the
    /// original retain flag unconditionally, even if `f` reads.
    pub fn simulate<F, R>(&mut self, f: F) -> R
    where
        F: FnOnce(&mut Self) -> R,
    {
        self.materialize_skip();
        let saved_offset = self.offset_raw();
        let saved_retain = self.retain;
        self.retain = true;
        let result = f(self);
        let _ = self.set_offset(saved_offset);
        self.retain = saved_retain;
        result
    }

    //======================================================== raw bit composition

    /// Extract `n` bits starting at the cursor, MSB-first across byte and
    /// chunk boundaries, optionally advancing the cursor. Caller must have
    /// already confirmed `available() >= n`; this never fails.
    fn read_bits_raw(&mut self, n: u32, advance: bool) -> u128 {
        let mut result: u128 = 0;
        let mut got: u32 = 0;
        let mut ci = self.chunk_index;
        let mut bo = self.bit_in_chunk;
        while got < n {
            let chunk = &self.chunks[ci];
            let byte_idx = bo / 8;
            let bit_off = (bo % 8) as u32;
            let byte = chunk[byte_idx];
            let bits_avail_here = 8 - bit_off;
            let take = bits_avail_here.min(n - got);
            let shifted = (byte as u16) << bit_off;
            let extracted = (shifted >> (8 - take)) & (MASKS[take as usize] as u16);
            result = (result << take) | extracted as u128;
            got += take;
            bo += take as usize;
            if bo == chunk.len() * 8 {
                ci += 1;
                bo = 0;
            }
        }
        if advance {
            if self.retain {
                self.chunk_index = ci;
                self.bit_in_chunk = bo;
            } else {
                for _ in 0..ci {
                    if let Some(front) = self.chunks.pop_front() {
                        self.spent_bits += front.len() * 8;
                    }
                }
                self.chunk_index = 0;
                self.bit_in_chunk = bo;
            }
        }
        result
    }

    //======================================================== public reads

    /// Read an unsigned integer of `n` bits (1..=128), MSB-first unless `n`
    /// is a byte-aligned whole-byte-multiple and `order` says otherwise.
    pub fn read(&mut self, n: u32) -> Result<u128, ReaderError> {
        if !(1..=128).contains(&n) {
            return Err(ReaderError::TooLongForType { max: 128, asked: n });
        }
        let avail = self.available();
        if (avail as u64) < n as u64 {
            return Err(ReaderError::Underrun {
                requested: n,
                available: avail,
            });
        }
        Ok(self.read_bits_raw(n, true))
    }

    /// Like `read`, but honors a byte-order selector for byte-aligned,
    /// whole-byte-multiple widths (the fast path the hot-path algorithms
    /// cover); any other width ignores `order` and reads network order.
    pub fn read_with_order(&mut self, n: u32, order: ByteOrder) -> Result<u128, ReaderError> {
        let aligned = self.bit_in_chunk_is_aligned() && n % 8 == 0;
        let value = self.read(n)?;
        if aligned && order == ByteOrder::LittleEndian && n > 8 {
            Ok(swap_byte_order(value, n))
        } else {
            Ok(value)
        }
    }

    fn bit_in_chunk_is_aligned(&self) -> bool {
        self.bit_in_chunk % 8 == 0
    }

    pub fn read_u8(&mut self, n: u32) -> Result<u8, ReaderError> {
        if n > 8 {
            return Err(ReaderError::TooLongForType { max: 8, asked: n });
        }
        self.read(n).map(|v| v as u8)
    }

    pub fn read_u16(&mut self, n: u32, order: ByteOrder) -> Result<u16, ReaderError> {
        if n > 16 {
            return Err(ReaderError::TooLongForType { max: 16, asked: n });
        }
        self.read_with_order(n, order).map(|v| v as u16)
    }

    pub fn read_u32(&mut self, n: u32, order: ByteOrder) -> Result<u32, ReaderError> {
        if n > 32 {
            return Err(ReaderError::TooLongForType { max: 32, asked: n });
        }
        self.read_with_order(n, order).map(|v| v as u32)
    }

    pub fn read_u64(&mut self, n: u32, order: ByteOrder) -> Result<u64, ReaderError> {
        if n > 64 {
            return Err(ReaderError::TooLongForType { max: 64, asked: n });
        }
        self.read_with_order(n, order).map(|v| v as u64)
    }

    pub fn read_u128(&mut self, n: u32, order: ByteOrder) -> Result<u128, ReaderError> {
        self.read_with_order(n, order)
    }

    /// Two's-complement signed read.
    pub fn read_signed(&mut self, n: u32) -> Result<i128, ReaderError> {
        let raw = self.read(n)?;
        Ok(sign_extend(raw, n))
    }

    /// IEEE 754 read; only 32- and 64-bit widths are valid.
    pub fn read_float(&mut self, width: u32) -> Result<f64, ReaderError> {
        match width {
            32 => {
                let bits = self.read_u32(32, ByteOrder::BigEndian)?;
                Ok(f32::from_bits(bits) as f64)
            }
            64 => {
                let bits = self.read_u64(64, ByteOrder::BigEndian)?;
                Ok(f64::from_bits(bits))
            }
            _ => Err(ReaderError::InvalidFloatWidth { width }),
        }
    }

    /// Resumable byte read: fills `dest[offset..offset+len]` from the
    /// cursor. Errs with `Underrun` (without mutating any state) if fewer
    /// than `len` bytes are buffered.
    pub fn read_bytes(
        &mut self,
        dest: &mut [u8],
        offset: usize,
        len: usize,
    ) -> Result<(), ReaderError> {
        let need = len * 8;
        let avail = self.available();
        if avail < need {
            return Err(ReaderError::Underrun {
                requested: need as u32,
                available: avail,
            });
        }
        for i in 0..len {
            dest[offset + i] = self.read_bits_raw(8, true) as u8;
        }
        Ok(())
    }

    /// Decode a fixed-byte-length string at the cursor.
    pub fn read_string(
        &mut self,
        byte_len: usize,
        opts: StringOptions,
    ) -> Result<String, ReaderError> {
        let mut buf = alloc::vec![0u8; byte_len];
        self.read_bytes(&mut buf, 0, byte_len)?;
        decode_string(&buf, opts)
    }

    /// Like `read`, but doesn't advance the cursor.
    pub fn peek(&mut self, n: u32) -> Result<u128, ReaderError> {
        if !(1..=128).contains(&n) {
            return Err(ReaderError::TooLongForType { max: 128, asked: n });
        }
        let avail = self.available();
        if (avail as u64) < n as u64 {
            return Err(ReaderError::Underrun {
                requested: n,
                available: avail,
            });
        }
        Ok(self.read_bits_raw(n, false))
    }

    /// Try-mode: `None` if fewer than `n` bits are buffered (state
    /// untouched — no partial consumption ever happens since availability
    /// is checked before any mutation), `Some` on success.
    pub fn try_read(&mut self, n: u32) -> Result<Option<u128>, ReaderError> {
        if !(1..=128).contains(&n) {
            return Err(ReaderError::TooLongForType { max: 128, asked: n });
        }
        let avail = self.available();
        if (avail as u64) < n as u64 {
            return Ok(None);
        }
        Ok(Some(self.read_bits_raw(n, true)))
    }
}

fn sign_extend(value: u128, bits: u32) -> i128 {
    if bits >= 128 {
        return value as i128;
    }
    let sign_bit = 1u128 << (bits - 1);
    if value & sign_bit != 0 {
        let extension = u128::MAX << bits;
        (value | extension) as i128
    } else {
        value as i128
    }
}

pub(crate) fn swap_byte_order(value: u128, bits: u32) -> u128 {
    let nbytes = (bits / 8) as usize;
    let be = value.to_be_bytes();
    let start = be.len() - nbytes;
    let mut swapped = Vec::with_capacity(nbytes);
    swapped.extend(be[start..].iter().rev());
    let mut out: u128 = 0;
    for b in swapped {
        out = (out << 8) | b as u128;
    }
    out
}

fn decode_string(bytes: &[u8], opts: StringOptions) -> Result<String, ReaderError> {
    match opts.encoding {
        StringEncoding::Utf8 => {
            let slice = if opts.null_terminated {
                match bytes.iter().position(|&b| b == 0) {
                    Some(idx) => &bytes[..idx],
                    None => bytes,
                }
            } else {
                bytes
            };
            String::from_utf8(slice.to_vec()).map_err(|_| ReaderError::EncodingUnsupported {
                encoding: "utf-8 (invalid byte sequence)",
            })
        }
        #[cfg(feature = "utf16")]
        StringEncoding::Utf16Le | StringEncoding::Ucs2 => {
            let mut units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            if opts.null_terminated {
                if let Some(idx) = units.iter().position(|&u| u == 0) {
                    units.truncate(idx);
                }
            }
            char::decode_utf16(units)
                .collect::<Result<String, _>>()
                .map_err(|_| ReaderError::EncodingUnsupported {
                    encoding: "utf-16 (invalid surrogate sequence)",
                })
        }
    }
}

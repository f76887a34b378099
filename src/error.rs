//! Error taxonomy shared across the crate: bit-level reader/writer failures,
//! schema/determinant failures, and the aggregate parse/serialize errors the
//! record engine surfaces to callers.
use thiserror_no_std::Error;

use crate::value::Value;

//==================================================================================BITREADER_ERRORS
#[derive(Debug, Error, PartialEq, Eq, Clone)]
/// Errors raised during bitwise buffer reads.
pub enum ReaderError {
    /// Synchronous read demanded more bits than available and the stream has
    /// ended (or synchronous mode forbids waiting).
    #[error("underrun: requested {requested} bits, {available} available")]
    Underrun { requested: u32, available: usize },
    /// Seek below `spent_bits`.
    #[error("invalid offset: {requested} is below the retained floor {floor}")]
    InvalidOffset { requested: usize, floor: usize },
    /// Second suspension started before the first completed.
    #[error("a read is already outstanding on this reader")]
    OutstandingRead,
    /// `push` after `end()`.
    #[error("push after end()")]
    EndedReader,
    /// Requested more bits than the target type / engine can hold.
    #[error("cannot read more than {max} bits, requested {asked}")]
    TooLongForType { max: u32, asked: u32 },
    /// `read_slice`/`write_slice` required byte alignment but the cursor wasn't aligned.
    #[error("cursor not byte-aligned: bit {cursor}")]
    NonAlignedBit { cursor: usize },
    /// Float read/write with a width other than 32 or 64.
    #[error("invalid float width {width}, only 32 or 64 supported")]
    InvalidFloatWidth { width: u32 },
    /// String encoding unknown to the host.
    #[error("encoding unsupported: {encoding}")]
    EncodingUnsupported { encoding: &'static str },
}

//==================================================================================BITWRITER_ERRORS
#[derive(Debug, Error, PartialEq, Eq, Clone)]
/// Errors raised during bitwise writes into a buffer.
pub enum WriterError {
    /// Requested more bits than the target type can hold.
    #[error("cannot write more than {max} bits, requested {asked}")]
    TooLongForType { max: u32, asked: u32 },
    /// Cursor is not aligned on a byte boundary when the operation requires it.
    #[error("cursor not byte-aligned: bit {cursor}")]
    NonAlignedBit { cursor: usize },
    /// Float write with a width other than 32 or 64.
    #[error("invalid float width {width}, only 32 or 64 supported")]
    InvalidFloatWidth { width: u32 },
    /// String encoding unknown to the host.
    #[error("encoding unsupported: {encoding}")]
    EncodingUnsupported { encoding: &'static str },
}

//==================================================================================DETERMINANT_ERRORS
#[derive(Debug, Error)]
/// Failure of a user-supplied determinant (length, presence, or value function).
pub enum DeterminantError {
    /// Determinant returned a negative length.
    #[error("determinant for {field} returned a negative length")]
    NegativeLength { field: &'static str },
    /// Determinant referenced a field that hasn't been parsed yet.
    #[error("determinant for {field} referenced unread field {missing}")]
    UnreadField {
        field: &'static str,
        missing: &'static str,
    },
    /// Determinant referenced a field with the wrong runtime type.
    #[error("determinant for {field} saw a type mismatch on {source}: {value:?}")]
    TypeMismatch {
        field: &'static str,
        source: &'static str,
        value: Value,
    },
    /// `measure`/`measure_to`/`measure_from`/`measure_field` was called on a
    /// record type that never overrode `RecordAccess::schema_for_measure`.
    #[error("measurement is unsupported on this record type")]
    MeasurementUnsupported,
    /// The measured range itself failed to write (e.g. a determinant inside
    /// it errored).
    #[error("measuring from {from} to {to} failed")]
    MeasurementFailed {
        from: &'static str,
        to: &'static str,
    },
}

impl Clone for DeterminantError {
    fn clone(&self) -> Self {
        match self {
            Self::NegativeLength { field } => Self::NegativeLength { field: *field },
            Self::UnreadField { field, missing } => Self::UnreadField {
                field: *field,
                missing: *missing,
            },
            Self::TypeMismatch { field, source, value } => Self::TypeMismatch {
                field: *field,
                source: *source,
                value: value.clone_scalar(),
            },
            Self::MeasurementUnsupported => Self::MeasurementUnsupported,
            Self::MeasurementFailed { from, to } => Self::MeasurementFailed {
                from: *from,
                to: *to,
            },
        }
    }
}

//==================================================================================FIELD_PATH
/// Cons-list of field names built while unwinding a nested parse/serialize
/// failure. Rendered lazily: nothing is allocated into a `String` until the
/// error is actually displayed.
#[derive(Debug, Clone, Default)]
pub struct FieldPath(pub alloc::vec::Vec<&'static str>);

impl FieldPath {
    pub fn push(&mut self, name: &'static str) {
        self.0.push(name);
    }

    pub fn pop(&mut self) {
        self.0.pop();
    }
}

impl core::fmt::Display for FieldPath {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        for (i, part) in self.0.iter().rev().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{part}")?;
        }
        Ok(())
    }
}

//==================================================================================SUSPENSION
/// Yielded by a resumable read when fewer bits are buffered than required.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suspension {
    /// Bits still needed beyond what's currently buffered.
    pub remaining: usize,
    /// Whether this suspension may be tolerated by end-of-stream (read-ahead).
    pub optional: bool,
    /// Dotted path of the field being read when the suspension occurred.
    pub at: alloc::string::String,
}

//==================================================================================PARSE_ERROR
#[derive(Debug, Error)]
/// Errors surfaced by the record engine while parsing a payload.
pub enum ParseError {
    /// Underlying bit read failed.
    #[error("field {path}: reader error: {source}")]
    Reader {
        path: FieldPath,
        source: ReaderError,
    },
    /// A length/presence/value determinant failed.
    #[error("field {path}: determinant failed: {source}")]
    Determinant {
        path: FieldPath,
        source: DeterminantError,
    },
    /// The reader suspended (not enough data yet); caller should push more
    /// input and retry the same `parse` call.
    #[error("suspended waiting for {} more bits at {}", suspension.remaining, suspension.at)]
    Suspended { suspension: Suspension },
    /// A marker variator produced no instance.
    #[error("variator at field {path} returned nothing")]
    VariatorNullReturn { path: FieldPath },
    /// Resumable parsing was requested on a reader without the retain flag set.
    #[error("resumable parse requires a retain-enabled reader")]
    ReaderNotRetained,
    /// Assigning a parsed value into the target instance failed.
    #[error("field {path}: could not assign value {value:?}")]
    FieldAssignmentFailed { path: FieldPath, value: Value },
}

//==================================================================================SERIALIZE_ERROR
#[derive(Debug, Error)]
/// Errors surfaced by the record engine while serializing an instance.
pub enum SerializeError {
    /// Underlying bit write failed.
    #[error("field {path}: writer error: {source}")]
    Writer {
        path: FieldPath,
        source: WriterError,
    },
    /// A length/presence/value determinant failed.
    #[error("field {path}: determinant failed: {source}")]
    Determinant {
        path: FieldPath,
        source: DeterminantError,
    },
    /// An array's `count` determinant disagreed with the actual array length.
    #[error("field {path}: array count mismatch: determinant said {expected}, array has {actual}")]
    ArrayCountMismatch {
        path: FieldPath,
        expected: usize,
        actual: usize,
    },
    /// A nested-record field was missing when it was required to write.
    #[error("field {path}: nested record value missing")]
    NullSubrecord { path: FieldPath },
    /// A byte-oriented field's declared length isn't a multiple of 8.
    #[error("field {path}: length {bits} is not a multiple of 8")]
    MisalignedByteField { path: FieldPath, bits: u32 },
    /// `serialize` produced a non-byte-aligned result with `auto_pad = false`.
    #[error("serialized range is not byte-aligned ({bits} bits) and auto_pad is disabled")]
    UnalignedSerialization { bits: u64 },
    /// The field the caller looked up doesn't exist on the instance.
    #[error("field {0} not found")]
    FieldNotFound(&'static str),
}

//==================================================================================SCHEMA_ERROR
#[derive(Debug, Error)]
/// Errors raised while selecting or applying schema variation.
pub enum SchemaError {
    /// No variant matched and no `@DefaultVariant` was registered.
    #[error("no variant matched for {path}")]
    NoVariantMatch { path: FieldPath },
}

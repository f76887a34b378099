//! Table-driven scalar field codecs, dispatched on `FieldKind`. Generalizes
//! a `read_field_value`/`write_field` match-arm pair from a flat `PgnValue`
//! set to this crate's richer `Value`. Nested records and arrays are *not*
//! handled here — the record engine intercepts those before ever reaching
//! the registry, the same way a `RepeatingFieldSet` is handled outside of
//! `read_field_value` itself.
use alloc::vec;

use crate::error::{DeterminantError, FieldPath, ParseError, ReaderError, SerializeError};
use crate::reader::{swap_byte_order, BitReader, StringOptions};
use crate::schema::{BoolMode, Field, FieldKind, FieldLength, Presence, WrittenValue};
use crate::value::{RecordAccess, Value};
use crate::writer::{BitSink, StringWriteOptions};


fn reader_err(path: &FieldPath, source: ReaderError) -> ParseError {
    ParseError::Reader {
        path: path.clone(),
        source,
    }
}

fn determinant_err(path: &FieldPath, source: DeterminantError) -> ParseError {
    ParseError::Determinant {
        path: path.clone(),
        source,
    }
}

/// Resolves a field's presence without consuming bits unless the presence
/// rule is itself a read-ahead peek (which restores the cursor afterward).
pub fn is_present(
    reader: &mut BitReader,
    field: &Field,
    record: &dyn RecordAccess,
    path: &FieldPath,
) -> Result<bool, ParseError> {
    match &field.presence {
        Presence::Always => Ok(true),
        Presence::Predicate(p) => p(record).map_err(|e| determinant_err(path, e)),
        Presence::ReadAhead { bits, test } => match reader.peek(*bits) {
            Ok(value) => Ok(test(value)),
            // A short peek only settles to "absent" once the stream has
            // truly ended; mid-stream it must propagate so a resumable
            // caller can ask for more bytes and retry.
            Err(ReaderError::Underrun { .. }) if reader.is_ended() => Ok(false),
            Err(e) => Err(reader_err(path, e)),
        },
    }
}

/// Resolves a field's bit length, whether fixed or determinant-derived.
pub fn resolve_length(
    field: &Field,
    record: &dyn RecordAccess,
    path: &FieldPath,
) -> Result<u32, ParseError> {
    match &field.length {
        FieldLength::Bits(n) => Ok(*n),
        FieldLength::Dynamic(f) => f(record).map_err(|e| determinant_err(path, e)),
    }
}

pub(crate) fn uint_value(raw: u128, bits: u32) -> Value {
    if bits <= 8 {
        Value::U8(raw as u8)
    } else if bits <= 16 {
        Value::U16(raw as u16)
    } else if bits <= 32 {
        Value::U32(raw as u32)
    } else if bits <= 64 {
        Value::U64(raw as u64)
    } else {
        Value::U128(raw)
    }
}

pub(crate) fn int_value(raw: i128, bits: u32) -> Value {
    if bits <= 8 {
        Value::I8(raw as i8)
    } else if bits <= 16 {
        Value::I16(raw as i16)
    } else if bits <= 32 {
        Value::I32(raw as i32)
    } else if bits <= 64 {
        Value::I64(raw as i64)
    } else {
        Value::I128(raw)
    }
}

/// Reads one scalar field. Returns `Value::Null` if the field's presence
/// rule says it's absent (contributing zero bits).
pub fn read_field(
    reader: &mut BitReader,
    field: &Field,
    record: &dyn RecordAccess,
    path: &FieldPath,
) -> Result<Value, ParseError> {
    if !is_present(reader, field, record, path)? {
        return Ok(Value::Null);
    }
    let bits = resolve_length(field, record, path)?;
    match &field.kind {
        FieldKind::UInt => {
            let raw = reader
                .read_with_order(bits, field.byte_order)
                .map_err(|e| reader_err(path, e))?;
            Ok(uint_value(raw, bits))
        }
        FieldKind::Int => {
            let raw = reader.read_signed(bits).map_err(|e| reader_err(path, e))?;
            Ok(int_value(raw, bits))
        }
        FieldKind::Bool(mode) => {
            let raw = reader.read(bits).map_err(|e| reader_err(path, e))?;
            Ok(Value::Bool(mode.decode(raw as u64)))
        }
        FieldKind::Float => {
            let raw = reader
                .read_float(bits)
                .map_err(|e| reader_err(path, e))?;
            Ok(if bits == 32 {
                Value::F32(raw as f32)
            } else {
                Value::F64(raw)
            })
        }
        FieldKind::Bytes { .. } => {
            let byte_len = (bits / 8) as usize;
            let mut buf = vec![0u8; byte_len];
            reader
                .read_bytes(&mut buf, 0, byte_len)
                .map_err(|e| reader_err(path, e))?;
            Ok(Value::Bytes(buf))
        }
        FieldKind::Str(encoding) => {
            let byte_len = (bits / 8) as usize;
            let s = reader
                .read_string(
                    byte_len,
                    StringOptions {
                        encoding: *encoding,
                        null_terminated: true,
                    },
                )
                .map_err(|e| reader_err(path, e))?;
            Ok(Value::Str(s))
        }
        FieldKind::Null => {
            reader.skip(bits as usize);
            Ok(Value::Null)
        }
        FieldKind::Nested(_) | FieldKind::Array(..) => {
            unreachable!("nested/array fields are dispatched by the engine, not the registry")
        }
    }
}

fn resolve_written_value(
    field: &Field,
    record: &dyn RecordAccess,
    path: &FieldPath,
) -> Result<Value, SerializeError> {
    match &field.written_value {
        WrittenValue::FromRecord => record
            .get(field.name)
            .ok_or(SerializeError::FieldNotFound(field.name)),
        WrittenValue::Constant(v) => Ok(v.clone_scalar()),
        WrittenValue::Computed(f) => f(record).map_err(|e| SerializeError::Determinant {
            path: path.clone(),
            source: e,
        }),
    }
}

fn is_present_for_write(
    field: &Field,
    record: &dyn RecordAccess,
    path: &FieldPath,
) -> Result<bool, SerializeError> {
    match &field.presence {
        Presence::Always => Ok(true),
        Presence::Predicate(p) => p(record).map_err(|e| SerializeError::Determinant {
            path: path.clone(),
            source: e,
        }),
        // A write-side read-ahead presence rule degrades to "present iff
        // the record actually carries a value" — there is nothing to peek
        // in an output buffer.
        Presence::ReadAhead { .. } => Ok(record.get(field.name).is_some()),
    }
}

fn resolve_length_for_write(
    field: &Field,
    record: &dyn RecordAccess,
    path: &FieldPath,
) -> Result<u32, SerializeError> {
    match &field.length {
        FieldLength::Bits(n) => Ok(*n),
        FieldLength::Dynamic(f) => f(record).map_err(|e| SerializeError::Determinant {
            path: path.clone(),
            source: e,
        }),
    }
}

/// Writes one scalar field. Writes nothing if presence resolves to false.
pub fn write_field(
    sink: &mut dyn BitSink,
    field: &Field,
    record: &dyn RecordAccess,
    path: &FieldPath,
) -> Result<(), SerializeError> {
    if !is_present_for_write(field, record, path)? {
        return Ok(());
    }
    let bits = resolve_length_for_write(field, record, path)?;
    let value = resolve_written_value(field, record, path)?;
    let werr = |source| SerializeError::Writer {
        path: path.clone(),
        source,
    };
    match &field.kind {
        FieldKind::UInt => {
            let raw = value.as_u128().unwrap_or(0);
            let raw = if field.byte_order == crate::reader::ByteOrder::LittleEndian && bits % 8 == 0
            {
                swap_byte_order(raw, bits)
            } else {
                raw
            };
            sink.write(raw, bits).map_err(werr)
        }
        FieldKind::Int => {
            let raw = value.as_i64().unwrap_or(0) as i128;
            sink.write_signed(raw, bits).map_err(werr)
        }
        FieldKind::Bool(mode) => {
            let b = value.as_bool().unwrap_or(false);
            sink.write(mode.encode(b) as u128, bits).map_err(werr)
        }
        FieldKind::Float => {
            let f = value.as_f64().unwrap_or(0.0);
            sink.write_float(f, bits).map_err(werr)
        }
        FieldKind::Bytes { truncate, fill } => {
            let declared = (bits / 8) as usize;
            let mut bytes = value.as_bytes().unwrap_or(&[]).to_vec();
            if bytes.len() > declared && *truncate {
                bytes.truncate(declared);
            } else if bytes.len() < declared && (*truncate || fill.is_some()) {
                let pad = fill.unwrap_or(0);
                bytes.resize(declared, pad);
            }
            sink.write_bytes(&bytes).map_err(werr)
        }
        FieldKind::Str(_) => {
            let mut s = match &value {
                Value::Str(s) => s.clone(),
                _ => alloc::string::String::new(),
            };
            let declared = (bits / 8) as usize;
            if s.len() > declared {
                while s.len() > declared {
                    s.pop();
                }
            }
            sink.write_string(
                &s,
                StringWriteOptions {
                    null_terminated: false,
                    #[cfg(feature = "utf16")]
                    utf16: matches!(
                        field.kind,
                        FieldKind::Str(
                            crate::reader::StringEncoding::Utf16Le
                                | crate::reader::StringEncoding::Ucs2
                        )
                    ),
                },
            )
            .map_err(werr)?;
            let written = s.len();
            if written < declared {
                let pad = vec![0u8; declared - written];
                sink.write_bytes(&pad).map_err(werr)?;
            }
            Ok(())
        }
        FieldKind::Null => sink.write(0, bits).map_err(werr),
        FieldKind::Nested(_) | FieldKind::Array(..) => {
            unreachable!("nested/array fields are dispatched by the engine, not the registry")
        }
    }
}

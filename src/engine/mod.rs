//! Drives a `Schema` against a `BitReader`/`BitSink` pair: the parse/write
//! loop, nested records, repeating arrays, and variant selection.
//! Generalizes a `deserialize_into`/`serialize` pair that drove one flat
//! `PgnDescriptor` with at most one `RepeatingFieldSet`, to an arbitrary
//! tree of nested records, arrays of either scalars or nested records, and
//! marker/tail variation.
use alloc::vec::Vec;

use crate::error::{DeterminantError, FieldPath, ParseError, ReaderError, SerializeError, Suspension};
use crate::reader::BitReader;
use crate::registry;
use crate::schema::{ArrayCount, ArrayElement, Field, FieldKind, Schema, Variant};
use crate::value::{Described, RecordAccess, Value};
use crate::writer::{BitSink, BitWriter, MeasuringWriter};

#[cfg(test)]
#[path = "tests.rs"]
mod tests;

/// Opaque host data made available to a parse/write call. Determinants
/// themselves only ever see already-parsed record fields (so a suspended
/// parse can be safely retried); `Context` is for host-level bookkeeping
/// threaded alongside a call (e.g. which device produced the bytes) rather
/// than for engine decision-making.
pub struct Context<'a> {
    data: Option<&'a dyn core::any::Any>,
}

impl<'a> Context<'a> {
    pub fn none() -> Self {
        Self { data: None }
    }

    pub fn with<T: 'static>(value: &'a T) -> Self {
        Self {
            data: Some(value as &dyn core::any::Any),
        }
    }

    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.data.and_then(|d| d.downcast_ref::<T>())
    }
}

//======================================================================== parse

/// Parse `T` from `reader`, consuming exactly the bits its schema declares.
pub fn parse<T: Described>(reader: &mut BitReader) -> Result<T, ParseError> {
    let mut instance = T::default();
    parse_into(&T::schema(), reader, &mut instance)?;
    Ok(instance)
}

/// Attempt to parse `T`; returns `Ok(None)` instead of an underrun error if
/// fewer bits are buffered than the record needs, rewinding the reader.
/// Requires a retain-enabled reader.
pub fn try_parse<T: Described>(reader: &mut BitReader) -> Result<Option<T>, ParseError> {
    if !reader.retain() {
        return Err(ParseError::ReaderNotRetained);
    }
    begin_suspension(reader)?;
    let start = reader.offset();
    let mut instance = T::default();
    let result = parse_into(&T::schema(), reader, &mut instance);
    reader.end_suspension();
    match result {
        Ok(()) => Ok(Some(instance)),
        Err(ParseError::Reader {
            source: ReaderError::Underrun { .. },
            ..
        }) => {
            let _ = reader.set_offset(start);
            Ok(None)
        }
        Err(e) => {
            let _ = reader.set_offset(start);
            Err(e)
        }
    }
}

fn begin_suspension(reader: &mut BitReader) -> Result<(), ParseError> {
    reader.begin_suspension().map_err(|e| ParseError::Reader {
        path: FieldPath::default(),
        source: e,
    })
}

/// Resumable parse: on underrun, rewinds to the call's start offset and
/// returns `ParseError::Suspended` instead of propagating the reader error.
/// The caller pushes more input and calls this again with the same reader;
/// since every determinant is a pure function of already-parsed fields,
/// retrying the whole record from its start offset is observationally
/// equivalent to resuming mid-field. Requires a retain-enabled reader.
pub fn parse_resumable<T: Described>(reader: &mut BitReader) -> Result<T, ParseError> {
    if !reader.retain() {
        return Err(ParseError::ReaderNotRetained);
    }
    begin_suspension(reader)?;
    let result = parse_resumable_inner::<T>(reader);
    reader.end_suspension();
    result
}

/// The actual attempt-and-convert-underrun-to-Suspended logic, split out of
/// `parse_resumable` so `async_io::parse_async` can hold the outstanding-read
/// guard across its whole retry loop instead of re-acquiring it on every
/// attempt.
pub(crate) fn parse_resumable_inner<T: Described>(reader: &mut BitReader) -> Result<T, ParseError> {
    let start = reader.offset();
    let mut instance = T::default();
    match parse_into(&T::schema(), reader, &mut instance) {
        Ok(()) => Ok(instance),
        Err(ParseError::Reader {
            source: ReaderError::Underrun { requested, available },
            path,
        }) => {
            let _ = reader.set_offset(start);
            Err(ParseError::Suspended {
                suspension: Suspension {
                    remaining: requested as usize - available,
                    optional: false,
                    at: alloc::format!("{path}"),
                },
            })
        }
        Err(e) => {
            let _ = reader.set_offset(start);
            Err(e)
        }
    }
}

/// Populate `instance`'s fields from `reader` per `schema`. The low-level
/// entry point used for both top-level records and nested-record fields.
pub fn parse_into(
    schema: &Schema,
    reader: &mut BitReader,
    instance: &mut dyn RecordAccess,
) -> Result<(), ParseError> {
    let mut path = FieldPath::default();
    let marker = marker_style(schema.variant.as_ref());
    parse_fields(&schema.fields, marker, reader, instance, &mut path)?;
    if marker.is_none() {
        if let Some(variant) = &schema.variant {
            apply_variant_parse(variant, reader, instance, &mut path, false)?;
        }
    }
    Ok(())
}

fn marker_style(variant: Option<&Variant>) -> Option<(&'static str, &Variant)> {
    let variant = variant?;
    let name = variant.cases.first()?.marker_after?;
    Some((name, variant))
}

/// Re-checks whether `instance`'s tail variant (if its schema declares one)
/// matched a case. `parse`/`parse_into` already tolerate a tail no-match
/// silently (it surfaces as the base record); this is for a caller that
/// wants to treat that outcome as an error instead.
pub fn assert_variant_matched<T: Described>(instance: &T) -> Result<(), crate::error::SchemaError> {
    let schema = T::schema();
    let Some(variant) = &schema.variant else {
        return Ok(());
    };
    let Ok(discriminant) = (variant.discriminant)(instance) else {
        return Ok(());
    };
    match crate::schema::select_case(variant, &discriminant) {
        Some(_) => Ok(()),
        None => Err(crate::error::SchemaError::NoVariantMatch {
            path: FieldPath::default(),
        }),
    }
}

fn parse_fields(
    fields: &[Field],
    marker: Option<(&'static str, &Variant)>,
    reader: &mut BitReader,
    instance: &mut dyn RecordAccess,
    path: &mut FieldPath,
) -> Result<(), ParseError> {
    for field in fields {
        path.push(field.name);
        let result = parse_one_field(field, reader, instance, path);
        path.pop();
        result?;
        if let Some((marker_name, variant)) = marker {
            if field.name == marker_name {
                apply_variant_parse(variant, reader, instance, path, true)?;
            }
        }
    }
    Ok(())
}

fn parse_one_field(
    field: &Field,
    reader: &mut BitReader,
    instance: &mut dyn RecordAccess,
    path: &mut FieldPath,
) -> Result<(), ParseError> {
    match &field.kind {
        FieldKind::Nested(nested) => {
            if !registry::is_present(reader, field, instance, path)? {
                return instance.set(field.name, Value::Null);
            }
            let mut child = (nested.make)();
            parse_into(&nested.schema, reader, child.as_mut())?;
            instance.set(field.name, Value::Record(child))
        }
        FieldKind::Array(element, count) => parse_array(field, element, count, reader, instance, path),
        _ => {
            let value = registry::read_field(reader, field, instance, path)?;
            instance.set(field.name, value)
        }
    }
}

/// `is_marker` distinguishes marker variation (spliced at a position inside
/// the base field list) from tail variation (applied once after all base
/// fields). A marker that matches no case and has no default is a hard
/// error; tail variation with no match is not — it surfaces as the base
/// record with none of a case's fields applied.
fn apply_variant_parse(
    variant: &Variant,
    reader: &mut BitReader,
    instance: &mut dyn RecordAccess,
    path: &mut FieldPath,
    is_marker: bool,
) -> Result<(), ParseError> {
    let discriminant = (variant.discriminant)(instance).map_err(|e| ParseError::Determinant {
        path: path.clone(),
        source: e,
    })?;
    match crate::schema::select_case(variant, &discriminant) {
        Some(case) => parse_fields(&case.fields, None, reader, instance, path),
        None if is_marker => Err(ParseError::VariatorNullReturn { path: path.clone() }),
        None => Ok(()),
    }
}

fn parse_array(
    field: &Field,
    element: &ArrayElement,
    count: &ArrayCount,
    reader: &mut BitReader,
    instance: &mut dyn RecordAccess,
    path: &mut FieldPath,
) -> Result<(), ParseError> {
    if !registry::is_present(reader, field, instance, path)? {
        return instance.set(field.name, Value::Array(Vec::new()));
    }
    let mut items = Vec::new();
    match count {
        ArrayCount::Literal(n) => {
            for i in 0..*n {
                items.push(parse_array_element(element, reader, path, i)?);
            }
        }
        ArrayCount::FromField(name) => {
            let n = instance
                .get(name)
                .and_then(|v| v.as_u64())
                .ok_or_else(|| ParseError::Determinant {
                    path: path.clone(),
                    source: DeterminantError::UnreadField {
                        field: field.name,
                        missing: name,
                    },
                })? as usize;
            for i in 0..n {
                items.push(parse_array_element(element, reader, path, i)?);
            }
        }
        ArrayCount::Determinant(f) => {
            let n = f(instance).map_err(|e| ParseError::Determinant {
                path: path.clone(),
                source: e,
            })?;
            for i in 0..n {
                items.push(parse_array_element(element, reader, path, i)?);
            }
        }
        ArrayCount::HasMore => {
            let mut i = 0;
            loop {
                let keep_going = match element {
                    ArrayElement::Number { bits, .. } => reader.is_available(*bits as usize),
                    ArrayElement::Nested(_) => reader.available() > 0,
                };
                if !keep_going {
                    break;
                }
                items.push(parse_array_element(element, reader, path, i)?);
                i += 1;
            }
        }
    }
    instance.set(field.name, Value::Array(items))
}

fn parse_array_element(
    element: &ArrayElement,
    reader: &mut BitReader,
    path: &mut FieldPath,
    index: usize,
) -> Result<Value, ParseError> {
    let _ = index;
    path.push("[]");
    let result = (|| -> Result<Value, ParseError> {
        match element {
            ArrayElement::Number {
                signed,
                bits,
                byte_order,
            } => {
                if *signed {
                    let raw = reader
                        .read_signed(*bits)
                        .map_err(|e| ParseError::Reader {
                            path: path.clone(),
                            source: e,
                        })?;
                    Ok(registry::int_value(raw, *bits))
                } else {
                    let raw = reader
                        .read_with_order(*bits, *byte_order)
                        .map_err(|e| ParseError::Reader {
                            path: path.clone(),
                            source: e,
                        })?;
                    Ok(registry::uint_value(raw, *bits))
                }
            }
            ArrayElement::Nested(nested) => {
                let mut child = (nested.make)();
                parse_into(&nested.schema, reader, child.as_mut())?;
                Ok(Value::Record(child))
            }
        }
    })();
    path.pop();
    result
}

//======================================================================== write

/// Serialize `instance` into a freshly-allocated byte buffer, per its
/// schema. The result is always byte-aligned: any trailing partial byte is
/// zero-padded.
pub fn write<T: Described>(instance: &T) -> Result<alloc::vec::Vec<u8>, SerializeError> {
    let mut w = BitWriter::new();
    write_into(&T::schema(), &mut w, instance)?;
    Ok(w.finish())
}

/// Like `write`, but `auto_pad = false` rejects a non-byte-aligned result
/// instead of silently padding it.
pub fn write_checked<T: Described>(
    instance: &T,
    auto_pad: bool,
) -> Result<alloc::vec::Vec<u8>, SerializeError> {
    let mut w = BitWriter::new();
    write_into(&T::schema(), &mut w, instance)?;
    let bit_len = w.bit_len();
    if bit_len % 8 != 0 && !auto_pad {
        return Err(SerializeError::UnalignedSerialization {
            bits: bit_len as u64,
        });
    }
    Ok(w.finish())
}

fn field_index(schema: &Schema, name: &'static str) -> Option<usize> {
    schema.fields.iter().position(|f| f.name == name)
}

fn measure_bits_by_index(
    schema: &Schema,
    instance: &dyn RecordAccess,
    start: usize,
    end: usize,
) -> Result<usize, SerializeError> {
    let mut m = MeasuringWriter::new();
    let mut path = FieldPath::default();
    write_fields(&schema.fields[start..end], None, &mut m, instance, &mut path)?;
    Ok(m.bit_len())
}

/// Bit length `instance` would occupy if the fields from `from` (inclusive)
/// to `to` (exclusive) were written right now. Used by length determinants
/// that need to know a not-yet-written range's size in advance.
pub fn measure<T: Described>(
    instance: &T,
    from: &'static str,
    to: &'static str,
) -> Result<usize, SerializeError> {
    let schema = T::schema();
    let start = field_index(&schema, from).unwrap_or(0);
    let end = field_index(&schema, to).unwrap_or(schema.fields.len());
    measure_bits_by_index(&schema, instance, start, end)
}

/// Same as `measure`, but reachable from inside a boxed determinant closure
/// that only has `&dyn RecordAccess` — `instance` supplies its own schema
/// via `RecordAccess::schema_for_measure`. `from`/`to` of `None` mean
/// "start"/"end" of the record.
pub fn measure_dyn(
    instance: &dyn RecordAccess,
    from: Option<&'static str>,
    to: Option<&'static str>,
) -> Result<u32, DeterminantError> {
    let schema = instance
        .schema_for_measure()
        .ok_or(DeterminantError::MeasurementUnsupported)?;
    let start = from.and_then(|n| field_index(&schema, n)).unwrap_or(0);
    let end = to
        .and_then(|n| field_index(&schema, n))
        .unwrap_or(schema.fields.len());
    measure_bits_by_index(&schema, instance, start, end)
        .map(|bits| bits as u32)
        .map_err(|_| DeterminantError::MeasurementFailed {
            from: from.unwrap_or("<start>"),
            to: to.unwrap_or("<end>"),
        })
}

/// Bit length of exactly one field, found by name in `instance`'s own
/// schema (see `measure_dyn`).
pub fn measure_dyn_field(
    instance: &dyn RecordAccess,
    field: &'static str,
) -> Result<u32, DeterminantError> {
    let schema = instance
        .schema_for_measure()
        .ok_or(DeterminantError::MeasurementUnsupported)?;
    let idx = field_index(&schema, field).ok_or(DeterminantError::UnreadField {
        field: "<measure_field>",
        missing: field,
    })?;
    measure_bits_by_index(&schema, instance, idx, idx + 1)
        .map(|bits| bits as u32)
        .map_err(|_| DeterminantError::MeasurementFailed {
            from: field,
            to: field,
        })
}

pub fn write_into(
    schema: &Schema,
    sink: &mut dyn BitSink,
    instance: &dyn RecordAccess,
) -> Result<(), SerializeError> {
    let mut path = FieldPath::default();
    let marker = marker_style(schema.variant.as_ref());
    write_fields(&schema.fields, marker, sink, instance, &mut path)?;
    if marker.is_none() {
        if let Some(variant) = &schema.variant {
            apply_variant_write(variant, sink, instance, &mut path, false)?;
        }
    }
    Ok(())
}

fn write_fields(
    fields: &[Field],
    marker: Option<(&'static str, &Variant)>,
    sink: &mut dyn BitSink,
    instance: &dyn RecordAccess,
    path: &mut FieldPath,
) -> Result<(), SerializeError> {
    for field in fields {
        path.push(field.name);
        let result = write_one_field(field, sink, instance, path);
        path.pop();
        result?;
        if let Some((marker_name, variant)) = marker {
            if field.name == marker_name {
                apply_variant_write(variant, sink, instance, path, true)?;
            }
        }
    }
    Ok(())
}

fn write_one_field(
    field: &Field,
    sink: &mut dyn BitSink,
    instance: &dyn RecordAccess,
    path: &mut FieldPath,
) -> Result<(), SerializeError> {
    match &field.kind {
        FieldKind::Nested(_) => match instance.get(field.name) {
            Some(Value::Record(child)) => write_into(
                nested_schema(field),
                sink,
                child.as_ref(),
            ),
            Some(Value::Null) | None => Ok(()),
            Some(_) => Err(SerializeError::NullSubrecord { path: path.clone() }),
        },
        FieldKind::Array(element, count) => write_array(field, element, count, sink, instance, path),
        _ => registry::write_field(sink, field, instance, path),
    }
}

fn nested_schema(field: &Field) -> &Schema {
    match &field.kind {
        FieldKind::Nested(n) => &n.schema,
        _ => unreachable!("nested_schema called on a non-nested field"),
    }
}

/// See `apply_variant_parse` for the marker/tail distinction this mirrors.
fn apply_variant_write(
    variant: &Variant,
    sink: &mut dyn BitSink,
    instance: &dyn RecordAccess,
    path: &mut FieldPath,
    is_marker: bool,
) -> Result<(), SerializeError> {
    let discriminant = (variant.discriminant)(instance).map_err(|e| SerializeError::Determinant {
        path: path.clone(),
        source: e,
    })?;
    match crate::schema::select_case(variant, &discriminant) {
        Some(case) => write_fields(&case.fields, None, sink, instance, path),
        None if is_marker => Err(SerializeError::Determinant {
            path: path.clone(),
            source: DeterminantError::TypeMismatch {
                field: "<variant>",
                source: "discriminant",
                value: discriminant.clone_scalar(),
            },
        }),
        None => Ok(()),
    }
}

fn write_array(
    field: &Field,
    element: &ArrayElement,
    count: &ArrayCount,
    sink: &mut dyn BitSink,
    instance: &dyn RecordAccess,
    path: &mut FieldPath,
) -> Result<(), SerializeError> {
    let items = match instance.get(field.name) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    };
    if let Some(expected) = expected_array_count(field, count, instance, path)? {
        if items.len() != expected {
            return Err(SerializeError::ArrayCountMismatch {
                path: path.clone(),
                expected,
                actual: items.len(),
            });
        }
    }
    for (i, item) in items.iter().enumerate() {
        path.push("[]");
        let result = write_array_element(element, item, sink, path, i);
        path.pop();
        result?;
    }
    Ok(())
}

/// The count a write must match, if `count` names one up front. `HasMore`
/// has no expected count to check against — the array's own length is
/// authoritative.
fn expected_array_count(
    field: &Field,
    count: &ArrayCount,
    instance: &dyn RecordAccess,
    path: &FieldPath,
) -> Result<Option<usize>, SerializeError> {
    match count {
        ArrayCount::Literal(n) => Ok(Some(*n)),
        ArrayCount::FromField(name) => {
            let n = instance
                .get(name)
                .and_then(|v| v.as_u64())
                .ok_or_else(|| SerializeError::Determinant {
                    path: path.clone(),
                    source: DeterminantError::UnreadField {
                        field: field.name,
                        missing: name,
                    },
                })?;
            Ok(Some(n as usize))
        }
        ArrayCount::Determinant(f) => {
            let n = f(instance).map_err(|e| SerializeError::Determinant {
                path: path.clone(),
                source: e,
            })?;
            Ok(Some(n))
        }
        ArrayCount::HasMore => Ok(None),
    }
}

fn write_array_element(
    element: &ArrayElement,
    item: &Value,
    sink: &mut dyn BitSink,
    path: &FieldPath,
    index: usize,
) -> Result<(), SerializeError> {
    let _ = index;
    let werr = |source| SerializeError::Writer {
        path: path.clone(),
        source,
    };
    match element {
        ArrayElement::Number { signed, bits, .. } => {
            if *signed {
                sink.write_signed(item.as_i64().unwrap_or(0) as i128, *bits)
                    .map_err(werr)
            } else {
                sink.write(item.as_u128().unwrap_or(0), *bits).map_err(werr)
            }
        }
        ArrayElement::Nested(nested) => match item {
            Value::Record(child) => write_into(&nested.schema, sink, child.as_ref()),
            _ => Err(SerializeError::NullSubrecord { path: path.clone() }),
        },
    }
}

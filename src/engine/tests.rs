use super::*;
use crate::error::{DeterminantError, SchemaError};
use crate::reader::ByteOrder;
use crate::schema::{ArrayElement, Field, NestedSpec, Schema, Variant, VariantCase, VariantPriority};
use alloc::boxed::Box;

#[derive(Debug, Default)]
struct Msg {
    kind: u8,
    len: u8,
    payload: Vec<u8>,
}

impl RecordAccess for Msg {
    fn get(&self, name: &'static str) -> Option<Value> {
        match name {
            "kind" => Some(Value::U8(self.kind)),
            "len" => Some(Value::U8(self.len)),
            "payload" => Some(Value::Bytes(self.payload.clone())),
            _ => None,
        }
    }

    fn set(&mut self, name: &'static str, value: Value) -> Result<(), ParseError> {
        match name {
            "kind" => self.kind = value.as_u64().unwrap_or(0) as u8,
            "len" => self.len = value.as_u64().unwrap_or(0) as u8,
            "payload" => {
                if let Value::Bytes(b) = value {
                    self.payload = b;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl Described for Msg {
    fn schema() -> Schema {
        Schema::new("msg")
            .field(Field::uint("kind", 8))
            .field(Field::uint("len", 8))
            .field(Field::bytes_dynamic(
                "payload",
                Box::new(|rec| {
                    let len = rec.get("len").and_then(|v| v.as_u64()).ok_or(
                        DeterminantError::UnreadField {
                            field: "payload",
                            missing: "len",
                        },
                    )?;
                    Ok((len as u32) * 8)
                }),
            ))
            .build()
    }
}

#[test]
fn dependent_length_field_reads_exactly_the_declared_byte_count() {
    let mut r = BitReader::new();
    r.push(alloc::vec![7u8, 3, 0xAA, 0xBB, 0xCC]).unwrap();
    r.end();
    let msg: Msg = parse(&mut r).unwrap();
    assert_eq!(msg.kind, 7);
    assert_eq!(msg.len, 3);
    assert_eq!(msg.payload, alloc::vec![0xAA, 0xBB, 0xCC]);
}

#[test]
fn write_then_parse_round_trips_dependent_length_field() {
    let msg = Msg {
        kind: 9,
        len: 2,
        payload: alloc::vec![1, 2],
    };
    let bytes = write(&msg).unwrap();
    assert_eq!(bytes, alloc::vec![9, 2, 1, 2]);
    let mut r = BitReader::new();
    r.push(bytes).unwrap();
    r.end();
    let parsed: Msg = parse(&mut r).unwrap();
    assert_eq!(parsed.payload, alloc::vec![1, 2]);
}

#[derive(Debug, Default)]
struct Variadic {
    kind: u8,
    a: Option<u8>,
    b: Option<u16>,
}

impl RecordAccess for Variadic {
    fn get(&self, name: &'static str) -> Option<Value> {
        match name {
            "kind" => Some(Value::U8(self.kind)),
            "a" => self.a.map(Value::U8),
            "b" => self.b.map(Value::U16),
            _ => None,
        }
    }

    fn set(&mut self, name: &'static str, value: Value) -> Result<(), ParseError> {
        match name {
            "kind" => self.kind = value.as_u64().unwrap_or(0) as u8,
            "a" => self.a = value.as_u64().map(|v| v as u8),
            "b" => self.b = value.as_u64().map(|v| v as u16),
            _ => {}
        }
        Ok(())
    }
}

impl Described for Variadic {
    fn schema() -> Schema {
        let variant = Variant {
            discriminant: Box::new(|rec| {
                rec.get("kind").ok_or(DeterminantError::UnreadField {
                    field: "<variant>",
                    missing: "kind",
                })
            }),
            cases: alloc::vec![
                VariantCase {
                    name: "a",
                    match_value: Value::U8(1),
                    priority: VariantPriority::First,
                    fields: alloc::vec![Field::uint("a", 8)],
                    marker_after: None,
                },
                VariantCase {
                    name: "b",
                    match_value: Value::U8(2),
                    priority: VariantPriority::First,
                    fields: alloc::vec![Field::uint("b", 16)],
                    marker_after: None,
                },
            ],
            default_case: None,
        };
        Schema::new("variadic")
            .field(Field::uint("kind", 8))
            .variant(variant)
            .build()
    }
}

#[test]
fn tail_variation_selects_case_by_discriminant() {
    let mut r = BitReader::new();
    r.push(alloc::vec![2u8, 0x01, 0x02]).unwrap();
    r.end();
    let rec: Variadic = parse(&mut r).unwrap();
    assert_eq!(rec.kind, 2);
    assert_eq!(rec.b, Some(0x0102));
    assert_eq!(rec.a, None);
}

#[test]
fn tail_variation_round_trips_through_write() {
    let rec = Variadic {
        kind: 1,
        a: Some(42),
        b: None,
    };
    let bytes = write(&rec).unwrap();
    assert_eq!(bytes, alloc::vec![1, 42]);
}

#[test]
fn tail_variation_with_no_matching_case_and_no_default_is_not_an_error() {
    let mut r = BitReader::new();
    r.push(alloc::vec![99u8]).unwrap();
    r.end();
    let rec: Variadic = parse(&mut r).unwrap();
    assert_eq!(rec.kind, 99);
    assert_eq!(rec.a, None);
    assert_eq!(rec.b, None);
}

#[test]
fn assert_variant_matched_reports_the_tail_no_match_parse_otherwise_tolerates() {
    let unmatched = Variadic {
        kind: 99,
        a: None,
        b: None,
    };
    assert!(matches!(
        assert_variant_matched(&unmatched),
        Err(SchemaError::NoVariantMatch { .. })
    ));
    let matched = Variadic {
        kind: 1,
        a: Some(5),
        b: None,
    };
    assert!(assert_variant_matched(&matched).is_ok());
}

#[derive(Debug, Default)]
struct Frame {
    count: u8,
    values: Vec<Value>,
}

impl RecordAccess for Frame {
    fn get(&self, name: &'static str) -> Option<Value> {
        match name {
            "count" => Some(Value::U8(self.count)),
            "values" => Some(Value::Array(self.values.iter().map(Value::clone_scalar).collect())),
            _ => None,
        }
    }

    fn set(&mut self, name: &'static str, value: Value) -> Result<(), ParseError> {
        match name {
            "count" => self.count = value.as_u64().unwrap_or(0) as u8,
            "values" => {
                if let Value::Array(items) = value {
                    self.values = items;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl Described for Frame {
    fn schema() -> Schema {
        Schema::new("frame")
            .field(Field::uint("count", 8))
            .field(Field::array(
                "values",
                ArrayElement::Number {
                    signed: false,
                    bits: 8,
                    byte_order: ByteOrder::BigEndian,
                },
                crate::schema::ArrayCount::FromField("count"),
            ))
            .build()
    }
}

#[test]
fn array_from_field_reads_count_many_elements() {
    let mut r = BitReader::new();
    r.push(alloc::vec![3u8, 10, 20, 30]).unwrap();
    r.end();
    let frame: Frame = parse(&mut r).unwrap();
    assert_eq!(frame.values.len(), 3);
    assert_eq!(frame.values[1].as_u64(), Some(20));
}

#[test]
fn array_from_field_mismatch_errors_on_write_instead_of_serializing_silently() {
    let frame = Frame {
        count: 3,
        values: alloc::vec![Value::U8(1), Value::U8(2)],
    };
    match write(&frame) {
        Err(SerializeError::ArrayCountMismatch {
            expected: 3,
            actual: 2,
            ..
        }) => {}
        other => panic!("expected ArrayCountMismatch, got {other:?}"),
    }
}

#[derive(Debug, Default)]
struct DetArray {
    n: u8,
    values: Vec<Value>,
}

impl RecordAccess for DetArray {
    fn get(&self, name: &'static str) -> Option<Value> {
        match name {
            "n" => Some(Value::U8(self.n)),
            "values" => Some(Value::Array(self.values.iter().map(Value::clone_scalar).collect())),
            _ => None,
        }
    }

    fn set(&mut self, name: &'static str, value: Value) -> Result<(), ParseError> {
        match name {
            "n" => self.n = value.as_u64().unwrap_or(0) as u8,
            "values" => {
                if let Value::Array(items) = value {
                    self.values = items;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl Described for DetArray {
    fn schema() -> Schema {
        Schema::new("det_array")
            .field(Field::uint("n", 8))
            .field(Field::array(
                "values",
                ArrayElement::Number {
                    signed: false,
                    bits: 8,
                    byte_order: ByteOrder::BigEndian,
                },
                crate::schema::ArrayCount::Determinant(Box::new(|rec| {
                    let n = rec.get("n").and_then(|v| v.as_u64()).ok_or(
                        DeterminantError::UnreadField {
                            field: "values",
                            missing: "n",
                        },
                    )?;
                    Ok(n as usize * 2)
                })),
            ))
            .build()
    }
}

#[test]
fn array_determinant_count_reads_a_computed_element_count() {
    let mut r = BitReader::new();
    r.push(alloc::vec![2u8, 10, 20, 30, 40]).unwrap();
    r.end();
    let rec: DetArray = parse(&mut r).unwrap();
    assert_eq!(rec.values.len(), 4);
    assert_eq!(rec.values[3].as_u64(), Some(40));
}

#[test]
fn array_determinant_count_mismatch_errors_on_write() {
    let rec = DetArray {
        n: 2,
        values: alloc::vec![Value::U8(1), Value::U8(2), Value::U8(3)],
    };
    match write(&rec) {
        Err(SerializeError::ArrayCountMismatch {
            expected: 4,
            actual: 3,
            ..
        }) => {}
        other => panic!("expected ArrayCountMismatch, got {other:?}"),
    }
}

#[derive(Debug, Default)]
struct Tail {
    values: Vec<Value>,
}

impl RecordAccess for Tail {
    fn get(&self, name: &'static str) -> Option<Value> {
        match name {
            "values" => Some(Value::Array(self.values.iter().map(Value::clone_scalar).collect())),
            _ => None,
        }
    }

    fn set(&mut self, name: &'static str, value: Value) -> Result<(), ParseError> {
        if name == "values" {
            if let Value::Array(items) = value {
                self.values = items;
            }
        }
        Ok(())
    }
}

impl Described for Tail {
    fn schema() -> Schema {
        Schema::new("tail")
            .field(Field::array(
                "values",
                ArrayElement::Number {
                    signed: false,
                    bits: 8,
                    byte_order: ByteOrder::BigEndian,
                },
                crate::schema::ArrayCount::HasMore,
            ))
            .build()
    }
}

#[test]
fn array_has_more_consumes_until_input_exhausted() {
    let mut r = BitReader::new();
    r.push(alloc::vec![1u8, 2, 3, 4]).unwrap();
    r.end();
    let tail: Tail = parse(&mut r).unwrap();
    assert_eq!(tail.values.len(), 4);
    assert_eq!(r.available(), 0);
}

#[derive(Debug, Default)]
struct Outer {
    header: u8,
    inner: Option<Inner>,
    inner_was_set: bool,
}

#[derive(Debug, Default, Clone)]
struct Inner {
    a: u8,
    b: u8,
}

impl RecordAccess for Inner {
    fn get(&self, name: &'static str) -> Option<Value> {
        match name {
            "a" => Some(Value::U8(self.a)),
            "b" => Some(Value::U8(self.b)),
            _ => None,
        }
    }

    fn set(&mut self, name: &'static str, value: Value) -> Result<(), ParseError> {
        match name {
            "a" => self.a = value.as_u64().unwrap_or(0) as u8,
            "b" => self.b = value.as_u64().unwrap_or(0) as u8,
            _ => {}
        }
        Ok(())
    }
}

impl Described for Inner {
    fn schema() -> Schema {
        Schema::new("inner")
            .field(Field::uint("a", 8))
            .field(Field::uint("b", 8))
            .build()
    }
}

impl RecordAccess for Outer {
    fn get(&self, name: &'static str) -> Option<Value> {
        match name {
            "header" => Some(Value::U8(self.header)),
            "inner" => self
                .inner
                .clone()
                .map(|i| Value::Record(alloc::boxed::Box::new(i))),
            _ => None,
        }
    }

    fn set(&mut self, name: &'static str, value: Value) -> Result<(), ParseError> {
        match name {
            "header" => self.header = value.as_u64().unwrap_or(0) as u8,
            "inner" => match value {
                Value::Record(_) => self.inner_was_set = true,
                Value::Null => self.inner = None,
                _ => {}
            },
            _ => {}
        }
        Ok(())
    }
}

impl Described for Outer {
    fn schema() -> Schema {
        Schema::new("outer")
            .field(Field::uint("header", 8))
            .field(Field::nested(
                "inner",
                NestedSpec {
                    schema: Inner::schema(),
                    make: Box::new(|| alloc::boxed::Box::new(Inner::default())),
                },
            ))
            .build()
    }
}

#[test]
fn nested_record_field_parses_its_own_schema() {
    let mut r = BitReader::new();
    r.push(alloc::vec![5u8, 11, 22]).unwrap();
    r.end();
    let mut outer = Outer::default();
    parse_into(&Outer::schema(), &mut r, &mut outer).unwrap();
    assert_eq!(outer.header, 5);
    assert!(outer.inner_was_set);
}

#[test]
fn try_parse_returns_none_and_rewinds_on_short_input() {
    let mut r = BitReader::with_retain();
    r.push(alloc::vec![1u8]).unwrap();
    let before = r.offset();
    let result: Option<Msg> = try_parse(&mut r).unwrap();
    assert!(result.is_none());
    assert_eq!(r.offset(), before);
}

#[test]
fn parse_resumable_suspends_then_succeeds_once_more_data_arrives() {
    let mut r = BitReader::with_retain();
    r.push(alloc::vec![7u8, 2]).unwrap();
    match parse_resumable::<Msg>(&mut r) {
        Err(ParseError::Suspended { .. }) => {}
        other => panic!("expected Suspended, got {other:?}"),
    }
    r.push(alloc::vec![0xAAu8, 0xBB]).unwrap();
    r.end();
    let msg = parse_resumable::<Msg>(&mut r).unwrap();
    assert_eq!(msg.payload, alloc::vec![0xAA, 0xBB]);
}

#[test]
fn parse_resumable_rejects_reentry_while_a_suspension_is_already_outstanding() {
    let mut r = BitReader::with_retain();
    r.push(alloc::vec![7u8, 2]).unwrap();
    r.begin_suspension().unwrap();
    match parse_resumable::<Msg>(&mut r) {
        Err(ParseError::Reader {
            source: ReaderError::OutstandingRead,
            ..
        }) => {}
        other => panic!("expected OutstandingRead, got {other:?}"),
    }
    r.end_suspension();
}

#[test]
fn measure_reports_bit_length_of_a_field_range() {
    let msg = Msg {
        kind: 1,
        len: 4,
        payload: alloc::vec![0, 0, 0, 0],
    };
    let bits = measure(&msg, "kind", "payload").unwrap();
    assert_eq!(bits, 16);
}

#[derive(Debug, Default)]
struct Measured {
    a: u8,
    b: u8,
    c: u16,
    d: u8,
}

impl RecordAccess for Measured {
    fn get(&self, name: &'static str) -> Option<Value> {
        match name {
            "a" => Some(Value::U8(self.a)),
            "b" => Some(Value::U8(self.b)),
            "c" => Some(Value::U16(self.c)),
            "d" => Some(Value::U8(self.d)),
            _ => None,
        }
    }

    fn set(&mut self, name: &'static str, value: Value) -> Result<(), ParseError> {
        match name {
            "a" => self.a = value.as_u64().unwrap_or(0) as u8,
            "b" => self.b = value.as_u64().unwrap_or(0) as u8,
            "c" => self.c = value.as_u64().unwrap_or(0) as u16,
            "d" => self.d = value.as_u64().unwrap_or(0) as u8,
            _ => {}
        }
        Ok(())
    }

    fn schema_for_measure(&self) -> Option<Schema> {
        Some(Self::schema())
    }
}

impl Described for Measured {
    fn schema() -> Schema {
        Schema::new("measured")
            .field(Field::uint("a", 8))
            .field(Field::uint("b", 8))
            .field(Field::uint_dynamic("c", Box::new(|rec| rec.measure_to("c"))))
            .field(Field::uint("d", 8))
            .build()
    }
}

#[test]
fn length_determinant_measures_bits_emitted_so_far() {
    let mut r = BitReader::new();
    r.push(alloc::vec![11u8, 22, 0, 33, 44]).unwrap();
    r.end();
    let rec: Measured = parse(&mut r).unwrap();
    assert_eq!(rec.a, 11);
    assert_eq!(rec.b, 22);
    assert_eq!(rec.c, 33);
    assert_eq!(rec.d, 44);

    let bytes = write(&rec).unwrap();
    assert_eq!(bytes, alloc::vec![11, 22, 0, 33, 44]);
}

#[test]
fn context_with_and_get_round_trip_host_data() {
    let device_id: u32 = 42;
    let ctx = Context::with(&device_id);
    assert_eq!(ctx.get::<u32>(), Some(&42));
    assert_eq!(ctx.get::<i64>(), None);
}

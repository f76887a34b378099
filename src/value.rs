//! Dynamic value representation threaded between the serializer registry and
//! a record instance, and the trait record types implement to expose their
//! fields to the engine by name — the runtime counterpart of a `PgnValue` /
//! `FieldAccess` pair, generalized with nested records and arrays since this
//! engine, unlike a flat CAN payload, has to support both.
use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

use crate::error::{DeterminantError, ParseError};

/// A field's value, erased to a common runtime type so the engine can move
/// it between the bit-level serializers and a record instance without
/// knowing the instance's concrete Rust type.
#[derive(Debug)]
pub enum Value {
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    U128(u128),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    I128(i128),
    F32(f32),
    F64(f64),
    Bool(bool),
    Str(String),
    Bytes(Vec<u8>),
    /// A fully-parsed nested record, type-erased behind `RecordAccess`.
    Record(Box<dyn RecordAccess>),
    Array(Vec<Value>),
    /// Contributes zero bits; used for markers and absent optional fields.
    Null,
}

impl Value {
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::U8(v) => Some(v as u64),
            Value::U16(v) => Some(v as u64),
            Value::U32(v) => Some(v as u64),
            Value::U64(v) => Some(v),
            Value::U128(v) => u64::try_from(v).ok(),
            Value::Bool(v) => Some(v as u64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::I8(v) => Some(v as i64),
            Value::I16(v) => Some(v as i64),
            Value::I32(v) => Some(v as i64),
            Value::I64(v) => Some(v),
            Value::I128(v) => i64::try_from(v).ok(),
            _ => self.as_u64().and_then(|v| i64::try_from(v).ok()),
        }
    }

    pub fn as_u128(&self) -> Option<u128> {
        match *self {
            Value::U128(v) => Some(v),
            _ => self.as_u64().map(|v| v as u128),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::F64(v) => Some(v),
            Value::F32(v) => Some(v as f64),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            Value::Str(s) => Some(s.as_bytes()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }

    /// Clones a scalar/bytes/string value. Never called on `Record` (a
    /// constant or computed field value is never a nested record) —
    /// `written_value` policies that hold one are a schema-construction
    /// bug, not a runtime condition.
    pub fn clone_scalar(&self) -> Value {
        match self {
            Value::U8(v) => Value::U8(*v),
            Value::U16(v) => Value::U16(*v),
            Value::U32(v) => Value::U32(*v),
            Value::U64(v) => Value::U64(*v),
            Value::U128(v) => Value::U128(*v),
            Value::I8(v) => Value::I8(*v),
            Value::I16(v) => Value::I16(*v),
            Value::I32(v) => Value::I32(*v),
            Value::I64(v) => Value::I64(*v),
            Value::I128(v) => Value::I128(*v),
            Value::F32(v) => Value::F32(*v),
            Value::F64(v) => Value::F64(*v),
            Value::Bool(v) => Value::Bool(*v),
            Value::Str(s) => Value::Str(s.clone()),
            Value::Bytes(b) => Value::Bytes(b.clone()),
            Value::Array(a) => Value::Array(a.iter().map(Value::clone_scalar).collect()),
            Value::Null => Value::Null,
            Value::Record(_) => Value::Null,
        }
    }
}

/// Implemented by every record type the engine parses or serializes. Plays
/// the role generated PGN structs would play via a `FieldAccess` trait, but
/// is hand-written here (or provided by a host-language declaration
/// surface) since no derive macro is in scope for this crate.
pub trait RecordAccess: core::fmt::Debug {
    /// Read a field's current value by name.
    fn get(&self, name: &'static str) -> Option<Value>;

    /// Assign a field's value by name. `Err` means the name is unknown or
    /// the value's runtime type doesn't match what the field expects.
    fn set(&mut self, name: &'static str, value: Value) -> Result<(), ParseError>;

    /// Exposes this record's own schema so a length determinant holding
    /// only `&dyn RecordAccess` can measure a range of it. `None` by
    /// default; a concrete type overrides this with `Some(Self::schema())`
    /// only if one of its own determinants calls `measure`/`measure_to`/
    /// `measure_from`/`measure_field`.
    fn schema_for_measure(&self) -> Option<crate::schema::Schema> {
        None
    }

    /// Bit length the half-open field range `[from, to)` would occupy if
    /// written right now; `None` means "start"/"end" of the record. Mirrors
    /// `engine::measure`, but reachable from inside a boxed determinant
    /// closure that only has `&dyn RecordAccess`.
    fn measure(
        &self,
        from: Option<&'static str>,
        to: Option<&'static str>,
    ) -> Result<u32, DeterminantError> {
        crate::engine::measure_dyn(self, from, to)
    }

    /// `measure(None, Some(field))`.
    fn measure_to(&self, field: &'static str) -> Result<u32, DeterminantError> {
        self.measure(None, Some(field))
    }

    /// `measure(Some(field), None)`.
    fn measure_from(&self, field: &'static str) -> Result<u32, DeterminantError> {
        self.measure(Some(field), None)
    }

    /// Bit length of exactly one field.
    fn measure_field(&self, field: &'static str) -> Result<u32, DeterminantError> {
        crate::engine::measure_dyn_field(self, field)
    }
}

/// Implemented by record types that can stand alone as the target of
/// `engine::parse`/`engine::write`: gives the engine a blank instance to
/// populate field-by-field and the static schema describing its layout.
pub trait Described: RecordAccess + Default + 'static {
    fn schema() -> crate::schema::Schema;
}

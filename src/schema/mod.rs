//! Declarative description of a record's layout: field order, bit widths
//! (fixed or determinant-derived), presence rules, byte order, and the
//! variant graph a record may specialize into. Generalizes a static
//! `PgnDescriptor`/`FieldDescriptor`/`RepeatingFieldSet` table from one fixed
//! CAN payload shape to an arbitrary, variant-aware record tree built at
//! runtime through `SchemaBuilder` — a hand-written stand-in for the
//! declarative sugar (derive macros / decorators) a host language would
//! otherwise provide.
use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::error::DeterminantError;
use crate::reader::{ByteOrder, StringEncoding};
use crate::value::{RecordAccess, Value};


/// A length, presence, or value determinant: a pure function of the fields
/// already parsed on the record instance being built. Determinants never
/// see unparsed fields (the engine only ever calls them after the fields
/// they can depend on have been assigned), and the same purity lets a
/// suspended parse simply retry from the start once more data arrives.
pub type LengthFn = Box<dyn Fn(&dyn RecordAccess) -> Result<u32, DeterminantError>>;
pub type CountFn = Box<dyn Fn(&dyn RecordAccess) -> Result<usize, DeterminantError>>;
pub type PredicateFn = Box<dyn Fn(&dyn RecordAccess) -> Result<bool, DeterminantError>>;
pub type ValueFn = Box<dyn Fn(&dyn RecordAccess) -> Result<Value, DeterminantError>>;
pub type ReadAheadTest = Box<dyn Fn(u128) -> bool>;

/// A field's bit width: either known up front or computed from fields
/// already parsed (e.g. a preceding length prefix).
pub enum FieldLength {
    Bits(u32),
    Dynamic(LengthFn),
}

impl core::fmt::Debug for FieldLength {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FieldLength::Bits(n) => write!(f, "Bits({n})"),
            FieldLength::Dynamic(_) => write!(f, "Dynamic(..)"),
        }
    }
}

/// The three boolean interpretation modes: a plain nonzero-is-true flag, its
/// inverse (zero-is-true, used by a few "active low" protocol fields), and
/// an exact-sentinel comparison for fields where only one specific bit
/// pattern counts as true and everything else (including "unset"
/// all-ones placeholders) is false.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolMode {
    NonzeroIsTrue,
    ZeroIsTrue,
    Sentinel(u64),
}

impl BoolMode {
    pub fn decode(&self, raw: u64) -> bool {
        match *self {
            BoolMode::NonzeroIsTrue => raw != 0,
            BoolMode::ZeroIsTrue => raw == 0,
            BoolMode::Sentinel(s) => raw == s,
        }
    }

    pub fn encode(&self, value: bool) -> u64 {
        match *self {
            BoolMode::NonzeroIsTrue => value as u64,
            BoolMode::ZeroIsTrue => !value as u64,
            BoolMode::Sentinel(s) => {
                if value {
                    s
                } else {
                    !s & 0x1
                }
            }
        }
    }
}

/// How a field's presence is decided before it's read.
pub enum Presence {
    /// Always read.
    Always,
    /// Read only if a predicate over already-parsed fields holds.
    Predicate(PredicateFn),
    /// Peek `bits` ahead without consuming; read the field for real only if
    /// `test` accepts the peeked value.
    ReadAhead { bits: u32, test: ReadAheadTest },
}

impl core::fmt::Debug for Presence {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Presence::Always => write!(f, "Always"),
            Presence::Predicate(_) => write!(f, "Predicate(..)"),
            Presence::ReadAhead { bits, .. } => write!(f, "ReadAhead({bits})"),
        }
    }
}

/// What value gets written for a field during serialization.
pub enum WrittenValue {
    /// Ask the record instance for its current value (the common case).
    FromRecord,
    /// Always write this fixed value, ignoring the instance (markers,
    /// reserved fields).
    Constant(Value),
    /// Compute the value from other already-assigned fields (e.g. a
    /// redundant length prefix the engine fills in itself).
    Computed(ValueFn),
}

impl core::fmt::Debug for WrittenValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            WrittenValue::FromRecord => write!(f, "FromRecord"),
            WrittenValue::Constant(v) => write!(f, "Constant({v:?})"),
            WrittenValue::Computed(_) => write!(f, "Computed(..)"),
        }
    }
}

/// Blank-instance factory plus layout for a nested record field.
pub struct NestedSpec {
    pub schema: Schema,
    pub make: Box<dyn Fn() -> Box<dyn RecordAccess>>,
}

impl core::fmt::Debug for NestedSpec {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NestedSpec")
            .field("schema", &self.schema.name)
            .finish()
    }
}

/// The element type of an array field.
pub enum ArrayElement {
    Number {
        signed: bool,
        bits: u32,
        byte_order: ByteOrder,
    },
    Nested(NestedSpec),
}

impl core::fmt::Debug for ArrayElement {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ArrayElement::Number { bits, signed, .. } => {
                write!(f, "Number {{ bits: {bits}, signed: {signed} }}")
            }
            ArrayElement::Nested(n) => write!(f, "Nested({:?})", n.schema.name),
        }
    }
}

/// The array-length strategies: a compile-time literal, a value already
/// parsed into a named sibling field, a determinant computed from
/// already-parsed fields, or "has more" — the engine keeps appending
/// elements as long as the reader has at least one more element's worth of
/// bits buffered (or, when writing, as long as the record's array still has
/// entries).
pub enum ArrayCount {
    Literal(usize),
    FromField(&'static str),
    Determinant(CountFn),
    HasMore,
}

impl core::fmt::Debug for ArrayCount {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ArrayCount::Literal(n) => write!(f, "Literal({n})"),
            ArrayCount::FromField(name) => write!(f, "FromField({name})"),
            ArrayCount::Determinant(_) => write!(f, "Determinant(..)"),
            ArrayCount::HasMore => write!(f, "HasMore"),
        }
    }
}

/// A field's serializer kind, dispatched on by the registry.
pub enum FieldKind {
    UInt,
    Int,
    Bool(BoolMode),
    Float,
    Bytes { truncate: bool, fill: Option<u8> },
    Str(StringEncoding),
    Nested(NestedSpec),
    Array(ArrayElement, ArrayCount),
    /// Contributes zero bits; used for reserved/marker placeholders.
    Null,
}

impl core::fmt::Debug for FieldKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FieldKind::UInt => write!(f, "UInt"),
            FieldKind::Int => write!(f, "Int"),
            FieldKind::Bool(m) => write!(f, "Bool({m:?})"),
            FieldKind::Float => write!(f, "Float"),
            FieldKind::Bytes { truncate, fill } => {
                write!(f, "Bytes {{ truncate: {truncate}, fill: {fill:?} }}")
            }
            FieldKind::Str(e) => write!(f, "Str({e:?})"),
            FieldKind::Nested(n) => write!(f, "Nested({n:?})"),
            FieldKind::Array(e, c) => write!(f, "Array({e:?}, {c:?})"),
            FieldKind::Null => write!(f, "Null"),
        }
    }
}

#[derive(Debug)]
pub struct Field {
    pub name: &'static str,
    pub kind: FieldKind,
    pub length: FieldLength,
    pub byte_order: ByteOrder,
    pub presence: Presence,
    pub written_value: WrittenValue,
}

impl Field {
    fn base(name: &'static str, kind: FieldKind, length: FieldLength) -> Self {
        Self {
            name,
            kind,
            length,
            byte_order: ByteOrder::BigEndian,
            presence: Presence::Always,
            written_value: WrittenValue::FromRecord,
        }
    }

    pub fn uint(name: &'static str, bits: u32) -> Self {
        Self::base(name, FieldKind::UInt, FieldLength::Bits(bits))
    }

    pub fn uint_dynamic(name: &'static str, length: LengthFn) -> Self {
        Self::base(name, FieldKind::UInt, FieldLength::Dynamic(length))
    }

    pub fn int(name: &'static str, bits: u32) -> Self {
        Self::base(name, FieldKind::Int, FieldLength::Bits(bits))
    }

    pub fn bool_field(name: &'static str, bits: u32, mode: BoolMode) -> Self {
        Self::base(name, FieldKind::Bool(mode), FieldLength::Bits(bits))
    }

    pub fn float(name: &'static str, width: u32) -> Self {
        Self::base(name, FieldKind::Float, FieldLength::Bits(width))
    }

    pub fn bytes(name: &'static str, byte_len: u32, truncate: bool, fill: Option<u8>) -> Self {
        Self::base(
            name,
            FieldKind::Bytes { truncate, fill },
            FieldLength::Bits(byte_len * 8),
        )
    }

    pub fn bytes_dynamic(name: &'static str, length: LengthFn) -> Self {
        Self::base(
            name,
            FieldKind::Bytes {
                truncate: false,
                fill: None,
            },
            FieldLength::Dynamic(length),
        )
    }

    pub fn string(name: &'static str, byte_len: u32, encoding: StringEncoding) -> Self {
        Self::base(
            name,
            FieldKind::Str(encoding),
            FieldLength::Bits(byte_len * 8),
        )
    }

    pub fn string_dynamic(name: &'static str, encoding: StringEncoding, length: LengthFn) -> Self {
        Self::base(name, FieldKind::Str(encoding), FieldLength::Dynamic(length))
    }

    pub fn nested(name: &'static str, nested: NestedSpec) -> Self {
        Self::base(name, FieldKind::Nested(nested), FieldLength::Bits(0))
    }

    pub fn array(name: &'static str, element: ArrayElement, count: ArrayCount) -> Self {
        Self::base(name, FieldKind::Array(element, count), FieldLength::Bits(0))
    }

    pub fn reserved(name: &'static str, bits: u32) -> Self {
        Self::base(name, FieldKind::Null, FieldLength::Bits(bits))
    }

    pub fn with_byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = order;
        self
    }

    pub fn with_presence(mut self, presence: Presence) -> Self {
        self.presence = presence;
        self
    }

    pub fn with_written_value(mut self, written: WrittenValue) -> Self {
        self.written_value = written;
        self
    }
}

/// Priority used to break ties when more than one variant case's
/// discriminant would match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantPriority {
    First,
    Last,
    Value(i32),
}

pub struct VariantCase {
    pub name: &'static str,
    pub match_value: Value,
    pub priority: VariantPriority,
    pub fields: Vec<Field>,
    /// `None` appends the case's fields at the end of the base record
    /// ("tail variation"); `Some(field_name)` splices them in immediately
    /// after that base field ("marker variation").
    pub marker_after: Option<&'static str>,
}

impl core::fmt::Debug for VariantCase {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("VariantCase")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("marker_after", &self.marker_after)
            .finish()
    }
}

/// A discriminant function plus the set of cases it selects between.
pub struct Variant {
    pub discriminant: ValueFn,
    pub cases: Vec<VariantCase>,
    pub default_case: Option<usize>,
}

impl core::fmt::Debug for Variant {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Variant")
            .field("cases", &self.cases)
            .field("default_case", &self.default_case)
            .finish()
    }
}

/// Compares two discriminant values for equality. Only scalar variants are
/// meaningful discriminants; `Record`/`Array`/`Null` never match.
pub fn values_eq(a: &Value, b: &Value) -> bool {
    if let (Value::Str(x), Value::Str(y)) = (a, b) {
        return x == y;
    }
    if let (Value::Bool(x), Value::Bool(y)) = (a, b) {
        return x == y;
    }
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => return x == y,
        _ => {}
    }
    false
}

/// Picks the matching case with the highest priority, breaking ties by
/// declaration order within equal-priority groups (`First` wins among
/// `First`s, `Last` wins among `Last`s, higher `Value` wins among
/// `Value`s).
pub fn select_case<'a>(variant: &'a Variant, discriminant: &Value) -> Option<&'a VariantCase> {
    let mut best: Option<&VariantCase> = None;
    for case in &variant.cases {
        if !values_eq(&case.match_value, discriminant) {
            continue;
        }
        best = Some(match best {
            None => case,
            Some(prev) => pick_higher_priority(prev, case),
        });
    }
    best.or_else(|| variant.default_case.map(|i| &variant.cases[i]))
}

fn pick_higher_priority<'a>(prev: &'a VariantCase, next: &'a VariantCase) -> &'a VariantCase {
    match (prev.priority, next.priority) {
        (VariantPriority::Value(a), VariantPriority::Value(b)) => {
            if b >= a {
                next
            } else {
                prev
            }
        }
        (VariantPriority::Value(_), _) => prev,
        (_, VariantPriority::Value(_)) => next,
        (VariantPriority::Last, _) => next,
        (_, VariantPriority::Last) => next,
        (VariantPriority::First, VariantPriority::First) => prev,
    }
}

#[derive(Debug)]
pub struct Schema {
    pub name: &'static str,
    pub fields: Vec<Field>,
    pub variant: Option<Variant>,
}

impl Schema {
    pub fn new(name: &'static str) -> SchemaBuilder {
        SchemaBuilder {
            name,
            fields: Vec::new(),
            variant: None,
        }
    }
}

/// Runtime builder for a `Schema`; the host-neutral "declaration mechanism"
/// this crate exposes instead of a derive macro.
pub struct SchemaBuilder {
    name: &'static str,
    fields: Vec<Field>,
    variant: Option<Variant>,
}

impl SchemaBuilder {
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn variant(mut self, variant: Variant) -> Self {
        self.variant = Some(variant);
        self
    }

    pub fn build(self) -> Schema {
        Schema {
            name: self.name,
            fields: self.fields,
            variant: self.variant,
        }
    }
}

//! Bit-accurate streaming reader/writer plus a resumable, variant-aware
//! binary record engine.
//!
//! The reader/writer pair (`reader`, `writer`) compose values bit by bit,
//! MSB-first within each byte, over a queue of buffers the host pushes in as
//! they arrive. The schema/registry/engine stack (`schema`, `registry`,
//! `engine`) drives a declared field layout against that pair: fixed or
//! determinant-derived field lengths, optional fields, nested records,
//! arrays, and runtime specialization into one of several variant cases.
#![no_std]
#![cfg_attr(docsrs, feature(doc_cfg))]

extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

pub mod engine;
pub mod error;
pub mod reader;
pub mod registry;
pub mod schema;
pub mod value;
pub mod writer;

#[cfg(feature = "futures")]
pub mod async_io;

pub use engine::{
    assert_variant_matched, measure, parse, parse_into, parse_resumable, try_parse, write,
    write_checked, write_into, Context,
};
pub use error::{ParseError, ReaderError, SchemaError, SerializeError, WriterError};
pub use reader::{BitReader, ByteOrder, Chunk, StringEncoding, StringOptions};
pub use schema::{Schema, SchemaBuilder};
pub use value::{Described, RecordAccess, Value};
pub use writer::{BitSink, BitWriter, MeasuringWriter};

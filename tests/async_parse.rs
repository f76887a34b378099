#![cfg(feature = "futures")]

use bitrecord::async_io::parse_async;
use bitrecord::error::DeterminantError;
use bitrecord::schema::Field;
use bitrecord::{BitReader, Described, ParseError, RecordAccess, Schema, Value};
use futures_util::stream;

#[derive(Debug, Default)]
struct Packet {
    kind: u8,
    len: u8,
    payload: Vec<u8>,
}

impl RecordAccess for Packet {
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

impl Described for Packet {
    fn schema() -> Schema {
        Schema::new("packet")
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

#[tokio::test]
async fn parse_async_awaits_more_chunks_across_suspensions() {
    let chunks: Vec<bitrecord::Chunk> = vec![
        vec![7u8, 2].into(),
        vec![0xAAu8].into(),
        vec![0xBBu8].into(),
    ];
    let mut source = stream::iter(chunks);
    let mut reader = BitReader::with_retain();
    let packet: Packet = parse_async(&mut reader, &mut source).await.unwrap();
    assert_eq!(packet.kind, 7);
    assert_eq!(packet.len, 2);
    assert_eq!(packet.payload, vec![0xAA, 0xBB]);
}

#[tokio::test]
async fn parse_async_surfaces_suspended_when_source_ends_mid_record() {
    let chunks: Vec<bitrecord::Chunk> = vec![vec![7u8, 2].into(), vec![0xAAu8].into()];
    let mut source = stream::iter(chunks);
    let mut reader = BitReader::with_retain();
    let result: Result<Packet, _> = parse_async(&mut reader, &mut source).await;
    assert!(matches!(result, Err(ParseError::Suspended { .. })));
}

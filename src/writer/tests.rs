use super::*;
use crate::reader::BitReader;

#[test]
fn write_then_read_round_trips_unaligned_fields() {
    let mut w = BitWriter::new();
    w.write(1, 1).unwrap();
    w.write(0b100, 3).unwrap();
    w.write(0b10000, 5).unwrap();
    w.write(1, 1).unwrap();
    w.write(0b01010, 5).unwrap();
    w.write(0, 1).unwrap();
    w.write(0b11101001, 8).unwrap();
    let bytes = w.finish();
    assert_eq!(bytes, alloc::vec![0b11001000, 0b01010100, 0b11101001]);

    let mut r = BitReader::new();
    r.push(bytes).unwrap();
    r.end();
    assert_eq!(r.read(1).unwrap(), 1);
    assert_eq!(r.read(3).unwrap(), 0b100);
    assert_eq!(r.read(5).unwrap(), 0b10000);
}

#[test]
fn write_signed_round_trips_negative_values() {
    let mut w = BitWriter::new();
    w.write_signed(-1, 4).unwrap();
    w.write_signed(5, 4).unwrap();
    let bytes = w.finish();

    let mut r = BitReader::new();
    r.push(bytes).unwrap();
    r.end();
    assert_eq!(r.read_signed(4).unwrap(), -1);
    assert_eq!(r.read_signed(4).unwrap(), 5);
}

#[test]
fn finish_zero_pads_the_trailing_partial_byte() {
    let mut w = BitWriter::new();
    w.write(0b101, 3).unwrap();
    let bytes = w.finish();
    assert_eq!(bytes, alloc::vec![0b10100000]);
}

#[test]
fn drain_ready_only_releases_whole_bytes() {
    let mut w = BitWriter::new();
    w.write(0xFF, 8).unwrap();
    w.write(0b101, 3).unwrap();
    let drained = w.drain_ready();
    assert_eq!(drained, alloc::vec![0xFF]);
    assert_eq!(w.bit_len(), 3);
}

#[test]
fn measuring_writer_counts_without_storing_bytes() {
    let mut m = MeasuringWriter::new();
    m.write(0, 5).unwrap();
    m.write_bytes(&[1, 2, 3]).unwrap();
    m.write_float(1.0, 32).unwrap();
    assert_eq!(m.bit_len(), 5 + 24 + 32);
}

#[test]
fn write_string_null_terminated_adds_one_zero_byte() {
    let mut w = BitWriter::new();
    w.write_string(
        "hi",
        StringWriteOptions {
            null_terminated: true,
            #[cfg(feature = "utf16")]
            utf16: false,
        },
    )
    .unwrap();
    let bytes = w.finish();
    assert_eq!(bytes, alloc::vec![b'h', b'i', 0]);
}

//! Unit tests for NDJSON line framing and the per-line size limit.

use agent_conduit::protocol::{LineCodec, MAX_LINE_BYTES};
use agent_conduit::AppError;
use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

#[test]
fn decodes_one_complete_line() {
    let mut codec = LineCodec::new();
    let mut buf = BytesMut::from(&b"{\"type\":\"status\"}\n"[..]);

    let line = codec.decode(&mut buf).expect("decode").expect("one line");
    assert_eq!(line, "{\"type\":\"status\"}");
    assert!(codec.decode(&mut buf).expect("decode").is_none());
}

#[test]
fn buffers_partial_line_until_newline_arrives() {
    let mut codec = LineCodec::new();
    let mut buf = BytesMut::from(&b"partial"[..]);

    assert!(codec.decode(&mut buf).expect("decode").is_none());

    buf.extend_from_slice(b" line\n");
    let line = codec.decode(&mut buf).expect("decode").expect("one line");
    assert_eq!(line, "partial line");
}

#[test]
fn decodes_multiple_lines_in_order() {
    let mut codec = LineCodec::new();
    let mut buf = BytesMut::from(&b"first\nsecond\nthird\n"[..]);

    for expected in ["first", "second", "third"] {
        let line = codec.decode(&mut buf).expect("decode").expect("a line");
        assert_eq!(line, expected);
    }
}

#[test]
fn decode_eof_yields_final_unterminated_line() {
    let mut codec = LineCodec::new();
    let mut buf = BytesMut::from(&b"no trailing newline"[..]);

    let line = codec
        .decode_eof(&mut buf)
        .expect("decode_eof")
        .expect("final line");
    assert_eq!(line, "no trailing newline");
}

#[test]
fn oversized_line_is_rejected() {
    let mut codec = LineCodec::new();
    let mut oversized = vec![b'x'; MAX_LINE_BYTES + 1];
    oversized.push(b'\n');
    let mut buf = BytesMut::from(oversized.as_slice());

    let err = codec.decode(&mut buf).expect_err("must reject");
    assert!(matches!(err, AppError::Protocol(_)));
    assert!(err.to_string().contains("line too long"));
}

#[test]
fn encodes_line_with_newline_terminator() {
    let mut codec = LineCodec::new();
    let mut buf = BytesMut::new();

    codec
        .encode("{\"type\":\"exit\"}".to_owned(), &mut buf)
        .expect("encode");
    assert_eq!(&buf[..], b"{\"type\":\"exit\"}\n");
}

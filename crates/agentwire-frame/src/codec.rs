use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::command::{CommandCode, COMMAND_LEN};
use crate::error::{FrameError, Result};
use crate::frame::Frame;
use crate::object::{Header, PayloadObject, RoutingObject};

/// Fixed prefix: command (4) + seqno (4) + body length (4) + three counts (2 each).
pub const PREFIX_SIZE: usize = 18;

/// Default maximum body size: 16 MiB.
pub const DEFAULT_MAX_BODY: usize = 16 * 1024 * 1024;

const HEADER_ENTRY_OVERHEAD: usize = 2 + 4;
const PO_ENTRY_OVERHEAD: usize = 4 + 4;
const RO_ENTRY_OVERHEAD: usize = 1 + 4;

/// Encoded size of `frame`, prefix included.
pub fn encoded_len(frame: &Frame) -> usize {
    PREFIX_SIZE + body_len(frame)
}

fn body_len(frame: &Frame) -> usize {
    let headers: usize = frame
        .headers()
        .iter()
        .map(|h| HEADER_ENTRY_OVERHEAD + h.key().len() + h.value().len())
        .sum();
    let pos: usize = frame
        .payload_objects()
        .iter()
        .map(|po| PO_ENTRY_OVERHEAD + po.len())
        .sum();
    let ros: usize = frame
        .routing_objects()
        .iter()
        .map(|ro| RO_ENTRY_OVERHEAD + ro.len())
        .sum();
    headers + pos + ros
}

/// Encode a frame into the wire format.
///
/// Wire format (all integers big-endian):
/// ```text
/// ┌─────────┬────────┬──────────┬──────────┬────────┬────────┬──────────────┐
/// │ Command │ Seqno  │ Body len │ #headers │ #POs   │ #ROs   │ Body         │
/// │ (4B)    │ (4B)   │ (4B)     │ (2B)     │ (2B)   │ (2B)   │ (Body len B) │
/// └─────────┴────────┴──────────┴──────────┴────────┴────────┴──────────────┘
///
/// header entry:  key len (2B) | key | value len (4B) | value
/// PO entry:      ponum (4B)   | len (4B) | bytes
/// RO entry:      ronum (1B)   | len (4B) | bytes
/// ```
/// Entries appear headers first, then POs, then ROs, each in insertion order.
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    let body = body_len(frame);
    let body_u32 = u32::try_from(body).map_err(|_| FrameError::PayloadTooLarge {
        size: body,
        max: u32::MAX as usize,
    })?;
    let n_headers = count_u16("headers", frame.headers().len())?;
    let n_pos = count_u16("payload objects", frame.payload_objects().len())?;
    let n_ros = count_u16("routing objects", frame.routing_objects().len())?;

    // Validate every length before writing so a failure leaves `dst` untouched.
    for header in frame.headers() {
        if header.key().len() > u16::MAX as usize {
            return Err(FrameError::InvalidFrame(format!(
                "header key longer than {} bytes",
                u16::MAX
            )));
        }
        len_u32(header.value().len())?;
    }
    for po in frame.payload_objects() {
        len_u32(po.len())?;
    }
    for ro in frame.routing_objects() {
        len_u32(ro.len())?;
    }

    dst.reserve(PREFIX_SIZE + body);
    dst.put_slice(frame.command().as_bytes());
    dst.put_u32(frame.seqno());
    dst.put_u32(body_u32);
    dst.put_u16(n_headers);
    dst.put_u16(n_pos);
    dst.put_u16(n_ros);

    for header in frame.headers() {
        dst.put_u16(header.key().len() as u16);
        dst.put_slice(header.key().as_bytes());
        dst.put_u32(header.value().len() as u32);
        dst.put_slice(header.value());
    }
    for po in frame.payload_objects() {
        dst.put_u32(po.ponum());
        dst.put_u32(po.len() as u32);
        dst.put_slice(po.content());
    }
    for ro in frame.routing_objects() {
        dst.put_u8(ro.ronum());
        dst.put_u32(ro.len() as u32);
        dst.put_slice(ro.content());
    }
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer. Any error means the
/// stream can no longer be trusted to be aligned on a frame boundary.
pub fn decode_frame(src: &mut BytesMut, max_body: usize) -> Result<Option<Frame>> {
    if src.len() < PREFIX_SIZE {
        return Ok(None); // Need more data
    }

    let mut code = [0u8; COMMAND_LEN];
    code.copy_from_slice(&src[..COMMAND_LEN]);
    let command = CommandCode::from_bytes(code).map_err(|_| {
        FrameError::Malformed(format!(
            "bad command code {:?}",
            String::from_utf8_lossy(&code)
        ))
    })?;

    let mut prefix = &src[COMMAND_LEN..PREFIX_SIZE];
    let seqno = prefix.get_u32();
    let body = prefix.get_u32() as usize;
    let n_headers = prefix.get_u16();
    let n_pos = prefix.get_u16();
    let n_ros = prefix.get_u16();

    if body > max_body {
        return Err(FrameError::PayloadTooLarge {
            size: body,
            max: max_body,
        });
    }

    if src.len() < PREFIX_SIZE + body {
        return Ok(None); // Need more data
    }

    src.advance(PREFIX_SIZE);
    let mut body = src.split_to(body).freeze();

    let mut frame = Frame::with_code(command, seqno);
    for _ in 0..n_headers {
        let key_len = take_u16(&mut body, "header key length")? as usize;
        let key = take_bytes(&mut body, key_len, "header key")?;
        let key = String::from_utf8(key.to_vec())
            .map_err(|_| FrameError::Malformed("header key is not UTF-8".to_string()))?;
        let value_len = take_u32(&mut body, "header value length")? as usize;
        let value = take_bytes(&mut body, value_len, "header value")?;
        let header = Header::new(key, value)
            .map_err(|_| FrameError::Malformed("empty header key".to_string()))?;
        frame.push_header(header);
    }
    for _ in 0..n_pos {
        let ponum = take_u32(&mut body, "payload object number")?;
        let len = take_u32(&mut body, "payload object length")? as usize;
        let content = take_bytes(&mut body, len, "payload object")?;
        frame.add_payload_object(PayloadObject::new(ponum, content));
    }
    for _ in 0..n_ros {
        let ronum = take_u8(&mut body, "routing object number")?;
        let len = take_u32(&mut body, "routing object length")? as usize;
        let content = take_bytes(&mut body, len, "routing object")?;
        frame.add_routing_object(RoutingObject::new(ronum, content));
    }

    if body.has_remaining() {
        return Err(FrameError::Malformed(format!(
            "{} trailing bytes after declared entries",
            body.remaining()
        )));
    }

    Ok(Some(frame))
}

fn count_u16(what: &str, n: usize) -> Result<u16> {
    u16::try_from(n).map_err(|_| {
        FrameError::InvalidFrame(format!("too many {what}: {n} (max {})", u16::MAX))
    })
}

fn len_u32(n: usize) -> Result<u32> {
    u32::try_from(n).map_err(|_| FrameError::PayloadTooLarge {
        size: n,
        max: u32::MAX as usize,
    })
}

fn truncated(what: &str) -> FrameError {
    FrameError::Malformed(format!("truncated {what}"))
}

fn take_u8(body: &mut Bytes, what: &str) -> Result<u8> {
    if body.remaining() < 1 {
        return Err(truncated(what));
    }
    Ok(body.get_u8())
}

fn take_u16(body: &mut Bytes, what: &str) -> Result<u16> {
    if body.remaining() < 2 {
        return Err(truncated(what));
    }
    Ok(body.get_u16())
}

fn take_u32(body: &mut Bytes, what: &str) -> Result<u32> {
    if body.remaining() < 4 {
        return Err(truncated(what));
    }
    Ok(body.get_u32())
}

fn take_bytes(body: &mut Bytes, len: usize, what: &str) -> Result<Bytes> {
    if body.remaining() < len {
        return Err(truncated(what));
    }
    Ok(body.split_to(len))
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum body size in bytes. Default: 16 MiB.
    pub max_body_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_body_size: DEFAULT_MAX_BODY,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{PUBLISH, RESPONSE, RESULT};

    fn sample() -> Frame {
        let mut f = Frame::with_code(PUBLISH, 42);
        f.add_header("uri", "a/b/c").unwrap();
        f.add_header("revoker", "r1").unwrap();
        f.add_header("revoker", "r2").unwrap();
        // Binary value containing what a text grammar would treat as delimiters.
        f.add_header("blob", vec![b'\n', 0, b' ', 0xff]).unwrap();
        f.add_payload_object(PayloadObject::new(64, "hello"));
        f.add_payload_object(PayloadObject::new(0x0200_0001, Vec::<u8>::new()));
        f.add_routing_object(RoutingObject::new(2, vec![9u8; 33]));
        f
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let frame = sample();
        let mut buf = BytesMut::new();
        encode_frame(&frame, &mut buf).unwrap();
        assert_eq!(buf.len(), frame.wire_size());

        let decoded = decode_frame(&mut buf, DEFAULT_MAX_BODY).unwrap().unwrap();
        assert_eq!(decoded, frame);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_prefix_layout() {
        let mut f = Frame::with_code(RESPONSE, 0x0102_0304);
        f.add_header("status", "okay").unwrap();
        let mut buf = BytesMut::new();
        encode_frame(&f, &mut buf).unwrap();

        assert_eq!(&buf[0..4], b"resp");
        assert_eq!(&buf[4..8], &[1, 2, 3, 4]);
        // body: 2 + 6 + 4 + 4
        assert_eq!(&buf[8..12], &[0, 0, 0, 16]);
        assert_eq!(&buf[12..18], &[0, 1, 0, 0, 0, 0]);
        assert_eq!(&buf[18..20], &[0, 6]);
        assert_eq!(&buf[20..26], b"status");
    }

    #[test]
    fn test_decode_incomplete_prefix() {
        let mut buf = BytesMut::from(&b"rslt\x00\x00"[..]);
        assert!(decode_frame(&mut buf, DEFAULT_MAX_BODY).unwrap().is_none());
        assert_eq!(buf.len(), 6);
    }

    #[test]
    fn test_decode_incomplete_body() {
        let mut buf = BytesMut::new();
        encode_frame(&sample(), &mut buf).unwrap();
        let full = buf.len();
        buf.truncate(full - 3);

        assert!(decode_frame(&mut buf, DEFAULT_MAX_BODY).unwrap().is_none());
        assert_eq!(buf.len(), full - 3, "nothing consumed until complete");
    }

    #[test]
    fn test_decode_bad_command() {
        let mut buf = BytesMut::new();
        buf.put_slice(b"r\x00lt");
        buf.put_bytes(0, PREFIX_SIZE - 4);
        let result = decode_frame(&mut buf, DEFAULT_MAX_BODY);
        assert!(matches!(result, Err(FrameError::Malformed(_))));
    }

    #[test]
    fn test_decode_body_too_large() {
        let mut buf = BytesMut::new();
        buf.put_slice(b"rslt");
        buf.put_u32(1);
        buf.put_u32(1024 * 1024 * 32);
        buf.put_bytes(0, 6);

        let result = decode_frame(&mut buf, DEFAULT_MAX_BODY);
        assert!(matches!(result, Err(FrameError::PayloadTooLarge { .. })));
    }

    #[test]
    fn test_decode_count_exceeds_body() {
        // Declares one header but carries an empty body.
        let mut buf = BytesMut::new();
        buf.put_slice(b"rslt");
        buf.put_u32(1);
        buf.put_u32(0);
        buf.put_u16(1);
        buf.put_u16(0);
        buf.put_u16(0);

        let result = decode_frame(&mut buf, DEFAULT_MAX_BODY);
        assert!(matches!(result, Err(FrameError::Malformed(_))));
    }

    #[test]
    fn test_decode_entry_overruns_body() {
        let mut buf = BytesMut::new();
        buf.put_slice(b"rslt");
        buf.put_u32(1);
        buf.put_u32(8);
        buf.put_u16(0);
        buf.put_u16(1);
        buf.put_u16(0);
        buf.put_u32(64);
        buf.put_u32(100); // claims 100 bytes, body has none left

        let result = decode_frame(&mut buf, DEFAULT_MAX_BODY);
        assert!(matches!(result, Err(FrameError::Malformed(_))));
    }

    #[test]
    fn test_decode_trailing_bytes() {
        let mut buf = BytesMut::new();
        buf.put_slice(b"rslt");
        buf.put_u32(1);
        buf.put_u32(3);
        buf.put_bytes(0, 6);
        buf.put_slice(b"xyz");

        let result = decode_frame(&mut buf, DEFAULT_MAX_BODY);
        assert!(matches!(result, Err(FrameError::Malformed(_))));
    }

    #[test]
    fn test_decode_empty_header_key() {
        let mut buf = BytesMut::new();
        buf.put_slice(b"rslt");
        buf.put_u32(1);
        buf.put_u32(6);
        buf.put_u16(1);
        buf.put_u16(0);
        buf.put_u16(0);
        buf.put_u16(0);
        buf.put_u32(0);

        let result = decode_frame(&mut buf, DEFAULT_MAX_BODY);
        assert!(matches!(result, Err(FrameError::Malformed(_))));
    }

    #[test]
    fn test_multiple_frames() {
        let mut buf = BytesMut::new();
        let mut first = Frame::with_code(RESULT, 1);
        first.add_payload_object(PayloadObject::new(64, "first"));
        let mut second = Frame::with_code(RESPONSE, 2);
        second.add_header("status", "okay").unwrap();
        encode_frame(&first, &mut buf).unwrap();
        encode_frame(&second, &mut buf).unwrap();

        let f1 = decode_frame(&mut buf, DEFAULT_MAX_BODY).unwrap().unwrap();
        let f2 = decode_frame(&mut buf, DEFAULT_MAX_BODY).unwrap().unwrap();
        assert_eq!(f1, first);
        assert_eq!(f2, second);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_empty_frame() {
        let frame = Frame::with_code(RESPONSE, 0);
        let mut buf = BytesMut::new();
        encode_frame(&frame, &mut buf).unwrap();
        assert_eq!(buf.len(), PREFIX_SIZE);

        let decoded = decode_frame(&mut buf, DEFAULT_MAX_BODY).unwrap().unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_decoded_values_share_buffer() {
        let mut buf = BytesMut::new();
        encode_frame(&sample(), &mut buf).unwrap();
        let decoded = decode_frame(&mut buf, DEFAULT_MAX_BODY).unwrap().unwrap();

        let po = decoded.payload_objects()[0].clone();
        assert_eq!(
            po.content().as_ptr(),
            decoded.payload_objects()[0].content().as_ptr()
        );
    }
}

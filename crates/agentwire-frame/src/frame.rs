use std::io::Write;

use bytes::{Bytes, BytesMut};

use crate::codec::{encode_frame, encoded_len};
use crate::command::{CommandCode, RESPONSE};
use crate::error::{FrameError, Result};
use crate::object::{Header, PayloadObject, RoutingObject};

/// Header carrying the outcome of a `resp` frame.
pub const STATUS_HEADER: &str = "status";
/// Header carrying the human-readable failure message of a `resp` frame.
pub const REASON_HEADER: &str = "reason";
/// Header marking the last `rslt` frame of a stream.
pub const FINISHED_HEADER: &str = "finished";
/// The only `status` value that means success.
pub const STATUS_OKAY: &str = "okay";

/// One protocol message, either a command or a reply.
///
/// The command code and sequence number are fixed at construction. The three
/// object lists are append-only and keep insertion order; repeated header
/// keys are legal and their order is significant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    command: CommandCode,
    seqno: u32,
    headers: Vec<Header>,
    payload_objects: Vec<PayloadObject>,
    routing_objects: Vec<RoutingObject>,
}

impl Frame {
    /// Create an empty frame. `command` must be exactly four ASCII alphanumerics.
    ///
    /// Sequence number 0 means "not yet assigned"; the connection picks one
    /// when the frame is submitted.
    pub fn new(command: &str, seqno: u32) -> Result<Self> {
        Ok(Self::with_code(command.parse()?, seqno))
    }

    /// Create an empty frame from an already validated code.
    pub fn with_code(command: CommandCode, seqno: u32) -> Self {
        Self {
            command,
            seqno,
            headers: Vec::new(),
            payload_objects: Vec::new(),
            routing_objects: Vec::new(),
        }
    }

    /// Consume an unassigned frame and return it carrying `seqno`.
    pub fn into_sequenced(self, seqno: u32) -> Self {
        Self { seqno, ..self }
    }

    pub fn command(&self) -> CommandCode {
        self.command
    }

    pub fn seqno(&self) -> u32 {
        self.seqno
    }

    /// Exact match against a four character code.
    pub fn is_type(&self, code: &str) -> bool {
        self.command.as_str() == code
    }

    pub fn add_header(&mut self, key: impl Into<String>, value: impl Into<Bytes>) -> Result<()> {
        self.headers.push(Header::new(key, value)?);
        Ok(())
    }

    pub fn push_header(&mut self, header: Header) {
        self.headers.push(header);
    }

    pub fn add_payload_object(&mut self, po: PayloadObject) {
        self.payload_objects.push(po);
    }

    pub fn add_routing_object(&mut self, ro: RoutingObject) {
        self.routing_objects.push(ro);
    }

    pub fn headers(&self) -> &[Header] {
        &self.headers
    }

    pub fn payload_objects(&self) -> &[PayloadObject] {
        &self.payload_objects
    }

    pub fn routing_objects(&self) -> &[RoutingObject] {
        &self.routing_objects
    }

    /// First header named `key`.
    pub fn header(&self, key: &str) -> Option<&Header> {
        self.headers.iter().find(|h| h.key() == key)
    }

    /// Every header named `key`, in order.
    pub fn headers_named<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a Header> + 'a {
        self.headers.iter().filter(move |h| h.key() == key)
    }

    /// First header named `key` as text. `None` when absent or not UTF-8.
    pub fn header_string(&self, key: &str) -> Option<String> {
        self.header(key)?.as_str().map(str::to_string)
    }

    /// First header named `key` as a decimal integer.
    pub fn header_int(&self, key: &str) -> Option<i64> {
        self.header(key)?.as_int()
    }

    /// First header named `key` as `true` / `false`.
    pub fn header_bool(&self, key: &str) -> Option<bool> {
        self.header(key)?.as_bool()
    }

    /// Outcome of a `resp` frame: `Ok` for `status == "okay"`, otherwise the
    /// `reason` header.
    ///
    /// A frame that is not `resp`, or lacks `status`, is reported as a failure
    /// so callers never read result data out of it.
    pub fn response_status(&self) -> std::result::Result<(), String> {
        if self.command != RESPONSE {
            return Err(format!("expected a resp frame, got {}", self.command));
        }
        let Some(status) = self.header_string(STATUS_HEADER) else {
            return Err("response carries no status header".to_string());
        };
        if status == STATUS_OKAY {
            return Ok(());
        }
        Err(self.header_string(REASON_HEADER).unwrap_or(status))
    }

    /// Single gate for error-vs-success branching on a `resp` frame.
    ///
    /// Returns `true` when the status is okay. Otherwise calls `on_error` once
    /// with the reason and returns `false`; the closure is where per-command
    /// default results get built, and the caller must not go on to read
    /// result headers or objects.
    pub fn check_response<F>(&self, on_error: F) -> bool
    where
        F: FnOnce(String),
    {
        match self.response_status() {
            Ok(()) => true,
            Err(reason) => {
                on_error(reason);
                false
            }
        }
    }

    /// Returns true for a `rslt` frame marked as the end of its stream.
    pub fn is_finished(&self) -> bool {
        self.header_bool(FINISHED_HEADER).unwrap_or(false)
    }

    /// Encoded size of this frame on the wire.
    pub fn wire_size(&self) -> usize {
        encoded_len(self)
    }

    /// Serialize this frame to `out` in wire format.
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<()> {
        let mut buf = BytesMut::with_capacity(self.wire_size());
        encode_frame(self, &mut buf)?;
        out.write_all(&buf).map_err(FrameError::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{PUBLISH, RESULT};

    fn response(status: &str, reason: Option<&str>) -> Frame {
        let mut f = Frame::with_code(RESPONSE, 7);
        f.add_header(STATUS_HEADER, status.to_string()).unwrap();
        if let Some(reason) = reason {
            f.add_header(REASON_HEADER, reason.to_string()).unwrap();
        }
        f
    }

    #[test]
    fn new_validates_command() {
        assert!(Frame::new("publ", 1).is_ok());
        assert!(matches!(
            Frame::new("pub", 1),
            Err(FrameError::InvalidFrame(_))
        ));
        assert!(matches!(
            Frame::new("publish", 1),
            Err(FrameError::InvalidFrame(_))
        ));
    }

    #[test]
    fn preserves_insertion_order() {
        let mut f = Frame::with_code(PUBLISH, 3);
        f.add_header("revoker", "a").unwrap();
        f.add_header("uri", "x/y").unwrap();
        f.add_header("revoker", "b").unwrap();
        f.add_payload_object(PayloadObject::new(2, "two"));
        f.add_payload_object(PayloadObject::new(1, "one"));

        let revokers: Vec<_> = f.headers_named("revoker").filter_map(Header::as_str).collect();
        assert_eq!(revokers, vec!["a", "b"]);
        assert_eq!(f.payload_objects()[0].ponum(), 2);
        assert_eq!(f.payload_objects()[1].ponum(), 1);
        assert_eq!(f.header_string("revoker").as_deref(), Some("a"));
    }

    #[test]
    fn typed_lookups_report_absence() {
        let mut f = Frame::with_code(RESULT, 1);
        f.add_header("n", "-1").unwrap();
        f.add_header("flag", "false").unwrap();

        assert_eq!(f.header_int("n"), Some(-1));
        assert_eq!(f.header_int("missing"), None);
        assert_eq!(f.header_bool("flag"), Some(false));
        assert_eq!(f.header_bool("missing"), None);
        assert_eq!(f.header_string("missing"), None);
    }

    #[test]
    fn is_type_exact() {
        let f = Frame::with_code(RESPONSE, 1);
        assert!(f.is_type("resp"));
        assert!(!f.is_type("rslt"));
        assert!(!f.is_type("res"));
    }

    #[test]
    fn check_response_okay_skips_handler() {
        let f = response("okay", None);
        let mut calls = 0;
        assert!(f.check_response(|_| calls += 1));
        assert_eq!(calls, 0);
    }

    #[test]
    fn check_response_error_calls_handler_once() {
        let f = response("error", Some("no permission"));
        let mut seen = Vec::new();
        assert!(!f.check_response(|reason| seen.push(reason)));
        assert_eq!(seen, vec!["no permission".to_string()]);
    }

    #[test]
    fn check_response_rejects_non_response() {
        let f = Frame::with_code(RESULT, 1);
        assert!(f.response_status().is_err());
        let f = Frame::with_code(RESPONSE, 1);
        assert_eq!(
            f.response_status(),
            Err("response carries no status header".to_string())
        );
    }

    #[test]
    fn into_sequenced_keeps_contents() {
        let mut f = Frame::with_code(PUBLISH, 0);
        f.add_header("uri", "a").unwrap();
        let f = f.into_sequenced(99);
        assert_eq!(f.seqno(), 99);
        assert_eq!(f.header_string("uri").as_deref(), Some("a"));
    }

    #[test]
    fn finished_marker() {
        let mut f = Frame::with_code(RESULT, 1);
        assert!(!f.is_finished());
        f.add_header(FINISHED_HEADER, "true").unwrap();
        assert!(f.is_finished());
    }
}

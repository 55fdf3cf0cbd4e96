use std::sync::Arc;

use agentwire_frame::{CommandCode, Frame, Header, PayloadObject, RoutingObject};

/// Read-only view of an inbound frame handed to reply handlers.
///
/// Cloning is cheap; the frame is shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    frame: Arc<Frame>,
}

impl Message {
    pub fn new(frame: Frame) -> Self {
        Self {
            frame: Arc::new(frame),
        }
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn command(&self) -> CommandCode {
        self.frame.command()
    }

    pub fn seqno(&self) -> u32 {
        self.frame.seqno()
    }

    pub fn headers(&self) -> &[Header] {
        self.frame.headers()
    }

    pub fn header_string(&self, key: &str) -> Option<String> {
        self.frame.header_string(key)
    }

    pub fn header_int(&self, key: &str) -> Option<i64> {
        self.frame.header_int(key)
    }

    pub fn header_bool(&self, key: &str) -> Option<bool> {
        self.frame.header_bool(key)
    }

    /// URI the message was published on, when the agent includes it.
    pub fn uri(&self) -> Option<String> {
        self.frame.header_string("uri")
    }

    /// Verifying key of the publisher, when the agent includes it.
    pub fn from(&self) -> Option<String> {
        self.frame.header_string("from")
    }

    pub fn payload_objects(&self) -> &[PayloadObject] {
        self.frame.payload_objects()
    }

    pub fn routing_objects(&self) -> &[RoutingObject] {
        self.frame.routing_objects()
    }

    /// Payload objects whose type number equals `ponum`, in frame order.
    pub fn filter_payload_objects(&self, ponum: u32) -> Vec<&PayloadObject> {
        self.filter_payload_objects_masked(ponum, u32::MAX)
    }

    /// Payload objects whose type number matches `ponum` on the bits set in
    /// `mask`. A mask of `0xFFFF_FF00` selects a whole family.
    pub fn filter_payload_objects_masked(&self, ponum: u32, mask: u32) -> Vec<&PayloadObject> {
        self.frame
            .payload_objects()
            .iter()
            .filter(|po| po.matches(ponum, mask))
            .collect()
    }

    /// See [`Frame::check_response`].
    pub fn check_response<F>(&self, on_error: F) -> bool
    where
        F: FnOnce(String),
    {
        self.frame.check_response(on_error)
    }

    pub fn is_finished(&self) -> bool {
        self.frame.is_finished()
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        Self::new(frame)
    }
}

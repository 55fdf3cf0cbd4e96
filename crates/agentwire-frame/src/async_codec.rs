//! `tokio_util` codec for driving the agent protocol from async code.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::codec::{decode_frame, encode_frame, FrameConfig, PREFIX_SIZE};
use crate::error::FrameError;
use crate::frame::Frame;

/// Frame codec for `FramedRead` / `FramedWrite` / `Framed`.
#[derive(Debug, Clone, Default)]
pub struct AgentCodec {
    config: FrameConfig,
}

impl AgentCodec {
    pub fn new(config: FrameConfig) -> Self {
        Self { config }
    }
}

impl Decoder for AgentCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        decode_frame(src, self.config.max_body_size)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, FrameError> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::ConnectionClosed),
        }
    }
}

impl Encoder<&Frame> for AgentCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: &Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        let body = frame.wire_size() - PREFIX_SIZE;
        if body > self.config.max_body_size {
            return Err(FrameError::PayloadTooLarge {
                size: body,
                max: self.config.max_body_size,
            });
        }
        encode_frame(frame, dst)
    }
}

impl Encoder<Frame> for AgentCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), FrameError> {
        <Self as Encoder<&Frame>>::encode(self, &frame, dst)
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio_util::codec::{FramedRead, FramedWrite};

    use super::*;
    use crate::command::{RESPONSE, RESULT};
    use crate::object::PayloadObject;

    #[tokio::test]
    async fn framed_roundtrip() {
        let mut ack = Frame::with_code(RESPONSE, 4);
        ack.add_header("status", "okay").unwrap();
        let mut data = Frame::with_code(RESULT, 4);
        data.add_payload_object(PayloadObject::new(64, "hello"));

        let mut sink = FramedWrite::new(Vec::new(), AgentCodec::default());
        sink.send(&ack).await.unwrap();
        sink.send(data.clone()).await.unwrap();
        let wire = sink.into_inner();

        let mut stream = FramedRead::new(wire.as_slice(), AgentCodec::default());
        assert_eq!(stream.next().await.unwrap().unwrap(), ack);
        assert_eq!(stream.next().await.unwrap().unwrap(), data);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn truncated_stream_reports_closed() {
        let mut sink = FramedWrite::new(Vec::new(), AgentCodec::default());
        sink.send(Frame::with_code(RESULT, 1)).await.unwrap();
        let mut wire = sink.into_inner();
        wire.truncate(wire.len() - 1);

        let mut stream = FramedRead::new(wire.as_slice(), AgentCodec::default());
        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }
}

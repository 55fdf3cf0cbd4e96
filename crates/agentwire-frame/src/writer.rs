use std::io::{ErrorKind, Write};

use agentwire_transport::AgentStream;
use bytes::BytesMut;
use tracing::trace;

use crate::codec::{encode_frame, FrameConfig, PREFIX_SIZE};
use crate::error::{FrameError, Result};
use crate::frame::Frame;
use crate::reader::transport_to_frame_error;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;

/// Writes complete frames to any `Write` stream.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Write a complete frame (blocking) and flush.
    ///
    /// The stream is expected to block. `WouldBlock` and `TimedOut` mean a
    /// configured write timeout expired and end the write. A failure before
    /// the first byte leaves the stream usable and is reported as
    /// [`FrameError::Io`]; a failure after it is [`FrameError::PartialWrite`].
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let body = frame.wire_size() - PREFIX_SIZE;
        if body > self.config.max_body_size {
            return Err(FrameError::PayloadTooLarge {
                size: body,
                max: self.config.max_body_size,
            });
        }

        self.buf.clear();
        encode_frame(frame, &mut self.buf)?;

        let total = self.buf.len();
        let mut written = 0usize;
        while written < total {
            match self.inner.write(&self.buf[written..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => written += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                Err(source) if written > 0 => {
                    return Err(FrameError::PartialWrite {
                        written,
                        total,
                        source,
                    })
                }
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        trace!(
            command = %frame.command(),
            seqno = frame.seqno(),
            bytes = total,
            "wrote frame"
        );

        self.flush()
    }

    /// Flush the underlying stream. Only `Interrupted` is retried.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Err(err) if err.kind() == ErrorKind::Interrupted => {}
                other => return other.map_err(FrameError::Io),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameWriter<AgentStream> {
    /// Create a frame writer for `AgentStream` and apply write timeout from config.
    pub fn with_config_agent(inner: AgentStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io::{Cursor, Read};
    use std::net::TcpListener;
    use std::thread;
    use std::time::{Duration, Instant};

    use bytes::BytesMut;

    use super::*;
    use crate::codec::decode_frame;
    use crate::command::{PUBLISH, SUBSCRIBE};
    use crate::object::PayloadObject;

    fn publish(seqno: u32) -> Frame {
        let mut f = Frame::with_code(PUBLISH, seqno);
        f.add_header("uri", "a/b").unwrap();
        f.add_payload_object(PayloadObject::new(64, "hello"));
        f
    }

    fn decoded(bytes: &[u8]) -> Frame {
        let mut wire = BytesMut::from(bytes);
        decode_frame(&mut wire, usize::MAX).unwrap().unwrap()
    }

    /// What the sink does with the next `write` call.
    enum Step {
        Accept(usize),
        Fail(ErrorKind),
    }

    /// A sink that follows a script, then accepts everything.
    #[derive(Default)]
    struct ScriptedSink {
        writes: VecDeque<Step>,
        flush_failures: VecDeque<ErrorKind>,
        data: Vec<u8>,
        flushes: usize,
    }

    impl ScriptedSink {
        fn writes(steps: impl IntoIterator<Item = Step>) -> Self {
            Self {
                writes: steps.into_iter().collect(),
                ..Self::default()
            }
        }
    }

    impl Write for ScriptedSink {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let n = match self.writes.pop_front() {
                Some(Step::Fail(kind)) => return Err(kind.into()),
                Some(Step::Accept(n)) => n.min(buf.len()),
                None => buf.len(),
            };
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            if let Some(kind) = self.flush_failures.pop_front() {
                return Err(kind.into());
            }
            self.flushes += 1;
            Ok(())
        }
    }

    #[test]
    fn write_single_frame() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.write_frame(&publish(1)).unwrap();
        assert_eq!(decoded(writer.get_ref().get_ref()), publish(1));
    }

    #[test]
    fn write_multiple_frames() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.write_frame(&publish(1)).unwrap();
        writer.write_frame(&Frame::with_code(SUBSCRIBE, 2)).unwrap();

        let mut wire = BytesMut::from(writer.into_inner().into_inner().as_slice());
        let f1 = decode_frame(&mut wire, usize::MAX).unwrap().unwrap();
        let f2 = decode_frame(&mut wire, usize::MAX).unwrap().unwrap();
        assert_eq!(f1.seqno(), 1);
        assert!(f2.is_type("subs"));
        assert!(wire.is_empty());
    }

    #[test]
    fn body_too_large_rejected_before_writing() {
        let cfg = FrameConfig {
            max_body_size: 4,
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(ScriptedSink::default(), cfg);

        let err = writer.write_frame(&publish(1)).unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
        assert!(writer.get_ref().data.is_empty());
        assert_eq!(writer.get_ref().flushes, 0);
    }

    #[test]
    fn every_frame_is_flushed() {
        let mut writer = FrameWriter::new(ScriptedSink::default());
        writer.write_frame(&publish(1)).unwrap();
        writer.write_frame(&publish(2)).unwrap();
        assert_eq!(writer.get_ref().flushes, 2);
    }

    #[test]
    fn short_and_interrupted_writes_complete_the_frame() {
        let mut sink = ScriptedSink::writes([
            Step::Fail(ErrorKind::Interrupted),
            Step::Accept(7),
            Step::Accept(3),
            Step::Fail(ErrorKind::Interrupted),
        ]);
        sink.flush_failures.push_back(ErrorKind::Interrupted);
        let mut writer = FrameWriter::new(sink);

        writer.write_frame(&publish(5)).unwrap();
        assert_eq!(decoded(&writer.get_ref().data), publish(5));
        assert_eq!(writer.get_ref().flushes, 1);
    }

    #[test]
    fn timeout_before_first_byte_leaves_stream_aligned() {
        for kind in [ErrorKind::WouldBlock, ErrorKind::TimedOut] {
            let mut writer = FrameWriter::new(ScriptedSink::writes([Step::Fail(kind)]));
            let err = writer.write_frame(&publish(1)).unwrap_err();
            assert!(matches!(err, FrameError::Io(ref e) if e.kind() == kind), "{err}");
            assert!(writer.get_ref().data.is_empty());

            writer.write_frame(&publish(2)).unwrap();
            assert_eq!(decoded(&writer.get_ref().data), publish(2));
        }
    }

    #[test]
    fn timeout_mid_frame_is_a_partial_write() {
        let mut writer = FrameWriter::new(ScriptedSink::writes([
            Step::Accept(10),
            Step::Fail(ErrorKind::WouldBlock),
        ]));
        let err = writer.write_frame(&publish(1)).unwrap_err();
        match err {
            FrameError::PartialWrite {
                written,
                total,
                source,
            } => {
                assert_eq!(written, 10);
                assert_eq!(total, publish(1).wire_size());
                assert_eq!(source.kind(), ErrorKind::WouldBlock);
            }
            other => panic!("expected a partial write, got {other:?}"),
        }
    }

    #[test]
    fn zero_length_write_means_closed() {
        let mut writer = FrameWriter::new(ScriptedSink::writes([Step::Accept(0)]));
        let err = writer.write_frame(&publish(1)).unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn broken_pipe_surfaces() {
        let mut writer = FrameWriter::new(ScriptedSink::writes([Step::Fail(ErrorKind::BrokenPipe)]));
        let err = writer.write_frame(&publish(1)).unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::BrokenPipe));
    }

    #[test]
    fn flush_failure_surfaces() {
        let mut sink = ScriptedSink::default();
        sink.flush_failures.push_back(ErrorKind::BrokenPipe);
        let mut writer = FrameWriter::new(sink);
        let err = writer.write_frame(&publish(1)).unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::BrokenPipe));
    }

    #[test]
    fn serialize_matches_writer_output() {
        let mut direct = Vec::new();
        publish(3).write_to(&mut direct).unwrap();

        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.write_frame(&publish(3)).unwrap();
        assert_eq!(writer.into_inner().into_inner(), direct);
    }

    #[test]
    fn written_bytes_decode_through_reader() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.write_frame(&publish(3)).unwrap();

        let wire = writer.into_inner().into_inner();
        let mut framed = crate::reader::FrameReader::new(Cursor::new(wire));
        assert_eq!(framed.read_frame().unwrap(), publish(3));
    }

    #[test]
    fn write_timeout_ends_write_to_stalled_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (release, hold) = std::sync::mpsc::channel::<()>();
        let peer = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            // Never read until the client is done.
            let _ = hold.recv();
            let mut sink = Vec::new();
            let _ = stream.read_to_end(&mut sink);
        });

        let stream = agentwire_transport::connect(&addr).unwrap();
        let cfg = FrameConfig {
            max_body_size: 64 * 1024 * 1024,
            write_timeout: Some(Duration::from_millis(50)),
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config_agent(stream, cfg).unwrap();
        let mut frame = Frame::with_code(PUBLISH, 1);
        frame.add_payload_object(PayloadObject::new(64, vec![0u8; 32 * 1024 * 1024]));

        let started = Instant::now();
        let err = writer.write_frame(&frame).unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(
            matches!(
                &err,
                FrameError::PartialWrite { source, .. }
                    if matches!(source.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
            ),
            "unexpected error: {err:?}"
        );

        writer.get_ref().shutdown();
        drop(release);
        peer.join().unwrap();
    }
}

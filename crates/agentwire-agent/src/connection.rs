//! Connection to a local agent.
//!
//! One worker thread owns the socket writer, the sequence counter and the
//! outstanding table. A reader thread decodes inbound frames and queues them
//! for the worker next to caller requests, so every table change happens on
//! the worker and reply handlers always run there.

use std::collections::VecDeque;
use std::fmt;
use std::io::ErrorKind;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use agentwire_frame::command::{command_name, HELLO};
use agentwire_frame::{CommandCode, Frame, FrameConfig, FrameError, FrameReader, FrameWriter};
use agentwire_transport::AgentStream;
use tracing::{debug, info, trace, warn};

use crate::error::{AgentError, Result};
use crate::handshake::accept_hello;
use crate::message::Message;
use crate::outstanding::{
    Dispatched, Finality, OutstandingTable, ReplyHandler, SeqnoAllocator,
};

/// Where a local agent listens unless told otherwise.
pub const DEFAULT_AGENT_ADDR: &str = "127.0.0.1:28589";

/// Connection settings.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// `host:port` of the agent. A missing port means the default agent port.
    pub agent_addr: String,
    pub connect_timeout: Duration,
    /// Hold every transaction until the agent's `helo` arrives.
    pub require_hello: bool,
    /// How long to wait for `helo` once the socket is up.
    pub hello_timeout: Duration,
    pub frame: FrameConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            agent_addr: DEFAULT_AGENT_ADDR.to_string(),
            connect_timeout: Duration::from_secs(5),
            require_hello: true,
            hello_timeout: Duration::from_secs(5),
            frame: FrameConfig::default(),
        }
    }
}

impl ConnectionConfig {
    pub fn with_agent_addr(mut self, addr: impl Into<String>) -> Self {
        self.agent_addr = addr.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Socket is up; waiting for the agent's `helo`.
    HandshakePending,
    Connected,
}

/// Called with `true` on entering `Connected` and `false` on entering
/// `Disconnected`, plus a human-readable reason.
pub type StatusHook = Box<dyn FnMut(bool, &str) + Send + 'static>;

struct Status {
    state: ConnectionState,
    last_error: Option<String>,
    agent_version: Option<String>,
}

struct Shared {
    status: Mutex<Status>,
    changed: Condvar,
}

impl Shared {
    fn new() -> Self {
        Self {
            status: Mutex::new(Status {
                state: ConnectionState::Disconnected,
                last_error: None,
                agent_version: None,
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Status> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Submission {
    frame: Frame,
    finality: Finality,
    handler: ReplyHandler,
    assigned: Arc<OnceLock<u32>>,
}

impl Submission {
    fn fail(mut self, err: AgentError) {
        (self.handler)(Err(err), true);
    }
}

enum Event {
    Connect,
    Close,
    Transact(Submission),
    Cancel(u32),
    CancelTransaction(Arc<OnceLock<u32>>),
    Inbound { generation: u64, frame: Frame },
    ReadFailed { generation: u64, error: FrameError },
    Shutdown,
}

struct Handle {
    events: Sender<Event>,
    shared: Arc<Shared>,
}

impl Drop for Handle {
    fn drop(&mut self) {
        let _ = self.events.send(Event::Shutdown);
    }
}

/// Handle to an agent connection.
///
/// Cheap to clone; all clones drive the same worker. The worker stops, and
/// fails whatever is still outstanding, when the last clone is dropped.
#[derive(Clone)]
pub struct Agent {
    handle: Arc<Handle>,
}

impl Agent {
    /// Start the worker in `Disconnected`.
    pub fn spawn(config: ConnectionConfig) -> Result<Self> {
        Self::start(config, None)
    }

    /// Like [`Agent::spawn`], reporting transitions to `on_status`.
    pub fn spawn_with_status<F>(config: ConnectionConfig, on_status: F) -> Result<Self>
    where
        F: FnMut(bool, &str) + Send + 'static,
    {
        Self::start(config, Some(Box::new(on_status)))
    }

    /// Start the worker and request a connection.
    ///
    /// Returns before the connection is up; use [`Agent::wait_connected`] to
    /// block, or just submit transactions and let them queue.
    pub fn connect(config: ConnectionConfig) -> Result<Self> {
        let agent = Self::spawn(config)?;
        agent.reconnect();
        Ok(agent)
    }

    fn start(config: ConnectionConfig, on_status: Option<StatusHook>) -> Result<Self> {
        let (events, inbox) = mpsc::channel();
        let shared = Arc::new(Shared::new());
        let worker = Worker::new(config, inbox, events.clone(), Arc::clone(&shared), on_status);
        thread::Builder::new()
            .name("agentwire-worker".to_string())
            .spawn(move || worker.run())?;
        Ok(Self {
            handle: Arc::new(Handle { events, shared }),
        })
    }

    /// A frame for `command` with sequence number 0, so the worker numbers it.
    pub fn new_frame(command: CommandCode) -> Frame {
        Frame::with_code(command, 0)
    }

    /// Request a connection. Does nothing unless currently `Disconnected`.
    pub fn reconnect(&self) {
        {
            let mut status = self.handle.shared.lock();
            if status.state != ConnectionState::Disconnected {
                return;
            }
            status.state = ConnectionState::Connecting;
            status.last_error = None;
        }
        self.handle.shared.changed.notify_all();

        if self.handle.events.send(Event::Connect).is_err() {
            let mut status = self.handle.shared.lock();
            status.state = ConnectionState::Disconnected;
            status.last_error = Some("agent worker has stopped".to_string());
            drop(status);
            self.handle.shared.changed.notify_all();
        }
    }

    /// Drop the connection. Outstanding transactions fail with
    /// `ConnectionLost`.
    pub fn close(&self) {
        let _ = self.handle.events.send(Event::Close);
    }

    pub fn state(&self) -> ConnectionState {
        self.handle.shared.lock().state
    }

    /// Version announced in the agent's `helo`.
    pub fn agent_version(&self) -> Option<String> {
        self.handle.shared.lock().agent_version.clone()
    }

    /// Why the connection last went down.
    pub fn last_error(&self) -> Option<String> {
        self.handle.shared.lock().last_error.clone()
    }

    /// Block until the connection is usable or has failed.
    ///
    /// Must not be called from a reply handler: handlers run on the worker,
    /// which is the thread that makes progress on the connection.
    pub fn wait_connected(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut status = self.handle.shared.lock();
        loop {
            match status.state {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Disconnected => {
                    let reason = status
                        .last_error
                        .clone()
                        .unwrap_or_else(|| "not connected".to_string());
                    return Err(AgentError::ConnectionLost(reason));
                }
                ConnectionState::Connecting | ConnectionState::HandshakePending => {}
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(AgentError::Timeout(timeout));
            }
            status = match self.handle.shared.changed.wait_timeout(status, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    /// Submit a frame and register `handler` for its replies.
    ///
    /// A frame with sequence number 0 is numbered by the worker; any other
    /// number is kept. The handler sees every reply in arrival order, with
    /// `true` on the last one. Failures are always last.
    pub fn transact<F>(&self, frame: Frame, finality: Finality, handler: F) -> Transaction
    where
        F: FnMut(std::result::Result<Message, AgentError>, bool) + Send + 'static,
    {
        let assigned = Arc::new(OnceLock::new());
        let submission = Submission {
            frame,
            finality,
            handler: Box::new(handler),
            assigned: Arc::clone(&assigned),
        };

        if let Err(mpsc::SendError(Event::Transact(submission))) =
            self.handle.events.send(Event::Transact(submission))
        {
            submission.fail(AgentError::ConnectionLost(
                "agent worker has stopped".to_string(),
            ));
        }

        Transaction {
            seqno: assigned,
            events: self.handle.events.clone(),
        }
    }

    /// Forget the transaction holding `seqno`. Late replies are dropped.
    pub fn cancel(&self, seqno: u32) {
        let _ = self.handle.events.send(Event::Cancel(seqno));
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// A submitted transaction.
#[derive(Clone)]
pub struct Transaction {
    seqno: Arc<OnceLock<u32>>,
    events: Sender<Event>,
}

impl Transaction {
    /// Sequence number, once the worker has sent the frame.
    pub fn seqno(&self) -> Option<u32> {
        self.seqno.get().copied()
    }

    /// Forget this transaction, whether it was sent yet or is still queued.
    pub fn cancel(&self) {
        let _ = self
            .events
            .send(Event::CancelTransaction(Arc::clone(&self.seqno)));
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("seqno", &self.seqno())
            .finish()
    }
}

struct Link {
    writer: FrameWriter<AgentStream>,
}

struct Worker {
    config: ConnectionConfig,
    inbox: Receiver<Event>,
    loopback: Sender<Event>,
    shared: Arc<Shared>,
    on_status: Option<StatusHook>,
    state: ConnectionState,
    table: OutstandingTable,
    queued: VecDeque<Submission>,
    link: Option<Link>,
    generation: u64,
    seqnos: SeqnoAllocator,
    hello_deadline: Option<Instant>,
}

impl Worker {
    fn new(
        config: ConnectionConfig,
        inbox: Receiver<Event>,
        loopback: Sender<Event>,
        shared: Arc<Shared>,
        on_status: Option<StatusHook>,
    ) -> Self {
        Self {
            config,
            inbox,
            loopback,
            shared,
            on_status,
            state: ConnectionState::Disconnected,
            table: OutstandingTable::new(),
            queued: VecDeque::new(),
            link: None,
            generation: 0,
            seqnos: SeqnoAllocator::new(),
            hello_deadline: None,
        }
    }

    fn run(mut self) {
        loop {
            let event = match self.hello_deadline {
                Some(deadline) => {
                    let wait = deadline.saturating_duration_since(Instant::now());
                    match self.inbox.recv_timeout(wait) {
                        Ok(event) => event,
                        Err(RecvTimeoutError::Timeout) => {
                            let timeout = self.config.hello_timeout;
                            self.disconnect(AgentError::Protocol(format!(
                                "agent sent no helo within {timeout:?}"
                            )));
                            continue;
                        }
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match self.inbox.recv() {
                    Ok(event) => event,
                    Err(_) => break,
                },
            };

            match event {
                Event::Connect => self.connect(),
                Event::Close => {
                    self.disconnect(AgentError::ConnectionLost(
                        "connection closed by client".to_string(),
                    ));
                }
                Event::Transact(submission) => self.transact(submission),
                Event::Cancel(seqno) => self.cancel(seqno),
                Event::CancelTransaction(slot) => self.cancel_transaction(&slot),
                Event::Inbound { generation, frame } => self.inbound(generation, frame),
                Event::ReadFailed { generation, error } => {
                    if generation == self.generation {
                        self.disconnect(error.into());
                    }
                }
                Event::Shutdown => {
                    self.disconnect(AgentError::ConnectionLost(
                        "agent handle dropped".to_string(),
                    ));
                    break;
                }
            }
        }
        debug!("agent worker stopped");
    }

    fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        self.shared.lock().state = state;
        self.shared.changed.notify_all();
    }

    fn notify_status(&mut self, connected: bool, message: &str) {
        if let Some(hook) = self.on_status.as_mut() {
            hook(connected, message);
        }
    }

    fn connect(&mut self) {
        if self.link.is_some() {
            return;
        }
        self.set_state(ConnectionState::Connecting);
        info!(agent = %self.config.agent_addr, "connecting to agent");

        let stream = match agentwire_transport::connect_timeout(
            &self.config.agent_addr,
            self.config.connect_timeout,
        ) {
            Ok(stream) => stream,
            Err(err) => {
                self.disconnect(err.into());
                return;
            }
        };

        if let Err(err) = self.attach(stream) {
            self.disconnect(err);
        }
    }

    fn attach(&mut self, stream: AgentStream) -> Result<()> {
        let read_half = stream.try_clone()?;
        let reader = FrameReader::with_config_agent(read_half, self.config.frame.clone())?;
        let writer = FrameWriter::with_config_agent(stream, self.config.frame.clone())?;

        self.generation += 1;
        spawn_reader(reader, self.loopback.clone(), self.generation)?;
        self.link = Some(Link { writer });

        if self.config.require_hello {
            debug!("socket connected, waiting for helo");
            self.hello_deadline = Some(Instant::now() + self.config.hello_timeout);
            self.set_state(ConnectionState::HandshakePending);
        } else {
            self.connected(None);
        }
        Ok(())
    }

    fn connected(&mut self, version: Option<String>) {
        self.hello_deadline = None;
        {
            let mut status = self.shared.lock();
            status.agent_version = version.clone();
            status.last_error = None;
        }
        self.set_state(ConnectionState::Connected);

        let message = match version {
            Some(version) => format!("connected to agent {version}"),
            None => "connected to agent".to_string(),
        };
        info!(agent = %self.config.agent_addr, queued = self.queued.len(), "{message}");
        self.notify_status(true, &message);

        while let Some(submission) = self.queued.pop_front() {
            self.submit(submission);
        }
    }

    /// Tear down the link and fail everything in flight.
    ///
    /// Handlers see `Protocol` when the agent misbehaved and
    /// `ConnectionLost` otherwise.
    fn disconnect(&mut self, cause: AgentError) {
        if let Some(link) = self.link.take() {
            link.writer.get_ref().shutdown();
        }
        self.generation += 1;
        self.hello_deadline = None;

        let protocol = matches!(cause, AgentError::Protocol(_));
        let reason = match cause {
            AgentError::ConnectionLost(reason) | AgentError::Protocol(reason) => reason,
            other => other.to_string(),
        };
        let make_error = || {
            if protocol {
                AgentError::Protocol(reason.clone())
            } else {
                AgentError::ConnectionLost(reason.clone())
            }
        };

        let failed = self.table.fail_all(&make_error);
        let queued = self.queued.len();
        for submission in self.queued.drain(..) {
            submission.fail(make_error());
        }

        let was = self.state;
        self.shared.lock().last_error = Some(reason.clone());
        self.set_state(ConnectionState::Disconnected);

        if was != ConnectionState::Disconnected || failed > 0 || queued > 0 {
            warn!(failed, queued, "agent connection down: {reason}");
        }
        if was != ConnectionState::Disconnected {
            self.notify_status(false, &reason);
        }
    }

    fn transact(&mut self, submission: Submission) {
        match self.state {
            ConnectionState::Connected => self.submit(submission),
            ConnectionState::Connecting | ConnectionState::HandshakePending => {
                trace!(queued = self.queued.len() + 1, "queueing transaction until connected");
                self.queued.push_back(submission);
            }
            ConnectionState::Disconnected => {
                submission.fail(AgentError::ConnectionLost("not connected".to_string()));
            }
        }
    }

    fn submit(&mut self, submission: Submission) {
        let Submission {
            frame,
            finality,
            handler,
            assigned,
        } = submission;

        let seqno = match frame.seqno() {
            0 => self.seqnos.allocate(&self.table),
            given => given,
        };
        let frame = frame.into_sequenced(seqno);
        let _ = assigned.set(seqno);

        if let Err(mut handler) = self.table.insert(seqno, finality, handler) {
            handler(Err(AgentError::DuplicateSequence(seqno)), true);
            self.disconnect(AgentError::ConnectionLost(format!(
                "sequence number {seqno} submitted while outstanding"
            )));
            return;
        }

        let Some(link) = self.link.as_mut() else {
            if let Some(mut handler) = self.table.remove(seqno) {
                handler(
                    Err(AgentError::ConnectionLost("not connected".to_string())),
                    true,
                );
            }
            return;
        };

        let command = frame.command();
        debug!(%command, name = command_name(command), seqno, "sending frame");
        let Err(err) = link.writer.write_frame(&frame) else {
            return;
        };
        warn!(%command, seqno, error = %err, "write failed");

        // Anything already on the wire leaves the agent mid-frame, so the
        // link cannot carry another one.
        let misaligned = match &err {
            FrameError::PartialWrite { .. } | FrameError::ConnectionClosed => {
                Some(err.to_string())
            }
            _ => None,
        };
        if let Some(mut handler) = self.table.remove(seqno) {
            handler(Err(write_error(err)), true);
        }
        if let Some(reason) = misaligned {
            self.disconnect(AgentError::ConnectionLost(reason));
        }
    }

    fn cancel(&mut self, seqno: u32) {
        if self.table.remove(seqno).is_some() {
            debug!(seqno, "cancelled transaction");
        }
    }

    fn cancel_transaction(&mut self, slot: &Arc<OnceLock<u32>>) {
        match slot.get() {
            Some(seqno) => self.cancel(*seqno),
            None => self
                .queued
                .retain(|submission| !Arc::ptr_eq(&submission.assigned, slot)),
        }
    }

    fn inbound(&mut self, generation: u64, frame: Frame) {
        if generation != self.generation {
            trace!(generation, "dropping frame from a previous connection");
            return;
        }

        if self.state == ConnectionState::HandshakePending {
            match accept_hello(&frame) {
                Ok(hello) => self.connected(hello.version),
                Err(err) => self.disconnect(err),
            }
            return;
        }

        if frame.command() == HELLO {
            let version = frame.header_string(crate::handshake::VERSION_HEADER);
            debug!(?version, "agent sent helo");
            self.shared.lock().agent_version = version;
            return;
        }

        let seqno = frame.seqno();
        let command = frame.command();
        if !command.is_reply() {
            debug!(
                %command,
                name = command_name(command),
                seqno,
                "agent sent a non-reply frame"
            );
        }
        match self.table.dispatch(frame) {
            Dispatched::Unknown => {
                warn!(%command, seqno, "dropping frame for unknown sequence number");
            }
            Dispatched::Delivered { is_final } => {
                debug!(%command, seqno, is_final, "delivered reply");
            }
        }
    }
}

/// An outbound frame the codec refuses is the caller's frame at fault, not
/// the agent's.
fn write_error(err: FrameError) -> AgentError {
    match err {
        FrameError::PayloadTooLarge { .. } | FrameError::Malformed(_) => {
            AgentError::InvalidFrame(err.to_string())
        }
        other => other.into(),
    }
}

fn spawn_reader(
    mut reader: FrameReader<AgentStream>,
    events: Sender<Event>,
    generation: u64,
) -> std::io::Result<()> {
    thread::Builder::new()
        .name(format!("agentwire-reader-{generation}"))
        .spawn(move || loop {
            match reader.read_frame() {
                Ok(frame) => {
                    if events.send(Event::Inbound { generation, frame }).is_err() {
                        break;
                    }
                }
                Err(FrameError::Io(err))
                    if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    continue;
                }
                Err(error) => {
                    let _ = events.send(Event::ReadFailed { generation, error });
                    break;
                }
            }
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_targets_local_agent() {
        let config = ConnectionConfig::default();
        assert_eq!(config.agent_addr, DEFAULT_AGENT_ADDR);
        assert!(config.require_hello);
    }

    #[test]
    fn new_frame_is_unnumbered() {
        let frame = Agent::new_frame(agentwire_frame::command::PUBLISH);
        assert_eq!(frame.seqno(), 0);
    }

    #[test]
    fn transact_while_disconnected_fails_once() {
        let agent = Agent::spawn(ConnectionConfig::default()).unwrap();
        let (tx, rx) = mpsc::channel();
        agent.transact(
            Agent::new_frame(agentwire_frame::command::LIST),
            Finality::Default,
            move |reply, is_final| {
                tx.send((reply.is_err(), is_final)).unwrap();
            },
        );
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), (true, true));
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(agent.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn wait_connected_reports_refused_connection() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let agent = Agent::connect(ConnectionConfig::default().with_agent_addr(addr)).unwrap();
        let err = agent.wait_connected(Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, AgentError::ConnectionLost(_)));
        assert!(agent.last_error().is_some());
    }
}

//! Outstanding-request table.
//!
//! Maps in-flight sequence numbers to their reply handlers and decides, per
//! transaction, which reply is the last one. The table is owned by the
//! connection worker and never shared, so it needs no locking.

use std::collections::HashMap;

use agentwire_frame::{Frame, RESPONSE, RESULT};
use tracing::debug;

use crate::error::AgentError;
use crate::message::Message;

/// Callback receiving every reply of one transaction, plus whether it is
/// the final one. Failures are always final.
pub type ReplyHandler = Box<dyn FnMut(Result<Message, AgentError>, bool) + Send + 'static>;

/// When a transaction's entry leaves the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Finality {
    /// A `resp` always ends the transaction; a `rslt` ends it only when it
    /// carries `finished: true`.
    #[default]
    Default,
    /// An okay `resp` opens a stream of `rslt` frames that ends with
    /// `finished: true`. An error `resp` ends it immediately.
    Stream,
    /// An okay `resp` opens a stream that never ends on its own; only an
    /// error `resp`, a cancel, or connection loss removes it.
    Subscription,
}

impl Finality {
    /// Whether `frame` is the last reply under this policy.
    pub fn is_final(self, frame: &Frame) -> bool {
        let command = frame.command();
        if command == RESPONSE {
            return match self {
                Finality::Default => true,
                Finality::Stream | Finality::Subscription => frame.response_status().is_err(),
            };
        }
        if command == RESULT {
            return match self {
                Finality::Default | Finality::Stream => frame.is_finished(),
                Finality::Subscription => false,
            };
        }
        // Only `rslt` streams; anything else closes the transaction.
        self != Finality::Subscription
    }
}

struct Entry {
    finality: Finality,
    handler: ReplyHandler,
}

/// What happened to an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// No transaction holds this sequence number; the frame was dropped.
    Unknown,
    /// The handler ran. `is_final` tells whether the entry was removed.
    Delivered { is_final: bool },
}

/// In-flight transactions keyed by sequence number.
#[derive(Default)]
pub struct OutstandingTable {
    entries: HashMap<u32, Entry>,
}

impl OutstandingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, seqno: u32) -> bool {
        self.entries.contains_key(&seqno)
    }

    /// Register a transaction.
    ///
    /// On a duplicate the handler is handed back untouched so the caller can
    /// fail it.
    pub fn insert(
        &mut self,
        seqno: u32,
        finality: Finality,
        handler: ReplyHandler,
    ) -> Result<(), ReplyHandler> {
        if self.entries.contains_key(&seqno) {
            return Err(handler);
        }
        self.entries.insert(seqno, Entry { finality, handler });
        debug!(seqno, ?finality, outstanding = self.entries.len(), "registered transaction");
        Ok(())
    }

    /// Drop a transaction without calling its handler.
    pub fn remove(&mut self, seqno: u32) -> Option<ReplyHandler> {
        let entry = self.entries.remove(&seqno)?;
        debug!(seqno, outstanding = self.entries.len(), "removed transaction");
        Some(entry.handler)
    }

    /// Route an inbound frame to the handler holding its sequence number.
    pub fn dispatch(&mut self, frame: Frame) -> Dispatched {
        let seqno = frame.seqno();
        let Some(entry) = self.entries.get_mut(&seqno) else {
            return Dispatched::Unknown;
        };

        let is_final = entry.finality.is_final(&frame);
        (entry.handler)(Ok(Message::new(frame)), is_final);

        if is_final {
            self.remove(seqno);
        }
        Dispatched::Delivered { is_final }
    }

    /// Fail every transaction with a terminal error and empty the table.
    pub fn fail_all<F>(&mut self, make_error: F) -> usize
    where
        F: Fn() -> AgentError,
    {
        let failed = self.entries.len();
        let mut entries: Vec<(u32, Entry)> = self.entries.drain().collect();
        entries.sort_by_key(|(seqno, _)| *seqno);
        for (_, mut entry) in entries {
            (entry.handler)(Err(make_error()), true);
        }
        failed
    }
}

/// Hands out sequence numbers for frames submitted without one.
///
/// Counts up from 1 and wraps, skipping 0 and any number still held in the
/// table.
#[derive(Debug, Clone)]
pub struct SeqnoAllocator {
    next: u32,
}

impl Default for SeqnoAllocator {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl SeqnoAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume counting at `next`.
    pub fn starting_at(next: u32) -> Self {
        Self { next }
    }

    /// The next number free in `table`.
    pub fn allocate(&mut self, table: &OutstandingTable) -> u32 {
        loop {
            let seqno = self.next;
            self.next = self.next.wrapping_add(1);
            if seqno != 0 && !table.contains(seqno) {
                return seqno;
            }
        }
    }
}

impl std::fmt::Debug for OutstandingTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut seqnos: Vec<u32> = self.entries.keys().copied().collect();
        seqnos.sort_unstable();
        f.debug_struct("OutstandingTable")
            .field("seqnos", &seqnos)
            .finish()
    }
}

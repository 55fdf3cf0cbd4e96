//! Client side of the agent protocol.
//!
//! [`Agent`] owns one connection and multiplexes any number of concurrent
//! transactions over it, matching replies to requests by sequence number.
//! Replies stream: a handler may be called several times before the final
//! reply, depending on the transaction's [`Finality`].

pub mod commands;
pub mod connection;
pub mod error;
pub mod handshake;
pub mod message;
pub mod outstanding;

pub use commands::{
    list, publish, query, query_list, set_entity, subscribe, unsubscribe, AccessOptions,
    CommandError, ElaboratePac, ListEvent, ListOptions, PublishOptions, QueryEvent, QueryOptions,
    SubscribeOptions, SubscriptionEvent,
};
pub use connection::{
    Agent, ConnectionConfig, ConnectionState, StatusHook, Transaction, DEFAULT_AGENT_ADDR,
};
pub use error::{AgentError, Result};
pub use handshake::{accept_hello, hello_frame, HelloInfo};
pub use message::Message;
pub use outstanding::{Dispatched, Finality, OutstandingTable, ReplyHandler, SeqnoAllocator};

//! Typed wrappers for the agent commands a client uses day to day.
//!
//! Each wrapper builds its frame, picks the finality policy, gates every
//! `resp` through [`Message::check_response`] and reports one typed result.

use std::sync::Arc;
use std::time::Duration;

use agentwire_frame::command::{LIST, PERSIST, PUBLISH, QUERY, SET_ENTITY, SUBSCRIBE, UNSUBSCRIBE};
use agentwire_frame::{Frame, PayloadObject, RoutingObject, RESPONSE, RESULT};
use bytes::Bytes;

use crate::connection::{Agent, Transaction};
use crate::error::{AgentError, Result};
use crate::message::Message;
use crate::outstanding::Finality;

/// Payload object number carrying an entity's key material (`1.0.0.50`).
pub const PO_ENTITY_KEY: u32 = 0x0100_0032;

/// Why a command did not succeed.
///
/// Cloneable so streamed events can carry it; connection failures are
/// shared rather than flattened.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CommandError {
    /// The agent answered with a non-okay status.
    #[error("{0}")]
    Remote(String),

    /// The reply never arrived.
    #[error(transparent)]
    Connection(Arc<AgentError>),
}

impl From<AgentError> for CommandError {
    fn from(err: AgentError) -> Self {
        CommandError::Connection(Arc::new(err))
    }
}

/// How much of the primary access chain the agent should expand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElaboratePac {
    None,
    Partial,
    Full,
}

impl ElaboratePac {
    pub fn as_str(self) -> &'static str {
        match self {
            ElaboratePac::None => "none",
            ElaboratePac::Partial => "partial",
            ElaboratePac::Full => "full",
        }
    }
}

/// Authorization and lifetime settings shared by every URI command.
#[derive(Debug, Clone, Default)]
pub struct AccessOptions {
    pub primary_access_chain: Option<String>,
    /// Let the agent build a chain when none is given.
    pub auto_chain: bool,
    /// Absolute expiry, RFC 3339.
    pub expiry: Option<String>,
    pub expiry_delta: Option<Duration>,
    pub elaborate_pac: Option<ElaboratePac>,
    pub do_not_verify: bool,
    pub routing_objects: Vec<RoutingObject>,
}

impl AccessOptions {
    fn apply(&self, frame: &mut Frame) -> Result<()> {
        if let Some(pac) = &self.primary_access_chain {
            frame.add_header("primary_access_chain", pac.clone())?;
        }
        if self.auto_chain {
            frame.add_header("autochain", "true")?;
        }
        if let Some(expiry) = &self.expiry {
            frame.add_header("expiry", expiry.clone())?;
        }
        if let Some(delta) = self.expiry_delta {
            frame.add_header("expirydelta", format!("{}ms", delta.as_millis()))?;
        }
        if let Some(elaborate) = self.elaborate_pac {
            frame.add_header("elaborate_pac", elaborate.as_str())?;
        }
        let verify = if self.do_not_verify { "false" } else { "true" };
        frame.add_header("doverify", verify)?;
        for ro in &self.routing_objects {
            frame.add_routing_object(ro.clone());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    pub uri: String,
    pub access: AccessOptions,
    pub payload_objects: Vec<PayloadObject>,
    /// Ask the agent to keep the message for later subscribers (`pers`).
    pub persist: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SubscribeOptions {
    pub uri: String,
    pub access: AccessOptions,
    /// Deliver payload objects as the agent received them, without unpacking.
    pub leave_packed: bool,
}

pub type QueryOptions = SubscribeOptions;

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    pub uri: String,
    pub access: AccessOptions,
}

#[derive(Debug, Clone)]
pub enum SubscriptionEvent {
    /// The agent accepted the subscription.
    Subscribed { handle: Option<String> },
    Message(Message),
    /// No further events follow.
    Ended(CommandError),
}

#[derive(Debug, Clone)]
pub enum QueryEvent {
    Result(Message),
    Finished,
    Failed(CommandError),
}

#[derive(Debug, Clone)]
pub enum ListEvent {
    Child(String),
    Finished,
    Failed(CommandError),
}

/// `Ok` when `msg` is an okay `resp`, otherwise the agent's reason.
fn checked(msg: &Message) -> std::result::Result<(), CommandError> {
    let mut reason = None;
    if msg.check_response(|why| reason = Some(why)) {
        Ok(())
    } else {
        Err(CommandError::Remote(reason.unwrap_or_default()))
    }
}

/// Register a one-shot completion: `parse` turns the okay `resp` into `T`.
fn single_reply<T, F, P>(agent: &Agent, frame: Frame, parse: P, on_done: F) -> Transaction
where
    T: 'static,
    F: FnOnce(std::result::Result<T, CommandError>) + Send + 'static,
    P: FnOnce(&Message) -> T + Send + 'static,
{
    let mut pending = Some((parse, on_done));
    agent.transact(frame, Finality::Default, move |reply, _| {
        let Some((parse, on_done)) = pending.take() else {
            return;
        };
        let outcome = reply
            .map_err(CommandError::from)
            .and_then(|msg| checked(&msg).map(|()| parse(&msg)));
        on_done(outcome);
    })
}

fn uri_frame(command: agentwire_frame::CommandCode, uri: &str) -> Result<Frame> {
    let mut frame = Agent::new_frame(command);
    frame.add_header("uri", uri.to_string())?;
    Ok(frame)
}

/// Make `key_material` the entity the agent acts as. Yields its verifying key.
pub fn set_entity<F>(agent: &Agent, key_material: impl Into<Bytes>, on_done: F) -> Transaction
where
    F: FnOnce(std::result::Result<String, CommandError>) + Send + 'static,
{
    let mut frame = Agent::new_frame(SET_ENTITY);
    frame.add_payload_object(PayloadObject::new(PO_ENTITY_KEY, key_material));
    single_reply(
        agent,
        frame,
        |msg| msg.header_string("vk").unwrap_or_default(),
        on_done,
    )
}

pub fn publish<F>(agent: &Agent, options: &PublishOptions, on_done: F) -> Result<Transaction>
where
    F: FnOnce(std::result::Result<(), CommandError>) + Send + 'static,
{
    let command = if options.persist { PERSIST } else { PUBLISH };
    let mut frame = uri_frame(command, &options.uri)?;
    options.access.apply(&mut frame)?;
    for po in &options.payload_objects {
        frame.add_payload_object(po.clone());
    }
    Ok(single_reply(agent, frame, |_| (), on_done))
}

/// Subscribe to `options.uri`. Events arrive until an error ends the
/// subscription or it is cancelled through the returned transaction or
/// [`unsubscribe`].
pub fn subscribe<F>(agent: &Agent, options: &SubscribeOptions, mut on_event: F) -> Result<Transaction>
where
    F: FnMut(SubscriptionEvent) + Send + 'static,
{
    let mut frame = uri_frame(SUBSCRIBE, &options.uri)?;
    options.access.apply(&mut frame)?;
    frame.add_header("unpack", if options.leave_packed { "false" } else { "true" })?;

    Ok(agent.transact(frame, Finality::Subscription, move |reply, _| {
        let msg = match reply {
            Ok(msg) => msg,
            Err(err) => return on_event(SubscriptionEvent::Ended(err.into())),
        };
        if msg.command() == RESPONSE {
            match checked(&msg) {
                Ok(()) => on_event(SubscriptionEvent::Subscribed {
                    handle: msg.header_string("handle"),
                }),
                Err(err) => on_event(SubscriptionEvent::Ended(err)),
            }
        } else if msg.command() == RESULT {
            on_event(SubscriptionEvent::Message(msg));
        }
    }))
}

/// End the subscription the agent knows as `handle`.
///
/// The local entry is dropped before `usub` goes out, so nothing the agent
/// sends after seeing the request reaches the subscription's handler.
pub fn unsubscribe<F>(
    agent: &Agent,
    handle: &str,
    subscription: &Transaction,
    on_done: F,
) -> Result<Transaction>
where
    F: FnOnce(std::result::Result<(), CommandError>) + Send + 'static,
{
    let mut frame = Agent::new_frame(UNSUBSCRIBE);
    frame.add_header("handle", handle.to_string())?;
    subscription.cancel();
    Ok(single_reply(agent, frame, |_| (), on_done))
}

/// Fetch persisted messages under `options.uri`, one event each.
pub fn query<F>(agent: &Agent, options: &QueryOptions, mut on_event: F) -> Result<Transaction>
where
    F: FnMut(QueryEvent) + Send + 'static,
{
    let mut frame = uri_frame(QUERY, &options.uri)?;
    options.access.apply(&mut frame)?;
    frame.add_header("unpack", if options.leave_packed { "false" } else { "true" })?;

    Ok(agent.transact(frame, Finality::Stream, move |reply, _| {
        let msg = match reply {
            Ok(msg) => msg,
            Err(err) => return on_event(QueryEvent::Failed(err.into())),
        };
        if msg.command() == RESPONSE {
            if let Err(err) = checked(&msg) {
                on_event(QueryEvent::Failed(err));
            }
        } else if msg.is_finished() {
            on_event(QueryEvent::Finished);
        } else {
            on_event(QueryEvent::Result(msg));
        }
    }))
}

/// [`query`], collected.
pub fn query_list<F>(agent: &Agent, options: &QueryOptions, on_done: F) -> Result<Transaction>
where
    F: FnOnce(std::result::Result<Vec<Message>, CommandError>) + Send + 'static,
{
    let mut results = Vec::new();
    let mut on_done = Some(on_done);
    query(agent, options, move |event| {
        let outcome = match event {
            QueryEvent::Result(msg) => return results.push(msg),
            QueryEvent::Finished => Ok(std::mem::take(&mut results)),
            QueryEvent::Failed(err) => Err(err),
        };
        if let Some(on_done) = on_done.take() {
            on_done(outcome);
        }
    })
}

/// List the immediate children of `options.uri` that hold persisted messages.
pub fn list<F>(agent: &Agent, options: &ListOptions, mut on_event: F) -> Result<Transaction>
where
    F: FnMut(ListEvent) + Send + 'static,
{
    let mut frame = uri_frame(LIST, &options.uri)?;
    options.access.apply(&mut frame)?;

    Ok(agent.transact(frame, Finality::Stream, move |reply, _| {
        let msg = match reply {
            Ok(msg) => msg,
            Err(err) => return on_event(ListEvent::Failed(err.into())),
        };
        if msg.command() == RESPONSE {
            if let Err(err) = checked(&msg) {
                on_event(ListEvent::Failed(err));
            }
        } else if msg.is_finished() {
            on_event(ListEvent::Finished);
        } else if let Some(child) = msg.header_string("child") {
            on_event(ListEvent::Child(child));
        }
    }))
}

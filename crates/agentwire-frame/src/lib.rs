//! Frames of the agent protocol.
//!
//! A frame is a four character command code, a sequence number that ties
//! replies to their request, and three ordered lists: headers (text key, raw
//! value), payload objects (numeric tag, raw bytes) and routing objects
//! (numeric tag, raw bytes). Every length is explicit on the wire, so binary
//! values can never be mistaken for framing.
//!
//! No partial reads, no buffer management in user code.

pub mod codec;
pub mod command;
pub mod error;
pub mod frame;
pub mod object;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

#[cfg(feature = "async")]
pub use async_codec::AgentCodec;
pub use codec::{decode_frame, encode_frame, FrameConfig, DEFAULT_MAX_BODY, PREFIX_SIZE};
pub use command::{command_name, CommandCode, RESPONSE, RESULT};
pub use error::{FrameError, Result};
pub use frame::{Frame, FINISHED_HEADER, REASON_HEADER, STATUS_HEADER, STATUS_OKAY};
pub use object::{ponum_from_dotted, ponum_to_dotted, Header, PayloadObject, RoutingObject};
pub use reader::FrameReader;
pub use writer::FrameWriter;

//! Command codes.
//!
//! Every frame starts with a four character code. Requests use the codes
//! below; replies come back as [`RESPONSE`] (terminal status) or [`RESULT`]
//! (streamed result). The registry is open: any four ASCII alphanumerics
//! are accepted on the wire.

use std::fmt;
use std::str::FromStr;

use crate::error::FrameError;

/// Length of every command code in bytes.
pub const COMMAND_LEN: usize = 4;

/// A four character command code.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommandCode([u8; COMMAND_LEN]);

impl CommandCode {
    /// Build a code from raw bytes, rejecting anything but ASCII alphanumerics.
    pub fn from_bytes(bytes: [u8; COMMAND_LEN]) -> Result<Self, FrameError> {
        if bytes.iter().all(u8::is_ascii_alphanumeric) {
            Ok(Self(bytes))
        } else {
            Err(FrameError::InvalidFrame(format!(
                "command code must be 4 ASCII alphanumerics, got {:?}",
                String::from_utf8_lossy(&bytes)
            )))
        }
    }

    /// Const constructor for the built-in registry.
    const fn known(code: &[u8; COMMAND_LEN]) -> Self {
        Self(*code)
    }

    /// The raw wire bytes.
    pub fn as_bytes(&self) -> &[u8; COMMAND_LEN] {
        &self.0
    }

    /// The code as text. Always valid since construction checks ASCII.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("????")
    }

    /// Returns true for the two reply codes.
    pub fn is_reply(&self) -> bool {
        *self == RESPONSE || *self == RESULT
    }
}

impl FromStr for CommandCode {
    type Err = FrameError;

    fn from_str(code: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; COMMAND_LEN] = code.as_bytes().try_into().map_err(|_| {
            FrameError::InvalidFrame(format!(
                "command code must be exactly {COMMAND_LEN} characters, got {code:?}"
            ))
        })?;
        Self::from_bytes(bytes)
    }
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandCode({})", self.as_str())
    }
}

/// Hello/handshake, sent by the agent when a client connects.
pub const HELLO: CommandCode = CommandCode::known(b"helo");
/// Publish a message.
pub const PUBLISH: CommandCode = CommandCode::known(b"publ");
/// Publish and persist a message.
pub const PERSIST: CommandCode = CommandCode::known(b"pers");
/// Subscribe to a URI pattern.
pub const SUBSCRIBE: CommandCode = CommandCode::known(b"subs");
/// Tear down a subscription by handle.
pub const UNSUBSCRIBE: CommandCode = CommandCode::known(b"usub");
/// List children of a URI.
pub const LIST: CommandCode = CommandCode::known(b"list");
/// Query persisted messages.
pub const QUERY: CommandCode = CommandCode::known(b"quer");
/// Tap subscribe (no permission checks).
pub const TAP_SUBSCRIBE: CommandCode = CommandCode::known(b"tsub");
/// Tap query (no permission checks).
pub const TAP_QUERY: CommandCode = CommandCode::known(b"tque");
/// Make an entity.
pub const MAKE_ENTITY: CommandCode = CommandCode::known(b"make");
/// Make a Declaration of Trust.
pub const MAKE_DOT: CommandCode = CommandCode::known(b"makd");
/// Make a DOT chain.
pub const MAKE_CHAIN: CommandCode = CommandCode::known(b"makc");
/// Build a chain from the registry.
pub const BUILD_CHAIN: CommandCode = CommandCode::known(b"bldc");
/// Set the entity used by this session.
pub const SET_ENTITY: CommandCode = CommandCode::known(b"sete");
/// Publish a DOT to the registry.
pub const PUT_DOT: CommandCode = CommandCode::known(b"putd");
/// Publish an entity to the registry.
pub const PUT_ENTITY: CommandCode = CommandCode::known(b"pute");
/// Publish a chain to the registry.
pub const PUT_CHAIN: CommandCode = CommandCode::known(b"putc");
/// Balances of the session entity's accounts.
pub const ENTITY_BALANCE: CommandCode = CommandCode::known(b"ebal");
/// Balance of one address.
pub const ADDRESS_BALANCE: CommandCode = CommandCode::known(b"abal");
/// Get or set blockchain interaction parameters.
pub const BC_PARAMS: CommandCode = CommandCode::known(b"bcip");
/// Transfer funds.
pub const TRANSFER: CommandCode = CommandCode::known(b"xfer");
/// Make a short alias.
pub const MAKE_SHORT_ALIAS: CommandCode = CommandCode::known(b"mksa");
/// Make a long alias.
pub const MAKE_LONG_ALIAS: CommandCode = CommandCode::known(b"mkla");
/// Resolve an alias.
pub const RESOLVE_ALIAS: CommandCode = CommandCode::known(b"resa");
/// New designated-router offer.
pub const NEW_DRO: CommandCode = CommandCode::known(b"ndro");
/// Accept a designated-router offer.
pub const ACCEPT_DRO: CommandCode = CommandCode::known(b"adro");
/// Resolve a registry object.
pub const RESOLVE_REGISTRY: CommandCode = CommandCode::known(b"rsro");
/// Update the designated router's SRV record.
pub const UPDATE_SRV: CommandCode = CommandCode::known(b"usrv");
/// List designated-router offers.
pub const LIST_DRO: CommandCode = CommandCode::known(b"ldro");

/// Terminal status reply.
pub const RESPONSE: CommandCode = CommandCode::known(b"resp");
/// Streamed result reply.
pub const RESULT: CommandCode = CommandCode::known(b"rslt");

/// Returns a human-readable name for a command code.
pub fn command_name(code: CommandCode) -> &'static str {
    match code.as_bytes() {
        b"helo" => "HELLO",
        b"publ" => "PUBLISH",
        b"pers" => "PERSIST",
        b"subs" => "SUBSCRIBE",
        b"usub" => "UNSUBSCRIBE",
        b"list" => "LIST",
        b"quer" => "QUERY",
        b"tsub" => "TAP_SUBSCRIBE",
        b"tque" => "TAP_QUERY",
        b"make" => "MAKE_ENTITY",
        b"makd" => "MAKE_DOT",
        b"makc" => "MAKE_CHAIN",
        b"bldc" => "BUILD_CHAIN",
        b"sete" => "SET_ENTITY",
        b"putd" => "PUT_DOT",
        b"pute" => "PUT_ENTITY",
        b"putc" => "PUT_CHAIN",
        b"ebal" => "ENTITY_BALANCE",
        b"abal" => "ADDRESS_BALANCE",
        b"bcip" => "BC_PARAMS",
        b"xfer" => "TRANSFER",
        b"mksa" => "MAKE_SHORT_ALIAS",
        b"mkla" => "MAKE_LONG_ALIAS",
        b"resa" => "RESOLVE_ALIAS",
        b"ndro" => "NEW_DRO",
        b"adro" => "ACCEPT_DRO",
        b"rsro" => "RESOLVE_REGISTRY",
        b"usrv" => "UPDATE_SRV",
        b"ldro" => "LIST_DRO",
        b"resp" => "RESPONSE",
        b"rslt" => "RESULT",
        _ => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_four_character_codes() {
        let code: CommandCode = "publ".parse().unwrap();
        assert_eq!(code, PUBLISH);
        assert_eq!(code.as_str(), "publ");
        assert_eq!(code.to_string(), "publ");
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(matches!(
            "pub".parse::<CommandCode>(),
            Err(FrameError::InvalidFrame(_))
        ));
        assert!(matches!(
            "publish".parse::<CommandCode>(),
            Err(FrameError::InvalidFrame(_))
        ));
        assert!(matches!(
            "".parse::<CommandCode>(),
            Err(FrameError::InvalidFrame(_))
        ));
    }

    #[test]
    fn rejects_non_alphanumeric() {
        assert!(CommandCode::from_bytes(*b"pu l").is_err());
        assert!(CommandCode::from_bytes([0xff, b'a', b'b', b'c']).is_err());
        // Multi-byte UTF-8 that happens to be four bytes long.
        assert!("éé".parse::<CommandCode>().is_err());
    }

    #[test]
    fn reply_codes() {
        assert!(RESPONSE.is_reply());
        assert!(RESULT.is_reply());
        assert!(!SUBSCRIBE.is_reply());
    }

    #[test]
    fn names() {
        assert_eq!(command_name(QUERY), "QUERY");
        assert_eq!(command_name("zzzz".parse().unwrap()), "UNKNOWN");
    }
}

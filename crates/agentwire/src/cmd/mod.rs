use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::time::Duration;

use agentwire_agent::{
    set_entity, AccessOptions, Agent, CommandError, ConnectionConfig, ElaboratePac,
    DEFAULT_AGENT_ADDR,
};
use clap::{Args, Subcommand, ValueEnum};
use tracing::info;

use crate::exit::{agent_error, command_error, io_error, CliError, CliResult, DATA_INVALID, TIMEOUT, USAGE};
use crate::output::OutputFormat;

pub mod list;
pub mod publish;
pub mod query;
pub mod subscribe;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Publish one message.
    Publish(PublishArgs),
    /// Print messages published on a URI.
    Subscribe(SubscribeArgs),
    /// Print persisted messages under a URI.
    Query(QueryArgs),
    /// Print the children of a URI that hold persisted messages.
    List(ListArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, connect: &ConnectArgs, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Publish(args) => publish::run(args, connect, format),
        Command::Subscribe(args) => subscribe::run(args, connect, format),
        Command::Query(args) => query::run(args, connect, format),
        Command::List(args) => list::run(args, connect, format),
        Command::Version(args) => version::run(args),
    }
}

/// Where the agent is and who to act as.
#[derive(Args, Debug)]
pub struct ConnectArgs {
    /// Agent address (host:port).
    #[arg(long, env = "BW2_AGENT", default_value = DEFAULT_AGENT_ADDR, global = true)]
    pub agent: String,
    /// Entity file to act as; the first byte is a type marker.
    #[arg(long, env = "BW2_DEFAULT_ENTITY", value_name = "FILE", global = true)]
    pub entity: Option<PathBuf>,
    /// Time allowed for connecting and for each reply (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s", global = true)]
    pub timeout: String,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum Elaborate {
    None,
    Partial,
    Full,
}

impl From<Elaborate> for ElaboratePac {
    fn from(value: Elaborate) -> Self {
        match value {
            Elaborate::None => ElaboratePac::None,
            Elaborate::Partial => ElaboratePac::Partial,
            Elaborate::Full => ElaboratePac::Full,
        }
    }
}

#[derive(Args, Debug)]
pub struct AccessArgs {
    /// Primary access chain hash.
    #[arg(long, value_name = "HASH")]
    pub pac: Option<String>,
    /// Do not let the agent build an access chain.
    #[arg(long)]
    pub no_autochain: bool,
    /// Message lifetime (e.g. 30s, 1500ms).
    #[arg(long, value_name = "DURATION")]
    pub expiry_delta: Option<String>,
    /// How much of the access chain to expand.
    #[arg(long, value_enum)]
    pub elaborate: Option<Elaborate>,
    /// Skip local verification of the access chain.
    #[arg(long)]
    pub no_verify: bool,
}

impl AccessArgs {
    pub fn to_options(&self) -> CliResult<AccessOptions> {
        let expiry_delta = match &self.expiry_delta {
            Some(delta) => Some(parse_duration(delta)?),
            None => None,
        };
        Ok(AccessOptions {
            primary_access_chain: self.pac.clone(),
            auto_chain: !self.no_autochain,
            expiry: None,
            expiry_delta,
            elaborate_pac: self.elaborate.map(ElaboratePac::from),
            do_not_verify: self.no_verify,
            routing_objects: Vec::new(),
        })
    }
}

#[derive(Args, Debug)]
pub struct PublishArgs {
    /// URI to publish on.
    pub uri: String,
    /// Text payload.
    #[arg(long, conflicts_with = "file")]
    pub text: Option<String>,
    /// Read the payload from a file.
    #[arg(long, conflicts_with = "text")]
    pub file: Option<PathBuf>,
    /// Payload object number, dotted.
    #[arg(long, default_value = "64.0.1.0", value_name = "DOTTED")]
    pub po: String,
    /// Keep the message for later subscribers.
    #[arg(long)]
    pub persist: bool,
    #[command(flatten)]
    pub access: AccessArgs,
}

#[derive(Args, Debug)]
pub struct SubscribeArgs {
    /// URI or pattern to subscribe to.
    pub uri: String,
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Keep payload objects packed as received.
    #[arg(long)]
    pub leave_packed: bool,
    #[command(flatten)]
    pub access: AccessArgs,
}

#[derive(Args, Debug)]
pub struct QueryArgs {
    /// URI or pattern to query.
    pub uri: String,
    /// Keep payload objects packed as received.
    #[arg(long)]
    pub leave_packed: bool,
    #[command(flatten)]
    pub access: AccessArgs,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// URI whose children to list.
    pub uri: String,
    #[command(flatten)]
    pub access: AccessArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Connect, wait for the agent's greeting and adopt the entity if one is set.
pub fn open_agent(connect: &ConnectArgs) -> CliResult<Agent> {
    let timeout = parse_duration(&connect.timeout)?;
    let config = ConnectionConfig {
        agent_addr: connect.agent.clone(),
        connect_timeout: timeout,
        hello_timeout: timeout,
        ..ConnectionConfig::default()
    };

    let agent = Agent::connect(config).map_err(|err| agent_error("agent startup failed", err))?;
    agent
        .wait_connected(timeout.saturating_mul(2))
        .map_err(|err| agent_error("connect failed", err))?;

    if let Some(path) = &connect.entity {
        let key = read_entity(path)?;
        let (tx, rx) = std::sync::mpsc::channel();
        set_entity(&agent, key, move |outcome| {
            let _ = tx.send(outcome);
        });
        let vk = wait_for(&rx, timeout, "set entity failed")?;
        info!(%vk, "acting as entity");
    }
    Ok(agent)
}

/// Key material from an entity file, without its leading type marker.
pub fn read_entity(path: &Path) -> CliResult<Vec<u8>> {
    let contents = std::fs::read(path)
        .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
    match contents.get(1..) {
        Some(key) if !key.is_empty() => Ok(key.to_vec()),
        _ => Err(CliError::new(
            DATA_INVALID,
            format!("{} is not an entity file", path.display()),
        )),
    }
}

/// Block for one command outcome.
pub fn wait_for<T>(
    rx: &Receiver<Result<T, CommandError>>,
    timeout: Duration,
    context: &str,
) -> CliResult<T> {
    match rx.recv_timeout(timeout) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(command_error(context, err)),
        Err(_) => Err(CliError::new(
            TIMEOUT,
            format!("{context}: no reply within {timeout:?}"),
        )),
    }
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('m') {
        (num, "m")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "m" => Ok(Duration::from_secs(value.saturating_mul(60))),
        _ => Ok(Duration::from_secs(value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_units() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn entity_file_skips_type_marker() {
        let path = std::env::temp_dir().join(format!("agentwire-entity-{}", std::process::id()));
        std::fs::write(&path, [0x32, 0xaa, 0xbb]).unwrap();
        assert_eq!(read_entity(&path).unwrap(), vec![0xaa, 0xbb]);

        std::fs::write(&path, [0x32]).unwrap();
        assert_eq!(read_entity(&path).unwrap_err().code, DATA_INVALID);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn access_defaults_to_autochain() {
        let args = AccessArgs {
            pac: None,
            no_autochain: false,
            expiry_delta: Some("30s".to_string()),
            elaborate: Some(Elaborate::Partial),
            no_verify: false,
        };
        let options = args.to_options().unwrap();
        assert!(options.auto_chain);
        assert_eq!(options.expiry_delta, Some(Duration::from_secs(30)));
        assert_eq!(options.elaborate_pac, Some(ElaboratePac::Partial));
    }
}

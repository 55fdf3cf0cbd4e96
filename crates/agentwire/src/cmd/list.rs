use std::sync::mpsc;

use agentwire_agent::{list, ListEvent, ListOptions};

use crate::cmd::{open_agent, parse_duration, ConnectArgs, ListArgs};
use crate::exit::{agent_error, command_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_child, OutputFormat};

pub fn run(args: ListArgs, connect: &ConnectArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&connect.timeout)?;
    let options = ListOptions {
        uri: args.uri,
        access: args.access.to_options()?,
    };
    let agent = open_agent(connect)?;

    let (tx, events) = mpsc::channel();
    list(&agent, &options, move |event| {
        let _ = tx.send(event);
    })
    .map_err(|err| agent_error("list failed", err))?;

    // Children print as they stream in; the timeout applies between events.
    loop {
        match events.recv_timeout(timeout) {
            Ok(ListEvent::Child(child)) => print_child(&child, format),
            Ok(ListEvent::Finished) => return Ok(SUCCESS),
            Ok(ListEvent::Failed(err)) => return Err(command_error("list failed", err)),
            Err(_) => {
                return Err(CliError::new(
                    TIMEOUT,
                    format!("list failed: no reply within {timeout:?}"),
                ))
            }
        }
    }
}

use std::sync::mpsc;

use agentwire_agent::{query_list, QueryOptions};

use crate::cmd::{open_agent, parse_duration, wait_for, ConnectArgs, QueryArgs};
use crate::exit::{agent_error, CliResult, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub fn run(args: QueryArgs, connect: &ConnectArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&connect.timeout)?;
    let options = QueryOptions {
        uri: args.uri,
        access: args.access.to_options()?,
        leave_packed: args.leave_packed,
    };
    let agent = open_agent(connect)?;

    let (tx, rx) = mpsc::channel();
    query_list(&agent, &options, move |outcome| {
        let _ = tx.send(outcome);
    })
    .map_err(|err| agent_error("query failed", err))?;

    for msg in wait_for(&rx, timeout, "query failed")? {
        print_message(&msg, format);
    }
    Ok(SUCCESS)
}

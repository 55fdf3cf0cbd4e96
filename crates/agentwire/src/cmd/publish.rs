use std::fs;
use std::sync::mpsc;

use agentwire_agent::{publish, PublishOptions};
use agentwire_frame::PayloadObject;
use tracing::info;

use crate::cmd::{open_agent, parse_duration, wait_for, ConnectArgs, PublishArgs};
use crate::exit::{agent_error, frame_error, io_error, CliResult, SUCCESS};
use crate::output::OutputFormat;

pub fn run(args: PublishArgs, connect: &ConnectArgs, _format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&connect.timeout)?;
    let options = build_options(&args)?;
    let agent = open_agent(connect)?;

    let (tx, rx) = mpsc::channel();
    publish(&agent, &options, move |outcome| {
        let _ = tx.send(outcome);
    })
    .map_err(|err| agent_error("publish failed", err))?;
    wait_for(&rx, timeout, "publish failed")?;

    info!(uri = %options.uri, persist = options.persist, "published");
    Ok(SUCCESS)
}

fn build_options(args: &PublishArgs) -> CliResult<PublishOptions> {
    let payload = match (&args.text, &args.file) {
        (Some(text), _) => Some(text.as_bytes().to_vec()),
        (None, Some(path)) => Some(fs::read(path).map_err(|err| {
            io_error(&format!("failed reading {}", path.display()), err)
        })?),
        (None, None) => None,
    };

    let mut payload_objects = Vec::new();
    if let Some(payload) = payload {
        let po = PayloadObject::with_dotted(&args.po, payload)
            .map_err(|err| frame_error("bad --po", err))?;
        payload_objects.push(po);
    }

    Ok(PublishOptions {
        uri: args.uri.clone(),
        access: args.access.to_options()?,
        payload_objects,
        persist: args.persist,
    })
}

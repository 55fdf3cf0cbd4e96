use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use agentwire_agent::{subscribe, unsubscribe, SubscribeOptions, SubscriptionEvent};
use tracing::{info, warn};

use crate::cmd::{open_agent, parse_duration, wait_for, ConnectArgs, SubscribeArgs};
use crate::exit::{agent_error, command_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_message, OutputFormat};

const POLL: Duration = Duration::from_millis(100);

pub fn run(args: SubscribeArgs, connect: &ConnectArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&connect.timeout)?;
    let options = SubscribeOptions {
        uri: args.uri.clone(),
        access: args.access.to_options()?,
        leave_packed: args.leave_packed,
    };
    let agent = open_agent(connect)?;

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let (tx, events) = mpsc::channel();
    let subscription = subscribe(&agent, &options, move |event| {
        let _ = tx.send(event);
    })
    .map_err(|err| agent_error("subscribe failed", err))?;

    let mut printed = 0usize;
    let mut handle = None;

    while running.load(Ordering::SeqCst) {
        let event = match events.recv_timeout(POLL) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        match event {
            SubscriptionEvent::Subscribed { handle: assigned } => {
                info!(uri = %options.uri, handle = ?assigned, "subscribed");
                handle = assigned;
            }
            SubscriptionEvent::Message(msg) => {
                print_message(&msg, format);
                printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| printed >= count) {
                    break;
                }
            }
            SubscriptionEvent::Ended(err) => return Err(command_error("subscription ended", err)),
        }
    }

    match handle {
        Some(handle) => {
            let (tx, rx) = mpsc::channel();
            unsubscribe(&agent, &handle, &subscription, move |outcome| {
                let _ = tx.send(outcome);
            })
            .map_err(|err| agent_error("unsubscribe failed", err))?;
            if let Err(err) = wait_for(&rx, timeout, "unsubscribe failed") {
                warn!(error = %err, "agent did not confirm unsubscribe");
            }
        }
        None => subscription.cancel(),
    }

    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

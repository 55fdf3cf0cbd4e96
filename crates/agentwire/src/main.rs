mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::{Command, ConnectArgs};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "agentwire", version, about = "Talk to a local pub/sub agent")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "warn", global = true)]
    log_level: LogLevel,

    #[command(flatten)]
    connect: ConnectArgs,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, &cli.connect, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_publish_subcommand() {
        let cli = Cli::try_parse_from([
            "agentwire",
            "--agent",
            "10.0.0.2:28589",
            "publish",
            "scratch/demo",
            "--text",
            "hello",
            "--persist",
        ])
        .expect("publish args should parse");

        assert_eq!(cli.connect.agent, "10.0.0.2:28589");
        match cli.command {
            Command::Publish(args) => {
                assert_eq!(args.uri, "scratch/demo");
                assert_eq!(args.text.as_deref(), Some("hello"));
                assert_eq!(args.po, "64.0.1.0");
                assert!(args.persist);
            }
            other => panic!("expected publish, got {other:?}"),
        }
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "agentwire",
            "publish",
            "scratch/demo",
            "--text",
            "hello",
            "--file",
            "/tmp/payload.bin",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn global_connect_args_follow_subcommand() {
        let cli = Cli::try_parse_from([
            "agentwire",
            "subscribe",
            "scratch/+",
            "--count",
            "2",
            "--timeout",
            "3s",
            "--elaborate",
            "full",
        ])
        .expect("subscribe args should parse");

        assert_eq!(cli.connect.timeout, "3s");
        match cli.command {
            Command::Subscribe(args) => {
                assert_eq!(args.count, Some(2));
                assert!(matches!(args.access.elaborate, Some(cmd::Elaborate::Full)));
            }
            other => panic!("expected subscribe, got {other:?}"),
        }
    }

    #[test]
    fn parses_list_and_query() {
        let cli = Cli::try_parse_from(["agentwire", "list", "scratch"]).unwrap();
        assert!(matches!(cli.command, Command::List(_)));
        let cli = Cli::try_parse_from(["agentwire", "query", "scratch/+", "--no-verify"]).unwrap();
        assert!(matches!(cli.command, Command::Query(ref args) if args.access.no_verify));
    }
}

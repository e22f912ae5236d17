mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "ian", version, about = "Artemis protocol client")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level for the protocol engine (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "warn",
        env = "IAN_LOG_LEVEL",
        global = true
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    match cmd::run(cli.command, format) {
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
    fn parses_probe_subcommand() {
        let cli = Cli::try_parse_from(["ian", "probe", "10.0.0.5:2011", "--timeout", "3s"])
            .expect("probe args should parse");
        match cli.command {
            Command::Probe(args) => {
                assert_eq!(args.address, "10.0.0.5:2011");
                assert_eq!(args.timeout, "3s");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn parses_listen_with_global_flags() {
        let cli = Cli::try_parse_from([
            "ian",
            "listen",
            "artemis.local",
            "--count",
            "10",
            "--packets-only",
            "--format",
            "pretty",
            "--log-level",
            "debug",
        ])
        .expect("listen args should parse");

        assert!(matches!(cli.format, Some(OutputFormat::Pretty)));
        assert!(matches!(cli.log_level, LogLevel::Debug));
        match cli.command {
            Command::Listen(args) => {
                assert_eq!(args.count, Some(10));
                assert!(args.packets_only);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_missing_address() {
        let err = Cli::try_parse_from(["ian", "probe"]).expect_err("address is required");
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );
    }
}

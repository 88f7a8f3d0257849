//! ldapdump - export directory entries to YAML.
//!
//! Settings come from the command line, an optional YAML arguments file and built-in
//! defaults. The tool binds once, runs one subtree search and writes the projected entries
//! to a file or to standard output.

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use ldapdump_core::output::WriteOutcome;
use ldapdump_core::pipeline::{self, RunReport};
use ldapdump_core::settings::resolve_from_sources;
use ldapdump_core::{Error, Result, SettingsLayer};
use ldapdump_directory::LdapConnector;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod args;

use args::ArgumentSpec;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = match ArgumentSpec::try_parse() {
        Ok(cli) => cli,
        Err(err) => return argument_failure(&err),
    };

    init_logging(cli.verbose);

    match dump(cli.into_settings_layer()).await {
        Ok(report) => {
            if let WriteOutcome::File(path) = &report.outcome {
                println!("Output has been successfully exported to \"{}\"", path.display());
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            if err.shows_usage() {
                eprintln!();
                eprintln!("{}", ArgumentSpec::command().render_help());
            }
            ExitCode::from(err.exit_code())
        }
    }
}

async fn dump(cli: SettingsLayer) -> Result<RunReport> {
    let config = resolve_from_sources(cli)?;
    let report = pipeline::run(&config, &LdapConnector::new()).await?;
    debug!(entries = report.entries, rows = report.rows, "finished");
    Ok(report)
}

/// Help and version requests exit cleanly; anything else prints the full help.
fn argument_failure(err: &clap::Error) -> ExitCode {
    if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
        let _ = err.print();
        return ExitCode::SUCCESS;
    }

    let _ = err.print();
    eprintln!();
    eprintln!("{}", ArgumentSpec::command().render_help());
    ExitCode::from(Error::ArgumentParse(err.to_string()).exit_code())
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

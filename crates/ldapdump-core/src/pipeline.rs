//! Orchestration of one dump.
//!
//! An invocation moves linearly through [`Stage`]s. Argument parsing and configuration
//! resolution happen in the binary; [`run`] drives the rest with a single connection, a
//! single bind and a single search. Nothing is retried.

use crate::directory::{ConnectionTarget, DirectoryConnector, SearchRequest};
use crate::output::{write_document, WriteOutcome};
use crate::projection::project;
use crate::settings::ResolvedConfig;
use crate::Result;
use secrecy::ExposeSecret;
use std::fmt;
use tracing::{debug, info, warn};

/// Steps of an invocation, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Reading command line flags.
    ParsingArgs,
    /// Merging sources into a [`ResolvedConfig`].
    ResolvingConfig,
    /// Opening the directory connection.
    Connecting,
    /// Authenticating.
    Binding,
    /// Running the search.
    Searching,
    /// Building the output document.
    Projecting,
    /// Writing the output document.
    WritingOutput,
    /// Finished.
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ParsingArgs => "parsing-args",
            Self::ResolvingConfig => "resolving-config",
            Self::Connecting => "connecting",
            Self::Binding => "binding",
            Self::Searching => "searching",
            Self::Projecting => "projecting",
            Self::WritingOutput => "writing-output",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// Entries returned by the search.
    pub entries: usize,
    /// Rows in the output document.
    pub rows: usize,
    /// Where the document was written.
    pub outcome: WriteOutcome,
}

/// Connects, binds, searches, projects and writes.
///
/// # Errors
///
/// Returns the first failing stage's error: [`crate::Error::Connection`],
/// [`crate::Error::Bind`], [`crate::Error::Search`], or an output error.
pub async fn run(config: &ResolvedConfig, connector: &dyn DirectoryConnector) -> Result<RunReport> {
    let target = ConnectionTarget::from(config);
    debug!(stage = %Stage::Connecting, host = %target.host, port = target.port, "opening directory connection");
    let mut session = connector.connect(&target).await?;

    let principal = config.principal();
    debug!(stage = %Stage::Binding, principal = %principal, "binding");
    session
        .bind(&principal, config.password().expose_secret())
        .await?;

    let request = SearchRequest::from(config);
    debug!(stage = %Stage::Searching, base_dn = %request.base_dn, filter = %request.filter, "searching");
    let entries = session.search(&request).await?;

    if let Err(err) = session.unbind().await {
        warn!(error = %err, "unbind failed");
    }

    let entry_count = entries.len();
    info!(entries = entry_count, "search returned");

    debug!(stage = %Stage::Projecting, "projecting entries");
    let document = project(entries, config);

    debug!(stage = %Stage::WritingOutput, rows = document.len(), "writing output");
    let outcome = write_document(&document, config.output())?;

    debug!(stage = %Stage::Done, "dump complete");
    Ok(RunReport {
        entries: entry_count,
        rows: document.len(),
        outcome,
    })
}

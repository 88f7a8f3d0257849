//! Output document encoding and delivery.

use crate::projection::OutputDocument;
use crate::settings::{OutputTarget, STDOUT_MARKER};
use crate::{Error, Result};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where a document ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Written to standard output.
    Stdout,
    /// Written to a file; holds the absolute path.
    File(PathBuf),
}

/// Serializes the document as YAML.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if the YAML emitter fails.
pub fn encode_document(document: &OutputDocument) -> Result<String> {
    serde_yaml::to_string(document).map_err(|err| Error::Serialization(err.to_string()))
}

/// Serializes the document and writes it to `writer`.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if encoding fails and [`Error::OutputWrite`] if the
/// writer fails.
pub fn write_document_to<W: Write>(document: &OutputDocument, mut writer: W) -> Result<()> {
    let yaml = encode_document(document)?;
    writer
        .write_all(yaml.as_bytes())
        .and_then(|()| writer.flush())
        .map_err(|err| Error::OutputWrite {
            path: PathBuf::from(STDOUT_MARKER),
            message: err.to_string(),
        })
}

/// Writes the document to its target.
///
/// For a file target, missing parent directories are created and an existing file is
/// replaced rather than appended to.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if encoding fails and [`Error::OutputWrite`] for any
/// I/O failure.
pub fn write_document(document: &OutputDocument, target: &OutputTarget) -> Result<WriteOutcome> {
    match target {
        OutputTarget::Stdio => {
            write_document_to(document, io::stdout().lock())?;
            Ok(WriteOutcome::Stdout)
        }
        OutputTarget::FilePath(path) => {
            let yaml = encode_document(document)?;
            let write_error = |err: io::Error| Error::OutputWrite {
                path: path.clone(),
                message: err.to_string(),
            };

            prepare_file_target(path).map_err(write_error)?;
            fs::write(path, yaml).map_err(write_error)?;

            let absolute = fs::canonicalize(path).map_err(write_error)?;
            debug!(path = %absolute.display(), rows = document.len(), "output written");
            Ok(WriteOutcome::File(absolute))
        }
    }
}

fn prepare_file_target(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        if !parent.exists() {
            debug!(dir = %parent.display(), "creating output directory");
            fs::create_dir_all(parent)?;
        }
    }

    if path.is_file() {
        fs::remove_file(path)?;
    }
    Ok(())
}

//! # ldapdump-core
//!
//! Configuration resolution and result projection for the `ldapdump` directory dump tool.
//!
//! This crate holds everything in `ldapdump` that makes decisions: merging argument
//! sources into one validated configuration, shaping raw directory entries into an output
//! document, and writing that document out. The directory protocol itself sits behind the
//! traits in [`directory`].
//!
//! ## Modules
//!
//! - [`error`] - Error taxonomy shared by every stage
//! - [`settings`] - Settings layers, the YAML arguments file and configuration resolution
//! - [`directory`] - Directory capability traits and entry type
//! - [`projection`] - Attribute filtering, value flattening and row keying
//! - [`output`] - YAML encoding and the stdout / file sink
//! - [`pipeline`] - Orchestration of connect, bind, search, project and write

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod directory;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod projection;
pub mod settings;

// Re-export commonly used types
pub use error::{Error, Result};
pub use settings::{OutputTarget, ResolvedConfig, SettingsLayer};

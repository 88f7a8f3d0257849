//! LDAP directory client for ldapdump.
//!
//! This crate implements the directory capability traits of `ldapdump-core` on top of the
//! `ldap3` crate.

#![deny(missing_docs)]

mod client;
mod config;

pub use client::{LdapConnector, LdapSession};
pub use config::LdapEndpoint;

/// Convenient result alias that reuses the core error type.
pub type Result<T> = ldapdump_core::Result<T>;

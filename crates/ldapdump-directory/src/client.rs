//! `ldap3` implementation of the directory traits.

use crate::config::LdapEndpoint;
use crate::Result;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ldap3::{LdapConnAsync, Scope, SearchEntry};
use ldapdump_core::directory::{
    ConnectionTarget, DirectoryConnector, DirectoryEntry, DirectorySession, SearchRequest,
};
use ldapdump_core::Error;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, trace};

/// Name of the pseudo-attribute that carries the entry's distinguished name.
const DN_ATTRIBUTE: &str = "dn";

/// Opens `ldap3` connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct LdapConnector;

impl LdapConnector {
    /// Creates a connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DirectoryConnector for LdapConnector {
    async fn connect(&self, target: &ConnectionTarget) -> Result<Box<dyn DirectorySession>> {
        let endpoint = LdapEndpoint::new(target)?;
        let settings = endpoint.connection_settings()?;
        debug!(url = endpoint.url(), "connecting");

        let (conn, ldap) = timeout(
            endpoint.timeout(),
            LdapConnAsync::with_settings(settings, endpoint.url()),
        )
        .await
        .map_err(|_| Error::Connection(timed_out("connect", endpoint.timeout())))?
        .map_err(|err| Error::Connection(format!("{}: {err}", endpoint.url())))?;
        ldap3::drive!(conn);

        Ok(Box::new(LdapSession {
            inner: ldap,
            operation_timeout: endpoint.timeout(),
        }))
    }
}

/// An open `ldap3` connection.
pub struct LdapSession {
    inner: ldap3::Ldap,
    operation_timeout: Duration,
}

impl std::fmt::Debug for LdapSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapSession")
            .field("operation_timeout", &self.operation_timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl DirectorySession for LdapSession {
    async fn bind(&mut self, principal: &str, password: &str) -> Result<()> {
        timeout(self.operation_timeout, self.inner.simple_bind(principal, password))
            .await
            .map_err(|_| Error::Bind(timed_out("bind", self.operation_timeout)))?
            .and_then(ldap3::LdapResult::success)
            .map_err(|err| Error::Bind(err.to_string()))?;
        Ok(())
    }

    async fn search(&mut self, request: &SearchRequest) -> Result<Vec<DirectoryEntry>> {
        let result = timeout(
            self.operation_timeout,
            self.inner.search(
                &request.base_dn,
                Scope::Subtree,
                &request.filter,
                request.attributes.clone(),
            ),
        )
        .await
        .map_err(|_| Error::Search(timed_out("search", self.operation_timeout)))?
        .map_err(|err| Error::Search(err.to_string()))?;

        let (entries, _) = result
            .success()
            .map_err(|err| Error::Search(err.to_string()))?;
        trace!(entries = entries.len(), "search result received");

        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .map(entry_from_search)
            .collect())
    }

    async fn unbind(&mut self) -> Result<()> {
        timeout(self.operation_timeout, self.inner.unbind())
            .await
            .map_err(|_| Error::Connection(timed_out("unbind", self.operation_timeout)))?
            .map_err(|err| Error::Connection(err.to_string()))
    }
}

fn timed_out(operation: &str, limit: Duration) -> String {
    format!("{operation} timed out after {}s", limit.as_secs())
}

/// Flattens an `ldap3` entry; binary values become base64 text.
fn entry_from_search(entry: SearchEntry) -> DirectoryEntry {
    let mut attributes: BTreeMap<String, Vec<String>> = BTreeMap::new();
    attributes.insert(DN_ATTRIBUTE.to_string(), vec![entry.dn]);

    for (name, values) in entry.attrs {
        attributes.entry(name).or_default().extend(values);
    }
    for (name, values) in entry.bin_attrs {
        attributes
            .entry(name)
            .or_default()
            .extend(values.iter().map(|value| STANDARD.encode(value)));
    }

    DirectoryEntry { attributes }
}

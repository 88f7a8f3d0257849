//! Directory capability traits.
//!
//! The pipeline talks to the directory only through [`DirectoryConnector`] and
//! [`DirectorySession`]. The production implementation lives in `ldapdump-directory`; tests
//! use the `mockall` doubles generated here.

use crate::settings::{ResolvedConfig, TransportSecurity};
use crate::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;

/// Attribute requested when the allow-list is empty.
pub const ALL_USER_ATTRIBUTES: &str = "*";

/// A directory entry as returned by a search.
///
/// Maps attribute names to their values; directory attributes are multi-valued, so every
/// value is a sequence in server order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Attribute map.
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl DirectoryEntry {
    /// Creates an entry from `(name, values)` pairs.
    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: IntoIterator,
        V::Item: Into<String>,
    {
        Self {
            attributes: pairs
                .into_iter()
                .map(|(name, values)| (name.into(), values.into_iter().map(Into::into).collect()))
                .collect(),
        }
    }

    /// Returns all values for the attribute.
    #[must_use]
    pub fn values(&self, attribute: &str) -> Option<&[String]> {
        self.attributes.get(attribute).map(Vec::as_slice)
    }
}

/// Where and how to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionTarget {
    /// Server host name or address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Transport security mode.
    pub transport: TransportSecurity,
    /// Whether TLS certificates are verified.
    pub tls_verify: bool,
    /// Applied to connect and to each directory operation.
    pub timeout: Duration,
}

impl From<&ResolvedConfig> for ConnectionTarget {
    fn from(config: &ResolvedConfig) -> Self {
        Self {
            host: config.server().to_string(),
            port: config.port(),
            transport: config.transport(),
            tls_verify: config.tls_verify(),
            timeout: config.timeout(),
        }
    }
}

/// Subtree search parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Search base DN.
    pub base_dn: String,
    /// LDAP filter.
    pub filter: String,
    /// Requested attribute names.
    pub attributes: Vec<String>,
}

impl From<&ResolvedConfig> for SearchRequest {
    fn from(config: &ResolvedConfig) -> Self {
        let attributes = if config.attributes().is_empty() {
            vec![ALL_USER_ATTRIBUTES.to_string()]
        } else {
            config.attributes().iter().cloned().collect()
        };

        Self {
            base_dn: config.base_dn().to_string(),
            filter: config.filter().to_string(),
            attributes,
        }
    }
}

/// Opens sessions against a directory server.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    /// Connects to the target, failing with [`crate::Error::Connection`].
    async fn connect(&self, target: &ConnectionTarget) -> Result<Box<dyn DirectorySession>>;
}

/// An open directory connection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectorySession: Send {
    /// Simple bind, failing with [`crate::Error::Bind`].
    async fn bind(&mut self, principal: &str, password: &str) -> Result<()>;

    /// Subtree search, failing with [`crate::Error::Search`].
    async fn search(&mut self, request: &SearchRequest) -> Result<Vec<DirectoryEntry>>;

    /// Closes the connection.
    async fn unbind(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{resolve, SettingsLayer};
    use secrecy::SecretString;
    use std::collections::BTreeSet;

    fn layer() -> SettingsLayer {
        SettingsLayer {
            server: Some("ldap.example.com".to_string()),
            port: Some(636),
            domain: Some("example.com".to_string()),
            basedn: Some("dc=example,dc=com".to_string()),
            username: Some("reader".to_string()),
            password: Some(SecretString::from("pw".to_string())),
            ssl: Some(true),
            timeout: Some(25),
            ..SettingsLayer::default()
        }
    }

    #[test]
    fn connection_target_from_config() {
        let config = resolve(layer(), None).unwrap();
        let target = ConnectionTarget::from(&config);

        assert_eq!(target.host, "ldap.example.com");
        assert_eq!(target.port, 636);
        assert_eq!(target.transport, TransportSecurity::Ssl);
        assert!(target.tls_verify);
        assert_eq!(target.timeout, Duration::from_secs(25));
    }

    #[test]
    fn search_request_requests_everything_without_allow_list() {
        let config = resolve(layer(), None).unwrap();
        let request = SearchRequest::from(&config);

        assert_eq!(request.base_dn, "dc=example,dc=com");
        assert_eq!(request.filter, "(objectClass=*)");
        assert_eq!(request.attributes, vec!["*".to_string()]);
    }

    #[test]
    fn search_request_uses_allow_list() {
        let mut cli = layer();
        cli.attributes = Some(BTreeSet::from(["mail".to_string(), "cn".to_string()]));
        let config = resolve(cli, None).unwrap();

        let request = SearchRequest::from(&config);
        assert_eq!(request.attributes, vec!["cn".to_string(), "mail".to_string()]);
    }

    #[test]
    fn entry_from_pairs() {
        let entry = DirectoryEntry::from_pairs([("cn", vec!["Alice"]), ("mail", vec!["a@x.com", "a2@x.com"])]);
        assert_eq!(entry.values("cn"), Some(&["Alice".to_string()][..]));
        assert_eq!(entry.values("mail").map(<[String]>::len), Some(2));
        assert!(entry.values("sn").is_none());
    }
}

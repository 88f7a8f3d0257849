//! Connection settings for the LDAP client.

use crate::Result;
use ldap3::LdapConnSettings;
use ldapdump_core::directory::ConnectionTarget;
use ldapdump_core::settings::TransportSecurity;
use ldapdump_core::Error;
use native_tls::TlsConnector;
use std::time::Duration;
use url::Url;

/// LDAP endpoint derived from a [`ConnectionTarget`].
#[derive(Debug, Clone)]
pub struct LdapEndpoint {
    url: Url,
    transport: TransportSecurity,
    tls_verify: bool,
    timeout: Duration,
}

impl LdapEndpoint {
    /// Builds the endpoint URL for the target.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if host and port do not form a valid URL.
    pub fn new(target: &ConnectionTarget) -> Result<Self> {
        let scheme = match target.transport {
            TransportSecurity::Ssl => "ldaps",
            TransportSecurity::Plain | TransportSecurity::StartTls => "ldap",
        };
        let host = if target.host.contains(':') && !target.host.starts_with('[') {
            format!("[{}]", target.host)
        } else {
            target.host.clone()
        };

        let raw = format!("{scheme}://{host}:{}", target.port);
        let url = Url::parse(&raw)
            .map_err(|err| Error::Connection(format!("invalid directory address `{raw}`: {err}")))?;
        if url.host_str().map_or(true, str::is_empty) {
            return Err(Error::Connection(format!(
                "invalid directory address `{raw}`: missing host"
            )));
        }

        Ok(Self {
            url,
            transport: target.transport,
            tls_verify: target.tls_verify,
            timeout: target.timeout,
        })
    }

    /// Returns the LDAP URL.
    #[must_use]
    pub fn url(&self) -> &str {
        self.url.as_str()
    }

    /// Returns the connection and operation timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Builds the `ldap3` connection settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the TLS connector cannot be constructed.
    pub fn connection_settings(&self) -> Result<LdapConnSettings> {
        let mut settings = LdapConnSettings::new()
            .set_conn_timeout(self.timeout)
            .set_starttls(self.transport == TransportSecurity::StartTls);

        if !self.tls_verify {
            let connector = TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()
                .map_err(|err| {
                    Error::Connection(format!("failed to construct TLS connector: {err}"))
                })?;
            settings = settings.set_connector(connector).set_no_tls_verify(true);
        }

        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(host: &str, port: u16, transport: TransportSecurity) -> ConnectionTarget {
        ConnectionTarget {
            host: host.to_string(),
            port,
            transport,
            tls_verify: true,
            timeout: Duration::from_secs(10),
        }
    }

    #[test]
    fn plain_and_starttls_use_ldap_scheme() {
        let endpoint = LdapEndpoint::new(&target("dc01.corp.example.com", 389, TransportSecurity::Plain)).unwrap();
        assert_eq!(endpoint.url(), "ldap://dc01.corp.example.com:389");

        let endpoint = LdapEndpoint::new(&target("dc01.corp.example.com", 389, TransportSecurity::StartTls)).unwrap();
        assert!(endpoint.url().starts_with("ldap://"));
    }

    #[test]
    fn ssl_uses_ldaps_scheme() {
        let endpoint = LdapEndpoint::new(&target("dc01.corp.example.com", 636, TransportSecurity::Ssl)).unwrap();
        assert_eq!(endpoint.url(), "ldaps://dc01.corp.example.com:636");
        assert_eq!(endpoint.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn ipv6_hosts_are_bracketed() {
        let endpoint = LdapEndpoint::new(&target("fd00::10", 389, TransportSecurity::Plain)).unwrap();
        assert_eq!(endpoint.url(), "ldap://[fd00::10]:389");
    }

    #[test]
    fn invalid_host_is_rejected() {
        let err = LdapEndpoint::new(&target("dc 01", 389, TransportSecurity::Plain)).unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
    }

    #[test]
    fn insecure_settings_build() {
        let mut insecure = target("dc01", 636, TransportSecurity::Ssl);
        insecure.tls_verify = false;

        let endpoint = LdapEndpoint::new(&insecure).unwrap();
        assert!(endpoint.connection_settings().is_ok());
    }
}

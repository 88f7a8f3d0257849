//! Command line surface.

use clap::Parser;
use ldapdump_core::settings::{parse_attribute_list, OutputTarget};
use ldapdump_core::SettingsLayer;
use secrecy::SecretString;
use std::path::PathBuf;

/// Dump LDAP directory entries to YAML
#[derive(Debug, Parser)]
#[command(name = "ldapdump", version, about, long_about = None)]
pub struct ArgumentSpec {
    /// Directory server host name or address
    #[arg(short = 'S', long, value_name = "HOST")]
    pub server: Option<String>,

    /// Directory server port
    #[arg(short = 'P', long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Account domain appended to the username for binding
    #[arg(short = 'D', long, value_name = "DOMAIN")]
    pub domain: Option<String>,

    /// Search base DN
    #[arg(short = 'B', long, value_name = "DN")]
    pub basedn: Option<String>,

    /// Bind username
    #[arg(short = 'U', long, value_name = "USER")]
    pub username: Option<String>,

    /// Bind password
    #[arg(short = 'w', long, value_name = "PASSWORD")]
    pub password: Option<String>,

    /// YAML arguments file
    #[arg(short = 'y', long, value_name = "FILE")]
    pub ymlfile: Option<PathBuf>,

    /// LDAP search filter [default: (objectClass=*)]
    #[arg(short = 'f', long, value_name = "FILTER")]
    pub filter: Option<String>,

    /// Comma separated attributes to keep (default: all)
    #[arg(long, value_name = "LIST")]
    pub attributes: Option<String>,

    /// Output file, or "-" for stdout [default: -]
    #[arg(long, value_name = "FILE")]
    pub output: Option<String>,

    /// Attribute used to key output rows [default: samaccountname]
    #[arg(long, value_name = "ATTRIBUTE")]
    pub keyattr: Option<String>,

    /// Connect over LDAPS
    #[arg(short = 's', long, overrides_with = "no_ssl")]
    pub ssl: bool,

    /// Connect without LDAPS, overriding the arguments file
    #[arg(long, overrides_with = "ssl")]
    pub no_ssl: bool,

    /// Upgrade a plain connection with StartTLS
    #[arg(long, overrides_with = "no_starttls")]
    pub starttls: bool,

    /// Do not use StartTLS, overriding the arguments file
    #[arg(long, overrides_with = "starttls")]
    pub no_starttls: bool,

    /// Skip TLS certificate verification
    #[arg(long, overrides_with = "no_insecure")]
    pub insecure: bool,

    /// Verify TLS certificates, overriding the arguments file
    #[arg(long, overrides_with = "insecure")]
    pub no_insecure: bool,

    /// Connection and operation timeout in seconds [default: 10]
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl ArgumentSpec {
    /// Converts the parsed flags into the command line settings layer.
    ///
    /// Switches given in neither form stay unset so a file value can still apply.
    #[must_use]
    pub fn into_settings_layer(self) -> SettingsLayer {
        SettingsLayer {
            server: self.server,
            port: self.port,
            domain: self.domain,
            basedn: self.basedn,
            username: self.username,
            password: self.password.map(SecretString::from),
            ymlfile: self.ymlfile,
            filter: self.filter,
            attributes: self.attributes.as_deref().map(parse_attribute_list),
            output: self.output.as_deref().and_then(OutputTarget::parse),
            keyattr: self.keyattr,
            ssl: switch(self.ssl, self.no_ssl),
            starttls: switch(self.starttls, self.no_starttls),
            insecure: switch(self.insecure, self.no_insecure),
            timeout: self.timeout,
        }
    }
}

fn switch(on: bool, off: bool) -> Option<bool> {
    if on {
        Some(true)
    } else if off {
        Some(false)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;
    use clap::CommandFactory;
    use ldapdump_core::settings::{decode_settings, resolve, TransportSecurity};
    use secrecy::ExposeSecret;
    use std::collections::BTreeSet;
    use std::path::Path;

    fn parse(args: &[&str]) -> ArgumentSpec {
        ArgumentSpec::try_parse_from(std::iter::once("ldapdump").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn command_definition_is_valid() {
        ArgumentSpec::command().debug_assert();
    }

    #[test]
    fn short_flags_map_to_settings() {
        let layer = parse(&[
            "-S", "dc01.corp.example.com", "-P", "636", "-D", "corp.example.com", "-B",
            "DC=corp,DC=example,DC=com", "-U", "svc-dump", "-w", "s3cret", "-y", "ad.yml", "-f",
            "(objectClass=user)", "-s",
        ])
        .into_settings_layer();

        assert_eq!(layer.server.as_deref(), Some("dc01.corp.example.com"));
        assert_eq!(layer.port, Some(636));
        assert_eq!(layer.domain.as_deref(), Some("corp.example.com"));
        assert_eq!(layer.basedn.as_deref(), Some("DC=corp,DC=example,DC=com"));
        assert_eq!(layer.username.as_deref(), Some("svc-dump"));
        assert_eq!(layer.password.as_ref().map(|password| password.expose_secret()), Some("s3cret"));
        assert_eq!(layer.ymlfile, Some(PathBuf::from("ad.yml")));
        assert_eq!(layer.filter.as_deref(), Some("(objectClass=user)"));
        assert_eq!(layer.ssl, Some(true));
    }

    #[test]
    fn long_only_flags_map_to_settings() {
        let layer = parse(&[
            "--attributes", "cn, Mail", "--output", "out/users.yml", "--keyattr", "uid",
            "--starttls", "--insecure", "--timeout", "30",
        ])
        .into_settings_layer();

        assert_eq!(
            layer.attributes,
            Some(BTreeSet::from(["cn".to_string(), "mail".to_string()]))
        );
        assert_eq!(layer.output, Some(OutputTarget::FilePath(PathBuf::from("out/users.yml"))));
        assert_eq!(layer.keyattr.as_deref(), Some("uid"));
        assert_eq!(layer.starttls, Some(true));
        assert_eq!(layer.insecure, Some(true));
        assert_eq!(layer.timeout, Some(30));
    }

    #[test]
    fn absent_switches_stay_unset() {
        let layer = parse(&[]).into_settings_layer();
        assert_eq!(layer.ssl, None);
        assert_eq!(layer.starttls, None);
        assert_eq!(layer.insecure, None);
        assert!(layer.server.is_none());
        assert!(layer.output.is_none());
    }

    #[test]
    fn negated_switches_are_explicit_false() {
        let layer = parse(&["--no-ssl", "--no-starttls", "--no-insecure"]).into_settings_layer();
        assert_eq!(layer.ssl, Some(false));
        assert_eq!(layer.starttls, Some(false));
        assert_eq!(layer.insecure, Some(false));
    }

    #[test]
    fn last_of_a_switch_pair_wins() {
        assert_eq!(parse(&["--ssl", "--no-ssl"]).into_settings_layer().ssl, Some(false));
        assert_eq!(parse(&["--no-ssl", "-s"]).into_settings_layer().ssl, Some(true));
    }

    #[test]
    fn no_ssl_overrides_arguments_file() {
        let file = decode_settings("ssl: true\ninsecure: true\n", Path::new("args.yml")).unwrap();
        let cli = parse(&[
            "-S", "dc01", "-P", "389", "-D", "corp.example.com", "-B", "DC=corp", "-U", "svc-dump",
            "-w", "", "--no-ssl", "--no-insecure",
        ])
        .into_settings_layer();

        let config = resolve(cli, Some(file)).unwrap();
        assert_eq!(config.transport(), TransportSecurity::Plain);
        assert!(config.tls_verify());
    }

    #[test]
    fn dash_output_selects_stdout() {
        let layer = parse(&["--output", "-"]).into_settings_layer();
        assert_eq!(layer.output, Some(OutputTarget::Stdio));
    }

    #[test]
    fn verbosity_counts_repeats() {
        assert_eq!(parse(&[]).verbose, 0);
        assert_eq!(parse(&["-vv"]).verbose, 2);
        assert_eq!(parse(&["-v", "--verbose"]).verbose, 2);
    }

    #[test]
    fn help_short_circuits_parsing() {
        let err = ArgumentSpec::try_parse_from(["ldapdump", "-S", "dc01", "--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        assert_eq!(err.exit_code(), 0);
    }

    #[test]
    fn version_short_circuits_parsing() {
        let err = ArgumentSpec::try_parse_from(["ldapdump", "-V"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayVersion);
    }

    #[test]
    fn unknown_flag_is_rejected() {
        let err = ArgumentSpec::try_parse_from(["ldapdump", "--bogus"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownArgument);
    }

    #[test]
    fn non_numeric_port_is_rejected() {
        let err = ArgumentSpec::try_parse_from(["ldapdump", "-P", "ldap"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
    }
}

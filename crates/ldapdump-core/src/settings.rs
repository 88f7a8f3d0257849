//! Settings layers and configuration resolution.
//!
//! An invocation draws its settings from three places: the command line, an optional YAML
//! arguments file and the built-in defaults. Each source produces a [`SettingsLayer`] in
//! which every field is optional. [`resolve`] stacks the layers (command line over file over
//! defaults), checks that every required setting is present and returns one immutable
//! [`ResolvedConfig`].

use crate::{Error, Result};
use secrecy::SecretString;
use serde::de::{Deserialize, Deserializer, IgnoredAny, MapAccess, Visitor};
use serde_yaml::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};
use validator::{Validate, ValidationError};

/// Default search filter.
pub const DEFAULT_FILTER: &str = "(objectClass=*)";
/// Default attribute used to key output rows.
pub const DEFAULT_KEY_ATTRIBUTE: &str = "samaccountname";
/// Default connection and operation timeout (seconds).
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
/// Output value that selects standard output.
pub const STDOUT_MARKER: &str = "-";

/// Settings that must be present after merging, in reporting order.
pub const REQUIRED_SETTINGS: &[&str] = &["server", "port", "domain", "basedn", "username", "password"];

/// Where the output document is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// Standard output.
    Stdio,
    /// A file, created along with its parent directories when missing.
    FilePath(PathBuf),
}

impl OutputTarget {
    /// Interprets a user-supplied output value.
    ///
    /// Blank values mean "not specified" and yield `None`; [`STDOUT_MARKER`] selects stdout.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            None
        } else if value == STDOUT_MARKER {
            Some(Self::Stdio)
        } else {
            Some(Self::FilePath(PathBuf::from(value)))
        }
    }
}

/// Transport security used for the directory connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportSecurity {
    /// Plain LDAP.
    #[default]
    Plain,
    /// LDAP over SSL/TLS (`ldaps://`).
    Ssl,
    /// Plain LDAP upgraded with StartTLS.
    StartTls,
}

/// One source's contribution to the configuration.
///
/// A field is `Some` only when the source actually specified it, which is what lets an
/// explicit command line value win over the arguments file while an omitted flag does not.
#[derive(Debug, Default)]
pub struct SettingsLayer {
    /// Directory server host name.
    pub server: Option<String>,
    /// Directory server port.
    pub port: Option<u16>,
    /// Account domain appended to the bind user name.
    pub domain: Option<String>,
    /// Base DN of the search.
    pub basedn: Option<String>,
    /// Bind user name.
    pub username: Option<String>,
    /// Bind password; an empty password is a valid value.
    pub password: Option<SecretString>,
    /// Path of the YAML arguments file.
    pub ymlfile: Option<PathBuf>,
    /// Search filter.
    pub filter: Option<String>,
    /// Attribute allow-list.
    pub attributes: Option<BTreeSet<String>>,
    /// Output target.
    pub output: Option<OutputTarget>,
    /// Attribute used to key output rows.
    pub keyattr: Option<String>,
    /// Connect with `ldaps://`.
    pub ssl: Option<bool>,
    /// Upgrade a plain connection with StartTLS.
    pub starttls: Option<bool>,
    /// Skip TLS certificate verification.
    pub insecure: Option<bool>,
    /// Connection and operation timeout in seconds.
    pub timeout: Option<u64>,
}

impl SettingsLayer {
    /// The built-in defaults.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            filter: Some(DEFAULT_FILTER.to_string()),
            attributes: Some(BTreeSet::new()),
            output: Some(OutputTarget::Stdio),
            keyattr: Some(DEFAULT_KEY_ATTRIBUTE.to_string()),
            ssl: Some(false),
            starttls: Some(false),
            insecure: Some(false),
            timeout: Some(DEFAULT_TIMEOUT_SECS),
            ..Self::default()
        }
    }

    /// Returns the arguments file path, if one was given.
    #[must_use]
    pub fn arguments_file(&self) -> Option<&Path> {
        self.ymlfile
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
    }

    /// Maps blank and default-valued entries to "not specified" and lower-cases attribute
    /// names.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            server: non_blank(self.server),
            port: self.port,
            domain: non_blank(self.domain),
            basedn: non_blank(self.basedn),
            username: non_blank(self.username),
            password: self.password,
            ymlfile: self.ymlfile.filter(|path| !path.as_os_str().is_empty()),
            filter: non_blank(self.filter)
                .map(parenthesize_filter)
                .filter(|filter| filter != DEFAULT_FILTER),
            attributes: self
                .attributes
                .map(|set| {
                    set.into_iter()
                        .map(|name| name.trim().to_ascii_lowercase())
                        .filter(|name| !name.is_empty())
                        .collect::<BTreeSet<_>>()
                })
                .filter(|set| !set.is_empty()),
            output: self.output,
            keyattr: non_blank(self.keyattr).map(|name| name.to_ascii_lowercase()),
            ssl: self.ssl,
            starttls: self.starttls,
            insecure: self.insecure,
            timeout: self.timeout,
        }
    }

    /// Fills every unspecified field of `self` from `lower`.
    #[must_use]
    pub fn layered_over(self, lower: Self) -> Self {
        Self {
            server: self.server.or(lower.server),
            port: self.port.or(lower.port),
            domain: self.domain.or(lower.domain),
            basedn: self.basedn.or(lower.basedn),
            username: self.username.or(lower.username),
            password: self.password.or(lower.password),
            ymlfile: self.ymlfile.or(lower.ymlfile),
            filter: self.filter.or(lower.filter),
            attributes: self.attributes.or(lower.attributes),
            output: self.output.or(lower.output),
            keyattr: self.keyattr.or(lower.keyattr),
            ssl: self.ssl.or(lower.ssl),
            starttls: self.starttls.or(lower.starttls),
            insecure: self.insecure.or(lower.insecure),
            timeout: self.timeout.or(lower.timeout),
        }
    }
}

/// Splits a comma-separated attribute list into a lower-cased set.
#[must_use]
pub fn parse_attribute_list(value: &str) -> BTreeSet<String> {
    value
        .split(',')
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect()
}

/// Encloses a bare filter such as `objectClass=user` in parentheses.
fn parenthesize_filter(filter: String) -> String {
    if filter.starts_with('(') {
        filter
    } else {
        format!("({filter})")
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
}

/// Fully merged and validated configuration for one invocation.
#[derive(Debug, Validate)]
pub struct ResolvedConfig {
    server: String,
    #[validate(range(min = 1))]
    port: u16,
    transport: TransportSecurity,
    tls_verify: bool,
    #[validate(range(min = 1, max = 3600))]
    timeout_secs: u64,
    account_domain: String,
    base_dn: String,
    username: String,
    password: SecretString,
    #[validate(custom(function = "validate_filter"))]
    filter: String,
    attributes: BTreeSet<String>,
    key_attribute: String,
    output: OutputTarget,
}

impl ResolvedConfig {
    /// Returns the directory server host name.
    #[must_use]
    pub fn server(&self) -> &str {
        &self.server
    }

    /// Returns the directory server port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns the transport security mode.
    #[must_use]
    pub const fn transport(&self) -> TransportSecurity {
        self.transport
    }

    /// Returns whether TLS certificates are verified.
    #[must_use]
    pub const fn tls_verify(&self) -> bool {
        self.tls_verify
    }

    /// Returns the connection and operation timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Returns the account domain.
    #[must_use]
    pub fn account_domain(&self) -> &str {
        &self.account_domain
    }

    /// Returns the search base DN.
    #[must_use]
    pub fn base_dn(&self) -> &str {
        &self.base_dn
    }

    /// Returns the bind user name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the bind password.
    #[must_use]
    pub const fn password(&self) -> &SecretString {
        &self.password
    }

    /// Returns the search filter.
    #[must_use]
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Returns the attribute allow-list (empty means every attribute).
    #[must_use]
    pub const fn attributes(&self) -> &BTreeSet<String> {
        &self.attributes
    }

    /// Returns the lower-cased key attribute.
    #[must_use]
    pub fn key_attribute(&self) -> &str {
        &self.key_attribute
    }

    /// Returns the output target.
    #[must_use]
    pub const fn output(&self) -> &OutputTarget {
        &self.output
    }

    /// Bind principal in `user@domain` form.
    #[must_use]
    pub fn principal(&self) -> String {
        format!("{}@{}", self.username, self.account_domain)
    }
}

fn validate_filter(filter: &str) -> std::result::Result<(), ValidationError> {
    let mut depth = 0_usize;
    let mut balanced = filter.starts_with('(') && filter.ends_with(')');
    for ch in filter.chars() {
        match ch {
            '(' => depth += 1,
            ')' if depth == 0 => balanced = false,
            ')' => depth -= 1,
            _ => {}
        }
    }

    if balanced && depth == 0 {
        Ok(())
    } else {
        let mut err = ValidationError::new("invalid_filter");
        err.message = Some("filter has unbalanced parentheses".into());
        Err(err)
    }
}

/// Merges the command line layer with the optional arguments file layer and the defaults.
///
/// # Errors
///
/// Returns [`Error::MissingRequiredFields`] naming every absent required setting,
/// [`Error::InvalidValue`] for contradictory transport flags and [`Error::ValidationError`]
/// when a value is out of range.
pub fn resolve(cli: SettingsLayer, file: Option<SettingsLayer>) -> Result<ResolvedConfig> {
    let merged = cli
        .normalized()
        .layered_over(file.unwrap_or_default().normalized())
        .layered_over(SettingsLayer::defaults());

    let config = finalize(merged)?;
    config.validate()?;

    debug!(
        server = %config.server,
        port = config.port,
        base_dn = %config.base_dn,
        filter = %config.filter,
        key_attribute = %config.key_attribute,
        "configuration resolved"
    );
    Ok(config)
}

/// Loads the arguments file named by the command line layer, if any, and resolves.
///
/// # Errors
///
/// Propagates errors from [`load_settings_file`] and [`resolve`].
pub fn resolve_from_sources(cli: SettingsLayer) -> Result<ResolvedConfig> {
    let file = match cli.arguments_file() {
        Some(path) => Some(load_settings_file(path)?),
        None => None,
    };
    resolve(cli, file)
}

fn finalize(merged: SettingsLayer) -> Result<ResolvedConfig> {
    let mut missing = Vec::new();
    for (name, present) in [
        ("server", merged.server.is_some()),
        ("port", merged.port.is_some()),
        ("domain", merged.domain.is_some()),
        ("basedn", merged.basedn.is_some()),
        ("username", merged.username.is_some()),
        ("password", merged.password.is_some()),
    ] {
        if !present {
            missing.push(name.to_string());
        }
    }

    let (Some(server), Some(port), Some(account_domain), Some(base_dn), Some(username), Some(password)) = (
        merged.server,
        merged.port,
        merged.domain,
        merged.basedn,
        merged.username,
        merged.password,
    ) else {
        return Err(Error::MissingRequiredFields(missing));
    };

    let transport = match (merged.ssl.unwrap_or(false), merged.starttls.unwrap_or(false)) {
        (true, true) => {
            return Err(Error::InvalidValue {
                key: "starttls".to_string(),
                message: "cannot be combined with ssl".to_string(),
            })
        }
        (true, false) => TransportSecurity::Ssl,
        (false, true) => TransportSecurity::StartTls,
        (false, false) => TransportSecurity::Plain,
    };

    Ok(ResolvedConfig {
        server,
        port,
        transport,
        tls_verify: !merged.insecure.unwrap_or(false),
        timeout_secs: merged.timeout.unwrap_or(DEFAULT_TIMEOUT_SECS),
        account_domain,
        base_dn,
        username,
        password,
        filter: merged.filter.unwrap_or_else(|| DEFAULT_FILTER.to_string()),
        attributes: merged.attributes.unwrap_or_default(),
        key_attribute: merged
            .keyattr
            .unwrap_or_else(|| DEFAULT_KEY_ATTRIBUTE.to_string()),
        output: merged.output.unwrap_or(OutputTarget::Stdio),
    })
}

/// Reads and decodes a YAML arguments file.
///
/// # Errors
///
/// Returns [`Error::ConfigFileNotFound`] when the path does not exist and
/// [`Error::ConfigFileParse`] when it cannot be read or decoded.
pub fn load_settings_file(path: &Path) -> Result<SettingsLayer> {
    if !path.exists() {
        return Err(Error::ConfigFileNotFound(path.to_path_buf()));
    }

    let text = fs::read_to_string(path).map_err(|err| Error::ConfigFileParse {
        path: path.to_path_buf(),
        message: err.to_string(),
    })?;

    debug!(path = %path.display(), "loading arguments file");
    decode_settings(&text, path)
}

/// Decodes the text of a YAML arguments file into a settings layer.
///
/// The document must be a flat mapping keyed by the long option names. Keys are matched
/// case-insensitively and unknown keys are skipped with a warning.
///
/// # Errors
///
/// Returns [`Error::ConfigFileParse`] for malformed YAML or a non-mapping document and
/// [`Error::InvalidValue`] for values of the wrong type.
pub fn decode_settings(text: &str, origin: &Path) -> Result<SettingsLayer> {
    let parse_error = |message: String| Error::ConfigFileParse {
        path: origin.to_path_buf(),
        message,
    };

    if text.trim().is_empty() {
        return Ok(SettingsLayer::default());
    }

    let document: Value = serde_yaml::from_str(text).map_err(|err| parse_error(err.to_string()))?;
    let mapping = match document {
        Value::Null => return Ok(SettingsLayer::default()),
        Value::Mapping(mapping) => mapping,
        other => {
            return Err(parse_error(format!(
                "expected a mapping of settings, found {}",
                value_kind(&other)
            )))
        }
    };

    // Plain scalars such as `1.50` or `0x1F` must reach the bind exactly as written.
    let verbatim = serde_yaml::from_str::<VerbatimText>(text)
        .map(|verbatim| verbatim.0)
        .unwrap_or_default();
    let text_value = |key: &str, value: Value| -> Result<Option<String>> {
        Ok(scalar_value(key, value)?.map(|text| verbatim.get(key).cloned().unwrap_or(text)))
    };

    let mut layer = SettingsLayer::default();
    for (key, value) in mapping {
        let Some(key) = key.as_str() else {
            return Err(parse_error(format!(
                "setting names must be strings, found {}",
                value_kind(&key)
            )));
        };
        let key = key.trim().to_ascii_lowercase();

        match key.as_str() {
            "server" => layer.server = text_value(key.as_str(), value)?,
            "port" => layer.port = port_value(&key, value)?,
            "domain" => layer.domain = text_value(key.as_str(), value)?,
            "basedn" => layer.basedn = text_value(key.as_str(), value)?,
            "username" => layer.username = text_value(key.as_str(), value)?,
            "password" => layer.password = text_value(key.as_str(), value)?.map(SecretString::from),
            "filter" => layer.filter = text_value(key.as_str(), value)?,
            "attributes" => layer.attributes = attribute_value(&key, value)?,
            "output" => {
                layer.output = text_value(key.as_str(), value)?.and_then(|text| OutputTarget::parse(&text));
            }
            "keyattr" => layer.keyattr = text_value(key.as_str(), value)?,
            "ssl" => layer.ssl = bool_value(&key, value)?,
            "starttls" => layer.starttls = bool_value(&key, value)?,
            "insecure" => layer.insecure = bool_value(&key, value)?,
            "timeout" => layer.timeout = integer_value(&key, value)?,
            "ymlfile" => debug!("ignoring `ymlfile` inside an arguments file"),
            _ => warn!(key = %key, "ignoring unknown key in arguments file"),
        }
    }

    Ok(layer)
}

fn invalid(key: &str, message: impl Into<String>) -> Error {
    Error::InvalidValue {
        key: key.to_string(),
        message: message.into(),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}

/// Setting names whose scalar values are taken as written in the file.
const TEXT_SETTINGS: &[&str] = &[
    "server", "domain", "basedn", "username", "password", "filter", "output", "keyattr",
];

/// Source text of the scalar values under [`TEXT_SETTINGS`], keyed by lower-cased name.
#[derive(Debug, Default)]
struct VerbatimText(BTreeMap<String, String>);

impl<'de> Deserialize<'de> for VerbatimText {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct TextVisitor;

        impl<'de> Visitor<'de> for TextVisitor {
            type Value = VerbatimText;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of settings")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut text = BTreeMap::new();
                while let Some(key) = map.next_key::<String>()? {
                    let key = key.trim().to_ascii_lowercase();
                    if TEXT_SETTINGS.contains(&key.as_str()) {
                        if let Some(value) = map.next_value::<Option<String>>()? {
                            text.insert(key, value);
                        }
                    } else {
                        map.next_value::<IgnoredAny>()?;
                    }
                }
                Ok(VerbatimText(text))
            }
        }

        deserializer.deserialize_map(TextVisitor)
    }
}

fn scalar_value(key: &str, value: Value) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(text) => Ok(Some(text)),
        Value::Number(number) => Ok(Some(number.to_string())),
        Value::Bool(flag) => Ok(Some(flag.to_string())),
        other => Err(invalid(
            key,
            format!("expected a scalar, found {}", value_kind(&other)),
        )),
    }
}

fn integer_value(key: &str, value: Value) -> Result<Option<u64>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(number) => number
            .as_u64()
            .map(Some)
            .ok_or_else(|| invalid(key, format!("expected a non-negative integer, found {number}"))),
        Value::String(text) => text
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| invalid(key, format!("expected a non-negative integer, found `{text}`"))),
        other => Err(invalid(
            key,
            format!("expected an integer, found {}", value_kind(&other)),
        )),
    }
}

fn port_value(key: &str, value: Value) -> Result<Option<u16>> {
    integer_value(key, value)?
        .map(|port| {
            u16::try_from(port)
                .map_err(|_| invalid(key, format!("port {port} is outside 1-65535")))
        })
        .transpose()
}

fn bool_value(key: &str, value: Value) -> Result<Option<bool>> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(flag) => Ok(Some(flag)),
        Value::Number(number) => match number.as_u64() {
            Some(0) => Ok(Some(false)),
            Some(1) => Ok(Some(true)),
            _ => Err(invalid(key, format!("expected a boolean, found {number}"))),
        },
        Value::String(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(Some(true)),
            "false" | "0" | "no" | "off" | "" => Ok(Some(false)),
            _ => Err(invalid(key, format!("expected a boolean, found `{text}`"))),
        },
        other => Err(invalid(
            key,
            format!("expected a boolean, found {}", value_kind(&other)),
        )),
    }
}

fn attribute_value(key: &str, value: Value) -> Result<Option<BTreeSet<String>>> {
    match value {
        Value::Sequence(items) => {
            let mut names = BTreeSet::new();
            for item in items {
                if let Some(text) = scalar_value(key, item)? {
                    names.extend(parse_attribute_list(&text));
                }
            }
            Ok(Some(names))
        }
        other => Ok(scalar_value(key, other)?.map(|text| parse_attribute_list(&text))),
    }
}

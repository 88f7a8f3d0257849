//! Result projection.
//!
//! Turns directory entries into the output document: attributes outside the allow-list are
//! dropped, single-element value lists are flattened, and each row is keyed by the value of
//! the key attribute or appended positionally when the row does not carry it.

use crate::directory::DirectoryEntry;
use crate::settings::ResolvedConfig;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// A projected attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    /// The attribute had exactly one value.
    Single(String),
    /// The attribute had zero or several values, in server order.
    Multiple(Vec<String>),
}

impl AttributeValue {
    /// Flattens a one-element list to [`AttributeValue::Single`].
    #[must_use]
    pub fn from_values(mut values: Vec<String>) -> Self {
        if values.len() == 1 {
            Self::Single(values.remove(0))
        } else {
            Self::Multiple(values)
        }
    }

    /// Returns the first value, if any.
    #[must_use]
    pub fn first(&self) -> Option<&str> {
        match self {
            Self::Single(value) => Some(value),
            Self::Multiple(values) => values.first().map(String::as_str),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<Vec<&str>> for AttributeValue {
    fn from(values: Vec<&str>) -> Self {
        Self::Multiple(values.into_iter().map(str::to_string).collect())
    }
}

/// One output row: lower-cased attribute names mapped to projected values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ProjectedRow {
    attributes: BTreeMap<String, AttributeValue>,
}

impl ProjectedRow {
    /// Returns the value of an attribute.
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&AttributeValue> {
        self.attributes.get(attribute)
    }

    /// Number of attributes in the row.
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Returns true if no attribute survived filtering.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Iterates attributes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.attributes
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }
}

impl<K: Into<String>, V: Into<AttributeValue>> FromIterator<(K, V)> for ProjectedRow {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            attributes: iter
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}

/// A projected row together with its key-attribute value, if it has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedRow {
    /// Value of the key attribute.
    pub key: Option<String>,
    /// The projected row.
    pub row: ProjectedRow,
}

/// Projects a single entry.
///
/// The allow-list and key attribute are expected in lower case, as held by
/// [`ResolvedConfig`].
#[must_use]
pub fn project_entry(
    entry: DirectoryEntry,
    allow_list: &BTreeSet<String>,
    key_attribute: &str,
) -> KeyedRow {
    // Names differing only in case are one attribute; their values are merged.
    let mut merged: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, values) in entry.attributes {
        let name = name.to_ascii_lowercase();
        if allow_list.is_empty() || allow_list.contains(&name) {
            merged.entry(name).or_default().extend(values);
        }
    }

    let attributes = merged
        .into_iter()
        .map(|(name, values)| (name, AttributeValue::from_values(values)))
        .collect::<BTreeMap<_, _>>();

    let key = attributes
        .get(key_attribute)
        .and_then(AttributeValue::first)
        .map(str::to_string);

    KeyedRow {
        key,
        row: ProjectedRow { attributes },
    }
}

/// Lazy, single-pass projection over a stream of entries.
///
/// Entries are consumed in arrival order; nothing is buffered or re-ordered.
#[derive(Debug)]
pub struct Projection<'a, I> {
    entries: I,
    allow_list: &'a BTreeSet<String>,
    key_attribute: &'a str,
}

impl<'a, I> Projection<'a, I>
where
    I: Iterator<Item = DirectoryEntry>,
{
    /// Wraps an entry iterator using the allow-list and key attribute of `config`.
    pub fn new<E>(entries: E, config: &'a ResolvedConfig) -> Self
    where
        E: IntoIterator<IntoIter = I>,
    {
        Self {
            entries: entries.into_iter(),
            allow_list: config.attributes(),
            key_attribute: config.key_attribute(),
        }
    }
}

impl<I> Iterator for Projection<'_, I>
where
    I: Iterator<Item = DirectoryEntry>,
{
    type Item = KeyedRow;

    fn next(&mut self) -> Option<Self::Item> {
        self.entries
            .next()
            .map(|entry| project_entry(entry, self.allow_list, self.key_attribute))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.entries.size_hint()
    }
}

/// Projects every entry into an [`OutputDocument`].
#[must_use]
pub fn project<E>(entries: E, config: &ResolvedConfig) -> OutputDocument
where
    E: IntoIterator<Item = DirectoryEntry>,
{
    let document: OutputDocument = Projection::new(entries, config).collect();
    debug!(
        rows = document.len(),
        keyed = document.keyed_len(),
        "projection complete"
    );
    document
}

/// Address of a row in the output document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum DocumentKey {
    /// Keyed by the key-attribute value.
    Attribute(String),
    /// Appended positionally.
    Index(u64),
}

/// The output document.
///
/// Behaves as an insertion-ordered map that also accepts positionally appended rows. A keyed
/// insert whose key is already present replaces that row in place, so the last write wins.
/// Positional rows receive consecutive indices starting at 0.
///
/// Serializes as a sequence when no row is keyed, otherwise as a mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputDocument {
    rows: Vec<(DocumentKey, ProjectedRow)>,
    positions: HashMap<String, usize>,
    next_index: u64,
}

impl OutputDocument {
    /// Creates an empty document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a row under its key, or appends it when it has none.
    pub fn insert(&mut self, keyed: KeyedRow) {
        match keyed.key {
            Some(key) => {
                if let Some(&position) = self.positions.get(&key) {
                    debug!(key = %key, "duplicate key, replacing earlier row");
                    self.rows[position].1 = keyed.row;
                } else {
                    self.positions.insert(key.clone(), self.rows.len());
                    self.rows.push((DocumentKey::Attribute(key), keyed.row));
                }
            }
            None => {
                self.rows
                    .push((DocumentKey::Index(self.next_index), keyed.row));
                self.next_index += 1;
            }
        }
    }

    /// Returns the row stored under a key-attribute value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ProjectedRow> {
        self.positions.get(key).map(|&position| &self.rows[position].1)
    }

    /// Returns the positional row with the given index.
    #[must_use]
    pub fn get_index(&self, index: u64) -> Option<&ProjectedRow> {
        self.rows
            .iter()
            .find(|(key, _)| *key == DocumentKey::Index(index))
            .map(|(_, row)| row)
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the document has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of keyed rows.
    #[must_use]
    pub fn keyed_len(&self) -> usize {
        self.positions.len()
    }

    /// Iterates rows in document order.
    pub fn iter(&self) -> impl Iterator<Item = (&DocumentKey, &ProjectedRow)> {
        self.rows.iter().map(|(key, row)| (key, row))
    }
}

impl Extend<KeyedRow> for OutputDocument {
    fn extend<T: IntoIterator<Item = KeyedRow>>(&mut self, iter: T) {
        for keyed in iter {
            self.insert(keyed);
        }
    }
}

impl FromIterator<KeyedRow> for OutputDocument {
    fn from_iter<T: IntoIterator<Item = KeyedRow>>(iter: T) -> Self {
        let mut document = Self::new();
        document.extend(iter);
        document
    }
}

impl Serialize for OutputDocument {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if self.positions.is_empty() {
            let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
            for (_, row) in &self.rows {
                seq.serialize_element(row)?;
            }
            seq.end()
        } else {
            let mut map = serializer.serialize_map(Some(self.rows.len()))?;
            for (key, row) in &self.rows {
                map.serialize_entry(key, row)?;
            }
            map.end()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{resolve, SettingsLayer};
    use secrecy::SecretString;

    fn config(attributes: &[&str], keyattr: Option<&str>) -> ResolvedConfig {
        let cli = SettingsLayer {
            server: Some("dc01".to_string()),
            port: Some(389),
            domain: Some("corp.example.com".to_string()),
            basedn: Some("DC=corp,DC=example,DC=com".to_string()),
            username: Some("reader".to_string()),
            password: Some(SecretString::from(String::new())),
            attributes: Some(attributes.iter().map(ToString::to_string).collect()),
            keyattr: keyattr.map(str::to_string),
            ..SettingsLayer::default()
        };
        resolve(cli, None).unwrap()
    }

    fn alice() -> DirectoryEntry {
        DirectoryEntry::from_pairs([
            ("cn", vec!["Alice"]),
            ("mail", vec!["a@x.com", "a2@x.com"]),
            ("samaccountname", vec!["alice"]),
        ])
    }

    #[test]
    fn flattens_single_values_and_keys_row() {
        let document = project(vec![alice()], &config(&[], None));

        let expected: ProjectedRow = [
            ("cn", AttributeValue::from("Alice")),
            ("mail", AttributeValue::from(vec!["a@x.com", "a2@x.com"])),
            ("samaccountname", AttributeValue::from("alice")),
        ]
        .into_iter()
        .collect();

        assert_eq!(document.len(), 1);
        assert_eq!(document.get("alice"), Some(&expected));
    }

    #[test]
    fn allow_list_drops_key_and_appends_positionally() {
        let document = project(vec![alice()], &config(&["cn"], None));

        let expected: ProjectedRow = [("cn", "Alice")].into_iter().collect();
        assert_eq!(document.keyed_len(), 0);
        assert_eq!(document.get_index(0), Some(&expected));
    }

    #[test]
    fn case_variant_attribute_names_are_merged() {
        let entry = DirectoryEntry::from_pairs([
            ("Mail", vec!["a@x.com"]),
            ("mail", vec!["a2@x.com"]),
            ("sAMAccountName", vec!["alice"]),
        ]);

        let document = project(vec![entry], &config(&[], None));
        let row = document.get("alice").unwrap();

        assert_eq!(row.len(), 2);
        assert_eq!(row.get("mail"), Some(&AttributeValue::from(vec!["a@x.com", "a2@x.com"])));
    }

    #[test]
    fn later_row_with_same_key_wins() {
        let first = DirectoryEntry::from_pairs([("samaccountname", vec!["bob"]), ("title", vec!["Intern"])]);
        let second = DirectoryEntry::from_pairs([("samaccountname", vec!["bob"]), ("title", vec!["Engineer"])]);
        let other = DirectoryEntry::from_pairs([("samaccountname", vec!["carol"])]);

        let document = project(vec![first, other, second], &config(&[], None));

        assert_eq!(document.len(), 2);
        assert_eq!(
            document.get("bob").and_then(|row| row.get("title")),
            Some(&AttributeValue::from("Engineer"))
        );
        let keys: Vec<_> = document.iter().map(|(key, _)| key.clone()).collect();
        assert_eq!(
            keys,
            vec![
                DocumentKey::Attribute("bob".to_string()),
                DocumentKey::Attribute("carol".to_string()),
            ]
        );
    }

    #[test]
    fn attribute_names_match_case_insensitively() {
        let entry = DirectoryEntry::from_pairs([
            ("sAMAccountName", vec!["dave"]),
            ("displayName", vec!["Dave"]),
            ("memberOf", vec!["cn=a", "cn=b"]),
        ]);

        let document = project(vec![entry], &config(&["SAMAccountName", "memberof"], Some("sAMAccountName")));
        let row = document.get("dave").unwrap();
        assert!(row.get("displayname").is_none());
        assert_eq!(row.get("memberof"), Some(&AttributeValue::from(vec!["cn=a", "cn=b"])));
    }

    #[test]
    fn mixed_document_indexes_unkeyed_rows() {
        let keyless = DirectoryEntry::from_pairs([("cn", vec!["Printers"])]);
        let another = DirectoryEntry::from_pairs([("cn", vec!["Scanners"])]);

        let document = project(vec![keyless, alice(), another], &config(&[], None));
        let keys: Vec<_> = document.iter().map(|(key, _)| key.clone()).collect();
        assert_eq!(
            keys,
            vec![
                DocumentKey::Index(0),
                DocumentKey::Attribute("alice".to_string()),
                DocumentKey::Index(1),
            ]
        );
    }

    #[test]
    fn multi_valued_key_uses_first_value() {
        let entry = DirectoryEntry::from_pairs([("uid", vec!["eve", "eve2"])]);
        let document = project(vec![entry], &config(&[], Some("uid")));
        assert!(document.get("eve").is_some());
    }

    #[test]
    fn projection_is_lazy() {
        let config = config(&[], None);
        let mut consumed = 0;
        let entries = std::iter::repeat_with(alice).inspect(|_| consumed += 1).take(5);

        let mut projection = Projection::new(entries, &config);
        let first = projection.next().unwrap();
        assert_eq!(first.key.as_deref(), Some("alice"));
        drop(projection);
        assert_eq!(consumed, 1);
    }

    #[test]
    fn empty_value_list_stays_a_list() {
        assert_eq!(
            AttributeValue::from_values(Vec::new()),
            AttributeValue::Multiple(Vec::new())
        );
        assert_eq!(AttributeValue::Multiple(Vec::new()).first(), None);
    }
}

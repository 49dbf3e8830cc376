//! Entry representation built from search results.

use crate::dn::DistinguishedName;
use serde::{Deserialize, Serialize};
use std::collections::btree_map;
use std::collections::{BTreeMap, HashMap};

/// Multi-valued attribute map with case-insensitive names.
///
/// Names are stored lowercased; values keep the order they were inserted (or returned by the
/// server) in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, Vec<String>>",
    into = "BTreeMap<String, Vec<String>>"
)]
pub struct AttributeMap {
    inner: BTreeMap<String, Vec<String>>,
}

impl AttributeMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a single value, builder style.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.push(name, value);
        self
    }

    /// Adds several values, builder style.
    #[must_use]
    pub fn with_values<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extend_values(name, values);
        self
    }

    /// Appends a value to `name`.
    pub fn push(&mut self, name: &str, value: impl Into<String>) {
        self.inner
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.into());
    }

    /// Appends several values to `name`, creating it (possibly empty) if absent.
    pub fn extend_values<I, S>(&mut self, name: &str, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner
            .entry(name.to_ascii_lowercase())
            .or_default()
            .extend(values.into_iter().map(Into::into));
    }

    /// Replaces every value of `name`.
    pub fn insert(&mut self, name: &str, values: Vec<String>) -> Option<Vec<String>> {
        self.inner.insert(name.to_ascii_lowercase(), values)
    }

    /// Removes `name`, returning its values.
    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.inner.remove(&name.to_ascii_lowercase())
    }

    /// All values of `name`, if present.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.inner
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
    }

    /// First value of `name`.
    #[must_use]
    pub fn first(&self, name: &str) -> Option<&str> {
        self.get(name)
            .and_then(|values| values.first().map(String::as_str))
    }

    /// Returns true if `name` has at least one value.
    #[must_use]
    pub fn has_values(&self, name: &str) -> bool {
        self.get(name).is_some_and(|values| !values.is_empty())
    }

    /// Returns true if `name` is present, even without values.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(&name.to_ascii_lowercase())
    }

    /// Lowercased attribute names.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.inner.keys().map(String::as_str)
    }

    /// Iterates `(lowercased name, values)` pairs in name order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Vec<String>> {
        self.inner.iter()
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns true if no attributes are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Consumes the map into its `(lowercased name, values)` pairs.
    #[must_use]
    pub fn into_inner(self) -> BTreeMap<String, Vec<String>> {
        self.inner
    }
}

impl<'a> IntoIterator for &'a AttributeMap {
    type Item = (&'a String, &'a Vec<String>);
    type IntoIter = btree_map::Iter<'a, String, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}

impl From<BTreeMap<String, Vec<String>>> for AttributeMap {
    fn from(value: BTreeMap<String, Vec<String>>) -> Self {
        let mut map = Self::new();
        for (name, values) in value {
            map.extend_values(&name, values);
        }
        map
    }
}

impl From<AttributeMap> for BTreeMap<String, Vec<String>> {
    fn from(map: AttributeMap) -> Self {
        map.inner
    }
}

impl From<HashMap<String, Vec<String>>> for AttributeMap {
    fn from(value: HashMap<String, Vec<String>>) -> Self {
        let mut map = Self::new();
        for (name, values) in value {
            map.extend_values(&name, values);
        }
        map
    }
}

impl<const N: usize> From<[(&str, &str); N]> for AttributeMap {
    fn from(pairs: [(&str, &str); N]) -> Self {
        let mut map = Self::new();
        for (name, value) in pairs {
            map.push(name, value);
        }
        map
    }
}

/// Directory entry representation used by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// Distinguished name of the entry.
    pub dn: DistinguishedName,
    /// Attribute map (values preserve order from the server).
    pub attributes: AttributeMap,
}

impl Entry {
    /// Creates an entry.
    #[must_use]
    pub fn new(dn: DistinguishedName, attributes: AttributeMap) -> Self {
        Self { dn, attributes }
    }

    /// Returns the first value of the attribute if present.
    #[must_use]
    pub fn first(&self, attribute: &str) -> Option<&str> {
        self.attributes.first(attribute)
    }

    /// Returns all values for the attribute.
    #[must_use]
    pub fn values(&self, attribute: &str) -> Option<&[String]> {
        self.attributes.get(attribute)
    }

    /// Parses the attribute as boolean (`true` / `on` / `yes` / `1`).
    #[must_use]
    pub fn bool_value(&self, attribute: &str) -> bool {
        self.first(attribute)
            .map(|value| {
                ["true", "on", "yes", "1"]
                    .iter()
                    .any(|truthy| value.eq_ignore_ascii_case(truthy))
            })
            .unwrap_or(false)
    }

    /// Lowercased object classes of the entry.
    #[must_use]
    pub fn object_classes(&self) -> Vec<String> {
        self.values("objectclass")
            .map(|values| values.iter().map(|value| value.to_lowercase()).collect())
            .unwrap_or_default()
    }

    /// Returns true if the entry carries `object_class` (case-insensitive).
    #[must_use]
    pub fn has_object_class(&self, object_class: &str) -> bool {
        self.values("objectclass").is_some_and(|values| {
            values
                .iter()
                .any(|value| value.eq_ignore_ascii_case(object_class))
        })
    }
}

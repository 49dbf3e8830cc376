//! Request descriptions attached to surfaced errors and debug logs.
//!
//! Every protocol round trip is described by a [`RequestContext`]: the operation, the target DN,
//! and a flattened argument list. Attribute values are rendered through a
//! [`SensitiveAttributes`] set so credentials never reach an error message or a log line.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Placeholder rendered in place of a sensitive attribute value.
pub const MASKED_VALUE: &str = "**********";

/// Attributes masked by default.
pub const DEFAULT_SENSITIVE_ATTRIBUTES: &[&str] = &[
    "userpassword",
    "nsslapd-rootpw",
    "nsds5replicacredentials",
    "nsds5replicabootstrapcredentials",
    "nsmultiplexorcredentials",
];

/// Directory protocol operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Simple bind.
    Bind,
    /// Search (any scope, paged or not).
    Search,
    /// Entry creation.
    Add,
    /// Attribute modification batch.
    Modify,
    /// Entry removal.
    Delete,
    /// Rename or move.
    Rename,
}

impl Operation {
    /// Lowercase operation name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bind => "bind",
            Self::Search => "search",
            Self::Add => "add",
            Self::Modify => "modify",
            Self::Delete => "delete",
            Self::Rename => "rename",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive set of attribute names whose values must be masked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct SensitiveAttributes {
    names: BTreeSet<String>,
}

impl SensitiveAttributes {
    /// Creates a set from the given attribute names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            names: names
                .into_iter()
                .map(|name| name.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Creates a set that masks nothing.
    #[must_use]
    pub fn none() -> Self {
        Self {
            names: BTreeSet::new(),
        }
    }

    /// Adds an attribute name to the set.
    #[must_use]
    pub fn with(mut self, name: impl AsRef<str>) -> Self {
        self.names.insert(name.as_ref().to_ascii_lowercase());
        self
    }

    /// Returns true if values of `attribute` must be masked.
    #[must_use]
    pub fn is_sensitive(&self, attribute: &str) -> bool {
        self.names.contains(&attribute.to_ascii_lowercase())
    }

    /// Returns the value to display for `attribute`.
    #[must_use]
    pub fn mask<'a>(&self, attribute: &str, value: &'a str) -> &'a str {
        if self.is_sensitive(attribute) {
            MASKED_VALUE
        } else {
            value
        }
    }

    /// Number of names in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if nothing is masked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl From<Vec<String>> for SensitiveAttributes {
    fn from(names: Vec<String>) -> Self {
        Self::new(names)
    }
}

impl From<SensitiveAttributes> for Vec<String> {
    fn from(sensitive: SensitiveAttributes) -> Self {
        sensitive.names.into_iter().collect()
    }
}

impl Default for SensitiveAttributes {
    fn default() -> Self {
        Self::new(DEFAULT_SENSITIVE_ATTRIBUTES)
    }
}

/// Description of a single protocol request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestContext {
    /// Operation performed.
    pub operation: Operation,
    /// Target distinguished name (search base for searches).
    pub target: String,
    /// Flattened, already-masked arguments.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<String>,
}

impl RequestContext {
    /// Creates a description without arguments.
    #[must_use]
    pub fn new(operation: Operation, target: impl Into<String>) -> Self {
        Self {
            operation,
            target: target.into(),
            arguments: Vec::new(),
        }
    }

    /// Appends a free-form argument (filter, scope, page size, ...).
    #[must_use]
    pub fn with_argument(mut self, argument: impl Into<String>) -> Self {
        self.arguments.push(argument.into());
        self
    }

    /// Appends an `attribute=value` argument, masking the value when sensitive.
    #[must_use]
    pub fn with_attribute(
        mut self,
        attribute: &str,
        values: &[String],
        sensitive: &SensitiveAttributes,
    ) -> Self {
        if values.is_empty() {
            self.arguments.push(attribute.to_string());
        }
        for value in values {
            self.arguments
                .push(format!("{attribute}={}", sensitive.mask(attribute, value)));
        }
        self
    }
}

impl fmt::Display for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.operation, self.target)?;
        if !self.arguments.is_empty() {
            write!(f, " [{}]", self.arguments.join(", "))?;
        }
        Ok(())
    }
}

//! Distinguished names: parsing, normalized comparison, and tree navigation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

use dirsrv_core::error::Error as CoreError;

/// DN syntax errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistinguishedNameError {
    /// Blank input.
    #[error("empty DN")]
    Empty,
    /// A component is not an `attr=value` pair.
    #[error("malformed DN component `{0}`")]
    InvalidComponent(String),
    /// Nothing before the `=`.
    #[error("DN component `{0}` has no attribute name")]
    MissingAttribute(String),
    /// Nothing after the `=`.
    #[error("DN component for `{0}` has no value")]
    MissingValue(String),
    /// Input ends in the middle of an escape.
    #[error("DN ends with a dangling escape")]
    UnterminatedEscape,
}

impl From<DistinguishedNameError> for CoreError {
    fn from(err: DistinguishedNameError) -> Self {
        CoreError::ValueError(err.to_string())
    }
}

/// One attribute/value pair of an RDN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelativeDistinguishedName {
    attribute: String,
    value: String,
}

impl RelativeDistinguishedName {
    /// RDN from an unescaped attribute/value pair.
    #[must_use]
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Naming attribute, as written.
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Unescaped value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Case-insensitive attribute name comparison.
    #[must_use]
    pub fn matches_attribute(&self, attribute: &str) -> bool {
        self.attribute.eq_ignore_ascii_case(attribute)
    }

    fn normalized(&self) -> String {
        format!(
            "{}={}",
            self.attribute.to_ascii_lowercase(),
            escape(&self.value.to_lowercase())
        )
    }
}

impl PartialEq for RelativeDistinguishedName {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for RelativeDistinguishedName {}

impl fmt::Display for RelativeDistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.attribute, escape(&self.value))
    }
}

/// Strongly-typed distinguished name wrapper.
///
/// The structure keeps a canonical string representation while providing convenient access to the
/// individual relative distinguished names. Equality and hashing use the normalized form, so
/// `UID=Bob,ou=People` and `uid=bob, ou=people` are the same name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct DistinguishedName {
    raw: String,
    rdns: Vec<Vec<RelativeDistinguishedName>>,
}

impl DistinguishedName {
    /// Parses an RFC 4514 string.
    ///
    /// # Errors
    ///
    /// Returns [`DistinguishedNameError`] if the distinguished name is empty or contains invalid
    /// syntax.
    pub fn parse(input: impl AsRef<str>) -> std::result::Result<Self, DistinguishedNameError> {
        let raw = input.as_ref().trim();
        if raw.is_empty() {
            return Err(DistinguishedNameError::Empty);
        }

        let rdns = scan(raw)?;
        Ok(Self {
            raw: rdns_to_string(&rdns),
            rdns,
        })
    }

    /// Canonical string form, with values re-escaped.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Lowercased canonical form used for comparisons.
    #[must_use]
    pub fn normalized(&self) -> String {
        self.rdns
            .iter()
            .map(|rdn| {
                let mut parts = rdn
                    .iter()
                    .map(RelativeDistinguishedName::normalized)
                    .collect::<Vec<_>>();
                parts.sort();
                parts.join("+")
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    /// RDN sets, leftmost first; multi-valued RDNs hold several pairs.
    #[must_use]
    pub fn rdns(&self) -> &[Vec<RelativeDistinguishedName>] {
        &self.rdns
    }

    /// Returns the leftmost RDN set.
    #[must_use]
    pub fn first_rdn(&self) -> &[RelativeDistinguishedName] {
        &self.rdns[0]
    }

    /// Returns the leftmost RDN rendered as a string (e.g. `uid=bob`).
    #[must_use]
    pub fn rdn(&self) -> String {
        rdns_to_string(&self.rdns[..1])
    }

    /// Number of RDN sets; a child always has a greater depth than its parent.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.rdns.len()
    }

    /// Returns the parent name, or `None` for a single-component name.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.rdns.len() < 2 {
            return None;
        }
        let rdns = self.rdns[1..].to_vec();
        Some(Self {
            raw: rdns_to_string(&rdns),
            rdns,
        })
    }

    /// Every attribute/value pair, leftmost first.
    #[must_use]
    pub fn components(&self) -> impl Iterator<Item = &RelativeDistinguishedName> + '_ {
        self.rdns.iter().flat_map(|rdn| rdn.iter())
    }

    /// Value of the leftmost pair naming `attribute`.
    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&str> {
        self.components()
            .find(|rdn| rdn.matches_attribute(attribute))
            .map(RelativeDistinguishedName::value)
    }

    /// Whether any pair matches `attribute` and `value`, ignoring case.
    #[must_use]
    pub fn contains(&self, attribute: &str, value: &str) -> bool {
        self.components()
            .any(|rdn| rdn.matches_attribute(attribute) && rdn.value.eq_ignore_ascii_case(value))
    }

    /// Returns true if `self` lies strictly below `ancestor`.
    #[must_use]
    pub fn is_descendant_of(&self, ancestor: &Self) -> bool {
        self.depth() > ancestor.depth()
            && self.rdns[self.depth() - ancestor.depth()..]
                .iter()
                .zip(ancestor.rdns.iter())
                .all(|(left, right)| same_rdn_set(left, right))
    }

    /// Places `rdn` in front, making a child name.
    #[must_use]
    pub fn with_prefix(mut self, rdn: RelativeDistinguishedName) -> Self {
        self.rdns.insert(0, vec![rdn]);
        self.raw = rdns_to_string(&self.rdns);
        self
    }

    /// Appends `suffix`, e.g. an RDN joined onto a collection base.
    #[must_use]
    pub fn join(mut self, suffix: &DistinguishedName) -> Self {
        self.rdns.extend(suffix.rdns.iter().cloned());
        self.raw = rdns_to_string(&self.rdns);
        self
    }

    /// Replaces the leftmost RDN and, optionally, the parent.
    ///
    /// # Errors
    ///
    /// Returns [`DistinguishedNameError`] if `new_rdn` does not parse as a single RDN.
    pub fn renamed(
        &self,
        new_rdn: &str,
        new_superior: Option<&DistinguishedName>,
    ) -> std::result::Result<Self, DistinguishedNameError> {
        let rdn = Self::parse(new_rdn)?;
        if rdn.depth() != 1 {
            return Err(DistinguishedNameError::InvalidComponent(new_rdn.to_string()));
        }
        Ok(match (new_superior, self.parent()) {
            (Some(superior), _) => rdn.join(superior),
            (None, Some(parent)) => rdn.join(&parent),
            (None, None) => rdn,
        })
    }
}

impl PartialEq for DistinguishedName {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for DistinguishedName {}

impl Hash for DistinguishedName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized().hash(state);
    }
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for DistinguishedName {
    type Err = DistinguishedNameError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<DistinguishedName> for String {
    fn from(value: DistinguishedName) -> Self {
        value.raw
    }
}

impl TryFrom<&str> for DistinguishedName {
    type Error = DistinguishedNameError;

    fn try_from(value: &str) -> std::result::Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<String> for DistinguishedName {
    type Error = DistinguishedNameError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(value)
    }
}

fn same_rdn_set(left: &[RelativeDistinguishedName], right: &[RelativeDistinguishedName]) -> bool {
    left.len() == right.len() && left.iter().all(|component| right.contains(component))
}

/// Splits `input` into RDN sets in one pass, unescaping values as they are read.
///
/// Unescaped spaces around attribute names and values are dropped. Hex escapes are collected
/// as raw bytes, so `\C3\A9` decodes to one character.
fn scan(input: &str) -> std::result::Result<Vec<Vec<RelativeDistinguishedName>>, DistinguishedNameError> {
    let mut rdns = Vec::new();
    let mut current = Vec::new();
    let mut pair = PendingPair::default();
    let mut start = 0;
    let mut chars = input.char_indices().peekable();

    while let Some((index, ch)) = chars.next() {
        match (ch, pair.attribute.is_some()) {
            ('=', false) => {
                let name = input[start..index].trim();
                if name.is_empty() {
                    return Err(DistinguishedNameError::MissingAttribute(
                        input[start..].trim().to_string(),
                    ));
                }
                pair.attribute = Some(name.to_string());
            }
            ('\\', true) => {
                let (_, first) = chars
                    .next()
                    .ok_or(DistinguishedNameError::UnterminatedEscape)?;
                let low = chars.peek().and_then(|(_, next)| next.to_digit(16));
                match (first.to_digit(16), low) {
                    (Some(high), Some(low)) => {
                        chars.next();
                        pair.push_escaped_byte(u8::try_from(high * 16 + low).unwrap_or_default());
                    }
                    _ => pair.push_char(first, true),
                }
            }
            (',' | '+', true) => {
                current.push(pair.finish(&input[start..index])?);
                if ch == ',' {
                    rdns.push(std::mem::take(&mut current));
                }
                start = index + ch.len_utf8();
            }
            (',' | '+', false) => {
                return Err(DistinguishedNameError::InvalidComponent(
                    input[start..index].trim().to_string(),
                ))
            }
            (_, true) => pair.push_char(ch, false),
            (_, false) => {}
        }
    }

    current.push(pair.finish(&input[start..])?);
    rdns.push(current);
    Ok(rdns)
}

/// Attribute/value pair being scanned.
#[derive(Default)]
struct PendingPair {
    attribute: Option<String>,
    value: Vec<u8>,
    /// Length of `value` up to its last character that is not an unescaped space.
    significant: usize,
}

impl PendingPair {
    fn push_char(&mut self, ch: char, escaped: bool) {
        if ch == ' ' && !escaped && self.value.is_empty() {
            return;
        }
        let mut buffer = [0; 4];
        self.value
            .extend_from_slice(ch.encode_utf8(&mut buffer).as_bytes());
        if escaped || ch != ' ' {
            self.significant = self.value.len();
        }
    }

    fn push_escaped_byte(&mut self, byte: u8) {
        self.value.push(byte);
        self.significant = self.value.len();
    }

    fn finish(
        &mut self,
        component: &str,
    ) -> std::result::Result<RelativeDistinguishedName, DistinguishedNameError> {
        let Some(attribute) = self.attribute.take() else {
            return Err(DistinguishedNameError::InvalidComponent(
                component.trim().to_string(),
            ));
        };
        let mut value = std::mem::take(&mut self.value);
        value.truncate(std::mem::take(&mut self.significant));
        if value.is_empty() {
            return Err(DistinguishedNameError::MissingValue(attribute));
        }
        let value = String::from_utf8(value)
            .map_err(|_| DistinguishedNameError::InvalidComponent(component.trim().to_string()))?;
        Ok(RelativeDistinguishedName::new(attribute, value))
    }
}

fn escape(value: &str) -> String {
    let last = value.chars().count().saturating_sub(1);
    value
        .chars()
        .enumerate()
        .fold(String::with_capacity(value.len()), |mut escaped, (index, ch)| {
            let special = matches!(ch, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=')
                || (index == 0 && matches!(ch, ' ' | '#'))
                || (index == last && ch == ' ');
            if special {
                escaped.push('\\');
            }
            escaped.push(ch);
            escaped
        })
}

fn rdns_to_string(rdns: &[Vec<RelativeDistinguishedName>]) -> String {
    rdns.iter()
        .map(|rdn| {
            rdn.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("+")
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn parse_simple_dn() {
        let dn = DistinguishedName::parse("cn=Directory Manager,ou=Admins,dc=example,dc=com").unwrap();
        assert_eq!(dn.get("cn"), Some("Directory Manager"));
        assert_eq!(dn.get("ou"), Some("Admins"));
        assert!(dn.contains("dc", "example"));
        assert_eq!(dn.to_string(), "cn=Directory Manager,ou=Admins,dc=example,dc=com");
        assert_eq!(dn.rdn(), "cn=Directory Manager");
        assert_eq!(dn.depth(), 4);
    }

    #[test]
    fn parse_dn_with_escape() {
        let dn = DistinguishedName::parse("cn=ldbm\\, backup,cn=plugins,cn=config").unwrap();
        assert_eq!(dn.get("cn"), Some("ldbm, backup"));
        assert_eq!(dn.depth(), 3);
        assert!(dn.to_string().starts_with("cn=ldbm\\, backup,cn=plugins"));
    }

    #[test]
    fn parse_dn_with_hex_escape() {
        let dn = DistinguishedName::parse("cn=ldbm\\2C backup,cn=config").unwrap();
        assert_eq!(dn.get("cn"), Some("ldbm, backup"));
        assert_eq!(dn.depth(), 2);
    }

    #[test]
    fn hex_escapes_decode_as_utf8() {
        let dn = DistinguishedName::parse("cn=Ren\\C3\\A9e,dc=example").unwrap();
        assert_eq!(dn.get("cn"), Some("Renée"));
        assert!(DistinguishedName::parse("cn=\\C3,dc=example").is_err());
    }

    #[test]
    fn surrounding_spaces_are_dropped_unless_escaped() {
        let dn = DistinguishedName::parse(" uid = bob , ou=People").unwrap();
        assert_eq!(dn.as_str(), "uid=bob,ou=People");

        let padded = DistinguishedName::parse("cn=\\ pad\\ ,dc=x").unwrap();
        assert_eq!(padded.get("cn"), Some(" pad "));
        assert_eq!(padded.as_str(), "cn=\\ pad\\ ,dc=x");
    }

    #[test]
    fn parse_multi_valued_rdn() {
        let dn = DistinguishedName::parse("cn=bob+uidNumber=1000,ou=People,dc=example").unwrap();
        assert!(dn.contains("CN", "Bob"));
        assert!(dn.contains("uidnumber", "1000"));
        assert_eq!(
            dn.to_string(),
            "cn=bob+uidNumber=1000,ou=People,dc=example"
        );
        assert_eq!(dn.first_rdn().len(), 2);
    }

    #[test]
    fn invalid_trailing_delimiter() {
        let err = DistinguishedName::parse("cn=config,").unwrap_err();
        assert!(matches!(err, DistinguishedNameError::InvalidComponent(_)));
    }

    #[test]
    fn equality_is_case_insensitive_and_normalized() {
        let left = DistinguishedName::parse("UID=Bob, ou=People,dc=Example,dc=com").unwrap();
        let right = DistinguishedName::parse("uid=bob,ou=people,dc=example,dc=com").unwrap();
        assert_eq!(left, right);

        let set: HashSet<_> = [left, right].into_iter().collect();
        assert_eq!(set.len(), 1);

        let reordered = DistinguishedName::parse("uid=1+cn=a,dc=x").unwrap();
        let original = DistinguishedName::parse("cn=A+uid=1,dc=x").unwrap();
        assert_eq!(reordered, original);
    }

    #[test]
    fn parent_and_descendants() {
        let dn = DistinguishedName::parse("uid=bob,ou=People,dc=example,dc=com").unwrap();
        let parent = dn.parent().unwrap();
        assert_eq!(parent.as_str(), "ou=People,dc=example,dc=com");
        assert!(dn.is_descendant_of(&parent));
        assert!(dn.is_descendant_of(&DistinguishedName::parse("DC=COM").unwrap()));
        assert!(!parent.is_descendant_of(&dn));
        assert!(!dn.is_descendant_of(&dn));
        assert!(DistinguishedName::parse("dc=com").unwrap().parent().is_none());
    }

    #[test]
    fn with_prefix_and_join() {
        let base = DistinguishedName::parse("ou=People,dc=example,dc=com").unwrap();
        let user_dn = base
            .clone()
            .with_prefix(RelativeDistinguishedName::new("uid", "a,b"));
        assert_eq!(
            user_dn.to_string(),
            "uid=a\\,b,ou=People,dc=example,dc=com"
        );

        let full = DistinguishedName::parse("uid=bob").unwrap().join(&base);
        assert_eq!(full.to_string(), "uid=bob,ou=People,dc=example,dc=com");
    }

    #[test]
    fn renamed_keeps_or_moves_parent() {
        let dn = DistinguishedName::parse("uid=bob,ou=People,dc=example").unwrap();
        let renamed = dn.renamed("uid=robert", None).unwrap();
        assert_eq!(renamed.as_str(), "uid=robert,ou=People,dc=example");

        let archive = DistinguishedName::parse("ou=Archive,dc=example").unwrap();
        let moved = dn.renamed("uid=bob", Some(&archive)).unwrap();
        assert_eq!(moved.as_str(), "uid=bob,ou=Archive,dc=example");

        assert!(dn.renamed("uid=a,ou=b", None).is_err());
    }

    #[test]
    fn serde_uses_string_form() {
        let dn = DistinguishedName::parse("cn=config").unwrap();
        assert_eq!(serde_json::to_string(&dn).unwrap(), "\"cn=config\"");
        let back: DistinguishedName = serde_json::from_str("\"CN=Config\"").unwrap();
        assert_eq!(back, dn);
    }
}

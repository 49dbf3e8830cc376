//! Text and structured renderings of entries.

use crate::entry::{AttributeMap, Entry};
use crate::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use dirsrv_core::error::Error;
use serde::Serialize;
use std::fmt;

/// Output format selected by callers of the rendering accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// LDIF-like `attr: value` lines.
    #[default]
    Text,
    /// `{"type":"entry","dn":...,"attrs":{...}}`.
    Json,
}

/// Structured projection of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryProjection<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    /// Entry DN.
    pub dn: &'a str,
    /// Attributes with lowercased names.
    pub attrs: &'a AttributeMap,
}

impl<'a> EntryProjection<'a> {
    /// Projects `attrs` under `dn`.
    #[must_use]
    pub const fn new(dn: &'a str, attrs: &'a AttributeMap) -> Self {
        Self {
            kind: "entry",
            dn,
            attrs,
        }
    }
}

impl<'a> From<&'a Entry> for EntryProjection<'a> {
    fn from(entry: &'a Entry) -> Self {
        Self::new(entry.dn.as_str(), &entry.attributes)
    }
}

/// Renders `attrs` under `dn` in the requested format.
///
/// # Errors
///
/// Returns [`Error::SerializationError`] if encoding fails.
pub fn render(dn: &str, attrs: &AttributeMap, format: Format) -> Result<String> {
    match format {
        Format::Text => render_text(dn, attrs),
        Format::Json => Ok(serde_json::to_string(&EntryProjection::new(dn, attrs))?),
    }
}

/// Renders a whole entry in the requested format.
///
/// # Errors
///
/// Returns [`dirsrv_core::Error::SerializationError`] if JSON encoding fails.
pub fn render_entry(entry: &Entry, format: Format) -> Result<String> {
    render(entry.dn.as_str(), &entry.attributes, format)
}

fn render_text(dn: &str, attrs: &AttributeMap) -> Result<String> {
    let mut out = String::new();
    write_text(&mut out, dn, attrs)
        .map_err(|err| Error::SerializationError(format!("text rendering failed: {err}")))?;
    Ok(out)
}

fn write_text(out: &mut impl fmt::Write, dn: &str, attrs: &AttributeMap) -> fmt::Result {
    writeln!(out, "dn: {dn}")?;
    for (name, values) in attrs {
        for value in values {
            if needs_base64(value) {
                writeln!(out, "{name}:: {}", STANDARD.encode(value.as_bytes()))?;
            } else {
                writeln!(out, "{name}: {value}")?;
            }
        }
    }
    Ok(())
}

// LDIF SAFE-STRING: no leading space, colon or '<', no trailing space, printable ASCII.
fn needs_base64(value: &str) -> bool {
    value.starts_with([' ', ':', '<'])
        || value.ends_with(' ')
        || value
            .bytes()
            .any(|byte| !(0x20..0x7f).contains(&byte))
}

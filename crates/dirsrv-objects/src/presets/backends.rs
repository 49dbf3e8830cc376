//! Database backend instances.

use super::LDBM_BASE;
use crate::collection::EntryCollection;
use crate::dn::DistinguishedName;
use crate::entry::Entry;
use crate::handle::{EntryHandle, ObjectSchema};
use crate::lint::{LintFinding, LintRule, Severity};
use crate::session::Session;
use crate::Result;
use dirsrv_core::error::Error;
use std::sync::Arc;

/// Naming context served by the backend.
pub const SUFFIX: &str = "nsslapd-suffix";

/// Read-only switch (`on` / `off`).
pub const READ_ONLY: &str = "nsslapd-readonly";

/// Schema of `nsBackendInstance` entries named by `cn`.
#[must_use]
pub fn schema() -> ObjectSchema {
    ObjectSchema::new("cn")
        .with_must_attributes([SUFFIX, "cn"])
        .with_create_objectclasses(["top", "extensibleObject", "nsBackendInstance"])
        .with_object_classes(["nsBackendInstance"])
        .with_filter_attributes(["cn", SUFFIX, "nsslapd-directory"])
        .with_lint_rule(LintRule::new("suffix", lint_suffix))
        .with_lint_rule(LintRule::new("readonly", lint_read_only))
}

/// Backends below the LDBM database plugin entry.
///
/// # Errors
///
/// Never fails for the built-in base; the signature matches the other presets.
pub fn collection(session: Arc<Session>) -> Result<EntryCollection> {
    Ok(EntryCollection::new(
        session,
        DistinguishedName::parse(LDBM_BASE)?,
        Arc::new(schema()),
    ))
}

fn lint_suffix(entry: &Entry) -> Option<LintFinding> {
    let detail = match entry.first(SUFFIX) {
        None => "backend has no nsslapd-suffix".to_string(),
        Some(value) if DistinguishedName::parse(value).is_err() => {
            format!("nsslapd-suffix `{value}` is not a valid DN")
        }
        Some(_) => return None,
    };
    Some(
        LintFinding::new("DSBLE0002", Severity::High, entry, detail)
            .with_fix("Set nsslapd-suffix to the DN of the naming context this backend serves."),
    )
}

fn lint_read_only(entry: &Entry) -> Option<LintFinding> {
    entry.bool_value(READ_ONLY).then(|| {
        LintFinding::new(
            "DSBLE0003",
            Severity::Low,
            entry,
            "backend is read-only; writes below its suffix are refused",
        )
        .with_fix("Set nsslapd-readonly to off unless the backend is meant to be read-only.")
    })
}

/// A database backend.
#[derive(Debug, Clone)]
pub struct Backend {
    handle: EntryHandle,
}

impl Backend {
    /// Underlying entry handle.
    #[must_use]
    pub fn handle(&self) -> &EntryHandle {
        &self.handle
    }

    /// Naming context served by the backend.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchObject`] if the backend does not exist, or [`Error::ValueError`]
    /// if the suffix is not a valid DN.
    pub async fn suffix(&self) -> Result<Option<DistinguishedName>> {
        self.handle
            .get_attr_val(SUFFIX)
            .await?
            .map(|value| DistinguishedName::parse(value).map_err(Error::from))
            .transpose()
    }

    /// Whether the backend refuses writes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchObject`] if the backend does not exist.
    pub async fn is_read_only(&self) -> Result<bool> {
        Ok(self
            .handle
            .get_attr_val_lower(READ_ONLY)
            .await?
            .is_some_and(|value| value == "on"))
    }

    /// Switches read-only mode.
    ///
    /// # Errors
    ///
    /// Returns the mapped protocol error.
    pub async fn set_read_only(&self, read_only: bool) -> Result<()> {
        self.handle
            .replace(READ_ONLY, if read_only { "on" } else { "off" })
            .await
    }
}

impl From<EntryHandle> for Backend {
    fn from(handle: EntryHandle) -> Self {
        Self { handle }
    }
}

impl AsRef<EntryHandle> for Backend {
    fn as_ref(&self) -> &EntryHandle {
        &self.handle
    }
}

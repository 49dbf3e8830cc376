//! Server plugin configuration entries.

use super::PLUGINS_BASE;
use crate::collection::EntryCollection;
use crate::dn::DistinguishedName;
use crate::entry::Entry;
use crate::handle::{EntryHandle, ObjectSchema};
use crate::lint::{LintFinding, LintRule, Severity};
use crate::protocol::SearchScope;
use crate::session::Session;
use crate::Result;
use std::sync::Arc;
use tracing::info;

/// Enable switch (`on` / `off`).
pub const ENABLED: &str = "nsslapd-pluginEnabled";

/// Shared library implementing the plugin.
pub const PATH: &str = "nsslapd-pluginPath";

/// Schema of `nsSlapdPlugin` entries. Plugins are protected: they are never renamed or deleted.
#[must_use]
pub fn schema() -> ObjectSchema {
    ObjectSchema::new("cn")
        .with_must_attributes([
            "cn",
            ENABLED,
            PATH,
            "nsslapd-pluginInitfunc",
            "nsslapd-pluginType",
        ])
        .with_create_objectclasses(["top", "nsSlapdPlugin", "extensibleObject"])
        .with_object_classes(["nsSlapdPlugin"])
        .protected()
        .with_lint_rule(LintRule::new("path", lint_missing_path))
}

/// Plugins directly below `cn=plugins,cn=config`.
///
/// # Errors
///
/// Never fails for the built-in base; the signature matches the other presets.
pub fn collection(session: Arc<Session>) -> Result<EntryCollection> {
    Ok(EntryCollection::new(
        session,
        DistinguishedName::parse(PLUGINS_BASE)?,
        Arc::new(schema()),
    )
    .with_scope(SearchScope::OneLevel))
}

fn lint_missing_path(entry: &Entry) -> Option<LintFinding> {
    (entry.bool_value(ENABLED) && !entry.attributes.has_values(PATH)).then(|| {
        LintFinding::new(
            "DSPLE0001",
            Severity::High,
            entry,
            "plugin is enabled but has no nsslapd-pluginPath",
        )
        .with_fix("Set nsslapd-pluginPath or disable the plugin.")
    })
}

/// A server plugin.
#[derive(Debug, Clone)]
pub struct Plugin {
    handle: EntryHandle,
}

impl Plugin {
    /// Underlying entry handle.
    #[must_use]
    pub fn handle(&self) -> &EntryHandle {
        &self.handle
    }

    /// Turns the plugin on. Takes effect after a server restart for most plugins.
    ///
    /// # Errors
    ///
    /// Returns the mapped protocol error.
    pub async fn enable(&self) -> Result<()> {
        self.handle.replace(ENABLED, "on").await?;
        info!("Enabled plugin {}", self.handle.dn()?);
        Ok(())
    }

    /// Turns the plugin off.
    ///
    /// # Errors
    ///
    /// Returns the mapped protocol error.
    pub async fn disable(&self) -> Result<()> {
        self.handle.replace(ENABLED, "off").await?;
        info!("Disabled plugin {}", self.handle.dn()?);
        Ok(())
    }

    /// Whether the plugin is enabled.
    ///
    /// # Errors
    ///
    /// Returns [`dirsrv_core::Error::NoSuchObject`] if the plugin entry does not exist.
    pub async fn status(&self) -> Result<bool> {
        Ok(self
            .handle
            .get_attr_val_lower(ENABLED)
            .await?
            .is_some_and(|value| value == "on"))
    }
}

impl From<EntryHandle> for Plugin {
    fn from(handle: EntryHandle) -> Self {
        Self { handle }
    }
}

impl AsRef<EntryHandle> for Plugin {
    fn as_ref(&self) -> &EntryHandle {
        &self.handle
    }
}

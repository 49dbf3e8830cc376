//! Static `groupOfNames` groups.

use super::below;
use crate::collection::EntryCollection;
use crate::dn::DistinguishedName;
use crate::handle::{EntryHandle, ObjectSchema};
use crate::session::Session;
use crate::Result;
use std::sync::Arc;
use tracing::{debug, warn};

/// Membership attribute.
pub const MEMBER: &str = "member";

/// Schema of `groupOfNames` groups named by `cn`.
#[must_use]
pub fn schema() -> ObjectSchema {
    ObjectSchema::new("cn")
        .with_must_attributes(["cn"])
        .with_create_objectclasses(["top", "groupOfNames", "nsMemberOf"])
        .with_object_classes(["groupOfNames"])
}

/// Groups below `ou=Groups,{suffix}`.
///
/// # Errors
///
/// Returns [`dirsrv_core::Error::ValueError`] if `suffix` does not form a valid DN.
pub fn collection(session: Arc<Session>, suffix: &DistinguishedName) -> Result<EntryCollection> {
    Ok(EntryCollection::new(
        session,
        below("ou=Groups", suffix)?,
        Arc::new(schema()),
    ))
}

/// A static group.
#[derive(Debug, Clone)]
pub struct Group {
    handle: EntryHandle,
}

impl Group {
    /// Underlying entry handle.
    #[must_use]
    pub fn handle(&self) -> &EntryHandle {
        &self.handle
    }

    /// Adds `member` unless it already belongs to the group.
    ///
    /// # Errors
    ///
    /// Returns [`dirsrv_core::Error::NoSuchObject`] if the group does not exist, or the mapped
    /// protocol error.
    pub async fn add_member(&self, member: &DistinguishedName) -> Result<()> {
        debug!("Adding {} to group {}", member, self.handle.dn()?);
        self.handle.ensure_present(MEMBER, member.as_str()).await
    }

    /// Removes `member` if it belongs to the group.
    ///
    /// # Errors
    ///
    /// Returns [`dirsrv_core::Error::NoSuchObject`] if the group does not exist, or the mapped
    /// protocol error.
    pub async fn remove_member(&self, member: &DistinguishedName) -> Result<()> {
        debug!("Removing {} from group {}", member, self.handle.dn()?);
        self.handle.ensure_removed(MEMBER, member.as_str()).await
    }

    /// Whether `member` belongs to the group.
    ///
    /// # Errors
    ///
    /// Returns [`dirsrv_core::Error::NoSuchObject`] if the group does not exist.
    pub async fn is_member(&self, member: &DistinguishedName) -> Result<bool> {
        Ok(self
            .members()
            .await?
            .iter()
            .any(|current| current == member))
    }

    /// Current members. Values that are not valid DNs are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`dirsrv_core::Error::NoSuchObject`] if the group does not exist.
    pub async fn members(&self) -> Result<Vec<DistinguishedName>> {
        Ok(self
            .handle
            .get_attr(MEMBER)
            .await?
            .into_iter()
            .filter_map(|value| match DistinguishedName::parse(&value) {
                Ok(dn) => Some(dn),
                Err(err) => {
                    warn!("Skipping member value `{value}`: {err}");
                    None
                }
            })
            .collect())
    }
}

impl From<EntryHandle> for Group {
    fn from(handle: EntryHandle) -> Self {
        Self { handle }
    }
}

impl AsRef<EntryHandle> for Group {
    fn as_ref(&self) -> &EntryHandle {
        &self.handle
    }
}

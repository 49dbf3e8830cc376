//! Person accounts.

use super::below;
use crate::collection::EntryCollection;
use crate::dn::DistinguishedName;
use crate::handle::{EntryHandle, ObjectSchema};
use crate::session::Session;
use crate::Result;
use std::sync::Arc;
use tracing::info;

/// Attribute holding the account lock flag.
pub const ACCOUNT_LOCK: &str = "nsAccountLock";

/// Schema of `nsPerson` accounts named by `uid`.
#[must_use]
pub fn schema() -> ObjectSchema {
    ObjectSchema::new("uid")
        .with_must_attributes([
            "uid",
            "cn",
            "displayName",
            "uidNumber",
            "gidNumber",
            "homeDirectory",
        ])
        .with_create_objectclasses([
            "top",
            "nsPerson",
            "nsAccount",
            "nsOrgPerson",
            "posixAccount",
        ])
        .with_object_classes(["nsAccount"])
}

/// Accounts below `ou=People,{suffix}`.
///
/// # Errors
///
/// Returns [`dirsrv_core::Error::ValueError`] if `suffix` does not form a valid DN.
pub fn collection(session: Arc<Session>, suffix: &DistinguishedName) -> Result<EntryCollection> {
    Ok(EntryCollection::new(
        session,
        below("ou=People", suffix)?,
        Arc::new(schema()),
    ))
}

/// A person account.
#[derive(Debug, Clone)]
pub struct User {
    handle: EntryHandle,
}

impl User {
    /// Underlying entry handle.
    #[must_use]
    pub fn handle(&self) -> &EntryHandle {
        &self.handle
    }

    /// Login name.
    ///
    /// # Errors
    ///
    /// Returns [`dirsrv_core::Error::NoSuchObject`] if the entry does not exist.
    pub async fn uid(&self) -> Result<Option<String>> {
        self.handle.get_attr_val("uid").await
    }

    /// Blocks binds as this account.
    ///
    /// # Errors
    ///
    /// Returns the mapped protocol error.
    pub async fn lock(&self) -> Result<()> {
        self.handle.replace(ACCOUNT_LOCK, "true").await?;
        info!("Locked account {}", self.handle.dn()?);
        Ok(())
    }

    /// Clears the lock flag. Unlocked accounts are left untouched.
    ///
    /// # Errors
    ///
    /// Returns the mapped protocol error.
    pub async fn unlock(&self) -> Result<()> {
        if self.is_locked().await? {
            self.handle.remove_all(ACCOUNT_LOCK).await?;
            info!("Unlocked account {}", self.handle.dn()?);
        }
        Ok(())
    }

    /// Whether the lock flag is set.
    ///
    /// # Errors
    ///
    /// Returns [`dirsrv_core::Error::NoSuchObject`] if the entry does not exist.
    pub async fn is_locked(&self) -> Result<bool> {
        Ok(self
            .handle
            .get_attr_val_lower(ACCOUNT_LOCK)
            .await?
            .is_some_and(|value| value == "true"))
    }
}

impl From<EntryHandle> for User {
    fn from(handle: EntryHandle) -> Self {
        Self { handle }
    }
}

impl AsRef<EntryHandle> for User {
    fn as_ref(&self) -> &EntryHandle {
        &self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{AttributeMap, Entry};
    use crate::presets::testing::session_with;
    use crate::protocol::{DirectoryModification, MockDirectoryClient};

    const BOB: &str = "uid=bob,ou=People,dc=example,dc=com";

    fn bob(client: MockDirectoryClient) -> User {
        User::from(EntryHandle::new(
            session_with(client),
            DistinguishedName::parse(BOB).unwrap(),
            Arc::new(schema()),
        ))
    }

    fn locked_search(client: &mut MockDirectoryClient, value: &'static str) {
        client.expect_search().times(1).returning(move |_| {
            Ok(vec![Entry::new(
                DistinguishedName::parse(BOB).unwrap(),
                AttributeMap::from([("nsaccountlock", value)]),
            )])
        });
    }

    #[test]
    fn collection_lives_below_people() {
        let suffix = DistinguishedName::parse("dc=example,dc=com").unwrap();
        let users = collection(session_with(MockDirectoryClient::new()), &suffix).unwrap();
        assert_eq!(users.base().as_str(), "ou=People,dc=example,dc=com");
        assert_eq!(users.schema().rdn_attribute, "uid");
    }

    #[tokio::test]
    async fn lock_replaces_flag() {
        let mut client = MockDirectoryClient::new();
        client
            .expect_modify()
            .withf(|dn, mods| {
                dn == BOB
                    && mods
                        == [DirectoryModification::Replace {
                            attribute: ACCOUNT_LOCK.to_string(),
                            values: vec!["true".to_string()],
                        }]
            })
            .times(1)
            .returning(|_, _| Ok(()));
        bob(client).lock().await.unwrap();
    }

    #[tokio::test]
    async fn unlock_skips_unlocked_accounts() {
        let mut client = MockDirectoryClient::new();
        locked_search(&mut client, "FALSE");
        client.expect_modify().times(0);
        bob(client).unlock().await.unwrap();
    }

    #[tokio::test]
    async fn unlock_removes_flag_from_locked_account() {
        let mut client = MockDirectoryClient::new();
        locked_search(&mut client, "True");
        client
            .expect_modify()
            .withf(|_, mods| {
                mods == [DirectoryModification::Delete {
                    attribute: ACCOUNT_LOCK.to_string(),
                    values: Vec::new(),
                }]
            })
            .times(1)
            .returning(|_, _| Ok(()));
        bob(client).unlock().await.unwrap();
    }
}

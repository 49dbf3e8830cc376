//! One logical object backed by several entries.
//!
//! Components live in an arena; `owners` maps each lowercased attribute name to the indices of
//! the components that own it, in registration order. Reads go to the last owner, writes go to
//! every owner.

use crate::entry::AttributeMap;
use crate::handle::EntryHandle;
use crate::protocol::ModMode;
use crate::Result;
use dirsrv_core::error::Error;
use std::collections::BTreeMap;

/// Several entries presented as one object.
#[derive(Debug, Clone, Default)]
pub struct CompositeEntryView {
    components: Vec<EntryHandle>,
    owners: BTreeMap<String, Vec<usize>>,
}

impl CompositeEntryView {
    /// Creates an empty view.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `entry` as owner of `attributes`. Returns the component index.
    pub fn add_component<S: AsRef<str>>(&mut self, entry: EntryHandle, attributes: &[S]) -> usize {
        let index = self.components.len();
        self.components.push(entry);
        for attribute in attributes {
            let owners = self
                .owners
                .entry(attribute.as_ref().to_ascii_lowercase())
                .or_default();
            if !owners.contains(&index) {
                owners.push(index);
            }
        }
        index
    }

    /// Registered components, in registration order.
    #[must_use]
    pub fn components(&self) -> &[EntryHandle] {
        &self.components
    }

    /// Indices of the components owning `attribute`.
    #[must_use]
    pub fn owners_of(&self, attribute: &str) -> &[usize] {
        self.owners
            .get(&attribute.to_ascii_lowercase())
            .map_or(&[], Vec::as_slice)
    }

    /// Returns true if the view has components and every one of them exists.
    ///
    /// # Errors
    ///
    /// Returns the first component failure other than `noSuchObject`.
    pub async fn exists(&self) -> Result<bool> {
        if self.components.is_empty() {
            return Ok(false);
        }
        for component in &self.components {
            if !component.exists().await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Values of `attribute`, read from its last-registered owner.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValueError`] if no component owns `attribute`.
    pub async fn get_attr(&self, attribute: &str) -> Result<Vec<String>> {
        self.reader(attribute)?.get_attr(attribute).await
    }

    /// First value of `attribute`, read from its last-registered owner.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValueError`] if no component owns `attribute`.
    pub async fn get_attr_val(&self, attribute: &str) -> Result<Option<String>> {
        self.reader(attribute)?.get_attr_val(attribute).await
    }

    /// Presence check routed like a read: `attribute` (and `value`, if given) is checked on the
    /// last-registered owner only.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValueError`] if no component owns `attribute`.
    pub async fn present(&self, attribute: &str, value: Option<&str>) -> Result<bool> {
        self.reader(attribute)?.present(attribute, value).await
    }

    /// Every owned attribute, each taken from the first component it is found on.
    ///
    /// # Errors
    ///
    /// Returns the first component read failure.
    pub async fn get_all_attrs(&self) -> Result<AttributeMap> {
        let mut merged = AttributeMap::new();
        for (index, component) in self.components.iter().enumerate() {
            let owned = self
                .owners
                .iter()
                .filter(|(name, owners)| owners.contains(&index) && !merged.contains(name))
                .map(|(name, _)| name.as_str())
                .collect::<Vec<_>>();
            if owned.is_empty() {
                continue;
            }
            let found = component.get_attrs(&owned).await?;
            for (name, values) in &found {
                merged.insert(name, values.clone());
            }
        }
        Ok(merged)
    }

    /// Writes `value` to `attribute` on every owning component, one request each.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValueError`] if no component owns `attribute`, or the first failing
    /// component write.
    pub async fn set(&self, attribute: &str, value: Option<&str>, mode: ModMode) -> Result<()> {
        let owners = self.owners_of(attribute);
        if owners.is_empty() {
            return Err(unowned(attribute));
        }
        for &index in owners {
            self.components[index].set(attribute, value, mode).await?;
        }
        Ok(())
    }

    /// Replaces `attribute` on every owner.
    ///
    /// # Errors
    ///
    /// See [`CompositeEntryView::set`].
    pub async fn replace(&self, attribute: &str, value: &str) -> Result<()> {
        self.set(attribute, Some(value), ModMode::Replace).await
    }

    /// Adds a value to `attribute` on every owner.
    ///
    /// # Errors
    ///
    /// See [`CompositeEntryView::set`].
    pub async fn add(&self, attribute: &str, value: &str) -> Result<()> {
        self.set(attribute, Some(value), ModMode::Add).await
    }

    /// Removes a value of `attribute` on every owner.
    ///
    /// # Errors
    ///
    /// See [`CompositeEntryView::set`].
    pub async fn remove(&self, attribute: &str, value: &str) -> Result<()> {
        self.set(attribute, Some(value), ModMode::Delete).await
    }

    /// Not supported: the view has no single DN.
    ///
    /// # Errors
    ///
    /// Always returns [`Error::Unsupported`].
    pub fn rename(&self, _new_rdn: &str) -> Result<()> {
        Err(structural("rename"))
    }

    /// Not supported: the view has no single DN.
    ///
    /// # Errors
    ///
    /// Always returns [`Error::Unsupported`].
    pub fn delete(&self) -> Result<()> {
        Err(structural("delete"))
    }

    /// Not supported: the view has no single DN.
    ///
    /// # Errors
    ///
    /// Always returns [`Error::Unsupported`].
    pub fn create(&self, _properties: &AttributeMap) -> Result<()> {
        Err(structural("create"))
    }

    /// Not supported: the view has no single DN.
    ///
    /// # Errors
    ///
    /// Always returns [`Error::Unsupported`].
    pub fn ensure_state(&self, _properties: &AttributeMap) -> Result<()> {
        Err(structural("ensure_state"))
    }

    fn reader(&self, attribute: &str) -> Result<&EntryHandle> {
        self.owners_of(attribute)
            .last()
            .and_then(|&index| self.components.get(index))
            .ok_or_else(|| unowned(attribute))
    }
}

fn unowned(attribute: &str) -> Error {
    Error::ValueError(format!("no component owns attribute `{attribute}`"))
}

fn structural(operation: &str) -> Error {
    Error::Unsupported(format!("{operation} on a composite entry view"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dn::DistinguishedName;
    use crate::entry::Entry;
    use crate::handle::ObjectSchema;
    use crate::protocol::{DirectoryModification, MockDirectoryClient};
    use crate::session::Session;
    use dirsrv_core::config::DirectoryConfig;
    use std::sync::Arc;

    const FIRST: &str = "cn=config";
    const SECOND: &str = "cn=encryption,cn=config";

    fn view(client: MockDirectoryClient) -> CompositeEntryView {
        let session = Session::from_client(
            DirectoryConfig::new("ldap://localhost").unwrap(),
            Box::new(client),
        );
        let schema = Arc::new(ObjectSchema::new("cn"));
        let mut view = CompositeEntryView::new();
        for (dn, attrs) in [(FIRST, vec!["a"]), (SECOND, vec!["a", "b"])] {
            view.add_component(
                EntryHandle::new(
                    Arc::clone(&session),
                    DistinguishedName::parse(dn).unwrap(),
                    Arc::clone(&schema),
                ),
                &attrs,
            );
        }
        view
    }

    #[tokio::test]
    async fn writes_fan_out_to_every_owner() {
        let mut client = MockDirectoryClient::new();
        for target in [FIRST, SECOND] {
            client
                .expect_modify()
                .withf(move |dn, mods| {
                    dn == target
                        && mods
                            == [DirectoryModification::Replace {
                                attribute: "a".to_string(),
                                values: vec!["v".to_string()],
                            }]
                })
                .times(1)
                .returning(|_, _| Ok(()));
        }
        let view = view(client);

        view.replace("a", "v").await.unwrap();
        assert_eq!(view.owners_of("A"), &[0, 1]);
    }

    #[tokio::test]
    async fn reads_go_to_last_owner() {
        let mut client = MockDirectoryClient::new();
        client
            .expect_search()
            .withf(|request| request.base == SECOND)
            .times(2)
            .returning(|request| {
                Ok(vec![Entry::new(
                    DistinguishedName::parse(&request.base).unwrap(),
                    AttributeMap::from([("a", "from-second")]),
                )])
            });
        let view = view(client);

        assert_eq!(view.get_attr("a").await.unwrap(), vec!["from-second"]);
        assert!(view.present("a", Some("FROM-SECOND")).await.unwrap());
    }

    #[tokio::test]
    async fn get_all_attrs_takes_each_attribute_from_first_component_found() {
        let mut client = MockDirectoryClient::new();
        client.expect_search().times(2).returning(|request| {
            let attrs = if request.base == FIRST {
                assert_eq!(request.attributes, vec!["a".to_string()]);
                AttributeMap::from([("a", "first")])
            } else {
                assert_eq!(request.attributes, vec!["b".to_string()]);
                AttributeMap::from([("a", "second"), ("b", "second")])
            };
            Ok(vec![Entry::new(
                DistinguishedName::parse(&request.base).unwrap(),
                attrs,
            )])
        });
        let view = view(client);

        let attrs = view.get_all_attrs().await.unwrap();
        assert_eq!(attrs.first("a"), Some("first"));
        assert_eq!(attrs.first("b"), Some("second"));
    }

    #[tokio::test]
    async fn unowned_attributes_and_structural_operations_fail() {
        let view = view(MockDirectoryClient::new());

        assert!(matches!(view.get_attr("zzz").await, Err(Error::ValueError(_))));
        assert!(matches!(
            view.set("zzz", Some("x"), ModMode::Replace).await,
            Err(Error::ValueError(_))
        ));
        assert!(matches!(view.rename("cn=x"), Err(Error::Unsupported(_))));
        assert!(matches!(view.delete(), Err(Error::Unsupported(_))));
        assert!(matches!(
            view.create(&AttributeMap::new()),
            Err(Error::Unsupported(_))
        ));
        assert!(matches!(
            view.ensure_state(&AttributeMap::new()),
            Err(Error::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn empty_view_does_not_exist() {
        assert!(!CompositeEntryView::new().exists().await.unwrap());
    }
}

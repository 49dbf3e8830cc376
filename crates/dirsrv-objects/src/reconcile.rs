//! Create and converge entries towards a desired state.
//!
//! All three operations probe before writing, so re-running them is safe: `create` refuses an
//! existing DN, `ensure_state` switches to an update, and `ensure_attr_state` sends nothing once
//! the entry matches.

use crate::dn::{DistinguishedName, RelativeDistinguishedName};
use crate::entry::AttributeMap;
use crate::handle::EntryHandle;
use crate::protocol::{DirectoryModification, ModMode};
use crate::Result;
use dirsrv_core::error::Error;
use dirsrv_core::request::{Operation, RequestContext};
use tracing::debug;

/// ADD and DELETE instructions turning `current` into `desired`.
///
/// Only attributes named in `desired` are considered. Values compare case-insensitively; added
/// values keep the desired spelling and deleted values the current one.
#[must_use]
pub fn attribute_diff(current: &AttributeMap, desired: &AttributeMap) -> Vec<DirectoryModification> {
    let mut modifications = Vec::new();
    for (name, wanted) in desired {
        let present = current.get(name).unwrap_or_default();
        let to_add = wanted
            .iter()
            .filter(|value| !contains_ignore_case(present, value))
            .fold(Vec::<String>::new(), |mut acc, value| {
                if !contains_ignore_case(&acc, value) {
                    acc.push(value.clone());
                }
                acc
            });
        let to_delete = present
            .iter()
            .filter(|value| !contains_ignore_case(wanted, value))
            .cloned()
            .collect::<Vec<_>>();

        if !to_add.is_empty() {
            modifications.push(DirectoryModification::new(ModMode::Add, name, to_add));
        }
        if !to_delete.is_empty() {
            modifications.push(DirectoryModification::new(ModMode::Delete, name, to_delete));
        }
    }
    modifications
}

fn contains_ignore_case(values: &[String], value: &str) -> bool {
    values
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(value))
}

impl EntryHandle {
    /// Creates the entry.
    ///
    /// The DN is, in order of preference: `rdn` under the handle's base, the handle's own DN, or
    /// the schema's naming attribute (taken from `properties`) under the base. The RDN's
    /// attribute values are added to `properties` when missing, and the schema's creation object
    /// classes are merged in.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValueError`] if `properties` is empty, no DN can be computed, or a
    /// required attribute is missing; [`Error::AlreadyExists`] if an entry exists at the DN;
    /// otherwise the mapped protocol error.
    pub async fn create(&mut self, rdn: Option<&str>, properties: AttributeMap) -> Result<()> {
        let (dn, properties) = self.validate(rdn, properties)?;
        if self.session.probe(&dn, &[crate::handle::NO_ATTRIBUTES]).await?.is_some() {
            return Err(Error::AlreadyExists {
                message: "an entry already exists at this DN".to_string(),
                request: RequestContext::new(Operation::Add, dn.as_str()),
            });
        }
        self.add_entry(dn, properties).await
    }

    /// Creates the entry if absent; otherwise replaces every supplied attribute in one request.
    ///
    /// Attributes not present in `properties` are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValueError`] for invalid properties (see [`EntryHandle::create`]),
    /// otherwise the mapped protocol error.
    pub async fn ensure_state(&mut self, rdn: Option<&str>, properties: AttributeMap) -> Result<()> {
        let supplied = properties.names().map(str::to_owned).collect::<Vec<_>>();
        let (dn, properties) = self.validate(rdn, properties)?;
        if self.session.probe(&dn, &[crate::handle::NO_ATTRIBUTES]).await?.is_none() {
            return self.add_entry(dn, properties).await;
        }

        // The naming value merged in by `validate` only matters for an add.
        let modifications = properties
            .into_inner()
            .into_iter()
            .filter(|(name, _)| supplied.contains(name))
            .map(|(name, values)| DirectoryModification::new(ModMode::Replace, name, values))
            .collect::<Vec<_>>();
        debug!("{dn} exists, replacing {} attribute(s)", modifications.len());
        self.session.modify(&dn, &modifications).await?;
        self.base = dn.parent();
        self.dn = Some(dn);
        Ok(())
    }

    /// Converges the named attributes to exactly the desired values in one request.
    ///
    /// An attribute mapped to no values is removed. Nothing is sent when the entry already
    /// matches.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchObject`] if the entry does not exist, otherwise the mapped
    /// protocol error.
    pub async fn ensure_attr_state(&self, desired: &AttributeMap) -> Result<()> {
        if desired.is_empty() {
            return Ok(());
        }
        let names = desired.names().collect::<Vec<_>>();
        let current = self.get_attrs(&names).await?;

        let modifications = attribute_diff(&current, desired);
        if modifications.is_empty() {
            debug!("{} already in desired state", self.dn()?);
            return Ok(());
        }
        self.session.modify(self.dn()?, &modifications).await
    }

    fn validate(
        &self,
        rdn: Option<&str>,
        mut properties: AttributeMap,
    ) -> Result<(DistinguishedName, AttributeMap)> {
        if properties.is_empty() {
            return Err(Error::ValueError(
                "properties must name at least one attribute".to_string(),
            ));
        }

        let dn = match (rdn, &self.dn, &self.base) {
            (Some(rdn), _, Some(base)) => DistinguishedName::parse(rdn)?.join(base),
            (Some(rdn), None, None) => DistinguishedName::parse(rdn)?,
            (Some(rdn), Some(current), None) => current.renamed(rdn, None)?,
            (None, Some(current), _) => current.clone(),
            (None, None, base) => {
                let attribute = self.schema.rdn_attribute.as_str();
                let value = properties.first(attribute).ok_or_else(|| {
                    Error::ValueError(format!(
                        "no RDN given and properties carry no `{attribute}` value"
                    ))
                })?;
                let generated = DistinguishedName::parse(
                    RelativeDistinguishedName::new(attribute, value).to_string(),
                )?;
                match base {
                    Some(base) => generated.join(base),
                    None => generated,
                }
            }
        };

        for component in dn.first_rdn() {
            let values = properties.get(component.attribute()).unwrap_or_default();
            if !contains_ignore_case(values, component.value()) {
                properties.push(component.attribute(), component.value());
            }
        }

        let missing = self
            .schema
            .must_attributes
            .iter()
            .filter(|name| !properties.has_values(name))
            .map(String::as_str)
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(Error::ValueError(format!(
                "missing required attribute(s) for {dn}: {}",
                missing.join(", ")
            )));
        }

        Ok((dn, properties))
    }

    async fn add_entry(&mut self, dn: DistinguishedName, properties: AttributeMap) -> Result<()> {
        let mut attributes = properties;
        let mut classes = attributes.remove("objectclass").unwrap_or_default();
        for class in self.schema.create_objectclasses.iter().rev() {
            if !contains_ignore_case(&classes, class) {
                classes.insert(0, class.clone());
            }
        }
        if !classes.is_empty() {
            attributes.insert("objectClass", classes);
        }

        self.session.add(&dn, &attributes).await?;
        self.base = dn.parent();
        self.dn = Some(dn);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;
    use crate::handle::ObjectSchema;
    use crate::protocol::{MockDirectoryClient, ProtocolError, RC_NO_SUCH_OBJECT};
    use crate::session::Session;
    use dirsrv_core::config::DirectoryConfig;
    use std::sync::Arc;

    fn dn(value: &str) -> DistinguishedName {
        DistinguishedName::parse(value).unwrap()
    }

    fn people_schema() -> Arc<ObjectSchema> {
        Arc::new(
            ObjectSchema::new("uid")
                .with_must_attributes(["uid", "sn"])
                .with_create_objectclasses(["top", "person"]),
        )
    }

    fn unbound(client: MockDirectoryClient) -> EntryHandle {
        let session = Session::from_client(
            DirectoryConfig::new("ldap://localhost").unwrap(),
            Box::new(client),
        );
        EntryHandle::unbound(session, Some(dn("ou=People,dc=example")), people_schema())
    }

    fn missing() -> ProtocolError {
        ProtocolError::Result {
            code: RC_NO_SUCH_OBJECT,
            message: String::new(),
        }
    }

    #[test]
    fn diff_is_symmetric_difference() {
        let current = AttributeMap::new()
            .with_values("mail", ["a@example.com", "B@example.com"])
            .with("description", "keep");
        let desired = AttributeMap::new()
            .with_values("mail", ["b@example.com", "c@example.com"])
            .with_values("telephoneNumber", Vec::<String>::new());

        assert_eq!(
            attribute_diff(&current, &desired),
            vec![
                DirectoryModification::Add {
                    attribute: "mail".to_string(),
                    values: vec!["c@example.com".to_string()],
                },
                DirectoryModification::Delete {
                    attribute: "mail".to_string(),
                    values: vec!["a@example.com".to_string()],
                },
            ]
        );
        assert!(attribute_diff(&desired, &desired).is_empty());
    }

    #[test]
    fn diff_removes_attribute_mapped_to_nothing() {
        let current = AttributeMap::from([("description", "old")]);
        let desired = AttributeMap::new().with_values("description", Vec::<String>::new());
        assert_eq!(
            attribute_diff(&current, &desired),
            vec![DirectoryModification::Delete {
                attribute: "description".to_string(),
                values: vec!["old".to_string()],
            }]
        );
    }

    #[tokio::test]
    async fn create_synthesizes_rdn_and_object_classes() {
        let mut client = MockDirectoryClient::new();
        client.expect_search().times(1).returning(|_| Err(missing()));
        client
            .expect_add()
            .withf(|target, attrs| {
                target == "uid=bob,ou=People,dc=example"
                    && attrs.get("uid") == Some(&["bob".to_string()][..])
                    && attrs.get("objectclass")
                        == Some(&["top".to_string(), "person".to_string()][..])
            })
            .times(1)
            .returning(|_, _| Ok(()));
        let mut handle = unbound(client);

        handle
            .create(Some("uid=bob"), AttributeMap::from([("sn", "bob")]))
            .await
            .unwrap();
        assert_eq!(handle.dn().unwrap(), &dn("uid=bob,ou=People,dc=example"));
    }

    #[tokio::test]
    async fn create_takes_dn_from_rdn_attribute() {
        let mut client = MockDirectoryClient::new();
        client.expect_search().returning(|_| Err(missing()));
        client
            .expect_add()
            .withf(|target, _| target == "uid=carol,ou=People,dc=example")
            .times(1)
            .returning(|_, _| Ok(()));
        let mut handle = unbound(client);

        handle
            .create(None, AttributeMap::from([("uid", "carol"), ("sn", "C")]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn create_refuses_existing_entry() {
        let mut client = MockDirectoryClient::new();
        client.expect_search().times(1).returning(|request| {
            Ok(vec![Entry::new(dn(&request.base), AttributeMap::new())])
        });
        client.expect_add().never();
        let mut handle = unbound(client);

        let err = handle
            .create(Some("uid=bob"), AttributeMap::from([("sn", "bob")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn create_validates_before_any_round_trip() {
        let mut client = MockDirectoryClient::new();
        client.expect_search().never();
        client.expect_add().never();
        let mut handle = unbound(client);

        let err = handle
            .create(Some("uid=bob"), AttributeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ValueError(_)));

        let err = handle
            .create(Some("uid=bob"), AttributeMap::from([("cn", "Bob")]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("sn"));

        let err = handle
            .create(None, AttributeMap::from([("sn", "x")]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ValueError(_)));
    }

    #[tokio::test]
    async fn ensure_state_replaces_only_supplied_attributes_of_existing_entry() {
        let mut client = MockDirectoryClient::new();
        client.expect_search().times(1).returning(|request| {
            Ok(vec![Entry::new(dn(&request.base), AttributeMap::new())])
        });
        client.expect_add().never();
        client
            .expect_modify()
            .withf(|_, mods| {
                mods.iter().all(|m| m.mode() == ModMode::Replace)
                    && mods.iter().map(DirectoryModification::attribute).collect::<Vec<_>>()
                        == ["sn"]
            })
            .times(1)
            .returning(|_, _| Ok(()));
        let mut handle = unbound(client);

        handle
            .ensure_state(Some("uid=bob"), AttributeMap::from([("sn", "bob")]))
            .await
            .unwrap();
        assert!(handle.dn().is_ok());
    }

    #[tokio::test]
    async fn ensure_state_creates_missing_entry_with_single_probe() {
        let mut client = MockDirectoryClient::new();
        client.expect_search().times(1).returning(|_| Ok(Vec::new()));
        client.expect_add().times(1).returning(|_, _| Ok(()));
        let mut handle = unbound(client);

        handle
            .ensure_state(Some("uid=bob"), AttributeMap::from([("sn", "bob")]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn ensure_attr_state_without_changes_sends_no_modify() {
        let mut client = MockDirectoryClient::new();
        client.expect_search().times(1).returning(|request| {
            Ok(vec![Entry::new(
                dn(&request.base),
                AttributeMap::new().with_values("mail", ["b@example.com", "a@example.com"]),
            )])
        });
        client.expect_modify().never();
        let session = Session::from_client(
            DirectoryConfig::new("ldap://localhost").unwrap(),
            Box::new(client),
        );
        let handle = EntryHandle::new(session, dn("uid=bob,ou=People,dc=example"), people_schema());

        handle
            .ensure_attr_state(
                &AttributeMap::new().with_values("mail", ["a@example.com", "b@example.com"]),
            )
            .await
            .unwrap();
    }
}

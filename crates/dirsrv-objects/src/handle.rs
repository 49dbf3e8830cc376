//! Single-entry handle and the object schema describing an entry type.

use crate::dn::DistinguishedName;
use crate::entry::{AttributeMap, Entry};
use crate::lint::{run_rules, LintFinding, LintRule};
use crate::projection::{render, Format};
use crate::protocol::{DirectoryModification, ModMode, SearchRequest, SearchScope};
use crate::session::{Session, ANY_OBJECT_FILTER};
use crate::Result;
use dirsrv_core::error::Error;
use dirsrv_core::request::{Operation, RequestContext};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

/// Attributes the server assigns on its own; never part of [`EntryHandle::compare`].
pub const SERVER_ASSIGNED_ATTRIBUTES: &[&str] = &["entryid", "modifytimestamp", "nsuniqueid"];

/// Requests every user attribute.
pub const ALL_USER_ATTRIBUTES: &str = "*";
/// Requests every operational attribute.
pub const ALL_OPERATIONAL_ATTRIBUTES: &str = "+";
/// Requests no attributes (RFC 4511 section 4.5.1.8).
pub const NO_ATTRIBUTES: &str = "1.1";

/// Describes one type of directory object.
///
/// Collections use the search-side fields (`object_classes`, `filter_attributes`), handles use
/// the creation-side fields (`rdn_attribute`, `must_attributes`, `create_objectclasses`).
#[derive(Debug, Clone)]
pub struct ObjectSchema {
    /// Naming attribute used when a DN is computed from properties.
    pub rdn_attribute: String,
    /// Attributes that must carry a value on creation.
    pub must_attributes: Vec<String>,
    /// Object classes written when an entry is created.
    pub create_objectclasses: Vec<String>,
    /// Object classes an entry must carry to be selected by a collection.
    pub object_classes: Vec<String>,
    /// Attributes matched against selector values.
    pub filter_attributes: Vec<String>,
    /// Protected entries are never renamed or deleted.
    pub protected: bool,
    /// Extra attributes ignored by [`EntryHandle::compare`].
    pub compare_exclude: Vec<String>,
    /// Health checks run by `lint`.
    pub lint_rules: Vec<LintRule>,
}

impl ObjectSchema {
    /// Schema naming entries by `rdn_attribute`, which is also the only filter attribute.
    #[must_use]
    pub fn new(rdn_attribute: impl Into<String>) -> Self {
        let rdn_attribute = rdn_attribute.into();
        Self {
            filter_attributes: vec![rdn_attribute.clone()],
            rdn_attribute,
            must_attributes: Vec::new(),
            create_objectclasses: Vec::new(),
            object_classes: Vec::new(),
            protected: false,
            compare_exclude: Vec::new(),
            lint_rules: Vec::new(),
        }
    }

    /// Sets the required attributes.
    #[must_use]
    pub fn with_must_attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.must_attributes = names.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the object classes written on creation.
    #[must_use]
    pub fn with_create_objectclasses<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.create_objectclasses = classes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the object classes collections filter on.
    #[must_use]
    pub fn with_object_classes<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.object_classes = classes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the attributes selector values are matched against.
    #[must_use]
    pub fn with_filter_attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filter_attributes = names.into_iter().map(Into::into).collect();
        self
    }

    /// Marks the type as protected.
    #[must_use]
    pub const fn protected(mut self) -> Self {
        self.protected = true;
        self
    }

    /// Adds attributes ignored by comparisons.
    #[must_use]
    pub fn with_compare_exclude<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.compare_exclude
            .extend(names.into_iter().map(Into::into));
        self
    }

    /// Registers a lint rule.
    #[must_use]
    pub fn with_lint_rule(mut self, rule: LintRule) -> Self {
        self.lint_rules.push(rule);
        self
    }

    fn is_compare_excluded(&self, attribute: &str) -> bool {
        SERVER_ASSIGNED_ATTRIBUTES
            .iter()
            .copied()
            .chain(self.compare_exclude.iter().map(String::as_str))
            .any(|excluded| excluded.eq_ignore_ascii_case(attribute))
    }
}

/// One instruction of an [`EntryHandle::apply_mods`] batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModInstruction {
    /// Mode.
    pub mode: ModMode,
    /// Target attribute.
    pub attribute: String,
    /// Value; only [`ModMode::Delete`] may omit it.
    pub value: Option<String>,
}

impl ModInstruction {
    /// Creates an instruction.
    #[must_use]
    pub fn new(mode: ModMode, attribute: impl Into<String>, value: Option<&str>) -> Self {
        Self {
            mode,
            attribute: attribute.into(),
            value: value.map(str::to_string),
        }
    }

    fn into_modification(self) -> Result<DirectoryModification> {
        let values = match (self.mode, self.value) {
            (_, Some(value)) => vec![value],
            (ModMode::Delete, None) => Vec::new(),
            (mode, None) => {
                return Err(Error::ValueError(format!(
                    "{} of `{}` requires a value",
                    mode.as_str(),
                    self.attribute
                )))
            }
        };
        Ok(DirectoryModification::new(self.mode, self.attribute, values))
    }
}

/// CRUD and attribute access bound to one entry.
///
/// A handle either knows its DN, or (before `create`/`ensure_state`) only the base its DN will
/// be computed under.
#[derive(Clone)]
pub struct EntryHandle {
    pub(crate) session: Arc<Session>,
    pub(crate) schema: Arc<ObjectSchema>,
    pub(crate) dn: Option<DistinguishedName>,
    pub(crate) base: Option<DistinguishedName>,
}

impl EntryHandle {
    /// Handle for the entry at `dn`.
    #[must_use]
    pub fn new(session: Arc<Session>, dn: DistinguishedName, schema: Arc<ObjectSchema>) -> Self {
        Self {
            session,
            schema,
            base: dn.parent(),
            dn: Some(dn),
        }
    }

    /// Handle whose DN is computed on creation, under `base`.
    #[must_use]
    pub fn unbound(
        session: Arc<Session>,
        base: Option<DistinguishedName>,
        schema: Arc<ObjectSchema>,
    ) -> Self {
        Self {
            session,
            schema,
            dn: None,
            base,
        }
    }

    /// DN of the entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValueError`] if the handle has not been created yet.
    pub fn dn(&self) -> Result<&DistinguishedName> {
        self.dn
            .as_ref()
            .ok_or_else(|| Error::ValueError("entry handle has no DN yet".to_string()))
    }

    /// Object schema.
    #[must_use]
    pub fn schema(&self) -> &ObjectSchema {
        &self.schema
    }

    /// Session the handle operates on.
    #[must_use]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Reads the entry with all user attributes; `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] when disconnected, or any protocol error other than
    /// `noSuchObject`.
    pub async fn probe(&self) -> Result<Option<Entry>> {
        match &self.dn {
            Some(dn) => self.session.probe(dn, &[]).await,
            None => Ok(None),
        }
    }

    /// Returns true if the entry exists.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] when disconnected, or any protocol error other than
    /// `noSuchObject`.
    pub async fn exists(&self) -> Result<bool> {
        Ok(self.probe().await?.is_some())
    }

    /// Reads the entry with all user attributes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchObject`] if the entry does not exist.
    pub async fn entry(&self) -> Result<Entry> {
        let attributes = self.read(&[ALL_USER_ATTRIBUTES]).await?;
        Ok(Entry::new(self.dn()?.clone(), attributes))
    }

    /// Values of one attribute; empty if the attribute is absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchObject`] if the entry does not exist.
    pub async fn get_attr(&self, name: &str) -> Result<Vec<String>> {
        Ok(self
            .get_attrs(&[name])
            .await?
            .remove(name)
            .unwrap_or_default())
    }

    /// First value of one attribute.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchObject`] if the entry does not exist.
    pub async fn get_attr_val(&self, name: &str) -> Result<Option<String>> {
        Ok(self.get_attr(name).await?.into_iter().next())
    }

    /// First value of one attribute, lowercased.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchObject`] if the entry does not exist.
    pub async fn get_attr_val_lower(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .get_attr_val(name)
            .await?
            .map(|value| value.to_lowercase()))
    }

    /// First value of one attribute, parsed as an integer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchObject`] if the entry does not exist, or [`Error::ValueError`] if
    /// the value is not an integer.
    pub async fn get_attr_val_int(&self, name: &str) -> Result<Option<i64>> {
        self.get_attr_val(name)
            .await?
            .map(|value| {
                value.trim().parse::<i64>().map_err(|_| {
                    Error::ValueError(format!("`{name}` value `{value}` is not an integer"))
                })
            })
            .transpose()
    }

    /// Values of the named attributes. Names absent from the entry are absent from the map.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchObject`] if the entry does not exist.
    pub async fn get_attrs(&self, names: &[&str]) -> Result<AttributeMap> {
        let mut attributes = self.read(names).await?;
        let wildcard = names
            .iter()
            .any(|name| matches!(*name, ALL_USER_ATTRIBUTES | ALL_OPERATIONAL_ATTRIBUTES));
        if !wildcard {
            let wanted = names
                .iter()
                .map(|name| name.to_ascii_lowercase())
                .collect::<BTreeSet<_>>();
            let unwanted = attributes
                .names()
                .filter(|name| !wanted.contains(*name))
                .map(str::to_string)
                .collect::<Vec<_>>();
            for name in unwanted {
                attributes.remove(&name);
            }
        }
        Ok(attributes)
    }

    /// Every user and operational attribute.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchObject`] if the entry does not exist.
    pub async fn get_all_attrs(&self) -> Result<AttributeMap> {
        self.read(&[ALL_USER_ATTRIBUTES, ALL_OPERATIONAL_ATTRIBUTES])
            .await
    }

    /// Renders the whole entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchObject`] if the entry does not exist.
    pub async fn display(&self, format: Format) -> Result<String> {
        let attributes = self.read(&[ALL_USER_ATTRIBUTES]).await?;
        render(self.dn()?.as_str(), &attributes, format)
    }

    /// Renders the named attributes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchObject`] if the entry does not exist.
    pub async fn display_attrs(&self, names: &[&str], format: Format) -> Result<String> {
        let attributes = self.get_attrs(names).await?;
        render(self.dn()?.as_str(), &attributes, format)
    }

    /// Sends one modify instruction.
    ///
    /// `value = None` is only valid with [`ModMode::Delete`], where it removes every value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValueError`] for a valueless non-delete instruction, otherwise the
    /// mapped protocol error.
    pub async fn set(&self, name: &str, value: Option<&str>, mode: ModMode) -> Result<()> {
        self.apply_mods(vec![ModInstruction::new(mode, name, value)])
            .await
    }

    /// Adds a value.
    ///
    /// # Errors
    ///
    /// Returns the mapped protocol error.
    pub async fn add(&self, name: &str, value: &str) -> Result<()> {
        self.set(name, Some(value), ModMode::Add).await
    }

    /// Replaces every value with `value`.
    ///
    /// # Errors
    ///
    /// Returns the mapped protocol error.
    pub async fn replace(&self, name: &str, value: &str) -> Result<()> {
        self.set(name, Some(value), ModMode::Replace).await
    }

    /// Removes one value.
    ///
    /// # Errors
    ///
    /// Returns the mapped protocol error.
    pub async fn remove(&self, name: &str, value: &str) -> Result<()> {
        self.set(name, Some(value), ModMode::Delete).await
    }

    /// Removes the attribute.
    ///
    /// # Errors
    ///
    /// Returns the mapped protocol error.
    pub async fn remove_all(&self, name: &str) -> Result<()> {
        self.set(name, None, ModMode::Delete).await
    }

    /// Replaces several attributes in one request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValueError`] if `attributes` is empty, otherwise the mapped protocol
    /// error.
    pub async fn replace_many(&self, attributes: &AttributeMap) -> Result<()> {
        if attributes.is_empty() {
            return Err(Error::ValueError(
                "replace_many needs at least one attribute".to_string(),
            ));
        }
        let modifications = attributes
            .iter()
            .map(|(name, values)| DirectoryModification::new(ModMode::Replace, name, values.clone()))
            .collect::<Vec<_>>();
        self.session.modify(self.dn()?, &modifications).await
    }

    /// Sends a batch of instructions in one request. An empty batch sends nothing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValueError`] if a non-delete instruction has no value, otherwise the
    /// mapped protocol error.
    pub async fn apply_mods(&self, instructions: Vec<ModInstruction>) -> Result<()> {
        let modifications = instructions
            .into_iter()
            .map(ModInstruction::into_modification)
            .collect::<Result<Vec<_>>>()?;
        if modifications.is_empty() {
            return Ok(());
        }
        self.session.modify(self.dn()?, &modifications).await
    }

    /// Returns true if `name` has any value, or (with `value`) that value, compared
    /// case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchObject`] if the entry does not exist.
    pub async fn present(&self, name: &str, value: Option<&str>) -> Result<bool> {
        let values = self.get_attr(name).await?;
        Ok(match value {
            None => !values.is_empty(),
            Some(wanted) => values
                .iter()
                .any(|current| current.eq_ignore_ascii_case(wanted)),
        })
    }

    /// Adds `value` unless already present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchObject`] if the entry does not exist, or the mapped protocol error.
    pub async fn ensure_present(&self, name: &str, value: &str) -> Result<()> {
        if self.present(name, Some(value)).await? {
            return Ok(());
        }
        self.add(name, value).await
    }

    /// Removes `value` if present.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchObject`] if the entry does not exist, or the mapped protocol error.
    pub async fn ensure_removed(&self, name: &str, value: &str) -> Result<()> {
        if !self.present(name, Some(value)).await? {
            return Ok(());
        }
        self.remove(name, value).await
    }

    /// Renames and/or moves the entry, updating the cached DN. Protected entries are left alone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValueError`] if `new_rdn` is not a single RDN, otherwise the mapped
    /// protocol error.
    pub async fn rename(
        &mut self,
        new_rdn: &str,
        new_superior: Option<&DistinguishedName>,
        delete_old_rdn: bool,
    ) -> Result<()> {
        let dn = self.dn()?;
        if self.schema.protected {
            warn!("Refusing to rename protected entry {dn}");
            return Ok(());
        }
        let renamed = dn.renamed(new_rdn, new_superior)?;
        self.session
            .rename(dn, new_rdn, new_superior, delete_old_rdn)
            .await?;
        self.base = renamed.parent();
        self.dn = Some(renamed);
        Ok(())
    }

    /// Deletes the entry. Protected entries are left alone.
    ///
    /// # Errors
    ///
    /// Returns the mapped protocol error (`noSuchObject` included).
    pub async fn delete(&self) -> Result<()> {
        let dn = self.dn()?;
        if self.schema.protected {
            warn!("Refusing to delete protected entry {dn}");
            return Ok(());
        }
        self.session.delete(dn).await
    }

    /// Deletes the entry and its whole subtree, deepest entries first.
    ///
    /// # Errors
    ///
    /// Returns the mapped protocol error of the first failing request.
    pub async fn delete_recursive(&self) -> Result<()> {
        let dn = self.dn()?;
        if self.schema.protected {
            warn!("Refusing to delete protected subtree {dn}");
            return Ok(());
        }

        let mut guard = self.session.lock().await?;
        let request = SearchRequest::new(dn.as_str(), SearchScope::Subtree, ANY_OBJECT_FILTER)
            .with_attributes([NO_ATTRIBUTES]);
        let mut subtree = guard
            .search(&request)
            .await?
            .into_iter()
            .map(|entry| entry.dn)
            .collect::<Vec<_>>();
        subtree.sort_by_key(|child| std::cmp::Reverse(child.depth()));

        for child in &subtree {
            guard.delete(child).await?;
        }
        Ok(())
    }

    /// Returns true if both handles name entries with the same RDN and the same attribute
    /// values, ignoring server-assigned attributes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchObject`] if either entry does not exist.
    pub async fn compare(left: &Self, right: &Self) -> Result<bool> {
        let left_dn = left.dn()?;
        let right_dn = right.dn()?;
        if !same_rdn(left_dn, right_dn) {
            return Ok(false);
        }

        let left_attrs = comparable(&left.schema, left.get_all_attrs().await?);
        let right_attrs = comparable(&right.schema, right.get_all_attrs().await?);
        Ok(left_attrs == right_attrs)
    }

    /// Runs the schema's lint rules against the current entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchObject`] if the entry does not exist.
    pub async fn lint(&self) -> Result<Vec<LintFinding>> {
        if self.schema.lint_rules.is_empty() {
            return Ok(Vec::new());
        }
        let entry = self.entry().await?;
        Ok(run_rules(&self.schema.lint_rules, &entry))
    }

    async fn read(&self, names: &[&str]) -> Result<AttributeMap> {
        let dn = self.dn()?;
        self.session
            .probe(dn, names)
            .await?
            .map(|entry| entry.attributes)
            .ok_or_else(|| Error::NoSuchObject {
                message: "entry does not exist".to_string(),
                request: RequestContext::new(Operation::Search, dn.as_str())
                    .with_argument(format!("scope={}", SearchScope::Base.as_str())),
            })
    }
}

impl std::fmt::Debug for EntryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryHandle")
            .field("dn", &self.dn)
            .field("base", &self.base)
            .field("rdn_attribute", &self.schema.rdn_attribute)
            .finish_non_exhaustive()
    }
}

fn same_rdn(left: &DistinguishedName, right: &DistinguishedName) -> bool {
    let left = DistinguishedName::parse(left.rdn());
    let right = DistinguishedName::parse(right.rdn());
    matches!((left, right), (Ok(left), Ok(right)) if left == right)
}

fn comparable(
    schema: &ObjectSchema,
    attributes: AttributeMap,
) -> std::collections::BTreeMap<String, BTreeSet<String>> {
    attributes
        .into_inner()
        .into_iter()
        .filter(|(name, _)| !schema.is_compare_excluded(name))
        .map(|(name, values)| (name, values.into_iter().collect()))
        .collect()
}

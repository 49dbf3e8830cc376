//! Collections of entries sharing a base DN and object classes.

use crate::dn::DistinguishedName;
use crate::entry::{AttributeMap, Entry};
use crate::filter::{self, Filter};
use crate::handle::{EntryHandle, ObjectSchema};
use crate::lint::{run_rules, LintFinding};
use crate::paged::PaginatedEnumerator;
use crate::protocol::{SearchRequest, SearchScope};
use crate::session::Session;
use crate::Result;
use dirsrv_core::error::Error;
use dirsrv_core::request::{Operation, RequestContext};
use std::sync::Arc;
use tracing::debug;

/// Options for [`EntryCollection::filter`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOptions {
    /// Attributes to return; the collection default when `None`.
    pub attributes: Option<Vec<String>>,
    /// Search scope; the collection default when `None`.
    pub scope: Option<SearchScope>,
    /// Surface `noSuchObject` for a missing base instead of returning nothing.
    pub strict: bool,
}

impl FilterOptions {
    /// Strict options.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            strict: true,
            ..Self::default()
        }
    }

    /// Restricts the returned attributes.
    #[must_use]
    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = Some(attributes.into_iter().map(Into::into).collect());
        self
    }

    /// Overrides the search scope.
    #[must_use]
    pub const fn with_scope(mut self, scope: SearchScope) -> Self {
        self.scope = Some(scope);
        self
    }
}

/// Entries of one object type below a base DN.
#[derive(Clone)]
pub struct EntryCollection {
    session: Arc<Session>,
    base: DistinguishedName,
    schema: Arc<ObjectSchema>,
    scope: SearchScope,
    attributes: Vec<String>,
}

impl EntryCollection {
    /// Collection of `schema` entries in the subtree below `base`.
    #[must_use]
    pub fn new(session: Arc<Session>, base: DistinguishedName, schema: Arc<ObjectSchema>) -> Self {
        Self {
            session,
            base,
            schema,
            scope: SearchScope::Subtree,
            attributes: Vec::new(),
        }
    }

    /// Sets the default search scope.
    #[must_use]
    pub const fn with_scope(mut self, scope: SearchScope) -> Self {
        self.scope = scope;
        self
    }

    /// Sets the attributes returned by default; empty requests all user attributes.
    #[must_use]
    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }

    /// Base DN.
    #[must_use]
    pub fn base(&self) -> &DistinguishedName {
        &self.base
    }

    /// Schema of the member entries.
    #[must_use]
    pub fn schema(&self) -> &ObjectSchema {
        &self.schema
    }

    /// Every member entry.
    ///
    /// Pages with `page_size` when given, else with the configured default page size, else
    /// sends one unpaged search. A missing base yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] when disconnected, or the mapped protocol error.
    pub async fn list(&self, page_size: Option<u32>) -> Result<Vec<EntryHandle>> {
        Ok(self
            .list_entries(page_size)
            .await?
            .into_iter()
            .map(|entry| self.handle(entry.dn))
            .collect())
    }

    /// Like [`EntryCollection::list`], returning the entries as read.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] when disconnected, or the mapped protocol error.
    pub async fn list_entries(&self, page_size: Option<u32>) -> Result<Vec<Entry>> {
        let request = self.request(
            filter::object_class_filter(&self.schema.object_classes),
            self.scope,
            self.attributes.clone(),
        );
        let result = match page_size.or(self.session.config().page_size) {
            Some(size) => {
                PaginatedEnumerator::new(request, size)?
                    .with_criticality(self.session.config().paged_critical)
                    .collect(&self.session)
                    .await
            }
            None => self.session.search(&request).await,
        };
        collapse_missing_base(result, false)
    }

    /// Member entries matching `expression` (RFC 4515 syntax), as handles.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValueError`] for a malformed expression, [`Error::NoSuchObject`] for a
    /// missing base when `options.strict` is set, otherwise the mapped protocol error.
    pub async fn filter(&self, expression: &str, options: FilterOptions) -> Result<Vec<EntryHandle>> {
        Ok(self
            .filter_entries(expression, options)
            .await?
            .into_iter()
            .map(|entry| self.handle(entry.dn))
            .collect())
    }

    /// Member entries matching `expression`, with the requested attributes.
    ///
    /// # Errors
    ///
    /// See [`EntryCollection::filter`].
    pub async fn filter_entries(&self, expression: &str, options: FilterOptions) -> Result<Vec<Entry>> {
        let caller = Filter::parse(expression)?;
        let combined = Filter::and(vec![
            filter::object_class_filter(&self.schema.object_classes),
            caller,
        ]);
        let request = self.request(
            combined,
            options.scope.unwrap_or(self.scope),
            options.attributes.unwrap_or_else(|| self.attributes.clone()),
        );
        collapse_missing_base(self.session.search(&request).await, options.strict)
    }

    /// The single member matching `selector` on any filter attribute.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchObject`] for no match and [`Error::UnwillingToPerform`] for more
    /// than one.
    pub async fn get(&self, selector: &str) -> Result<EntryHandle> {
        self.get_matching(&[selector]).await
    }

    /// The single member matching `selector`, paired positionally with the filter attributes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValueError`] if the selector cannot be paired with the filter attributes,
    /// [`Error::NoSuchObject`] for no match, and [`Error::UnwillingToPerform`] for more than
    /// one.
    pub async fn get_matching(&self, selector: &[&str]) -> Result<EntryHandle> {
        let filter = filter::generate(
            &self.schema.object_classes,
            selector,
            &self.schema.filter_attributes,
        )?;
        let request = self.request(filter, self.scope, vec![crate::handle::NO_ATTRIBUTES.to_string()]);
        let entries = self.session.search(&request).await?;
        Ok(self.handle(single(entries, &request)?.dn))
    }

    /// The member at `dn`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoSuchObject`] if no entry of this type exists at `dn`.
    pub async fn get_by_dn(&self, dn: &DistinguishedName) -> Result<EntryHandle> {
        let request = SearchRequest::new(
            dn.as_str(),
            SearchScope::Base,
            filter::object_class_filter(&self.schema.object_classes).to_string(),
        )
        .with_attributes([crate::handle::NO_ATTRIBUTES]);
        let entries = self.session.search(&request).await?;
        Ok(self.handle(single(entries, &request)?.dn))
    }

    /// Returns true if exactly one member matches `selector`; any failure counts as false.
    pub async fn exists(&self, selector: &str) -> bool {
        self.get(selector).await.is_ok()
    }

    /// Returns true if a member exists at `dn`; any failure counts as false.
    pub async fn exists_dn(&self, dn: &DistinguishedName) -> bool {
        self.get_by_dn(dn).await.is_ok()
    }

    /// Creates a member below the base.
    ///
    /// # Errors
    ///
    /// See [`EntryHandle::create`].
    pub async fn create(&self, rdn: Option<&str>, properties: AttributeMap) -> Result<EntryHandle> {
        let mut handle = self.unbound();
        handle.create(rdn, properties).await?;
        Ok(handle)
    }

    /// Creates or updates a member below the base.
    ///
    /// # Errors
    ///
    /// See [`EntryHandle::ensure_state`].
    pub async fn ensure_state(
        &self,
        rdn: Option<&str>,
        properties: AttributeMap,
    ) -> Result<EntryHandle> {
        let mut handle = self.unbound();
        handle.ensure_state(rdn, properties).await?;
        Ok(handle)
    }

    /// Runs the schema's lint rules over every member.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] when disconnected, or the mapped protocol error.
    pub async fn lint(&self) -> Result<Vec<LintFinding>> {
        if self.schema.lint_rules.is_empty() {
            return Ok(Vec::new());
        }
        let entries = self.list_entries(None).await?;
        Ok(entries
            .iter()
            .flat_map(|entry| run_rules(&self.schema.lint_rules, entry))
            .collect())
    }

    fn handle(&self, dn: DistinguishedName) -> EntryHandle {
        EntryHandle::new(Arc::clone(&self.session), dn, Arc::clone(&self.schema))
    }

    fn unbound(&self) -> EntryHandle {
        EntryHandle::unbound(
            Arc::clone(&self.session),
            Some(self.base.clone()),
            Arc::clone(&self.schema),
        )
    }

    fn request(&self, filter: Filter, scope: SearchScope, attributes: Vec<String>) -> SearchRequest {
        SearchRequest::new(self.base.as_str(), scope, filter.to_string()).with_attributes(attributes)
    }
}

impl std::fmt::Debug for EntryCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryCollection")
            .field("base", &self.base)
            .field("scope", &self.scope)
            .field("object_classes", &self.schema.object_classes)
            .finish_non_exhaustive()
    }
}

fn collapse_missing_base(result: Result<Vec<Entry>>, strict: bool) -> Result<Vec<Entry>> {
    match result {
        Err(err) if !strict && err.is_no_such_object() => {
            debug!("Search base missing, treating as empty: {err}");
            Ok(Vec::new())
        }
        other => other,
    }
}

fn single(entries: Vec<Entry>, request: &SearchRequest) -> Result<Entry> {
    let context = || {
        RequestContext::new(Operation::Search, request.base.as_str())
            .with_argument(format!("filter={}", request.filter))
    };
    let mut entries = entries.into_iter();
    match (entries.next(), entries.next()) {
        (Some(entry), None) => Ok(entry),
        (None, _) => Err(Error::NoSuchObject {
            message: "no entry matches".to_string(),
            request: context(),
        }),
        (Some(_), Some(_)) => Err(Error::UnwillingToPerform {
            message: format!("{} entries match, expected one", 2 + entries.count()),
            request: context(),
        }),
    }
}

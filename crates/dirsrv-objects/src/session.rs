//! Explicit directory session.
//!
//! A [`Session`] owns one protocol client for its whole lifetime. Every handle and collection
//! holds an `Arc<Session>`; operations lock the client for a single request/response round trip
//! (or, via [`Session::lock`], for a run of related round trips such as paged enumeration).

use crate::dn::DistinguishedName;
use crate::entry::{AttributeMap, Entry};
use crate::ldap::LdapConnector;
use crate::protocol::{
    DirectoryClient, DirectoryConnector, DirectoryModification, Page, PageControl, SearchRequest,
    SearchScope,
};
use crate::Result;
use dirsrv_core::config::DirectoryConfig;
use dirsrv_core::error::Error;
use dirsrv_core::request::{Operation, RequestContext, SensitiveAttributes};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// Filter matching any entry; used for base-scope probes.
pub const ANY_OBJECT_FILTER: &str = "(objectclass=*)";

/// Connected directory session shared by handles and collections.
pub struct Session {
    config: Arc<DirectoryConfig>,
    client: Mutex<Option<Box<dyn DirectoryClient>>>,
}

impl Session {
    /// Connects with the `ldap3` transport and binds with the configured credentials.
    ///
    /// # Errors
    ///
    /// Returns the mapped protocol error if the connection or the bind fails.
    pub async fn connect(config: DirectoryConfig) -> Result<Arc<Self>> {
        let config = Arc::new(config);
        let connector = LdapConnector::new(Arc::clone(&config));
        Self::connect_with(config, &connector).await
    }

    /// Connects through `connector` and binds with the configured credentials, if any.
    ///
    /// # Errors
    ///
    /// Returns the mapped protocol error if the connection or the bind fails.
    pub async fn connect_with(
        config: Arc<DirectoryConfig>,
        connector: &dyn DirectoryConnector,
    ) -> Result<Arc<Self>> {
        let bind_dn = config
            .credentials
            .as_ref()
            .map(|credentials| credentials.bind_dn().to_string())
            .unwrap_or_default();
        let request = RequestContext::new(Operation::Bind, bind_dn);

        let mut client = connector
            .connect()
            .await
            .map_err(|err| err.into_error(request.clone()))?;
        if let Some(credentials) = &config.credentials {
            debug!("Sending {request}");
            client
                .simple_bind(credentials.bind_dn(), credentials.bind_password())
                .await
                .map_err(|err| err.into_error(request))?;
        }
        info!("Connected to {}", config.url);

        Ok(Arc::new(Self {
            config,
            client: Mutex::new(Some(client)),
        }))
    }

    /// Wraps an already connected (and bound) client.
    #[must_use]
    pub fn from_client(config: DirectoryConfig, client: Box<dyn DirectoryClient>) -> Arc<Self> {
        Arc::new(Self {
            config: Arc::new(config),
            client: Mutex::new(Some(client)),
        })
    }

    /// Connection configuration.
    #[must_use]
    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Attributes whose values are masked in request descriptions.
    #[must_use]
    pub fn sensitive_attributes(&self) -> &SensitiveAttributes {
        &self.config.sensitive_attributes
    }

    /// Returns true until [`Session::disconnect`] has been called.
    pub async fn is_connected(&self) -> bool {
        self.client.lock().await.is_some()
    }

    /// Unbinds and drops the client. Later operations fail with [`Error::InvalidState`].
    ///
    /// # Errors
    ///
    /// Returns the mapped protocol error if the unbind request fails; the client is dropped
    /// regardless.
    pub async fn disconnect(&self) -> Result<()> {
        let Some(mut client) = self.client.lock().await.take() else {
            return Ok(());
        };
        client.unbind().await.map_err(|err| {
            err.into_error(RequestContext::new(Operation::Bind, self.config.url.clone()))
        })?;
        info!("Disconnected from {}", self.config.url);
        Ok(())
    }

    /// Locks the client for a sequence of round trips.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the session is disconnected.
    pub async fn lock(&self) -> Result<SessionGuard<'_>> {
        let client = self.client.lock().await;
        if client.is_none() {
            return Err(Error::InvalidState(format!(
                "session to {} is not connected",
                self.config.url
            )));
        }
        Ok(SessionGuard {
            client,
            sensitive: &self.config.sensitive_attributes,
        })
    }

    /// Unpaged search.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] when disconnected, or the mapped protocol error.
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<Entry>> {
        self.lock().await?.search(request).await
    }

    /// Base-scope read of `dn`; a missing entry is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] when disconnected, or any protocol error other than
    /// `noSuchObject`.
    pub async fn probe(&self, dn: &DistinguishedName, attributes: &[&str]) -> Result<Option<Entry>> {
        let request = SearchRequest::new(dn.as_str(), SearchScope::Base, ANY_OBJECT_FILTER)
            .with_attributes(attributes.iter().copied());
        match self.search(&request).await {
            Ok(entries) => Ok(entries.into_iter().next()),
            Err(err) if err.is_no_such_object() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Adds an entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] when disconnected, or the mapped protocol error.
    pub async fn add(&self, dn: &DistinguishedName, attributes: &AttributeMap) -> Result<()> {
        self.lock().await?.add(dn, attributes).await
    }

    /// Applies `modifications` to `dn` in one request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] when disconnected, or the mapped protocol error.
    pub async fn modify(
        &self,
        dn: &DistinguishedName,
        modifications: &[DirectoryModification],
    ) -> Result<()> {
        self.lock().await?.modify(dn, modifications).await
    }

    /// Deletes a leaf entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] when disconnected, or the mapped protocol error.
    pub async fn delete(&self, dn: &DistinguishedName) -> Result<()> {
        self.lock().await?.delete(dn).await
    }

    /// Renames and/or moves `dn`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] when disconnected, or the mapped protocol error.
    pub async fn rename(
        &self,
        dn: &DistinguishedName,
        new_rdn: &str,
        new_superior: Option<&DistinguishedName>,
        delete_old_rdn: bool,
    ) -> Result<()> {
        self.lock()
            .await?
            .rename(dn, new_rdn, new_superior, delete_old_rdn)
            .await
    }
}

/// Exclusive access to the session's client.
pub struct SessionGuard<'a> {
    client: MutexGuard<'a, Option<Box<dyn DirectoryClient>>>,
    sensitive: &'a SensitiveAttributes,
}

impl SessionGuard<'_> {
    fn client(&mut self) -> Result<&mut Box<dyn DirectoryClient>> {
        self.client
            .as_mut()
            .ok_or_else(|| Error::InvalidState("session is not connected".to_string()))
    }

    /// Unpaged search.
    ///
    /// # Errors
    ///
    /// Returns the mapped protocol error.
    pub async fn search(&mut self, request: &SearchRequest) -> Result<Vec<Entry>> {
        let context = describe_search(request, None);
        debug!("Sending {context}");
        self.client()?
            .search(request)
            .await
            .map_err(|err| err.into_error(context))
    }

    /// One page of a paged search.
    ///
    /// # Errors
    ///
    /// Returns the mapped protocol error.
    pub async fn search_page(
        &mut self,
        request: &SearchRequest,
        control: &PageControl,
    ) -> Result<Page> {
        let context = describe_search(request, Some(control));
        debug!("Sending {context}");
        self.client()?
            .search_page(request, control)
            .await
            .map_err(|err| err.into_error(context))
    }

    /// Adds an entry.
    ///
    /// # Errors
    ///
    /// Returns the mapped protocol error.
    pub async fn add(&mut self, dn: &DistinguishedName, attributes: &AttributeMap) -> Result<()> {
        let context = attributes
            .iter()
            .fold(RequestContext::new(Operation::Add, dn.as_str()), |ctx, (name, values)| {
                ctx.with_attribute(name, values, self.sensitive)
            });
        debug!("Sending {context}");
        self.client()?
            .add(dn.as_str(), attributes)
            .await
            .map_err(|err| err.into_error(context))?;
        info!("Added {dn}");
        Ok(())
    }

    /// Applies `modifications` to `dn` in one request.
    ///
    /// # Errors
    ///
    /// Returns the mapped protocol error.
    pub async fn modify(
        &mut self,
        dn: &DistinguishedName,
        modifications: &[DirectoryModification],
    ) -> Result<()> {
        let context = describe_modify(dn, modifications, self.sensitive);
        debug!("Sending {context}");
        self.client()?
            .modify(dn.as_str(), modifications)
            .await
            .map_err(|err| err.into_error(context))?;
        info!("Modified {dn} ({} change(s))", modifications.len());
        Ok(())
    }

    /// Deletes a leaf entry.
    ///
    /// # Errors
    ///
    /// Returns the mapped protocol error.
    pub async fn delete(&mut self, dn: &DistinguishedName) -> Result<()> {
        let context = RequestContext::new(Operation::Delete, dn.as_str());
        debug!("Sending {context}");
        self.client()?
            .delete(dn.as_str())
            .await
            .map_err(|err| err.into_error(context))?;
        info!("Deleted {dn}");
        Ok(())
    }

    /// Renames and/or moves `dn`.
    ///
    /// # Errors
    ///
    /// Returns the mapped protocol error.
    pub async fn rename(
        &mut self,
        dn: &DistinguishedName,
        new_rdn: &str,
        new_superior: Option<&DistinguishedName>,
        delete_old_rdn: bool,
    ) -> Result<()> {
        let mut context = RequestContext::new(Operation::Rename, dn.as_str())
            .with_argument(format!("newrdn={new_rdn}"))
            .with_argument(format!("deleteoldrdn={delete_old_rdn}"));
        if let Some(superior) = new_superior {
            context = context.with_argument(format!("newsuperior={superior}"));
        }
        debug!("Sending {context}");
        self.client()?
            .rename(
                dn.as_str(),
                new_rdn,
                new_superior.map(ToString::to_string),
                delete_old_rdn,
            )
            .await
            .map_err(|err| err.into_error(context))?;
        info!("Renamed {dn} to {new_rdn}");
        Ok(())
    }
}

fn describe_search(request: &SearchRequest, control: Option<&PageControl>) -> RequestContext {
    let mut context = RequestContext::new(Operation::Search, request.base.as_str())
        .with_argument(format!("scope={}", request.scope.as_str()))
        .with_argument(format!("filter={}", request.filter));
    if !request.attributes.is_empty() {
        context = context.with_argument(format!("attrs={}", request.attributes.join(" ")));
    }
    if let Some(control) = control {
        context = context.with_argument(format!("pagesize={}", control.size));
    }
    context
}

fn describe_modify(
    dn: &DistinguishedName,
    modifications: &[DirectoryModification],
    sensitive: &SensitiveAttributes,
) -> RequestContext {
    modifications
        .iter()
        .fold(RequestContext::new(Operation::Modify, dn.as_str()), |ctx, m| {
            let attribute = m.attribute();
            let mode = m.mode().as_str();
            if m.values().is_empty() {
                return ctx.with_argument(format!("{mode} {attribute}"));
            }
            m.values().iter().fold(ctx, |ctx, value| {
                ctx.with_argument(format!(
                    "{mode} {attribute}={}",
                    sensitive.mask(attribute, value)
                ))
            })
        })
}

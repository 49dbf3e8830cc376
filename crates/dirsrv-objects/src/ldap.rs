//! `ldap3`-backed protocol client.

use crate::dn::DistinguishedName;
use crate::entry::{AttributeMap, Entry};
use crate::protocol::{
    DirectoryClient, DirectoryConnector, DirectoryModification, Page, PageControl,
    ProtocolError, ProtocolResult, SearchRequest, SearchScope,
};
use async_trait::async_trait;
use dirsrv_core::config::DirectoryConfig;
use ldap3::controls::{Control, ControlType, PagedResults, RawControl};
use ldap3::{LdapConnAsync, LdapConnSettings, Mod, Scope, SearchEntry};
use native_tls::{Certificate, TlsConnector};
use std::collections::HashSet;
use std::fs;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

impl From<SearchScope> for Scope {
    fn from(scope: SearchScope) -> Self {
        match scope {
            SearchScope::Base => Scope::Base,
            SearchScope::OneLevel => Scope::OneLevel,
            SearchScope::Subtree => Scope::Subtree,
        }
    }
}

/// Real connector backed by `ldap3`.
pub struct LdapConnector {
    config: Arc<DirectoryConfig>,
}

impl LdapConnector {
    /// Creates a new connector instance.
    #[must_use]
    pub fn new(config: Arc<DirectoryConfig>) -> Self {
        Self { config }
    }
}

#[async_trait]
impl DirectoryConnector for LdapConnector {
    async fn connect(&self) -> ProtocolResult<Box<dyn DirectoryClient>> {
        let settings = build_ldap_settings(&self.config)?;
        let (conn, ldap) = LdapConnAsync::with_settings(settings, &self.config.url)
            .await
            .map_err(map_ldap_error)?;
        ldap3::drive!(conn);
        Ok(Box::new(LdapClient {
            inner: ldap,
            operation_timeout: self.config.operation_timeout(),
        }))
    }
}

struct LdapClient {
    inner: ldap3::Ldap,
    operation_timeout: Duration,
}

impl LdapClient {
    async fn bounded<F, T>(&self, operation: &str, fut: F) -> ProtocolResult<T>
    where
        F: Future<Output = ldap3::result::Result<T>>,
    {
        timeout(self.operation_timeout, fut)
            .await
            .map_err(|_| ProtocolError::Timeout(format!("{operation} timed out")))?
            .map_err(map_ldap_error)
    }
}

#[async_trait]
impl DirectoryClient for LdapClient {
    async fn simple_bind(&mut self, dn: &str, password: &str) -> ProtocolResult<()> {
        let mut ldap = self.inner.clone();
        let result = self.bounded("bind", ldap.simple_bind(dn, password)).await?;
        result.success().map_err(map_ldap_error)?;
        Ok(())
    }

    async fn search(&mut self, request: &SearchRequest) -> ProtocolResult<Vec<Entry>> {
        let mut ldap = self.inner.clone();
        let result = self
            .bounded(
                "search",
                ldap.search(
                    &request.base,
                    request.scope.into(),
                    &request.filter,
                    requested_attributes(request),
                ),
            )
            .await?;
        let (entries, _) = result.success().map_err(map_ldap_error)?;
        Ok(entries
            .into_iter()
            .map(SearchEntry::construct)
            .filter_map(into_entry)
            .collect())
    }

    async fn search_page(
        &mut self,
        request: &SearchRequest,
        control: &PageControl,
    ) -> ProtocolResult<Page> {
        let mut raw: RawControl = PagedResults {
            size: i32::try_from(control.size).unwrap_or(i32::MAX),
            cookie: control.cookie.clone(),
        }
        .into();
        raw.crit = control.critical;

        let mut ldap = self.inner.clone();
        let result = self
            .bounded(
                "paged search",
                ldap.with_controls(vec![raw]).search(
                    &request.base,
                    request.scope.into(),
                    &request.filter,
                    requested_attributes(request),
                ),
            )
            .await?;
        let (entries, outcome) = result.success().map_err(map_ldap_error)?;
        let cookie = outcome
            .ctrls
            .iter()
            .find_map(|Control(kind, raw)| match kind {
                Some(ControlType::PagedResults) => Some(raw.parse::<PagedResults>().cookie),
                _ => None,
            })
            .unwrap_or_default();

        Ok(Page {
            entries: entries
                .into_iter()
                .map(SearchEntry::construct)
                .filter_map(into_entry)
                .collect(),
            cookie,
        })
    }

    async fn add(&mut self, dn: &str, attributes: &AttributeMap) -> ProtocolResult<()> {
        let attrs = attributes
            .iter()
            .map(|(name, values)| {
                (
                    name.as_str(),
                    values.iter().map(String::as_str).collect::<HashSet<_>>(),
                )
            })
            .collect::<Vec<_>>();

        let mut ldap = self.inner.clone();
        let result = self.bounded("add", ldap.add(dn, attrs)).await?;
        result.success().map_err(map_ldap_error)?;
        Ok(())
    }

    async fn modify(
        &mut self,
        dn: &str,
        modifications: &[DirectoryModification],
    ) -> ProtocolResult<()> {
        let mods = modifications
            .iter()
            .map(|m| match m {
                DirectoryModification::Add { attribute, values } => Mod::Add(
                    attribute.clone(),
                    values.iter().cloned().collect::<HashSet<_>>(),
                ),
                DirectoryModification::Delete { attribute, values } => Mod::Delete(
                    attribute.clone(),
                    values.iter().cloned().collect::<HashSet<_>>(),
                ),
                DirectoryModification::Replace { attribute, values } => Mod::Replace(
                    attribute.clone(),
                    values.iter().cloned().collect::<HashSet<_>>(),
                ),
            })
            .collect::<Vec<_>>();

        let mut ldap = self.inner.clone();
        let result = self.bounded("modify", ldap.modify(dn, mods)).await?;
        result.success().map_err(map_ldap_error)?;
        Ok(())
    }

    async fn delete(&mut self, dn: &str) -> ProtocolResult<()> {
        let mut ldap = self.inner.clone();
        let result = self.bounded("delete", ldap.delete(dn)).await?;
        result.success().map_err(map_ldap_error)?;
        Ok(())
    }

    async fn rename(
        &mut self,
        dn: &str,
        new_rdn: &str,
        new_superior: Option<String>,
        delete_old_rdn: bool,
    ) -> ProtocolResult<()> {
        let mut ldap = self.inner.clone();
        let result = self
            .bounded(
                "rename",
                ldap.modifydn(dn, new_rdn, delete_old_rdn, new_superior.as_deref()),
            )
            .await?;
        result.success().map_err(map_ldap_error)?;
        Ok(())
    }

    async fn unbind(&mut self) -> ProtocolResult<()> {
        let mut ldap = self.inner.clone();
        self.bounded("unbind", ldap.unbind()).await
    }
}

fn requested_attributes(request: &SearchRequest) -> Vec<String> {
    if request.attributes.is_empty() {
        vec!["*".to_string()]
    } else {
        request.attributes.clone()
    }
}

fn into_entry(entry: SearchEntry) -> Option<Entry> {
    match DistinguishedName::parse(&entry.dn) {
        Ok(dn) => Some(Entry::new(dn, entry.attrs.into())),
        Err(err) => {
            warn!("Skipping entry with unparsable DN `{}`: {err}", entry.dn);
            None
        }
    }
}

fn build_ldap_settings(config: &DirectoryConfig) -> ProtocolResult<LdapConnSettings> {
    let mut settings = LdapConnSettings::new().set_conn_timeout(config.connection_timeout());

    if !config.tls_verify {
        let connector = TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|err| {
                ProtocolError::Transport(format!("failed to construct TLS connector: {err}"))
            })?;
        settings = settings.set_connector(connector).set_no_tls_verify(true);
    } else if let Some(cert_path) = &config.tls_ca_cert {
        let pem = fs::read(cert_path).map_err(|err| {
            ProtocolError::Transport(format!(
                "failed to read CA certificate {}: {err}",
                cert_path.display()
            ))
        })?;
        let certificate = Certificate::from_pem(&pem)
            .map_err(|err| ProtocolError::Transport(format!("invalid CA certificate: {err}")))?;
        let connector = TlsConnector::builder()
            .add_root_certificate(certificate)
            .build()
            .map_err(|err| {
                ProtocolError::Transport(format!("failed to load CA certificate: {err}"))
            })?;
        settings = settings.set_connector(connector);
    }

    Ok(settings)
}

fn map_ldap_error(err: ldap3::LdapError) -> ProtocolError {
    match err {
        ldap3::LdapError::LdapResult { result } => ProtocolError::Result {
            code: result.rc,
            message: result.text,
        },
        other => ProtocolError::Transport(other.to_string()),
    }
}

//! Connection configuration for directory sessions.
//!
//! Timeouts are properties of the transport: they are applied to the underlying connection, not
//! to individual object operations.

use crate::credentials::BindCredentials;
use crate::request::SensitiveAttributes;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;
use validator::Validate;

/// Default connection timeout (seconds).
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 10;
/// Default operation timeout (seconds).
pub const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 30;

/// Configuration for connecting to a directory server.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DirectoryConfig {
    /// Server URL (`ldap://`, `ldaps://`, or `ldapi://`)
    #[validate(url)]
    pub url: String,

    /// Bind credentials; anonymous when absent
    #[serde(skip)]
    pub credentials: Option<BindCredentials>,

    /// Whether to verify TLS certificates
    #[serde(default = "default_tls_verify")]
    pub tls_verify: bool,

    /// Optional path to custom CA certificate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_ca_cert: Option<PathBuf>,

    /// Connection timeout in seconds
    #[validate(range(min = 1, max = 300))]
    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,

    /// Per-request timeout in seconds
    #[validate(range(min = 1, max = 3600))]
    #[serde(default = "default_operation_timeout_secs")]
    pub operation_timeout_secs: u64,

    /// Page size used by collection listings when the caller does not pass one
    #[validate(range(min = 1))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_size: Option<u32>,

    /// Criticality flag of the paged results control
    #[serde(default = "default_paged_critical")]
    pub paged_critical: bool,

    /// Attributes whose values are masked in errors and logs
    #[serde(default)]
    pub sensitive_attributes: SensitiveAttributes,
}

const fn default_tls_verify() -> bool {
    true
}

const fn default_connection_timeout_secs() -> u64 {
    DEFAULT_CONNECTION_TIMEOUT_SECS
}

const fn default_operation_timeout_secs() -> u64 {
    DEFAULT_OPERATION_TIMEOUT_SECS
}

const fn default_paged_critical() -> bool {
    true
}

impl DirectoryConfig {
    /// Creates a configuration for the given server URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the URL is invalid.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let config = Self {
            url: url.into(),
            credentials: None,
            tls_verify: default_tls_verify(),
            tls_ca_cert: None,
            connection_timeout_secs: default_connection_timeout_secs(),
            operation_timeout_secs: default_operation_timeout_secs(),
            page_size: None,
            paged_critical: default_paged_critical(),
            sensitive_attributes: SensitiveAttributes::default(),
        };
        config.check()?;
        Ok(config)
    }

    /// Deserializes and validates a JSON configuration document.
    ///
    /// Credentials are never read from the document; attach them with
    /// [`DirectoryConfig::with_credentials`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the document is malformed or fails validation.
    pub fn from_json(document: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(document)
            .map_err(|err| Error::ConfigError(format!("invalid configuration: {err}")))?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        self.validate()?;
        let url = Url::parse(&self.url)?;
        match url.scheme() {
            "ldap" | "ldaps" | "ldapi" => Ok(()),
            other => Err(Error::ConfigError(format!(
                "unsupported directory URL scheme `{other}`"
            ))),
        }
    }

    /// Attaches bind credentials.
    #[must_use]
    pub fn with_credentials(mut self, credentials: BindCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Enables or disables TLS certificate verification.
    #[must_use]
    pub const fn with_tls_verification(mut self, verify: bool) -> Self {
        self.tls_verify = verify;
        self
    }

    /// Sets the custom CA certificate path for TLS verification.
    #[must_use]
    pub fn with_tls_ca_cert(mut self, path: PathBuf) -> Self {
        self.tls_ca_cert = Some(path);
        self
    }

    /// Overrides the connection timeout in seconds.
    #[must_use]
    pub const fn with_connection_timeout_secs(mut self, seconds: u64) -> Self {
        self.connection_timeout_secs = seconds;
        self
    }

    /// Overrides the operation timeout in seconds.
    #[must_use]
    pub const fn with_operation_timeout_secs(mut self, seconds: u64) -> Self {
        self.operation_timeout_secs = seconds;
        self
    }

    /// Sets the default page size for collection listings.
    #[must_use]
    pub const fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Sets the criticality of the paged results control.
    #[must_use]
    pub const fn with_paged_critical(mut self, critical: bool) -> Self {
        self.paged_critical = critical;
        self
    }

    /// Replaces the sensitive attribute set.
    #[must_use]
    pub fn with_sensitive_attributes(mut self, sensitive: SensitiveAttributes) -> Self {
        self.sensitive_attributes = sensitive;
        self
    }

    /// Returns the connection timeout duration.
    #[must_use]
    pub const fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_secs)
    }

    /// Returns the operation timeout duration.
    #[must_use]
    pub const fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied() {
        let config = DirectoryConfig::new("ldap://localhost:389").unwrap();
        assert!(config.tls_verify);
        assert!(config.paged_critical);
        assert!(config.page_size.is_none());
        assert!(config.credentials.is_none());
        assert_eq!(
            config.connection_timeout(),
            Duration::from_secs(DEFAULT_CONNECTION_TIMEOUT_SECS)
        );
        assert!(config.sensitive_attributes.is_sensitive("userpassword"));
    }

    #[test]
    fn builder_overrides() {
        let config = DirectoryConfig::new("ldaps://ds.example.com:636")
            .unwrap()
            .with_credentials(BindCredentials::new("cn=Directory Manager", "password"))
            .with_connection_timeout_secs(20)
            .with_operation_timeout_secs(60)
            .with_page_size(100)
            .with_paged_critical(false)
            .with_tls_verification(false);

        assert_eq!(config.connection_timeout(), Duration::from_secs(20));
        assert_eq!(config.operation_timeout(), Duration::from_secs(60));
        assert_eq!(config.page_size, Some(100));
        assert!(!config.paged_critical);
        assert!(!config.tls_verify);
        assert_eq!(
            config.credentials.as_ref().map(BindCredentials::bind_dn),
            Some("cn=Directory Manager")
        );
    }

    #[test]
    fn rejects_non_directory_schemes() {
        let result = DirectoryConfig::new("https://ds.example.com");
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[test]
    fn rejects_invalid_urls() {
        assert!(matches!(
            DirectoryConfig::new("not a url"),
            Err(Error::ConfigError(_))
        ));
    }

    #[test]
    fn from_json_applies_defaults_and_validates() {
        let config = DirectoryConfig::from_json(
            r#"{"url": "ldap://localhost", "page_size": 50, "sensitive_attributes": ["userPassword", "nsSecret"]}"#,
        )
        .unwrap();
        assert_eq!(config.page_size, Some(50));
        assert_eq!(config.operation_timeout_secs, DEFAULT_OPERATION_TIMEOUT_SECS);
        assert!(config.sensitive_attributes.is_sensitive("nssecret"));
        assert!(config.sensitive_attributes.is_sensitive("userPassword"));

        let invalid = DirectoryConfig::from_json(
            r#"{"url": "ldap://localhost", "connection_timeout_secs": 0}"#,
        );
        assert!(matches!(invalid, Err(Error::ConfigError(_))));
    }

    #[test]
    fn serialization_omits_credentials() {
        let config = DirectoryConfig::new("ldap://localhost")
            .unwrap()
            .with_credentials(BindCredentials::new("cn=admin", "hunter2"));
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!json.contains("\"credentials\""));
        assert!(json.contains("nsds5replicacredentials"));
    }
}

//! Bind credentials for directory sessions.

use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

/// Simple-bind credentials.
///
/// The password is held as a [`SecretString`]; it is redacted from `Debug` output and never
/// serialized.
#[derive(Debug, Clone, Serialize)]
pub struct BindCredentials {
    /// Bind DN
    pub bind_dn: String,

    /// Bind password
    #[serde(skip_serializing)]
    bind_password: SecretString,
}

impl BindCredentials {
    /// Create new bind credentials.
    #[must_use]
    pub fn new(bind_dn: impl Into<String>, bind_password: impl Into<String>) -> Self {
        Self {
            bind_dn: bind_dn.into(),
            bind_password: SecretString::from(bind_password.into()),
        }
    }

    /// Get the bind DN.
    #[must_use]
    pub fn bind_dn(&self) -> &str {
        &self.bind_dn
    }

    /// Get the bind password.
    #[must_use]
    pub fn bind_password(&self) -> &str {
        self.bind_password.expose_secret()
    }
}

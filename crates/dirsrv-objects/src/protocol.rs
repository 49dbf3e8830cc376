//! Directory protocol boundary.
//!
//! [`DirectoryClient`] is the set of primitives this crate consumes from a protocol client:
//! add, modify, delete, search (optionally paged), and rename. The `ldap3`-backed implementation
//! lives in [`crate::ldap`]; tests substitute in-memory or mocked clients.

use crate::entry::{AttributeMap, Entry};
use async_trait::async_trait;
use dirsrv_core::error::Error;
use dirsrv_core::request::RequestContext;
use thiserror::Error as ThisError;

/// `noSuchObject` result code.
pub const RC_NO_SUCH_OBJECT: u32 = 32;
/// `invalidCredentials` result code.
pub const RC_INVALID_CREDENTIALS: u32 = 49;
/// `unwillingToPerform` result code.
pub const RC_UNWILLING_TO_PERFORM: u32 = 53;
/// `alreadyExists` result code.
pub const RC_ALREADY_EXISTS: u32 = 68;
/// `constraintViolation` result code.
pub const RC_CONSTRAINT_VIOLATION: u32 = 19;

/// Represents the search scope for directory queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Base object only.
    Base,
    /// One level below the base.
    OneLevel,
    /// Entire subtree.
    Subtree,
}

impl SearchScope {
    /// Lowercase scope name, as used in request descriptions.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::OneLevel => "one",
            Self::Subtree => "sub",
        }
    }
}

/// Modify instruction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModMode {
    /// Add values.
    Add,
    /// Replace all values.
    Replace,
    /// Delete values (or the whole attribute when no value is given).
    Delete,
}

impl ModMode {
    /// Lowercase mode name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Replace => "replace",
            Self::Delete => "delete",
        }
    }
}

/// Directory modification request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryModification {
    /// Add attribute values.
    Add {
        /// Attribute to modify.
        attribute: String,
        /// Values to add.
        values: Vec<String>,
    },
    /// Delete attribute values.
    Delete {
        /// Attribute to modify.
        attribute: String,
        /// Values to delete (empty removes attribute).
        values: Vec<String>,
    },
    /// Replace attribute values.
    Replace {
        /// Attribute to modify.
        attribute: String,
        /// Replacement values.
        values: Vec<String>,
    },
}

impl DirectoryModification {
    /// Builds a modification from a mode and values.
    #[must_use]
    pub fn new(mode: ModMode, attribute: impl Into<String>, values: Vec<String>) -> Self {
        let attribute = attribute.into();
        match mode {
            ModMode::Add => Self::Add { attribute, values },
            ModMode::Replace => Self::Replace { attribute, values },
            ModMode::Delete => Self::Delete { attribute, values },
        }
    }

    /// Mode of this modification.
    #[must_use]
    pub const fn mode(&self) -> ModMode {
        match self {
            Self::Add { .. } => ModMode::Add,
            Self::Replace { .. } => ModMode::Replace,
            Self::Delete { .. } => ModMode::Delete,
        }
    }

    /// Attribute targeted by this modification.
    #[must_use]
    pub fn attribute(&self) -> &str {
        match self {
            Self::Add { attribute, .. }
            | Self::Replace { attribute, .. }
            | Self::Delete { attribute, .. } => attribute,
        }
    }

    /// Values carried by this modification.
    #[must_use]
    pub fn values(&self) -> &[String] {
        match self {
            Self::Add { values, .. }
            | Self::Replace { values, .. }
            | Self::Delete { values, .. } => values,
        }
    }
}

/// A search request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Search base.
    pub base: String,
    /// Search scope.
    pub scope: SearchScope,
    /// Wire-form filter expression.
    pub filter: String,
    /// Requested attributes; empty requests all user attributes.
    pub attributes: Vec<String>,
}

impl SearchRequest {
    /// Creates a request for all user attributes.
    #[must_use]
    pub fn new(base: impl Into<String>, scope: SearchScope, filter: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            scope,
            filter: filter.into(),
            attributes: Vec::new(),
        }
    }

    /// Restricts the returned attributes.
    #[must_use]
    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }
}

/// Paged results request control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageControl {
    /// Criticality flag.
    pub critical: bool,
    /// Requested page size.
    pub size: u32,
    /// Opaque cookie from the previous page; empty on the first request.
    pub cookie: Vec<u8>,
}

/// One page of results plus the response cookie.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Page {
    /// Entries in response order.
    pub entries: Vec<Entry>,
    /// Response cookie; empty when the result set is exhausted.
    pub cookie: Vec<u8>,
}

/// Failures reported by a protocol client.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum ProtocolError {
    /// The server answered with a non-success result code.
    #[error("result code {code}: {message}")]
    Result {
        /// Result code.
        code: u32,
        /// Diagnostic message.
        message: String,
    },
    /// The request never completed at the protocol level.
    #[error("transport failure: {0}")]
    Transport(String),
    /// The transport timed out.
    #[error("timed out: {0}")]
    Timeout(String),
}

impl ProtocolError {
    /// Returns true for a `noSuchObject` result.
    #[must_use]
    pub const fn is_no_such_object(&self) -> bool {
        matches!(self, Self::Result { code, .. } if *code == RC_NO_SUCH_OBJECT)
    }

    /// Maps the failure into the typed error hierarchy, attaching the request description.
    #[must_use]
    pub fn into_error(self, request: RequestContext) -> Error {
        match self {
            Self::Result { code, message } => match code {
                RC_NO_SUCH_OBJECT => Error::NoSuchObject { message, request },
                RC_ALREADY_EXISTS => Error::AlreadyExists { message, request },
                RC_UNWILLING_TO_PERFORM => Error::UnwillingToPerform { message, request },
                RC_INVALID_CREDENTIALS => Error::InvalidCredentials { message, request },
                RC_CONSTRAINT_VIOLATION => Error::ConstraintViolation { message, request },
                _ => Error::ProtocolError {
                    code,
                    message,
                    request,
                },
            },
            Self::Transport(message) => Error::ProtocolError {
                code: 0,
                message,
                request,
            },
            Self::Timeout(message) => Error::Timeout(format!("{message} ({request})")),
        }
    }
}

/// Result alias for protocol client calls.
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

/// Protocol client primitives.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectoryClient: Send {
    /// Simple bind.
    async fn simple_bind(&mut self, dn: &str, password: &str) -> ProtocolResult<()>;

    /// Unpaged search.
    async fn search(&mut self, request: &SearchRequest) -> ProtocolResult<Vec<Entry>>;

    /// One page of a paged search.
    async fn search_page(
        &mut self,
        request: &SearchRequest,
        control: &PageControl,
    ) -> ProtocolResult<Page>;

    /// Adds an entry.
    async fn add(&mut self, dn: &str, attributes: &AttributeMap) -> ProtocolResult<()>;

    /// Applies modifications to an entry in one request.
    async fn modify(
        &mut self,
        dn: &str,
        modifications: &[DirectoryModification],
    ) -> ProtocolResult<()>;

    /// Deletes a leaf entry.
    async fn delete(&mut self, dn: &str) -> ProtocolResult<()>;

    /// Renames and/or moves an entry.
    async fn rename(
        &mut self,
        dn: &str,
        new_rdn: &str,
        new_superior: Option<String>,
        delete_old_rdn: bool,
    ) -> ProtocolResult<()>;

    /// Ends the session.
    async fn unbind(&mut self) -> ProtocolResult<()>;
}

/// Opens new protocol client sessions.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DirectoryConnector: Send + Sync {
    /// Opens an unbound connection.
    async fn connect(&self) -> ProtocolResult<Box<dyn DirectoryClient>>;
}

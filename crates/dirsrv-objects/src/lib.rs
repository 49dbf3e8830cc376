//! # dirsrv-objects
//!
//! Declarative object mapping, query, and reconciliation layer over a directory server.
//!
//! Object types are described by an [`ObjectSchema`]. An [`EntryHandle`] reads, writes,
//! renames, and deletes one entry; an [`EntryCollection`] searches for entries of one type below
//! a base DN; [`EntryHandle::ensure_state`] and [`EntryHandle::ensure_attr_state`] converge an
//! entry to a desired state; a [`CompositeEntryView`] joins several entries into one logical
//! object. Every request goes through a shared [`Session`].
//!
//! ## Modules
//!
//! - [`dn`] - Distinguished name model
//! - [`entry`] - Entries and case-insensitive multi-valued attributes
//! - [`filter`] - Search filter construction, parsing, and escaping
//! - [`protocol`] - Directory client boundary traits
//! - [`ldap`] - `ldap3` implementation of the client boundary
//! - [`session`] - Shared connection with request logging and error mapping
//! - [`handle`] - Single-entry handle and object schemas
//! - [`reconcile`] - Create and ensure-state operations
//! - [`paged`] - Cookie-driven paged enumeration
//! - [`collection`] - Typed searches below a base DN
//! - [`composite`] - One object spanning several entries
//! - [`projection`] - Text and JSON rendering of entries
//! - [`lint`] - Per-type health checks
//! - [`presets`] - Users, groups, backends, and plugins

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod collection;
pub mod composite;
pub mod dn;
pub mod entry;
pub mod filter;
pub mod handle;
pub mod ldap;
pub mod lint;
pub mod paged;
pub mod presets;
pub mod projection;
pub mod protocol;
pub mod reconcile;
pub mod session;

pub use collection::{EntryCollection, FilterOptions};
pub use composite::CompositeEntryView;
pub use dn::{DistinguishedName, DistinguishedNameError, RelativeDistinguishedName};
pub use entry::{AttributeMap, Entry};
pub use filter::Filter;
pub use handle::{EntryHandle, ModInstruction, ObjectSchema};
pub use ldap::LdapConnector;
pub use lint::{LintFinding, LintRule, Severity};
pub use paged::{PageState, PaginatedEnumerator};
pub use projection::Format;
pub use protocol::{
    DirectoryClient, DirectoryConnector, DirectoryModification, ModMode, SearchRequest,
    SearchScope,
};
pub use session::{Session, SessionGuard};

/// Convenient result alias that reuses the core error type.
pub type Result<T> = dirsrv_core::Result<T>;

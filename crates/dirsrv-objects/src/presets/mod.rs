//! Schemas and typed wrappers for common directory server object types.
//!
//! - [`users`] - person accounts below `ou=People`
//! - [`groups`] - `groupOfNames` groups below `ou=Groups`
//! - [`backends`] - database backend instances
//! - [`plugins`] - server plugin configuration entries

pub mod backends;
pub mod groups;
pub mod plugins;
pub mod users;

pub use backends::Backend;
pub use groups::Group;
pub use plugins::Plugin;
pub use users::User;

use crate::dn::DistinguishedName;
use crate::Result;

/// Configuration tree root.
pub const CONFIG_BASE: &str = "cn=config";

/// Parent of every plugin entry.
pub const PLUGINS_BASE: &str = "cn=plugins,cn=config";

/// Parent of the database backend instances.
pub const LDBM_BASE: &str = "cn=ldbm database,cn=plugins,cn=config";

/// `{rdn},{suffix}` as a DN.
fn below(rdn: &str, suffix: &DistinguishedName) -> Result<DistinguishedName> {
    Ok(DistinguishedName::parse(format!("{rdn},{suffix}"))?)
}

//! # dirsrv-core
//!
//! Core types shared by the directory object tooling crates.
//!
//! ## Modules
//!
//! - [`error`] - Error type carrying the originating request description
//! - [`request`] - Request descriptions and sensitive value masking
//! - [`credentials`] - Bind credentials with a secret password
//! - [`config`] - Connection configuration for directory sessions

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod credentials;
pub mod error;
pub mod request;

// Re-export commonly used types
pub use config::DirectoryConfig;
pub use credentials::BindCredentials;
pub use error::{Error, Result};
pub use request::{Operation, RequestContext, SensitiveAttributes};

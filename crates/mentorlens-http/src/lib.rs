//! MentorLens HTTP - backend collaborators over HTTPS JSON
//!
//! `reqwest` implementations of the engine's collaborator traits:
//! - [`HttpRowSource`]: unfiltered and `from`/`to` ranged widget rows
//! - [`HttpProgramDirectory`]: coordinator program lookup
//! - [`HttpNotificationSource`]: notification feeds for the poller
//!
//! HTTP 429 surfaces as [`mentorlens_core::FetchError::RateLimited`]; any
//! other non-2xx status is a generic status error.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod client;
pub mod directory;
pub mod notifications;
pub mod rows;

pub use client::{BackendClient, ClientError};
pub use directory::{first_program, HttpProgramDirectory};
pub use notifications::HttpNotificationSource;
pub use rows::{row_query, HttpRowSource};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! # Passgate Shared Library
//!
//! This crate contains the account domain used by the Passgate API server:
//! persistence, credentials, session tokens, email verification and avatars.
//!
//! ## Module Organization
//!
//! - `models`: User record, patches and projections
//! - `store`: Persistence interface with PostgreSQL and in-memory backends
//! - `db`: Connection pool and migrations
//! - `auth`: Password hashing, JWT session tokens, bearer authentication
//! - `verification`: Verification tokens and verification emails
//! - `mail`: Outgoing email dispatch
//! - `avatar`: Avatar storage, gravatar fallback and best-effort cleanup
//! - `accounts`: Account service orchestrating all flows

pub mod accounts;
pub mod auth;
pub mod avatar;
pub mod db;
pub mod mail;
pub mod models;
pub mod store;
pub mod verification;

/// Current version of the Passgate shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// API route handlers
///
/// This module contains all route handlers organized by resource:
///
/// - `health`: Health check endpoint
/// - `auth`: Account endpoints (register, verify, login, logout, profile)

pub mod auth;
pub mod health;

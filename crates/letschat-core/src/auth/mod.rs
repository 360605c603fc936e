//! Authentication module for anonymous Firebase sessions.
//!
//! This module provides:
//! - `AuthClient`: anonymous sign-in and token refresh over REST
//! - `Session`: persisted session data with expiry tracking
//! - `BearerToken`: the current ID token, shared by all API clients
//!
//! ID tokens expire after one hour and are refreshed five minutes early.

pub mod client;
pub mod session;

pub use client::AuthClient;
pub use session::{BearerToken, Session, SessionData};

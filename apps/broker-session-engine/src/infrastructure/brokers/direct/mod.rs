//! Direct-Auth Broker Adapter
//!
//! One-step login with a SHA-256 hashed password, a derived app key and an
//! RFC 6238 TOTP code. Sessions never expire locally; the broker decides.

mod adapter;
mod api_types;
mod client;
mod config;
pub mod totp;

pub use adapter::{DIRECT_BROKER_NAME, DirectAuthAdapter, REQUIRED_FIELDS};
pub use api_types::{LoginRequest, LoginSession, UserProfile};
pub use client::{DirectAuthClient, HttpDirectAuthClient};
pub use config::DirectAuthConfig;

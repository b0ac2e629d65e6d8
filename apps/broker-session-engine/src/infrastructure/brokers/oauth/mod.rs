//! OAuth Broker Adapter
//!
//! Authorization-code grant: `connect` issues a consent URL, `complete_oauth`
//! exchanges the code for a finite-lifetime token plus refresh token, and
//! `refresh_token` sends an HMAC-SHA256 signed refresh request.

mod adapter;
mod api_types;
mod client;
mod config;
pub mod signing;

pub use adapter::{OAUTH_BROKER_NAME, OAuthAdapter, REQUIRED_FIELDS};
pub use api_types::{IssuedToken, ProfileData, RefreshRequest, TokenExchangeRequest};
pub use client::{HttpOAuthClient, OAuthClient};
pub use config::OAuthConfig;

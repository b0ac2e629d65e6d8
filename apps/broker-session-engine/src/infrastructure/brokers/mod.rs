//! Broker Adapters
//!
//! Implementations of `BrokerAdapter` plus the plumbing they share:
//!
//! - [`direct`]: password + TOTP login, non-expiring tokens
//! - [`oauth`]: authorization-code grant with refreshable tokens
//! - [`normalizer`]: native failure classification into `ErrorKind`
//!
//! Each adapter sits on a thin client trait that owns transport only, so
//! tests substitute fakes without a network.

pub mod direct;
pub mod error;
pub mod http;
pub mod normalizer;
pub mod oauth;
pub mod session_cache;

use std::sync::Arc;

pub use error::TransportError;

use crate::application::registry::BrokerPlugin;
use direct::{DIRECT_BROKER_NAME, DirectAuthAdapter, DirectAuthClient, DirectAuthConfig};
use oauth::{OAUTH_BROKER_NAME, OAuthAdapter, OAuthClient, OAuthConfig};

/// Plugin version reported by the shipped adapters.
pub const PLUGIN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Plugin for the direct-auth adapter over `client`.
#[must_use]
pub fn direct_plugin(client: Arc<dyn DirectAuthClient>, config: DirectAuthConfig) -> BrokerPlugin {
    BrokerPlugin::new(DIRECT_BROKER_NAME, PLUGIN_VERSION, move || {
        Box::new(DirectAuthAdapter::new(Arc::clone(&client), config.clone()))
    })
}

/// Plugin for the OAuth adapter over `client`.
#[must_use]
pub fn oauth_plugin(client: Arc<dyn OAuthClient>, config: OAuthConfig) -> BrokerPlugin {
    BrokerPlugin::new(OAUTH_BROKER_NAME, PLUGIN_VERSION, move || {
        Box::new(OAuthAdapter::new(Arc::clone(&client), config.clone()))
    })
}

/// Plugins for both shipped adapters backed by reqwest clients.
///
/// # Errors
///
/// Returns `TransportError::Connection` if an HTTP client cannot be built.
pub fn http_plugins(
    direct_config: DirectAuthConfig,
    oauth_config: OAuthConfig,
) -> Result<Vec<BrokerPlugin>, TransportError> {
    let direct_client: Arc<dyn DirectAuthClient> =
        Arc::new(direct::HttpDirectAuthClient::new(direct_config.clone())?);
    let oauth_client: Arc<dyn OAuthClient> =
        Arc::new(oauth::HttpOAuthClient::new(oauth_config.clone())?);
    Ok(vec![
        direct_plugin(direct_client, direct_config),
        oauth_plugin(oauth_client, oauth_config),
    ])
}

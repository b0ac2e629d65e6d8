//! Direct-auth broker wire types.
//!
//! Requests are sent as `jData=<json>[&jKey=<token>]` form bodies; every
//! response carries `stat` (`Ok` / `Not_Ok`) and `emsg` on failure.

use serde::{Deserialize, Serialize};

/// `stat` value for success.
pub const STAT_OK: &str = "Ok";

/// Login request.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    /// User id.
    pub uid: String,
    /// SHA-256 hex of the password.
    pub pwd: String,
    /// Current TOTP code.
    pub factor2: String,
    /// Vendor code.
    pub vc: String,
    /// SHA-256 hex of `"{uid}|{api_secret}"`.
    pub appkey: String,
    /// Device identifier.
    pub imei: String,
    /// Client application version.
    pub apkversion: String,
    /// Request source tag.
    pub source: String,
}

/// Login response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginResponse {
    /// `Ok` or `Not_Ok`.
    pub stat: String,
    /// Session token.
    #[serde(default)]
    pub susertoken: Option<String>,
    /// Account holder name.
    #[serde(default)]
    pub uname: Option<String>,
    /// Account id.
    #[serde(default)]
    pub actid: Option<String>,
    /// Registered email.
    #[serde(default)]
    pub email: Option<String>,
    /// Enabled exchanges.
    #[serde(default)]
    pub exarr: Vec<String>,
    /// Enabled products.
    #[serde(default)]
    pub prarr: Vec<ProductEntry>,
    /// Error message.
    #[serde(default)]
    pub emsg: Option<String>,
}

/// Product entry in a login or user-details response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductEntry {
    /// Product code.
    #[serde(default)]
    pub prd: String,
    /// Product display name.
    #[serde(default)]
    pub s_prdt_ali: Option<String>,
}

/// User details request, used as the cheap session probe.
#[derive(Debug, Clone, Serialize)]
pub struct UserDetailsRequest {
    /// User id.
    pub uid: String,
}

/// User details response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserDetailsResponse {
    /// `Ok` or `Not_Ok`.
    pub stat: String,
    /// Account holder name.
    #[serde(default)]
    pub uname: Option<String>,
    /// Account id.
    #[serde(default)]
    pub actid: Option<String>,
    /// Registered email.
    #[serde(default)]
    pub email: Option<String>,
    /// Enabled exchanges.
    #[serde(default)]
    pub exarr: Vec<String>,
    /// Error message.
    #[serde(default)]
    pub emsg: Option<String>,
}

/// Logout request.
#[derive(Debug, Clone, Serialize)]
pub struct LogoutRequest {
    /// User id.
    pub uid: String,
}

/// Generic acknowledgement.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusResponse {
    /// `Ok` or `Not_Ok`.
    pub stat: String,
    /// Error message.
    #[serde(default)]
    pub emsg: Option<String>,
}

/// Session issued by a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginSession {
    /// Session token.
    pub token: String,
    /// Account id.
    pub account_id: String,
    /// Account holder name.
    pub name: String,
    /// Registered email.
    pub email: Option<String>,
    /// Enabled exchanges.
    pub exchanges: Vec<String>,
    /// Enabled products.
    pub products: Vec<String>,
}

/// Profile returned by the probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    /// Account id.
    pub account_id: Option<String>,
    /// Account holder name.
    pub name: Option<String>,
    /// Registered email.
    pub email: Option<String>,
    /// Enabled exchanges.
    pub exchanges: Vec<String>,
}

//! Session value objects.

mod account_info;
mod account_status;
mod error_kind;
mod health;
mod session_key;
mod token_info;

pub use account_info::AccountInfo;
pub use account_status::{AccountStatus, AuthenticationStep};
pub use error_kind::ErrorKind;
pub use health::{ErrorRecord, HealthBucket, HealthPolicy, MAX_HEALTH_SCORE};
pub use session_key::SessionKey;
pub use token_info::{TokenExpiry, TokenInfo};

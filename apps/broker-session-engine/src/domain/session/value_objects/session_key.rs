//! Session identity.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::shared::{AccountId, BrokerName, UserId};

/// Identity of a session: one per `(user, broker, account)` triple.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    /// Owning user.
    pub user_id: UserId,
    /// Registered broker plugin name.
    pub broker: BrokerName,
    /// Broker-side account.
    pub account_id: AccountId,
}

impl SessionKey {
    /// Create a key.
    #[must_use]
    pub fn new(
        user_id: impl Into<UserId>,
        broker: impl Into<BrokerName>,
        account_id: impl Into<AccountId>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            broker: broker.into(),
            account_id: account_id.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.user_id, self.broker, self.account_id)
    }
}

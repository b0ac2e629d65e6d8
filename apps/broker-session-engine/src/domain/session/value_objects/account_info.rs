//! Broker account profile captured at connect time.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::shared::AccountId;

/// Account profile. Immutable for the life of a session; replaced wholesale
/// on reconnect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    /// Broker-side account identifier.
    pub account_id: AccountId,
    /// Account holder's display name.
    pub display_name: String,
    /// Contact email, when the broker exposes it.
    pub email: Option<String>,
    /// Human-readable broker name.
    pub broker_display_name: String,
    /// Exchanges the account may trade on.
    pub exchanges: BTreeSet<String>,
    /// Product types the account may trade.
    pub products: BTreeSet<String>,
}

impl AccountInfo {
    /// Minimal profile with empty exchange and product sets.
    #[must_use]
    pub fn new(
        account_id: impl Into<AccountId>,
        display_name: impl Into<String>,
        broker_display_name: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            display_name: display_name.into(),
            email: None,
            broker_display_name: broker_display_name.into(),
            exchanges: BTreeSet::new(),
            products: BTreeSet::new(),
        }
    }

    /// Set the email.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Set the tradable exchanges.
    #[must_use]
    pub fn with_exchanges<I, S>(mut self, exchanges: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exchanges = exchanges.into_iter().map(Into::into).collect();
        self
    }

    /// Set the tradable products.
    #[must_use]
    pub fn with_products<I, S>(mut self, products: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.products = products.into_iter().map(Into::into).collect();
        self
    }
}

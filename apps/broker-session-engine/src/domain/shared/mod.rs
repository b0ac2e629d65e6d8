//! Shared kernel: types used across session bounded context boundaries.

mod identifiers;

pub use identifiers::{AccountId, BrokerName, UserId};

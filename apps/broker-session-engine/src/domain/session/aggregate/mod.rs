//! Session aggregate.

mod session;

pub use session::{HealthChange, Session};

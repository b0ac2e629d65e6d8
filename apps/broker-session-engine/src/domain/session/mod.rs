//! Broker Session Bounded Context
//!
//! Canonical model for broker authentication sessions.
//!
//! # Key Concepts
//!
//! - **Session Aggregate**: status, tokens, health bookkeeping for one account
//! - **State Machine**: which triggers may move a session between statuses
//! - **Error Kinds**: broker-independent failure classification
//! - **Domain Events**: operator alerts and store change notifications
//! - **Repository**: check-then-write storage owned by one store

pub mod aggregate;
pub mod errors;
pub mod events;
pub mod repository;
pub mod services;
pub mod value_objects;

pub use aggregate::{HealthChange, Session};
pub use errors::{RegistryError, SessionError};
pub use events::{AlertReason, SessionAlert, SessionChange};
pub use repository::{SessionRepository, SessionUpdate, UpdateOutcome};
pub use services::{SessionStateMachine, SessionTrigger};
pub use value_objects::{
    AccountInfo, AccountStatus, AuthenticationStep, ErrorKind, ErrorRecord, HealthBucket,
    HealthPolicy, MAX_HEALTH_SCORE, SessionKey, TokenExpiry, TokenInfo,
};

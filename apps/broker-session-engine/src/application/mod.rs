//! Application Layer
//!
//! The application layer orchestrates the session domain and broker adapters.
//! It defines:
//!
//! - **Ports**: Interfaces for broker adapters and alert sinks
//! - **Registry**: Broker plugins and adapter factories
//! - **Services**: Session manager and background health supervisor
//! - **DTOs**: Read-API views of sessions and store health

pub mod dto;
pub mod ports;
pub mod registry;
pub mod services;

pub use dto::*;
pub use ports::*;
pub use registry::{BrokerFactory, BrokerPlugin, BrokerRegistry, PluginInfo};
pub use services::*;

//! Application Ports (Driven)
//!
//! Ports define interfaces for the external systems the engine drives:
//! broker adapters and alert sinks.

mod alert_sink_port;
mod broker_adapter_port;

pub use alert_sink_port::{AlertSinkPort, ChannelAlertSink, NoOpAlertSink, TracingAlertSink};
pub use broker_adapter_port::{
    AuthFlow, AuthResponse, BrokerAdapter, ConnectionResult, Credentials, OAuthResult,
    RefreshResult, TradingResponse, ValidationResult,
};

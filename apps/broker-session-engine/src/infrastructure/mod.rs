//! Infrastructure Layer
//!
//! Adapters implementing the application ports, plus process plumbing.
//!
//! - `brokers`: Direct-auth and OAuth broker adapters
//! - `persistence`: In-memory session store
//! - `config`: YAML configuration loading
//! - `health`: Health, readiness and metrics HTTP endpoint
//! - `telemetry`: Tracing subscriber and OTLP export

pub mod brokers;
pub mod config;
pub mod health;
pub mod persistence;
pub mod telemetry;

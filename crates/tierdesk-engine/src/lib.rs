//! # Tierdesk Engine
//!
//! Wiring and runtime for the Tierdesk core: configuration from the
//! environment, explicit construction of every component, the
//! transport-agnostic operations facade, and the background loops
//! (dispatch and SLA sweep). A concrete deployment wraps the facade with
//! whatever transport it needs; none is assumed here.

pub mod config;
pub mod engine;

pub use config::EngineConfig;
pub use engine::{PostMessageResult, QueueStatus, SupportEngine, SupportEngineBuilder};

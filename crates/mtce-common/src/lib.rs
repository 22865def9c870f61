//! ---
//! mtce_section: "01-core-functionality"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Shared primitives and utilities for the maintenance agent."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
//! Shared primitives for the node maintenance workspace.
//! This crate exposes configuration loading, tracing setup, and the small
//! identity/network types that the heartbeat and node crates agree on.

pub mod config;
pub mod logging;
pub mod time;
pub mod types;

pub use config::{
    AgentConfig, ArCauseConfig, AutoRecoveryConfig, HeartbeatConfig, LoggingConfig,
    LoadedMtceConfig, MetricsConfig, MnfaConfig, MnfaThresholdType, MtceConfig, SystemType,
    TimeoutConfig,
};
pub use logging::{init_tracing, LogFormat, CUSTOMER_LOG_TARGET};
pub use types::{ArCause, HostId, Network, NetworkMap, UnknownValue};

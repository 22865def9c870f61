//! ---
//! mtce_section: "03-persistence-logging"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Structured logging context, macros, and throttling."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! Structured logging helpers shared by the maintenance crates.

use tracing::Level;
use tracing_subscriber::{fmt as subscriber_fmt, prelude::*, EnvFilter, Registry};

pub mod macros;
mod throttle;

#[doc(hidden)]
pub use tracing as __tracing;

pub use throttle::LogThrottle;

/// Install a subscriber whose output is captured by the test harness.
/// `RUST_LOG` raises verbosity when a failing scenario needs tracing.
pub fn init_for_tests() {
    let _ = Registry::default()
        .with(EnvFilter::from_default_env().add_directive(Level::WARN.into()))
        .with(subscriber_fmt::layer().with_test_writer())
        .try_init();
}

/// Context attached to every maintenance log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogContext<'a> {
    /// Hostname the event concerns.
    pub host: Option<&'a str>,
    /// Heartbeat or messaging network.
    pub network: Option<&'a str>,
    /// Administrative action in progress.
    pub action: Option<&'a str>,
    /// Handler stage in progress.
    pub stage: Option<&'a str>,
}

impl<'a> LogContext<'a> {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for a single host.
    pub fn host(host: &'a str) -> Self {
        Self::new().with_host(host)
    }

    /// Attach a hostname.
    pub fn with_host(mut self, host: &'a str) -> Self {
        self.host = Some(host);
        self
    }

    /// Attach a network name.
    pub fn with_network(mut self, network: &'a str) -> Self {
        self.network = Some(network);
        self
    }

    /// Attach the in-progress administrative action.
    pub fn with_action(mut self, action: &'a str) -> Self {
        self.action = Some(action);
        self
    }

    /// Attach the current handler stage.
    pub fn with_stage(mut self, stage: &'a str) -> Self {
        self.stage = Some(stage);
        self
    }
}

/// Outcome attached to lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEventOutcome {
    /// The operation completed.
    Success,
    /// The operation failed or was aborted.
    Fault,
}

impl SystemEventOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            SystemEventOutcome::Success => "success",
            SystemEventOutcome::Fault => "fault",
        }
    }
}

/// Emit a lifecycle event (agent start, DOR entry, MNFA enter/exit and so on).
pub fn log_system_event(
    context: Option<&LogContext>,
    event: &str,
    message: &str,
    outcome: SystemEventOutcome,
) {
    let ctx = context.copied().unwrap_or_default();
    match outcome {
        SystemEventOutcome::Success => tracing::event!(
            Level::INFO,
            event,
            outcome = outcome.as_str(),
            host = ctx.host.unwrap_or(""),
            network = ctx.network.unwrap_or(""),
            message = %message
        ),
        SystemEventOutcome::Fault => tracing::event!(
            Level::ERROR,
            event,
            outcome = outcome.as_str(),
            host = ctx.host.unwrap_or(""),
            network = ctx.network.unwrap_or(""),
            message = %message
        ),
    }
}

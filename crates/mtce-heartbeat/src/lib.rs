//! ---
//! mtce_section: "07-resilience-fault-tolerance"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Heartbeat pulse tracking and loss thresholding."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
//! Heartbeat pulse tracker.
//!
//! Each period a pulse list is built per network from the monitored hosts.
//! Responses splice hosts out of the list; whatever remains at the end of
//! the period is swept into the miss-counting path. Host heartbeat state is
//! owned by the caller's registry and reached through [`PulseHosts`].

mod event;
mod flags;
mod state;
mod tracker;

pub use event::{HeartbeatEvent, HeartbeatEventKind};
pub use flags::PulseFlags;
pub use state::{HbsHost, HbsNetState};
pub use tracker::{PulseConfig, PulseError, PulseHosts, PulseResponse, PulseTracker, SweepReport};

//! ---
//! mtce_section: "07-resilience-fault-tolerance"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Heartbeat pulse tracking and loss thresholding."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
use std::fmt;

use mtce_common::{HostId, Network};

/// Threshold crossing or service-flag change produced by the tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatEvent {
    pub host: HostId,
    pub hostname: String,
    pub kind: HeartbeatEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatEventKind {
    MinorSet(Network),
    MinorClear(Network),
    DegradeSet(Network),
    DegradeClear(Network),
    Loss(Network),
    LossClear(Network),
    PmondMissing,
    PmondClear,
    Stall { unrecovered: bool },
}

impl HeartbeatEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HeartbeatEventKind::MinorSet(_) => "minor-set",
            HeartbeatEventKind::MinorClear(_) => "minor-clear",
            HeartbeatEventKind::DegradeSet(_) => "degrade-set",
            HeartbeatEventKind::DegradeClear(_) => "degrade-clear",
            HeartbeatEventKind::Loss(_) => "loss",
            HeartbeatEventKind::LossClear(_) => "loss-clear",
            HeartbeatEventKind::PmondMissing => "pmond-missing",
            HeartbeatEventKind::PmondClear => "pmond-clear",
            HeartbeatEventKind::Stall { .. } => "stall",
        }
    }

    pub fn network(&self) -> Option<Network> {
        match self {
            HeartbeatEventKind::MinorSet(n)
            | HeartbeatEventKind::MinorClear(n)
            | HeartbeatEventKind::DegradeSet(n)
            | HeartbeatEventKind::DegradeClear(n)
            | HeartbeatEventKind::Loss(n)
            | HeartbeatEventKind::LossClear(n) => Some(*n),
            _ => None,
        }
    }
}

impl fmt::Display for HeartbeatEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind.network() {
            Some(network) => write!(f, "{} {} ({})", self.hostname, self.kind.as_str(), network),
            None => write!(f, "{} {}", self.hostname, self.kind.as_str()),
        }
    }
}

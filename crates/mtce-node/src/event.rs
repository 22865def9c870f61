//! ---
//! mtce_section: "01-core-functionality"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Node maintenance core."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
use mtce_common::Network;

use crate::collab::MtcCommand;
use crate::host::{DegradeCause, HostInfo, MtcAliveFlags};
use crate::state::AdminAction;
use crate::timer::TimerId;

/// Inputs consumed by the maintenance tick, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MtceEvent {
    /// Periodic keepalive from a host's maintenance client.
    MtcAlive {
        hostname: String,
        network: Network,
        sequence: u32,
        uptime: u64,
        flags: MtcAliveFlags,
    },
    GoEnabled {
        hostname: String,
        subf: bool,
        passed: bool,
    },
    HostServices {
        hostname: String,
        subf: bool,
        passed: bool,
    },
    CommandAck {
        hostname: String,
        command: MtcCommand,
    },
    DegradeRaise {
        hostname: String,
        cause: DegradeCause,
    },
    DegradeClear {
        hostname: String,
        cause: DegradeCause,
    },
    ConfigComplete {
        hostname: String,
        passed: bool,
    },
    AdminRequest {
        hostname: String,
        action: AdminAction,
    },
    AddHost(Box<HostInfo>),
    ModifyHost(Box<HostInfo>),
    DeleteHost {
        hostname: String,
    },
    Timer(TimerId),
}

impl MtceEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            MtceEvent::MtcAlive { .. } => "mtcalive",
            MtceEvent::GoEnabled { .. } => "goenabled",
            MtceEvent::HostServices { .. } => "host-services",
            MtceEvent::CommandAck { .. } => "command-ack",
            MtceEvent::DegradeRaise { .. } => "degrade-raise",
            MtceEvent::DegradeClear { .. } => "degrade-clear",
            MtceEvent::ConfigComplete { .. } => "config-complete",
            MtceEvent::AdminRequest { .. } => "admin-request",
            MtceEvent::AddHost(_) => "add-host",
            MtceEvent::ModifyHost(_) => "modify-host",
            MtceEvent::DeleteHost { .. } => "delete-host",
            MtceEvent::Timer(_) => "timer",
        }
    }

    pub fn mtc_alive(hostname: impl Into<String>, network: Network, sequence: u32, uptime: u64) -> Self {
        MtceEvent::MtcAlive {
            hostname: hostname.into(),
            network,
            sequence,
            uptime,
            flags: MtcAliveFlags::NONE,
        }
    }
}

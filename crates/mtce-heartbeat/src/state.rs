//! ---
//! mtce_section: "07-resilience-fault-tolerance"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Heartbeat pulse tracking and loss thresholding."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
use mtce_common::{HostId, Network, NetworkMap};
use mtce_logging::LogThrottle;

/// Heartbeat accounting for one host on one network.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HbsNetState {
    pub monitored: bool,
    /// Consecutive periods without a response.
    pub b2b_misses: u32,
    /// Consecutive periods with a response.
    pub b2b_hits: u32,
    pub lifetime_misses: u64,
    pub minor: bool,
    pub degrade: bool,
    pub failure: bool,
    pub(crate) prev: Option<HostId>,
    pub(crate) next: Option<HostId>,
    pub(crate) linked: bool,
}

impl HbsNetState {
    /// Clear run counters and threshold flags. Lifetime misses are kept.
    pub fn reset(&mut self) {
        self.b2b_misses = 0;
        self.b2b_hits = 0;
        self.minor = false;
        self.degrade = false;
        self.failure = false;
    }

    /// Whether the host is waiting on a response in the current period.
    pub fn is_pending(&self) -> bool {
        self.linked
    }
}

/// Heartbeat state embedded in each registry host.
#[derive(Debug, Clone)]
pub struct HbsHost {
    pub net: NetworkMap<HbsNetState>,
    /// Resource reference index, zero when unassigned.
    pub rri: u32,
    pub clstr_capable: bool,
    pub pmond_missing: u32,
    pub pmond_degraded: bool,
    pub stall_reported: bool,
    pub(crate) loss_throttle: LogThrottle,
    pub(crate) stall_throttle: LogThrottle,
}

impl HbsHost {
    pub fn new(throttle_first: u32, throttle_every: u32) -> Self {
        Self {
            net: NetworkMap::default(),
            rri: 0,
            clstr_capable: false,
            pmond_missing: 0,
            pmond_degraded: false,
            stall_reported: false,
            loss_throttle: LogThrottle::new(throttle_first, throttle_every),
            stall_throttle: LogThrottle::new(throttle_first, throttle_every),
        }
    }

    pub fn is_monitored(&self) -> bool {
        self.net.values().any(|state| state.monitored)
    }

    pub fn any_minor(&self) -> bool {
        self.net.values().any(|state| state.minor)
    }

    pub fn failed_on(&self) -> Option<Network> {
        self.net
            .iter()
            .find(|(_, state)| state.failure)
            .map(|(network, _)| network)
    }
}

impl Default for HbsHost {
    fn default() -> Self {
        Self::new(3, 500)
    }
}

//! ---
//! mtce_section: "07-resilience-fault-tolerance"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Heartbeat pulse tracking and loss thresholding."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
use mtce_common::{HeartbeatConfig, HostId, Network, NetworkMap, SystemType};
use mtce_logging::{slog, LogContext, LogThrottle};
use tracing::{debug, info, warn};

use crate::event::{HeartbeatEvent, HeartbeatEventKind};
use crate::flags::PulseFlags;
use crate::state::HbsHost;

/// Access to the heartbeat state of hosts owned by the registry.
pub trait PulseHosts {
    fn pulse_host(&self, id: HostId) -> Option<&HbsHost>;
    fn pulse_host_mut(&mut self, id: HostId) -> Option<&mut HbsHost>;
    /// Every registry member, in registry order.
    fn pulse_members(&self) -> Vec<HostId>;
    fn find_pulse_host(&self, hostname: &str) -> Option<HostId>;
    fn hostname(&self, id: HostId) -> Option<&str>;
    fn is_controller(&self, id: HostId) -> bool;
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum PulseError {
    #[error("pulse response from unknown host '{0}'")]
    UnknownHost(String),
    #[error("host {0} is no longer in the registry")]
    StaleHost(HostId),
}

/// Thresholds applied by the tracker.
#[derive(Debug, Clone)]
pub struct PulseConfig {
    pub minor_threshold: u32,
    pub degrade_threshold: u32,
    pub failure_threshold: u32,
    pub pulses_required_for_recovery: u32,
    pub pmond_missing_threshold: u32,
    pub clstr_degrade_only: bool,
    pub system_type: SystemType,
    pub throttle_first: u32,
    pub throttle_every: u32,
}

impl PulseConfig {
    pub fn from_config(config: &HeartbeatConfig, system_type: SystemType) -> Self {
        Self {
            minor_threshold: config.minor_threshold,
            degrade_threshold: config.degrade_threshold,
            failure_threshold: config.failure_threshold,
            pulses_required_for_recovery: config.pulses_required_for_recovery,
            pmond_missing_threshold: config.pmond_missing_threshold,
            clstr_degrade_only: config.clstr_degrade_only,
            system_type,
            throttle_first: config.warn_throttle_first,
            throttle_every: config.warn_throttle_every,
        }
    }
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self::from_config(&HeartbeatConfig::default(), SystemType::Standard)
    }
}

/// A pulse response as received from a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PulseResponse {
    pub hostname: String,
    /// Resource reference index echoed back by the host, zero if none.
    pub rri: u32,
    pub flags: PulseFlags,
    /// Zero the host's miss accounting before counting this response.
    pub clear_counters: bool,
}

impl PulseResponse {
    pub fn new(hostname: impl Into<String>, rri: u32, flags: PulseFlags) -> Self {
        Self {
            hostname: hostname.into(),
            rri,
            flags,
            clear_counters: false,
        }
    }
}

/// Outcome of an end-of-period sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub lost: usize,
    pub events: Vec<HeartbeatEvent>,
}

#[derive(Debug, Clone, Copy, Default)]
struct PulseList {
    head: Option<HostId>,
    tail: Option<HostId>,
    count: usize,
}

/// Per-network pulse lists plus the resource reference array.
#[derive(Debug)]
pub struct PulseTracker {
    config: PulseConfig,
    lists: NetworkMap<PulseList>,
    rra: Vec<Option<HostId>>,
    mismatch: LogThrottle,
}

impl PulseTracker {
    pub fn new(config: PulseConfig) -> Self {
        let mismatch = LogThrottle::new(config.throttle_first, config.throttle_every);
        Self {
            config,
            lists: NetworkMap::default(),
            rra: vec![None],
            mismatch,
        }
    }

    pub fn config(&self) -> &PulseConfig {
        &self.config
    }

    /// Fresh heartbeat state using this tracker's throttle settings.
    pub fn new_host_state(&self) -> HbsHost {
        HbsHost::new(self.config.throttle_first, self.config.throttle_every)
    }

    /// Rebuild the index → host table from current registry membership.
    ///
    /// Index zero is reserved for "no index". Returns the number of hosts indexed.
    pub fn build_rra<H: PulseHosts>(&mut self, hosts: &mut H) -> usize {
        let members = hosts.pulse_members();
        self.rra.clear();
        self.rra.push(None);
        for id in members {
            let rri = self.rra.len() as u32;
            if let Some(host) = hosts.pulse_host_mut(id) {
                host.rri = rri;
                self.rra.push(Some(id));
            }
        }
        debug!(entries = self.rra.len() - 1, "resource reference array rebuilt");
        self.rra.len() - 1
    }

    pub fn rra_lookup(&self, rri: u32) -> Option<HostId> {
        self.rra.get(rri as usize).copied().flatten()
    }

    /// Start a period: every monitored host on `network` is put on the pulse list.
    ///
    /// Hosts left over from an unswept period are dropped from the list first.
    pub fn create_pulse_list<H: PulseHosts>(&mut self, hosts: &mut H, network: Network) -> usize {
        self.clear_list(hosts, network);
        for id in hosts.pulse_members() {
            let monitored = hosts
                .pulse_host(id)
                .map(|host| host.net[network].monitored)
                .unwrap_or(false);
            if monitored {
                self.append(hosts, id, network);
            }
        }
        self.lists[network].count
    }

    /// Number of hosts still awaiting a response on `network`.
    pub fn pending(&self, network: Network) -> usize {
        self.lists[network].count
    }

    /// Hosts awaiting a response, head to tail.
    pub fn pulse_list<H: PulseHosts>(&self, hosts: &H, network: Network) -> Vec<HostId> {
        let mut out = Vec::with_capacity(self.lists[network].count);
        let mut cursor = self.lists[network].head;
        while let Some(id) = cursor {
            out.push(id);
            if out.len() > self.lists[network].count {
                slog!(
                    context = LogContext::new().with_network(network.as_str()),
                    "pulse list walk exceeds count {}",
                    self.lists[network].count
                );
                break;
            }
            cursor = hosts.pulse_host(id).and_then(|host| host.net[network].next);
        }
        out
    }

    /// Account for a pulse response.
    ///
    /// The host is resolved through the resource reference array first and by
    /// name when the index is missing or stale. Service flags are only read
    /// from management network responses.
    pub fn remove_pulse<H: PulseHosts>(
        &mut self,
        hosts: &mut H,
        network: Network,
        response: &PulseResponse,
    ) -> Result<Vec<HeartbeatEvent>, PulseError> {
        let id = self.resolve(hosts, response)?;
        let mut events = Vec::new();

        if network == Network::Mgmnt {
            events.extend(self.manage_pulse_flags(hosts, id, response.flags));
        }

        let required = self.config.pulses_required_for_recovery;
        let host = hosts.pulse_host_mut(id).ok_or(PulseError::StaleHost(id))?;
        let state = &mut host.net[network];
        if !state.linked {
            debug!(
                host = %response.hostname,
                network = network.as_str(),
                monitored = state.monitored,
                "pulse response from host not on the pulse list"
            );
            return Ok(events);
        }

        if response.clear_counters {
            state.b2b_misses = 0;
            state.b2b_hits = 0;
            state.lifetime_misses = 0;
        }
        state.b2b_hits = state.b2b_hits.saturating_add(1);
        state.b2b_misses = 0;

        let mut kinds = Vec::new();
        if state.failure {
            if state.b2b_hits >= required {
                state.failure = false;
                kinds.push(HeartbeatEventKind::LossClear(network));
            } else {
                debug!(
                    host = %response.hostname,
                    network = network.as_str(),
                    hits = state.b2b_hits,
                    required,
                    "heartbeat recovering"
                );
            }
        }
        if !state.failure {
            if state.degrade {
                state.degrade = false;
                kinds.push(HeartbeatEventKind::DegradeClear(network));
            }
            if state.minor {
                state.minor = false;
                kinds.push(HeartbeatEventKind::MinorClear(network));
            }
        }
        if !kinds.is_empty() {
            host.loss_throttle.reset();
            info!(host = %response.hostname, network = network.as_str(), "heartbeat restored");
        }
        events.extend(kinds.into_iter().map(|kind| HeartbeatEvent {
            host: id,
            hostname: response.hostname.clone(),
            kind,
        }));

        self.unlink(hosts, id, network);
        Ok(events)
    }

    /// End a period: every host still on the list missed its pulse.
    pub fn sweep_losses<H: PulseHosts>(&mut self, hosts: &mut H, network: Network) -> SweepReport {
        let missing = self.pulse_list(hosts, network);
        let mut report = SweepReport {
            lost: missing.len(),
            events: Vec::new(),
        };

        for id in missing {
            let hostname = hosts.hostname(id).unwrap_or_default().to_owned();
            let degrade_only = network == Network::Clstr
                && (self.config.clstr_degrade_only
                    || (self.config.system_type == SystemType::Standard
                        && hosts.is_controller(id)));
            let Some(host) = hosts.pulse_host_mut(id) else {
                continue;
            };
            let state = &mut host.net[network];
            state.b2b_misses = state.b2b_misses.saturating_add(1);
            state.lifetime_misses = state.lifetime_misses.saturating_add(1);
            state.b2b_hits = 0;
            let misses = state.b2b_misses;

            let mut kinds = Vec::new();
            if misses >= self.config.minor_threshold && !state.minor {
                state.minor = true;
                kinds.push(HeartbeatEventKind::MinorSet(network));
            }
            if misses >= self.config.degrade_threshold && !state.degrade {
                state.degrade = true;
                kinds.push(HeartbeatEventKind::DegradeSet(network));
            }
            if misses >= self.config.failure_threshold {
                if degrade_only {
                    if host.loss_throttle.should_log() {
                        warn!(
                            host = %hostname,
                            network = network.as_str(),
                            misses,
                            "heartbeat loss held at degrade"
                        );
                    }
                } else if !state.failure {
                    state.failure = true;
                    kinds.push(HeartbeatEventKind::Loss(network));
                    warn!(host = %hostname, network = network.as_str(), misses, "heartbeat loss");
                } else if host.loss_throttle.should_log() {
                    warn!(
                        host = %hostname,
                        network = network.as_str(),
                        misses,
                        "heartbeat still lost"
                    );
                }
            } else if !kinds.is_empty() {
                info!(host = %hostname, network = network.as_str(), misses, "heartbeat missing");
            }

            report.events.extend(kinds.into_iter().map(|kind| HeartbeatEvent {
                host: id,
                hostname: hostname.clone(),
                kind,
            }));
        }

        self.clear_list(hosts, network);
        report
    }

    /// Apply service flags from a management network response.
    pub fn manage_pulse_flags<H: PulseHosts>(
        &mut self,
        hosts: &mut H,
        id: HostId,
        flags: PulseFlags,
    ) -> Vec<HeartbeatEvent> {
        let hostname = hosts.hostname(id).unwrap_or_default().to_owned();
        let pmond_threshold = self.config.pmond_missing_threshold;
        let mut kinds = Vec::new();
        let clstr_change;
        {
            let Some(host) = hosts.pulse_host_mut(id) else {
                return Vec::new();
            };

            if flags.contains(PulseFlags::CLSTR_CAPABLE) && !host.clstr_capable {
                host.clstr_capable = true;
                info!(host = %hostname, "cluster-host network heartbeat capable");
            }
            let want_clstr = host.net[Network::Mgmnt].monitored && host.clstr_capable;
            clstr_change = (host.net[Network::Clstr].monitored != want_clstr).then_some(want_clstr);

            if flags.contains(PulseFlags::PMOND) {
                host.pmond_missing = 0;
                if host.pmond_degraded {
                    host.pmond_degraded = false;
                    kinds.push(HeartbeatEventKind::PmondClear);
                }
            } else {
                host.pmond_missing = host.pmond_missing.saturating_add(1);
                if host.pmond_missing > pmond_threshold && !host.pmond_degraded {
                    host.pmond_degraded = true;
                    warn!(host = %hostname, periods = host.pmond_missing, "process monitor not running");
                    kinds.push(HeartbeatEventKind::PmondMissing);
                }
            }

            if flags.is_stalled() {
                if !host.stall_reported {
                    host.stall_reported = true;
                    kinds.push(HeartbeatEventKind::Stall {
                        unrecovered: flags.contains(PulseFlags::STALL_ERROR),
                    });
                    warn!(host = %hostname, %flags, "host stall reported");
                } else if host.stall_throttle.should_log() {
                    warn!(host = %hostname, %flags, "host stall persists");
                }
            } else if host.stall_reported {
                host.stall_reported = false;
                host.stall_throttle.reset();
            }
        }

        if let Some(enable) = clstr_change {
            self.set_monitoring(hosts, id, Network::Clstr, enable);
        }

        kinds
            .into_iter()
            .map(|kind| HeartbeatEvent {
                host: id,
                hostname: hostname.clone(),
                kind,
            })
            .collect()
    }

    /// Start or stop monitoring one network. Counters and flags are reset.
    ///
    /// The cluster-host network follows the management network: it is only
    /// monitored while management is and the host has declared capability.
    pub fn set_monitoring<H: PulseHosts>(
        &mut self,
        hosts: &mut H,
        id: HostId,
        network: Network,
        enable: bool,
    ) {
        if !enable {
            self.unlink(hosts, id, network);
        }
        let Some(host) = hosts.pulse_host_mut(id) else {
            return;
        };
        let enable = if network == Network::Clstr {
            enable && host.net[Network::Mgmnt].monitored && host.clstr_capable
        } else {
            enable
        };
        host.net[network].monitored = enable;
        host.net[network].reset();
        if network == Network::Mgmnt {
            host.pmond_missing = 0;
            host.pmond_degraded = false;
            let clstr = enable && host.clstr_capable;
            if host.net[Network::Clstr].monitored != clstr {
                self.set_monitoring(hosts, id, Network::Clstr, clstr);
            }
        }
    }

    /// Stop monitoring a host on every network.
    pub fn stop_host<H: PulseHosts>(&mut self, hosts: &mut H, id: HostId) {
        for network in Network::ALL {
            self.set_monitoring(hosts, id, network, false);
        }
    }

    /// Clear counters and flags on every monitored network without stopping.
    pub fn restart_host<H: PulseHosts>(&mut self, hosts: &mut H, id: HostId) {
        if let Some(host) = hosts.pulse_host_mut(id) {
            for (_, state) in host.net.iter_mut() {
                if state.monitored {
                    state.reset();
                }
            }
            host.pmond_missing = 0;
            host.loss_throttle.reset();
        }
    }

    /// Drop a host from every pulse list ahead of its removal from the registry.
    pub fn remove_host<H: PulseHosts>(&mut self, hosts: &mut H, id: HostId) {
        for network in Network::ALL {
            self.unlink(hosts, id, network);
        }
        for slot in self.rra.iter_mut() {
            if *slot == Some(id) {
                *slot = None;
            }
        }
    }

    fn resolve<H: PulseHosts>(
        &mut self,
        hosts: &H,
        response: &PulseResponse,
    ) -> Result<HostId, PulseError> {
        if response.rri != 0 {
            if let Some(id) = self.rra_lookup(response.rri) {
                if hosts.hostname(id) == Some(response.hostname.as_str()) {
                    return Ok(id);
                }
            }
            if self.mismatch.should_log() {
                warn!(
                    host = %response.hostname,
                    rri = response.rri,
                    occurrences = self.mismatch.count(),
                    "resource reference mismatch; falling back to name lookup"
                );
            }
        }
        hosts
            .find_pulse_host(&response.hostname)
            .ok_or_else(|| PulseError::UnknownHost(response.hostname.clone()))
    }

    fn append<H: PulseHosts>(&mut self, hosts: &mut H, id: HostId, network: Network) {
        let tail = self.lists[network].tail;
        match hosts.pulse_host_mut(id) {
            Some(host) if !host.net[network].linked => {
                let state = &mut host.net[network];
                state.prev = tail;
                state.next = None;
                state.linked = true;
            }
            _ => return,
        }
        match tail.and_then(|t| hosts.pulse_host_mut(t)) {
            Some(tail_host) => tail_host.net[network].next = Some(id),
            None => self.lists[network].head = Some(id),
        }
        self.lists[network].tail = Some(id);
        self.lists[network].count += 1;
    }

    fn unlink<H: PulseHosts>(&mut self, hosts: &mut H, id: HostId, network: Network) -> bool {
        let (prev, next) = match hosts.pulse_host_mut(id) {
            Some(host) if host.net[network].linked => {
                let state = &mut host.net[network];
                let links = (state.prev.take(), state.next.take());
                state.linked = false;
                links
            }
            _ => return false,
        };

        let list = &mut self.lists[network];
        match (prev, next) {
            (None, None) => {
                if list.head != Some(id) || list.tail != Some(id) {
                    slog!(
                        context = LogContext::new().with_network(network.as_str()),
                        "single-entry splice of {} with head {:?} tail {:?}",
                        id,
                        list.head,
                        list.tail
                    );
                }
                list.head = None;
                list.tail = None;
            }
            (None, Some(n)) => {
                list.head = Some(n);
                if let Some(host) = hosts.pulse_host_mut(n) {
                    host.net[network].prev = None;
                }
            }
            (Some(p), None) => {
                list.tail = Some(p);
                if let Some(host) = hosts.pulse_host_mut(p) {
                    host.net[network].next = None;
                }
            }
            (Some(p), Some(n)) => {
                if let Some(host) = hosts.pulse_host_mut(p) {
                    host.net[network].next = Some(n);
                }
                if let Some(host) = hosts.pulse_host_mut(n) {
                    host.net[network].prev = Some(p);
                }
            }
        }
        let list = &mut self.lists[network];
        list.count = list.count.saturating_sub(1);
        true
    }

    fn clear_list<H: PulseHosts>(&mut self, hosts: &mut H, network: Network) {
        let mut cursor = self.lists[network].head;
        let mut walked = 0usize;
        while let Some(id) = cursor {
            walked += 1;
            cursor = match hosts.pulse_host_mut(id) {
                Some(host) => {
                    let state = &mut host.net[network];
                    state.prev = None;
                    state.linked = false;
                    state.next.take()
                }
                None => None,
            };
            if walked > self.lists[network].count {
                break;
            }
        }
        self.lists[network] = PulseList::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Fleet {
        hosts: Vec<(String, bool, HbsHost)>,
    }

    impl Fleet {
        fn with(names: &[&str]) -> Self {
            let hosts = names
                .iter()
                .map(|name| {
                    let mut hbs = HbsHost::default();
                    hbs.net[Network::Mgmnt].monitored = true;
                    (name.to_string(), name.starts_with("controller"), hbs)
                })
                .collect();
            Self { hosts }
        }

        fn id(&self, name: &str) -> HostId {
            self.find_pulse_host(name).unwrap()
        }
    }

    impl PulseHosts for Fleet {
        fn pulse_host(&self, id: HostId) -> Option<&HbsHost> {
            self.hosts.get(id.index()).map(|(_, _, h)| h)
        }
        fn pulse_host_mut(&mut self, id: HostId) -> Option<&mut HbsHost> {
            self.hosts.get_mut(id.index()).map(|(_, _, h)| h)
        }
        fn pulse_members(&self) -> Vec<HostId> {
            (0..self.hosts.len() as u32).map(|i| HostId::new(i, 0)).collect()
        }
        fn find_pulse_host(&self, hostname: &str) -> Option<HostId> {
            self.hosts
                .iter()
                .position(|(name, _, _)| name == hostname)
                .map(|i| HostId::new(i as u32, 0))
        }
        fn hostname(&self, id: HostId) -> Option<&str> {
            self.hosts.get(id.index()).map(|(name, _, _)| name.as_str())
        }
        fn is_controller(&self, id: HostId) -> bool {
            self.hosts.get(id.index()).map(|(_, c, _)| *c).unwrap_or(false)
        }
    }

    #[test]
    fn splices_head_middle_and_tail() {
        let mut fleet = Fleet::with(&["a", "b", "c", "d"]);
        let mut tracker = PulseTracker::new(PulseConfig::default());
        tracker.build_rra(&mut fleet);
        assert_eq!(tracker.create_pulse_list(&mut fleet, Network::Mgmnt), 4);

        for name in ["b", "a", "d"] {
            tracker
                .remove_pulse(&mut fleet, Network::Mgmnt, &PulseResponse::new(name, 0, PulseFlags::PMOND))
                .unwrap();
        }
        assert_eq!(tracker.pulse_list(&fleet, Network::Mgmnt), vec![fleet.id("c")]);
        tracker
            .remove_pulse(&mut fleet, Network::Mgmnt, &PulseResponse::new("c", 0, PulseFlags::PMOND))
            .unwrap();
        assert_eq!(tracker.pending(Network::Mgmnt), 0);
        assert!(tracker.pulse_list(&fleet, Network::Mgmnt).is_empty());
    }

    #[test]
    fn stale_index_falls_back_to_name() {
        let mut fleet = Fleet::with(&["a", "b"]);
        let mut tracker = PulseTracker::new(PulseConfig::default());
        tracker.build_rra(&mut fleet);
        tracker.create_pulse_list(&mut fleet, Network::Mgmnt);
        let wrong_index = fleet.pulse_host(fleet.id("a")).unwrap().rri;
        tracker
            .remove_pulse(&mut fleet, Network::Mgmnt, &PulseResponse::new("b", wrong_index, PulseFlags::PMOND))
            .unwrap();
        assert_eq!(tracker.pulse_list(&fleet, Network::Mgmnt), vec![fleet.id("a")]);

        let err = tracker
            .remove_pulse(&mut fleet, Network::Mgmnt, &PulseResponse::new("zz", 0, PulseFlags::NONE))
            .unwrap_err();
        assert_eq!(err, PulseError::UnknownHost("zz".into()));
    }

    #[test]
    fn clstr_follows_mgmnt_and_capability() {
        let mut fleet = Fleet::with(&["compute-0"]);
        let mut tracker = PulseTracker::new(PulseConfig::default());
        let id = fleet.id("compute-0");
        tracker.manage_pulse_flags(&mut fleet, id, PulseFlags::PMOND);
        assert!(!fleet.pulse_host(id).unwrap().net[Network::Clstr].monitored);

        tracker.manage_pulse_flags(&mut fleet, id, PulseFlags::PMOND | PulseFlags::CLSTR_CAPABLE);
        assert!(fleet.pulse_host(id).unwrap().net[Network::Clstr].monitored);

        tracker.set_monitoring(&mut fleet, id, Network::Mgmnt, false);
        assert!(!fleet.pulse_host(id).unwrap().net[Network::Clstr].monitored);
        tracker.set_monitoring(&mut fleet, id, Network::Mgmnt, true);
        assert!(fleet.pulse_host(id).unwrap().net[Network::Clstr].monitored);
    }

    #[test]
    fn controller_clstr_loss_degrades_only_on_standard() {
        let mut fleet = Fleet::with(&["controller-1"]);
        let id = fleet.id("controller-1");
        let hbs = fleet.pulse_host_mut(id).unwrap();
        hbs.clstr_capable = true;
        hbs.net[Network::Clstr].monitored = true;

        let mut tracker = PulseTracker::new(PulseConfig::default());
        let mut kinds = Vec::new();
        for _ in 0..12 {
            tracker.create_pulse_list(&mut fleet, Network::Clstr);
            let report = tracker.sweep_losses(&mut fleet, Network::Clstr);
            kinds.extend(report.events.into_iter().map(|e| e.kind));
        }
        assert_eq!(
            kinds,
            vec![
                HeartbeatEventKind::MinorSet(Network::Clstr),
                HeartbeatEventKind::DegradeSet(Network::Clstr)
            ]
        );
        assert!(!fleet.pulse_host(id).unwrap().net[Network::Clstr].failure);
    }

    #[test]
    fn pmond_missing_raises_once_and_clears() {
        let config = PulseConfig {
            pmond_missing_threshold: 2,
            ..PulseConfig::default()
        };
        let mut fleet = Fleet::with(&["compute-0"]);
        let id = fleet.id("compute-0");
        let mut tracker = PulseTracker::new(config);
        let mut kinds = Vec::new();
        for _ in 0..5 {
            kinds.extend(tracker.manage_pulse_flags(&mut fleet, id, PulseFlags::NONE).into_iter().map(|e| e.kind));
        }
        assert_eq!(kinds, vec![HeartbeatEventKind::PmondMissing]);
        let cleared = tracker.manage_pulse_flags(&mut fleet, id, PulseFlags::PMOND);
        assert_eq!(cleared[0].kind, HeartbeatEventKind::PmondClear);
    }

    #[test]
    fn stall_is_reported_once_per_episode() {
        let mut fleet = Fleet::with(&["compute-0"]);
        let id = fleet.id("compute-0");
        let mut tracker = PulseTracker::new(PulseConfig::default());
        let stalled = PulseFlags::PMOND | PulseFlags::STALL_REC;
        assert_eq!(tracker.manage_pulse_flags(&mut fleet, id, stalled).len(), 1);
        assert!(tracker.manage_pulse_flags(&mut fleet, id, stalled).is_empty());
        assert!(tracker.manage_pulse_flags(&mut fleet, id, PulseFlags::PMOND).is_empty());
        let again = tracker.manage_pulse_flags(&mut fleet, id, PulseFlags::STALL_ERROR | PulseFlags::PMOND);
        assert_eq!(again[0].kind, HeartbeatEventKind::Stall { unrecovered: true });
    }
}

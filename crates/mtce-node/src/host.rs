//! ---
//! mtce_section: "01-core-functionality"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Node maintenance core."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
//! The per-host maintenance record.

use std::collections::VecDeque;
use std::fmt;

use mtce_common::{ArCause, HostId, NetworkMap};
use mtce_heartbeat::HbsHost;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};

use crate::alarm::AlarmCache;
use crate::error::{MtceError, Result};
use crate::mtce_info::MtceInfo;
use crate::stage::{Stage, Stages};
use crate::state::{AdminAction, AdminState, AvailStatus, Clamped, NodeType, OperState};
use crate::timer::HostTimers;

/// Board management controller provisioning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BmcInfo {
    pub ip: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub protocol: String,
}

impl BmcInfo {
    pub fn is_provisioned(&self) -> bool {
        !self.ip.is_empty() && !self.username.is_empty()
    }
}

/// Inventory-facing description of a host, used for add and modify.
///
/// State fields are decoded leniently: an unknown value is logged and
/// clamped rather than rejecting the whole record.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostInfo {
    pub hostname: String,
    pub uuid: String,
    #[serde(default)]
    pub mgmt_ip: String,
    #[serde(default)]
    pub mgmt_mac: String,
    #[serde(default)]
    pub clstr_ip: String,
    #[serde(default)]
    pub clstr_mac: String,
    #[serde(default)]
    pub pxeboot_ip: String,
    #[serde(default)]
    pub pxeboot_hostname: String,
    #[serde_as(as = "DisplayFromStr")]
    pub personality: NodeType,
    #[serde(default)]
    #[serde_as(as = "DisplayFromStr")]
    pub subfunctions: NodeType,
    #[serde(default = "default_admin")]
    pub admin_state: AdminState,
    #[serde(default = "default_oper")]
    pub oper_state: OperState,
    #[serde(default = "default_avail")]
    pub avail_status: AvailStatus,
    #[serde(default)]
    pub bmc: BmcInfo,
    #[serde(default)]
    pub storage_monitor: bool,
    #[serde(default)]
    pub peer_group: Option<String>,
    #[serde(default)]
    pub mtce_info: MtceInfo,
}

/// Wire form of [`HostInfo`] with the state fields still as text.
#[serde_as]
#[derive(Deserialize)]
struct HostInfoRecord {
    hostname: String,
    uuid: String,
    #[serde(default)]
    mgmt_ip: String,
    #[serde(default)]
    mgmt_mac: String,
    #[serde(default)]
    clstr_ip: String,
    #[serde(default)]
    clstr_mac: String,
    #[serde(default)]
    pxeboot_ip: String,
    #[serde(default)]
    pxeboot_hostname: String,
    #[serde_as(as = "DisplayFromStr")]
    personality: NodeType,
    #[serde(default)]
    #[serde_as(as = "DisplayFromStr")]
    subfunctions: NodeType,
    admin_state: Option<String>,
    oper_state: Option<String>,
    avail_status: Option<String>,
    #[serde(default)]
    bmc: BmcInfo,
    #[serde(default)]
    storage_monitor: bool,
    #[serde(default)]
    peer_group: Option<String>,
    #[serde(default)]
    mtce_info: MtceInfo,
}

impl From<HostInfoRecord> for HostInfo {
    fn from(record: HostInfoRecord) -> Self {
        let name = record.hostname.as_str();
        let admin_state = record
            .admin_state
            .as_deref()
            .map_or_else(default_admin, |text| AdminState::from_text_clamped(text, name));
        let oper_state = record
            .oper_state
            .as_deref()
            .map_or_else(default_oper, |text| OperState::from_text_clamped(text, name));
        let avail_status = record
            .avail_status
            .as_deref()
            .map_or_else(default_avail, |text| AvailStatus::from_text_clamped(text, name));
        Self {
            admin_state,
            oper_state,
            avail_status,
            hostname: record.hostname,
            uuid: record.uuid,
            mgmt_ip: record.mgmt_ip,
            mgmt_mac: record.mgmt_mac,
            clstr_ip: record.clstr_ip,
            clstr_mac: record.clstr_mac,
            pxeboot_ip: record.pxeboot_ip,
            pxeboot_hostname: record.pxeboot_hostname,
            personality: record.personality,
            subfunctions: record.subfunctions,
            bmc: record.bmc,
            storage_monitor: record.storage_monitor,
            peer_group: record.peer_group,
            mtce_info: record.mtce_info,
        }
    }
}

impl<'de> Deserialize<'de> for HostInfo {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        HostInfoRecord::deserialize(deserializer).map(HostInfo::from)
    }
}

fn default_admin() -> AdminState {
    AdminState::Locked
}

fn default_oper() -> OperState {
    OperState::Disabled
}

fn default_avail() -> AvailStatus {
    AvailStatus::Offline
}

impl HostInfo {
    pub fn new(hostname: impl Into<String>, uuid: impl Into<String>, personality: NodeType) -> Self {
        Self {
            hostname: hostname.into(),
            uuid: uuid.into(),
            mgmt_ip: String::new(),
            mgmt_mac: String::new(),
            clstr_ip: String::new(),
            clstr_mac: String::new(),
            pxeboot_ip: String::new(),
            pxeboot_hostname: String::new(),
            personality,
            subfunctions: NodeType::NONE,
            admin_state: default_admin(),
            oper_state: default_oper(),
            avail_status: default_avail(),
            bmc: BmcInfo::default(),
            storage_monitor: false,
            peer_group: None,
            mtce_info: MtceInfo::new(),
        }
    }

    pub fn with_mgmt(mut self, ip: impl Into<String>, mac: impl Into<String>) -> Self {
        self.mgmt_ip = ip.into();
        self.mgmt_mac = mac.into();
        self
    }

    pub fn with_clstr(mut self, ip: impl Into<String>, mac: impl Into<String>) -> Self {
        self.clstr_ip = ip.into();
        self.clstr_mac = mac.into();
        self
    }

    pub fn with_subfunctions(mut self, subfunctions: NodeType) -> Self {
        self.subfunctions = subfunctions;
        self
    }

    pub fn with_states(mut self, admin: AdminState, oper: OperState, avail: AvailStatus) -> Self {
        self.admin_state = admin;
        self.oper_state = oper;
        self.avail_status = avail;
        self
    }

    pub fn with_bmc(mut self, bmc: BmcInfo) -> Self {
        self.bmc = bmc;
        self
    }

    pub fn with_storage_monitor(mut self, monitor: bool) -> Self {
        self.storage_monitor = monitor;
        self
    }

    pub fn with_peer_group(mut self, group: impl Into<String>) -> Self {
        self.peer_group = Some(group.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.hostname.trim().is_empty() {
            return Err(MtceError::EmptyField("hostname"));
        }
        if self.uuid.trim().is_empty() {
            return Err(MtceError::EmptyField("uuid"));
        }
        if self.personality.is_empty() {
            return Err(MtceError::InvalidValue {
                field: "personality",
                value: self.personality.to_string(),
            });
        }
        Ok(())
    }
}

/// Per-network mtcAlive bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MtcAliveState {
    pub sequence: u32,
    /// A message arrived since the last audit consumed this flag.
    pub received: bool,
    pub misses: u32,
    pub total: u64,
}

impl MtcAliveState {
    pub fn reset(&mut self) {
        *self = Self {
            sequence: self.sequence,
            ..Self::default()
        };
    }
}

/// Flags carried by mtcAlive messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MtcAliveFlags(u32);

impl MtcAliveFlags {
    pub const NONE: MtcAliveFlags = MtcAliveFlags(0);
    pub const CONFIG_COMPLETE: MtcAliveFlags = MtcAliveFlags(1 << 0);
    pub const CONFIG_FAIL: MtcAliveFlags = MtcAliveFlags(1 << 1);
    pub const SUBF_CONFIG_FAIL: MtcAliveFlags = MtcAliveFlags(1 << 2);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn contains(&self, other: MtcAliveFlags) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for MtcAliveFlags {
    type Output = MtcAliveFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        MtcAliveFlags(self.0 | rhs.0)
    }
}

mtce_enum! {
    /// Sources that can hold a host in the degraded state.
    pub enum DegradeCause: "degrade cause" {
        HbsMgmnt => "heartbeat-mgmnt",
        HbsClstr => "heartbeat-clstr",
        Pmond => "pmond",
        Hwmon => "hwmon",
        Collectd => "collectd",
        Config => "config",
    }
}

/// Bitmask of active degrade causes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DegradeMask(u32);

impl DegradeMask {
    pub fn set(&mut self, cause: DegradeCause) -> bool {
        let before = self.0;
        self.0 |= 1 << cause.raw();
        before != self.0
    }

    pub fn clear(&mut self, cause: DegradeCause) -> bool {
        let before = self.0;
        self.0 &= !(1 << cause.raw());
        before != self.0
    }

    pub fn contains(&self, cause: DegradeCause) -> bool {
        self.0 & (1 << cause.raw()) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for DegradeMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = DegradeCause::ALL
            .iter()
            .filter(|cause| self.contains(**cause))
            .map(|cause| cause.as_str())
            .collect();
        write!(f, "0x{:02x} [{}]", self.0, names.join(","))
    }
}

/// Auto-recovery bookkeeping for one host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArState {
    pub counts: [u32; 4],
    pub cause: Option<ArCause>,
    pub disabled: bool,
}

impl ArState {
    pub fn count(&self, cause: ArCause) -> u32 {
        self.counts[cause.index()]
    }
}

/// Results and counters reported to the handler FSMs while an action runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Progress {
    pub retries: u32,
    pub goenabled: Option<bool>,
    pub goenabled_subf: Option<bool>,
    pub host_services: Option<bool>,
    pub host_services_subf: Option<bool>,
    pub command_ack: bool,
    pub heartbeat_failed: bool,
    pub offline_misses: u32,
    pub online_hits: u32,
    pub online_misses: u32,
    pub config_result: Option<bool>,
    pub powercycle_attempts: u32,
    pub failure_cause: Option<ArCause>,
}

/// The maintenance record of a single host.
#[derive(Debug, Clone)]
pub struct Host {
    pub hostname: String,
    pub uuid: String,
    pub mgmt_ip: String,
    pub mgmt_mac: String,
    pub clstr_ip: String,
    pub clstr_mac: String,
    pub pxeboot_ip: String,
    pub pxeboot_hostname: String,
    pub personality: NodeType,
    pub subfunctions: NodeType,
    pub bmc: BmcInfo,
    pub storage_monitor: bool,
    pub peer_group: Option<String>,
    pub mtce_info: MtceInfo,

    pub(crate) admin_state: AdminState,
    pub(crate) oper_state: OperState,
    pub(crate) avail_status: AvailStatus,
    pub(crate) oper_state_subf: OperState,
    pub(crate) avail_status_subf: AvailStatus,
    pub(crate) admin_action: AdminAction,
    pub(crate) action_queue: VecDeque<AdminAction>,
    pub(crate) stages: Stages,
    pub(crate) progress: Progress,

    pub hbs: HbsHost,
    pub(crate) hbs_minor: NetworkMap<bool>,
    pub(crate) mnfa_graceful_recovery: bool,

    pub(crate) mtc_alive: NetworkMap<MtcAliveState>,
    pub(crate) mtc_alive_flags: MtcAliveFlags,
    /// Closed gate: mtcAlive messages are ignored until an FSM reopens it.
    pub(crate) mtc_alive_gate: bool,
    pub(crate) mtc_alive_online: bool,
    pub(crate) mtc_alive_offline: bool,
    pub(crate) online_log_reported: bool,
    pub(crate) offline_log_reported: bool,

    pub(crate) alarms: AlarmCache,
    pub(crate) ar: ArState,
    pub(crate) degrade_mask: DegradeMask,
    pub(crate) bmc_accessible: bool,
    pub(crate) task: String,
    pub(crate) uptime: u64,
    pub(crate) timers: HostTimers,

    pub(crate) prev: Option<HostId>,
    pub(crate) next: Option<HostId>,
}

impl Host {
    pub fn new(info: HostInfo, hbs: HbsHost) -> Self {
        let mut hbs = hbs;
        hbs.clstr_capable = !info.clstr_ip.is_empty();
        Self {
            hostname: info.hostname,
            uuid: info.uuid,
            mgmt_ip: info.mgmt_ip,
            mgmt_mac: info.mgmt_mac,
            clstr_ip: info.clstr_ip,
            clstr_mac: info.clstr_mac,
            pxeboot_ip: info.pxeboot_ip,
            pxeboot_hostname: info.pxeboot_hostname,
            personality: info.personality,
            subfunctions: info.subfunctions,
            bmc: info.bmc,
            storage_monitor: info.storage_monitor,
            peer_group: info.peer_group,
            mtce_info: info.mtce_info,
            admin_state: info.admin_state,
            oper_state: info.oper_state,
            avail_status: info.avail_status,
            oper_state_subf: OperState::Disabled,
            avail_status_subf: AvailStatus::NotInstalled,
            admin_action: AdminAction::None,
            action_queue: VecDeque::new(),
            stages: Stages::default(),
            progress: Progress::default(),
            hbs,
            hbs_minor: NetworkMap::default(),
            mnfa_graceful_recovery: false,
            mtc_alive: NetworkMap::default(),
            mtc_alive_flags: MtcAliveFlags::NONE,
            mtc_alive_gate: false,
            mtc_alive_online: false,
            mtc_alive_offline: false,
            online_log_reported: false,
            offline_log_reported: false,
            alarms: AlarmCache::default(),
            ar: ArState::default(),
            degrade_mask: DegradeMask::default(),
            bmc_accessible: false,
            task: String::new(),
            uptime: 0,
            timers: HostTimers::default(),
            prev: None,
            next: None,
        }
    }

    pub fn admin_state(&self) -> AdminState {
        self.admin_state
    }

    pub fn oper_state(&self) -> OperState {
        self.oper_state
    }

    pub fn avail_status(&self) -> AvailStatus {
        self.avail_status
    }

    pub fn oper_state_subf(&self) -> OperState {
        self.oper_state_subf
    }

    pub fn avail_status_subf(&self) -> AvailStatus {
        self.avail_status_subf
    }

    pub fn admin_action(&self) -> AdminAction {
        self.admin_action
    }

    pub fn queued_actions(&self) -> impl Iterator<Item = AdminAction> + '_ {
        self.action_queue.iter().copied()
    }

    pub fn stages(&self) -> &Stages {
        &self.stages
    }

    /// Current stage of the given FSM, `None` when a different action FSM is live.
    pub fn stage<S: Stage>(&self) -> Option<S> {
        S::current(&self.stages)
    }

    pub fn alarms(&self) -> &AlarmCache {
        &self.alarms
    }

    pub fn ar_state(&self) -> &ArState {
        &self.ar
    }

    pub fn degrade_mask(&self) -> DegradeMask {
        self.degrade_mask
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn uptime(&self) -> u64 {
        self.uptime
    }

    pub fn timers(&self) -> &HostTimers {
        &self.timers
    }

    pub fn mtc_alive(&self) -> &NetworkMap<MtcAliveState> {
        &self.mtc_alive
    }

    pub fn mtc_alive_gate_closed(&self) -> bool {
        self.mtc_alive_gate
    }

    pub fn hbs_minor(&self) -> &NetworkMap<bool> {
        &self.hbs_minor
    }

    pub fn is_controller(&self) -> bool {
        self.personality.contains(NodeType::CONTROLLER)
    }

    pub fn is_worker(&self) -> bool {
        self.personality.contains(NodeType::WORKER)
    }

    pub fn is_storage(&self) -> bool {
        self.personality.contains(NodeType::STORAGE)
    }

    /// Controller with a worker subfunction.
    pub fn is_all_in_one(&self) -> bool {
        self.is_controller() && self.subfunctions.contains(NodeType::WORKER)
    }

    pub fn is_unlocked_enabled(&self) -> bool {
        self.admin_state == AdminState::Unlocked && self.oper_state == OperState::Enabled
    }

    pub fn is_locked(&self) -> bool {
        self.admin_state == AdminState::Locked
    }

    /// Move one FSM to `next`, logging the transition.
    pub(crate) fn change_stage<S: Stage>(&mut self, next: S) {
        let previous = S::current(&self.stages);
        if previous != Some(next) {
            tracing::debug!(
                host = %self.hostname,
                fsm = S::FSM.as_str(),
                from = previous.map(|stage| stage.as_str()).unwrap_or("idle"),
                to = next.as_str(),
                "stage change"
            );
        }
        S::store(&mut self.stages, next);
    }

    /// Update identity fields from a modify request.
    pub(crate) fn apply_info(&mut self, info: HostInfo) -> bool {
        let config_changed = self.mtce_info != info.mtce_info;
        self.hostname = info.hostname;
        self.mgmt_ip = info.mgmt_ip;
        self.mgmt_mac = info.mgmt_mac;
        self.clstr_ip = info.clstr_ip;
        self.clstr_mac = info.clstr_mac;
        self.pxeboot_ip = info.pxeboot_ip;
        self.pxeboot_hostname = info.pxeboot_hostname;
        self.personality = info.personality;
        self.subfunctions = info.subfunctions;
        self.bmc = info.bmc;
        self.storage_monitor = info.storage_monitor;
        self.peer_group = info.peer_group;
        self.mtce_info = info.mtce_info;
        self.hbs.clstr_capable = !self.clstr_ip.is_empty();
        config_changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::EnableStage;

    #[test]
    fn host_info_requires_identity() {
        let info = HostInfo::new("", "uuid-1", NodeType::WORKER);
        assert_eq!(info.validate(), Err(MtceError::EmptyField("hostname")));
        let info = HostInfo::new("compute-0", "uuid-1", NodeType::NONE);
        assert!(matches!(info.validate(), Err(MtceError::InvalidValue { .. })));
    }

    #[test]
    fn host_info_parses_from_json() {
        let info: HostInfo = parse(
            r#"{"hostname":"controller-0","uuid":"u-0","personality":"controller",
                "subfunctions":"controller,worker","mgmt_ip":"10.0.0.2"}"#,
        );
        assert_eq!(info.admin_state, AdminState::Locked);
        assert!(info.subfunctions.contains(NodeType::WORKER));
        let host = Host::new(info, HbsHost::default());
        assert!(host.is_all_in_one());
        assert!(!host.hbs.clstr_capable);
    }

    #[test]
    fn unknown_inventory_states_are_clamped() {
        let info: HostInfo = parse(
            r#"{"hostname":"compute-3","uuid":"u-3","personality":"worker",
                "admin_state":"unlocked","oper_state":"half-enabled","avail_status":"sleeping"}"#,
        );
        assert_eq!(info.admin_state, AdminState::Unlocked);
        assert_eq!(info.oper_state, OperState::Disabled);
        assert_eq!(info.avail_status, AvailStatus::Offduty);

        let back: HostInfo = parse(&serde_json::to_string(&info).unwrap());
        assert_eq!(back, info);
    }

    fn parse(json: &str) -> HostInfo {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn degrade_mask_reports_changes() {
        let mut mask = DegradeMask::default();
        assert!(mask.set(DegradeCause::Pmond));
        assert!(!mask.set(DegradeCause::Pmond));
        assert!(mask.contains(DegradeCause::Pmond));
        assert_eq!(mask.to_string(), "0x04 [pmond]");
        assert!(mask.clear(DegradeCause::Pmond));
        assert!(mask.is_empty());
    }

    #[test]
    fn change_stage_replaces_live_action() {
        let mut host = Host::new(HostInfo::new("c", "u", NodeType::WORKER), HbsHost::default());
        assert_eq!(host.stage::<EnableStage>(), None);
        host.change_stage(EnableStage::Start);
        host.change_stage(EnableStage::MtcAliveWait);
        assert_eq!(host.stage::<EnableStage>(), Some(EnableStage::MtcAliveWait));
    }
}

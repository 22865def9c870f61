//! ---
//! mtce_section: "01-core-functionality"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Node maintenance core."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
//! Interfaces to the external collaborators of the maintenance core.
//!
//! Every call is fire-and-log: a failed call is reported at WARN by the
//! caller and never aborts the handler that issued it.

use mtce_common::Network;

use crate::alarm::{AlarmId, AlarmSeverity};
use crate::error::CollabError;
use crate::host::BmcInfo;
use crate::state::{AdminState, AvailStatus, OperState};

pub type CollabResult<T> = std::result::Result<T, CollabError>;

mtce_enum! {
    /// Commands sent to the per-host maintenance client.
    pub enum MtcCommand: "mtc command" {
        Locked => "locked",
        Unlocked => "unlocked",
        Reboot => "reboot",
        Reset => "reset",
        Reinstall => "reinstall",
        StartHostServices => "start-host-services",
        StartSubfServices => "start-subf-services",
        StopHostServices => "stop-host-services",
        MtcAliveRequest => "mtcalive-request",
        Config => "config",
    }
}

mtce_enum! {
    /// Commands sent to the heartbeat service.
    pub enum HbsCommand: "heartbeat command" {
        Add => "add",
        Delete => "delete",
        Start => "start",
        Stop => "stop",
        Backoff => "backoff",
        Recover => "recover",
    }
}

mtce_enum! {
    /// Commands sent to the hardware monitor.
    pub enum HwmonCommand: "hwmon command" {
        Add => "add",
        Delete => "delete",
        Start => "start",
        Stop => "stop",
    }
}

mtce_enum! {
    /// Board management operations.
    pub enum BmcAction: "bmc action" {
        Query => "query",
        Reset => "reset",
        PowerOff => "power-off",
        PowerOn => "power-on",
    }
}

mtce_enum! {
    /// State notifications for the VIM.
    pub enum VimEvent: "vim event" {
        Enabled => "host-enabled",
        Disabled => "host-disabled",
        Failed => "host-failed",
        Degraded => "host-degraded",
        Deleted => "host-deleted",
    }
}

mtce_enum! {
    /// Customer-visible log classes.
    pub enum LogKind: "customer log" {
        HostAdded => "host-added",
        HostDeleted => "host-deleted",
        Locked => "locked",
        Unlocked => "unlocked",
        Enabled => "enabled",
        Disabled => "disabled",
        StateChange => "state-change",
        Online => "online",
        Offline => "offline",
        PowerOnManual => "power-on-manual",
        PowerOnAuto => "power-on-auto",
        PowerOffManual => "power-off-manual",
        PowerOffAuto => "power-off-auto",
        HeartbeatMinor => "heartbeat-minor",
        HeartbeatDegrade => "heartbeat-degrade",
        HeartbeatLoss => "heartbeat-loss",
        HeartbeatRecovered => "heartbeat-recovered",
        PmondMissing => "pmond-missing",
        Stalled => "stalled",
        MnfaEnter => "mnfa-enter",
        MnfaExit => "mnfa-exit",
        ArDisabled => "auto-recovery-disabled",
        Reboot => "reboot",
        Reset => "reset",
        Reinstall => "reinstall",
        Swact => "swact",
        ConfigFailed => "config-failed",
        BmcAccess => "bmc-access",
    }
}

/// A customer-visible maintenance log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerLog {
    pub hostname: String,
    pub kind: LogKind,
    pub text: String,
}

impl CustomerLog {
    pub fn new(hostname: impl Into<String>, kind: LogKind, text: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            kind,
            text: text.into(),
        }
    }
}

/// Outcome of polling an asynchronous board management request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BmcPoll {
    Idle,
    Pending,
    Done(Result<(), String>),
}

/// Outcome of polling a swact request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwactPoll {
    Pending,
    Done(bool),
}

pub trait AlarmService: Send {
    fn assert_alarm(
        &self,
        hostname: &str,
        id: AlarmId,
        severity: AlarmSeverity,
        entity: &str,
    ) -> CollabResult<()>;
    fn clear_alarm(&self, hostname: &str, id: AlarmId, entity: &str) -> CollabResult<()>;
    fn query_alarm(&self, hostname: &str, id: AlarmId, entity: &str) -> CollabResult<AlarmSeverity>;
    fn customer_log(&self, log: &CustomerLog) -> CollabResult<()>;
}

pub trait InventoryService: Send {
    fn update_state(&self, hostname: &str, key: &str, value: &str) -> CollabResult<()>;
    fn update_states(
        &self,
        hostname: &str,
        admin: AdminState,
        oper: OperState,
        avail: AvailStatus,
    ) -> CollabResult<()>;
    fn update_task(&self, hostname: &str, task: &str) -> CollabResult<()>;
    fn update_uptime(&self, hostname: &str, seconds: u64) -> CollabResult<()>;
    fn update_mtce_info(&self, hostname: &str, json: &str) -> CollabResult<()>;
}

pub trait VimService: Send {
    fn notify(&self, hostname: &str, event: VimEvent) -> CollabResult<()>;
}

/// Asynchronous board management. `start` must not block; results are collected with `poll`.
pub trait BmcService: Send {
    fn start(&self, hostname: &str, action: BmcAction, info: &BmcInfo) -> CollabResult<()>;
    fn poll(&self, hostname: &str) -> BmcPoll;
    fn cancel(&self, hostname: &str);
}

pub trait MtcClient: Send {
    fn send(&self, hostname: &str, command: MtcCommand, network: Network) -> CollabResult<()>;
}

pub trait HbsClient: Send {
    fn send(&self, hostname: &str, command: HbsCommand) -> CollabResult<()>;
}

pub trait HwmonClient: Send {
    fn send(&self, hostname: &str, command: HwmonCommand) -> CollabResult<()>;
}

pub trait ServiceManager: Send {
    fn query_swact(&self, hostname: &str) -> CollabResult<bool>;
    fn request_swact(&self, hostname: &str, force: bool) -> CollabResult<()>;
    fn poll_swact(&self, hostname: &str) -> SwactPoll;
}

/// The full collaborator set handed to [`crate::Maintenance`].
pub struct Services {
    pub alarm: Box<dyn AlarmService>,
    pub inventory: Box<dyn InventoryService>,
    pub vim: Box<dyn VimService>,
    pub bmc: Box<dyn BmcService>,
    pub mtc: Box<dyn MtcClient>,
    pub hbs: Box<dyn HbsClient>,
    pub hwmon: Box<dyn HwmonClient>,
    pub sm: Box<dyn ServiceManager>,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").finish_non_exhaustive()
    }
}

//! ---
//! mtce_section: "01-core-functionality"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Node maintenance core."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
//! Handler stage catalogue.
//!
//! Every administrative action owns one [`ActionFsm`] variant; only one of
//! them is live per host. The online/offline, in-service/out-of-service test
//! and configuration FSMs stay resident and run alongside it.

use mtce_logging::{slog, LogContext};

use crate::state::AdminAction;

mtce_enum! {
    /// Identifies one of the per-host state machines.
    pub enum FsmKind: "fsm" {
        Enable => "enable",
        Disable => "disable",
        Reset => "reset",
        Reboot => "reboot",
        Reinstall => "reinstall",
        Power => "power",
        Powercycle => "powercycle",
        Recovery => "recovery",
        Add => "add",
        Delete => "delete",
        Swact => "swact",
        Online => "online",
        Offline => "offline",
        InsvTest => "insv-test",
        OosTest => "oos-test",
        Config => "config",
    }
}

/// Common behaviour of every stage enum.
pub trait Stage: Copy + PartialEq + std::fmt::Debug + 'static {
    const FSM: FsmKind;
    const START: Self;
    const TERMINAL: Self;

    fn as_str(&self) -> &'static str;
    fn from_raw(raw: u8) -> Option<Self>;

    /// Current stage, or `None` when another action FSM is live.
    fn current(stages: &Stages) -> Option<Self>;
    fn store(stages: &mut Stages, next: Self);

    fn is_terminal(&self) -> bool {
        *self == Self::TERMINAL
    }

    /// Decode an untrusted raw stage, forcing the terminal stage when out of range.
    fn from_raw_clamped(raw: u8, hostname: &str) -> Self {
        Self::from_raw(raw).unwrap_or_else(|| {
            slog!(
                context = LogContext::host(hostname).with_action(Self::FSM.as_str()),
                "invalid stage {raw}, forcing {}",
                Self::TERMINAL.as_str()
            );
            Self::TERMINAL
        })
    }
}

stage_enum! {
    EnableStage(Enable, start = Start, terminal = Done, action) {
        Start => "start",
        RebootRequest => "reboot-request",
        OfflineWait => "offline-wait",
        MtcAliveWait => "mtcalive-wait",
        GoEnabledWait => "goenabled-wait",
        HostServicesStart => "host-services-start",
        HostServicesWait => "host-services-wait",
        SubfGoEnabledWait => "subf-goenabled-wait",
        SubfServicesWait => "subf-services-wait",
        HeartbeatStart => "heartbeat-start",
        HeartbeatSoak => "heartbeat-soak",
        StateChange => "state-change",
        Failure => "failure",
        FailureWait => "failure-wait",
        Done => "done",
    }
}

stage_enum! {
    DisableStage(Disable, start = Start, terminal = Disabled, action) {
        Start => "start",
        ForceLockResetWait => "force-lock-reset-wait",
        DisableServices => "disable-services",
        DisableServicesWait => "disable-services-wait",
        TaskStateUpdate => "task-state-update",
        Disabled => "disabled",
    }
}

stage_enum! {
    ResetStage(Reset, start = Start, terminal = Done, action) {
        Start => "start",
        BmcResetWait => "bmc-reset-wait",
        OfflineWait => "offline-wait",
        Done => "done",
        Fail => "fail",
    }
}

stage_enum! {
    RebootStage(Reboot, start = Start, terminal = Done, action) {
        Start => "start",
        RebootAck => "reboot-ack",
        Retry => "retry",
        BmcReset => "bmc-reset",
        BmcResetWait => "bmc-reset-wait",
        OfflineWait => "offline-wait",
        Done => "done",
        Fail => "fail",
    }
}

stage_enum! {
    ReinstallStage(Reinstall, start = Start, terminal = Done, action) {
        Start => "start",
        OfflineWait => "offline-wait",
        OnlineWait => "online-wait",
        Complete => "complete",
        MsgDisplay => "msg-display",
        Done => "done",
        Fail => "fail",
    }
}

stage_enum! {
    PowerStage(Power, start = Start, terminal = Done, action) {
        Start => "start",
        PowerOffWait => "power-off-wait",
        PowerOnWait => "power-on-wait",
        Done => "done",
        Fail => "fail",
    }
}

stage_enum! {
    PowercycleStage(Powercycle, start = Start, terminal = Done, action) {
        Start => "start",
        OffWait => "off-wait",
        CoolOff => "cool-off",
        OnWait => "on-wait",
        Monitor => "monitor",
        Holdoff => "holdoff",
        Done => "done",
        Fail => "fail",
    }
}

stage_enum! {
    RecoveryStage(Recovery, start = Start, terminal = Done, action) {
        Start => "start",
        MtcAliveWait => "mtcalive-wait",
        RetryWait => "retry-wait",
        GoEnabledWait => "goenabled-wait",
        HostServicesWait => "host-services-wait",
        HeartbeatStart => "heartbeat-start",
        HeartbeatSoak => "heartbeat-soak",
        StateChange => "state-change",
        ForceReenable => "force-reenable",
        Done => "done",
    }
}

stage_enum! {
    AddStage(Add, start = Start, terminal = Done, action) {
        Start => "start",
        AlarmQuery => "alarm-query",
        BmcInfo => "bmc-info",
        MonitorStart => "monitor-start",
        Done => "done",
    }
}

stage_enum! {
    DeleteStage(Delete, start = Start, terminal = Done, action) {
        Start => "start",
        DisableWait => "disable-wait",
        Done => "done",
    }
}

stage_enum! {
    SwactStage(Swact, start = Start, terminal = Done, action) {
        Start => "start",
        Query => "query",
        Request => "request",
        Poll => "poll",
        Done => "done",
        Fail => "fail",
    }
}

stage_enum! {
    OnlineStage(Online, start = Start, terminal = Waiting, background = online) {
        Start => "start",
        Waiting => "waiting",
        Retrying => "retrying",
    }
}

stage_enum! {
    OfflineStage(Offline, start = Start, terminal = Idle, background = offline) {
        Idle => "idle",
        Start => "start",
        SendMtcAlive => "send-mtcalive",
        Wait => "wait",
    }
}

stage_enum! {
    InsvTestStage(InsvTest, start = Start, terminal = Wait, background = insv_test) {
        Start => "start",
        Wait => "wait",
        Run => "run",
    }
}

stage_enum! {
    OosTestStage(OosTest, start = Start, terminal = Done, background = oos_test) {
        Start => "start",
        BmcAccessTest => "bmc-access-test",
        BmcAccessResult => "bmc-access-result",
        Wait => "wait",
        Done => "done",
    }
}

stage_enum! {
    ConfigStage(Config, start = Start, terminal = Idle, background = config) {
        Idle => "idle",
        Start => "start",
        Wait => "wait",
        Verify => "verify",
        Failure => "failure",
        Done => "done",
    }
}

/// The single live action FSM of a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActionFsm {
    #[default]
    Idle,
    Enable(EnableStage),
    Disable(DisableStage),
    Reset(ResetStage),
    Reboot(RebootStage),
    Reinstall(ReinstallStage),
    Power(PowerStage),
    Powercycle(PowercycleStage),
    Recovery(RecoveryStage),
    Add(AddStage),
    Delete(DeleteStage),
    Swact(SwactStage),
}

impl ActionFsm {
    /// Fresh FSM for a newly adopted action.
    pub fn for_action(action: AdminAction) -> Self {
        match action {
            AdminAction::None => ActionFsm::Idle,
            AdminAction::Unlock | AdminAction::Enable => ActionFsm::Enable(EnableStage::START),
            AdminAction::EnableSubf => ActionFsm::Enable(EnableStage::SubfGoEnabledWait),
            AdminAction::Lock | AdminAction::ForceLock => ActionFsm::Disable(DisableStage::START),
            AdminAction::Reset => ActionFsm::Reset(ResetStage::START),
            AdminAction::Reboot => ActionFsm::Reboot(RebootStage::START),
            AdminAction::Reinstall => ActionFsm::Reinstall(ReinstallStage::START),
            AdminAction::PowerOff | AdminAction::PowerOn => ActionFsm::Power(PowerStage::START),
            AdminAction::Powercycle => ActionFsm::Powercycle(PowercycleStage::START),
            AdminAction::Recovery => ActionFsm::Recovery(RecoveryStage::START),
            AdminAction::Add => ActionFsm::Add(AddStage::START),
            AdminAction::Delete => ActionFsm::Delete(DeleteStage::START),
            AdminAction::Swact | AdminAction::ForceSwact => ActionFsm::Swact(SwactStage::START),
        }
    }

    pub fn kind(&self) -> Option<FsmKind> {
        Some(match self {
            ActionFsm::Idle => return None,
            ActionFsm::Enable(_) => FsmKind::Enable,
            ActionFsm::Disable(_) => FsmKind::Disable,
            ActionFsm::Reset(_) => FsmKind::Reset,
            ActionFsm::Reboot(_) => FsmKind::Reboot,
            ActionFsm::Reinstall(_) => FsmKind::Reinstall,
            ActionFsm::Power(_) => FsmKind::Power,
            ActionFsm::Powercycle(_) => FsmKind::Powercycle,
            ActionFsm::Recovery(_) => FsmKind::Recovery,
            ActionFsm::Add(_) => FsmKind::Add,
            ActionFsm::Delete(_) => FsmKind::Delete,
            ActionFsm::Swact(_) => FsmKind::Swact,
        })
    }

    pub fn stage_name(&self) -> &'static str {
        match self {
            ActionFsm::Idle => "idle",
            ActionFsm::Enable(s) => s.as_str(),
            ActionFsm::Disable(s) => s.as_str(),
            ActionFsm::Reset(s) => s.as_str(),
            ActionFsm::Reboot(s) => s.as_str(),
            ActionFsm::Reinstall(s) => s.as_str(),
            ActionFsm::Power(s) => s.as_str(),
            ActionFsm::Powercycle(s) => s.as_str(),
            ActionFsm::Recovery(s) => s.as_str(),
            ActionFsm::Add(s) => s.as_str(),
            ActionFsm::Delete(s) => s.as_str(),
            ActionFsm::Swact(s) => s.as_str(),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, ActionFsm::Idle)
    }
}

/// Stage storage for one host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stages {
    pub action: ActionFsm,
    pub online: OnlineStage,
    pub offline: OfflineStage,
    pub insv_test: InsvTestStage,
    pub oos_test: OosTestStage,
    pub config: ConfigStage,
}

impl Default for Stages {
    fn default() -> Self {
        Self {
            action: ActionFsm::Idle,
            online: OnlineStage::START,
            offline: OfflineStage::Idle,
            insv_test: InsvTestStage::START,
            oos_test: OosTestStage::START,
            config: ConfigStage::Idle,
        }
    }
}

impl Stages {
    /// Apply a raw stage value to the named FSM, clamping invalid input.
    ///
    /// Returns `false` when `kind` names an action FSM other than the live one.
    pub fn set_raw(&mut self, kind: FsmKind, raw: u8, hostname: &str) -> bool {
        fn apply<S: Stage>(stages: &mut Stages, raw: u8, hostname: &str) -> bool {
            let next = S::from_raw_clamped(raw, hostname);
            if S::current(stages).is_none() {
                slog!(
                    context = LogContext::host(hostname).with_action(S::FSM.as_str()),
                    "stage {} requested while '{}' is live",
                    next.as_str(),
                    stages.action.kind().map(|k| k.as_str()).unwrap_or("idle")
                );
                return false;
            }
            S::store(stages, next);
            true
        }

        match kind {
            FsmKind::Enable => apply::<EnableStage>(self, raw, hostname),
            FsmKind::Disable => apply::<DisableStage>(self, raw, hostname),
            FsmKind::Reset => apply::<ResetStage>(self, raw, hostname),
            FsmKind::Reboot => apply::<RebootStage>(self, raw, hostname),
            FsmKind::Reinstall => apply::<ReinstallStage>(self, raw, hostname),
            FsmKind::Power => apply::<PowerStage>(self, raw, hostname),
            FsmKind::Powercycle => apply::<PowercycleStage>(self, raw, hostname),
            FsmKind::Recovery => apply::<RecoveryStage>(self, raw, hostname),
            FsmKind::Add => apply::<AddStage>(self, raw, hostname),
            FsmKind::Delete => apply::<DeleteStage>(self, raw, hostname),
            FsmKind::Swact => apply::<SwactStage>(self, raw, hostname),
            FsmKind::Online => apply::<OnlineStage>(self, raw, hostname),
            FsmKind::Offline => apply::<OfflineStage>(self, raw, hostname),
            FsmKind::InsvTest => apply::<InsvTestStage>(self, raw, hostname),
            FsmKind::OosTest => apply::<OosTestStage>(self, raw, hostname),
            FsmKind::Config => apply::<ConfigStage>(self, raw, hostname),
        }
    }
}

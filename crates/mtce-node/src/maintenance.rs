//! ---
//! mtce_section: "01-core-functionality"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Node maintenance core."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
//! The maintenance context.
//!
//! [`Maintenance`] owns the registry, the heartbeat tracker, the MNFA state
//! and the collaborator set. It is single-threaded: inputs are queued with
//! [`Maintenance::post`] or applied directly through the request methods, and
//! [`Maintenance::tick`] advances timers, drains events, runs every host's
//! handlers and performs the periodic audits.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use mtce_common::{HostId, MtceConfig, Network, CUSTOMER_LOG_TARGET};
use mtce_heartbeat::{PulseConfig, PulseResponse, PulseTracker};
use mtce_logging::{log_system_event, mtce_info, mtce_warn, slog, LogContext, SystemEventOutcome};
use mtce_metrics::MaintenanceMetrics;
use mtce_persistence::{ArCountStore, CustomerLogRecord, JournalWriter};
use tracing::{debug, info, warn};

use crate::alarm::{entity_path, AlarmId, AlarmSeverity};
use crate::collab::{CollabResult, CustomerLog, HbsCommand, LogKind, MtcCommand, Services, VimEvent};
use crate::error::{MtceError, Result};
use crate::event::MtceEvent;
use crate::host::{DegradeCause, Host, HostInfo, MtcAliveFlags};
use crate::mnfa::Mnfa;
use crate::registry::Registry;
use crate::stage::{ActionFsm, ConfigStage, FsmKind, OosTestStage, Stage};
use crate::state::{AdminAction, AdminState, AvailStatus, OperState};
use crate::timer::{MtcTimer, TimerId, TimerKind};

/// Log a failed collaborator call without interrupting the caller.
pub(crate) fn report(service: &'static str, hostname: &str, result: CollabResult<()>) {
    if let Err(err) = result {
        warn!(host = hostname, service, error = %err, "collaborator call failed");
    }
}

/// Dead-office-recovery window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dor {
    pub active: bool,
    deadline: Option<Instant>,
}

/// Node maintenance context.
pub struct Maintenance {
    pub(crate) config: MtceConfig,
    pub(crate) registry: Registry,
    pub(crate) pulse: PulseTracker,
    pub(crate) mnfa: Mnfa,
    pub(crate) services: Services,
    pub(crate) ar_store: ArCountStore,
    pub(crate) metrics: Option<MaintenanceMetrics>,
    journal: Option<JournalWriter>,
    events: VecDeque<MtceEvent>,
    pub(crate) now: Instant,
    dor: Dor,
    audit: MtcTimer,
}

impl std::fmt::Debug for Maintenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Maintenance")
            .field("hosts", &self.registry.len())
            .field("mnfa_active", &self.mnfa.active)
            .field("pending_events", &self.events.len())
            .field("dor", &self.dor)
            .finish_non_exhaustive()
    }
}

impl Maintenance {
    pub fn new(config: MtceConfig, services: Services, now: Instant) -> Self {
        let pulse = PulseTracker::new(PulseConfig::from_config(
            &config.heartbeat,
            config.agent.system_type,
        ));
        let ar_store = ArCountStore::new(&config.agent.tmp_dir);
        let mnfa = Mnfa::new(config.mnfa.clone());
        let mut audit = MtcTimer::default();
        audit.start(now, config.timeouts.audit);
        let mut dor = Dor::default();
        if config.agent.dor_mode {
            dor.active = true;
            dor.deadline = Some(now + config.timeouts.dor_mode);
            log_system_event(
                None,
                "dor-enter",
                "dead office recovery mode active",
                SystemEventOutcome::Success,
            );
        }
        Self {
            registry: Registry::new(config.agent.max_hosts),
            config,
            pulse,
            mnfa,
            services,
            ar_store,
            metrics: None,
            journal: None,
            events: VecDeque::new(),
            now,
            dor,
            audit,
        }
    }

    pub fn with_metrics(mut self, metrics: MaintenanceMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_journal(mut self, journal: JournalWriter) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn config(&self) -> &MtceConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn pulse(&self) -> &PulseTracker {
        &self.pulse
    }

    pub fn mnfa(&self) -> &Mnfa {
        &self.mnfa
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    pub fn dor(&self) -> Dor {
        self.dor
    }

    pub fn host(&self, hostname: &str) -> Option<&Host> {
        self.registry
            .by_hostname(hostname)
            .and_then(|id| self.registry.get(id))
    }

    pub fn host_id(&self, hostname: &str) -> Option<HostId> {
        self.registry.by_hostname(hostname)
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    pub(crate) fn resolve(&self, hostname: &str) -> Result<HostId> {
        self.registry
            .by_hostname(hostname)
            .ok_or_else(|| MtceError::NotFound(hostname.to_owned()))
    }

    pub(crate) fn host_ref(&self, id: HostId) -> Result<&Host> {
        self.registry.get(id).ok_or(MtceError::StaleHost(id))
    }

    pub(crate) fn host_mut(&mut self, id: HostId) -> Result<&mut Host> {
        self.registry.get_mut(id).ok_or(MtceError::StaleHost(id))
    }

    pub(crate) fn hostname_of(&self, id: HostId) -> Result<String> {
        Ok(self.host_ref(id)?.hostname.clone())
    }

    /// Extra patience granted to boot-time waits during dead office recovery.
    pub(crate) fn dor_extension(&self) -> Duration {
        if self.dor.active {
            self.config.timeouts.dor_extension
        } else {
            Duration::ZERO
        }
    }

    // ----- requests -------------------------------------------------------

    /// Queue an input for the next tick.
    pub fn post(&mut self, event: MtceEvent) {
        self.events.push_back(event);
    }

    /// Register a host and start its add FSM.
    pub fn add_host(&mut self, info: HostInfo) -> Result<HostId> {
        info.validate()?;
        let hbs = self.pulse.new_host_state();
        let id = self.registry.add(Host::new(info, hbs))?;
        self.pulse.build_rra(&mut self.registry);
        if let Some(metrics) = &self.metrics {
            metrics.set_hosts(self.registry.len());
        }
        let name = self.hostname_of(id)?;
        mtce_info!(context = LogContext::host(&name), "host added as {id}");
        self.customer_log(&name, LogKind::HostAdded, format!("{name} has been added"));
        self.change_admin_action(id, AdminAction::Add)?;
        Ok(id)
    }

    /// Apply an inventory modify, located by uuid.
    pub fn modify_host(&mut self, info: HostInfo) -> Result<HostId> {
        let previous_bmc = self
            .registry
            .by_uuid(&info.uuid)
            .and_then(|id| self.registry.get(id))
            .map(|host| host.bmc.clone());
        let (id, config_changed) = self.registry.modify(info)?;
        let host = self.host_mut(id)?;
        if previous_bmc.as_ref() != Some(&host.bmc) {
            let name = host.hostname.clone();
            host.bmc_accessible = false;
            host.change_stage(OosTestStage::START);
            host.timers.stop(TimerKind::BmcAccess);
            mtce_info!(context = LogContext::host(&name).with_action("modify"), "board management re-provisioned");
            self.services.bmc.cancel(&name);
        }
        let monitored = self.host_ref(id)?.hbs.net[Network::Mgmnt].monitored;
        if monitored {
            self.pulse
                .set_monitoring(&mut self.registry, id, Network::Mgmnt, true);
        }
        if config_changed {
            let host = self.host_mut(id)?;
            let name = host.hostname.clone();
            let json = host.mtce_info.to_json();
            host.change_stage(ConfigStage::START);
            report("inventory", &name, self.services.inventory.update_mtce_info(&name, &json));
        }
        Ok(id)
    }

    /// Validate and apply an operator request.
    pub fn admin_request(&mut self, hostname: &str, action: AdminAction) -> Result<()> {
        let id = self.resolve(hostname)?;
        let host = self.host_ref(id)?;
        let reject = |reason: &str| -> Result<()> {
            Err(MtceError::InvalidRequest {
                hostname: hostname.to_owned(),
                reason: reason.to_owned(),
            })
        };
        match action {
            AdminAction::None
            | AdminAction::Add
            | AdminAction::Enable
            | AdminAction::EnableSubf
            | AdminAction::Recovery => return reject("not an operator action"),
            AdminAction::Lock => {
                if host.is_locked() {
                    return reject("host is already locked");
                }
                if let Err(reason) = self.lock_check(id) {
                    self.set_task(id, &format!("Lock rejected: {reason}"))?;
                    return Err(MtceError::LockRejected {
                        hostname: hostname.to_owned(),
                        reason,
                    });
                }
            }
            AdminAction::ForceLock => {
                if host.is_locked() {
                    return reject("host is already locked");
                }
                if hostname == self.config.agent.hostname {
                    return Err(MtceError::LockRejected {
                        hostname: hostname.to_owned(),
                        reason: "cannot lock the active controller".to_owned(),
                    });
                }
            }
            AdminAction::Unlock => {
                if !host.is_locked() {
                    return reject("host is already unlocked");
                }
            }
            AdminAction::Delete => {
                if !host.is_locked() {
                    return reject("host must be locked before delete");
                }
            }
            AdminAction::Swact | AdminAction::ForceSwact => {
                if !host.is_controller() {
                    return reject("swact applies to controllers only");
                }
            }
            other if other.requires_locked() && !host.is_locked() => {
                return reject("host must be locked");
            }
            _ => {}
        }
        info!(host = hostname, action = action.as_str(), "admin request accepted");
        self.change_admin_action(id, action)
    }

    /// Inventory delete request.
    pub fn delete_host(&mut self, hostname: &str) -> Result<()> {
        self.admin_request(hostname, AdminAction::Delete)
    }

    // ----- admin action queue ---------------------------------------------

    /// Change the in-progress action, honouring protected actions and the queue bound.
    pub fn change_admin_action(&mut self, id: HostId, action: AdminAction) -> Result<()> {
        let max_queued = self.config.agent.max_queued_actions;
        let host = self.host_mut(id)?;
        let current = host.admin_action;
        if action == current {
            return Ok(());
        }

        let mut queued = Ok(());
        let adopt = if action == AdminAction::None {
            host.action_queue.pop_front().unwrap_or(AdminAction::None)
        } else if current.is_protected() {
            return enqueue(host, action, max_queued);
        } else if current == AdminAction::None && !host.action_queue.is_empty() {
            queued = enqueue(host, action, max_queued);
            host.action_queue.pop_front().unwrap_or(action)
        } else {
            action
        };
        self.adopt_action(id, adopt)?;
        queued
    }

    fn adopt_action(&mut self, id: HostId, action: AdminAction) -> Result<()> {
        let host = self.host_mut(id)?;
        let previous = host.admin_action;
        host.admin_action = action;
        host.stages.action = ActionFsm::for_action(action);
        host.progress = Default::default();
        let name = host.hostname.clone();
        if action != AdminAction::None {
            mtce_info!(
                context = LogContext::host(&name).with_action(action.as_str()),
                "action change from '{previous}'"
            );
            if let Some(metrics) = &self.metrics {
                metrics.record_action(action.as_str());
            }
        } else {
            debug!(host = %name, previous = previous.as_str(), "action complete");
        }
        if action == AdminAction::Unlock {
            self.set_admin_state(id, AdminState::Unlocked)?;
            self.alarm_clear(id, AlarmId::Lock, None)?;
            self.ar_enable(id)?;
        }
        Ok(())
    }

    // ----- state operations -------------------------------------------------

    pub fn get_admin_state(&self, hostname: &str) -> Result<AdminState> {
        Ok(self.host_ref(self.resolve(hostname)?)?.admin_state)
    }

    pub fn get_oper_state(&self, hostname: &str) -> Result<OperState> {
        Ok(self.host_ref(self.resolve(hostname)?)?.oper_state)
    }

    pub fn get_avail_status(&self, hostname: &str) -> Result<AvailStatus> {
        Ok(self.host_ref(self.resolve(hostname)?)?.avail_status)
    }

    pub fn get_admin_action(&self, hostname: &str) -> Result<AdminAction> {
        Ok(self.host_ref(self.resolve(hostname)?)?.admin_action)
    }

    /// Move one of the host's FSMs to a raw stage value.
    ///
    /// Out-of-range values force the FSM's terminal stage. Returns `false`
    /// when `kind` is an action FSM other than the one currently live.
    pub fn change_stage_raw(&mut self, hostname: &str, kind: FsmKind, raw: u8) -> Result<bool> {
        let id = self.resolve(hostname)?;
        let host = self.host_mut(id)?;
        let applied = host.stages.set_raw(kind, raw, &host.hostname);
        if applied {
            debug!(host = %host.hostname, fsm = kind.as_str(), raw, "stage set");
        }
        Ok(applied)
    }

    /// Store and persist the admin state; echo lock/unlock to the host on both networks.
    pub fn set_admin_state(&mut self, id: HostId, state: AdminState) -> Result<()> {
        let host = self.host_mut(id)?;
        if host.admin_state == state {
            return Ok(());
        }
        host.admin_state = state;
        let name = host.hostname.clone();
        mtce_info!(context = LogContext::host(&name), "admin state is now '{state}'");
        report(
            "inventory",
            &name,
            self.services.inventory.update_state(&name, "admin", state.as_str()),
        );
        let (command, kind) = match state {
            AdminState::Unlocked => (MtcCommand::Unlocked, LogKind::Unlocked),
            AdminState::Locked => (MtcCommand::Locked, LogKind::Locked),
        };
        for network in [Network::Mgmnt, Network::Clstr] {
            report("mtc", &name, self.services.mtc.send(&name, command, network));
        }
        self.customer_log(&name, kind, format!("{name} is now '{state}'"));
        Ok(())
    }

    pub fn set_oper_state(&mut self, id: HostId, state: OperState) -> Result<()> {
        let host = self.host_mut(id)?;
        if host.oper_state == state {
            return Ok(());
        }
        host.oper_state = state;
        let name = host.hostname.clone();
        report(
            "inventory",
            &name,
            self.services.inventory.update_state(&name, "oper", state.as_str()),
        );
        let kind = match state {
            OperState::Enabled => LogKind::Enabled,
            OperState::Disabled => LogKind::Disabled,
        };
        self.customer_log(&name, kind, format!("{name} is now '{state}'"));
        Ok(())
    }

    pub fn set_avail_status(&mut self, id: HostId, status: AvailStatus) -> Result<()> {
        let host = self.host_mut(id)?;
        let previous = host.avail_status;
        if previous == status {
            return Ok(());
        }
        if status == AvailStatus::Failed {
            close_mtc_alive_gate(host);
        }
        if previous.is_online_or_offline() && !status.is_online_or_offline() {
            host.timers.stop(TimerKind::Online);
        }

        let mut logs = Vec::new();
        let name = host.hostname.clone();
        if previous == AvailStatus::PowerOff {
            let manual = host.admin_action == AdminAction::PowerOn;
            let kind = if manual { LogKind::PowerOnManual } else { LogKind::PowerOnAuto };
            logs.push((kind, format!("{name} is powered on")));
        }
        if status == AvailStatus::PowerOff {
            let manual = host.admin_action == AdminAction::PowerOff;
            let kind = if manual { LogKind::PowerOffManual } else { LogKind::PowerOffAuto };
            logs.push((kind, format!("{name} is powered off")));
        }
        match status {
            AvailStatus::Online => {
                if !host.online_log_reported {
                    host.online_log_reported = true;
                    logs.push((LogKind::Online, format!("{name} is online")));
                }
                host.offline_log_reported = false;
            }
            AvailStatus::Offline => {
                if !host.offline_log_reported {
                    host.offline_log_reported = true;
                    logs.push((LogKind::Offline, format!("{name} is offline")));
                }
                host.online_log_reported = false;
            }
            _ => {}
        }
        host.avail_status = status;
        debug!(host = %name, from = previous.as_str(), to = status.as_str(), "availability change");

        report(
            "inventory",
            &name,
            self.services.inventory.update_state(&name, "avail", status.as_str()),
        );
        for (kind, text) in logs {
            self.customer_log(&name, kind, text);
        }
        Ok(())
    }

    pub fn set_oper_state_subf(&mut self, id: HostId, state: OperState) -> Result<()> {
        let host = self.host_mut(id)?;
        if host.oper_state_subf == state {
            return Ok(());
        }
        host.oper_state_subf = state;
        let name = host.hostname.clone();
        report(
            "inventory",
            &name,
            self.services.inventory.update_state(&name, "oper_subf", state.as_str()),
        );
        Ok(())
    }

    pub fn set_avail_status_subf(&mut self, id: HostId, status: AvailStatus) -> Result<()> {
        let host = self.host_mut(id)?;
        if host.avail_status_subf == status {
            return Ok(());
        }
        host.avail_status_subf = status;
        let name = host.hostname.clone();
        report(
            "inventory",
            &name,
            self.services.inventory.update_state(&name, "avail_subf", status.as_str()),
        );
        Ok(())
    }

    /// Set all three state axes with a single inventory update and one customer log.
    pub fn force_all_state(
        &mut self,
        id: HostId,
        admin: AdminState,
        oper: OperState,
        avail: AvailStatus,
    ) -> Result<()> {
        let host = self.host_mut(id)?;
        if avail == AvailStatus::Failed && host.avail_status != AvailStatus::Failed {
            close_mtc_alive_gate(host);
        }
        host.admin_state = admin;
        host.oper_state = oper;
        host.avail_status = avail;
        let name = host.hostname.clone();
        report(
            "inventory",
            &name,
            self.services.inventory.update_states(&name, admin, oper, avail),
        );
        self.customer_log(
            &name,
            LogKind::StateChange,
            format!("{name} is now '{admin}-{oper}-{avail}'"),
        );
        Ok(())
    }

    pub(crate) fn set_task(&mut self, id: HostId, task: &str) -> Result<()> {
        let host = self.host_mut(id)?;
        if host.task == task {
            return Ok(());
        }
        host.task = task.to_owned();
        let name = host.hostname.clone();
        report("inventory", &name, self.services.inventory.update_task(&name, task));
        Ok(())
    }

    // ----- alarms, degrade, logs -------------------------------------------

    /// Raise an alarm at `severity`, skipping the call when the cache already agrees.
    pub(crate) fn alarm_raise(
        &mut self,
        id: HostId,
        alarm: AlarmId,
        severity: AlarmSeverity,
        network: Option<Network>,
    ) -> Result<()> {
        if severity == AlarmSeverity::Clear {
            return self.alarm_clear(id, alarm, network);
        }
        let host = self.host_ref(id)?;
        if host.alarms.get(alarm) == severity {
            return Ok(());
        }
        let name = host.hostname.clone();
        let entity = entity_path(&name, network);
        match self.services.alarm.assert_alarm(&name, alarm, severity, &entity) {
            Ok(()) => self.host_mut(id)?.alarms.set(alarm, severity),
            Err(err) => warn!(host = %name, alarm = alarm.as_str(), error = %err, "alarm assert failed"),
        }
        Ok(())
    }

    pub(crate) fn alarm_clear(&mut self, id: HostId, alarm: AlarmId, network: Option<Network>) -> Result<()> {
        let host = self.host_ref(id)?;
        if host.alarms.get(alarm) == AlarmSeverity::Clear {
            return Ok(());
        }
        let name = host.hostname.clone();
        let entity = entity_path(&name, network);
        match self.services.alarm.clear_alarm(&name, alarm, &entity) {
            Ok(()) => self.host_mut(id)?.alarms.set(alarm, AlarmSeverity::Clear),
            Err(err) => warn!(host = %name, alarm = alarm.as_str(), error = %err, "alarm clear failed"),
        }
        Ok(())
    }

    pub(crate) fn degrade_set(&mut self, id: HostId, cause: DegradeCause) -> Result<()> {
        let host = self.host_mut(id)?;
        if host.degrade_mask.set(cause) {
            info!(host = %host.hostname, cause = cause.as_str(), mask = %host.degrade_mask, "degrade set");
        }
        self.refresh_degrade(id)
    }

    pub(crate) fn degrade_clear(&mut self, id: HostId, cause: DegradeCause) -> Result<()> {
        let host = self.host_mut(id)?;
        if host.degrade_mask.clear(cause) {
            info!(host = %host.hostname, cause = cause.as_str(), mask = %host.degrade_mask, "degrade cleared");
        }
        self.refresh_degrade(id)
    }

    /// Reconcile the availability of an enabled host with its degrade mask.
    pub(crate) fn refresh_degrade(&mut self, id: HostId) -> Result<()> {
        let host = self.host_ref(id)?;
        if !host.is_unlocked_enabled() {
            return Ok(());
        }
        let degraded = !host.degrade_mask.is_empty() || host.ar.disabled;
        let name = host.hostname.clone();
        match (host.avail_status, degraded) {
            (AvailStatus::Available, true) => {
                self.set_avail_status(id, AvailStatus::Degraded)?;
                report("vim", &name, self.services.vim.notify(&name, VimEvent::Degraded));
            }
            (AvailStatus::Degraded, false) => {
                self.set_avail_status(id, AvailStatus::Available)?;
                report("vim", &name, self.services.vim.notify(&name, VimEvent::Enabled));
            }
            _ => {}
        }
        Ok(())
    }

    /// Emit a customer log to the fault manager and the local journal.
    pub(crate) fn customer_log(&mut self, hostname: &str, kind: LogKind, text: impl Into<String>) {
        let log = CustomerLog::new(hostname, kind, text);
        info!(target: CUSTOMER_LOG_TARGET, host = hostname, event = kind.as_str(), "{}", log.text);
        report("alarm", hostname, self.services.alarm.customer_log(&log));
        if let Some(journal) = self.journal.as_mut() {
            let record = CustomerLogRecord::new(hostname, kind.as_str(), log.text.as_str());
            if let Err(err) = journal.append(record) {
                warn!(host = hostname, error = %err, "customer log journal append failed");
            }
        }
    }

    // ----- collaborator shorthands -------------------------------------------

    pub(crate) fn mtc_send(&self, id: HostId, command: MtcCommand, networks: &[Network]) -> Result<()> {
        let host = self.host_ref(id)?;
        for network in networks {
            report(
                "mtc",
                &host.hostname,
                self.services.mtc.send(&host.hostname, command, *network),
            );
        }
        Ok(())
    }

    pub(crate) fn hbs_send(&self, id: HostId, command: HbsCommand) -> Result<()> {
        let host = self.host_ref(id)?;
        report("hbs", &host.hostname, self.services.hbs.send(&host.hostname, command));
        Ok(())
    }

    pub(crate) fn vim_notify(&self, id: HostId, event: VimEvent) -> Result<()> {
        let host = self.host_ref(id)?;
        report("vim", &host.hostname, self.services.vim.notify(&host.hostname, event));
        Ok(())
    }

    pub(crate) fn start_timer(&mut self, id: HostId, kind: TimerKind, duration: Duration) -> Result<()> {
        let now = self.now;
        self.host_mut(id)?.timers.start(kind, now, duration);
        Ok(())
    }

    pub(crate) fn stop_timer(&mut self, id: HostId, kind: TimerKind) -> Result<()> {
        self.host_mut(id)?.timers.stop(kind);
        Ok(())
    }

    pub(crate) fn take_ring(&mut self, id: HostId, kind: TimerKind) -> Result<bool> {
        Ok(self.host_mut(id)?.timers.take_ring(kind))
    }

    pub(crate) fn set_stage<S: Stage>(&mut self, id: HostId, next: S) -> Result<()> {
        self.host_mut(id)?.change_stage(next);
        Ok(())
    }

    /// Start heartbeat monitoring on management (cluster-host follows capability).
    pub(crate) fn heartbeat_start(&mut self, id: HostId) -> Result<()> {
        self.host_ref(id)?;
        self.pulse
            .set_monitoring(&mut self.registry, id, Network::Mgmnt, true);
        if self.config.heartbeat.monitor_pxeboot {
            self.pulse
                .set_monitoring(&mut self.registry, id, Network::Pxeboot, true);
        }
        self.host_mut(id)?.progress.heartbeat_failed = false;
        self.hbs_send(id, HbsCommand::Start)
    }

    /// Stop heartbeat monitoring; the host also leaves MNFA accounting.
    pub(crate) fn heartbeat_stop(&mut self, id: HostId) -> Result<()> {
        self.host_ref(id)?;
        self.pulse.stop_host(&mut self.registry, id);
        self.mnfa_forget(id);
        self.hbs_send(id, HbsCommand::Stop)
    }

    // ----- heartbeat pulse cycle ---------------------------------------------

    /// Open a pulse period on `network`; returns the number of hosts expected to answer.
    pub fn start_pulse_period(&mut self, network: Network) -> usize {
        self.pulse.create_pulse_list(&mut self.registry, network)
    }

    /// Account for one pulse response.
    pub fn pulse_response(&mut self, network: Network, response: &PulseResponse) -> Result<()> {
        let events = self.pulse.remove_pulse(&mut self.registry, network, response)?;
        for event in events {
            self.handle_heartbeat_event(event);
        }
        Ok(())
    }

    /// Close the pulse period, charging a miss to every silent host. Returns the miss count.
    pub fn end_pulse_period(&mut self, network: Network) -> usize {
        let report = self.pulse.sweep_losses(&mut self.registry, network);
        for event in report.events {
            self.handle_heartbeat_event(event);
        }
        report.lost
    }

    // ----- tick ----------------------------------------------------------------

    /// Advance time: fire timers, drain queued events, run handlers and audits.
    pub fn tick(&mut self, now: Instant) {
        self.now = now;

        for id in self.registry.ids() {
            if let Some(host) = self.registry.get_mut(id) {
                for kind in host.timers.expire(now) {
                    self.events.push_back(MtceEvent::Timer(TimerId { host: id, kind }));
                }
            }
        }
        if self.mnfa.timer.expire(now) {
            self.mnfa.timer.take_ring();
            mtce_warn!("multi-node failure avoidance timeout");
            self.mnfa_exit(true);
        }
        if self.dor.active && self.dor.deadline.is_some_and(|deadline| now >= deadline) {
            self.dor.active = false;
            self.dor.deadline = None;
            log_system_event(
                None,
                "dor-exit",
                "dead office recovery window closed",
                SystemEventOutcome::Success,
            );
        }

        while let Some(event) = self.events.pop_front() {
            let kind = event.kind();
            if let Err(err) = self.handle_event(event) {
                warn!(event = kind, error = %err, "event rejected");
            }
        }

        self.dispatch();

        if self.audit.expire(now) {
            self.audit.take_ring();
            self.audit_all();
            self.audit.start(now, self.config.timeouts.audit);
        }
    }

    fn handle_event(&mut self, event: MtceEvent) -> Result<()> {
        match event {
            MtceEvent::MtcAlive {
                hostname,
                network,
                sequence,
                uptime,
                flags,
            } => self.handle_mtc_alive(&hostname, network, sequence, uptime, flags),
            MtceEvent::GoEnabled { hostname, subf, passed } => {
                let progress = &mut self.host_mut(self.resolve(&hostname)?)?.progress;
                if subf {
                    progress.goenabled_subf = Some(passed);
                } else {
                    progress.goenabled = Some(passed);
                }
                Ok(())
            }
            MtceEvent::HostServices { hostname, subf, passed } => {
                let progress = &mut self.host_mut(self.resolve(&hostname)?)?.progress;
                if subf {
                    progress.host_services_subf = Some(passed);
                } else {
                    progress.host_services = Some(passed);
                }
                Ok(())
            }
            MtceEvent::CommandAck { hostname, command } => {
                let host = self.host_mut(self.resolve(&hostname)?)?;
                debug!(host = %hostname, command = command.as_str(), "command acknowledged");
                host.progress.command_ack = true;
                Ok(())
            }
            MtceEvent::DegradeRaise { hostname, cause } => {
                let id = self.resolve(&hostname)?;
                self.degrade_set(id, cause)
            }
            MtceEvent::DegradeClear { hostname, cause } => {
                let id = self.resolve(&hostname)?;
                self.degrade_clear(id, cause)
            }
            MtceEvent::ConfigComplete { hostname, passed } => {
                let host = self.host_mut(self.resolve(&hostname)?)?;
                host.progress.config_result = Some(passed);
                Ok(())
            }
            MtceEvent::AdminRequest { hostname, action } => self.admin_request(&hostname, action),
            MtceEvent::AddHost(info) => self.add_host(*info).map(|_| ()),
            MtceEvent::ModifyHost(info) => self.modify_host(*info).map(|_| ()),
            MtceEvent::DeleteHost { hostname } => self.delete_host(&hostname),
            MtceEvent::Timer(timer) => {
                match self.registry.get(timer.host) {
                    Some(host) => debug!(host = %host.hostname, timer = timer.kind.as_str(), "timer fired"),
                    None => debug!(timer = timer.kind.as_str(), "stale timer dropped"),
                }
                Ok(())
            }
        }
    }

    fn handle_mtc_alive(
        &mut self,
        hostname: &str,
        network: Network,
        sequence: u32,
        uptime: u64,
        flags: MtcAliveFlags,
    ) -> Result<()> {
        let host = self.host_mut(self.resolve(hostname)?)?;
        if host.mtc_alive_gate {
            debug!(host = hostname, network = network.as_str(), "mtcAlive gated");
            return Ok(());
        }
        let state = &mut host.mtc_alive[network];
        if sequence != 0 && sequence <= state.sequence {
            debug!(host = hostname, sequence, last = state.sequence, "mtcAlive out of sequence");
        }
        state.sequence = sequence;
        state.received = true;
        state.misses = 0;
        state.total += 1;
        host.mtc_alive_online = true;
        host.mtc_alive_flags = flags;
        host.uptime = uptime;
        Ok(())
    }

    /// Periodic consistency audit.
    pub fn audit_all(&mut self) {
        if let Err(reason) = self.registry.validate_links() {
            slog!("host list corrupt: {reason}");
        }
        self.mnfa_audit();
        for id in self.registry.ids() {
            let Some(host) = self.registry.get(id) else {
                continue;
            };
            let monitored = host.hbs.net.iter().any(|(_, state)| state.monitored);
            if host.is_locked() && monitored && host.admin_action == AdminAction::None {
                slog!("{} is locked but still heartbeat monitored", host.hostname);
                self.pulse.stop_host(&mut self.registry, id);
                continue;
            }
            if host.is_unlocked_enabled() {
                report(
                    "inventory",
                    &host.hostname,
                    self.services.inventory.update_uptime(&host.hostname, host.uptime),
                );
            }
        }
    }

    /// Permanently drop a host: timers, pulse lists, MNFA tracking and registry slot.
    pub(crate) fn remove_host(&mut self, id: HostId) -> Result<()> {
        let name = self.hostname_of(id)?;
        self.services.bmc.cancel(&name);
        self.pulse.remove_host(&mut self.registry, id);
        self.mnfa_forget(id);
        let mut host = self.registry.remove(id)?;
        host.timers.stop_all();
        self.pulse.build_rra(&mut self.registry);
        if let Some(metrics) = &self.metrics {
            metrics.set_hosts(self.registry.len());
        }
        report("vim", &name, self.services.vim.notify(&name, VimEvent::Deleted));
        self.customer_log(&name, LogKind::HostDeleted, format!("{name} has been deleted"));
        Ok(())
    }
}

fn close_mtc_alive_gate(host: &mut Host) {
    for (_, state) in host.mtc_alive.iter_mut() {
        state.reset();
    }
    host.mtc_alive_gate = true;
    host.mtc_alive_online = false;
}

fn enqueue(host: &mut Host, action: AdminAction, max_queued: usize) -> Result<()> {
    if host.admin_action == action || host.action_queue.contains(&action) {
        return Err(MtceError::DuplicateAction {
            hostname: host.hostname.clone(),
            action: action.as_str().to_owned(),
        });
    }
    if host.action_queue.len() >= max_queued {
        return Err(MtceError::QueueFull {
            hostname: host.hostname.clone(),
            action: action.as_str().to_owned(),
        });
    }
    debug!(host = %host.hostname, action = action.as_str(), "action queued");
    host.action_queue.push_back(action);
    Ok(())
}

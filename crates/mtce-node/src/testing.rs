//! ---
//! mtce_section: "01-core-functionality"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Node maintenance core."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
//! In-memory collaborators that record every call, for tests and dry runs.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use mtce_common::Network;
use parking_lot::Mutex;

use crate::alarm::{AlarmId, AlarmSeverity};
use crate::collab::{
    AlarmService, BmcAction, BmcPoll, BmcService, CollabResult, CustomerLog, HbsClient,
    HbsCommand, HwmonClient, HwmonCommand, InventoryService, LogKind, MtcClient, MtcCommand,
    ServiceManager, Services, SwactPoll, VimEvent, VimService,
};
use crate::error::CollabError;
use crate::host::BmcInfo;
use crate::state::{AdminState, AvailStatus, OperState};

/// One recorded collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Mtc { hostname: String, command: MtcCommand, network: Network },
    Hbs { hostname: String, command: HbsCommand },
    Hwmon { hostname: String, command: HwmonCommand },
    AlarmAssert { hostname: String, id: AlarmId, severity: AlarmSeverity, entity: String },
    AlarmClear { hostname: String, id: AlarmId, entity: String },
    AlarmQuery { hostname: String, id: AlarmId },
    CustomerLog(CustomerLog),
    Inventory { hostname: String, key: String, value: String },
    InventoryStates { hostname: String, admin: AdminState, oper: OperState, avail: AvailStatus },
    Task { hostname: String, task: String },
    Uptime { hostname: String, seconds: u64 },
    MtceInfo { hostname: String, json: String },
    Vim { hostname: String, event: VimEvent },
    BmcStart { hostname: String, action: BmcAction },
    BmcCancel { hostname: String },
    SwactQuery { hostname: String },
    SwactRequest { hostname: String, force: bool },
}

#[derive(Debug)]
struct Script {
    failing: HashSet<&'static str>,
    alarm_query: HashMap<(String, AlarmId), AlarmSeverity>,
    bmc_result: Result<(), String>,
    bmc_pending: HashMap<String, BmcAction>,
    bmc_hold: bool,
    swact_allowed: bool,
    swact_result: bool,
    swact_pending: HashSet<String>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            failing: HashSet::new(),
            alarm_query: HashMap::new(),
            bmc_result: Ok(()),
            bmc_pending: HashMap::new(),
            bmc_hold: false,
            swact_allowed: true,
            swact_result: true,
            swact_pending: HashSet::new(),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    calls: Vec<Call>,
    script: Script,
}

/// Shared recorder implementing every collaborator trait.
#[derive(Debug, Clone, Default)]
pub struct RecordingServices {
    inner: Arc<Mutex<Inner>>,
}

impl RecordingServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// Box clones of this recorder into a [`Services`] bundle.
    pub fn services(&self) -> Services {
        Services {
            alarm: Box::new(self.clone()),
            inventory: Box::new(self.clone()),
            vim: Box::new(self.clone()),
            bmc: Box::new(self.clone()),
            mtc: Box::new(self.clone()),
            hbs: Box::new(self.clone()),
            hwmon: Box::new(self.clone()),
            sm: Box::new(self.clone()),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().calls.clone()
    }

    pub fn clear(&self) {
        self.inner.lock().calls.clear();
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.inner.lock().calls.iter().filter(|call| predicate(call)).count()
    }

    pub fn mtc_commands(&self, host: &str) -> Vec<(MtcCommand, Network)> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Mtc { hostname, command, network } if hostname == host => {
                    Some((*command, *network))
                }
                _ => None,
            })
            .collect()
    }

    pub fn hbs_commands(&self, host: &str) -> Vec<HbsCommand> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::Hbs { hostname, command } if hostname == host => Some(*command),
                _ => None,
            })
            .collect()
    }

    pub fn customer_logs(&self) -> Vec<CustomerLog> {
        self.inner
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::CustomerLog(log) => Some(log.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn customer_logs_of(&self, host: &str, kind: LogKind) -> usize {
        self.customer_logs()
            .iter()
            .filter(|log| log.hostname == host && log.kind == kind)
            .count()
    }

    /// Last value written to inventory for `key`.
    pub fn inventory(&self, host: &str, key: &str) -> Option<String> {
        self.inner.lock().calls.iter().rev().find_map(|call| match call {
            Call::Inventory { hostname, key: k, value } if hostname == host && k == key => {
                Some(value.clone())
            }
            _ => None,
        })
    }

    pub fn last_task(&self, host: &str) -> Option<String> {
        self.inner.lock().calls.iter().rev().find_map(|call| match call {
            Call::Task { hostname, task } if hostname == host => Some(task.clone()),
            _ => None,
        })
    }

    /// Make every call to the named service fail with `Unavailable`.
    pub fn fail_service(&self, service: &'static str) {
        self.inner.lock().script.failing.insert(service);
    }

    pub fn restore_service(&self, service: &'static str) {
        self.inner.lock().script.failing.remove(service);
    }

    pub fn set_alarm_query(&self, host: &str, id: AlarmId, severity: AlarmSeverity) {
        self.inner
            .lock()
            .script
            .alarm_query
            .insert((host.to_owned(), id), severity);
    }

    pub fn set_bmc_result(&self, result: Result<(), String>) {
        self.inner.lock().script.bmc_result = result;
    }

    /// Keep board management requests pending until released.
    pub fn hold_bmc(&self, hold: bool) {
        self.inner.lock().script.bmc_hold = hold;
    }

    pub fn set_swact_allowed(&self, allowed: bool) {
        self.inner.lock().script.swact_allowed = allowed;
    }

    pub fn set_swact_result(&self, success: bool) {
        self.inner.lock().script.swact_result = success;
    }

    fn record(&self, service: &'static str, call: Call) -> CollabResult<()> {
        let mut inner = self.inner.lock();
        inner.calls.push(call);
        if inner.script.failing.contains(service) {
            return Err(CollabError::Unavailable(service));
        }
        Ok(())
    }
}

impl AlarmService for RecordingServices {
    fn assert_alarm(
        &self,
        hostname: &str,
        id: AlarmId,
        severity: AlarmSeverity,
        entity: &str,
    ) -> CollabResult<()> {
        self.record(
            "alarm",
            Call::AlarmAssert {
                hostname: hostname.to_owned(),
                id,
                severity,
                entity: entity.to_owned(),
            },
        )
    }

    fn clear_alarm(&self, hostname: &str, id: AlarmId, entity: &str) -> CollabResult<()> {
        self.record(
            "alarm",
            Call::AlarmClear {
                hostname: hostname.to_owned(),
                id,
                entity: entity.to_owned(),
            },
        )
    }

    fn query_alarm(&self, hostname: &str, id: AlarmId, _entity: &str) -> CollabResult<AlarmSeverity> {
        self.record(
            "alarm",
            Call::AlarmQuery {
                hostname: hostname.to_owned(),
                id,
            },
        )?;
        Ok(self
            .inner
            .lock()
            .script
            .alarm_query
            .get(&(hostname.to_owned(), id))
            .copied()
            .unwrap_or_default())
    }

    fn customer_log(&self, log: &CustomerLog) -> CollabResult<()> {
        self.record("alarm", Call::CustomerLog(log.clone()))
    }
}

impl InventoryService for RecordingServices {
    fn update_state(&self, hostname: &str, key: &str, value: &str) -> CollabResult<()> {
        self.record(
            "inventory",
            Call::Inventory {
                hostname: hostname.to_owned(),
                key: key.to_owned(),
                value: value.to_owned(),
            },
        )
    }

    fn update_states(
        &self,
        hostname: &str,
        admin: AdminState,
        oper: OperState,
        avail: AvailStatus,
    ) -> CollabResult<()> {
        self.record(
            "inventory",
            Call::InventoryStates {
                hostname: hostname.to_owned(),
                admin,
                oper,
                avail,
            },
        )
    }

    fn update_task(&self, hostname: &str, task: &str) -> CollabResult<()> {
        self.record(
            "inventory",
            Call::Task {
                hostname: hostname.to_owned(),
                task: task.to_owned(),
            },
        )
    }

    fn update_uptime(&self, hostname: &str, seconds: u64) -> CollabResult<()> {
        self.record(
            "inventory",
            Call::Uptime {
                hostname: hostname.to_owned(),
                seconds,
            },
        )
    }

    fn update_mtce_info(&self, hostname: &str, json: &str) -> CollabResult<()> {
        self.record(
            "inventory",
            Call::MtceInfo {
                hostname: hostname.to_owned(),
                json: json.to_owned(),
            },
        )
    }
}

impl VimService for RecordingServices {
    fn notify(&self, hostname: &str, event: VimEvent) -> CollabResult<()> {
        self.record(
            "vim",
            Call::Vim {
                hostname: hostname.to_owned(),
                event,
            },
        )
    }
}

impl BmcService for RecordingServices {
    fn start(&self, hostname: &str, action: BmcAction, _info: &BmcInfo) -> CollabResult<()> {
        self.record(
            "bmc",
            Call::BmcStart {
                hostname: hostname.to_owned(),
                action,
            },
        )?;
        let mut inner = self.inner.lock();
        if inner.script.bmc_pending.contains_key(hostname) {
            return Err(CollabError::Busy(hostname.to_owned()));
        }
        inner.script.bmc_pending.insert(hostname.to_owned(), action);
        Ok(())
    }

    fn poll(&self, hostname: &str) -> BmcPoll {
        let mut inner = self.inner.lock();
        if !inner.script.bmc_pending.contains_key(hostname) {
            return BmcPoll::Idle;
        }
        if inner.script.bmc_hold {
            return BmcPoll::Pending;
        }
        inner.script.bmc_pending.remove(hostname);
        BmcPoll::Done(inner.script.bmc_result.clone())
    }

    fn cancel(&self, hostname: &str) {
        let _ = self.record(
            "bmc",
            Call::BmcCancel {
                hostname: hostname.to_owned(),
            },
        );
        self.inner.lock().script.bmc_pending.remove(hostname);
    }
}

impl MtcClient for RecordingServices {
    fn send(&self, hostname: &str, command: MtcCommand, network: Network) -> CollabResult<()> {
        self.record(
            "mtc",
            Call::Mtc {
                hostname: hostname.to_owned(),
                command,
                network,
            },
        )
    }
}

impl HbsClient for RecordingServices {
    fn send(&self, hostname: &str, command: HbsCommand) -> CollabResult<()> {
        self.record(
            "hbs",
            Call::Hbs {
                hostname: hostname.to_owned(),
                command,
            },
        )
    }
}

impl HwmonClient for RecordingServices {
    fn send(&self, hostname: &str, command: HwmonCommand) -> CollabResult<()> {
        self.record(
            "hwmon",
            Call::Hwmon {
                hostname: hostname.to_owned(),
                command,
            },
        )
    }
}

impl ServiceManager for RecordingServices {
    fn query_swact(&self, hostname: &str) -> CollabResult<bool> {
        self.record(
            "sm",
            Call::SwactQuery {
                hostname: hostname.to_owned(),
            },
        )?;
        Ok(self.inner.lock().script.swact_allowed)
    }

    fn request_swact(&self, hostname: &str, force: bool) -> CollabResult<()> {
        self.record(
            "sm",
            Call::SwactRequest {
                hostname: hostname.to_owned(),
                force,
            },
        )?;
        self.inner.lock().script.swact_pending.insert(hostname.to_owned());
        Ok(())
    }

    fn poll_swact(&self, hostname: &str) -> SwactPoll {
        let mut inner = self.inner.lock();
        if inner.script.swact_pending.remove(hostname) {
            SwactPoll::Done(inner.script.swact_result)
        } else {
            SwactPoll::Pending
        }
    }
}

//! ---
//! mtce_section: "01-core-functionality"
//! mtce_subsection: "binary"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Standalone collaborators for running the agent without a cluster."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
//! Collaborators that log what they are asked to do.
//!
//! Liveness requests are answered locally so a standalone agent keeps its
//! hosts online; everything else is only traced.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use mtce_common::Network;
use mtce_node::collab::{
    AlarmService, BmcPoll, BmcService, CollabResult, HbsClient, HbsCommand, HwmonClient,
    HwmonCommand, InventoryService, MtcClient, ServiceManager, SwactPoll, VimService,
};
use mtce_node::{
    AdminState, AlarmId, AlarmSeverity, AvailStatus, BmcAction, BmcDriver, BmcInfo, CustomerLog,
    MtcCommand, MtceEvent, OperState, Services, ThreadedBmc, VimEvent,
};
use parking_lot::Mutex;
use tracing::{debug, info};

/// Events produced by the simulated hosts, drained into the agent each tick.
#[derive(Debug, Clone, Default)]
pub struct Outbox(Arc<Mutex<Vec<MtceEvent>>>);

impl Outbox {
    fn push(&self, event: MtceEvent) {
        self.0.lock().push(event);
    }

    pub fn drain(&self) -> Vec<MtceEvent> {
        std::mem::take(&mut *self.0.lock())
    }
}

struct LogAlarms;

impl AlarmService for LogAlarms {
    fn assert_alarm(
        &self,
        hostname: &str,
        id: AlarmId,
        severity: AlarmSeverity,
        entity: &str,
    ) -> CollabResult<()> {
        info!(host = hostname, alarm = %id, %severity, entity, "alarm raised");
        Ok(())
    }

    fn clear_alarm(&self, hostname: &str, id: AlarmId, entity: &str) -> CollabResult<()> {
        info!(host = hostname, alarm = %id, entity, "alarm cleared");
        Ok(())
    }

    fn query_alarm(&self, _hostname: &str, _id: AlarmId, _entity: &str) -> CollabResult<AlarmSeverity> {
        Ok(AlarmSeverity::Clear)
    }

    fn customer_log(&self, log: &CustomerLog) -> CollabResult<()> {
        info!(host = %log.hostname, kind = %log.kind, "{}", log.text);
        Ok(())
    }
}

struct LogInventory;

impl InventoryService for LogInventory {
    fn update_state(&self, hostname: &str, key: &str, value: &str) -> CollabResult<()> {
        debug!(host = hostname, key, value, "inventory state");
        Ok(())
    }

    fn update_states(
        &self,
        hostname: &str,
        admin: AdminState,
        oper: OperState,
        avail: AvailStatus,
    ) -> CollabResult<()> {
        info!(host = hostname, %admin, %oper, %avail, "inventory states");
        Ok(())
    }

    fn update_task(&self, hostname: &str, task: &str) -> CollabResult<()> {
        debug!(host = hostname, task, "inventory task");
        Ok(())
    }

    fn update_uptime(&self, hostname: &str, seconds: u64) -> CollabResult<()> {
        debug!(host = hostname, seconds, "inventory uptime");
        Ok(())
    }

    fn update_mtce_info(&self, hostname: &str, json: &str) -> CollabResult<()> {
        debug!(host = hostname, json, "inventory mtce info");
        Ok(())
    }
}

struct LogVim;

impl VimService for LogVim {
    fn notify(&self, hostname: &str, event: VimEvent) -> CollabResult<()> {
        info!(host = hostname, %event, "vim notification");
        Ok(())
    }
}

/// Answers liveness requests as if every host were up since boot.
struct LoopbackMtc {
    outbox: Outbox,
    uptime: u64,
}

impl MtcClient for LoopbackMtc {
    fn send(&self, hostname: &str, command: MtcCommand, network: Network) -> CollabResult<()> {
        debug!(host = hostname, %command, network = network.as_str(), "mtc command");
        if command == MtcCommand::MtcAliveRequest {
            self.outbox
                .push(MtceEvent::mtc_alive(hostname, network, 0, self.uptime));
        }
        Ok(())
    }
}

struct LogHbs;

impl HbsClient for LogHbs {
    fn send(&self, hostname: &str, command: HbsCommand) -> CollabResult<()> {
        debug!(host = hostname, %command, "heartbeat command");
        Ok(())
    }
}

struct LogHwmon;

impl HwmonClient for LogHwmon {
    fn send(&self, hostname: &str, command: HwmonCommand) -> CollabResult<()> {
        debug!(host = hostname, %command, "hwmon command");
        Ok(())
    }
}

struct LogServiceManager;

impl ServiceManager for LogServiceManager {
    fn query_swact(&self, _hostname: &str) -> CollabResult<bool> {
        Ok(true)
    }

    fn request_swact(&self, hostname: &str, force: bool) -> CollabResult<()> {
        info!(host = hostname, force, "swact requested");
        Ok(())
    }

    fn poll_swact(&self, _hostname: &str) -> SwactPoll {
        SwactPoll::Done(true)
    }
}

/// Board management driver that succeeds after a short delay.
struct SimulatedBmc {
    latency: Duration,
}

impl BmcDriver for SimulatedBmc {
    fn execute(&self, hostname: &str, action: BmcAction, info: &BmcInfo) -> Result<(), String> {
        thread::sleep(self.latency);
        info!(host = hostname, %action, bmc = %info.ip, "board management request completed");
        Ok(())
    }
}

/// Build the standalone collaborator set and the outbox its hosts answer through.
pub fn standalone(uptime: u64) -> (Services, Outbox) {
    let outbox = Outbox::default();
    let services = Services {
        alarm: Box::new(LogAlarms),
        inventory: Box::new(LogInventory),
        vim: Box::new(LogVim),
        bmc: Box::new(ThreadedBmc::new(SimulatedBmc {
            latency: Duration::from_millis(200),
        })) as Box<dyn BmcService>,
        mtc: Box::new(LoopbackMtc {
            outbox: outbox.clone(),
            uptime,
        }),
        hbs: Box::new(LogHbs),
        hwmon: Box::new(LogHwmon),
        sm: Box::new(LogServiceManager),
    };
    (services, outbox)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liveness_requests_are_echoed() {
        let (services, outbox) = standalone(3600);
        services
            .mtc
            .send("compute-0", MtcCommand::MtcAliveRequest, Network::Mgmnt)
            .unwrap();
        services
            .mtc
            .send("compute-0", MtcCommand::Reboot, Network::Mgmnt)
            .unwrap();
        let events = outbox.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind(), "mtcalive");
        assert!(outbox.drain().is_empty());
    }

    #[test]
    fn board_management_completes() {
        let (services, _) = standalone(0);
        let info = BmcInfo {
            ip: "10.0.0.1".into(),
            username: "root".into(),
            ..BmcInfo::default()
        };
        services.bmc.start("compute-0", BmcAction::Query, &info).unwrap();
        let mut poll = services.bmc.poll("compute-0");
        for _ in 0..100 {
            if poll != BmcPoll::Pending {
                break;
            }
            thread::sleep(Duration::from_millis(20));
            poll = services.bmc.poll("compute-0");
        }
        assert_eq!(poll, BmcPoll::Done(Ok(())));
    }
}

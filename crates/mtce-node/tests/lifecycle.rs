//! ---
//! mtce_section: "01-core-functionality"
//! mtce_subsection: "tests"
//! mtce_type: "source"
//! mtce_scope: "test"
//! mtce_description: "Host lifecycle through the dispatcher: add, unlock, lock, reset, delete."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
use std::time::{Duration, Instant};

use mtce_common::{HostId, MtceConfig, Network};
use mtce_node::collab::{BmcAction, HbsCommand, HwmonCommand};
use mtce_node::stage::{EnableStage, FsmKind};
use mtce_node::testing::{Call, RecordingServices};
use mtce_node::{
    AdminAction, AdminState, AlarmId, AlarmSeverity, AvailStatus, BmcInfo, HostInfo, LogKind,
    Maintenance, MtcCommand, MtceError, MtceEvent, NodeType, OperState, VimEvent,
};
use tempfile::TempDir;

struct Harness {
    mtce: Maintenance,
    recorder: RecordingServices,
    now: Instant,
    _dir: TempDir,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(MtceConfig::default())
    }

    fn with_config(mut config: MtceConfig) -> Self {
        mtce_logging::init_for_tests();
        let dir = tempfile::tempdir().unwrap();
        config.agent.hostname = "controller-0".to_owned();
        config.agent.tmp_dir = dir.path().to_path_buf();
        let recorder = RecordingServices::new();
        let now = Instant::now();
        let mtce = Maintenance::new(config, recorder.services(), now);
        Self {
            mtce,
            recorder,
            now,
            _dir: dir,
        }
    }

    fn advance(&mut self, by: Duration) {
        self.now += by;
        self.mtce.tick(self.now);
    }

    fn ticks(&mut self, count: usize) {
        for _ in 0..count {
            self.advance(Duration::from_millis(10));
        }
    }

    fn add(&mut self, info: HostInfo) -> HostId {
        let id = self.mtce.add_host(info).unwrap();
        // Add runs five stages, one per tick.
        self.ticks(5);
        id
    }

    fn action(&self, name: &str) -> AdminAction {
        self.mtce.get_admin_action(name).unwrap()
    }
}

fn worker(name: &str, octet: u8) -> HostInfo {
    HostInfo::new(name, format!("uuid-{name}"), NodeType::WORKER)
        .with_mgmt(format!("192.168.204.{octet}"), format!("08:00:27:00:00:{octet:02x}"))
}

fn enabled(info: HostInfo) -> HostInfo {
    info.with_states(AdminState::Unlocked, OperState::Enabled, AvailStatus::Available)
}

#[test]
fn add_seeds_alarms_and_registers_monitors() {
    let mut h = Harness::new();
    h.recorder.set_alarm_query("compute-0", AlarmId::Pmond, AlarmSeverity::Major);

    h.mtce.add_host(worker("compute-0", 10)).unwrap();
    assert_eq!(h.action("compute-0"), AdminAction::Add);
    h.ticks(5);

    assert_eq!(h.action("compute-0"), AdminAction::None);
    let host = h.mtce.host("compute-0").unwrap();
    assert_eq!(host.alarms().get(AlarmId::Pmond), AlarmSeverity::Major);
    assert_eq!(host.alarms().get(AlarmId::Lock), AlarmSeverity::Warning);
    assert!(!host.hbs.is_monitored());
    assert!(h.recorder.hbs_commands("compute-0").contains(&HbsCommand::Add));
    assert_eq!(h.recorder.customer_logs_of("compute-0", LogKind::HostAdded), 1);
}

#[test]
fn unlock_walks_the_enable_sequence() {
    let mut h = Harness::new();
    h.add(worker("compute-0", 10));
    h.recorder.clear();

    h.mtce.admin_request("compute-0", AdminAction::Unlock).unwrap();
    let unlocked: Vec<_> = h
        .recorder
        .mtc_commands("compute-0")
        .into_iter()
        .filter(|(command, _)| *command == MtcCommand::Unlocked)
        .map(|(_, network)| network)
        .collect();
    assert_eq!(unlocked, vec![Network::Mgmnt, Network::Clstr]);
    assert_eq!(h.mtce.get_admin_state("compute-0").unwrap(), AdminState::Unlocked);

    h.ticks(1);
    assert_eq!(h.recorder.last_task("compute-0").as_deref(), Some("Booting"));

    h.mtce.post(MtceEvent::mtc_alive("compute-0", Network::Mgmnt, 1, 40));
    h.ticks(1);
    assert_eq!(h.mtce.get_avail_status("compute-0").unwrap(), AvailStatus::Intest);

    h.mtce.post(MtceEvent::GoEnabled {
        hostname: "compute-0".to_owned(),
        subf: false,
        passed: true,
    });
    h.ticks(2);
    assert!(h
        .recorder
        .mtc_commands("compute-0")
        .contains(&(MtcCommand::StartHostServices, Network::Mgmnt)));

    h.mtce.post(MtceEvent::HostServices {
        hostname: "compute-0".to_owned(),
        subf: false,
        passed: true,
    });
    h.ticks(2);
    assert!(h.mtce.host("compute-0").unwrap().hbs.is_monitored());
    assert_eq!(h.mtce.get_oper_state("compute-0").unwrap(), OperState::Disabled);

    // Heartbeat soak, then the state change and completion.
    h.advance(Duration::from_secs(12));
    h.ticks(2);

    assert_eq!(h.mtce.get_oper_state("compute-0").unwrap(), OperState::Enabled);
    assert_eq!(h.mtce.get_avail_status("compute-0").unwrap(), AvailStatus::Available);
    assert_eq!(h.action("compute-0"), AdminAction::None);
    let host = h.mtce.host("compute-0").unwrap();
    assert_eq!(host.alarms().get(AlarmId::Lock), AlarmSeverity::Clear);
    assert_eq!(host.task(), "");
    assert!(h.recorder.hbs_commands("compute-0").contains(&HbsCommand::Start));
    assert!(h.recorder.count(|call| matches!(
        call,
        Call::Vim { hostname, event: VimEvent::Enabled } if hostname == "compute-0"
    )) >= 1);
}

#[test]
fn failed_goenabled_is_governed_and_retried() {
    let mut h = Harness::new();
    h.add(worker("compute-0", 10));
    h.mtce.admin_request("compute-0", AdminAction::Unlock).unwrap();
    h.ticks(1);
    h.mtce.post(MtceEvent::mtc_alive("compute-0", Network::Mgmnt, 1, 40));
    h.ticks(1);
    h.mtce.post(MtceEvent::GoEnabled {
        hostname: "compute-0".to_owned(),
        subf: false,
        passed: false,
    });
    h.ticks(2);

    let host = h.mtce.host("compute-0").unwrap();
    assert_eq!(host.avail_status(), AvailStatus::Failed);
    assert_eq!(host.alarms().get(AlarmId::Enable), AlarmSeverity::Critical);
    assert_eq!(host.ar_state().count(mtce_common::ArCause::GoEnable), 1);
    assert!(!host.ar_state().disabled);
    // The retry stays under the unlock that started it.
    assert_eq!(h.action("compute-0"), AdminAction::Unlock);
    assert_eq!(host.stage::<EnableStage>(), Some(EnableStage::FailureWait));

    // The retry interval elapses and the next attempt starts with a reboot.
    h.advance(Duration::from_secs(31));
    h.ticks(2);
    assert!(h
        .recorder
        .mtc_commands("compute-0")
        .contains(&(MtcCommand::Reboot, Network::Mgmnt)));
}

#[test]
fn dead_office_recovery_extends_boot_wait() {
    let mut config = MtceConfig::default();
    config.agent.dor_mode = true;
    config.timeouts.mtcalive = Duration::from_secs(60);
    config.timeouts.dor_extension = Duration::from_secs(120);
    config.timeouts.dor_mode = Duration::from_secs(300);
    let mut h = Harness::with_config(config);
    assert!(h.mtce.dor().active);
    h.add(worker("compute-0", 10));

    h.mtce.admin_request("compute-0", AdminAction::Unlock).unwrap();
    h.ticks(1);
    h.advance(Duration::from_secs(100));
    let host = h.mtce.host("compute-0").unwrap();
    assert_eq!(host.stage::<EnableStage>(), Some(EnableStage::MtcAliveWait));
    assert_eq!(host.task(), "Booting");

    h.advance(Duration::from_secs(81));
    assert_eq!(h.mtce.host("compute-0").unwrap().task(), "Boot timeout");
    assert!(h.mtce.dor().active);

    h.advance(Duration::from_secs(120));
    assert!(!h.mtce.dor().active);
}

#[test]
fn boot_wait_without_dead_office_recovery() {
    let mut config = MtceConfig::default();
    config.timeouts.mtcalive = Duration::from_secs(60);
    let mut h = Harness::with_config(config);
    assert!(!h.mtce.dor().active);
    h.add(worker("compute-0", 10));

    h.mtce.admin_request("compute-0", AdminAction::Unlock).unwrap();
    h.ticks(1);
    h.advance(Duration::from_secs(61));
    assert_eq!(h.mtce.host("compute-0").unwrap().task(), "Boot timeout");
}

#[test]
fn raw_stage_values_are_clamped() {
    let mut h = Harness::new();
    h.add(worker("compute-0", 10));
    h.mtce.admin_request("compute-0", AdminAction::Unlock).unwrap();
    h.ticks(1);

    assert!(!h.mtce.change_stage_raw("compute-0", FsmKind::Disable, 0).unwrap());
    assert!(h.mtce.change_stage_raw("compute-0", FsmKind::Enable, 200).unwrap());
    let host = h.mtce.host("compute-0").unwrap();
    assert_eq!(host.stage::<EnableStage>(), Some(EnableStage::Done));
    assert!(h.mtce.change_stage_raw("compute-9", FsmKind::Enable, 0).is_err());
}

#[test]
fn lock_disables_and_stops_monitoring() {
    let mut h = Harness::new();
    h.add(enabled(worker("compute-0", 10)));
    assert!(h.mtce.host("compute-0").unwrap().hbs.is_monitored());

    h.mtce.admin_request("compute-0", AdminAction::Lock).unwrap();
    h.ticks(2);
    assert_eq!(h.mtce.get_admin_state("compute-0").unwrap(), AdminState::Locked);
    assert!(h
        .recorder
        .mtc_commands("compute-0")
        .contains(&(MtcCommand::StopHostServices, Network::Mgmnt)));

    h.mtce.post(MtceEvent::CommandAck {
        hostname: "compute-0".to_owned(),
        command: MtcCommand::StopHostServices,
    });
    h.ticks(3);

    assert_eq!(h.action("compute-0"), AdminAction::None);
    let host = h.mtce.host("compute-0").unwrap();
    assert_eq!(host.oper_state(), OperState::Disabled);
    assert_eq!(host.avail_status(), AvailStatus::Offline);
    assert_eq!(host.alarms().get(AlarmId::Lock), AlarmSeverity::Warning);
    assert!(!host.hbs.is_monitored());
    assert_eq!(h.recorder.customer_logs_of("compute-0", LogKind::Locked), 1);
}

#[test]
fn locking_the_active_controller_is_refused() {
    let mut h = Harness::new();
    h.add(enabled(HostInfo::new("controller-0", "uuid-c0", NodeType::CONTROLLER).with_mgmt("192.168.204.2", "")));

    let err = h.mtce.admin_request("controller-0", AdminAction::Lock).unwrap_err();
    assert!(matches!(err, MtceError::LockRejected { .. }), "{err}");
    let host = h.mtce.host("controller-0").unwrap();
    assert!(host.task().starts_with("Lock rejected"));
    assert_eq!(host.admin_action(), AdminAction::None);
    assert_eq!(host.admin_state(), AdminState::Unlocked);

    let err = h.mtce.admin_request("controller-0", AdminAction::ForceLock).unwrap_err();
    assert!(matches!(err, MtceError::LockRejected { .. }));
}

#[test]
fn requests_queue_behind_add() {
    let mut h = Harness::new();
    h.mtce.add_host(worker("compute-0", 10)).unwrap();

    h.mtce.admin_request("compute-0", AdminAction::Reset).unwrap();
    let err = h.mtce.admin_request("compute-0", AdminAction::Reset).unwrap_err();
    assert!(matches!(err, MtceError::DuplicateAction { .. }));
    h.mtce.admin_request("compute-0", AdminAction::Reboot).unwrap();
    let err = h.mtce.admin_request("compute-0", AdminAction::Reinstall).unwrap_err();
    assert!(matches!(err, MtceError::QueueFull { .. }));

    let queued: Vec<_> = h.mtce.host("compute-0").unwrap().queued_actions().collect();
    assert_eq!(queued, vec![AdminAction::Reset, AdminAction::Reboot]);

    h.ticks(5);
    let host = h.mtce.host("compute-0").unwrap();
    assert_eq!(host.admin_action(), AdminAction::Reset);
    assert_eq!(host.queued_actions().collect::<Vec<_>>(), vec![AdminAction::Reboot]);
}

#[test]
fn reset_runs_through_board_management() {
    let mut h = Harness::new();
    let bmc = BmcInfo {
        ip: "10.10.10.10".to_owned(),
        username: "root".to_owned(),
        password: "secret".to_owned(),
        protocol: "redfish".to_owned(),
    };
    h.add(worker("compute-0", 10).with_bmc(bmc));
    assert!(h.recorder.count(|call| matches!(
        call,
        Call::Hwmon { command: HwmonCommand::Add, .. }
    )) == 1);

    h.mtce.admin_request("compute-0", AdminAction::Reset).unwrap();
    for _ in 0..400 {
        if h.action("compute-0") == AdminAction::None {
            break;
        }
        h.advance(Duration::from_millis(50));
    }

    assert_eq!(h.action("compute-0"), AdminAction::None);
    assert_eq!(h.recorder.customer_logs_of("compute-0", LogKind::Reset), 1);
    assert_eq!(
        h.recorder.count(|call| matches!(call, Call::BmcStart { action: BmcAction::Reset, .. })),
        1
    );
    assert_eq!(h.mtce.host("compute-0").unwrap().task(), "");
}

#[test]
fn reset_without_board_management_fails_fast() {
    let mut h = Harness::new();
    h.add(worker("compute-0", 10));
    h.mtce.admin_request("compute-0", AdminAction::Reset).unwrap();
    h.ticks(2);
    assert_eq!(h.action("compute-0"), AdminAction::None);
    assert!(h.mtce.host("compute-0").unwrap().task().contains("not provisioned"));
}

#[test]
fn delete_removes_the_host_after_the_grace_period() {
    let mut h = Harness::new();
    h.add(worker("compute-0", 10));
    h.add(worker("compute-1", 11));

    h.mtce.delete_host("compute-0").unwrap();
    h.ticks(1);
    assert_eq!(h.mtce.host("compute-0").unwrap().task(), "Deleting");
    assert_eq!(h.mtce.host("compute-0").unwrap().alarms().get(AlarmId::Lock), AlarmSeverity::Clear);

    h.advance(Duration::from_secs(6));
    h.ticks(1);

    assert!(h.mtce.host("compute-0").is_none());
    assert_eq!(h.mtce.registry().len(), 1);
    assert!(h.mtce.registry().validate_links().is_ok());
    assert!(h.recorder.hbs_commands("compute-0").contains(&HbsCommand::Delete));
    assert_eq!(h.recorder.customer_logs_of("compute-0", LogKind::HostDeleted), 1);
    assert!(h.mtce.host("compute-1").is_some());
}

#[test]
fn unlocked_hosts_cannot_be_deleted() {
    let mut h = Harness::new();
    h.add(enabled(worker("compute-0", 10)));
    assert!(matches!(
        h.mtce.delete_host("compute-0"),
        Err(MtceError::InvalidRequest { .. })
    ));
}

//! ---
//! mtce_section: "07-resilience-fault-tolerance"
//! mtce_subsection: "tests"
//! mtce_type: "source"
//! mtce_scope: "test"
//! mtce_description: "Heartbeat loss escalation, multi-node failure avoidance and degrade handling."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
use std::time::{Duration, Instant};

use mtce_common::{ArCause, MnfaThresholdType, MtceConfig, Network};
use mtce_heartbeat::PulseFlags;
use mtce_node::collab::HbsCommand;
use mtce_node::testing::RecordingServices;
use mtce_node::{
    AdminAction, AdminState, AlarmId, AlarmSeverity, AvailStatus, DegradeCause, HostInfo,
    LogKind, Maintenance, MtceEvent, NodeType, OperState, PulseResponse,
};
use tempfile::TempDir;

struct Cluster {
    mtce: Maintenance,
    recorder: RecordingServices,
    names: Vec<String>,
    now: Instant,
    _dir: TempDir,
}

impl Cluster {
    fn new(workers: usize) -> Self {
        Self::with_config(workers, MtceConfig::default())
    }

    fn with_config(workers: usize, mut config: MtceConfig) -> Self {
        mtce_logging::init_for_tests();
        let dir = tempfile::tempdir().unwrap();
        config.agent.hostname = "controller-0".to_owned();
        config.agent.tmp_dir = dir.path().to_path_buf();
        let recorder = RecordingServices::new();
        let now = Instant::now();
        let mut cluster = Self {
            mtce: Maintenance::new(config, recorder.services(), now),
            recorder,
            names: Vec::new(),
            now,
            _dir: dir,
        };
        for index in 0..workers {
            let name = format!("compute-{index}");
            let info = HostInfo::new(&name, format!("uuid-{index}"), NodeType::WORKER)
                .with_mgmt(format!("192.168.204.{}", index + 10), "")
                .with_states(AdminState::Unlocked, OperState::Enabled, AvailStatus::Available);
            cluster.mtce.add_host(info).unwrap();
            cluster.names.push(name);
        }
        cluster.ticks(5);
        cluster
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

    /// One management pulse period in which the `silent` hosts do not answer.
    fn period(&mut self, silent: &[&str]) {
        self.mtce.start_pulse_period(Network::Mgmnt);
        for name in self.names.clone() {
            if silent.contains(&name.as_str()) {
                continue;
            }
            let rri = self.mtce.host(&name).unwrap().hbs.rri;
            self.mtce
                .pulse_response(Network::Mgmnt, &PulseResponse::new(name.as_str(), rri, PulseFlags::PMOND))
                .unwrap();
        }
        self.mtce.end_pulse_period(Network::Mgmnt);
    }

    fn periods(&mut self, count: usize, silent: &[&str]) {
        for _ in 0..count {
            self.period(silent);
        }
    }

    fn action(&self, name: &str) -> AdminAction {
        self.mtce.get_admin_action(name).unwrap()
    }

    fn avail(&self, name: &str) -> AvailStatus {
        self.mtce.get_avail_status(name).unwrap()
    }
}

#[test]
fn single_host_loss_triggers_graceful_recovery() {
    let mut c = Cluster::new(3);

    c.periods(6, &["compute-1"]);
    assert_eq!(c.avail("compute-1"), AvailStatus::Degraded);
    assert_eq!(
        c.mtce.host("compute-1").unwrap().alarms().get(AlarmId::MgmntHeartbeat),
        AlarmSeverity::Major
    );
    assert!(!c.mtce.mnfa().is_active());

    c.periods(3, &["compute-1"]);
    assert_eq!(c.action("compute-1"), AdminAction::None);
    c.period(&["compute-1"]);
    assert_eq!(c.action("compute-1"), AdminAction::Recovery);
    assert_eq!(
        c.mtce.host("compute-1").unwrap().alarms().get(AlarmId::MgmntHeartbeat),
        AlarmSeverity::Critical
    );
    assert_eq!(c.recorder.customer_logs_of("compute-1", LogKind::HeartbeatLoss), 1);

    // Further silent periods do not escalate again.
    c.periods(3, &["compute-1"]);
    assert_eq!(c.recorder.customer_logs_of("compute-1", LogKind::HeartbeatLoss), 1);

    c.ticks(1);
    assert_eq!(c.mtce.host("compute-1").unwrap().task(), "Graceful Recovery Wait");
    assert!(!c.mtce.host("compute-1").unwrap().hbs.is_monitored());

    // The host never rebooted, so it goes straight back to heartbeat soak.
    c.mtce.post(MtceEvent::mtc_alive("compute-1", Network::Mgmnt, 7, 86_400));
    c.ticks(2);
    assert!(c.mtce.host("compute-1").unwrap().hbs.is_monitored());
    c.advance(Duration::from_secs(12));
    c.ticks(2);

    assert_eq!(c.action("compute-1"), AdminAction::None);
    assert_eq!(c.avail("compute-1"), AvailStatus::Available);
    assert_eq!(c.mtce.get_oper_state("compute-1").unwrap(), OperState::Enabled);
    let host = c.mtce.host("compute-1").unwrap();
    assert_eq!(host.alarms().get(AlarmId::MgmntHeartbeat), AlarmSeverity::Clear);
    assert!(host.degrade_mask().is_empty());
}

#[test]
fn group_loss_enters_mnfa_and_suppresses_recovery() {
    let mut c = Cluster::new(4);
    let silent = ["compute-1", "compute-2"];

    c.periods(3, &silent);
    assert!(!c.mtce.mnfa().is_active());
    c.period(&silent);
    assert!(c.mtce.mnfa().is_active());
    assert_eq!(c.mtce.mnfa().occurrences(), 0);
    assert_eq!(c.mtce.mnfa().minor_count(Network::Mgmnt), 2);
    assert!(c.recorder.hbs_commands("compute-0").contains(&HbsCommand::Backoff));
    assert_eq!(c.recorder.customer_logs_of("controller-0", LogKind::MnfaEnter), 1);

    c.periods(8, &silent);
    for name in silent {
        assert_eq!(c.action(name), AdminAction::None);
        assert_eq!(c.recorder.customer_logs_of(name, LogKind::HeartbeatLoss), 0);
    }
    assert_eq!(c.mtce.mnfa().awol().len(), 2);

    c.periods(10, &[]);
    assert!(!c.mtce.mnfa().is_active());
    assert_eq!(c.mtce.mnfa().minor_count(Network::Mgmnt), 0);
    assert!(c.mtce.mnfa().awol().is_empty());
    assert_eq!(c.recorder.customer_logs_of("controller-0", LogKind::MnfaExit), 1);
    for name in ["compute-0", "compute-2", "compute-3"] {
        assert!(c.recorder.hbs_commands(name).contains(&HbsCommand::Recover));
    }
    for name in silent {
        assert_eq!(c.action(name), AdminAction::None);
        assert_eq!(c.avail(name), AvailStatus::Available);
        assert_eq!(
            c.mtce.host(name).unwrap().alarms().get(AlarmId::MgmntHeartbeat),
            AlarmSeverity::Clear
        );
    }
    assert_eq!(c.mtce.mnfa().occurrences(), 1);
}

#[test]
fn mnfa_timeout_forces_reenable_of_awol_hosts() {
    let mut config = MtceConfig::default();
    config.mnfa.timeout = Duration::from_secs(30);
    let mut c = Cluster::with_config(4, config);
    let silent = ["compute-1", "compute-2"];

    c.periods(10, &silent);
    assert!(c.mtce.mnfa().is_active());

    c.advance(Duration::from_secs(31));
    assert!(!c.mtce.mnfa().is_active());
    assert_eq!(c.mtce.mnfa().occurrences(), 1);
    for name in silent {
        let host = c.mtce.host(name).unwrap();
        assert_eq!(host.admin_action(), AdminAction::Enable);
        assert_eq!(host.avail_status(), AvailStatus::Failed);
        assert_eq!(host.alarms().get(AlarmId::Enable), AlarmSeverity::Critical);
        assert_eq!(host.ar_state().count(ArCause::Heartbeat), 1);
        assert!(!host.hbs.is_monitored());
    }
    assert_eq!(c.action("compute-0"), AdminAction::None);
    assert_eq!(c.avail("compute-0"), AvailStatus::Available);
}

#[test]
fn locking_a_minor_host_leaves_mnfa_accounting() {
    let mut c = Cluster::new(4);
    c.periods(4, &["compute-1"]);
    assert_eq!(c.mtce.mnfa().minor_count(Network::Mgmnt), 1);

    c.mtce.admin_request("compute-1", AdminAction::Lock).unwrap();
    c.ticks(1);
    assert_eq!(c.mtce.mnfa().minor_count(Network::Mgmnt), 0);
    assert!(c.mtce.mnfa().awol().is_empty());

    // A second host going minor alone must not reach the threshold.
    c.periods(4, &["compute-2"]);
    assert!(!c.mtce.mnfa().is_active());
}

#[test]
fn locking_a_member_below_threshold_ends_mnfa() {
    let mut c = Cluster::new(4);
    c.periods(4, &["compute-1", "compute-2"]);
    assert!(c.mtce.mnfa().is_active());

    c.mtce.admin_request("compute-1", AdminAction::Lock).unwrap();
    c.ticks(1);
    assert!(!c.mtce.mnfa().is_active());
    assert_eq!(c.mtce.mnfa().minor_count(Network::Mgmnt), 0);
    assert!(c.mtce.mnfa().awol().is_empty());
    assert_eq!(c.mtce.mnfa().occurrences(), 1);
    assert_eq!(c.recorder.customer_logs_of("controller-0", LogKind::MnfaExit), 1);
    assert!(c.recorder.hbs_commands("compute-2").contains(&HbsCommand::Recover));

    // The host still missing pulses is now handled on its own.
    c.periods(10, &["compute-2"]);
    assert!(!c.mtce.mnfa().is_active());
    assert_eq!(c.action("compute-2"), AdminAction::Recovery);
    assert_eq!(c.recorder.customer_logs_of("compute-2", LogKind::HeartbeatLoss), 1);
}

#[test]
fn percent_threshold_scales_with_enabled_hosts() {
    let percent = || {
        let mut config = MtceConfig::default();
        config.mnfa.threshold_type = MnfaThresholdType::Percent;
        config.mnfa.threshold_percent = 50;
        config
    };

    // Eight enabled hosts at 50% need four in minor.
    let mut c = Cluster::with_config(8, percent());
    c.periods(4, &["compute-1", "compute-2", "compute-3"]);
    assert_eq!(c.mtce.mnfa().minor_count(Network::Mgmnt), 3);
    assert!(!c.mtce.mnfa().is_active());

    let mut c = Cluster::with_config(8, percent());
    c.periods(4, &["compute-1", "compute-2", "compute-3", "compute-4"]);
    assert!(c.mtce.mnfa().is_active());
    assert_eq!(c.mtce.mnfa().minor_count(Network::Mgmnt), 4);
}

#[test]
fn failing_a_host_keeps_heartbeat_run_counters() {
    let mut c = Cluster::new(2);
    c.period(&["compute-0"]);
    let id = c.mtce.host_id("compute-0").unwrap();
    c.mtce.set_avail_status(id, AvailStatus::Failed).unwrap();

    let host = c.mtce.host("compute-0").unwrap();
    assert!(host.mtc_alive_gate_closed());
    assert_eq!(host.hbs.net[Network::Mgmnt].b2b_misses, 1);
}

#[test]
fn degrade_causes_combine_before_clearing() {
    let mut c = Cluster::new(2);
    for cause in [DegradeCause::Hwmon, DegradeCause::Collectd] {
        c.mtce.post(MtceEvent::DegradeRaise {
            hostname: "compute-0".to_owned(),
            cause,
        });
    }
    c.ticks(1);
    assert_eq!(c.avail("compute-0"), AvailStatus::Degraded);

    c.mtce.post(MtceEvent::DegradeClear {
        hostname: "compute-0".to_owned(),
        cause: DegradeCause::Hwmon,
    });
    c.ticks(1);
    assert_eq!(c.avail("compute-0"), AvailStatus::Degraded);

    c.mtce.post(MtceEvent::DegradeClear {
        hostname: "compute-0".to_owned(),
        cause: DegradeCause::Collectd,
    });
    c.ticks(1);
    assert_eq!(c.avail("compute-0"), AvailStatus::Available);
    assert!(c.mtce.host("compute-0").unwrap().degrade_mask().is_empty());
}

//! ---
//! mtce_section: "15-testing-qa-runbook"
//! mtce_subsection: "tests"
//! mtce_type: "source"
//! mtce_scope: "test"
//! mtce_description: "Agent wiring across metrics, journal, and the maintenance core."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
use std::time::{Duration, Instant};

use mtce_common::{MtceConfig, Network};
use mtce_heartbeat::PulseFlags;
use mtce_metrics::{new_registry, MaintenanceMetrics};
use mtce_node::testing::RecordingServices;
use mtce_node::{
    AdminAction, AdminState, AvailStatus, HostInfo, Maintenance, NodeType, OperState,
    PulseResponse,
};
use mtce_persistence::{replay_journal, JournalWriter};

fn worker(index: usize) -> HostInfo {
    HostInfo::new(format!("compute-{index}"), format!("uuid-{index}"), NodeType::WORKER)
        .with_mgmt(format!("192.168.204.{}", index + 20), "")
        .with_states(AdminState::Unlocked, OperState::Enabled, AvailStatus::Available)
}

fn silent_period(mtce: &mut Maintenance, silent: &str) {
    mtce.start_pulse_period(Network::Mgmnt);
    let responses: Vec<PulseResponse> = mtce
        .registry()
        .iter()
        .filter(|(_, host)| host.hostname != silent)
        .map(|(_, host)| PulseResponse::new(host.hostname.as_str(), host.hbs.rri, PulseFlags::PMOND))
        .collect();
    for response in &responses {
        mtce.pulse_response(Network::Mgmnt, response).unwrap();
    }
    mtce.end_pulse_period(Network::Mgmnt);
}

#[test]
fn heartbeat_loss_is_counted_and_journaled() {
    let dir = tempfile::tempdir().unwrap();
    let journal_path = dir.path().join("customer.log");
    let mut config = MtceConfig::default();
    config.agent.hostname = "controller-0".to_owned();
    config.agent.tmp_dir = dir.path().to_path_buf();

    let registry = new_registry();
    let metrics = MaintenanceMetrics::new(&registry).unwrap();
    let recorder = RecordingServices::new();
    let mut now = Instant::now();
    let mut mtce = Maintenance::new(config, recorder.services(), now)
        .with_metrics(metrics.clone())
        .with_journal(JournalWriter::open(&journal_path).unwrap());

    for index in 0..3 {
        mtce.add_host(worker(index)).unwrap();
    }
    for _ in 0..5 {
        now += Duration::from_millis(10);
        mtce.tick(now);
    }
    for _ in 0..10 {
        silent_period(&mut mtce, "compute-1");
    }

    assert_eq!(mtce.get_admin_action("compute-1").unwrap(), AdminAction::Recovery);
    assert_eq!(metrics.heartbeat_losses(Network::Mgmnt.as_str()), 1);
    assert_eq!(metrics.mnfa_occurrences(), 0);

    let mut events = Vec::new();
    let replayed = replay_journal(&journal_path, |record| {
        events.push((record.sequence, record.hostname, record.event));
        Ok(())
    })
    .unwrap();
    assert_eq!(replayed, events.len());
    assert!(events
        .iter()
        .any(|(_, host, event)| host == "compute-1" && event == "heartbeat-loss"));
    assert_eq!(
        events.iter().filter(|(_, _, event)| event == "host-added").count(),
        3
    );
    let sequences: Vec<u64> = events.iter().map(|(sequence, _, _)| *sequence).collect();
    let expected: Vec<u64> = (1..=sequences.len() as u64).collect();
    assert_eq!(sequences, expected);

    let families = registry.gather();
    assert!(families
        .iter()
        .any(|family| family.get_name().starts_with("mtce_")));
}

//! ---
//! mtce_section: "07-resilience-fault-tolerance"
//! mtce_subsection: "tests"
//! mtce_type: "source"
//! mtce_scope: "test"
//! mtce_description: "Pulse period behaviour across many cycles."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
use mtce_common::{HostId, Network};
use mtce_heartbeat::{
    HbsHost, HeartbeatEventKind, PulseConfig, PulseFlags, PulseHosts, PulseResponse, PulseTracker,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

struct Fleet {
    names: Vec<String>,
    hbs: Vec<HbsHost>,
}

impl Fleet {
    fn new(count: usize) -> Self {
        let names = (0..count).map(|i| format!("compute-{i}")).collect();
        let hbs = (0..count)
            .map(|_| {
                let mut host = HbsHost::default();
                host.net[Network::Mgmnt].monitored = true;
                host
            })
            .collect();
        Self { names, hbs }
    }

    fn state(&self, index: usize) -> &HbsHost {
        &self.hbs[index]
    }
}

impl PulseHosts for Fleet {
    fn pulse_host(&self, id: HostId) -> Option<&HbsHost> {
        self.hbs.get(id.index())
    }
    fn pulse_host_mut(&mut self, id: HostId) -> Option<&mut HbsHost> {
        self.hbs.get_mut(id.index())
    }
    fn pulse_members(&self) -> Vec<HostId> {
        (0..self.names.len() as u32).map(|i| HostId::new(i, 1)).collect()
    }
    fn find_pulse_host(&self, hostname: &str) -> Option<HostId> {
        self.names
            .iter()
            .position(|name| name == hostname)
            .map(|i| HostId::new(i as u32, 1))
    }
    fn hostname(&self, id: HostId) -> Option<&str> {
        self.names.get(id.index()).map(String::as_str)
    }
    fn is_controller(&self, _id: HostId) -> bool {
        false
    }
}

fn respond(tracker: &mut PulseTracker, fleet: &mut Fleet, index: usize) -> Vec<HeartbeatEventKind> {
    let name = fleet.names[index].clone();
    let rri = fleet.hbs[index].rri;
    tracker
        .remove_pulse(fleet, Network::Mgmnt, &PulseResponse::new(name, rri, PulseFlags::PMOND))
        .unwrap()
        .into_iter()
        .map(|event| event.kind)
        .collect()
}

#[test]
fn one_silent_host_is_counted_once() {
    let mut fleet = Fleet::new(3);
    let mut tracker = PulseTracker::new(PulseConfig::default());
    tracker.build_rra(&mut fleet);

    assert_eq!(tracker.create_pulse_list(&mut fleet, Network::Mgmnt), 3);
    respond(&mut tracker, &mut fleet, 0);
    respond(&mut tracker, &mut fleet, 2);

    assert_eq!(fleet.state(1).net[Network::Mgmnt].b2b_misses, 0);
    let report = tracker.sweep_losses(&mut fleet, Network::Mgmnt);
    assert_eq!(report.lost, 1);
    assert_eq!(fleet.state(1).net[Network::Mgmnt].b2b_misses, 1);
    assert_eq!(fleet.state(0).net[Network::Mgmnt].b2b_misses, 0);
    assert_eq!(tracker.pending(Network::Mgmnt), 0);
}

#[test]
fn loss_is_declared_exactly_once() {
    let mut fleet = Fleet::new(2);
    let mut tracker = PulseTracker::new(PulseConfig::default());
    tracker.build_rra(&mut fleet);

    let mut losses = Vec::new();
    for period in 1..=25u32 {
        tracker.create_pulse_list(&mut fleet, Network::Mgmnt);
        respond(&mut tracker, &mut fleet, 0);
        let report = tracker.sweep_losses(&mut fleet, Network::Mgmnt);
        for event in report.events {
            if matches!(event.kind, HeartbeatEventKind::Loss(Network::Mgmnt)) {
                losses.push(period);
            }
        }
    }

    assert_eq!(losses, vec![10]);
    assert!(fleet.state(1).net[Network::Mgmnt].failure);
    assert_eq!(fleet.state(1).net[Network::Mgmnt].lifetime_misses, 25);
}

#[test]
fn failure_clears_only_after_required_hits() {
    let mut fleet = Fleet::new(1);
    let config = PulseConfig::default();
    let required = config.pulses_required_for_recovery;
    let mut tracker = PulseTracker::new(config);
    tracker.build_rra(&mut fleet);

    for _ in 0..10 {
        tracker.create_pulse_list(&mut fleet, Network::Mgmnt);
        tracker.sweep_losses(&mut fleet, Network::Mgmnt);
    }
    assert!(fleet.state(0).net[Network::Mgmnt].failure);

    for hit in 1..required {
        tracker.create_pulse_list(&mut fleet, Network::Mgmnt);
        let kinds = respond(&mut tracker, &mut fleet, 0);
        assert!(kinds.is_empty(), "hit {hit} cleared early: {kinds:?}");
        tracker.sweep_losses(&mut fleet, Network::Mgmnt);
        assert!(fleet.state(0).net[Network::Mgmnt].failure);
        assert!(fleet.state(0).net[Network::Mgmnt].minor);
    }

    tracker.create_pulse_list(&mut fleet, Network::Mgmnt);
    let kinds = respond(&mut tracker, &mut fleet, 0);
    assert_eq!(
        kinds,
        vec![
            HeartbeatEventKind::LossClear(Network::Mgmnt),
            HeartbeatEventKind::DegradeClear(Network::Mgmnt),
            HeartbeatEventKind::MinorClear(Network::Mgmnt),
        ]
    );
    let state = &fleet.state(0).net[Network::Mgmnt];
    assert!(!state.failure && !state.degrade && !state.minor);
}

#[test]
fn a_miss_resets_recovery_progress() {
    let mut fleet = Fleet::new(1);
    let mut tracker = PulseTracker::new(PulseConfig::default());
    tracker.build_rra(&mut fleet);
    for _ in 0..10 {
        tracker.create_pulse_list(&mut fleet, Network::Mgmnt);
        tracker.sweep_losses(&mut fleet, Network::Mgmnt);
    }
    for _ in 0..9 {
        tracker.create_pulse_list(&mut fleet, Network::Mgmnt);
        respond(&mut tracker, &mut fleet, 0);
        tracker.sweep_losses(&mut fleet, Network::Mgmnt);
    }
    tracker.create_pulse_list(&mut fleet, Network::Mgmnt);
    tracker.sweep_losses(&mut fleet, Network::Mgmnt);
    assert_eq!(fleet.state(0).net[Network::Mgmnt].b2b_hits, 0);

    tracker.create_pulse_list(&mut fleet, Network::Mgmnt);
    assert!(respond(&mut tracker, &mut fleet, 0).is_empty());
    assert!(fleet.state(0).net[Network::Mgmnt].failure);
}

#[test]
fn randomized_periods_keep_lists_consistent() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut fleet = Fleet::new(16);
    let mut tracker = PulseTracker::new(PulseConfig::default());
    tracker.build_rra(&mut fleet);

    for _ in 0..200 {
        let created = tracker.create_pulse_list(&mut fleet, Network::Mgmnt);
        assert_eq!(created, 16);
        let mut responded = 0;
        for index in 0..16 {
            if rng.gen_bool(0.7) {
                respond(&mut tracker, &mut fleet, index);
                responded += 1;
            }
        }
        let walked = tracker.pulse_list(&fleet, Network::Mgmnt);
        assert_eq!(walked.len(), 16 - responded);
        assert_eq!(tracker.pending(Network::Mgmnt), walked.len());
        let report = tracker.sweep_losses(&mut fleet, Network::Mgmnt);
        assert_eq!(report.lost, 16 - responded);
    }

    for host in &fleet.hbs {
        let state = &host.net[Network::Mgmnt];
        if state.failure {
            assert!(state.minor && state.degrade);
        }
    }
}

#[test]
fn unmonitored_hosts_are_never_listed() {
    let mut fleet = Fleet::new(4);
    let mut tracker = PulseTracker::new(PulseConfig::default());
    tracker.build_rra(&mut fleet);
    let locked = fleet.find_pulse_host("compute-2").unwrap();
    tracker.stop_host(&mut fleet, locked);

    assert_eq!(tracker.create_pulse_list(&mut fleet, Network::Mgmnt), 3);
    assert!(!tracker.pulse_list(&fleet, Network::Mgmnt).contains(&locked));
}

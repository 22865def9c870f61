//! ---
//! mtce_section: "01-core-functionality"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Node maintenance core."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
//! Alarm identifiers, severities and the per-host severity cache.

use mtce_common::Network;

mtce_enum! {
    /// Maintenance alarm identifiers.
    pub enum AlarmId: "alarm" {
        Lock => "200.001",
        Enable => "200.004",
        MgmntHeartbeat => "200.005",
        Pmond => "200.006",
        ClstrHeartbeat => "200.009",
        BmcAccess => "200.010",
        Config => "200.011",
        SubfEnable => "200.013",
    }
}

impl AlarmId {
    pub fn heartbeat(network: Network) -> Option<AlarmId> {
        match network {
            Network::Mgmnt => Some(AlarmId::MgmntHeartbeat),
            Network::Clstr => Some(AlarmId::ClstrHeartbeat),
            Network::Pxeboot => None,
        }
    }

    /// Network qualifier of the alarm's entity path.
    pub fn network(&self) -> Option<Network> {
        match self {
            AlarmId::MgmntHeartbeat => Some(Network::Mgmnt),
            AlarmId::ClstrHeartbeat => Some(Network::Clstr),
            _ => None,
        }
    }

    /// Short reason text used with the fault manager.
    pub fn reason(&self) -> &'static str {
        match self {
            AlarmId::Lock => "was administratively locked to take it out-of-service",
            AlarmId::Enable => "experienced a service-affecting failure",
            AlarmId::MgmntHeartbeat => "is experiencing a heartbeat failure on the management network",
            AlarmId::Pmond => "process monitor is not responding",
            AlarmId::ClstrHeartbeat => "is experiencing a heartbeat failure on the cluster-host network",
            AlarmId::BmcAccess => "board management controller is not responding",
            AlarmId::Config => "configuration failed or timed out",
            AlarmId::SubfEnable => "worker subfunction experienced a service-affecting failure",
        }
    }
}

mtce_enum! {
    /// Alarm severity; `Clear` means no alarm is raised.
    #[derive(PartialOrd, Ord, Default)]
    pub enum AlarmSeverity: "alarm severity" {
        #[default]
        Clear => "clear",
        Warning => "warning",
        Minor => "minor",
        Major => "major",
        Critical => "critical",
    }
}

/// Fault-manager entity path: `host=<hostname>[.network=<name>]`.
pub fn entity_path(hostname: &str, network: Option<Network>) -> String {
    match network {
        Some(network) => format!("host={hostname}.network={}", network.entity_name()),
        None => format!("host={hostname}"),
    }
}

/// Last severity successfully reported for each alarm of one host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlarmCache([AlarmSeverity; 8]);

impl AlarmCache {
    pub fn get(&self, id: AlarmId) -> AlarmSeverity {
        self.0[id.raw() as usize]
    }

    pub fn set(&mut self, id: AlarmId, severity: AlarmSeverity) {
        self.0[id.raw() as usize] = severity;
    }

    pub fn raised(&self) -> impl Iterator<Item = (AlarmId, AlarmSeverity)> + '_ {
        AlarmId::ALL
            .iter()
            .map(|id| (*id, self.get(*id)))
            .filter(|(_, severity)| *severity != AlarmSeverity::Clear)
    }
}

//! ---
//! mtce_section: "01-core-functionality"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Shared primitives and utilities for the maintenance agent."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
use std::fmt;
use std::ops::{Index, IndexMut};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Raised when a textual value does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownValue {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownValue {
    pub fn new(kind: &'static str, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }
}

/// Stable handle to a host record held in the registry arena.
///
/// The generation is bumped every time a slot is reused so a handle kept
/// across a delete never resolves to the host that replaced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostId {
    index: u32,
    generation: u32,
}

impl HostId {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub const fn index(&self) -> usize {
        self.index as usize
    }

    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// Networks a host is heartbeat monitored on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mgmnt,
    Clstr,
    Pxeboot,
}

impl Network {
    pub const ALL: [Network; 3] = [Network::Mgmnt, Network::Clstr, Network::Pxeboot];

    pub const fn index(&self) -> usize {
        match self {
            Network::Mgmnt => 0,
            Network::Clstr => 1,
            Network::Pxeboot => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mgmnt => "Mgmnt",
            Network::Clstr => "Clstr",
            Network::Pxeboot => "Pxeboot",
        }
    }

    /// Name used in fault-manager entity paths.
    pub fn entity_name(&self) -> &'static str {
        match self {
            Network::Mgmnt => "Management",
            Network::Clstr => "Cluster-host",
            Network::Pxeboot => "Pxeboot",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mgmnt" | "mgmt" | "management" => Ok(Network::Mgmnt),
            "clstr" | "cluster" | "cluster-host" => Ok(Network::Clstr),
            "pxeboot" => Ok(Network::Pxeboot),
            other => Err(UnknownValue::new("network", other)),
        }
    }
}

/// Fixed-size per-network storage indexed by [`Network`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NetworkMap<T>([T; 3]);

impl<T> NetworkMap<T> {
    pub const fn from_array(values: [T; 3]) -> Self {
        Self(values)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Network, &T)> {
        Network::ALL.into_iter().zip(self.0.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Network, &mut T)> {
        Network::ALL.into_iter().zip(self.0.iter_mut())
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.0.iter()
    }
}

impl<T: Clone> NetworkMap<T> {
    pub fn splat(value: T) -> Self {
        Self([value.clone(), value.clone(), value])
    }
}

impl<T> Index<Network> for NetworkMap<T> {
    type Output = T;

    fn index(&self, network: Network) -> &Self::Output {
        &self.0[network.index()]
    }
}

impl<T> IndexMut<Network> for NetworkMap<T> {
    fn index_mut(&mut self, network: Network) -> &mut Self::Output {
        &mut self.0[network.index()]
    }
}

/// Failure causes tracked independently by the auto-recovery governor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArCause {
    Config,
    GoEnable,
    HostServices,
    Heartbeat,
}

impl ArCause {
    pub const ALL: [ArCause; 4] = [
        ArCause::Config,
        ArCause::GoEnable,
        ArCause::HostServices,
        ArCause::Heartbeat,
    ];

    pub const fn index(&self) -> usize {
        match self {
            ArCause::Config => 0,
            ArCause::GoEnable => 1,
            ArCause::HostServices => 2,
            ArCause::Heartbeat => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ArCause::Config => "config",
            ArCause::GoEnable => "goenable",
            ArCause::HostServices => "host-services",
            ArCause::Heartbeat => "heartbeat",
        }
    }
}

impl fmt::Display for ArCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_map_indexes_by_network() {
        let mut map = NetworkMap::splat(0u32);
        map[Network::Clstr] = 7;
        assert_eq!(map[Network::Mgmnt], 0);
        assert_eq!(map[Network::Clstr], 7);
        let collected: Vec<_> = map.iter().map(|(n, v)| (n, *v)).collect();
        assert_eq!(collected[1], (Network::Clstr, 7));
    }

    #[test]
    fn network_parses_aliases() {
        assert_eq!("mgmt".parse::<Network>().unwrap(), Network::Mgmnt);
        assert_eq!("Cluster-Host".parse::<Network>().unwrap(), Network::Clstr);
        assert!("infra".parse::<Network>().is_err());
    }
}

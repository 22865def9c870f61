//! ---
//! mtce_section: "01-core-functionality"
//! mtce_subsection: "module"
//! mtce_type: "source"
//! mtce_scope: "code"
//! mtce_description: "Node maintenance core."
//! mtce_version: "v0.0.0-prealpha"
//! mtce_owner: "tbd"
//! ---
//! Host registry.
//!
//! Hosts live in a slot arena addressed by generation-checked [`HostId`]s and
//! are threaded into an insertion-ordered doubly linked list. Removing a host
//! bumps the slot generation, so handles held across a delete go stale rather
//! than aliasing the next occupant.

use mtce_common::HostId;
use mtce_heartbeat::{HbsHost, PulseHosts};

use crate::error::{MtceError, Result};
use crate::host::{Host, HostInfo};

#[derive(Debug)]
struct Slot {
    generation: u32,
    host: Option<Host>,
}

/// Identity fields that must be unique across the registry.
struct Identity<'a> {
    hostname: &'a str,
    uuid: &'a str,
    mgmt_ip: &'a str,
    clstr_ip: &'a str,
    mgmt_mac: &'a str,
    clstr_mac: &'a str,
}

impl<'a> Identity<'a> {
    fn of_host(host: &'a Host) -> Self {
        Self {
            hostname: &host.hostname,
            uuid: &host.uuid,
            mgmt_ip: &host.mgmt_ip,
            clstr_ip: &host.clstr_ip,
            mgmt_mac: &host.mgmt_mac,
            clstr_mac: &host.clstr_mac,
        }
    }

    fn of_info(info: &'a HostInfo) -> Self {
        Self {
            hostname: &info.hostname,
            uuid: &info.uuid,
            mgmt_ip: &info.mgmt_ip,
            clstr_ip: &info.clstr_ip,
            mgmt_mac: &info.mgmt_mac,
            clstr_mac: &info.clstr_mac,
        }
    }
}

fn same(a: &str, b: &str) -> bool {
    !a.is_empty() && a == b
}

/// Insertion-ordered registry of maintained hosts.
#[derive(Debug)]
pub struct Registry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    head: Option<HostId>,
    tail: Option<HostId>,
    count: usize,
    max_hosts: usize,
}

impl Registry {
    pub fn new(max_hosts: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            count: 0,
            max_hosts,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn max_hosts(&self) -> usize {
        self.max_hosts
    }

    pub fn head(&self) -> Option<HostId> {
        self.head
    }

    pub fn tail(&self) -> Option<HostId> {
        self.tail
    }

    pub fn get(&self, id: HostId) -> Option<&Host> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.host.as_ref())
    }

    pub fn get_mut(&mut self, id: HostId) -> Option<&mut Host> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.host.as_mut())
    }

    pub fn contains(&self, id: HostId) -> bool {
        self.get(id).is_some()
    }

    /// Append a host at the tail. Rejects duplicates and enforces capacity.
    pub fn add(&mut self, mut host: Host) -> Result<HostId> {
        if self.count >= self.max_hosts {
            return Err(MtceError::AtCapacity(self.max_hosts));
        }
        self.check_unique(&Identity::of_host(&host), None)?;

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 1,
                    host: None,
                });
                (self.slots.len() - 1) as u32
            }
        };
        let generation = self.slots[index as usize].generation;
        let id = HostId::new(index, generation);

        host.prev = self.tail;
        host.next = None;
        match self.tail.and_then(|tail| self.get_mut(tail)) {
            Some(tail) => tail.next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        self.slots[index as usize].host = Some(host);
        self.count += 1;
        Ok(id)
    }

    /// Unlink and return a host. The handle and any copies of it go stale.
    pub fn remove(&mut self, id: HostId) -> Result<Host> {
        if !self.contains(id) {
            return Err(MtceError::StaleHost(id));
        }
        let slot = &mut self.slots[id.index()];
        let Some(mut host) = slot.host.take() else {
            return Err(MtceError::StaleHost(id));
        };
        slot.generation = slot.generation.wrapping_add(1).max(1);
        self.free.push(id.index() as u32);

        let (prev, next) = (host.prev.take(), host.next.take());
        match prev.and_then(|prev| self.get_mut(prev)) {
            Some(prev_host) => prev_host.next = next,
            None => self.head = next,
        }
        match next.and_then(|next| self.get_mut(next)) {
            Some(next_host) => next_host.prev = prev,
            None => self.tail = prev,
        }
        self.count -= 1;
        Ok(host)
    }

    /// Look a host up by hostname, then management, cluster and pxeboot IP, then uuid.
    pub fn find(&self, key: &str) -> Option<HostId> {
        if key.is_empty() {
            return None;
        }
        let lookups: [fn(&Host) -> &str; 5] = [
            |host| host.hostname.as_str(),
            |host| host.mgmt_ip.as_str(),
            |host| host.clstr_ip.as_str(),
            |host| host.pxeboot_ip.as_str(),
            |host| host.uuid.as_str(),
        ];
        lookups
            .iter()
            .find_map(|field| self.iter().find(|(_, host)| field(host) == key).map(|(id, _)| id))
    }

    pub fn by_hostname(&self, hostname: &str) -> Option<HostId> {
        self.iter()
            .find(|(_, host)| host.hostname == hostname)
            .map(|(id, _)| id)
    }

    pub fn by_uuid(&self, uuid: &str) -> Option<HostId> {
        self.iter()
            .find(|(_, host)| same(&host.uuid, uuid))
            .map(|(id, _)| id)
    }

    /// Update an existing host located by uuid. Returns whether its configuration changed.
    pub fn modify(&mut self, info: HostInfo) -> Result<(HostId, bool)> {
        info.validate()?;
        let id = self
            .by_uuid(&info.uuid)
            .ok_or_else(|| MtceError::NotFound(info.uuid.clone()))?;
        self.check_unique(&Identity::of_info(&info), Some(id))?;
        let host = self.get_mut(id).ok_or(MtceError::StaleHost(id))?;
        Ok((id, host.apply_info(info)))
    }

    /// Restartable walk in insertion order.
    pub fn iter(&self) -> Hosts<'_> {
        Hosts {
            registry: self,
            cursor: self.head,
            remaining: self.count,
        }
    }

    /// Snapshot of the current handles, for loops that mutate the registry.
    pub fn ids(&self) -> Vec<HostId> {
        self.iter().map(|(id, _)| id).collect()
    }

    /// Check list integrity: reachable count, back links and tail.
    pub fn validate_links(&self) -> std::result::Result<usize, String> {
        let mut walked = 0usize;
        let mut prev: Option<HostId> = None;
        let mut cursor = self.head;
        while let Some(id) = cursor {
            if walked > self.count {
                return Err(format!("cycle detected after {walked} hosts"));
            }
            let host = self
                .get(id)
                .ok_or_else(|| format!("dangling link to {id} after {walked} hosts"))?;
            if host.prev != prev {
                return Err(format!("{} has a broken back link", host.hostname));
            }
            walked += 1;
            prev = Some(id);
            cursor = host.next;
        }
        if prev != self.tail {
            return Err("tail does not terminate the list".to_owned());
        }
        if walked != self.count {
            return Err(format!("walked {walked} hosts, expected {}", self.count));
        }
        Ok(walked)
    }

    fn check_unique(&self, candidate: &Identity<'_>, skip: Option<HostId>) -> Result<()> {
        for (id, host) in self.iter() {
            if Some(id) == skip {
                continue;
            }
            let existing = Identity::of_host(host);
            if same(existing.uuid, candidate.uuid) {
                return Err(MtceError::DuplicateUuid(candidate.uuid.to_owned()));
            }
            if same(existing.hostname, candidate.hostname) {
                return Err(MtceError::DuplicateHostname(candidate.hostname.to_owned()));
            }
            if same(existing.mgmt_ip, candidate.mgmt_ip) {
                return Err(MtceError::DuplicateIp {
                    field: "mgmt_ip",
                    value: candidate.mgmt_ip.to_owned(),
                });
            }
            if same(existing.clstr_ip, candidate.clstr_ip) {
                return Err(MtceError::DuplicateIp {
                    field: "clstr_ip",
                    value: candidate.clstr_ip.to_owned(),
                });
            }
            if same(existing.mgmt_mac, candidate.mgmt_mac) {
                return Err(MtceError::DuplicateMac {
                    field: "mgmt_mac",
                    value: candidate.mgmt_mac.to_owned(),
                });
            }
            if same(existing.clstr_mac, candidate.clstr_mac) {
                return Err(MtceError::DuplicateMac {
                    field: "clstr_mac",
                    value: candidate.clstr_mac.to_owned(),
                });
            }
        }
        Ok(())
    }
}

/// Iterator over `(HostId, &Host)` in insertion order.
pub struct Hosts<'a> {
    registry: &'a Registry,
    cursor: Option<HostId>,
    remaining: usize,
}

impl<'a> Iterator for Hosts<'a> {
    type Item = (HostId, &'a Host);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let id = self.cursor?;
        let host = self.registry.get(id)?;
        self.cursor = host.next;
        self.remaining -= 1;
        Some((id, host))
    }
}

impl PulseHosts for Registry {
    fn pulse_host(&self, id: HostId) -> Option<&HbsHost> {
        self.get(id).map(|host| &host.hbs)
    }

    fn pulse_host_mut(&mut self, id: HostId) -> Option<&mut HbsHost> {
        self.get_mut(id).map(|host| &mut host.hbs)
    }

    fn pulse_members(&self) -> Vec<HostId> {
        self.ids()
    }

    fn find_pulse_host(&self, hostname: &str) -> Option<HostId> {
        self.by_hostname(hostname)
    }

    fn hostname(&self, id: HostId) -> Option<&str> {
        self.get(id).map(|host| host.hostname.as_str())
    }

    fn is_controller(&self, id: HostId) -> bool {
        self.get(id).is_some_and(Host::is_controller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::NodeType;

    fn host(name: &str, n: u8) -> Host {
        let info = HostInfo::new(name, format!("uuid-{name}"), NodeType::WORKER)
            .with_mgmt(format!("10.0.0.{n}"), format!("aa:00:00:00:00:{n:02x}"));
        Host::new(info, HbsHost::default())
    }

    #[test]
    fn add_appends_in_order() {
        let mut registry = Registry::new(8);
        let a = registry.add(host("compute-0", 1)).unwrap();
        let b = registry.add(host("compute-1", 2)).unwrap();
        assert_eq!(registry.head(), Some(a));
        assert_eq!(registry.tail(), Some(b));
        assert_eq!(registry.validate_links(), Ok(2));
        let names: Vec<_> = registry.iter().map(|(_, h)| h.hostname.clone()).collect();
        assert_eq!(names, ["compute-0", "compute-1"]);
    }

    #[test]
    fn duplicates_are_rejected() {
        let mut registry = Registry::new(8);
        registry.add(host("compute-0", 1)).unwrap();
        let err = registry.add(host("compute-0", 2)).unwrap_err();
        assert!(matches!(err, MtceError::DuplicateUuid(_)));

        let mut clash = host("compute-1", 1);
        clash.mgmt_mac = "bb:00:00:00:00:01".into();
        let err = registry.add(clash).unwrap_err();
        assert_eq!(
            err,
            MtceError::DuplicateIp {
                field: "mgmt_ip",
                value: "10.0.0.1".into()
            }
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn empty_identity_fields_never_collide() {
        let mut registry = Registry::new(8);
        let mut a = host("compute-0", 1);
        a.clstr_ip.clear();
        let mut b = host("compute-1", 2);
        b.clstr_ip.clear();
        registry.add(a).unwrap();
        registry.add(b).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn capacity_is_enforced() {
        let mut registry = Registry::new(2);
        registry.add(host("compute-0", 1)).unwrap();
        registry.add(host("compute-1", 2)).unwrap();
        assert_eq!(registry.add(host("compute-2", 3)), Err(MtceError::AtCapacity(2)));
    }

    #[test]
    fn remove_splices_and_stales_handles() {
        let mut registry = Registry::new(8);
        let a = registry.add(host("compute-0", 1)).unwrap();
        let b = registry.add(host("compute-1", 2)).unwrap();
        let c = registry.add(host("compute-2", 3)).unwrap();

        registry.remove(b).unwrap();
        assert_eq!(registry.validate_links(), Ok(2));
        assert!(registry.get(b).is_none());
        assert_eq!(registry.remove(b).unwrap_err(), MtceError::StaleHost(b));

        let d = registry.add(host("compute-3", 4)).unwrap();
        assert_eq!(d.index(), b.index());
        assert_ne!(d.generation(), b.generation());
        assert!(registry.get(b).is_none());

        registry.remove(a).unwrap();
        registry.remove(d).unwrap();
        assert_eq!(registry.head(), Some(c));
        assert_eq!(registry.tail(), Some(c));
        registry.remove(c).unwrap();
        assert!(registry.is_empty());
        assert_eq!(registry.head(), None);
        assert_eq!(registry.validate_links(), Ok(0));
    }

    #[test]
    fn find_searches_names_then_addresses() {
        let mut registry = Registry::new(8);
        let a = registry.add(host("compute-0", 1)).unwrap();
        assert_eq!(registry.find("compute-0"), Some(a));
        assert_eq!(registry.find("10.0.0.1"), Some(a));
        assert_eq!(registry.find("uuid-compute-0"), Some(a));
        assert_eq!(registry.find(""), None);
        assert_eq!(registry.find("10.0.0.9"), None);
    }

    #[test]
    fn modify_locates_by_uuid() {
        let mut registry = Registry::new(8);
        let a = registry.add(host("compute-0", 1)).unwrap();
        registry.add(host("compute-1", 2)).unwrap();

        let mut info = HostInfo::new("compute-0", "uuid-compute-0", NodeType::WORKER)
            .with_mgmt("10.0.0.2", "aa:00:00:00:00:01");
        assert!(matches!(registry.modify(info.clone()), Err(MtceError::DuplicateIp { .. })));

        info.mgmt_ip = "10.0.0.10".into();
        info.mtce_info.set("bmc_protocol", "ipmi");
        assert_eq!(registry.modify(info), Ok((a, true)));
        assert_eq!(registry.get(a).unwrap().mgmt_ip, "10.0.0.10");

        let missing = HostInfo::new("compute-9", "uuid-x", NodeType::WORKER);
        assert_eq!(registry.modify(missing), Err(MtceError::NotFound("uuid-x".into())));
    }

    #[test]
    fn iteration_restarts_from_head() {
        let mut registry = Registry::new(8);
        registry.add(host("compute-0", 1)).unwrap();
        registry.add(host("compute-1", 2)).unwrap();
        let mut first = registry.iter();
        first.next();
        assert_eq!(registry.iter().count(), 2);
        assert_eq!(first.count(), 1);
    }

    #[test]
    fn random_churn_keeps_links_consistent() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(7);
        let mut registry = Registry::new(32);
        let mut live: Vec<(HostId, String)> = Vec::new();
        for n in 0..500u32 {
            if live.is_empty() || (live.len() < 32 && rng.gen_bool(0.6)) {
                let name = format!("node-{n}");
                let info = HostInfo::new(&name, format!("uuid-{n}"), NodeType::WORKER)
                    .with_mgmt(format!("10.1.{}.{}", n / 256, n % 256), "");
                let id = registry.add(Host::new(info, HbsHost::default())).unwrap();
                live.push((id, name));
            } else {
                let (id, name) = live.remove(rng.gen_range(0..live.len()));
                assert_eq!(registry.remove(id).unwrap().hostname, name);
                assert!(registry.get(id).is_none());
            }
            assert_eq!(registry.validate_links(), Ok(live.len()));
        }
        let order: Vec<HostId> = live.iter().map(|(id, _)| *id).collect();
        assert_eq!(registry.ids(), order);
        for (id, name) in &live {
            assert_eq!(registry.by_hostname(name), Some(*id));
        }
    }
}

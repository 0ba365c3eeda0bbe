use std::collections::BTreeMap;
use chrono::Utc;
use shared::protocol::SSDP_ALL;
use shared::types::ServiceRegistration;

/// Services advertised by one responder, keyed by USN.
#[derive(Debug, Default, Clone)]
pub struct RegistrationTable {
    entries: BTreeMap<String, ServiceRegistration>,
}

impl RegistrationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite the entry for this USN, stamping `last_seen`
    pub fn register(&mut self, mut registration: ServiceRegistration) {
        registration.last_seen = Utc::now();
        tracing::debug!(
            "Registered {} (ST={}, {:?})",
            registration.usn,
            registration.service_type,
            registration.manifestation
        );
        self.entries.insert(registration.usn.clone(), registration);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Local registrations that answer a search for `search_target`.
    /// `ssdp:all` matches every non-silent one; an exact type match always
    /// qualifies, silent or not.
    pub fn matching(&self, search_target: &str) -> Vec<&ServiceRegistration> {
        self.entries
            .values()
            .filter(|reg| reg.is_local())
            .filter(|reg| {
                if search_target == SSDP_ALL {
                    !reg.silent
                } else {
                    reg.service_type == search_target
                }
            })
            .collect()
    }

    /// Local, non-silent registrations: the ones we alive/byebye
    pub fn announceable(&self) -> impl Iterator<Item = &ServiceRegistration> {
        self.entries
            .values()
            .filter(|reg| reg.is_local() && !reg.silent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::types::Manifestation;

    fn table() -> RegistrationTable {
        let mut table = RegistrationTable::new();
        table.register(ServiceRegistration::local(
            "uuid:abc::upnp:rootdevice",
            "urn:test:device:1",
            "http://10.0.0.2/smartcam.xml",
        ));

        let mut silent = ServiceRegistration::local("uuid:quiet", "urn:test:quiet:1", "http://10.0.0.2/q.xml");
        silent.silent = true;
        table.register(silent);

        let mut remote = ServiceRegistration::local("uuid:other", "urn:test:device:1", "http://10.0.0.9/d.xml");
        remote.manifestation = Manifestation::Remote;
        table.register(remote);

        table
    }

    fn usns(regs: Vec<&ServiceRegistration>) -> Vec<&str> {
        regs.into_iter().map(|r| r.usn.as_str()).collect()
    }

    #[test]
    fn test_wildcard_skips_silent_and_remote() {
        let table = table();
        assert_eq!(usns(table.matching("ssdp:all")), vec!["uuid:abc::upnp:rootdevice"]);
    }

    #[test]
    fn test_exact_match_includes_silent() {
        let table = table();
        assert_eq!(usns(table.matching("urn:test:quiet:1")), vec!["uuid:quiet"]);
        assert_eq!(usns(table.matching("urn:test:device:1")), vec!["uuid:abc::upnp:rootdevice"]);
        assert!(table.matching("urn:test:nothing:1").is_empty());
    }

    #[test]
    fn test_register_overwrites_same_usn() {
        let mut table = table();
        let before = table.matching("urn:test:device:1")[0].last_seen;

        table.register(ServiceRegistration::local(
            "uuid:abc::upnp:rootdevice",
            "urn:test:device:2",
            "http://10.0.0.3/smartcam.xml",
        ));

        assert_eq!(table.len(), 3);
        assert!(table.matching("urn:test:device:1").is_empty());
        let matched = table.matching("urn:test:device:2");
        assert_eq!(usns(matched.clone()), vec!["uuid:abc::upnp:rootdevice"]);
        assert_eq!(matched[0].location, "http://10.0.0.3/smartcam.xml");
        assert!(matched[0].last_seen >= before);
    }

    #[test]
    fn test_announceable() {
        let table = table();
        let announced: Vec<_> = table.announceable().map(|r| r.usn.as_str()).collect();
        assert_eq!(announced, vec!["uuid:abc::upnp:rootdevice"]);
    }
}

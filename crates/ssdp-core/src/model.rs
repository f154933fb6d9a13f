use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One parsed SSDP search reply.
#[derive(Debug, Clone)]
pub struct SearchResponse {
    /// Responder network address (IP as text).
    pub address: String,
    /// Service type the reply answers for (the `ST` header).
    pub service_type: String,
    /// HTTP status code from the reply status line.
    pub status: u16,
    /// Description document URL (the `LOCATION` header).
    pub location: String,
}

/// Ordered set of service URNs that must all resolve before a device
/// counts as discovered.
#[derive(Debug, Clone)]
pub struct ServiceSet(Vec<String>);

impl ServiceSet {
    pub fn new(urns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self(urns.into_iter().map(Into::into).collect())
    }

    pub fn urns(&self) -> &[String] {
        &self.0
    }

    pub fn contains(&self, urn: &str) -> bool {
        self.0.iter().any(|u| u == urn)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Per-responder record of which required services have resolved so far.
///
/// Complete once every required URN has a non-empty locator. The record is
/// kept for the process lifetime so repeated periodic searches are absorbed
/// without re-announcing the device.
#[derive(Debug)]
pub struct DeviceServices {
    locators: BTreeMap<String, Option<String>>,
}

impl DeviceServices {
    pub fn new(required: &ServiceSet) -> Self {
        let locators = required
            .urns()
            .iter()
            .map(|urn| (urn.clone(), None))
            .collect();
        Self { locators }
    }

    /// Record a locator for one service. URNs outside the required set are
    /// ignored.
    pub fn set(&mut self, urn: &str, location: &str) {
        if let Some(slot) = self.locators.get_mut(urn) {
            *slot = Some(location.to_string());
        }
    }

    pub fn is_complete(&self) -> bool {
        self.locators
            .values()
            .all(|loc| loc.as_deref().is_some_and(|l| !l.is_empty()))
    }

    /// Read-only snapshot of the resolved mapping. Only meaningful once
    /// complete; unresolved entries are skipped.
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.locators
            .iter()
            .filter_map(|(urn, loc)| loc.clone().map(|l| (urn.clone(), l)))
            .collect()
    }
}

/// Completion event: every required service of one responder has resolved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub address: String,
    /// Required service URN -> resolved locator URL.
    pub services: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incomplete_until_every_urn_resolves() {
        let set = ServiceSet::new(["urn:a", "urn:b"]);
        let mut dev = DeviceServices::new(&set);
        assert!(!dev.is_complete());

        dev.set("urn:a", "http://10.0.0.2/a.xml");
        assert!(!dev.is_complete());

        dev.set("urn:b", "http://10.0.0.2/b.xml");
        assert!(dev.is_complete());
    }

    #[test]
    fn empty_locator_does_not_complete() {
        let set = ServiceSet::new(["urn:a"]);
        let mut dev = DeviceServices::new(&set);
        dev.set("urn:a", "");
        assert!(!dev.is_complete());
    }

    #[test]
    fn foreign_urn_is_not_recorded() {
        let set = ServiceSet::new(["urn:a"]);
        let mut dev = DeviceServices::new(&set);
        dev.set("urn:other", "http://10.0.0.2/x.xml");
        assert!(!dev.is_complete());
        assert!(dev.snapshot().is_empty());
    }
}

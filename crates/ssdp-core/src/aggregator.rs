use crate::model::{DeviceServices, DiscoveredDevice, SearchResponse, ServiceSet};
use std::collections::HashMap;

/// Correlates out-of-order, repeated search replies into one completion
/// event per responder address.
///
/// Each address gets its own [`DeviceServices`] record on first contact.
/// Records live for the aggregator's lifetime, so replies triggered by the
/// periodic re-search land on an already-complete record and are absorbed
/// without a second event. Call [`forget`](Self::forget) to drop an address
/// if a deployment needs to re-discover after address reuse.
pub struct DeviceAggregator {
    required: ServiceSet,
    devices: HashMap<String, DeviceServices>,
}

impl DeviceAggregator {
    pub fn new(required: ServiceSet) -> Self {
        Self {
            required,
            devices: HashMap::new(),
        }
    }

    /// Apply one search reply. Returns the completed descriptor snapshot
    /// exactly once per address: on the reply that resolves its last
    /// outstanding service.
    pub fn on_response(&mut self, resp: SearchResponse) -> Option<DiscoveredDevice> {
        if resp.status != 200 {
            return None;
        }

        let device = self
            .devices
            .entry(resp.address.clone())
            .or_insert_with(|| DeviceServices::new(&self.required));

        if device.is_complete() {
            return None;
        }

        device.set(&resp.service_type, &resp.location);
        if !device.is_complete() {
            return None;
        }

        tracing::debug!("device at {} fully resolved", resp.address);
        Some(DiscoveredDevice {
            address: resp.address,
            services: device.snapshot(),
        })
    }

    /// Drop the record for one address so it can be discovered afresh.
    pub fn forget(&mut self, address: &str) {
        self.devices.remove(address);
    }

    /// Number of addresses seen so far, complete or not.
    pub fn tracked(&self) -> usize {
        self.devices.len()
    }
}

//! SSDP search: multicast discovery of UPnP services on the local network.
//!
//! The pieces compose as a pipeline: [`SearchScheduler`] re-broadcasts
//! M-SEARCH requests forever, the socket delivers whatever answers, and
//! [`DeviceAggregator`] folds the unordered, repeated replies into exactly
//! one [`DiscoveredDevice`] per responder. [`Discovery`] wires all three
//! together behind a cancellable handle.

pub mod aggregator;
pub mod discover;
pub mod model;
pub mod net;
pub mod scheduler;
pub mod transport;

pub use aggregator::DeviceAggregator;
pub use discover::{Discovery, DiscoveryConfig};
pub use model::{DiscoveredDevice, SearchResponse, ServiceSet};
pub use scheduler::SearchScheduler;
pub use transport::{SearchTransport, SsdpSocket};

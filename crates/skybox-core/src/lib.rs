//! Sky set-top-box client library.
//!
//! Everything needed once discovery has produced a box's service locators:
//! resolving control endpoints from the device description, paging the full
//! recording catalog out of the SkyBrowse service, looking up channel
//! listings, and following playback through SkyPlay events.

pub mod browse;
pub mod config;
pub mod device;
pub mod didl;
pub mod listings;
pub mod monitor;
pub mod soap;
pub mod xmltext;

// Re-export commonly used types
pub use browse::{fetch_catalog, BrowseClient, BrowseError, BrowsePage, Catalog, SkyBrowse};
pub use config::{SkyConfig, SKY_BROWSE_URN, SKY_PLAY_URN};
pub use device::{resolve_service, ServiceEndpoints};
pub use didl::CatalogItem;
pub use listings::{channel_from_uri, fetch_channel_map, ChannelMap};
pub use monitor::{PlayMonitor, TransportEvent};
pub use soap::{SoapClient, SoapError};

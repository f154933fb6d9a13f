use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const SKY_BROWSE_URN: &str = "urn:schemas-nds-com:service:SkyBrowse:2";
pub const SKY_PLAY_URN: &str = "urn:schemas-nds-com:service:SkyPlay:2";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkyConfig {
    /// Container holding the recordings on the box.
    pub recordings_object_id: String,

    /// Items requested per Browse page (25 is the most the box honors).
    pub page_size: u32,

    /// Seconds between re-issues of the full search set.
    pub search_period_secs: u64,

    /// SSDP MX header value.
    pub search_mx: u32,

    /// The box only answers UPnP calls from clients claiming to be Sky's own.
    pub user_agent: String,

    /// Channel listings endpoint (channel id -> station name).
    pub listings_url: String,
}

impl Default for SkyConfig {
    fn default() -> Self {
        Self {
            recordings_object_id: "3".to_string(),
            page_size: 25,
            search_period_secs: 10,
            search_mx: 3,
            user_agent: "SKY_skyplus".to_string(),
            listings_url:
                "http://epgservices.sky.com/tvlistings-proxy/TVListingsProxy/init.json"
                    .to_string(),
        }
    }
}

impl SkyConfig {
    /// The URNs that must all answer before a box counts as found.
    pub fn required_urns(&self) -> Vec<String> {
        vec![SKY_BROWSE_URN.to_string(), SKY_PLAY_URN.to_string()]
    }

    pub fn search_period(&self) -> Duration {
        Duration::from_secs(self.search_period_secs)
    }
}

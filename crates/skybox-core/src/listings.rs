//! Channel listings: mapping the broadcaster's channel ids to station names.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use url::Url;

/// Channel id -> station name.
pub type ChannelMap = HashMap<u32, String>;

#[derive(Debug, Deserialize)]
struct ListingsDoc {
    channels: Vec<ChannelRecord>,
}

#[derive(Debug, Deserialize)]
struct ChannelRecord {
    channelid: ChannelId,
    title: String,
}

/// The feed has served the id both as a number and as a string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChannelId {
    Num(u32),
    Text(String),
}

impl ChannelId {
    fn as_u32(&self) -> Option<u32> {
        match self {
            ChannelId::Num(n) => Some(*n),
            ChannelId::Text(s) => s.trim().parse().ok(),
        }
    }
}

/// Fetch and index the channel listings document.
pub async fn fetch_channel_map(http: &reqwest::Client, url: &str) -> Result<ChannelMap> {
    let body = http
        .get(url)
        .send()
        .await
        .context("requesting channel listings")?
        .error_for_status()
        .context("channel listings endpoint")?
        .text()
        .await
        .context("reading channel listings body")?;
    parse_channel_map(&body)
}

pub fn parse_channel_map(json: &str) -> Result<ChannelMap> {
    let doc: ListingsDoc =
        serde_json::from_str(json).context("deserializing channel listings")?;

    Ok(doc
        .channels
        .into_iter()
        .filter_map(|rec| rec.channelid.as_u32().map(|id| (id, rec.title)))
        .collect())
}

/// Channel id out of a live-TV playback URI. The box encodes the id in hex
/// as the host of an `xsi://` URI.
pub fn channel_from_uri(uri: &str) -> Option<u32> {
    let url = Url::parse(uri).ok()?;
    if url.scheme() != "xsi" {
        return None;
    }
    u32::from_str_radix(url.host_str()?, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexes_numeric_and_text_channel_ids() {
        let map = parse_channel_map(
            r#"{
                "channels": [
                    {"channelid": 2002, "title": "BBC One", "channelno": "101"},
                    {"channelid": "6000", "title": "Sky Atlantic"},
                    {"channelid": "junk", "title": "Broken Row"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(map.len(), 2);
        assert_eq!(map[&2002], "BBC One");
        assert_eq!(map[&6000], "Sky Atlantic");
    }

    #[test]
    fn rejects_malformed_documents() {
        assert!(parse_channel_map("{}").is_err());
        assert!(parse_channel_map("not json").is_err());
    }

    #[test]
    fn live_tv_uris_carry_a_hex_channel_id() {
        assert_eq!(channel_from_uri("xsi://7D2"), Some(0x7d2));
        assert_eq!(channel_from_uri("xsi://7d2"), Some(0x7d2));
        assert_eq!(channel_from_uri("file://pvr/3a01"), None);
        assert_eq!(channel_from_uri("not a uri"), None);
    }
}

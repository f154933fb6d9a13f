use crate::model::SearchResponse;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::net::UdpSocket;

/// Standard SSDP multicast group.
const SSDP_MULTICAST_ADDR: SocketAddr = SocketAddr::new(
    IpAddr::V4(Ipv4Addr::new(239, 255, 255, 250)),
    1900,
);

/// Seconds a responder may delay its reply (the `MX` header).
const DEFAULT_MX: u32 = 3;

/// Anything that can put an M-SEARCH for one service type on the wire.
///
/// The scheduler drives this; tests substitute a recording implementation.
#[async_trait]
pub trait SearchTransport: Send + Sync {
    async fn send_search(&self, service_type: &str) -> Result<()>;
}

/// UDP socket for issuing M-SEARCH requests and receiving unicast replies.
pub struct SsdpSocket {
    socket: UdpSocket,
    mx: u32,
}

impl SsdpSocket {
    /// Bind to an ephemeral port on all interfaces.
    pub async fn bind() -> Result<Self> {
        Self::bind_to(IpAddr::V4(Ipv4Addr::UNSPECIFIED)).await
    }

    /// Bind to an ephemeral port on a specific local address.
    pub async fn bind_to(local: IpAddr) -> Result<Self> {
        let socket = UdpSocket::bind((local, 0))
            .await
            .context("binding SSDP search socket")?;
        Ok(Self {
            socket,
            mx: DEFAULT_MX,
        })
    }

    pub fn with_mx(mut self, mx: u32) -> Self {
        self.mx = mx;
        self
    }

    /// Receive one datagram and parse it as a search reply. Returns `None`
    /// for datagrams that are not well-formed replies; receive errors are
    /// real socket failures.
    pub async fn recv_response(&self, buf: &mut [u8]) -> Result<Option<SearchResponse>> {
        let (n, from) = self
            .socket
            .recv_from(buf)
            .await
            .context("receiving SSDP datagram")?;
        Ok(parse_search_response(&buf[..n], from))
    }
}

#[async_trait]
impl SearchTransport for SsdpSocket {
    async fn send_search(&self, service_type: &str) -> Result<()> {
        let message = format!(
            "M-SEARCH * HTTP/1.1\r\n\
             HOST: 239.255.255.250:1900\r\n\
             MAN: \"ssdp:discover\"\r\n\
             MX: {}\r\n\
             ST: {}\r\n\r\n",
            self.mx, service_type
        );

        self.socket
            .send_to(message.as_bytes(), SSDP_MULTICAST_ADDR)
            .await
            .with_context(|| format!("sending M-SEARCH for {}", service_type))?;
        tracing::trace!("sent M-SEARCH for {}", service_type);
        Ok(())
    }
}

/// Parse one HTTP-over-UDP search reply.
///
/// Header names are matched case-insensitively. Datagrams without a valid
/// status line or without both `ST` and `LOCATION` yield `None` — the
/// protocol expects plenty of traffic we have no use for.
pub fn parse_search_response(datagram: &[u8], from: SocketAddr) -> Option<SearchResponse> {
    let text = String::from_utf8_lossy(datagram);
    let mut lines = text.split("\r\n");

    let status = parse_status_line(lines.next()?)?;

    let mut service_type = None;
    let mut location = None;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        match name.trim().to_ascii_uppercase().as_str() {
            "ST" => service_type = Some(value.trim().to_string()),
            "LOCATION" => location = Some(value.trim().to_string()),
            _ => {}
        }
    }

    Some(SearchResponse {
        address: from.ip().to_string(),
        service_type: service_type?,
        status,
        location: location?,
    })
}

fn parse_status_line(line: &str) -> Option<u16> {
    let mut parts = line.split_whitespace();
    if !parts.next()?.starts_with("HTTP/") {
        return None;
    }
    parts.next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_addr() -> SocketAddr {
        "192.168.1.50:49152".parse().unwrap()
    }

    #[test]
    fn parses_well_formed_reply() {
        let datagram = b"HTTP/1.1 200 OK\r\n\
            CACHE-CONTROL: max-age=1800\r\n\
            EXT:\r\n\
            LOCATION: http://192.168.1.50:49153/description.xml\r\n\
            ST: urn:schemas-nds-com:service:SkyBrowse:2\r\n\
            USN: uuid:abc::urn:schemas-nds-com:service:SkyBrowse:2\r\n\r\n";

        let resp = parse_search_response(datagram, from_addr()).unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.address, "192.168.1.50");
        assert_eq!(resp.service_type, "urn:schemas-nds-com:service:SkyBrowse:2");
        assert_eq!(resp.location, "http://192.168.1.50:49153/description.xml");
    }

    #[test]
    fn header_names_are_case_insensitive() {
        let datagram = b"HTTP/1.1 200 OK\r\n\
            Location: http://192.168.1.50/d.xml\r\n\
            st: urn:x\r\n\r\n";

        let resp = parse_search_response(datagram, from_addr()).unwrap();
        assert_eq!(resp.location, "http://192.168.1.50/d.xml");
        assert_eq!(resp.service_type, "urn:x");
    }

    #[test]
    fn non_success_status_is_preserved_not_dropped() {
        let datagram = b"HTTP/1.1 503 Unavailable\r\n\
            LOCATION: http://192.168.1.50/d.xml\r\n\
            ST: urn:x\r\n\r\n";

        // Filtering on status is the aggregator's call, not the parser's.
        let resp = parse_search_response(datagram, from_addr()).unwrap();
        assert_eq!(resp.status, 503);
    }

    #[test]
    fn malformed_datagrams_yield_none() {
        assert!(parse_search_response(b"", from_addr()).is_none());
        assert!(parse_search_response(b"NOTIFY * HTTP/1.1\r\n\r\n", from_addr()).is_none());
        assert!(parse_search_response(
            b"HTTP/1.1 200 OK\r\nST: urn:x\r\n\r\n", // no LOCATION
            from_addr()
        )
        .is_none());
        assert!(parse_search_response(
            b"HTTP/1.1 abc OK\r\nST: urn:x\r\nLOCATION: http://h/\r\n\r\n",
            from_addr()
        )
        .is_none());
    }
}

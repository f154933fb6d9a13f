//! Playback event monitor: a GENA subscription to the SkyPlay service.
//!
//! The box pushes state changes as HTTP NOTIFY requests to a callback URL
//! we host, each carrying a `LastChange` document with the interesting
//! values buried one escaping layer down.

use crate::xmltext;
use anyhow::{anyhow, Context, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::Method;
use std::net::IpAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use url::Url;

/// A state change reported by the box's playback service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// What is being played changed (live channel zap, recording start).
    UriChanged(String),
    /// Playback state changed (PLAYING, PAUSED_PLAYBACK, ...).
    StateChanged(String),
}

/// Live GENA subscription. Dropping it stops the callback listener and the
/// renewal loop; the box's subscription then lapses on its own timeout.
pub struct PlayMonitor {
    sid: String,
    notify_task: JoinHandle<()>,
    renew_task: JoinHandle<()>,
}

impl PlayMonitor {
    /// Subscribe to `event_url` and start delivering [`TransportEvent`]s.
    pub async fn subscribe(
        http: reqwest::Client,
        event_url: Url,
        user_agent: &str,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TransportEvent>)> {
        let listener = TcpListener::bind("0.0.0.0:0")
            .await
            .context("binding event callback listener")?;
        let port = listener.local_addr()?.port();
        let callback_ip = local_addr_towards(&event_url).await?;

        let callback = format!("<http://{}:{}/>", callback_ip, port);
        let subscribe = Method::from_bytes(b"SUBSCRIBE")?;

        let response = http
            .request(subscribe, event_url.clone())
            .header("CALLBACK", &callback)
            .header("NT", "upnp:event")
            .header("TIMEOUT", "Second-300")
            .header(reqwest::header::USER_AGENT, user_agent)
            .send()
            .await
            .context("GENA SUBSCRIBE")?
            .error_for_status()
            .context("GENA SUBSCRIBE rejected")?;

        let sid = response
            .headers()
            .get("SID")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| anyhow!("subscription response carried no SID"))?
            .to_string();
        let granted = response
            .headers()
            .get("TIMEOUT")
            .and_then(|v| v.to_str().ok())
            .and_then(parse_timeout_header)
            .unwrap_or(300);
        tracing::info!("subscribed to playback events, sid {}", sid);

        let (tx, rx) = mpsc::unbounded_channel();
        let notify_task = tokio::spawn(notify_loop(listener, tx));
        let renew_task = tokio::spawn(renew_loop(
            http,
            event_url,
            sid.clone(),
            Duration::from_secs((granted / 2).max(30)),
        ));

        Ok((
            Self {
                sid,
                notify_task,
                renew_task,
            },
            rx,
        ))
    }

    pub fn sid(&self) -> &str {
        &self.sid
    }
}

impl Drop for PlayMonitor {
    fn drop(&mut self) {
        self.notify_task.abort();
        self.renew_task.abort();
    }
}

/// Local address the device will be able to reach us on: the one the OS
/// routes toward the device.
async fn local_addr_towards(event_url: &Url) -> Result<IpAddr> {
    let host = event_url
        .host_str()
        .ok_or_else(|| anyhow!("event URL has no host"))?;
    let port = event_url.port_or_known_default().unwrap_or(80);

    let probe = UdpSocket::bind("0.0.0.0:0").await?;
    probe
        .connect((host, port))
        .await
        .context("routing toward device")?;
    Ok(probe.local_addr()?.ip())
}

async fn notify_loop(listener: TcpListener, tx: mpsc::UnboundedSender<TransportEvent>) {
    loop {
        let (mut stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!("event listener accept failed: {}", e);
                continue;
            }
        };

        let body = match read_notify(&mut stream).await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("bad NOTIFY from {}: {:#}", peer, e);
                continue;
            }
        };

        let _ = stream
            .write_all(b"HTTP/1.1 200 OK\r\nCONNECTION: close\r\nCONTENT-LENGTH: 0\r\n\r\n")
            .await;

        for event in parse_notify_body(&body) {
            if tx.send(event).is_err() {
                return;
            }
        }
    }
}

async fn renew_loop(http: reqwest::Client, event_url: Url, sid: String, every: Duration) {
    let subscribe = match Method::from_bytes(b"SUBSCRIBE") {
        Ok(m) => m,
        Err(_) => return,
    };
    loop {
        tokio::time::sleep(every).await;
        let renewal = http
            .request(subscribe.clone(), event_url.clone())
            .header("SID", sid.clone())
            .header("TIMEOUT", "Second-300")
            .send()
            .await;
        match renewal {
            Ok(resp) if resp.status().is_success() => {
                tracing::debug!("renewed event subscription {}", sid)
            }
            Ok(resp) => tracing::warn!("subscription renewal answered {}", resp.status()),
            Err(e) => tracing::warn!("subscription renewal failed: {}", e),
        }
    }
}

/// Read one NOTIFY request: headers up to the blank line, then a body of
/// exactly `Content-Length` bytes.
async fn read_notify(stream: &mut TcpStream) -> Result<String> {
    let mut raw = Vec::new();
    let mut buf = [0u8; 1024];

    let header_end = loop {
        if let Some(pos) = find_blank_line(&raw) {
            break pos;
        }
        if raw.len() > 64 * 1024 {
            anyhow::bail!("NOTIFY headers too large");
        }
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            anyhow::bail!("connection closed before end of headers");
        }
        raw.extend_from_slice(&buf[..n]);
    };

    let headers = String::from_utf8_lossy(&raw[..header_end]);
    let content_length = headers
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = raw[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            anyhow::bail!("connection closed mid-body");
        }
        body.extend_from_slice(&buf[..n]);
    }
    body.truncate(content_length);

    Ok(String::from_utf8_lossy(&body).into_owned())
}

fn find_blank_line(raw: &[u8]) -> Option<usize> {
    raw.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Pull transport events out of a GENA property set. The interesting
/// values live inside `LastChange`, a doubly-encoded document.
pub fn parse_notify_body(body: &str) -> Vec<TransportEvent> {
    let Some(last_change) = raw_element_text(body, b"LastChange") else {
        return Vec::new();
    };
    let inner = xmltext::decode(&last_change);
    parse_last_change(&inner)
}

/// Raw (still-escaped) text content of the first element with this local
/// name, or `None`.
fn raw_element_text(xml: &str, local: &[u8]) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);

    let mut inside = false;
    let mut value = String::new();
    loop {
        match reader.read_event().ok()? {
            Event::Start(e) if e.local_name().as_ref() == local => inside = true,
            Event::Text(e) if inside => {
                value.push_str(&String::from_utf8_lossy(&e.into_inner()))
            }
            Event::End(e) if e.local_name().as_ref() == local => return Some(value),
            Event::Eof => return None,
            _ => {}
        }
    }
}

fn parse_last_change(xml: &str) -> Vec<TransportEvent> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut events = Vec::new();
    loop {
        let event = match reader.read_event() {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!("unparseable LastChange document: {}", e);
                return events;
            }
        };
        let element = match &event {
            Event::Start(e) => e,
            Event::Empty(e) => e,
            Event::Eof => return events,
            _ => continue,
        };

        let make: fn(String) -> TransportEvent = match element.local_name().as_ref() {
            b"AVTransportURI" => TransportEvent::UriChanged,
            b"TransportState" => TransportEvent::StateChanged,
            _ => continue,
        };
        let val = element.attributes().find_map(|attr| {
            let attr = attr.ok()?;
            (attr.key.as_ref() == b"val")
                .then(|| attr.unescape_value().ok())
                .flatten()
        });
        if let Some(val) = val {
            events.push(make(val.into_owned()));
        }
    }
}

fn parse_timeout_header(value: &str) -> Option<u64> {
    value
        .trim()
        .strip_prefix("Second-")
        .and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gena_body(last_change_inner: &str) -> String {
        format!(
            r#"<?xml version="1.0"?>
<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
  <e:property>
    <LastChange>{}</LastChange>
  </e:property>
</e:propertyset>"#,
            xmltext::encode(last_change_inner)
        )
    }

    #[test]
    fn extracts_uri_and_state_changes() {
        let body = gena_body(
            r#"<Event xmlns="urn:schemas-upnp-org:metadata-1-0/AVT/">
                 <InstanceID val="0">
                   <AVTransportURI val="xsi://7D2"/>
                   <TransportState val="PLAYING"/>
                 </InstanceID>
               </Event>"#,
        );

        let events = parse_notify_body(&body);
        assert_eq!(
            events,
            vec![
                TransportEvent::UriChanged("xsi://7D2".to_string()),
                TransportEvent::StateChanged("PLAYING".to_string()),
            ]
        );
    }

    #[test]
    fn attribute_values_are_unescaped() {
        let body = gena_body(r#"<Event><InstanceID val="0"><AVTransportURI val="file://pvr/a&amp;b"/></InstanceID></Event>"#);
        assert_eq!(
            parse_notify_body(&body),
            vec![TransportEvent::UriChanged("file://pvr/a&b".to_string())]
        );
    }

    #[test]
    fn notifications_without_last_change_yield_nothing() {
        let body = r#"<e:propertyset xmlns:e="urn:schemas-upnp-org:event-1-0">
            <e:property><SomethingElse>1</SomethingElse></e:property>
        </e:propertyset>"#;
        assert!(parse_notify_body(body).is_empty());
    }

    #[test]
    fn garbage_is_tolerated() {
        assert!(parse_notify_body("not xml at all").is_empty());
        assert!(parse_notify_body("").is_empty());
    }

    #[test]
    fn timeout_header_parses_seconds() {
        assert_eq!(parse_timeout_header("Second-300"), Some(300));
        assert_eq!(parse_timeout_header(" Second-1800 "), Some(1800));
        assert_eq!(parse_timeout_header("infinite"), None);
    }

    #[tokio::test]
    async fn reads_a_framed_notify_request() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let body = "<e:propertyset></e:propertyset>";
        let request = format!(
            "NOTIFY / HTTP/1.1\r\nHOST: {}\r\nCONTENT-TYPE: text/xml\r\nCONTENT-LENGTH: {}\r\n\r\n{}",
            addr,
            body.len(),
            body
        );

        let send = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(request.as_bytes()).await.unwrap();
        });

        let (mut stream, _) = listener.accept().await.unwrap();
        let received = read_notify(&mut stream).await.unwrap();
        assert_eq!(received, body);
        send.await.unwrap();
    }
}

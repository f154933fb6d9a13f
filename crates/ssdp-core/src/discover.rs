use crate::aggregator::DeviceAggregator;
use crate::model::{DiscoveredDevice, ServiceSet};
use crate::scheduler::SearchScheduler;
use crate::transport::SsdpSocket;
use anyhow::Result;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// How often the full search set is re-issued.
    pub period: Duration,
    /// SSDP MX header: seconds a responder may delay its reply.
    pub mx: u32,
    /// Local address to bind; `None` binds all interfaces.
    pub bind_addr: Option<IpAddr>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(10),
            mx: 3,
            bind_addr: None,
        }
    }
}

/// Running discovery session. Searching continues until this is dropped.
///
/// One task re-issues searches on the configured period, another owns the
/// aggregator and applies every reply; completed devices arrive on the
/// channel behind [`recv`](Self::recv), each address exactly once.
pub struct Discovery {
    found_rx: mpsc::UnboundedReceiver<DiscoveredDevice>,
    search_task: JoinHandle<()>,
    recv_task: JoinHandle<()>,
}

impl Discovery {
    pub async fn start(required: ServiceSet, config: DiscoveryConfig) -> Result<Self> {
        let socket = match config.bind_addr {
            Some(ip) => SsdpSocket::bind_to(ip).await?,
            None => SsdpSocket::bind().await?,
        };
        let socket = Arc::new(socket.with_mx(config.mx));

        let search_task =
            SearchScheduler::new(socket.clone(), required.urns().to_vec(), config.period).spawn();

        let (found_tx, found_rx) = mpsc::unbounded_channel();
        let mut aggregator = DeviceAggregator::new(required);
        let recv_task = tokio::spawn(async move {
            let mut buf = vec![0u8; 2048];
            loop {
                match socket.recv_response(&mut buf).await {
                    Ok(Some(resp)) => {
                        if let Some(found) = aggregator.on_response(resp) {
                            tracing::info!("discovered device at {}", found.address);
                            if found_tx.send(found).is_err() {
                                // Consumer went away; searching is pointless.
                                break;
                            }
                        }
                    }
                    Ok(None) => {}
                    Err(e) => tracing::warn!("SSDP receive failed: {:#}", e),
                }
            }
        });

        Ok(Self {
            found_rx,
            search_task,
            recv_task,
        })
    }

    /// Next fully-resolved device. `None` only after [`stop`](Self::stop).
    pub async fn recv(&mut self) -> Option<DiscoveredDevice> {
        self.found_rx.recv().await
    }

    pub fn stop(&self) {
        self.search_task.abort();
        self.recv_task.abort();
    }
}

impl Drop for Discovery {
    fn drop(&mut self) {
        self.stop();
    }
}

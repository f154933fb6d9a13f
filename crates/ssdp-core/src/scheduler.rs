use crate::transport::SearchTransport;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Re-issues the full set of searches forever on a fixed period.
///
/// Deliberately stateless about what has already answered: late-joining
/// devices, lost replies and rebooted boxes are all covered by plain
/// repetition, and the aggregator absorbs the redundancy. The returned
/// handle is the owner's cancellation point.
pub struct SearchScheduler<T> {
    transport: Arc<T>,
    targets: Vec<String>,
    period: Duration,
}

impl<T: SearchTransport + 'static> SearchScheduler<T> {
    pub fn new(transport: Arc<T>, targets: Vec<String>, period: Duration) -> Self {
        Self {
            transport,
            targets,
            period,
        }
    }

    /// Spawn the search loop. The first burst goes out immediately.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.period);
            loop {
                ticker.tick().await;
                for target in &self.targets {
                    if let Err(e) = self.transport.send_search(target).await {
                        tracing::warn!("search for {} failed: {:#}", target, e);
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingTransport {
        fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SearchTransport for RecordingTransport {
        async fn send_search(&self, service_type: &str) -> Result<()> {
            self.sent.lock().unwrap().push(service_type.to_string());
            if self.fail {
                anyhow::bail!("wire is down");
            }
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn issues_full_set_immediately_then_every_period() {
        let transport = Arc::new(RecordingTransport::default());
        let handle = SearchScheduler::new(
            transport.clone(),
            vec!["urn:a".into(), "urn:b".into()],
            Duration::from_secs(10),
        )
        .spawn();

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(transport.sent(), vec!["urn:a", "urn:b"]);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(transport.sent(), vec!["urn:a", "urn:b", "urn:a", "urn:b"]);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(transport.sent().len(), 8);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn searches_carry_no_discovery_state() {
        let transport = Arc::new(RecordingTransport::default());
        let handle = SearchScheduler::new(
            transport.clone(),
            vec!["urn:a".into()],
            Duration::from_secs(10),
        )
        .spawn();

        tokio::time::sleep(Duration::from_secs(31)).await;

        // Every emission is the identical fire-and-forget payload.
        let sent = transport.sent();
        assert_eq!(sent.len(), 4);
        assert!(sent.iter().all(|s| s == "urn:a"));

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn send_failures_do_not_stop_the_loop() {
        let transport = Arc::new(RecordingTransport {
            sent: Mutex::new(Vec::new()),
            fail: true,
        });
        let handle = SearchScheduler::new(
            transport.clone(),
            vec!["urn:a".into(), "urn:b".into()],
            Duration::from_secs(10),
        )
        .spawn();

        tokio::time::sleep(Duration::from_secs(21)).await;
        assert_eq!(transport.sent().len(), 6);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn abort_stops_the_search_loop() {
        let transport = Arc::new(RecordingTransport::default());
        let handle = SearchScheduler::new(
            transport.clone(),
            vec!["urn:a".into()],
            Duration::from_secs(10),
        )
        .spawn();

        tokio::time::sleep(Duration::from_millis(1)).await;
        handle.abort();
        let before = transport.sent().len();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.sent().len(), before);
    }
}

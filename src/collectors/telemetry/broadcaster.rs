//! Periodic telemetry fan-out
//!
//! One task samples on a fixed cadence and publishes each snapshot on a
//! broadcast channel. Publishing never waits on subscribers: a receiver
//! that falls more than `capacity` snapshots behind gets `Lagged` and skips
//! ahead, and a tick with no subscribers is simply dropped.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, trace};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use crate::collectors::telemetry::{SnapshotSource, TelemetrySnapshot};

/// Publishes snapshots from a [`SnapshotSource`] to any number of subscribers
#[derive(Debug, Clone)]
pub struct TelemetryBroadcaster {
    sender: broadcast::Sender<Arc<TelemetrySnapshot>>,
    period: Duration,
}

/// Running broadcaster task
#[derive(Debug)]
pub struct BroadcastHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<u64>,
}

impl BroadcastHandle {
    /// Stops the task after its current sample and returns how many snapshots it published
    pub async fn stop(self) -> u64 {
        let _ = self.shutdown.send(true);
        self.task.await.unwrap_or_default()
    }
}

impl TelemetryBroadcaster {
    pub fn new(capacity: usize, period: Duration) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            period: period.max(Duration::from_millis(10)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<TelemetrySnapshot>> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Starts the sampling loop on the runtime
    pub fn spawn<S>(&self, mut source: S) -> BroadcastHandle
    where
        S: SnapshotSource + 'static,
    {
        let sender = self.sender.clone();
        let period = self.period;
        let (shutdown, mut stopped) = watch::channel(false);

        info!(
            "Starting telemetry broadcaster (period={}ms)",
            period.as_millis()
        );

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut published = 0u64;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = stopped.changed() => break,
                }

                let snapshot = Arc::new(source.snapshot().await);
                match sender.send(snapshot) {
                    Ok(receivers) => {
                        published += 1;
                        trace!("Published snapshot #{} to {} subscribers", published, receivers);
                    }
                    Err(_) => trace!("No subscribers, snapshot dropped"),
                }
            }

            debug!("Telemetry broadcaster stopped after {} snapshots", published);
            published
        });

        BroadcastHandle { shutdown, task }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::sync::broadcast::error::RecvError;

    struct CountingSource {
        count: u64,
    }

    #[async_trait]
    impl SnapshotSource for CountingSource {
        async fn snapshot(&mut self) -> TelemetrySnapshot {
            self.count += 1;
            let mut snapshot = TelemetrySnapshot::empty();
            snapshot.connection.uptime = Some(self.count);
            snapshot
        }
    }

    #[tokio::test]
    async fn test_subscribers_receive_in_order() {
        let broadcaster = TelemetryBroadcaster::new(8, Duration::from_millis(10));
        let mut receiver = broadcaster.subscribe();
        let handle = broadcaster.spawn(CountingSource { count: 0 });

        let first = receiver.recv().await.unwrap();
        let second = receiver.recv().await.unwrap();
        assert_eq!(first.connection.uptime, Some(1));
        assert_eq!(second.connection.uptime, Some(2));

        assert!(handle.stop().await >= 2);
    }

    #[tokio::test]
    async fn test_slow_subscriber_lags_without_blocking_publisher() {
        let broadcaster = TelemetryBroadcaster::new(2, Duration::from_millis(10));
        let mut slow = broadcaster.subscribe();
        let handle = broadcaster.spawn(CountingSource { count: 0 });

        tokio::time::sleep(Duration::from_millis(150)).await;
        let published = handle.stop().await;
        assert!(published > 2);

        match slow.recv().await {
            Err(RecvError::Lagged(skipped)) => assert!(skipped > 0),
            other => panic!("expected lag, got {:?}", other.map(|s| s.connection.uptime)),
        }
    }

    #[tokio::test]
    async fn test_runs_without_subscribers() {
        let broadcaster = TelemetryBroadcaster::new(4, Duration::from_millis(10));
        assert_eq!(broadcaster.subscriber_count(), 0);
        let handle = broadcaster.spawn(CountingSource { count: 0 });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.stop().await, 0);
    }
}

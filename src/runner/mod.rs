//! Bounded fan-out execution for multi-target probes
//!
//! The runner admits work items through a semaphore of fixed size, bounds
//! each admitted item with its own timeout and stops admitting once the
//! batch deadline has passed. Items already in flight are allowed to run to
//! their own timeout, so a batch never outlives `deadline + item_timeout`.
//!
//! ```rust,no_run
//! use netscout::runner::{BoundedRunner, RunnerConfig};
//! use std::time::Duration;
//!
//! # async fn demo() -> Result<(), netscout::errors::ProbeError> {
//! let runner = BoundedRunner::new(RunnerConfig::new(10, Duration::from_millis(200)))?;
//! let report = runner.run((1..=100u16).collect(), |port| async move { port % 2 == 0 }).await;
//! assert_eq!(report.outcomes.len(), 100);
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, trace, warn};
use serde::Serialize;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout, timeout_at};

use crate::errors::ProbeError;

/// Concurrency cap and timeouts for one batch
#[derive(Debug, Clone, PartialEq)]
pub struct RunnerConfig {
    /// Maximum number of items in flight at any time
    pub concurrency: usize,
    /// Bound applied to each item independently of the batch deadline
    pub item_timeout: Duration,
    /// Admission deadline for the whole batch; `None` admits every item
    pub deadline: Option<Duration>,
}

impl RunnerConfig {
    pub fn new(concurrency: usize, item_timeout: Duration) -> Self {
        Self {
            concurrency,
            item_timeout,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Terminal state of one admitted item
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ItemOutcome<T> {
    /// The check function returned before the item timeout
    Completed(T),
    /// The item timeout expired first
    TimedOut,
}

impl<T> ItemOutcome<T> {
    pub fn completed(&self) -> Option<&T> {
        match self {
            ItemOutcome::Completed(value) => Some(value),
            ItemOutcome::TimedOut => None,
        }
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, ItemOutcome::TimedOut)
    }
}

/// An item paired with its outcome and how long it ran
#[derive(Debug, Clone)]
pub struct WorkOutcome<I, T> {
    pub item: I,
    pub outcome: ItemOutcome<T>,
    pub elapsed: Duration,
}

/// Everything a batch produced, in completion order
#[derive(Debug)]
pub struct BatchReport<I, T> {
    pub outcomes: Vec<WorkOutcome<I, T>>,
    /// Number of items handed to the runner
    pub submitted: usize,
    /// Items the deadline prevented from being admitted
    pub not_admitted: Vec<I>,
    /// Admitted items whose task panicked
    pub failed: usize,
    /// True when the deadline stopped admission before every item ran
    pub deadline_reached: bool,
    pub elapsed: Duration,
}

impl<I, T> BatchReport<I, T> {
    /// Whether every submitted item reached a terminal outcome
    pub fn is_complete(&self) -> bool {
        self.not_admitted.is_empty() && self.failed == 0
    }

    pub fn timed_out(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.outcome.is_timed_out())
            .count()
    }

    /// Completed values only, dropping timeouts
    pub fn completed(&self) -> impl Iterator<Item = (&I, &T)> {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.outcome.completed().map(|value| (&outcome.item, value)))
    }
}

/// Generic bounded-parallelism executor shared by the multi-target probes
#[derive(Debug, Clone)]
pub struct BoundedRunner {
    config: RunnerConfig,
}

impl BoundedRunner {
    /// Validates the configuration; a cap below one or a zero item timeout is rejected
    pub fn new(config: RunnerConfig) -> Result<Self, ProbeError> {
        if config.concurrency < 1 {
            return Err(ProbeError::InvalidConcurrency {
                cap: config.concurrency,
            });
        }
        if config.item_timeout.is_zero() {
            return Err(ProbeError::InvalidTimeout);
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Runs `check` against every item and returns whatever finished
    ///
    /// The returned report never fails as a whole: unreachable targets
    /// surface as completed negative values or `TimedOut`, and items the
    /// deadline kept out are listed in `not_admitted`.
    pub async fn run<I, T, F, Fut>(&self, items: Vec<I>, check: F) -> BatchReport<I, T>
    where
        I: Clone + Send + 'static,
        T: Send + 'static,
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let started = Instant::now();
        let submitted = items.len();
        let deadline = self.config.deadline.map(|limit| started + limit);
        let item_timeout = self.config.item_timeout;

        info!(
            "Starting bounded batch: items={}, concurrency={}, item_timeout={}ms, deadline={:?}",
            submitted,
            self.config.concurrency,
            item_timeout.as_millis(),
            self.config.deadline
        );

        let gate = Arc::new(Semaphore::new(self.config.concurrency));
        let results: Arc<Mutex<Vec<WorkOutcome<I, T>>>> =
            Arc::new(Mutex::new(Vec::with_capacity(submitted)));
        let check = Arc::new(check);
        let mut tasks = JoinSet::new();
        let mut pending = items.into_iter();
        let mut not_admitted = Vec::new();
        let mut deadline_reached = false;

        for item in pending.by_ref() {
            let permit = match deadline {
                Some(deadline) => match timeout_at(deadline, gate.clone().acquire_owned()).await {
                    Ok(Ok(permit)) => permit,
                    Ok(Err(_closed)) => {
                        not_admitted.push(item);
                        break;
                    }
                    Err(_elapsed) => {
                        deadline_reached = true;
                        not_admitted.push(item);
                        break;
                    }
                },
                None => match gate.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_closed) => {
                        not_admitted.push(item);
                        break;
                    }
                },
            };

            // A permit granted exactly at the deadline still counts as late
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                deadline_reached = true;
                drop(permit);
                not_admitted.push(item);
                break;
            }

            let check = Arc::clone(&check);
            let results = Arc::clone(&results);
            tasks.spawn(async move {
                let _permit = permit;
                let item_started = Instant::now();
                let outcome = match timeout(item_timeout, check(item.clone())).await {
                    Ok(value) => ItemOutcome::Completed(value),
                    Err(_elapsed) => ItemOutcome::TimedOut,
                };
                let elapsed = item_started.elapsed();
                trace!("Work item finished in {}ms", elapsed.as_millis());
                results.lock().await.push(WorkOutcome {
                    item,
                    outcome,
                    elapsed,
                });
            });
        }
        not_admitted.extend(pending);

        if deadline_reached {
            warn!(
                "Batch deadline reached: {} of {} items were not admitted, waiting for {} in-flight items",
                not_admitted.len(),
                submitted,
                tasks.len()
            );
        }

        let mut failed = 0;
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                failed += 1;
                warn!("Work item task failed: {}", e);
            }
        }

        let outcomes = std::mem::take(&mut *results.lock().await);
        let elapsed = started.elapsed();

        debug!(
            "Bounded batch finished: completed={}, not_admitted={}, failed={}, elapsed={}ms",
            outcomes.len(),
            not_admitted.len(),
            failed,
            elapsed.as_millis()
        );

        BatchReport {
            outcomes,
            submitted,
            not_admitted,
            failed,
            deadline_reached,
            elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_rejects_zero_cap() {
        let result = BoundedRunner::new(RunnerConfig::new(0, Duration::from_millis(10)));
        assert!(matches!(result, Err(ProbeError::InvalidConcurrency { cap: 0 })));
    }

    #[test]
    fn test_rejects_zero_item_timeout() {
        let result = BoundedRunner::new(RunnerConfig::new(4, Duration::ZERO));
        assert!(matches!(result, Err(ProbeError::InvalidTimeout)));
    }

    #[tokio::test]
    async fn test_empty_batch_returns_immediately() {
        let runner = BoundedRunner::new(RunnerConfig::new(4, Duration::from_millis(10))).unwrap();
        let report = runner.run(Vec::<u32>::new(), |n| async move { n }).await;
        assert!(report.outcomes.is_empty());
        assert!(report.is_complete());
        assert!(!report.deadline_reached);
    }

    #[tokio::test]
    async fn test_never_exceeds_cap() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let runner = BoundedRunner::new(RunnerConfig::new(3, Duration::from_secs(1))).unwrap();

        let (flight, high) = (Arc::clone(&in_flight), Arc::clone(&peak));
        let report = runner
            .run((0..30u32).collect(), move |n| {
                let flight = Arc::clone(&flight);
                let high = Arc::clone(&high);
                async move {
                    let now = flight.fetch_add(1, Ordering::SeqCst) + 1;
                    high.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    flight.fetch_sub(1, Ordering::SeqCst);
                    n
                }
            })
            .await;

        assert_eq!(report.outcomes.len(), 30);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn test_hung_item_times_out_without_stalling_siblings() {
        let runner = BoundedRunner::new(RunnerConfig::new(2, Duration::from_millis(50))).unwrap();
        let report = runner
            .run(vec![0u32, 1, 2, 3], |n| async move {
                if n == 0 {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                }
                n
            })
            .await;

        assert_eq!(report.outcomes.len(), 4);
        assert_eq!(report.timed_out(), 1);
        assert!(report.elapsed < Duration::from_secs(5));
        let mut completed: Vec<u32> = report.completed().map(|(_, value)| *value).collect();
        completed.sort();
        assert_eq!(completed, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_deadline_stops_admission_and_keeps_partial_results() {
        let config = RunnerConfig::new(1, Duration::from_millis(100))
            .with_deadline(Duration::from_millis(120));
        let runner = BoundedRunner::new(config).unwrap();

        let report = runner
            .run((0..20u32).collect(), |n| async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                n
            })
            .await;

        assert!(report.deadline_reached);
        assert!(!report.outcomes.is_empty());
        assert!(!report.not_admitted.is_empty());
        assert_eq!(report.outcomes.len() + report.not_admitted.len(), 20);
        assert!(report.elapsed < Duration::from_millis(120 + 100 + 200));
    }

    #[tokio::test]
    async fn test_panicking_item_is_counted_as_failed() {
        let runner = BoundedRunner::new(RunnerConfig::new(2, Duration::from_secs(1))).unwrap();
        let report = runner
            .run(vec![1u32, 2, 3], |n| async move {
                if n == 2 {
                    panic!("check blew up");
                }
                n
            })
            .await;

        assert_eq!(report.failed, 1);
        assert_eq!(report.outcomes.len(), 2);
        assert!(!report.is_complete());
    }
}

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use netscout::runner::{BoundedRunner, ItemOutcome, RunnerConfig};

/// Timing guarantees of the bounded runner under mixed workloads

#[tokio::test]
async fn test_batch_of_hung_items_finishes_in_waves() {
    // 20 items that never finish, cap 5, 100ms each: four waves
    let runner = BoundedRunner::new(RunnerConfig::new(5, Duration::from_millis(100))).unwrap();
    let report = runner
        .run((0..20u32).collect(), |_| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        })
        .await;

    assert_eq!(report.timed_out(), 20);
    assert!(report.is_complete());
    assert!(report.elapsed >= Duration::from_millis(400));
    assert!(report.elapsed < Duration::from_millis(400 + 1500));
}

#[tokio::test]
async fn test_every_item_reaches_exactly_one_outcome() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let runner = BoundedRunner::new(RunnerConfig::new(7, Duration::from_millis(50))).unwrap();

    let report = runner
        .run((0..64u32).collect(), move |n| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if n % 8 == 0 {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                }
                n * 2
            }
        })
        .await;

    assert_eq!(calls.load(Ordering::SeqCst), 64);
    assert_eq!(report.submitted, 64);
    assert_eq!(report.outcomes.len(), 64);
    assert_eq!(report.timed_out(), 8);

    let mut items: Vec<u32> = report.outcomes.iter().map(|outcome| outcome.item).collect();
    items.sort();
    assert_eq!(items, (0..64).collect::<Vec<_>>());

    for outcome in &report.outcomes {
        match outcome.outcome {
            ItemOutcome::Completed(value) => assert_eq!(value, outcome.item * 2),
            ItemOutcome::TimedOut => assert_eq!(outcome.item % 8, 0),
        }
    }
}

#[tokio::test]
async fn test_deadline_bounds_total_runtime() {
    let config = RunnerConfig::new(2, Duration::from_millis(200)).with_deadline(Duration::from_millis(300));
    let runner = BoundedRunner::new(config).unwrap();

    let report = runner
        .run((0..100u32).collect(), |n| async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            n
        })
        .await;

    assert!(report.deadline_reached);
    assert!(!report.is_complete());
    assert_eq!(report.outcomes.len() + report.not_admitted.len(), 100);
    assert!(report.elapsed < Duration::from_millis(300 + 200 + 500));
}

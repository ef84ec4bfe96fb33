use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use ic2scratch_lib::{
    ClassificationResult, ClassificationScheduler, Classifier, EdgeLatch, Frame, RankedLabel,
    ResultBridge, ResultError, SchedulerOptions, SyntheticCamera, VideoIo,
};
use tokio::time;

/// Always sees the same cat.
struct CatClassifier {
    calls: AtomicUsize,
}

#[async_trait]
impl Classifier for CatClassifier {
    async fn classify(&self, _frame: Frame) -> anyhow::Result<ClassificationResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ClassificationResult::new(vec![
            RankedLabel::new("tabby cat", 0.81),
            RankedLabel::new("tiger cat", 0.12),
            RankedLabel::new("Egyptian cat", 0.05),
        ])?)
    }
}

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn setup() -> (ClassificationScheduler, Arc<ResultBridge>, Arc<CatClassifier>) {
    let camera = Arc::new(SyntheticCamera::new(32, 24));
    camera.enable().expect("synthetic camera enables");
    let classifier = Arc::new(CatClassifier {
        calls: AtomicUsize::new(0),
    });
    let bridge = Arc::new(ResultBridge::new(EdgeLatch::default()));
    let scheduler = ClassificationScheduler::new(
        camera,
        Arc::clone(&classifier) as Arc<dyn Classifier>,
        Arc::clone(&bridge),
        SchedulerOptions::default(),
        ms(1_000),
    );
    (scheduler, bridge, classifier)
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn classification_at_one_second_is_seen_then_settles() {
    let (scheduler, bridge, classifier) = setup();

    assert!(matches!(
        bridge.get(1),
        Err(ResultError::OutOfRange { rank: 1, available: 0 })
    ));

    scheduler.start(1_000).expect("timer starts");

    time::sleep(ms(1_050)).await;
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
    assert!(bridge.poll());
    assert_eq!(bridge.get(1).expect("top result").label, "tabby cat");
    assert_eq!(bridge.label(3).expect("third result"), "Egyptian cat");
    assert!(bridge.get(4).is_err());

    time::sleep(ms(150)).await;
    assert!(!bridge.poll());
    // Results outlive the signal.
    assert_eq!(bridge.label(1).expect("top result"), "tabby cat");

    scheduler.shutdown().await.expect("clean shutdown");
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn fast_poller_holds_the_signal_until_it_pauses() {
    let (scheduler, bridge, _classifier) = setup();
    scheduler.start(1_000).expect("timer starts");

    // A 30 Hz poller never leaves a 100 ms gap, so once the first completion
    // is seen every later read is true.
    let mut reads = Vec::new();
    for _ in 0..100 {
        time::sleep(ms(33)).await;
        reads.push(bridge.poll());
    }
    let first_true = reads.iter().position(|read| *read).expect("signal observed");
    assert_eq!(first_true, 30);
    assert!(reads[first_true..].iter().all(|read| *read));

    scheduler.stop();
    time::sleep(ms(150)).await;
    assert!(!bridge.poll());

    scheduler.shutdown().await.expect("clean shutdown");
}

#[tokio::test(flavor = "current_thread", start_paused = true)]
async fn coarse_poller_still_observes_each_completion() {
    let (scheduler, bridge, _classifier) = setup();
    scheduler.start(1_000).expect("timer starts");

    // Polling every 700 ms is far coarser than the 100 ms hold.
    let mut observed = Vec::new();
    for _ in 0..6 {
        time::sleep(ms(700)).await;
        observed.push(bridge.poll());
    }

    // Completions at 1000, 2000, 3000, 4000; polls at 700, 1400, ..., 4200.
    // The 2800 read follows a 700 ms quiet gap after the 2100 read.
    assert_eq!(observed, [false, true, true, false, true, true]);
    scheduler.shutdown().await.expect("clean shutdown");
}

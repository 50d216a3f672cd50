use bubblewatch::analysis::Trigger;
use bubblewatch::error::BubbleError;
use bubblewatch::monitor::{
    ContextId, Monitor, MonitorEvent, MonitorTiming, PageActor, ReportEnvelope, TextSource,
};
use bubblewatch::settings::SettingsCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

/// Feed whose texts can be swapped while the monitor runs
struct StaticSource {
    texts: Mutex<Vec<String>>,
}

impl StaticSource {
    fn new(texts: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            texts: Mutex::new(texts.iter().map(|t| t.to_string()).collect()),
        })
    }
}

impl TextSource for StaticSource {
    fn collect_feed_texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }

    fn current_url(&self) -> String {
        "https://www.youtube.com/".to_string()
    }
}

#[derive(Default)]
struct CountingActor {
    fired: AtomicUsize,
}

impl PageActor for CountingActor {
    fn perform_action(&self, _context: &ContextId) {
        self.fired.fetch_add(1, Ordering::SeqCst);
    }
}

const REPETITIVE: [&str; 5] = ["cats are great"; 5];

async fn next_report(events: &mut broadcast::Receiver<MonitorEvent>) -> ReportEnvelope {
    loop {
        match events.recv().await.unwrap() {
            MonitorEvent::Report(envelope) => return envelope,
            MonitorEvent::Closed(_) => continue,
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_interval_passes() {
    let mut monitor = Monitor::new(SettingsCell::default(), MonitorTiming::default(), 64);
    let mut events = monitor.subscribe();
    monitor
        .open(ContextId(1), StaticSource::new(&REPETITIVE), Arc::new(CountingActor::default()))
        .await;

    let first = next_report(&mut events).await;
    assert_eq!(first.context_id, ContextId(1));
    assert_eq!(first.report.analysis_tick, 1);
    assert_eq!(first.report.trigger, Trigger::Interval);
    assert!(first.report.changed);
    assert_eq!(first.report.feed_size, 5);

    let second = next_report(&mut events).await;
    assert_eq!(second.report.analysis_tick, 2);
    assert!(!second.report.changed);

    monitor.shutdown().await;
    assert_eq!(monitor.active_contexts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_scroll_bursts_collapse_into_one_pass() {
    let timing = MonitorTiming {
        analysis_interval: Duration::from_secs(60),
        ..MonitorTiming::default()
    };
    let mut monitor = Monitor::new(SettingsCell::default(), timing, 64);
    let mut events = monitor.subscribe();
    let id = ContextId(2);
    monitor
        .open(id.clone(), StaticSource::new(&REPETITIVE), Arc::new(CountingActor::default()))
        .await;

    let initial = next_report(&mut events).await;
    assert_eq!(initial.report.trigger, Trigger::Interval);

    for _ in 0..3 {
        monitor.notify_scroll(&id).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    let scrolled = next_report(&mut events).await;
    assert_eq!(scrolled.report.trigger, Trigger::Scroll);
    assert_eq!(scrolled.report.analysis_tick, 2);

    // Nothing else until the next interval tick
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));

    monitor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_auto_action_respects_cooldown_and_delay() {
    let mut monitor = Monitor::new(SettingsCell::default(), MonitorTiming::default(), 64);
    let mut events = monitor.subscribe();
    let actor = Arc::new(CountingActor::default());
    monitor
        .open(ContextId(3), StaticSource::new(&REPETITIVE), actor.clone())
        .await;

    // t=0: repetitive, action scheduled for t=3s
    next_report(&mut events).await;
    assert_eq!(actor.fired.load(Ordering::SeqCst), 0);

    // t=5s and t=10s: still inside the cooldown
    next_report(&mut events).await;
    assert_eq!(actor.fired.load(Ordering::SeqCst), 1);
    next_report(&mut events).await;

    // t=15s: cooldown elapsed, action runs at t=18s
    next_report(&mut events).await;
    assert_eq!(actor.fired.load(Ordering::SeqCst), 1);
    let fifth = next_report(&mut events).await;
    assert_eq!(fifth.report.analysis_tick, 5);
    assert_eq!(actor.fired.load(Ordering::SeqCst), 2);

    monitor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_teardown_cancels_pending_action() {
    let mut monitor = Monitor::new(SettingsCell::default(), MonitorTiming::default(), 64);
    let mut events = monitor.subscribe();
    let actor = Arc::new(CountingActor::default());
    let id = ContextId(4);
    monitor
        .open(id.clone(), StaticSource::new(&REPETITIVE), actor.clone())
        .await;

    next_report(&mut events).await;
    monitor.close(&id).await.unwrap();

    loop {
        match events.recv().await.unwrap() {
            MonitorEvent::Closed(closed) => {
                assert_eq!(closed, id);
                break;
            }
            MonitorEvent::Report(_) => continue,
        }
    }

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(actor.fired.load(Ordering::SeqCst), 0);
    assert!(matches!(events.try_recv(), Err(TryRecvError::Empty)));
    assert!(matches!(
        monitor.notify_scroll(&id),
        Err(BubbleError::ContextNotFound { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_settings_apply_on_next_pass() {
    let settings = SettingsCell::default();
    let mut monitor = Monitor::new(settings.clone(), MonitorTiming::default(), 64);
    let mut events = monitor.subscribe();
    let actor = Arc::new(CountingActor::default());
    monitor
        .open(ContextId(5), StaticSource::new(&REPETITIVE), actor.clone())
        .await;

    let first = next_report(&mut events).await;
    assert!(first.report.result.repetitive);

    settings.modify(|s| {
        s.sensitivity = 1.0;
        s.auto_explore = false;
    });

    let second = next_report(&mut events).await;
    assert!(!second.report.result.repetitive);
    assert!(second.report.changed);

    monitor.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_contexts_are_independent() {
    let mut monitor = Monitor::new(SettingsCell::default(), MonitorTiming::default(), 64);
    let mut events = monitor.subscribe();
    let disjoint = StaticSource::new(&[
        "alpha one",
        "beta two",
        "gamma three",
        "delta four",
        "epsilon five",
    ]);
    monitor
        .open(ContextId(10), StaticSource::new(&REPETITIVE), Arc::new(CountingActor::default()))
        .await;
    monitor
        .open(ContextId(11), disjoint, Arc::new(CountingActor::default()))
        .await;
    assert_eq!(monitor.active_contexts(), 2);

    let mut seen = Vec::new();
    while seen.len() < 2 {
        let envelope = next_report(&mut events).await;
        assert_eq!(envelope.report.analysis_tick, 1);
        seen.push(envelope);
    }
    let repetitive = seen.iter().find(|e| e.context_id == ContextId(10)).unwrap();
    let varied = seen.iter().find(|e| e.context_id == ContextId(11)).unwrap();
    assert!(repetitive.report.result.repetitive);
    assert!(!varied.report.result.repetitive);
    assert_eq!(varied.report.result.similarity_score, 0.0);

    monitor.close(&ContextId(10)).await.unwrap();
    assert!(!monitor.is_monitoring(&ContextId(10)));
    assert!(monitor.is_monitoring(&ContextId(11)));

    let next = next_report(&mut events).await;
    assert_eq!(next.context_id, ContextId(11));
    assert_eq!(next.report.analysis_tick, 2);

    monitor.shutdown().await;
}

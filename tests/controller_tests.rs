// tests/controller_tests.rs
use crossbeam_channel::{bounded, unbounded};
use spartan::{
    Chain, ConfigError, Controller, Event, Flow, LifecycleError, Sentinel, Stage,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Drops every event whose line number is divisible by `every`.
struct DropEvery(usize);

impl Stage for DropEvery {
    fn process(&self, event: Event) -> Flow {
        let n: usize = event.raw().and_then(|r| r.parse().ok()).unwrap_or(1);
        if n % self.0 == 0 {
            Flow::Drop
        } else {
            Flow::Continue(event)
        }
    }

    fn name(&self) -> &str {
        "drop_every"
    }
}

struct Slow(Duration);

impl Stage for Slow {
    fn process(&self, event: Event) -> Flow {
        thread::sleep(self.0);
        Flow::Continue(event)
    }

    fn name(&self) -> &str {
        "slow"
    }
}

struct CountFinish(Arc<AtomicUsize>);

impl Stage for CountFinish {
    fn process(&self, event: Event) -> Flow {
        Flow::Continue(event)
    }

    fn name(&self) -> &str {
        "count_finish"
    }

    fn finish(&self) -> Result<(), spartan::ProcessingError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

fn lines(n: usize) -> impl Iterator<Item = Event> {
    (1..=n).map(|i| Event::from_line(i.to_string()))
}

#[test]
fn test_single_worker_preserves_order() {
    println!("=== Testing controller: pool size 1 keeps order ===");

    let (in_tx, in_rx) = bounded(4);
    let (out_tx, out_rx) = unbounded();
    let mut controller = Controller::new("filters", Chain::empty(), 1).unwrap();
    controller.start(in_rx, Sentinel::forward(out_tx)).unwrap();

    for event in lines(500) {
        in_tx.send(event).unwrap();
    }
    controller.close().unwrap();

    let seen: Vec<String> = out_rx
        .try_iter()
        .map(|e| e.raw().unwrap().to_string())
        .collect();
    let expected: Vec<String> = (1..=500).map(|i| i.to_string()).collect();
    assert_eq!(seen, expected);
    println!("✓ 500 events emitted in input order");
}

#[test]
fn test_many_workers_lose_nothing() {
    println!("=== Testing controller: pool size > 1 loses nothing ===");

    let (in_tx, in_rx) = bounded(8);
    let (out_tx, out_rx) = unbounded();
    let chain = Chain::builder()
        .stage(Slow(Duration::from_micros(50)))
        .stage(DropEvery(10))
        .build();
    let mut controller = Controller::new("filters", chain, 8).unwrap();
    controller.start(in_rx, Sentinel::forward(out_tx)).unwrap();

    for event in lines(1000) {
        in_tx.send(event).unwrap();
    }
    let stats = controller.close().unwrap();

    assert_eq!(stats.received, 1000);
    assert_eq!(stats.dropped, 100);
    assert_eq!(stats.delivered, 900);
    assert_eq!(stats.undeliverable, 0);

    let seen: HashSet<String> = out_rx
        .try_iter()
        .map(|e| e.raw().unwrap().to_string())
        .collect();
    assert_eq!(seen.len(), 900);
    assert!(!seen.contains("10"));
    assert!(seen.contains("999"));
    println!("✓ Every admitted event delivered or explicitly dropped");
}

#[test]
fn test_close_waits_for_queued_events() {
    println!("=== Testing controller: close drains the inbound queue ===");

    let (in_tx, in_rx) = unbounded();
    let (out_tx, out_rx) = unbounded();
    let chain = Chain::builder()
        .stage(Slow(Duration::from_millis(2)))
        .build();
    let mut controller = Controller::new("filters", chain, 2).unwrap();
    controller.start(in_rx, Sentinel::forward(out_tx)).unwrap();

    // Queue far more than the workers can finish before close is called
    for event in lines(50) {
        in_tx.send(event).unwrap();
    }
    let stats = controller.close().unwrap();

    assert_eq!(stats.delivered, 50);
    assert_eq!(out_rx.try_iter().count(), 50);
    // Workers are gone: nothing is consuming the inbound channel any more
    assert!(in_tx.send(Event::from_line("late")).is_err());
    println!("✓ Close returned after all queued events were delivered");
}

#[test]
fn test_finish_called_once_per_stage() {
    let finished = Arc::new(AtomicUsize::new(0));
    let (_in_tx, in_rx) = unbounded::<Event>();
    let chain = Chain::builder()
        .stage(CountFinish(finished.clone()))
        .stage(CountFinish(finished.clone()))
        .build();
    let mut controller = Controller::new("outputs", chain, 4).unwrap();
    controller.start(in_rx, Sentinel::end()).unwrap();
    controller.close().unwrap();
    assert_eq!(finished.load(Ordering::SeqCst), 2);
}

#[test]
fn test_lifecycle_misuse_is_rejected() {
    println!("=== Testing controller: lifecycle errors ===");

    let mut controller = Controller::new("filters", Chain::empty(), 2).unwrap();
    assert!(matches!(
        controller.close(),
        Err(LifecycleError::NotStarted(name)) if name == "filters"
    ));

    // Still startable after a premature close
    let (_tx, rx) = unbounded::<Event>();
    controller.start(rx.clone(), Sentinel::end()).unwrap();
    assert!(controller.is_running());
    assert!(matches!(
        controller.start(rx.clone(), Sentinel::end()),
        Err(LifecycleError::AlreadyStarted(_))
    ));

    controller.close().unwrap();
    assert!(matches!(
        controller.close(),
        Err(LifecycleError::AlreadyClosed(_))
    ));
    assert!(matches!(
        controller.start(rx, Sentinel::end()),
        Err(LifecycleError::AlreadyClosed(_))
    ));
    println!("✓ NotStarted, AlreadyStarted and AlreadyClosed reported");
}

#[test]
fn test_invalid_worker_count() {
    assert!(matches!(
        Controller::new("filters", Chain::empty(), 0),
        Err(ConfigError::InvalidWorkerCount(0))
    ));
}

#[test]
fn test_closing_downstream_first_is_reported() {
    println!("=== Testing controller: downstream closed before upstream ===");

    let (in_tx, in_rx) = unbounded();
    let (mid_tx, mid_rx) = unbounded();

    let mut outputs = Controller::new("outputs", Chain::empty(), 1).unwrap();
    outputs.start(mid_rx, Sentinel::end()).unwrap();
    let mut filters = Controller::new("filters", Chain::empty(), 1).unwrap();
    filters.start(in_rx, Sentinel::forward(mid_tx)).unwrap();

    // Wrong order: outputs first
    outputs.close().unwrap();
    for event in lines(3) {
        in_tx.send(event).unwrap();
    }

    match filters.close() {
        Err(LifecycleError::DownstreamClosed { controller, count }) => {
            assert_eq!(controller, "filters");
            assert_eq!(count, 3);
        }
        other => panic!("expected DownstreamClosed, got {:?}", other),
    }
    assert_eq!(filters.stats().undeliverable, 3);
    println!("✓ Undeliverable events surface as a lifecycle error");
}

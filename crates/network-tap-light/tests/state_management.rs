use std::sync::Arc;
use std::time::{Duration, Instant};

use network_tap_light::config::TapConfig;
use network_tap_light::{NetworkEvent, NetworkMonitor, RequestOutcome, TapError};
use tokio_util::sync::CancellationToken;

fn quick_monitor() -> NetworkMonitor {
    NetworkMonitor::new(TapConfig {
        poll_interval_ms: 5,
        ..TapConfig::default()
    })
}

#[tokio::test]
async fn untouched_monitor_is_idle_immediately() {
    let monitor = quick_monitor();
    let cancel = CancellationToken::new();
    let waited = monitor
        .wait_for_idle(Duration::from_millis(200), Duration::from_secs(1), &cancel)
        .await
        .unwrap();
    assert!(waited < Duration::from_millis(100));
}

#[tokio::test]
async fn idle_resolves_once_traffic_stops() {
    let monitor = quick_monitor();
    let cancel = CancellationToken::new();
    let id = monitor.on_request_start("https://shop.test/api/cart", "GET");

    let started = Instant::now();
    let waiting = monitor.wait_for_idle(Duration::from_millis(60), Duration::from_secs(2), &cancel);
    let finishing = async {
        tokio::time::sleep(Duration::from_millis(40)).await;
        monitor.on_request_end(id, Some(200), RequestOutcome::Succeeded);
    };
    let (result, _) = tokio::join!(waiting, finishing);

    result.unwrap();
    // The request started at t=0, so the window closes at t>=60ms, and it
    // stayed in flight until t=40ms.
    assert!(started.elapsed() >= Duration::from_millis(60));
}

#[tokio::test]
async fn steady_traffic_never_reaches_idle() {
    let monitor = Arc::new(quick_monitor());
    let cancel = CancellationToken::new();
    let idle_window = Duration::from_millis(80);

    let producer = Arc::clone(&monitor);
    let stop = cancel.child_token();
    let stop_producer = stop.clone();
    let feeder = tokio::spawn(async move {
        while !stop_producer.is_cancelled() {
            producer.record(NetworkEvent::new("https://shop.test/poll", "GET").with_status(200));
            tokio::time::sleep(Duration::from_millis(40)).await;
        }
    });

    let started = Instant::now();
    let err = monitor
        .wait_for_idle(idle_window, Duration::from_millis(300), &cancel)
        .await
        .unwrap_err();
    stop.cancel();
    feeder.await.unwrap();

    assert_eq!(err, TapError::Timeout(300));
    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[tokio::test]
async fn concurrent_writers_and_readers() {
    let monitor = Arc::new(NetworkMonitor::new(TapConfig {
        capacity: 50,
        ..TapConfig::default()
    }));

    let mut writers = Vec::new();
    for worker in 0..4 {
        let monitor = Arc::clone(&monitor);
        writers.push(tokio::spawn(async move {
            for idx in 0..25 {
                let id = monitor.on_request_start(format!("https://w{worker}.test/{idx}"), "GET");
                monitor.on_request_end(id, Some(200), RequestOutcome::Succeeded);
                let _ = monitor.stats();
            }
        }));
    }
    for writer in writers {
        writer.await.unwrap();
    }

    let stats = monitor.stats();
    assert_eq!(stats.count, 50);
    assert_eq!(stats.evicted, 50);
    assert_eq!(stats.inflight, 0);
}

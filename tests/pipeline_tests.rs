mod common;

use common::{event, fast_config, Call, RecordingOrderService};
use order_pipeline::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::timeout;

fn start(config: &PipelineConfig, service: Arc<RecordingOrderService>) -> Sequencer {
    Sequencer::start(config, service, Arc::new(NoopMetrics))
}

async fn wait_idle(sequencer: &Sequencer) {
    timeout(Duration::from_secs(10), sequencer.wait_idle())
        .await
        .expect("sequencer did not go idle");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_events_for_one_order_apply_in_enqueue_order() {
    let service = Arc::new(RecordingOrderService::with_apply_delay(Duration::from_millis(1)));
    let sequencer = start(&fast_config(4), service.clone());

    let enqueued = Mutex::new(Vec::new());
    std::thread::scope(|scope| {
        for producer in 0..4 {
            let sequencer = &sequencer;
            let enqueued = &enqueued;
            scope.spawn(move || {
                for i in 0..25 {
                    let name = format!("p{}-{}", producer, i);
                    // Record and enqueue together so the recorded order is the enqueue order
                    let mut order = enqueued.lock().unwrap();
                    sequencer.enqueue(1, event(1, EventType::Updated, &name)).unwrap();
                    order.push(name);
                }
            });
        }
    });

    wait_idle(&sequencer).await;

    let applied: Vec<String> = service
        .calls_for(1)
        .into_iter()
        .map(|call| call.product_name)
        .collect();
    assert_eq!(applied, enqueued.into_inner().unwrap());
    assert!(!service.overlap_detected());
    assert_eq!(sequencer.active_keys(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_event_order_is_applied() {
    let service = Arc::new(RecordingOrderService::new());
    let sequencer = start(&fast_config(2), service.clone());

    sequencer.enqueue(11, event(11, EventType::Created, "only")).unwrap();
    wait_idle(&sequencer).await;

    assert_eq!(service.calls_for(11).len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_orders_interleaved_keep_per_order_fifo() {
    let service = Arc::new(RecordingOrderService::with_apply_delay(Duration::from_millis(1)));
    let mut config = fast_config(4);
    config.drain_batch = 3;
    let sequencer = start(&config, service.clone());

    for i in 0..20 {
        for order_id in 1..=5 {
            sequencer
                .enqueue(order_id, event(order_id, EventType::Updated, &format!("{}", i)))
                .unwrap();
        }
    }

    wait_idle(&sequencer).await;

    for order_id in 1..=5 {
        let applied: Vec<String> = service
            .calls_for(order_id)
            .into_iter()
            .map(|call| call.product_name)
            .collect();
        let expected: Vec<String> = (0..20).map(|i| i.to_string()).collect();
        assert_eq!(applied, expected, "order {} out of order", order_id);
    }
    assert!(!service.overlap_detected());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_blocked_order_does_not_block_other_orders() {
    let service = Arc::new(RecordingOrderService::new());
    let gate = service.gate(1);
    let sequencer = start(&fast_config(2), service.clone());

    sequencer.enqueue(1, event(1, EventType::Created, "stuck")).unwrap();
    timeout(Duration::from_secs(5), service.entered.notified())
        .await
        .expect("order 1 apply never started");

    sequencer.enqueue(2, event(2, EventType::Created, "free")).unwrap();

    timeout(Duration::from_secs(5), async {
        while service.calls_for(2).is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("order 2 was blocked behind order 1");

    assert!(service.calls_for(1).is_empty());

    gate.add_permits(1);
    wait_idle(&sequencer).await;
    assert_eq!(service.calls_for(1).len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_drained_order_is_removed_and_late_event_starts_new_drain() {
    let service = Arc::new(RecordingOrderService::new());
    let sequencer = start(&fast_config(2), service.clone());

    sequencer.enqueue(5, event(5, EventType::Created, "first")).unwrap();
    wait_idle(&sequencer).await;

    assert_eq!(sequencer.active_keys(), 0);
    assert_eq!(sequencer.pending_events(5), 0);

    sequencer.enqueue(5, event(5, EventType::Updated, "late")).unwrap();
    wait_idle(&sequencer).await;

    let applied: Vec<String> = service
        .calls_for(5)
        .into_iter()
        .map(|call| call.product_name)
        .collect();
    assert_eq!(applied, vec!["first".to_string(), "late".to_string()]);
    assert_eq!(sequencer.active_keys(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_create_update_cancel_reach_collaborator_in_order() {
    let service = Arc::new(RecordingOrderService::new());
    let sequencer = start(&fast_config(4), service.clone());

    let created = event(5, EventType::Created, "Laptop");
    let mut updated = event(5, EventType::Updated, "Laptop");
    updated.order.price = rust_decimal::Decimal::from(10);
    let cancelled = event(5, EventType::Cancelled, "Laptop");

    sequencer.enqueue(5, created).unwrap();
    sequencer.enqueue(5, updated).unwrap();
    sequencer.enqueue(5, cancelled).unwrap();
    wait_idle(&sequencer).await;

    let ops: Vec<(&str, i64)> = service
        .calls()
        .iter()
        .map(|call| (call.op, call.order_id))
        .collect();
    assert_eq!(ops, vec![("create", 5), ("update", 5), ("cancel", 5)]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_lifecycle_against_in_memory_store() {
    let store = Arc::new(InMemoryOrderStore::new());
    let sequencer = Sequencer::start(&fast_config(4), store.clone(), Arc::new(NoopMetrics));

    let created = event(5, EventType::Created, "Laptop");
    let mut updated = event(5, EventType::Updated, "Laptop Pro");
    updated.order.price = rust_decimal::Decimal::from(10);
    let cancelled = event(5, EventType::Cancelled, "Laptop Pro");

    sequencer.enqueue(5, created).unwrap();
    sequencer.enqueue(5, updated).unwrap();
    sequencer.enqueue(5, cancelled).unwrap();
    wait_idle(&sequencer).await;

    let order = store.find_by_id(5).unwrap();
    assert_eq!(order.product_name, "Laptop Pro");
    assert_eq!(order.price, rust_decimal::Decimal::from(10));
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert_eq!(order.version, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_conflicting_apply_is_retried_until_it_succeeds() {
    let service = Arc::new(RecordingOrderService::new());
    service.conflict_times("contended", 2);
    let sequencer = start(&fast_config(2), service.clone());

    sequencer.enqueue(8, event(8, EventType::Updated, "contended")).unwrap();
    wait_idle(&sequencer).await;

    assert_eq!(service.calls_for(8).len(), 1);
    assert_eq!(service.attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_event_is_dropped_and_order_keeps_draining() {
    let service = Arc::new(RecordingOrderService::new());
    service.poison("bad");
    service.conflict_times("hopeless", 10);
    let sequencer = start(&fast_config(2), service.clone());

    sequencer.enqueue(3, event(3, EventType::Created, "good")).unwrap();
    sequencer.enqueue(3, event(3, EventType::Updated, "bad")).unwrap();
    sequencer.enqueue(3, event(3, EventType::Updated, "hopeless")).unwrap();
    sequencer.enqueue(3, event(3, EventType::Cancelled, "after")).unwrap();
    wait_idle(&sequencer).await;

    assert_eq!(
        service.calls_for(3),
        vec![
            Call { op: "create", order_id: 3, product_name: "good".to_string() },
            Call { op: "cancel", order_id: 3, product_name: "after".to_string() },
        ]
    );
    // 1 + 1 (business error, no retry) + 3 (conflict, retried to the limit) + 1
    assert_eq!(service.attempts.load(std::sync::atomic::Ordering::SeqCst), 6);
    assert_eq!(sequencer.active_keys(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unknown_event_type_is_skipped() {
    let service = Arc::new(RecordingOrderService::new());
    let sequencer = start(&fast_config(2), service.clone());

    sequencer
        .enqueue(4, event(4, EventType::Unknown("ORDER_SHIPPED".to_string()), "ghost"))
        .unwrap();
    sequencer.enqueue(4, event(4, EventType::Created, "real")).unwrap();
    wait_idle(&sequencer).await;

    let applied: Vec<String> = service
        .calls_for(4)
        .into_iter()
        .map(|call| call.product_name)
        .collect();
    assert_eq!(applied, vec!["real".to_string()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bounded_queue_reports_overflow() {
    let service = Arc::new(RecordingOrderService::new());
    let gate = service.gate(9);
    let mut config = fast_config(2);
    config.queue_capacity = Some(2);
    let sequencer = start(&config, service.clone());

    sequencer.enqueue(9, event(9, EventType::Created, "in-flight")).unwrap();
    timeout(Duration::from_secs(5), service.entered.notified())
        .await
        .expect("first apply never started");

    sequencer.enqueue(9, event(9, EventType::Updated, "queued-1")).unwrap();
    sequencer.enqueue(9, event(9, EventType::Updated, "queued-2")).unwrap();
    let err = sequencer
        .enqueue(9, event(9, EventType::Updated, "overflow"))
        .unwrap_err();
    assert!(matches!(err, OrderPipelineError::QueueOverflow { order_id: 9, capacity: 2 }));
    assert_eq!(sequencer.pending_events(9), 2);

    gate.add_permits(3);
    wait_idle(&sequencer).await;
    assert_eq!(service.calls_for(9).len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_drains_pending_work() {
    let service = Arc::new(RecordingOrderService::with_apply_delay(Duration::from_millis(2)));
    let sequencer = start(&fast_config(2), service.clone());

    for order_id in 1..=3 {
        for i in 0..5 {
            sequencer
                .enqueue(order_id, event(order_id, EventType::Updated, &i.to_string()))
                .unwrap();
        }
    }

    let report = sequencer.shutdown(Duration::from_secs(10)).await;
    assert!(report.drained);
    assert!(report.abandoned.is_empty());
    assert_eq!(service.calls().len(), 15);

    let err = sequencer
        .enqueue(1, event(1, EventType::Updated, "too-late"))
        .unwrap_err();
    assert!(matches!(err, OrderPipelineError::ShuttingDown));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shutdown_deadline_abandons_stuck_drains() {
    let service = Arc::new(RecordingOrderService::new());
    let _gate = service.gate(1);
    let sequencer = start(&fast_config(2), service.clone());

    let stuck = event(1, EventType::Created, "stuck");
    let stuck_id = stuck.event_id.clone();
    sequencer.enqueue(1, stuck).unwrap();
    timeout(Duration::from_secs(5), service.entered.notified())
        .await
        .expect("apply never started");
    sequencer.enqueue(1, event(1, EventType::Updated, "a")).unwrap();
    sequencer.enqueue(1, event(1, EventType::Updated, "b")).unwrap();

    let report = sequencer.shutdown(Duration::from_millis(100)).await;
    assert!(!report.drained);
    assert_eq!(
        report.abandoned,
        vec![AbandonedQueue {
            order_id: 1,
            pending: 2,
            in_flight: Some(stuck_id),
        }]
    );
    assert_eq!(report.abandoned[0].unapplied(), 3);
    assert!(service.calls().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_panicking_apply_is_dropped_and_order_keeps_draining() {
    let service = Arc::new(RecordingOrderService::new());
    service.panic_on("boom");
    // A single worker, so a dead worker would stall everything after it
    let sequencer = start(&fast_config(1), service.clone());

    sequencer.enqueue(1, event(1, EventType::Created, "boom")).unwrap();
    sequencer.enqueue(1, event(1, EventType::Updated, "after")).unwrap();
    wait_idle(&sequencer).await;

    assert_eq!(
        service.calls_for(1),
        vec![Call { op: "update", order_id: 1, product_name: "after".to_string() }]
    );
    assert_eq!(sequencer.active_keys(), 0);

    // The key and the pool both survive for later events
    sequencer.enqueue(1, event(1, EventType::Cancelled, "late")).unwrap();
    sequencer.enqueue(2, event(2, EventType::Created, "other")).unwrap();
    wait_idle(&sequencer).await;

    assert_eq!(service.calls_for(1).len(), 2);
    assert_eq!(service.calls_for(2).len(), 1);
    assert!(!service.overlap_detected());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_dropping_sequencer_stops_its_workers() {
    let service = Arc::new(RecordingOrderService::new());
    let sequencer = start(&fast_config(4), service.clone());

    sequencer.enqueue(1, event(1, EventType::Created, "only")).unwrap();
    wait_idle(&sequencer).await;
    drop(sequencer);

    // Workers own the only other handles to the order service
    timeout(Duration::from_secs(5), async {
        while Arc::strong_count(&service) > 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("workers outlived their sequencer");
}

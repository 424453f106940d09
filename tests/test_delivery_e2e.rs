//! End-to-end delivery scenarios: producer and consumer loops running
//! against one broker, FIFO ordering, and wait-window timing behavior.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};

use mqlink::client::{Connection, ConnectionProfile};
use mqlink::config::{ClientConfig, Credentials};
use mqlink::consumer::{ConsumerLoop, DrainPolicy, StopCause};
use mqlink::message::{GetOutcome, OpenIntent, WaitMode};
use mqlink::producer::{run_producer, ProducerSettings};
use mqlink::transport::{InMemoryBroker, MemoryTransport};

const QUEUE: &str = "DEV.QUEUE.1";

async fn connect(broker: InMemoryBroker) -> Connection<MemoryTransport> {
    let profile = ConnectionProfile::from_config(&ClientConfig::default()).unwrap();
    let transport =
        MemoryTransport::new(broker, profile.endpoint.clone(), Credentials::default());
    Connection::establish(profile, transport).await.unwrap()
}

fn no_shutdown() -> watch::Receiver<bool> {
    let (_tx, rx) = watch::channel(false);
    rx
}

/// Producer sends 5 messages; a one-shot consumer drains exactly those 5 in
/// order, then sees empty and stops, leaving the queue empty.
#[tokio::test]
async fn five_message_produce_then_one_shot_drain() {
    let broker = InMemoryBroker::new().with_queue(QUEUE);

    // producer session
    let producer_conn = connect(broker.clone()).await;
    let out_queue = producer_conn.open(QUEUE, OpenIntent::Write).await.unwrap();
    let settings = ProducerSettings {
        count: 5,
        pace: Duration::ZERO,
        ..Default::default()
    };
    let report = run_producer(&out_queue, &settings).await.unwrap();
    out_queue.close().await.unwrap();
    producer_conn.disconnect().await.unwrap();
    assert_eq!(report.sent.len(), 5);
    assert_eq!(broker.depth(QUEUE), Some(5));

    // consumer session against the same broker
    let consumer_conn = connect(broker.clone()).await;
    let in_queue = consumer_conn.open(QUEUE, OpenIntent::Read).await.unwrap();
    let (tx, mut rx) = mpsc::channel(16);
    let mut consumer = ConsumerLoop::new(DrainPolicy::StopOnEmpty, WaitMode::NoWait);
    let summary = consumer
        .run_then_release(&in_queue, &consumer_conn, tx, no_shutdown())
        .await
        .unwrap();

    assert_eq!(summary.received, 5);
    assert_eq!(summary.cause, StopCause::Drained);
    assert_eq!(broker.depth(QUEUE), Some(0));

    for (i, expected_id) in report.sent.iter().enumerate() {
        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.id, *expected_id, "message {} out of order", i + 1);
        assert!(envelope.text().contains(&format!("{}/5", i + 1)));
    }
    assert!(rx.recv().await.is_none());
}

/// A poll-forever consumer started on an empty queue receives a concurrently
/// produced message within its wait window, without being restarted.
#[tokio::test]
async fn poll_forever_consumer_sees_concurrent_producer() {
    let broker = InMemoryBroker::new().with_queue(QUEUE);

    let consumer_conn = connect(broker.clone()).await;
    let in_queue = Arc::new(consumer_conn.open(QUEUE, OpenIntent::Read).await.unwrap());

    let loop_queue = in_queue.clone();
    let consumer_task = tokio::spawn(async move {
        let (tx, mut rx) = mpsc::channel(16);
        let mut consumer = ConsumerLoop::new(
            DrainPolicy::PollForever,
            WaitMode::Timeout(Duration::from_millis(5000)),
        )
        .with_message_cap(1);
        let summary = consumer.run(&loop_queue, tx, no_shutdown()).await.unwrap();
        (summary, rx.recv().await)
    });

    // producer starts while the consumer is already blocked waiting
    let producer_task = tokio::spawn({
        let broker = broker.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let conn = connect(broker).await;
            let out_queue = conn.open(QUEUE, OpenIntent::Write).await.unwrap();
            out_queue.put("made it".to_string(), false).await.unwrap();
            out_queue.close().await.unwrap();
            conn.disconnect().await.unwrap();
        }
    });

    let started = Instant::now();
    let (consumer_result, producer_result) = futures::join!(consumer_task, producer_task);
    producer_result.unwrap();
    let (summary, envelope) = consumer_result.unwrap();

    assert_eq!(summary.received, 1);
    assert_eq!(envelope.unwrap().text(), "made it");
    assert!(started.elapsed() < Duration::from_millis(5000));
}

/// No-wait get on an empty queue returns empty within a small constant time.
#[tokio::test]
async fn nowait_get_is_effectively_instant() {
    let connection = connect(InMemoryBroker::new().with_queue(QUEUE)).await;
    let queue = connection.open(QUEUE, OpenIntent::Read).await.unwrap();

    let started = Instant::now();
    let outcome = queue.get(WaitMode::NoWait).await.unwrap();
    assert!(matches!(outcome, GetOutcome::Empty));
    assert!(started.elapsed() < Duration::from_millis(100));
}

/// A timed get does not give up before its window elapses, and a message
/// arriving mid-window is returned instead of empty.
#[tokio::test]
async fn timed_get_honors_the_full_window() {
    let connection = connect(InMemoryBroker::new().with_queue(QUEUE)).await;
    let queue = Arc::new(connection.open(QUEUE, OpenIntent::ReadWrite).await.unwrap());

    // empty queue: the full window elapses before Empty comes back
    let window = Duration::from_millis(300);
    let started = Instant::now();
    let outcome = queue.get(WaitMode::Timeout(window)).await.unwrap();
    assert!(outcome.is_empty());
    assert!(started.elapsed() >= window);

    // message at T/2: returned well before the window runs out
    let writer = queue.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        writer.put("halfway".to_string(), false).await.unwrap();
    });
    let started = Instant::now();
    let envelope = queue
        .get(WaitMode::Timeout(window))
        .await
        .unwrap()
        .into_message()
        .expect("message should beat the window");
    assert_eq!(envelope.text(), "halfway");
    assert!(started.elapsed() < window);
}

/// FIFO holds across interleaved puts from one producer.
#[tokio::test]
async fn fifo_order_is_preserved_end_to_end() {
    let connection = connect(InMemoryBroker::new().with_queue(QUEUE)).await;
    let queue = connection.open(QUEUE, OpenIntent::ReadWrite).await.unwrap();

    for i in 0..20u32 {
        queue.put(format!("payload-{i}"), i % 2 == 0).await.unwrap();
    }
    for i in 0..20u32 {
        let envelope = queue
            .get(WaitMode::NoWait)
            .await
            .unwrap()
            .into_message()
            .unwrap();
        assert_eq!(envelope.text(), format!("payload-{i}"));
    }
    assert!(queue.get(WaitMode::NoWait).await.unwrap().is_empty());
}

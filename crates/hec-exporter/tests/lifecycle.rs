mod support;

use std::sync::Arc;
use std::time::Duration;

use hec_exporter::{Batch, ExportError, HecClient, LifecycleState, PushError};
use tokio_util::sync::CancellationToken;

use support::{MockHec, numbered_events};

#[tokio::test]
async fn stop_waits_for_in_flight_push() {
    let hec = MockHec::gated().await;
    let client = Arc::new(HecClient::new(&hec.config()).unwrap());
    client.start();
    assert_eq!(client.state(), LifecycleState::Idle);

    let push = tokio::spawn({
        let client = Arc::clone(&client);
        async move {
            client
                .push_metrics(&CancellationToken::new(), Batch::new(numbered_events(3, 64)))
                .await
        }
    });
    hec.arrived().await;
    assert_eq!(client.state(), LifecycleState::Active);

    let stop = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.stop().await }
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!stop.is_finished(), "stop returned with a push in flight");
    assert_eq!(client.state(), LifecycleState::Draining);

    hec.release(1);
    assert_eq!(push.await.unwrap().unwrap(), 0);
    stop.await.unwrap();
    assert_eq!(client.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn stop_waits_for_every_chunk_of_a_log_push() {
    let hec = MockHec::gated().await;
    let mut config = hec.config();
    config.max_content_length = 250;
    let client = Arc::new(HecClient::new(&config).unwrap());
    let events = numbered_events(4, 100);

    let push = tokio::spawn({
        let client = Arc::clone(&client);
        let events = events.clone();
        async move {
            client
                .push_logs(&CancellationToken::new(), Batch::new(events))
                .await
        }
    });
    hec.arrived().await;

    let stop = tokio::spawn({
        let client = Arc::clone(&client);
        async move { client.stop().await }
    });
    hec.release(1);
    hec.arrived().await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!stop.is_finished(), "stop returned between log chunks");
    assert_eq!(client.state(), LifecycleState::Draining);

    hec.release(1);
    assert_eq!(push.await.unwrap().unwrap(), 0);
    stop.await.unwrap();
    assert_eq!(client.state(), LifecycleState::Stopped);

    let received = hec.received();
    assert_eq!(received.len(), 2);
    assert_eq!(received[1].events(), events[2..]);
}

#[tokio::test]
async fn push_after_stop_is_rejected() {
    let hec = MockHec::start().await;
    let client = HecClient::new(&hec.config()).unwrap();
    client.start();
    client.stop().await;

    let err = client
        .push_logs(
            &CancellationToken::new(),
            Batch::with_pre_dropped(numbered_events(3, 64), 1),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PushError::Permanent {
            dropped: 4,
            source: ExportError::ShuttingDown
        }
    ));

    let err = client
        .push_traces(&CancellationToken::new(), Batch::new(numbered_events(2, 64)))
        .await
        .unwrap_err();
    assert_eq!(err.dropped(), 2);
    assert!(!err.is_retryable());
    assert!(hec.received().is_empty());
}

#[tokio::test]
async fn repeated_stop_returns_immediately() {
    let hec = MockHec::start().await;
    let client = HecClient::new(&hec.config()).unwrap();

    client.stop().await;
    tokio::time::timeout(Duration::from_secs(1), client.stop())
        .await
        .expect("second stop should not block");
    assert_eq!(client.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn stop_without_start_is_clean() {
    let hec = MockHec::start().await;
    let client = HecClient::new(&hec.config()).unwrap();
    assert_eq!(client.state(), LifecycleState::Idle);
    client.stop().await;
    assert_eq!(client.state(), LifecycleState::Stopped);
}

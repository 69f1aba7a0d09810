use super::*;
use futures::StreamExt;

const QUEUE: &str = "notifications";

#[tokio::test]
async fn test_publish_then_consume_drains_backlog() {
    let broker = ChannelBroker::new();
    let channel = broker.open().await.unwrap();
    channel.declare_durable_queue(QUEUE).await.unwrap();

    channel.publish_persistent(QUEUE, b"one".to_vec()).await.unwrap();
    channel.publish_persistent(QUEUE, b"two".to_vec()).await.unwrap();
    assert_eq!(broker.pending(QUEUE), 2);

    let mut deliveries = channel.consume(QUEUE).await.unwrap();
    assert_eq!(deliveries.next().await.unwrap().unwrap(), b"one".to_vec());
    assert_eq!(deliveries.next().await.unwrap().unwrap(), b"two".to_vec());
    assert_eq!(broker.pending(QUEUE), 0);
    assert_eq!(broker.delivered(), 2);
}

#[tokio::test]
async fn test_declare_marks_queue_durable() {
    let broker = ChannelBroker::new();
    let channel = broker.open().await.unwrap();

    channel.declare_durable_queue(QUEUE).await.unwrap();

    assert!(broker.is_durable(QUEUE));
}

#[tokio::test]
async fn test_consume_missing_queue() {
    let broker = ChannelBroker::new();
    let channel = broker.open().await.unwrap();

    let result = channel.consume("nope").await;

    assert!(matches!(result, Err(BusError::QueueMissing(q)) if q == "nope"));
}

#[tokio::test]
async fn test_publish_to_undeclared_queue_is_dropped() {
    let broker = ChannelBroker::new();
    let channel = broker.open().await.unwrap();

    channel.publish_persistent("ghost", b"lost".to_vec()).await.unwrap();

    assert!(!broker.queue_exists("ghost"));
    assert_eq!(broker.delivered(), 0);
}

#[tokio::test]
async fn test_disconnect_signals_consumers_and_keeps_queue() {
    let broker = ChannelBroker::new();
    broker.declare_queue(QUEUE);
    let channel = broker.open().await.unwrap();
    let mut deliveries = channel.consume(QUEUE).await.unwrap();

    broker.disconnect_all();

    let item = deliveries.next().await.unwrap();
    assert!(matches!(item, Err(BusError::BrokerDisconnected(_))));
    assert!(deliveries.next().await.is_none());
    assert_eq!(broker.open_connections(), 0);

    // Old channel is dead; the durable queue still buffers.
    assert!(channel.publish_persistent(QUEUE, b"x".to_vec()).await.is_err());
    broker.inject(QUEUE, b"y".to_vec());
    assert_eq!(broker.pending(QUEUE), 1);
}

#[tokio::test]
async fn test_delete_queue_signals_queue_missing() {
    let broker = ChannelBroker::new();
    broker.declare_queue(QUEUE);
    let channel = broker.open().await.unwrap();
    let mut deliveries = channel.consume(QUEUE).await.unwrap();

    broker.delete_queue(QUEUE);

    let item = deliveries.next().await.unwrap();
    assert!(matches!(item, Err(BusError::QueueMissing(_))));
}

#[tokio::test]
async fn test_failing_connects_then_recovers() {
    let broker = ChannelBroker::new();
    broker.fail_next_connects(1);

    assert!(broker.open().await.is_err());
    assert!(broker.open().await.is_ok());
    assert_eq!(broker.connect_attempts(), 2);
    assert_eq!(broker.open_connections(), 1);
}

#[tokio::test]
async fn test_close_removes_consumers() {
    let broker = ChannelBroker::new();
    broker.declare_queue(QUEUE);
    let channel = broker.open().await.unwrap();
    let _deliveries = channel.consume(QUEUE).await.unwrap();
    assert_eq!(broker.consumer_count(QUEUE), 1);

    channel.close().await.unwrap();

    assert_eq!(broker.consumer_count(QUEUE), 0);
    assert_eq!(broker.open_connections(), 0);
}

#[tokio::test]
async fn test_round_robin_between_consumers() {
    let broker = ChannelBroker::new();
    broker.declare_queue(QUEUE);
    let first = broker.open().await.unwrap();
    let second = broker.open().await.unwrap();
    let mut a = first.consume(QUEUE).await.unwrap();
    let mut b = second.consume(QUEUE).await.unwrap();

    broker.inject(QUEUE, b"1".to_vec());
    broker.inject(QUEUE, b"2".to_vec());

    assert_eq!(a.next().await.unwrap().unwrap(), b"1".to_vec());
    assert_eq!(b.next().await.unwrap().unwrap(), b"2".to_vec());
}

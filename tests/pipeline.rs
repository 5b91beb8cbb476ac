// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

mod common;

use calc_pipeline::{
    channel::AmqpChannel,
    consumer::{Disposition, TaskConsumer},
    errors::{AmqpError, TaskError},
    handler::CalculatorHandler,
    producer::{run_producer, TaskGenerator},
    publisher::{Publisher, RabbitMQPublisher},
    queue::QueueDefinition,
    task::{TaskEnvelope, TaskResult},
    topology::{ensure_topology, TopologyDescriptor, TopologyRole},
};
use common::InMemoryBroker;
use futures_util::stream;
use opentelemetry::Context;
use std::{convert::Infallible, sync::Arc, time::Duration};
use tokio::sync::watch;

fn descriptor() -> TopologyDescriptor {
    TopologyDescriptor::new("calc_exchange", "calc_queue", "calc_dlq_exchange", "calc_dlq")
}

async fn pipeline() -> (Arc<InMemoryBroker>, Arc<RabbitMQPublisher>, TaskConsumer) {
    let broker = InMemoryBroker::new();
    let topology = descriptor();

    ensure_topology(broker.clone(), &topology, TopologyRole::Producer)
        .await
        .unwrap();
    ensure_topology(broker.clone(), &topology, TopologyRole::Consumer)
        .await
        .unwrap();

    let publisher = RabbitMQPublisher::new(broker.clone(), &topology.exchange);
    let consumer = TaskConsumer::new(Arc::new(CalculatorHandler), Duration::from_secs(1));

    (broker, publisher, consumer)
}

async fn publish_and_consume(task: TaskEnvelope) -> (Arc<InMemoryBroker>, Disposition) {
    let (broker, publisher, consumer) = pipeline().await;
    publisher.publish(&Context::current(), &task).await.unwrap();
    assert_eq!(broker.queue_len("calc_queue"), 1);

    let mut deliveries = broker.deliver_all("calc_queue");
    assert_eq!(deliveries.len(), 1);
    let disposition = consumer.handle(deliveries.remove(0)).await.unwrap();

    (broker, disposition)
}

#[tokio::test]
async fn addition_is_acknowledged_with_its_result() {
    let (broker, disposition) =
        publish_and_consume(TaskEnvelope::new("abc12345", "add", 5, 3)).await;

    assert_eq!(disposition, Disposition::Acknowledged(TaskResult::Integer(8)));
    assert_eq!(broker.acked(), vec![1]);
    assert!(broker.rejected().is_empty());
    assert_eq!(broker.queue_len("calc_queue"), 0);
    assert_eq!(broker.queue_len("calc_dlq"), 0);
}

#[tokio::test]
async fn division_by_zero_lands_in_the_dlq() {
    let (broker, disposition) = publish_and_consume(TaskEnvelope::new("x", "div", 10, 0)).await;

    assert_eq!(disposition, Disposition::Rejected(TaskError::DivisionByZero));
    assert!(broker.acked().is_empty());
    assert_eq!(broker.queue_len("calc_queue"), 0);

    let quarantined = broker.peek("calc_dlq");
    assert_eq!(quarantined.len(), 1);
    assert_eq!(quarantined[0].routing_key, "dlq");
    assert_eq!(
        TaskEnvelope::decode(&quarantined[0].body).unwrap(),
        TaskEnvelope::new("x", "div", 10, 0)
    );
}

#[tokio::test]
async fn unknown_operation_lands_in_the_dlq() {
    let (broker, disposition) = publish_and_consume(TaskEnvelope::new("y", "unknown", 1, 1)).await;

    assert_eq!(
        disposition,
        Disposition::Rejected(TaskError::UnsupportedOperation("unknown".to_owned()))
    );
    assert_eq!(broker.queue_len("calc_queue"), 0);
    assert_eq!(broker.queue_len("calc_dlq"), 1);
}

#[tokio::test]
async fn malformed_body_lands_in_the_dlq() {
    let (broker, _, consumer) = pipeline().await;
    broker
        .publish("calc_exchange", "add", b"{not json", Default::default())
        .await
        .unwrap();

    let deliveries = broker.deliver_all("calc_queue");
    let (_tx, rx) = watch::channel(false);
    let report = consumer
        .run(stream::iter(deliveries.into_iter().map(Ok::<_, Infallible>)), rx)
        .await;

    assert_eq!(report.rejected, 1);
    assert_eq!(broker.peek("calc_dlq")[0].body, b"{not json".to_vec());
}

#[tokio::test]
async fn unbound_routing_key_never_reaches_the_queue() {
    let (broker, publisher, _) = pipeline().await;

    publisher
        .publish(&Context::current(), &TaskEnvelope::new("n", "pow", 2, 8))
        .await
        .unwrap();

    assert_eq!(broker.queue_len("calc_queue"), 0);
    assert_eq!(broker.queue_len("calc_dlq"), 0);
}

#[tokio::test]
async fn topology_declaration_is_idempotent() {
    let broker = InMemoryBroker::new();

    for _ in 0..2 {
        ensure_topology(broker.clone(), &descriptor(), TopologyRole::Producer)
            .await
            .unwrap();
    }

    assert_eq!(broker.exchange_count(), 2);
    assert_eq!(broker.queue_count(), 2);
    // dlq binding plus one per routing key
    assert_eq!(broker.binding_count(), 6);
}

#[tokio::test]
async fn conflicting_declaration_is_fatal() {
    let broker = InMemoryBroker::new();
    broker
        .declare_queue(&QueueDefinition::new("calc_queue").durable())
        .await
        .unwrap();

    let err = ensure_topology(broker.clone(), &descriptor(), TopologyRole::Consumer)
        .await
        .unwrap_err();

    assert_eq!(err, AmqpError::DeclareQueueError("calc_queue".to_owned()));
}

#[tokio::test]
async fn generated_workload_is_split_between_results_and_dlq() {
    let (broker, publisher, consumer) = pipeline().await;
    let mut generator = TaskGenerator::seeded(42);
    let (tx, rx) = watch::channel(false);

    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
    });
    let published = run_producer(publisher.as_ref(), &mut generator, Duration::from_millis(1), rx)
        .await
        .unwrap();
    stopper.await.unwrap();

    let deliveries = broker.deliver_all("calc_queue");
    assert_eq!(deliveries.len() as u64, published);

    let (_tx, rx) = watch::channel(false);
    let report = consumer
        .run(stream::iter(deliveries.into_iter().map(Ok::<_, Infallible>)), rx)
        .await;

    assert_eq!(report.acknowledged + report.rejected, published);
    assert_eq!(broker.queue_len("calc_dlq") as u64, report.rejected);
    assert_eq!(broker.queue_len("calc_queue"), 0);
}

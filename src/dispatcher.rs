// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Task Dispatcher
//!
//! This module attaches a [`TaskConsumer`] to the main queue. It limits the channel
//! to a single unacknowledged delivery, so the broker never hands this process a
//! second task before the first one is settled, and competing consumer processes
//! share the queue fairly.

use crate::{
    channel::ConsumerChannel,
    consumer::{ConsumeReport, TaskConsumer},
    errors::AmqpError,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use uuid::Uuid;

/// Maximum number of unacknowledged deliveries per consumer
pub const PREFETCH_COUNT: u16 = 1;

pub struct RabbitMQDispatcher {
    channel: Arc<dyn ConsumerChannel>,
    queue: String,
    consumer: TaskConsumer,
}

impl RabbitMQDispatcher {
    /// Creates a new RabbitMQ dispatcher.
    ///
    /// # Parameters
    /// * `channel` - A channel to the RabbitMQ server
    /// * `queue` - The main queue to consume from
    /// * `consumer` - Decision logic applied to every delivery
    ///
    /// # Returns
    /// A new RabbitMQDispatcher instance
    pub fn new(channel: Arc<dyn ConsumerChannel>, queue: &str, consumer: TaskConsumer) -> Self {
        RabbitMQDispatcher {
            channel,
            queue: queue.to_owned(),
            consumer,
        }
    }

    /// Consumes the main queue until `shutdown` flips.
    ///
    /// # Returns
    /// The loop counters on a requested shutdown, or AmqpError when the consumer
    /// cannot be set up or the broker ends the delivery stream
    pub async fn consume_blocking(
        &self,
        shutdown: watch::Receiver<bool>,
    ) -> Result<ConsumeReport, AmqpError> {
        self.channel.qos(PREFETCH_COUNT).await?;

        let consumer_tag = format!("calc-consumer-{}", Uuid::new_v4());
        let deliveries = self.channel.consume(&self.queue, &consumer_tag).await?;

        info!(queue = %self.queue, consumer_tag, prefetch = PREFETCH_COUNT, "consumer registered");

        let report = self.consumer.run(deliveries, shutdown).await;
        if !report.interrupted {
            error!(queue = %self.queue, "delivery stream ended");
            return Err(AmqpError::ConsumerClosedError(self.queue.clone()));
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{channel::MockConsumerChannel, handler::CalculatorHandler};
    use futures_util::{stream, StreamExt};
    use mockall::predicate::eq;
    use std::time::Duration;

    fn dispatcher(channel: MockConsumerChannel) -> RabbitMQDispatcher {
        let consumer = TaskConsumer::new(Arc::new(CalculatorHandler), Duration::from_secs(1));
        RabbitMQDispatcher::new(Arc::new(channel), "calc_queue", consumer)
    }

    #[tokio::test]
    async fn requests_a_prefetch_of_one_before_consuming() {
        let mut seq = mockall::Sequence::new();
        let mut channel = MockConsumerChannel::new();
        channel
            .expect_qos()
            .with(eq(1u16))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        channel
            .expect_consume()
            .withf(|queue, tag| queue == "calc_queue" && tag.starts_with("calc-consumer-"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(stream::pending().boxed()));

        let (_tx, rx) = watch::channel(true);
        let report = dispatcher(channel).consume_blocking(rx).await.unwrap();

        assert!(report.interrupted);
        assert_eq!(report.acknowledged + report.rejected, 0);
    }

    #[tokio::test]
    async fn qos_failure_is_fatal() {
        let mut channel = MockConsumerChannel::new();
        channel
            .expect_qos()
            .returning(|_| Err(AmqpError::QoSDeclarationError("closed".to_owned())));
        channel.expect_consume().never();

        let (_tx, rx) = watch::channel(false);
        let err = dispatcher(channel).consume_blocking(rx).await.unwrap_err();

        assert_eq!(err, AmqpError::QoSDeclarationError("closed".to_owned()));
    }

    #[tokio::test]
    async fn consume_failure_is_fatal() {
        let mut channel = MockConsumerChannel::new();
        channel.expect_qos().returning(|_| Ok(()));
        channel
            .expect_consume()
            .withf(|queue, _| queue == "calc_queue")
            .returning(|queue, _| Err(AmqpError::ConsumerDeclarationError(queue.to_owned())));

        let (_tx, rx) = watch::channel(false);
        let err = dispatcher(channel).consume_blocking(rx).await.unwrap_err();

        assert_eq!(err, AmqpError::ConsumerDeclarationError("calc_queue".to_owned()));
    }

    #[tokio::test]
    async fn stream_ending_without_shutdown_is_an_error() {
        let mut channel = MockConsumerChannel::new();
        channel.expect_qos().returning(|_| Ok(()));
        channel
            .expect_consume()
            .returning(|_, _| Ok(stream::empty().boxed()));

        let (_tx, rx) = watch::channel(false);
        let err = dispatcher(channel).consume_blocking(rx).await.unwrap_err();

        assert_eq!(err, AmqpError::ConsumerClosedError("calc_queue".to_owned()));
    }
}

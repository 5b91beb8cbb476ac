// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Task Publisher
//!
//! This module publishes task envelopes to the main exchange. The routing key is
//! the operation of the task, verbatim: the publisher does not validate it, so
//! unsupported operations still reach the consumer and get quarantined there.
//! Messages are persistent and carry the OpenTelemetry context of the caller.

use crate::{channel::AmqpChannel, errors::AmqpError, otel, task::TaskEnvelope};
use async_trait::async_trait;
use lapin::{types::ShortString, BasicProperties};
use opentelemetry::Context;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

/// Default content type for JSON messages
pub const JSON_CONTENT_TYPE: &str = "application/json";
/// AMQP delivery mode of messages that survive a broker restart
pub const PERSISTENT_DELIVERY_MODE: u8 = 2;

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Sends one task. Fire-and-forget: no broker confirmation is awaited.
    async fn publish(&self, ctx: &Context, task: &TaskEnvelope) -> Result<(), AmqpError>;
}

/// RabbitMQ implementation of the Publisher trait.
pub struct RabbitMQPublisher {
    channel: Arc<dyn AmqpChannel>,
    exchange: String,
}

impl RabbitMQPublisher {
    /// Creates a new RabbitMQ publisher.
    ///
    /// # Parameters
    /// * `channel` - A channel to the RabbitMQ server
    /// * `exchange` - The main exchange tasks are published to
    ///
    /// # Returns
    /// An Arc-wrapped RabbitMQPublisher instance for thread-safe sharing
    pub fn new(channel: Arc<dyn AmqpChannel>, exchange: &str) -> Arc<RabbitMQPublisher> {
        Arc::new(RabbitMQPublisher {
            channel,
            exchange: exchange.to_owned(),
        })
    }
}

/// Message properties of a published task.
pub(crate) fn task_properties(ctx: &Context) -> BasicProperties {
    BasicProperties::default()
        .with_content_type(ShortString::from(JSON_CONTENT_TYPE))
        .with_delivery_mode(PERSISTENT_DELIVERY_MODE)
        .with_message_id(ShortString::from(Uuid::new_v4().to_string()))
        .with_headers(otel::inject_headers(ctx))
}

#[async_trait]
impl Publisher for RabbitMQPublisher {
    /// Publishes a task to the main exchange, routed by its operation.
    ///
    /// # Parameters
    /// * `ctx` - OpenTelemetry context for tracing
    /// * `task` - The task envelope to send
    ///
    /// # Returns
    /// Ok(()) on success or AmqpError on failure
    async fn publish(&self, ctx: &Context, task: &TaskEnvelope) -> Result<(), AmqpError> {
        let payload = task.encode().map_err(|err| {
            error!(error = err.to_string(), id = %task.id, "error serializing task");
            AmqpError::SerializePayloadError
        })?;

        self.channel
            .publish(
                &self.exchange,
                &task.operation,
                &payload,
                task_properties(ctx),
            )
            .await?;

        debug!(id = %task.id, routing_key = %task.operation, "task published");
        Ok(())
    }
}

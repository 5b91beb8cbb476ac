// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Channel Management
//!
//! This module handles the creation and management of AMQP connections and channels.
//! It also defines [`AmqpChannel`], the narrow set of channel operations the topology
//! manager and the publisher rely on, and [`ConsumerChannel`], the two operations the
//! dispatcher needs to receive deliveries.

use crate::{
    configs::Configs, errors::AmqpError, exchange::ExchangeDefinition,
    queue::{QueueBinding, QueueDefinition},
};
use async_trait::async_trait;
use futures_util::{stream::BoxStream, StreamExt};
use lapin::{
    message::Delivery,
    options::{
        BasicConsumeOptions, BasicPublishOptions, BasicQosOptions, ExchangeDeclareOptions,
        QueueBindOptions, QueueDeclareOptions,
    },
    types::{FieldTable, LongString},
    BasicProperties, Channel, Connection, ConnectionProperties,
};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Channel operations used to declare the topology and publish tasks.
///
/// Declarations must be idempotent: redeclaring an entity with identical parameters
/// succeeds, redeclaring it with different parameters fails.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AmqpChannel: Send + Sync {
    /// Declares an exchange.
    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError>;

    /// Declares a queue together with its arguments.
    async fn declare_queue(&self, def: &QueueDefinition) -> Result<(), AmqpError>;

    /// Binds a queue to an exchange under a routing key.
    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), AmqpError>;

    /// Publishes one message. No publisher confirm is awaited.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        properties: BasicProperties,
    ) -> Result<(), AmqpError>;
}

/// Deliveries of a registered consumer, in broker order.
pub type DeliveryStream = BoxStream<'static, Result<Delivery, lapin::Error>>;

/// Channel operations used to receive tasks.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConsumerChannel: Send + Sync {
    /// Caps the unacknowledged deliveries of this channel's consumers.
    async fn qos(&self, prefetch_count: u16) -> Result<(), AmqpError>;

    /// Registers a manually acknowledged consumer on `queue`.
    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream, AmqpError>;
}

#[async_trait]
impl AmqpChannel for Channel {
    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError> {
        debug!("creating exchange: {}", def.name);

        match self
            .exchange_declare(
                &def.name,
                lapin::ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    passive: false,
                    durable: def.durable,
                    auto_delete: false,
                    internal: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    name = %def.name,
                    "error to declare the exchange"
                );
                Err(AmqpError::DeclareExchangeError(def.name.clone()))
            }
            _ => {
                debug!("exchange: {} was created", def.name);
                Ok(())
            }
        }
    }

    async fn declare_queue(&self, def: &QueueDefinition) -> Result<(), AmqpError> {
        debug!("creating queue: {}", def.name);

        match self
            .queue_declare(
                &def.name,
                QueueDeclareOptions {
                    passive: false,
                    durable: def.durable,
                    exclusive: false,
                    auto_delete: false,
                    nowait: false,
                },
                def.arguments(),
            )
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    name = %def.name,
                    "error to declare the queue"
                );
                Err(AmqpError::DeclareQueueError(def.name.clone()))
            }
            _ => {
                debug!("queue: {} was created", def.name);
                Ok(())
            }
        }
    }

    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), AmqpError> {
        debug!(
            "binding queue: {} to the exchange: {} with the key: {}",
            binding.queue_name, binding.exchange_name, binding.routing_key
        );

        match self
            .queue_bind(
                &binding.queue_name,
                &binding.exchange_name,
                &binding.routing_key,
                QueueBindOptions { nowait: false },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error to bind queue to exchange");
                Err(AmqpError::BindingExchangeToQueueError(
                    binding.exchange_name.clone(),
                    binding.queue_name.clone(),
                ))
            }
            _ => Ok(()),
        }
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        properties: BasicProperties,
    ) -> Result<(), AmqpError> {
        match self
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions {
                    immediate: false,
                    mandatory: false,
                },
                payload,
                properties,
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error publishing message");
                Err(AmqpError::PublishingError)
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ConsumerChannel for Channel {
    async fn qos(&self, prefetch_count: u16) -> Result<(), AmqpError> {
        match self
            .basic_qos(prefetch_count, BasicQosOptions { global: false })
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error to configure qos");
                Err(AmqpError::QoSDeclarationError(err.to_string()))
            }
            _ => Ok(()),
        }
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<DeliveryStream, AmqpError> {
        match self
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions {
                    no_local: false,
                    no_ack: false,
                    exclusive: false,
                    nowait: false,
                },
                FieldTable::default(),
            )
            .await
        {
            Err(err) => {
                error!(error = err.to_string(), "error to create the consumer");
                Err(AmqpError::ConsumerDeclarationError(queue.to_owned()))
            }
            Ok(consumer) => Ok(consumer.boxed()),
        }
    }
}

/// Creates a new AMQP channel for communication with RabbitMQ.
///
/// This function establishes a connection to RabbitMQ using the broker settings in
/// `cfg`, then creates a channel on that connection. Both the connection and channel
/// are wrapped in Arc for sharing between the topology manager, the publisher and
/// the dispatcher.
///
/// # Parameters
/// * `cfg` - Configuration containing RabbitMQ connection details
///
/// # Returns
/// * `Result<(Arc<Connection>, Arc<Channel>), AmqpError>` -
///   A tuple containing the connection and channel on success, or an error on failure.
pub async fn new_amqp_channel(cfg: &Configs) -> Result<(Arc<Connection>, Arc<Channel>), AmqpError> {
    info!(endpoint = cfg.rabbitmq.endpoint(), "connecting to rabbitmq");
    let options = ConnectionProperties::default()
        .with_connection_name(LongString::from(cfg.app.name.clone()));

    let conn = match Connection::connect(&cfg.rabbitmq.uri(), options).await {
        Ok(c) => Ok(c),
        Err(err) => {
            error!(error = err.to_string(), "failure to connect");
            Err(AmqpError::ConnectionError)
        }
    }?;
    debug!("amqp connected");

    debug!("creating amqp channel...");
    match conn.create_channel().await {
        Ok(c) => {
            debug!("channel created");
            Ok((Arc::new(conn), Arc::new(c)))
        }
        Err(err) => {
            error!(error = err.to_string(), "error to create the channel");
            Err(AmqpError::ChannelError)
        }
    }
}

/// Closes the connection unless the broker or a failure already closed it.
pub async fn close_connection(conn: &Connection) -> Result<(), AmqpError> {
    if !conn.status().connected() {
        debug!("connection already closed");
        return Ok(());
    }

    match conn.close(200, "bye").await {
        Err(err) => {
            error!(error = err.to_string(), "error closing the connection");
            Err(AmqpError::CloseConnectionError)
        }
        _ => {
            info!("connection closed");
            Ok(())
        }
    }
}

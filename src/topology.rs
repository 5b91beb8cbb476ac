// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Topology Management
//!
//! This module declares the exchange/queue/binding graph of the task pipeline
//! before any traffic flows. Producer and consumer both declare it; declaration is
//! idempotent, and a conflicting redeclaration is a fatal startup error.
//!
//! The graph for a [`TopologyDescriptor`] is, in declaration order:
//! 1. the main exchange (durable, direct)
//! 2. the dead-letter exchange (durable, direct)
//! 3. the dead-letter queue (durable), bound to the dead-letter exchange under `dlq`
//! 4. the main queue (durable), dead-lettering to the dead-letter exchange under `dlq`
//! 5. producer only: one binding of the main queue per routing key

use crate::{
    channel::AmqpChannel,
    errors::AmqpError,
    exchange::ExchangeDefinition,
    queue::{QueueBinding, QueueDefinition},
    task::{Operation, UNSUPPORTED_OPERATION},
};
use std::sync::Arc;
use tracing::{debug, info};

/// Routing key under which the dead-letter queue is bound and messages are dead-lettered
pub const DEAD_LETTER_ROUTING_KEY: &str = "dlq";

/// Names of the entities making up the pipeline topology.
///
/// Built once at startup from the configuration and never changed afterwards.
/// Producer and consumer deployments must agree on every name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyDescriptor {
    pub exchange: String,
    pub queue: String,
    pub dead_letter_exchange: String,
    pub dead_letter_queue: String,
    /// One key per registered operation, plus the unsupported one
    pub routing_keys: Vec<String>,
}

impl TopologyDescriptor {
    pub fn new(
        exchange: &str,
        queue: &str,
        dead_letter_exchange: &str,
        dead_letter_queue: &str,
    ) -> TopologyDescriptor {
        let routing_keys = Operation::ALL
            .iter()
            .map(|op| op.as_str())
            .chain([UNSUPPORTED_OPERATION])
            .map(str::to_owned)
            .collect();

        TopologyDescriptor {
            exchange: exchange.to_owned(),
            queue: queue.to_owned(),
            dead_letter_exchange: dead_letter_exchange.to_owned(),
            dead_letter_queue: dead_letter_queue.to_owned(),
            routing_keys,
        }
    }
}

/// Which side of the pipeline is declaring the topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopologyRole {
    /// Declares the full graph, including the routing-key bindings of the main queue
    Producer,
    /// Declares exchanges and queues but leaves routing to the producer
    Consumer,
}

#[derive(Debug, Clone)]
enum Declaration {
    Exchange(ExchangeDefinition),
    Queue(QueueDefinition),
    Binding(QueueBinding),
}

/// Ordered list of declarations to run against a channel.
///
/// Unlike a plain "exchanges, then queues, then bindings" installer, declarations
/// run exactly in the order they were added, so a queue can be declared and bound
/// before a queue that refers to it.
pub struct AmqpTopology {
    channel: Arc<dyn AmqpChannel>,
    declarations: Vec<Declaration>,
}

impl AmqpTopology {
    /// Creates an empty topology bound to a channel.
    pub fn new(channel: Arc<dyn AmqpChannel>) -> AmqpTopology {
        AmqpTopology {
            channel,
            declarations: vec![],
        }
    }

    /// Builds the pipeline topology for the given role.
    ///
    /// # Parameters
    /// * `channel` - Channel the declarations run on
    /// * `descriptor` - Names of the exchanges and queues
    /// * `role` - Producer or consumer
    ///
    /// # Returns
    /// A topology ready to be installed
    pub fn pipeline(
        channel: Arc<dyn AmqpChannel>,
        descriptor: &TopologyDescriptor,
        role: TopologyRole,
    ) -> AmqpTopology {
        let mut topology = AmqpTopology::new(channel)
            .exchange(ExchangeDefinition::new(&descriptor.exchange).durable())
            .exchange(ExchangeDefinition::new(&descriptor.dead_letter_exchange).durable())
            .queue(QueueDefinition::new(&descriptor.dead_letter_queue).durable())
            .queue_binding(
                QueueBinding::new(&descriptor.dead_letter_queue)
                    .exchange(&descriptor.dead_letter_exchange)
                    .routing_key(DEAD_LETTER_ROUTING_KEY),
            )
            .queue(
                QueueDefinition::new(&descriptor.queue)
                    .durable()
                    .with_dead_letter(&descriptor.dead_letter_exchange, DEAD_LETTER_ROUTING_KEY),
            );

        if role == TopologyRole::Producer {
            for key in &descriptor.routing_keys {
                topology = topology.queue_binding(
                    QueueBinding::new(&descriptor.queue)
                        .exchange(&descriptor.exchange)
                        .routing_key(key),
                );
            }
        }

        topology
    }

    /// Adds an exchange definition to the topology.
    pub fn exchange(mut self, def: ExchangeDefinition) -> Self {
        self.declarations.push(Declaration::Exchange(def));
        self
    }

    /// Adds a queue definition to the topology.
    pub fn queue(mut self, def: QueueDefinition) -> Self {
        self.declarations.push(Declaration::Queue(def));
        self
    }

    /// Adds a queue-to-exchange binding to the topology.
    pub fn queue_binding(mut self, binding: QueueBinding) -> Self {
        self.declarations.push(Declaration::Binding(binding));
        self
    }

    /// Installs the topology to the RabbitMQ server.
    ///
    /// Stops at the first failing declaration; nothing after it is attempted.
    ///
    /// # Returns
    /// Ok(()) on success or AmqpError on failure
    pub async fn install(&self) -> Result<(), AmqpError> {
        for declaration in &self.declarations {
            match declaration {
                Declaration::Exchange(def) => self.channel.declare_exchange(def).await?,
                Declaration::Queue(def) => self.channel.declare_queue(def).await?,
                Declaration::Binding(binding) => self.channel.bind_queue(binding).await?,
            }
        }

        debug!(declarations = self.declarations.len(), "topology installed");
        Ok(())
    }
}

/// Declares the pipeline topology, idempotently.
///
/// Must complete before anything is published or consumed. An error means the
/// broker already holds an entity with different parameters (or is unreachable),
/// and the process must not go on.
pub async fn ensure_topology(
    channel: Arc<dyn AmqpChannel>,
    descriptor: &TopologyDescriptor,
    role: TopologyRole,
) -> Result<(), AmqpError> {
    AmqpTopology::pipeline(channel, descriptor, role)
        .install()
        .await?;

    info!(
        exchange = %descriptor.exchange,
        queue = %descriptor.queue,
        dlq = %descriptor.dead_letter_queue,
        role = ?role,
        "topology ready"
    );
    Ok(())
}

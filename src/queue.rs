// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Definitions and Bindings
//!
//! This module provides the builders for the queues of the task pipeline and for
//! the bindings that tie them to exchanges. A queue may carry a dead-letter
//! target: when a delivery is rejected without requeue, or expires, the broker
//! republishes it to that exchange under that routing key.

use lapin::types::{AMQPValue, FieldTable, LongString, ShortString};
use std::collections::BTreeMap;

/// Queue argument naming the dead-letter exchange
pub const AMQP_HEADERS_DEAD_LETTER_EXCHANGE: &str = "x-dead-letter-exchange";
/// Queue argument naming the routing key used when dead-lettering
pub const AMQP_HEADERS_DEAD_LETTER_ROUTING_KEY: &str = "x-dead-letter-routing-key";

/// Where the broker republishes messages rejected from a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub exchange: String,
    pub routing_key: String,
}

/// Definition of a RabbitMQ queue with its configuration parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueDefinition {
    pub(crate) name: String,
    pub(crate) durable: bool,
    pub(crate) dead_letter: Option<DeadLetter>,
}

impl QueueDefinition {
    /// Creates a new queue definition with the given name.
    ///
    /// By default, the queue is transient and has no dead-letter target.
    ///
    /// # Parameters
    /// * `name` - The name of the queue
    ///
    /// # Returns
    /// A new queue definition with default settings
    pub fn new(name: &str) -> QueueDefinition {
        QueueDefinition {
            name: name.to_owned(),
            durable: false,
            dead_letter: None,
        }
    }

    /// Makes the queue durable, persisting across broker restarts.
    ///
    /// Durable queues will survive broker restart, preserving persistent messages.
    ///
    /// # Returns
    /// Self for method chaining
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    /// Routes rejected and expired messages to `exchange` under `routing_key`.
    ///
    /// # Parameters
    /// * `exchange` - The dead-letter exchange
    /// * `routing_key` - The routing key used when republishing
    ///
    /// # Returns
    /// Self for method chaining
    pub fn with_dead_letter(mut self, exchange: &str, routing_key: &str) -> Self {
        self.dead_letter = Some(DeadLetter {
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }

    pub fn dead_letter(&self) -> Option<&DeadLetter> {
        self.dead_letter.as_ref()
    }

    /// The `x-` arguments sent along with the queue declaration.
    pub fn arguments(&self) -> FieldTable {
        let mut args = BTreeMap::new();

        if let Some(dead_letter) = &self.dead_letter {
            args.insert(
                ShortString::from(AMQP_HEADERS_DEAD_LETTER_EXCHANGE),
                AMQPValue::LongString(LongString::from(dead_letter.exchange.clone())),
            );
            args.insert(
                ShortString::from(AMQP_HEADERS_DEAD_LETTER_ROUTING_KEY),
                AMQPValue::LongString(LongString::from(dead_letter.routing_key.clone())),
            );
        }

        FieldTable::from(args)
    }
}

/// Configuration for binding a queue to an exchange.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueueBinding {
    pub(crate) queue_name: String,
    pub(crate) exchange_name: String,
    pub(crate) routing_key: String,
}

impl QueueBinding {
    /// Creates a new queue binding for the given queue.
    ///
    /// The exchange name and routing key start empty and are set with the
    /// `exchange` and `routing_key` methods.
    pub fn new(queue: &str) -> QueueBinding {
        QueueBinding {
            queue_name: queue.to_owned(),
            exchange_name: String::new(),
            routing_key: String::new(),
        }
    }

    pub fn exchange(mut self, exchange: &str) -> Self {
        self.exchange_name = exchange.to_owned();
        self
    }

    pub fn routing_key(mut self, key: &str) -> Self {
        self.routing_key = key.to_owned();
        self
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn exchange_name(&self) -> &str {
        &self.exchange_name
    }

    pub fn key(&self) -> &str {
        &self.routing_key
    }
}

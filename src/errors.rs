// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Error Types for the Task Pipeline
//!
//! Two families of errors live here. `AmqpError` covers everything that can go
//! wrong while talking to the broker: connecting, declaring the topology,
//! publishing and settling deliveries. Declaration errors are fatal at startup.
//!
//! `TaskError` covers the failures of a single delivered task. None of them is
//! fatal to the consumer: every `TaskError` sends the delivery to the
//! dead-letter queue.

use std::time::Duration;
use thiserror::Error;

/// Represents errors that can occur during AMQP/RabbitMQ operations.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum AmqpError {
    /// Error establishing a connection to the RabbitMQ server
    #[error("failure to connect")]
    ConnectionError,

    /// Error creating a channel from an established connection
    #[error("failure to create a channel")]
    ChannelError,

    /// Error declaring an exchange with the given name
    #[error("failure to declare an exchange `{0}`")]
    DeclareExchangeError(String),

    /// Error declaring a queue with the given name
    #[error("failure to declare a queue `{0}`")]
    DeclareQueueError(String),

    /// Error binding a queue to an exchange
    #[error("failure to binding exchange `{0}` to queue `{1}`")]
    BindingExchangeToQueueError(String, String),

    /// Error configuring Quality of Service parameters
    #[error("failure to configure qos `{0}`")]
    QoSDeclarationError(String),

    /// Error registering a consumer on a queue
    #[error("failure to declare consumer on queue `{0}`")]
    ConsumerDeclarationError(String),

    /// The delivery stream of a consumer ended without a shutdown request
    #[error("consumer on queue `{0}` stopped unexpectedly")]
    ConsumerClosedError(String),

    /// Error publishing a message
    #[error("failure to publish")]
    PublishingError,

    /// Error serializing a task envelope before publishing
    #[error("failure to serialize payload")]
    SerializePayloadError,

    /// Error acknowledging a message
    #[error("failure to ack message")]
    AckMessageError,

    /// Error rejecting a message
    #[error("failure to reject message")]
    RejectMessageError,

    /// Error closing the broker connection
    #[error("failure to close the connection")]
    CloseConnectionError,
}

/// Failure of a single task. Every variant quarantines the delivery.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// The body is not a well-formed task envelope
    #[error("failure to decode task: {0}")]
    DecodeError(String),

    /// The operation is not part of the registered operation set
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("division by zero")]
    DivisionByZero,

    /// The result does not fit into a 64-bit signed integer
    #[error("integer overflow in {operation}({a}, {b})")]
    Overflow {
        operation: &'static str,
        a: i64,
        b: i64,
    },

    /// The handler did not finish within the execution timeout
    #[error("task execution exceeded {0:?}")]
    Timeout(Duration),
}

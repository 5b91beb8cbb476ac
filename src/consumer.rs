// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Task Consumer
//!
//! This module holds the acknowledge/reject decision logic of the pipeline. For
//! every delivery it:
//! 1. Decodes the body into a task envelope
//! 2. Resolves the operation against the registered set
//! 3. Executes the task under the execution timeout
//! 4. Acknowledges the delivery on success
//! 5. Rejects it without requeue on any failure, so that the broker dead-letters it
//!
//! There is no retry stage: the first failure quarantines the message in the DLQ.
//! Deliveries are handled strictly one after the other.

use crate::{
    errors::{AmqpError, TaskError},
    handler::TaskHandler,
    otel,
    task::{Task, TaskEnvelope, TaskResult},
};
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use lapin::{
    message::Delivery,
    options::{BasicAckOptions, BasicRejectOptions},
    types::FieldTable,
};
use opentelemetry::{
    global,
    trace::{Span, Status},
};
use std::{fmt::Display, sync::Arc, time::Duration};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// A delivered message that must be settled exactly once.
///
/// Settling consumes the handle, so a delivery can never be both acknowledged and
/// rejected, nor settled twice.
#[async_trait]
pub trait Settlement: Send {
    fn body(&self) -> &[u8];

    fn routing_key(&self) -> &str;

    fn headers(&self) -> Option<&FieldTable>;

    fn delivery_tag(&self) -> u64;

    /// Removes the message from the queue for good.
    async fn acknowledge(self) -> Result<(), AmqpError>;

    /// Rejects the message without requeue, which dead-letters it.
    async fn reject_no_requeue(self) -> Result<(), AmqpError>;
}

#[async_trait]
impl Settlement for Delivery {
    fn body(&self) -> &[u8] {
        &self.data
    }

    fn routing_key(&self) -> &str {
        self.routing_key.as_str()
    }

    fn headers(&self) -> Option<&FieldTable> {
        self.properties.headers().as_ref()
    }

    fn delivery_tag(&self) -> u64 {
        self.delivery_tag
    }

    async fn acknowledge(self) -> Result<(), AmqpError> {
        self.acker
            .ack(BasicAckOptions { multiple: false })
            .await
            .map(|_| ())
            .map_err(|err| {
                error!(error = err.to_string(), "error whiling ack msg");
                AmqpError::AckMessageError
            })
    }

    async fn reject_no_requeue(self) -> Result<(), AmqpError> {
        self.acker
            .reject(BasicRejectOptions { requeue: false })
            .await
            .map(|_| ())
            .map_err(|err| {
                error!(error = err.to_string(), "error whiling reject msg");
                AmqpError::RejectMessageError
            })
    }
}

/// Final state of a delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// Executed and acknowledged
    Acknowledged(TaskResult),
    /// Rejected without requeue, on its way to the DLQ
    Rejected(TaskError),
}

/// Counters of a receive loop run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumeReport {
    pub acknowledged: u64,
    pub rejected: u64,
    /// Deliveries whose ack or reject call failed
    pub settlement_errors: u64,
    /// Errors yielded by the delivery stream itself
    pub transport_errors: u64,
    /// The loop ended because shutdown was requested
    pub interrupted: bool,
}

/// Executes deliveries one at a time and settles each of them.
#[derive(Clone)]
pub struct TaskConsumer {
    handler: Arc<dyn TaskHandler>,
    execution_timeout: Duration,
}

impl TaskConsumer {
    /// Creates a new consumer.
    ///
    /// # Parameters
    /// * `handler` - Executes validated tasks
    /// * `execution_timeout` - Upper bound on one execution; exceeding it is a task failure
    pub fn new(handler: Arc<dyn TaskHandler>, execution_timeout: Duration) -> Self {
        TaskConsumer {
            handler,
            execution_timeout,
        }
    }

    /// Processes and settles one delivery.
    ///
    /// Task failures never surface as `Err`: they are reported as
    /// [`Disposition::Rejected`]. `Err` means the broker refused the settlement.
    pub async fn handle<D: Settlement>(&self, delivery: D) -> Result<Disposition, AmqpError> {
        let tracer = global::tracer("amqp consumer");
        let (_ctx, mut span) = otel::new_span(delivery.headers(), &tracer, delivery.routing_key());
        let tag = delivery.delivery_tag();

        let outcome = self.execute(delivery.body()).await;

        match outcome {
            Ok((task, result)) => {
                if let Err(err) = delivery.acknowledge().await {
                    span.record_error(&err);
                    span.set_status(Status::error("error to ack msg"));
                    return Err(err);
                }

                info!(
                    id = %task.id,
                    operation = %task.operation,
                    a = task.operand_a,
                    b = task.operand_b,
                    result = %result,
                    "task processed"
                );
                span.set_status(Status::Ok);
                Ok(Disposition::Acknowledged(result))
            }
            Err(task_err) => {
                error!(
                    delivery_tag = tag,
                    body = %String::from_utf8_lossy(delivery.body()),
                    error = %task_err,
                    "task failed, sending to dlq"
                );
                span.record_error(&task_err);
                span.set_status(Status::error(task_err.to_string()));

                if let Err(err) = delivery.reject_no_requeue().await {
                    span.record_error(&err);
                    return Err(err);
                }

                Ok(Disposition::Rejected(task_err))
            }
        }
    }

    async fn execute(&self, body: &[u8]) -> Result<(Task, TaskResult), TaskError> {
        let task = TaskEnvelope::decode(body)?.validate()?;

        let result = match tokio::time::timeout(self.execution_timeout, self.handler.exec(&task)).await
        {
            Ok(result) => result?,
            Err(_) => return Err(TaskError::Timeout(self.execution_timeout)),
        };

        Ok((task, result))
    }

    /// Runs the receive loop over a stream of deliveries.
    ///
    /// The next delivery is only pulled once the previous one is settled. The loop
    /// ends when the stream ends or when `shutdown` flips; a delivery being
    /// processed is always settled first.
    pub async fn run<S, D, E>(&self, deliveries: S, mut shutdown: watch::Receiver<bool>) -> ConsumeReport
    where
        S: Stream<Item = Result<D, E>>,
        D: Settlement,
        E: Display,
    {
        let mut deliveries = std::pin::pin!(deliveries);
        let mut report = ConsumeReport::default();

        info!("waiting for messages...");
        loop {
            if *shutdown.borrow() {
                report.interrupted = true;
                break;
            }

            let next = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        report.interrupted = true;
                        break;
                    }
                    continue;
                }
                next = deliveries.next() => next,
            };

            let Some(next) = next else {
                warn!("delivery stream closed");
                break;
            };

            match next {
                Ok(delivery) => match self.handle(delivery).await {
                    Ok(Disposition::Acknowledged(_)) => report.acknowledged += 1,
                    Ok(Disposition::Rejected(_)) => report.rejected += 1,
                    Err(err) => {
                        error!(error = err.to_string(), "error consume msg");
                        report.settlement_errors += 1;
                    }
                },
                Err(err) => {
                    error!(error = %err, "errors consume msg");
                    report.transport_errors += 1;
                }
            }
        }

        info!(
            acknowledged = report.acknowledged,
            rejected = report.rejected,
            "receive loop stopped"
        );
        report
    }
}

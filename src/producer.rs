// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Synthetic Workload Generator
//!
//! Builds random tasks (including ones with an unsupported operation, to exercise
//! the quarantine path) and publishes them at a fixed interval until shutdown.

use crate::{
    errors::AmqpError,
    publisher::Publisher,
    task::{Operation, TaskEnvelope, UNSUPPORTED_OPERATION},
};
use opentelemetry::Context;
use rand::{rngs::StdRng, seq::IndexedRandom, Rng, SeedableRng};
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

const ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
/// Length of generated task ids
pub const TASK_ID_LENGTH: usize = 8;

/// Returns a random lowercase alphanumeric string of the given length.
pub fn random_id(length: usize) -> String {
    random_id_with(&mut rand::rng(), length)
}

fn random_id_with<R: Rng>(rng: &mut R, length: usize) -> String {
    (0..length)
        .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

/// Source of synthetic tasks.
pub struct TaskGenerator {
    rng: StdRng,
    operations: Vec<&'static str>,
}

impl TaskGenerator {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_os_rng())
    }

    /// Deterministic generator, for reproducible workloads.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        let operations = Operation::ALL
            .iter()
            .map(|op| op.as_str())
            .chain([UNSUPPORTED_OPERATION])
            .collect();

        TaskGenerator { rng, operations }
    }

    /// Builds the next task: any operation of the registered set or the
    /// unsupported one, `a` in `[1, 10]`, `b` in `[0, 10]`.
    pub fn next_task(&mut self) -> TaskEnvelope {
        let operation = self
            .operations
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(UNSUPPORTED_OPERATION);
        let id = random_id_with(&mut self.rng, TASK_ID_LENGTH);

        TaskEnvelope::new(
            &id,
            operation,
            self.rng.random_range(1..=10),
            self.rng.random_range(0..=10),
        )
    }
}

impl Default for TaskGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Publishes a generated task every `interval` until `shutdown` flips.
///
/// A publish failure ends the loop with that error. The returned count is the
/// number of tasks handed to the broker.
pub async fn run_producer(
    publisher: &dyn Publisher,
    generator: &mut TaskGenerator,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<u64, AmqpError> {
    let mut published = 0u64;

    while !*shutdown.borrow() {
        let task = generator.next_task();
        publisher.publish(&Context::current(), &task).await?;
        published += 1;

        info!(
            id = %task.id,
            operation = %task.operation,
            a = task.operand_a,
            b = task.operand_b,
            "sent task"
        );

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = shutdown.changed() => {
                // sender gone: nobody is left to ask for a shutdown, stop now
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    info!(published, "producer stopped");
    Ok(published)
}

// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Task Envelope and Operation Set
//!
//! This module defines the unit of work exchanged between producer and consumer.
//! On the wire a task is a JSON object with exactly the fields
//! `{"id": string, "operation": string, "a": integer, "b": integer}`.
//!
//! The producer never validates the operation, so the envelope keeps it as a raw
//! string. The consumer turns an envelope into a [`Task`], whose operation is a
//! closed [`Operation`] enum; any string outside the registered set fails that
//! conversion with [`TaskError::UnsupportedOperation`].

use crate::errors::TaskError;
use serde::{Deserialize, Deserializer, Serialize};
use std::{fmt, str::FromStr};

/// Routing key used by the workload generator for tasks no handler supports.
pub const UNSUPPORTED_OPERATION: &str = "unknown";

/// Task envelope as it travels through the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskEnvelope {
    pub id: String,
    pub operation: String,
    #[serde(rename = "a", deserialize_with = "deserialize_operand")]
    pub operand_a: i64,
    #[serde(rename = "b", deserialize_with = "deserialize_operand")]
    pub operand_b: i64,
}

impl TaskEnvelope {
    pub fn new(id: &str, operation: &str, operand_a: i64, operand_b: i64) -> Self {
        TaskEnvelope {
            id: id.to_owned(),
            operation: operation.to_owned(),
            operand_a,
            operand_b,
        }
    }

    /// Serializes the envelope into its UTF-8 JSON wire form.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Parses a raw delivery body.
    ///
    /// Malformed JSON, missing fields, extra fields and operands that are not
    /// integers all yield [`TaskError::DecodeError`].
    pub fn decode(body: &[u8]) -> Result<Self, TaskError> {
        serde_json::from_slice(body).map_err(|err| TaskError::DecodeError(err.to_string()))
    }

    /// Resolves the operation tag against the registered operation set.
    pub fn validate(self) -> Result<Task, TaskError> {
        let operation = self.operation.parse::<Operation>()?;

        Ok(Task {
            id: self.id,
            operation,
            operand_a: self.operand_a,
            operand_b: self.operand_b,
        })
    }
}

/// Operands are integers on the wire. Integer strings such as `"7"` are coerced,
/// and so are JSON numbers with a fraction, truncated toward zero (`5.0` is `5`,
/// `-2.7` is `-2`).
fn deserialize_operand<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Operand {
        Integer(i64),
        Float(f64),
        Text(String),
    }

    match Operand::deserialize(deserializer)? {
        Operand::Integer(value) => Ok(value),
        Operand::Float(value) => {
            let truncated = value.trunc();
            // i64::MAX is not representable, its f64 neighbour is 2^63
            if truncated.is_finite()
                && truncated >= i64::MIN as f64
                && truncated < i64::MAX as f64
            {
                Ok(truncated as i64)
            } else {
                Err(serde::de::Error::custom(format!(
                    "operand `{value}` is out of the integer range"
                )))
            }
        }
        Operand::Text(text) => text.trim().parse::<i64>().map_err(|_| {
            serde::de::Error::custom(format!("operand `{text}` is not an integer"))
        }),
    }
}

/// The registered operation set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Add,
    Sub,
    Mul,
    Div,
}

impl Operation {
    pub const ALL: [Operation; 4] = [
        Operation::Add,
        Operation::Sub,
        Operation::Mul,
        Operation::Div,
    ];

    /// The wire name of the operation, which is also its routing key.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Add => "add",
            Operation::Sub => "sub",
            Operation::Mul => "mul",
            Operation::Div => "div",
        }
    }

    /// Applies the operation to two operands.
    ///
    /// Integer operations are checked, so an overflowing result is reported as
    /// [`TaskError::Overflow`] rather than wrapping. Division produces a real
    /// quotient and fails with [`TaskError::DivisionByZero`] when `b` is zero.
    pub fn apply(&self, a: i64, b: i64) -> Result<TaskResult, TaskError> {
        let overflow = || TaskError::Overflow {
            operation: self.as_str(),
            a,
            b,
        };

        match self {
            Operation::Add => a.checked_add(b).map(TaskResult::Integer).ok_or_else(overflow),
            Operation::Sub => a.checked_sub(b).map(TaskResult::Integer).ok_or_else(overflow),
            Operation::Mul => a.checked_mul(b).map(TaskResult::Integer).ok_or_else(overflow),
            Operation::Div => {
                if b == 0 {
                    return Err(TaskError::DivisionByZero);
                }
                Ok(TaskResult::Real(a as f64 / b as f64))
            }
        }
    }
}

impl FromStr for Operation {
    type Err = TaskError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|op| op.as_str() == value)
            .ok_or_else(|| TaskError::UnsupportedOperation(value.to_owned()))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task whose operation belongs to the registered set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub id: String,
    pub operation: Operation,
    pub operand_a: i64,
    pub operand_b: i64,
}

/// Outcome of a successfully executed task.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TaskResult {
    Integer(i64),
    Real(f64),
}

impl fmt::Display for TaskResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskResult::Integer(value) => write!(f, "{value}"),
            // keep the fractional part visible for whole quotients: `5.0`
            TaskResult::Real(value) if value.fract() == 0.0 && value.is_finite() => {
                write!(f, "{value:.1}")
            }
            TaskResult::Real(value) => write!(f, "{value}"),
        }
    }
}

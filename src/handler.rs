// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Task Handlers
//!
//! A handler executes one validated task. The consumer owns exactly one handler
//! and runs it under its execution timeout.

use crate::{
    errors::TaskError,
    task::{Task, TaskResult},
};
use async_trait::async_trait;

#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn exec(&self, task: &Task) -> Result<TaskResult, TaskError>;
}

/// Applies the arithmetic operation named by the task to its operands.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalculatorHandler;

#[async_trait]
impl TaskHandler for CalculatorHandler {
    async fn exec(&self, task: &Task) -> Result<TaskResult, TaskError> {
        task.operation.apply(task.operand_a, task.operand_b)
    }
}

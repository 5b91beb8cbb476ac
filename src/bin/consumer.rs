// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Task consumer: declares the topology, then executes tasks from the main queue
//! one at a time until interrupted. Failed tasks end up in the DLQ.

use anyhow::Context as _;
use calc_pipeline::{
    channel::{close_connection, new_amqp_channel},
    configs::Configs,
    consumer::TaskConsumer,
    dispatcher::RabbitMQDispatcher,
    handler::CalculatorHandler,
    logging::init_tracing,
    shutdown::{shutdown_signal, wait_for_shutdown_signal},
    topology::{ensure_topology, TopologyRole},
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cfg = Configs::from_env("consumer").context("invalid configuration")?;
    init_tracing(&cfg.app.name);

    let (conn, channel) = new_amqp_channel(&cfg)
        .await
        .context("failed to open the broker channel")?;

    ensure_topology(channel.clone(), &cfg.topology, TopologyRole::Consumer)
        .await
        .context("failed to declare the topology")?;

    let (shutdown_tx, shutdown_rx) = shutdown_signal();
    tokio::spawn(wait_for_shutdown_signal(shutdown_tx));

    let consumer = TaskConsumer::new(Arc::new(CalculatorHandler), cfg.consumer.execution_timeout);
    let dispatcher = RabbitMQDispatcher::new(channel, &cfg.topology.queue, consumer);

    let result = dispatcher.consume_blocking(shutdown_rx).await;

    info!("stopping consumer");
    close_connection(&conn).await?;

    let report = result.context("consumer stopped")?;
    info!(
        acknowledged = report.acknowledged,
        rejected = report.rejected,
        "consumer exited"
    );
    Ok(())
}

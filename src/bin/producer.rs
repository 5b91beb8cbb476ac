// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! Synthetic task producer: declares the topology, then publishes a random task
//! at a fixed interval until interrupted.

use anyhow::Context as _;
use calc_pipeline::{
    channel::{close_connection, new_amqp_channel},
    configs::Configs,
    logging::init_tracing,
    producer::{run_producer, TaskGenerator},
    publisher::RabbitMQPublisher,
    shutdown::{shutdown_signal, wait_for_shutdown_signal},
    topology::{ensure_topology, TopologyRole},
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cfg = Configs::from_env("producer").context("invalid configuration")?;
    init_tracing(&cfg.app.name);

    let (conn, channel) = new_amqp_channel(&cfg)
        .await
        .context("failed to open the broker channel")?;

    ensure_topology(channel.clone(), &cfg.topology, TopologyRole::Producer)
        .await
        .context("failed to declare the topology")?;

    let (shutdown_tx, shutdown_rx) = shutdown_signal();
    tokio::spawn(wait_for_shutdown_signal(shutdown_tx));

    let publisher = RabbitMQPublisher::new(channel, &cfg.topology.exchange);
    let mut generator = TaskGenerator::new();

    let result = run_producer(
        publisher.as_ref(),
        &mut generator,
        cfg.producer.publish_interval,
        shutdown_rx,
    )
    .await;

    info!("stopping producer");
    close_connection(&conn).await?;

    let published = result.context("publishing failed")?;
    info!(published, "producer exited");
    Ok(())
}

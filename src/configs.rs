// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Process Configuration
//!
//! All settings are read from the environment once, at process start, into a
//! [`Configs`] value that is then passed by reference to the topology manager,
//! the publisher and the consumer. Nothing in the core looks at the environment
//! on its own.

use crate::topology::TopologyDescriptor;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::{env, str::FromStr, time::Duration};
use thiserror::Error;

/// Everything but the RFC 3986 unreserved characters is escaped in URI components.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("failed to parse environment variable '{key}': {details}")]
    ParseError { key: String, details: String },
}

/// Application identity, used as the AMQP connection name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfigs {
    pub name: String,
}

/// Broker connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RabbitMQConfigs {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
    pub heartbeat: u16,
}

impl RabbitMQConfigs {
    /// Renders the AMQP URI used to open the connection.
    ///
    /// Credentials and vhost are percent-encoded, so reserved characters such as
    /// `@`, `/` or `:` in a password stay part of the password.
    pub fn uri(&self) -> String {
        format!(
            "amqp://{}:{}@{}:{}/{}?heartbeat={}",
            utf8_percent_encode(&self.user, URI_COMPONENT),
            utf8_percent_encode(&self.password, URI_COMPONENT),
            self.host,
            self.port,
            utf8_percent_encode(&self.vhost, URI_COMPONENT),
            self.heartbeat
        )
    }

    /// Host and port only, safe to log.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerConfigs {
    /// Upper bound on the execution of a single task
    pub execution_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProducerConfigs {
    /// Pause between two generated tasks
    pub publish_interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configs {
    pub app: AppConfigs,
    pub rabbitmq: RabbitMQConfigs,
    pub topology: TopologyDescriptor,
    pub consumer: ConsumerConfigs,
    pub producer: ProducerConfigs,
}

impl Configs {
    /// Loads the configuration from the environment.
    ///
    /// # Parameters
    /// * `app_name` - Connection name used when `APP_NAME` is not set
    ///
    /// # Returns
    /// The configuration, or `ConfigError` when a numeric variable cannot be parsed
    pub fn from_env(app_name: &str) -> Result<Configs, ConfigError> {
        Ok(Configs {
            app: AppConfigs {
                name: env_or_default("APP_NAME", app_name),
            },
            rabbitmq: RabbitMQConfigs {
                host: env_or_default("RABBITMQ_HOST", "localhost"),
                port: env_parse_or_default("RABBITMQ_PORT", 5672)?,
                user: env_or_default("RABBITMQ_USER", "user"),
                password: env_or_default("RABBITMQ_PASSWORD", "password"),
                vhost: env_or_default("RABBITMQ_VHOST", "/"),
                heartbeat: env_parse_or_default("RABBITMQ_HEARTBEAT_SECS", 30)?,
            },
            topology: TopologyDescriptor::new(
                &env_or_default("EXCHANGE_NAME", "calc_exchange"),
                &env_or_default("MAIN_QUEUE_NAME", "calc_queue"),
                &env_or_default("DLX_NAME", "calc_dlq_exchange"),
                &env_or_default("DLQ_NAME", "calc_dlq"),
            ),
            consumer: ConsumerConfigs {
                execution_timeout: Duration::from_millis(env_parse_or_default(
                    "TASK_TIMEOUT_MS",
                    5000,
                )?),
            },
            producer: ProducerConfigs {
                publish_interval: Duration::from_millis(env_parse_or_default(
                    "PUBLISH_INTERVAL_MS",
                    2000,
                )?),
            },
        })
    }
}

/// Helper to load an environment variable with a default value
pub fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Helper to load and parse an environment variable with a default value
pub fn env_parse_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|err| ConfigError::ParseError {
            key: key.to_string(),
            details: err.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! In-memory broker honouring the topology contract: idempotent declarations,
//! conflicting redeclarations refused, direct routing, and dead-lettering of
//! deliveries rejected without requeue.

#![allow(dead_code)]

use async_trait::async_trait;
use calc_pipeline::{
    channel::AmqpChannel,
    consumer::Settlement,
    errors::AmqpError,
    exchange::ExchangeDefinition,
    queue::{QueueBinding, QueueDefinition},
};
use lapin::{types::FieldTable, BasicProperties};
use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex},
};

#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub routing_key: String,
    pub body: Vec<u8>,
    pub properties: BasicProperties,
}

#[derive(Default)]
struct BrokerState {
    exchanges: HashMap<String, ExchangeDefinition>,
    queues: HashMap<String, (QueueDefinition, VecDeque<StoredMessage>)>,
    bindings: HashSet<QueueBinding>,
    next_tag: u64,
    acked: Vec<u64>,
    rejected: Vec<u64>,
}

#[derive(Default)]
pub struct InMemoryBroker {
    state: Mutex<BrokerState>,
}

impl InMemoryBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn exchange_count(&self) -> usize {
        self.state.lock().unwrap().exchanges.len()
    }

    pub fn queue_count(&self) -> usize {
        self.state.lock().unwrap().queues.len()
    }

    pub fn binding_count(&self) -> usize {
        self.state.lock().unwrap().bindings.len()
    }

    pub fn queue_len(&self, queue: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .queues
            .get(queue)
            .map(|(_, messages)| messages.len())
            .unwrap_or(0)
    }

    pub fn peek(&self, queue: &str) -> Vec<StoredMessage> {
        self.state
            .lock()
            .unwrap()
            .queues
            .get(queue)
            .map(|(_, messages)| messages.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn acked(&self) -> Vec<u64> {
        self.state.lock().unwrap().acked.clone()
    }

    pub fn rejected(&self) -> Vec<u64> {
        self.state.lock().unwrap().rejected.clone()
    }

    /// Hands out every message currently in `queue`, each with a fresh tag.
    pub fn deliver_all(self: &Arc<Self>, queue: &str) -> Vec<FakeDelivery> {
        let mut state = self.state.lock().unwrap();
        let messages: Vec<StoredMessage> = match state.queues.get_mut(queue) {
            Some((_, messages)) => messages.drain(..).collect(),
            None => vec![],
        };

        messages
            .into_iter()
            .map(|message| {
                state.next_tag += 1;
                FakeDelivery {
                    broker: self.clone(),
                    queue: queue.to_owned(),
                    tag: state.next_tag,
                    message,
                }
            })
            .collect()
    }

    fn route(state: &mut BrokerState, exchange: &str, routing_key: &str, message: StoredMessage) {
        let targets: Vec<String> = state
            .bindings
            .iter()
            .filter(|b| b.exchange_name() == exchange && b.key() == routing_key)
            .map(|b| b.queue_name().to_owned())
            .collect();

        for target in targets {
            if let Some((_, messages)) = state.queues.get_mut(&target) {
                messages.push_back(message.clone());
            }
        }
    }
}

#[async_trait]
impl AmqpChannel for InMemoryBroker {
    async fn declare_exchange(&self, def: &ExchangeDefinition) -> Result<(), AmqpError> {
        let mut state = self.state.lock().unwrap();
        match state.exchanges.get(def.name()) {
            Some(existing) if existing != def => {
                Err(AmqpError::DeclareExchangeError(def.name().to_owned()))
            }
            Some(_) => Ok(()),
            None => {
                state.exchanges.insert(def.name().to_owned(), def.clone());
                Ok(())
            }
        }
    }

    async fn declare_queue(&self, def: &QueueDefinition) -> Result<(), AmqpError> {
        let mut state = self.state.lock().unwrap();
        match state.queues.get(def.name()) {
            Some((existing, _)) if existing != def => {
                Err(AmqpError::DeclareQueueError(def.name().to_owned()))
            }
            Some(_) => Ok(()),
            None => {
                state
                    .queues
                    .insert(def.name().to_owned(), (def.clone(), VecDeque::new()));
                Ok(())
            }
        }
    }

    async fn bind_queue(&self, binding: &QueueBinding) -> Result<(), AmqpError> {
        let mut state = self.state.lock().unwrap();
        if !state.exchanges.contains_key(binding.exchange_name())
            || !state.queues.contains_key(binding.queue_name())
        {
            return Err(AmqpError::BindingExchangeToQueueError(
                binding.exchange_name().to_owned(),
                binding.queue_name().to_owned(),
            ));
        }

        state.bindings.insert(binding.clone());
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
        properties: BasicProperties,
    ) -> Result<(), AmqpError> {
        let mut state = self.state.lock().unwrap();
        if !state.exchanges.contains_key(exchange) {
            return Err(AmqpError::PublishingError);
        }

        let message = StoredMessage {
            routing_key: routing_key.to_owned(),
            body: payload.to_vec(),
            properties,
        };
        Self::route(&mut state, exchange, routing_key, message);
        Ok(())
    }
}

pub struct FakeDelivery {
    broker: Arc<InMemoryBroker>,
    queue: String,
    tag: u64,
    message: StoredMessage,
}

#[async_trait]
impl Settlement for FakeDelivery {
    fn body(&self) -> &[u8] {
        &self.message.body
    }

    fn routing_key(&self) -> &str {
        &self.message.routing_key
    }

    fn headers(&self) -> Option<&FieldTable> {
        self.message.properties.headers().as_ref()
    }

    fn delivery_tag(&self) -> u64 {
        self.tag
    }

    async fn acknowledge(self) -> Result<(), AmqpError> {
        self.broker.state.lock().unwrap().acked.push(self.tag);
        Ok(())
    }

    async fn reject_no_requeue(self) -> Result<(), AmqpError> {
        let mut state = self.broker.state.lock().unwrap();
        state.rejected.push(self.tag);

        let dead_letter = state
            .queues
            .get(&self.queue)
            .and_then(|(def, _)| def.dead_letter().cloned());

        if let Some(dead_letter) = dead_letter {
            let message = StoredMessage {
                routing_key: dead_letter.routing_key.clone(),
                ..self.message
            };
            InMemoryBroker::route(&mut state, &dead_letter.exchange, &dead_letter.routing_key, message);
        }

        Ok(())
    }
}

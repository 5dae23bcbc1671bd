//! Worker command loop
//!
//! Drains the worker's subscription and applies each command, answering the
//! publisher when it asked for an acknowledgement. Application latency stays
//! on this task instead of the orchestrator's call path.

use crate::common::Result;
use crate::services::{MessageBus, Subscription, Topic};
use crate::worker::Worker;
use std::sync::Arc;
use tokio::task::JoinHandle;

pub struct WorkerRunner {
    worker: Arc<Worker>,
    subscription: Subscription,
}

impl WorkerRunner {
    /// Subscribe `worker` to `topic` on the bus
    pub async fn attach(worker: Arc<Worker>, bus: &dyn MessageBus, topic: Topic) -> Result<Self> {
        let subscription = bus.subscribe(&topic).await?;
        Ok(Self {
            worker,
            subscription,
        })
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        let topic = self.subscription.topic().clone();
        tracing::debug!("Worker {} listening on {}", self.worker.id(), topic);

        while let Some(envelope) = self.subscription.recv().await {
            let command_name = envelope.command.name();
            let target = match envelope.command.content_id() {
                Some(content_id) => content_id.short().to_string(),
                None => "snapshot".to_string(),
            };
            let result = self.worker.handle(envelope.command).await;
            if let Err(e) = &result {
                tracing::warn!(
                    "Worker {} failed {} of {}: {}",
                    self.worker.id(),
                    command_name,
                    target,
                    e
                );
            } else if envelope.reply.is_none() {
                tracing::debug!(
                    "Worker {} applied {} of {}",
                    self.worker.id(),
                    command_name,
                    target
                );
            }
            if let Some(reply) = envelope.reply {
                // the publisher may have timed out already
                let _ = reply.send(result);
            }
        }

        tracing::debug!("Worker {} stopped listening on {}", self.worker.id(), topic);
    }
}

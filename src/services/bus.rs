//! In-process message bus
//!
//! One bounded tokio channel per topic. `request` attaches a oneshot reply
//! to the envelope and waits for the worker runner to answer.

use crate::common::{Error, Result};
use crate::services::{MessageBus, Topic};
use crate::worker::{CommandAck, Envelope, WorkerCommand};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};

/// Receiving end of a topic
#[derive(Debug)]
pub struct Subscription {
    topic: Topic,
    rx: mpsc::Receiver<Envelope>,
}

impl Subscription {
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Next envelope; `None` once the topic is unsubscribed
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }
}

pub struct LocalBus {
    channels: RwLock<HashMap<Topic, mpsc::Sender<Envelope>>>,
    capacity: usize,
}

impl LocalBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    pub async fn topics(&self) -> Vec<Topic> {
        let mut topics: Vec<_> = self.channels.read().await.keys().cloned().collect();
        topics.sort();
        topics
    }

    async fn sender(&self, topic: &Topic) -> Result<mpsc::Sender<Envelope>> {
        self.channels
            .read()
            .await
            .get(topic)
            .cloned()
            .ok_or_else(|| Error::WorkerUnavailable(format!("no subscriber on {}", topic)))
    }

    async fn deliver(&self, topic: &Topic, envelope: Envelope) -> Result<()> {
        let sender = self.sender(topic).await?;
        sender
            .send(envelope)
            .await
            .map_err(|_| Error::WorkerUnavailable(format!("channel {} closed", topic)))
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl MessageBus for LocalBus {
    async fn subscribe(&self, topic: &Topic) -> Result<Subscription> {
        let mut channels = self.channels.write().await;
        if let Some(existing) = channels.get(topic) {
            if !existing.is_closed() {
                return Err(Error::DuplicateRegistration(format!("topic {}", topic)));
            }
        }
        let (tx, rx) = mpsc::channel(self.capacity);
        channels.insert(topic.clone(), tx);
        tracing::debug!("Subscribed to {}", topic);
        Ok(Subscription {
            topic: topic.clone(),
            rx,
        })
    }

    async fn unsubscribe(&self, topic: &Topic) -> Result<()> {
        self.channels.write().await.remove(topic);
        Ok(())
    }

    async fn publish(&self, topic: &Topic, command: WorkerCommand) -> Result<()> {
        self.deliver(topic, Envelope::fire_and_forget(command)).await
    }

    async fn request(&self, topic: &Topic, command: WorkerCommand) -> Result<CommandAck> {
        let (envelope, reply) = Envelope::with_reply(command);
        self.deliver(topic, envelope).await?;
        reply
            .await
            .map_err(|_| Error::WorkerUnavailable(format!("{} dropped the request", topic)))?
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ContentId;

    fn delete(id: &str) -> WorkerCommand {
        WorkerCommand::Delete {
            content_id: ContentId::from(id),
        }
    }

    #[tokio::test]
    async fn test_request_reply() {
        let bus = LocalBus::new(8);
        let topic = Topic::new("primary", "w1");
        let mut sub = bus.subscribe(&topic).await.unwrap();

        let responder = tokio::spawn(async move {
            let envelope = sub.recv().await.unwrap();
            assert_eq!(envelope.command.name(), "delete");
            envelope
                .reply
                .unwrap()
                .send(Ok(CommandAck::Deleted { was_present: true }))
                .unwrap();
        });

        let ack = bus.request(&topic, delete("x")).await.unwrap();
        assert_eq!(ack, CommandAck::Deleted { was_present: true });
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_without_subscriber() {
        let bus = LocalBus::new(8);
        let result = bus.publish(&Topic::new("primary", "ghost"), delete("x")).await;
        assert!(matches!(result, Err(Error::WorkerUnavailable(_))));
    }

    #[tokio::test]
    async fn test_duplicate_subscription() {
        let bus = LocalBus::new(8);
        let topic = Topic::new("replica", "w1");
        let sub = bus.subscribe(&topic).await.unwrap();
        assert!(matches!(
            bus.subscribe(&topic).await,
            Err(Error::DuplicateRegistration(_))
        ));

        // a dropped subscriber frees the topic
        drop(sub);
        assert!(bus.subscribe(&topic).await.is_ok());
    }

    #[tokio::test]
    async fn test_dropped_reply_is_unavailable() {
        let bus = LocalBus::new(8);
        let topic = Topic::new("primary", "w1");
        let mut sub = bus.subscribe(&topic).await.unwrap();
        tokio::spawn(async move {
            let envelope = sub.recv().await.unwrap();
            drop(envelope);
        });
        assert!(matches!(
            bus.request(&topic, delete("x")).await,
            Err(Error::WorkerUnavailable(_))
        ));
    }
}

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use guardiao_shared::clients::rabbitmq::RabbitMQClient;
use guardiao_shared::types::event::{payloads, routing_keys, Event};

const SOURCE: &str = "guardiao-voting";

/// Domain events emitted after a transaction commits.
#[derive(Debug, Clone)]
pub enum ModerationEvent {
    ReportFiled(payloads::ReportFiled),
    SessionStarted(payloads::SessionStarted),
    SessionCancelled(payloads::SessionCancelled),
    VoteCast(payloads::VoteCast),
    ReportCompleted(payloads::ReportCompleted),
}

impl ModerationEvent {
    pub fn routing_key(&self) -> &'static str {
        match self {
            ModerationEvent::ReportFiled(_) => routing_keys::MODERATION_REPORT_FILED,
            ModerationEvent::SessionStarted(_) => routing_keys::MODERATION_SESSION_STARTED,
            ModerationEvent::SessionCancelled(_) => routing_keys::MODERATION_SESSION_CANCELLED,
            ModerationEvent::VoteCast(_) => routing_keys::MODERATION_VOTE_CAST,
            ModerationEvent::ReportCompleted(_) => routing_keys::MODERATION_REPORT_COMPLETED,
        }
    }

    /// Every event is correlated with the report it concerns.
    pub fn report_id(&self) -> Uuid {
        match self {
            ModerationEvent::ReportFiled(p) => p.report_id,
            ModerationEvent::SessionStarted(p) => p.report_id,
            ModerationEvent::SessionCancelled(p) => p.report_id,
            ModerationEvent::VoteCast(p) => p.report_id,
            ModerationEvent::ReportCompleted(p) => p.report_id,
        }
    }
}

/// Best-effort event publication; implementations log failures and move on.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: ModerationEvent);
}

async fn publish<T: Serialize + Send + Sync>(
    rabbitmq: &RabbitMQClient,
    routing_key: &'static str,
    report_id: Uuid,
    data: T,
) {
    let event = Event::new(SOURCE, routing_key, data).with_correlation(report_id);

    if let Err(e) = rabbitmq.publish(routing_key, &event).await {
        tracing::error!(error = %e, routing_key, "failed to publish event");
    }
}

#[async_trait]
impl EventSink for RabbitMQClient {
    async fn emit(&self, event: ModerationEvent) {
        let key = event.routing_key();
        let report_id = event.report_id();
        match event {
            ModerationEvent::ReportFiled(p) => publish(self, key, report_id, p).await,
            ModerationEvent::SessionStarted(p) => publish(self, key, report_id, p).await,
            ModerationEvent::SessionCancelled(p) => publish(self, key, report_id, p).await,
            ModerationEvent::VoteCast(p) => publish(self, key, report_id, p).await,
            ModerationEvent::ReportCompleted(p) => publish(self, key, report_id, p).await,
        }
    }
}

/// Drops events; used when no broker is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventSink;

#[async_trait]
impl EventSink for NullEventSink {
    async fn emit(&self, event: ModerationEvent) {
        tracing::debug!(routing_key = event.routing_key(), "event discarded, no broker");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_keys_follow_the_moderation_namespace() {
        let event = ModerationEvent::VoteCast(payloads::VoteCast {
            report_id: Uuid::nil(),
            session_id: Uuid::nil(),
            category: "grave".into(),
            total_votes: 1,
        });
        assert_eq!(event.routing_key(), "guardiao.moderation.vote.cast");
        assert_eq!(event.report_id(), Uuid::nil());
    }
}

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use guardiao_voting::clock::ManualClock;
use guardiao_voting::dispatch::{
    DispatchError, EnforcementGateway, EnforcementOrder, NotificationGateway, PunishmentDispatcher,
};
use guardiao_voting::events::{EventSink, ModerationEvent};
use guardiao_voting::services::moderation_service::NewReport;
use guardiao_voting::services::ModerationService;
use guardiao_voting::status::GuardianStatus;
use guardiao_voting::store::MemoryReviewStore;
use guardiao_voting::voting::PanelSettings;

#[derive(Default)]
pub struct RecordingBot {
    pub orders: Mutex<Vec<EnforcementOrder>>,
    pub pings: Mutex<Vec<(Uuid, Vec<i64>)>>,
    pub direct: Mutex<Vec<(i64, String)>>,
}

#[async_trait]
impl EnforcementGateway for RecordingBot {
    async fn enforce(&self, order: &EnforcementOrder) -> Result<(), DispatchError> {
        self.orders.lock().unwrap().push(order.clone());
        Ok(())
    }
}

#[async_trait]
impl NotificationGateway for RecordingBot {
    async fn notify_guardians(&self, report_id: Uuid, ids: &[i64]) -> Result<(), DispatchError> {
        self.pings.lock().unwrap().push((report_id, ids.to_vec()));
        Ok(())
    }

    async fn notify_user(&self, id: i64, title: &str, _: &str) -> Result<(), DispatchError> {
        self.direct.lock().unwrap().push((id, title.to_string()));
        Ok(())
    }
}

/// A bot that never answers.
pub struct StalledBot;

#[async_trait]
impl EnforcementGateway for StalledBot {
    async fn enforce(&self, _: &EnforcementOrder) -> Result<(), DispatchError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}

#[async_trait]
impl NotificationGateway for StalledBot {
    async fn notify_guardians(&self, _: Uuid, _: &[i64]) -> Result<(), DispatchError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }

    async fn notify_user(&self, _: i64, _: &str, _: &str) -> Result<(), DispatchError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingEvents {
    pub keys: Mutex<Vec<&'static str>>,
}

#[async_trait]
impl EventSink for RecordingEvents {
    async fn emit(&self, event: ModerationEvent) {
        self.keys.lock().unwrap().push(event.routing_key());
    }
}

pub struct Harness {
    pub service: ModerationService<MemoryReviewStore>,
    pub clock: Arc<ManualClock>,
    pub bot: Arc<RecordingBot>,
    pub events: Arc<RecordingEvents>,
}

pub fn harness() -> Harness {
    let bot = Arc::new(RecordingBot::default());
    let dispatcher = PunishmentDispatcher::new(bot.clone(), bot.clone(), Duration::from_secs(1));
    build(bot, dispatcher)
}

/// Service wired to a bot that hangs on every call.
pub fn stalled_harness(bot_timeout: Duration) -> Harness {
    let stalled = Arc::new(StalledBot);
    let dispatcher = PunishmentDispatcher::new(stalled.clone(), stalled, bot_timeout);
    build(Arc::new(RecordingBot::default()), dispatcher)
}

fn build(bot: Arc<RecordingBot>, dispatcher: PunishmentDispatcher) -> Harness {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let events = Arc::new(RecordingEvents::default());

    let service = ModerationService::new(
        Arc::new(MemoryReviewStore::new()),
        clock.clone(),
        dispatcher,
        events.clone(),
        PanelSettings::default(),
        4,
    );

    Harness {
        service,
        clock,
        bot,
        events,
    }
}

impl Harness {
    /// Registers `n` reviewers and marks them online.
    pub async fn guardians(&self, n: i64) -> Vec<Uuid> {
        let mut ids = Vec::new();
        for discord_id in 1..=n {
            let g = self
                .service
                .register_guardian(1000 + discord_id, format!("g{discord_id}"), format!("G{discord_id}"))
                .await
                .unwrap();
            self.service
                .set_guardian_status(g.id, GuardianStatus::Online)
                .await
                .unwrap();
            ids.push(g.id);
        }
        ids
    }

    pub async fn report(&self) -> Uuid {
        self.service
            .file_report(NewReport {
                guild_id: 10,
                channel_id: 20,
                reported_user_id: 300,
                reporter_user_id: 400,
                reason: "xingamentos repetidos no canal geral".into(),
                transcript: Vec::new(),
            })
            .await
            .unwrap()
            .id
    }

    /// Lets scheduled bot calls finish before asserting on them.
    pub async fn settled(&self) {
        self.service.drain_dispatches().await;
    }

    pub fn event_count(&self, key: &str) -> usize {
        self.events.keys.lock().unwrap().iter().filter(|k| **k == key).count()
    }
}

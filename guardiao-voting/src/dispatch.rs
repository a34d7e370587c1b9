//! Punishment dispatch and notification fan-out.
//!
//! Runs strictly after the vote transaction has committed, on a background
//! task so the caller's request never waits for the bot. Every outbound call
//! is bounded by a timeout, and a failure is logged and counted but never
//! surfaces to the voter or undoes the completed report.

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::status::Punishment;
use crate::voting::tally::LevelUp;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("bot call timed out after {0:?}")]
    Timeout(Duration),

    #[error("bot unreachable: {0}")]
    Transport(String),

    #[error("bot rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// What the bot needs to act on a resolved report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnforcementOrder {
    pub report_id: Uuid,
    pub punishment: Punishment,
    #[serde(rename = "user_id")]
    pub target_user_id: i64,
    pub guild_id: i64,
}

#[async_trait]
pub trait EnforcementGateway: Send + Sync {
    async fn enforce(&self, order: &EnforcementOrder) -> Result<(), DispatchError>;
}

#[async_trait]
pub trait NotificationGateway: Send + Sync {
    /// Pings reviewers (by Discord id) about a report.
    async fn notify_guardians(&self, report_id: Uuid, discord_ids: &[i64]) -> Result<(), DispatchError>;

    async fn notify_user(&self, discord_id: i64, title: &str, message: &str) -> Result<(), DispatchError>;
}

/// Everything the dispatcher needs once a report has been resolved.
#[derive(Debug, Clone)]
pub struct CompletedReport {
    pub report_id: Uuid,
    pub guild_id: i64,
    pub reported_user_id: i64,
    pub reporter_user_id: i64,
    pub punishment: Punishment,
    pub online_reviewers: Vec<i64>,
    /// Only paged for severe punishments.
    pub elevated_reviewers: Vec<i64>,
    pub level_ups: Vec<LevelUp>,
}

#[derive(Clone)]
pub struct PunishmentDispatcher {
    enforcement: Arc<dyn EnforcementGateway>,
    notifier: Arc<dyn NotificationGateway>,
    timeout: Duration,
    in_flight: Arc<Mutex<JoinSet<()>>>,
}

impl PunishmentDispatcher {
    pub fn new(
        enforcement: Arc<dyn EnforcementGateway>,
        notifier: Arc<dyn NotificationGateway>,
        timeout: Duration,
    ) -> Self {
        Self {
            enforcement,
            notifier,
            timeout,
            in_flight: Arc::new(Mutex::new(JoinSet::new())),
        }
    }

    /// Schedules [`dispatch_completion`](Self::dispatch_completion) and returns at once.
    pub fn spawn_completion(&self, done: CompletedReport) {
        let this = self.clone();
        self.track(async move { this.dispatch_completion(&done).await });
    }

    /// Schedules [`announce_report`](Self::announce_report) and returns at once.
    pub fn spawn_announcement(&self, report_id: Uuid, online_reviewers: Vec<i64>) {
        let this = self.clone();
        self.track(async move { this.announce_report(report_id, &online_reviewers).await });
    }

    /// Waits for every scheduled dispatch. Used on shutdown.
    pub async fn drain(&self) {
        let mut pending = {
            let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
            std::mem::take(&mut *set)
        };
        while let Some(joined) = pending.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "dispatch task panicked");
            }
        }
    }

    fn track<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut set = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        while set.try_join_next().is_some() {}
        set.spawn(work);
    }

    /// Enforcement plus every notification for a completed report. Called at
    /// most once per report.
    pub async fn dispatch_completion(&self, done: &CompletedReport) {
        if done.punishment != Punishment::None {
            let order = EnforcementOrder {
                report_id: done.report_id,
                punishment: done.punishment,
                target_user_id: done.reported_user_id,
                guild_id: done.guild_id,
            };
            if self.guarded("enforcement", self.enforcement.enforce(&order)).await {
                tracing::info!(
                    report_id = %done.report_id,
                    punishment = %done.punishment,
                    target = done.reported_user_id,
                    "punishment applied"
                );
            }
        }

        let mut reviewers: BTreeSet<i64> = done.online_reviewers.iter().copied().collect();
        if done.punishment.is_severe() {
            reviewers.extend(done.elevated_reviewers.iter().copied());
        }
        if !reviewers.is_empty() {
            let ids: Vec<i64> = reviewers.into_iter().collect();
            self.guarded(
                "notify_guardians",
                self.notifier.notify_guardians(done.report_id, &ids),
            )
            .await;
        }

        let verdict = format!(
            "Sua denúncia foi analisada pelos Guardiões. Resultado: {}.",
            done.punishment.describe()
        );
        self.guarded(
            "notify_reporter",
            self.notifier
                .notify_user(done.reporter_user_id, "Denúncia processada", &verdict),
        )
        .await;

        if done.punishment != Punishment::None {
            let notice = format!(
                "Após análise da comunidade você recebeu a seguinte punição: {}.",
                done.punishment.describe()
            );
            self.guarded(
                "notify_accused",
                self.notifier
                    .notify_user(done.reported_user_id, "Punição aplicada", &notice),
            )
            .await;
        }

        self.congratulate(&done.level_ups).await;
    }

    /// Tells online reviewers that a new report is waiting.
    pub async fn announce_report(&self, report_id: Uuid, online_reviewers: &[i64]) {
        if online_reviewers.is_empty() {
            tracing::debug!(%report_id, "no online guardians to notify");
            return;
        }
        self.guarded(
            "notify_guardians",
            self.notifier.notify_guardians(report_id, online_reviewers),
        )
        .await;
    }

    pub async fn congratulate(&self, level_ups: &[LevelUp]) {
        for up in level_ups {
            let message = format!(
                "Parabéns! Você subiu do nível {} para o nível {}.",
                up.old_level, up.new_level
            );
            self.guarded(
                "notify_level_up",
                self.notifier.notify_user(up.discord_id, "Novo nível", &message),
            )
            .await;
        }
    }

    /// Runs one outbound call under the timeout. Returns whether it succeeded.
    async fn guarded<F>(&self, kind: &'static str, call: F) -> bool
    where
        F: Future<Output = Result<(), DispatchError>>,
    {
        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::Timeout(self.timeout)),
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, kind, "dispatch call failed");
                metrics::counter!("guardiao_dispatch_failures_total", "kind" => kind).increment(1);
                false
            }
        }
    }
}

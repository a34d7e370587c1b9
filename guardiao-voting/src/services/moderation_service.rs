//! Async facade over the voting core.
//!
//! Each operation runs its transaction on the blocking pool, then performs
//! the post-commit side effects: metrics, domain events and bot dispatch.
//! Bot dispatch is scheduled in the background and never awaited here.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use guardiao_shared::types::event::payloads;
use guardiao_shared::types::pagination::{Paginated, PaginationParams};

use crate::clock::Clock;
use crate::dispatch::{CompletedReport, PunishmentDispatcher};
use crate::error::{VotingError, VotingResult};
use crate::events::{EventSink, ModerationEvent};
use crate::models::{Guardian, QueueEntry, Report, ReportMessage, VotingSession};
use crate::status::{GuardianStatus, ReportStatus, VoteCategory};
use crate::store::{ReviewStore, ReviewTx};
use crate::voting::session::{self, LeaveOutcome};
use crate::voting::tally::{self, VoteReceipt};
use crate::voting::{
    anonymized_votes, queue, AnonymousVote, Cancellation, PanelSettings, ReviewPacket, Touched,
};

/// One transcript line as supplied by the bot, already anonymized.
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptInput {
    pub author_alias: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    #[serde(default)]
    pub from_accused: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewReport {
    pub guild_id: i64,
    pub channel_id: i64,
    pub reported_user_id: i64,
    pub reporter_user_id: i64,
    pub reason: String,
    #[serde(default)]
    pub transcript: Vec<TranscriptInput>,
}

#[derive(Debug, Serialize)]
pub struct ReportDetails {
    pub report: Report,
    pub transcript: Vec<ReportMessage>,
    pub votes: Vec<AnonymousVote>,
    pub sessions: Vec<VotingSession>,
    pub queue_entry: Option<QueueEntry>,
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub reports_by_status: BTreeMap<String, u64>,
    pub queue_backlog: u64,
    pub open_sessions: u64,
    pub online_guardians: u64,
}

pub struct ModerationService<S: ReviewStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    dispatcher: PunishmentDispatcher,
    events: Arc<dyn EventSink>,
    panel: PanelSettings,
    elevated_level: i32,
}

impl<S: ReviewStore> ModerationService<S> {
    pub fn new(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        dispatcher: PunishmentDispatcher,
        events: Arc<dyn EventSink>,
        panel: PanelSettings,
        elevated_level: i32,
    ) -> Self {
        Self {
            store,
            clock,
            dispatcher,
            events,
            panel,
            elevated_level,
        }
    }

    pub fn panel(&self) -> PanelSettings {
        self.panel
    }

    /// Runs a store transaction off the async runtime.
    async fn run<T, F>(&self, f: F) -> VotingResult<T>
    where
        T: Send + 'static,
        F: FnMut(&mut dyn ReviewTx) -> VotingResult<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.transaction(f))
            .await
            .map_err(|e| VotingError::Store(format!("store task failed: {e}")))?
    }

    /// Waits for bot calls scheduled by earlier operations.
    pub async fn drain_dispatches(&self) {
        self.dispatcher.drain().await;
    }

    pub async fn ping(&self) -> VotingResult<()> {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || store.ping())
            .await
            .map_err(|e| VotingError::Store(format!("store task failed: {e}")))?
    }

    // --- intake ---

    pub async fn file_report(&self, input: NewReport) -> VotingResult<Report> {
        if input.reporter_user_id == input.reported_user_id {
            return Err(VotingError::SelfReport);
        }

        let now = self.clock.now();
        let report = Report::new(
            input.guild_id,
            input.channel_id,
            input.reported_user_id,
            input.reporter_user_id,
            &input.reason,
            now,
        );
        let messages: Vec<ReportMessage> = input
            .transcript
            .into_iter()
            .enumerate()
            .map(|(i, line)| ReportMessage {
                id: Uuid::now_v7(),
                report_id: report.id,
                position: i as i32,
                author_alias: line.author_alias,
                content: line.content,
                sent_at: line.sent_at,
                from_accused: line.from_accused,
            })
            .collect();
        let entry = QueueEntry::new(report.id, QueueEntry::DEFAULT_PRIORITY, now);

        let stored = report.clone();
        self.run(move |tx| {
            tx.insert_report(&stored)?;
            tx.insert_messages(&messages)?;
            tx.insert_queue_entry(&entry)
        })
        .await?;

        tracing::info!(
            report_id = %report.id,
            guild_id = report.guild_id,
            "report filed"
        );

        self.events
            .emit(ModerationEvent::ReportFiled(payloads::ReportFiled {
                report_id: report.id,
                guild_id: report.guild_id,
                reported_user_id: report.reported_user_id,
                reporter_user_id: report.reporter_user_id,
            }))
            .await;

        match self.online_reviewers().await {
            Ok(online) => {
                let ids: Vec<i64> = online.iter().map(|g| g.discord_id).collect();
                self.dispatcher.spawn_announcement(report.id, ids);
            }
            Err(e) => tracing::warn!(error = %e, report_id = %report.id, "could not load online guardians"),
        }

        Ok(report)
    }

    // --- reviewer flow ---

    /// `Ok(None)` means nothing is pending for this reviewer.
    pub async fn claim_next(&self, guardian_id: Uuid) -> VotingResult<Option<ReviewPacket>> {
        let now = self.clock.now();
        let panel = self.panel;

        let (claim, packet) = self
            .run(move |tx| {
                let claim = queue::claim_next(tx, guardian_id, &panel, now)?;
                let packet = match &claim.seat {
                    Some(seat) => Some(ReviewPacket::load(tx, &seat.session, &seat.member, &panel, now)?),
                    None => None,
                };
                Ok((claim, packet))
            })
            .await?;

        self.announce_cancellations(&claim.cancelled).await;

        if let Some(seat) = claim.seat.as_ref().filter(|s| s.opened) {
            metrics::counter!("guardiao_sessions_created_total").increment(1);
            self.events
                .emit(ModerationEvent::SessionStarted(payloads::SessionStarted {
                    session_id: seat.session.id,
                    report_id: seat.report.id,
                    voting_deadline: seat.session.voting_deadline,
                }))
                .await;
        }

        if packet.is_none() {
            tracing::debug!(%guardian_id, "nothing pending");
        }
        Ok(packet)
    }

    pub async fn session_view(&self, session_id: Uuid, guardian_id: Uuid) -> VotingResult<ReviewPacket> {
        let now = self.clock.now();
        let panel = self.panel;

        let touched = self
            .run(move |tx| {
                let current = match session::load_open(tx, session_id, now)? {
                    Touched::Live(s) => s,
                    Touched::Expired(c) => return Ok(Touched::Expired(c)),
                };
                let member = tx
                    .member(session_id, guardian_id)?
                    .filter(|m| m.is_active)
                    .ok_or(VotingError::NotMember)?;
                ReviewPacket::load(tx, &current, &member, &panel, now).map(Touched::Live)
            })
            .await?;

        self.settle(touched).await
    }

    pub async fn cast_vote(
        &self,
        session_id: Uuid,
        guardian_id: Uuid,
        category: VoteCategory,
    ) -> VotingResult<VoteReceipt> {
        let now = self.clock.now();
        let panel = self.panel;

        let touched = self
            .run(move |tx| tally::cast_vote(tx, session_id, guardian_id, category, &panel, now))
            .await?;
        let receipt = self.settle(touched).await?;

        metrics::counter!("guardiao_votes_total", "category" => category.as_str()).increment(1);
        self.events
            .emit(ModerationEvent::VoteCast(payloads::VoteCast {
                report_id: receipt.report.id,
                session_id,
                category: category.to_string(),
                total_votes: receipt.report.total_votes,
            }))
            .await;

        if let Some(resolution) = &receipt.resolution {
            self.finish_report(&receipt.report, &receipt.session, resolution).await;
        }

        Ok(receipt)
    }

    pub async fn leave(&self, session_id: Uuid, guardian_id: Uuid) -> VotingResult<LeaveOutcome> {
        let now = self.clock.now();
        let touched = self
            .run(move |tx| session::leave(tx, session_id, guardian_id, now))
            .await?;
        let outcome = self.settle(touched).await?;

        if let Some(c) = &outcome.cancelled {
            self.announce_cancellations(std::slice::from_ref(c)).await;
        }
        Ok(outcome)
    }

    /// Cancels every lapsed session. Safe to run from several instances.
    pub async fn sweep_expired(&self) -> VotingResult<Vec<Cancellation>> {
        let now = self.clock.now();
        let cancelled = self.run(move |tx| session::sweep_expired(tx, now)).await?;
        if !cancelled.is_empty() {
            tracing::info!(count = cancelled.len(), "expired sessions swept");
        }
        self.announce_cancellations(&cancelled).await;
        Ok(cancelled)
    }

    // --- roster ---

    pub async fn register_guardian(
        &self,
        discord_id: i64,
        username: String,
        display_name: String,
    ) -> VotingResult<Guardian> {
        let now = self.clock.now();
        self.run(move |tx| {
            if let Some(mut existing) = tx.guardian_by_discord_id(discord_id)? {
                if existing.discord_username != username || existing.discord_display_name != display_name {
                    existing.discord_username = username.clone();
                    existing.discord_display_name = display_name.clone();
                    tx.update_guardian(&existing)?;
                }
                return Ok(existing);
            }
            let guardian = Guardian::new(discord_id, &username, &display_name, now);
            tx.insert_guardian(&guardian)?;
            tracing::info!(guardian_id = %guardian.id, discord_id, "guardian registered");
            Ok(guardian)
        })
        .await
    }

    pub async fn set_guardian_status(&self, guardian_id: Uuid, status: GuardianStatus) -> VotingResult<Guardian> {
        let now = self.clock.now();
        self.run(move |tx| {
            let mut guardian = tx
                .guardian(guardian_id)?
                .ok_or(VotingError::GuardianNotFound(guardian_id))?;
            guardian.status = status;
            guardian.last_activity = now;
            tx.update_guardian(&guardian)?;
            Ok(guardian)
        })
        .await
    }

    pub async fn online_reviewers(&self) -> VotingResult<Vec<Guardian>> {
        self.run(|tx| tx.guardians_by_status(GuardianStatus::Online)).await
    }

    // --- administration ---

    pub async fn list_reports(
        &self,
        status: Option<ReportStatus>,
        page: PaginationParams,
    ) -> VotingResult<Paginated<Report>> {
        let (offset, limit) = (page.offset(), page.limit());
        let (items, total) = self
            .run(move |tx| tx.list_reports(status, offset, limit))
            .await?;
        Ok(Paginated::new(items, total, &page))
    }

    pub async fn report_details(&self, report_id: Uuid) -> VotingResult<ReportDetails> {
        self.run(move |tx| {
            let report = tx
                .report(report_id)?
                .ok_or(VotingError::ReportNotFound(report_id))?;
            Ok(ReportDetails {
                transcript: tx.messages(report_id)?,
                votes: anonymized_votes(tx, report_id)?,
                sessions: tx.sessions_for_report(report_id)?,
                queue_entry: tx.queue_entry_for_report(report_id)?,
                report,
            })
        })
        .await
    }

    pub async fn dashboard_stats(&self) -> VotingResult<DashboardStats> {
        self.run(|tx| {
            let mut reports_by_status = BTreeMap::new();
            for status in ReportStatus::ALL {
                reports_by_status.insert(status.to_string(), tx.count_reports(*status)?);
            }
            Ok(DashboardStats {
                reports_by_status,
                queue_backlog: tx.open_queue_entries()?.len() as u64,
                open_sessions: tx.open_sessions()?.len() as u64,
                online_guardians: tx.guardians_by_status(GuardianStatus::Online)?.len() as u64,
            })
        })
        .await
    }

    /// Changes the queue priority of a report that has not been resolved yet.
    pub async fn reprioritize(&self, report_id: Uuid, priority: i32) -> VotingResult<QueueEntry> {
        self.run(move |tx| {
            if tx.report(report_id)?.is_none() {
                return Err(VotingError::ReportNotFound(report_id));
            }
            let mut entry = tx
                .queue_entry_for_report(report_id)?
                .filter(|e| e.status.is_open())
                .ok_or(VotingError::NotQueued(report_id))?;
            entry.priority = priority;
            tx.update_queue_entry(&entry)?;
            tracing::info!(%report_id, priority, "queue priority changed");
            Ok(entry)
        })
        .await
    }

    // --- post-commit helpers ---

    /// Publishes a lapse that was committed and turns it into the caller's error.
    async fn settle<T>(&self, touched: Touched<T>) -> VotingResult<T> {
        match touched {
            Touched::Live(value) => Ok(value),
            Touched::Expired(c) => {
                self.announce_cancellations(std::slice::from_ref(&c)).await;
                Err(VotingError::SessionExpired)
            }
        }
    }

    async fn announce_cancellations(&self, cancelled: &[Cancellation]) {
        for c in cancelled {
            metrics::counter!("guardiao_sessions_cancelled_total", "reason" => c.reason.as_str())
                .increment(1);
            self.events
                .emit(ModerationEvent::SessionCancelled(payloads::SessionCancelled {
                    session_id: c.session_id,
                    report_id: c.report_id,
                    reason: c.reason.as_str().to_string(),
                }))
                .await;
        }
    }

    async fn finish_report(
        &self,
        report: &Report,
        session: &VotingSession,
        resolution: &tally::Resolution,
    ) {
        metrics::counter!(
            "guardiao_reports_completed_total",
            "punishment" => resolution.punishment.as_str()
        )
        .increment(1);

        self.events
            .emit(ModerationEvent::ReportCompleted(payloads::ReportCompleted {
                report_id: report.id,
                session_id: session.id,
                punishment: resolution.punishment.to_string(),
                votes_improcedente: report.votes_improcedente,
                votes_intimidou: report.votes_intimidou,
                votes_grave: report.votes_grave,
            }))
            .await;

        let elevated_level = self.elevated_level;
        let severe = resolution.punishment.is_severe();
        let rosters = self
            .run(move |tx| {
                let online = tx.guardians_by_status(GuardianStatus::Online)?;
                let elevated = if severe {
                    tx.guardians_min_level(elevated_level)?
                } else {
                    Vec::new()
                };
                Ok((online, elevated))
            })
            .await;
        let (online, elevated) = rosters.unwrap_or_else(|e| {
            tracing::warn!(error = %e, report_id = %report.id, "could not load guardian rosters");
            (Vec::new(), Vec::new())
        });

        self.dispatcher.spawn_completion(CompletedReport {
            report_id: report.id,
            guild_id: report.guild_id,
            reported_user_id: report.reported_user_id,
            reporter_user_id: report.reporter_user_id,
            punishment: resolution.punishment,
            online_reviewers: online.iter().map(|g| g.discord_id).collect(),
            elevated_reviewers: elevated.iter().map(|g| g.discord_id).collect(),
            level_ups: resolution.level_ups.clone(),
        });
    }
}

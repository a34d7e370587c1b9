//! The voting core: queue assignment, session lifecycle, vote tally and
//! disposition. Every function here runs inside one store transaction and
//! performs no I/O beyond the [`ReviewTx`] it is handed.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{VotingError, VotingResult};
use crate::models::{ReportMessage, SessionGuardian, VotingSession};
use crate::status::VoteCategory;
use crate::store::ReviewTx;

pub mod disposition;
pub mod queue;
pub mod scoring;
pub mod session;
pub mod tally;

/// Tunables shared by the queue, session and tally code.
#[derive(Debug, Clone, Copy)]
pub struct PanelSettings {
    /// Votes needed to resolve a report.
    pub panel_size: i32,
    pub voting_window: Duration,
}

impl Default for PanelSettings {
    fn default() -> Self {
        Self {
            panel_size: disposition::MIN_VOTES_FOR_DISPOSITION,
            voting_window: Duration::minutes(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CancelReason {
    /// Deadline passed without quorum.
    Expired,
    /// Last active member left before voting.
    Abandoned,
}

impl CancelReason {
    pub fn as_str(self) -> &'static str {
        match self {
            CancelReason::Expired => "expired",
            CancelReason::Abandoned => "abandoned",
        }
    }
}

/// A session that was cancelled during a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cancellation {
    pub session_id: Uuid,
    pub report_id: Uuid,
    pub reason: CancelReason,
}

/// Result of an operation on a session that may have lapsed under the caller.
///
/// `Expired` is returned as a successful value so the cancellation commits;
/// the caller turns it into [`VotingError::SessionExpired`] afterwards.
#[derive(Debug)]
pub enum Touched<T> {
    Live(T),
    Expired(Cancellation),
}

/// One vote as shown to reviewers: no reviewer identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnonymousVote {
    pub category: VoteCategory,
    pub cast_at: DateTime<Utc>,
}

pub fn anonymized_votes(tx: &mut dyn ReviewTx, report_id: Uuid) -> VotingResult<Vec<AnonymousVote>> {
    Ok(tx
        .votes_for_report(report_id)?
        .into_iter()
        .map(|v| AnonymousVote {
            category: v.category,
            cast_at: v.created_at,
        })
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct TranscriptLine {
    pub author_alias: String,
    pub content: String,
    pub sent_at: DateTime<Utc>,
    pub from_accused: bool,
}

impl From<ReportMessage> for TranscriptLine {
    fn from(m: ReportMessage) -> Self {
        Self {
            author_alias: m.author_alias,
            content: m.content,
            sent_at: m.sent_at,
            from_accused: m.from_accused,
        }
    }
}

/// What a reviewer sees while seated in a session. The accused and the
/// reporter are deliberately absent.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewPacket {
    pub session_id: Uuid,
    pub report_id: Uuid,
    pub reason: String,
    pub transcript: Vec<TranscriptLine>,
    pub voting_deadline: DateTime<Utc>,
    pub seconds_remaining: i64,
    pub has_voted: bool,
    pub votes_needed: i32,
    pub tally: Vec<AnonymousVote>,
}

impl ReviewPacket {
    pub fn load(
        tx: &mut dyn ReviewTx,
        session: &VotingSession,
        member: &SessionGuardian,
        settings: &PanelSettings,
        now: DateTime<Utc>,
    ) -> VotingResult<Self> {
        let report = tx
            .report(session.report_id)?
            .ok_or(VotingError::ReportNotFound(session.report_id))?;
        let transcript = tx
            .messages(report.id)?
            .into_iter()
            .map(TranscriptLine::from)
            .collect();

        Ok(Self {
            session_id: session.id,
            report_id: report.id,
            reason: report.reason.clone(),
            transcript,
            voting_deadline: session.voting_deadline,
            seconds_remaining: session.seconds_remaining(now),
            has_voted: member.has_voted,
            votes_needed: (settings.panel_size - report.total_votes).max(0),
            tally: anonymized_votes(tx, report.id)?,
        })
    }
}

//! Session lifecycle: cancellation, lazy expiry, leaving, and the sweep.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{VotingError, VotingResult};
use crate::models::VotingSession;
use crate::status::QueueStatus;
use crate::store::ReviewTx;
use crate::voting::{CancelReason, Cancellation, Touched};

/// Cancels an open session, deactivates members still expected to vote and
/// hands the report back to the queue. Votes already cast stay on the report.
pub fn cancel(
    tx: &mut dyn ReviewTx,
    session: &mut VotingSession,
    reason: CancelReason,
    now: DateTime<Utc>,
) -> VotingResult<Cancellation> {
    session.cancel(now)?;
    tx.update_session(session)?;

    for mut member in tx.members(session.id)? {
        if member.is_pending() {
            member.deactivate(now);
            tx.update_member(&member)?;
        }
    }

    if let Some(mut entry) = tx.queue_entry_for_report(session.report_id)? {
        if entry.status == QueueStatus::Assigned {
            entry.release()?;
            tx.update_queue_entry(&entry)?;
        }
    }

    tracing::info!(
        session_id = %session.id,
        report_id = %session.report_id,
        reason = reason.as_str(),
        "voting session cancelled"
    );

    Ok(Cancellation {
        session_id: session.id,
        report_id: session.report_id,
        reason,
    })
}

/// Cancels `session` if it is still open and past its deadline.
pub fn expire_if_due(
    tx: &mut dyn ReviewTx,
    session: &mut VotingSession,
    now: DateTime<Utc>,
) -> VotingResult<Option<Cancellation>> {
    if session.status.is_open() && session.is_expired(now) {
        return cancel(tx, session, CancelReason::Expired, now).map(Some);
    }
    Ok(None)
}

/// Loads a session that the caller intends to act on: it must exist, still be
/// open, and not have lapsed. A lapsed session is cancelled on the spot.
pub fn load_open(
    tx: &mut dyn ReviewTx,
    session_id: Uuid,
    now: DateTime<Utc>,
) -> VotingResult<Touched<VotingSession>> {
    let mut session = tx
        .session(session_id)?
        .ok_or(VotingError::SessionNotFound(session_id))?;

    if !session.status.is_open() {
        return Err(VotingError::SessionClosed(session.status));
    }
    if let Some(cancellation) = expire_if_due(tx, &mut session, now)? {
        return Ok(Touched::Expired(cancellation));
    }
    Ok(Touched::Live(session))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveOutcome {
    /// Set when this reviewer was the last active member.
    pub cancelled: Option<Cancellation>,
}

/// Removes a reviewer from a session. Reviewers who voted keep an inactive
/// row; the rest are deleted. An empty session is cancelled and its queue
/// entry goes back to pending.
pub fn leave(
    tx: &mut dyn ReviewTx,
    session_id: Uuid,
    guardian_id: Uuid,
    now: DateTime<Utc>,
) -> VotingResult<Touched<LeaveOutcome>> {
    let mut session = match load_open(tx, session_id, now)? {
        Touched::Live(s) => s,
        Touched::Expired(c) => return Ok(Touched::Expired(c)),
    };

    let mut member = tx
        .member(session_id, guardian_id)?
        .filter(|m| m.is_active)
        .ok_or(VotingError::NotMember)?;

    if member.has_voted {
        member.deactivate(now);
        tx.update_member(&member)?;
    } else {
        tx.delete_member(member.id)?;
    }

    tracing::info!(%session_id, %guardian_id, voted = member.has_voted, "guardian left session");

    let still_active = tx.members(session_id)?.iter().filter(|m| m.is_active).count();
    let cancelled = if still_active == 0 {
        Some(cancel(tx, &mut session, CancelReason::Abandoned, now)?)
    } else {
        None
    };

    Ok(Touched::Live(LeaveOutcome { cancelled }))
}

/// Cancels every open session whose deadline has passed.
pub fn sweep_expired(tx: &mut dyn ReviewTx, now: DateTime<Utc>) -> VotingResult<Vec<Cancellation>> {
    let mut cancelled = Vec::new();
    for mut session in tx.open_sessions()? {
        if let Some(c) = expire_if_due(tx, &mut session, now)? {
            cancelled.push(c);
        }
    }
    Ok(cancelled)
}

//! Guardian reputation: vote correctness against the final disposition,
//! and the point thresholds for each level.

use crate::status::{Punishment, VoteCategory};

const LEVEL_THRESHOLDS: [(i32, i32); 4] = [(1000, 5), (500, 4), (200, 3), (50, 2)];

pub fn is_vote_correct(category: VoteCategory, punishment: Punishment) -> bool {
    match punishment {
        Punishment::None => category == VoteCategory::Improcedente,
        Punishment::MuteShort | Punishment::MuteLong => {
            matches!(category, VoteCategory::Intimidou | VoteCategory::Grave)
        }
        Punishment::TempBan => category == VoteCategory::Grave,
    }
}

pub fn level_for_points(points: i32) -> i32 {
    LEVEL_THRESHOLDS
        .iter()
        .find(|(min, _)| points >= *min)
        .map(|(_, level)| *level)
        .unwrap_or(1)
}

pub fn accuracy_percentage(correct: i32, incorrect: i32) -> f64 {
    let total = correct + incorrect;
    if total == 0 {
        return 0.0;
    }
    (f64::from(correct) / f64::from(total) * 10_000.0).round() / 100.0
}

//! Punishment rule table.
//!
//! Rules are evaluated in order and the first match wins. Combinations that no
//! rule covers (e.g. 1/2/2) fall through to [`Punishment::None`].

use serde::Serialize;

use crate::status::Punishment;

/// Votes needed before the table is consulted at all.
pub const MIN_VOTES_FOR_DISPOSITION: i32 = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub improcedente: i32,
    pub intimidou: i32,
    pub grave: i32,
}

impl Tally {
    pub fn total(&self) -> i32 {
        self.improcedente + self.intimidou + self.grave
    }
}

pub fn resolve(tally: Tally) -> Punishment {
    let Tally { improcedente, intimidou, grave } = tally;

    if tally.total() < MIN_VOTES_FOR_DISPOSITION {
        return Punishment::None;
    }

    if improcedente >= 3 {
        Punishment::None
    } else if intimidou == 3 && grave == 0 {
        Punishment::MuteShort
    } else if intimidou == 3 && grave == 2 {
        Punishment::MuteLong
    } else if improcedente == 2 && grave == 3 {
        Punishment::MuteShort
    } else if intimidou == 2 && grave == 3 {
        Punishment::TempBan
    } else if grave >= 4 {
        Punishment::TempBan
    } else {
        Punishment::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(improcedente: i32, intimidou: i32, grave: i32) -> Tally {
        Tally { improcedente, intimidou, grave }
    }

    #[test]
    fn dismissal_majority_wins_first() {
        assert_eq!(resolve(t(3, 0, 2)), Punishment::None);
        assert_eq!(resolve(t(5, 0, 0)), Punishment::None);
    }

    #[test]
    fn intimidation_majority() {
        assert_eq!(resolve(t(2, 3, 0)), Punishment::MuteShort);
        assert_eq!(resolve(t(0, 3, 2)), Punishment::MuteLong);
    }

    #[test]
    fn grave_majority() {
        assert_eq!(resolve(t(2, 0, 3)), Punishment::MuteShort);
        assert_eq!(resolve(t(0, 2, 3)), Punishment::TempBan);
        assert_eq!(resolve(t(1, 0, 4)), Punishment::TempBan);
        assert_eq!(resolve(t(0, 0, 5)), Punishment::TempBan);
    }

    #[test]
    fn uncovered_combinations_fall_through_to_none() {
        assert_eq!(resolve(t(1, 2, 2)), Punishment::None);
        assert_eq!(resolve(t(2, 2, 1)), Punishment::None);
        assert_eq!(resolve(t(1, 4, 0)), Punishment::None);
        assert_eq!(resolve(t(1, 1, 3)), Punishment::None);
    }

    #[test]
    fn below_quorum_is_never_punished() {
        assert_eq!(resolve(t(0, 0, 4)), Punishment::None);
    }

    #[test]
    fn is_a_pure_function_of_the_counters() {
        for improcedente in 0..=5 {
            for intimidou in 0..=(5 - improcedente) {
                let grave = 5 - improcedente - intimidou;
                let tally = t(improcedente, intimidou, grave);
                assert_eq!(resolve(tally), resolve(tally));
            }
        }
    }
}

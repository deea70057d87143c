//! Streak engine.
//!
//! Pure transitions over [`StreakData`]. The streak moves at most once per
//! calendar day and only on added translations; the learned totals move on
//! every event. Expiry from inactivity is applied lazily on the next call.

use chrono::NaiveDate;

use crate::clock::days_between;
use crate::models::{ItemKind, StreakData};

/// A translation appearing (`Learned`) or disappearing (`Unlearned`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearningDelta {
    Learned,
    Unlearned,
}

impl LearningDelta {
    pub fn as_i64(self) -> i64 {
        match self {
            LearningDelta::Learned => 1,
            LearningDelta::Unlearned => -1,
        }
    }
}

/// Reset the current streak if more than one day has passed since the last activity.
pub fn check_and_update_streak(current: &StreakData, today: NaiveDate) -> StreakData {
    let mut next = current.clone();

    if let Some(last) = current.last_activity_date {
        if days_between(last, today) > 1 {
            next.current_streak = 0;
        }
    }

    next
}

/// Apply one learning event for an item of `kind` observed on `today`.
pub fn apply_learning_event(
    current: &StreakData,
    kind: ItemKind,
    delta: LearningDelta,
    today: NaiveDate,
) -> StreakData {
    let mut next = check_and_update_streak(current, today);

    if delta == LearningDelta::Learned && next.last_activity_date != Some(today) {
        match next.last_activity_date {
            None => next.current_streak = 1,
            Some(last) => match days_between(last, today) {
                1 => next.current_streak += 1,
                gap if gap > 1 => next.current_streak = 1,
                // Clock went backwards: leave the streak alone.
                _ => {}
            },
        }
    }

    let total = match kind {
        ItemKind::Word => &mut next.total_words_learned,
        ItemKind::Sentence => &mut next.total_sentences_learned,
    };
    *total = (i64::from(*total) + delta.as_i64()).max(0) as u32;

    if delta == LearningDelta::Learned {
        next.last_activity_date = Some(today);
    }

    next.longest_streak = next.longest_streak.max(next.current_streak);
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn state(current: u32, longest: u32, last: Option<&str>) -> StreakData {
        StreakData {
            current_streak: current,
            longest_streak: longest,
            last_activity_date: last.map(date),
            ..StreakData::default()
        }
    }

    #[test]
    fn test_first_ever_activity_starts_streak() {
        let next = apply_learning_event(
            &StreakData::default(),
            ItemKind::Word,
            LearningDelta::Learned,
            date("2024-01-01"),
        );
        assert_eq!(next.current_streak, 1);
        assert_eq!(next.longest_streak, 1);
        assert_eq!(next.last_activity_date, Some(date("2024-01-01")));
        assert_eq!(next.total_words_learned, 1);
        assert_eq!(next.total_sentences_learned, 0);
    }

    #[test]
    fn test_consecutive_day_extends_streak() {
        let prev = state(3, 5, Some("2024-01-01"));
        let next = apply_learning_event(&prev, ItemKind::Word, LearningDelta::Learned, date("2024-01-02"));
        assert_eq!(next.current_streak, 4);
        assert_eq!(next.longest_streak, 5);
    }

    #[test]
    fn test_gap_restarts_streak() {
        let prev = state(3, 3, Some("2024-01-01"));
        let next = apply_learning_event(&prev, ItemKind::Sentence, LearningDelta::Learned, date("2024-01-05"));
        assert_eq!(next.current_streak, 1);
        assert_eq!(next.longest_streak, 3);
        assert_eq!(next.total_sentences_learned, 1);
    }

    #[test]
    fn test_staleness_check_alone_resets_streak() {
        let prev = state(3, 3, Some("2024-01-01"));
        let next = check_and_update_streak(&prev, date("2024-01-05"));
        assert_eq!(next.current_streak, 0);
        assert_eq!(next.longest_streak, 3);
        assert_eq!(next.last_activity_date, Some(date("2024-01-01")));
    }

    #[test]
    fn test_staleness_check_keeps_recent_streak() {
        let prev = state(3, 3, Some("2024-01-01"));
        assert_eq!(check_and_update_streak(&prev, date("2024-01-02")), prev);
        assert_eq!(check_and_update_streak(&prev, date("2024-01-01")), prev);
        assert_eq!(check_and_update_streak(&StreakData::default(), date("2024-01-09")), StreakData::default());
    }

    #[test]
    fn test_same_day_adds_count_once() {
        let mut data = state(2, 2, Some("2024-01-01"));
        for _ in 0..10 {
            data = apply_learning_event(&data, ItemKind::Word, LearningDelta::Learned, date("2024-01-02"));
        }
        assert_eq!(data.current_streak, 3);
        assert_eq!(data.total_words_learned, 10);
    }

    #[test]
    fn test_removal_never_touches_streak_or_date() {
        let prev = StreakData {
            total_words_learned: 4,
            ..state(3, 3, Some("2024-01-01"))
        };
        let next = apply_learning_event(&prev, ItemKind::Word, LearningDelta::Unlearned, date("2024-01-02"));
        assert_eq!(next.current_streak, 3);
        assert_eq!(next.last_activity_date, Some(date("2024-01-01")));
        assert_eq!(next.total_words_learned, 3);
    }

    #[test]
    fn test_removal_after_gap_still_expires_streak() {
        let prev = state(3, 3, Some("2024-01-01"));
        let next = apply_learning_event(&prev, ItemKind::Word, LearningDelta::Unlearned, date("2024-01-04"));
        assert_eq!(next.current_streak, 0);
        assert_eq!(next.last_activity_date, Some(date("2024-01-01")));
    }

    #[test]
    fn test_totals_floor_at_zero() {
        let mut data = StreakData::default();
        for _ in 0..3 {
            data = apply_learning_event(&data, ItemKind::Word, LearningDelta::Unlearned, date("2024-01-01"));
            data = apply_learning_event(&data, ItemKind::Sentence, LearningDelta::Unlearned, date("2024-01-01"));
        }
        assert_eq!(data.total_words_learned, 0);
        assert_eq!(data.total_sentences_learned, 0);
        assert_eq!(data.current_streak, 0);
        assert_eq!(data.last_activity_date, None);
    }

    #[test]
    fn test_clock_skew_is_same_day() {
        let prev = state(4, 4, Some("2024-01-05"));
        let next = apply_learning_event(&prev, ItemKind::Word, LearningDelta::Learned, date("2024-01-03"));
        assert_eq!(next.current_streak, 4);
        assert_eq!(next.longest_streak, 4);
    }

    #[test]
    fn test_longest_tracks_current_across_a_run() {
        let mut data = StreakData::default();
        let days = [
            "2024-01-01", "2024-01-02", "2024-01-03", "2024-01-07", "2024-01-08", "2024-01-08",
            "2024-01-09", "2024-01-10", "2024-01-11",
        ];
        for day in days {
            data = apply_learning_event(&data, ItemKind::Word, LearningDelta::Learned, date(day));
            assert!(data.longest_streak >= data.current_streak);
        }
        assert_eq!(data.current_streak, 5);
        assert_eq!(data.longest_streak, 5);

        data = apply_learning_event(&data, ItemKind::Word, LearningDelta::Learned, date("2024-02-01"));
        assert_eq!(data.current_streak, 1);
        assert_eq!(data.longest_streak, 5);
    }
}

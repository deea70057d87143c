//! Learning activity grouped by calendar day.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use super::{ItemKind, LearningItem};
use crate::clock::DayBoundary;

/// Items translated on one calendar day.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityDay {
    pub date: NaiveDate,
    pub words: Vec<LearningItem>,
    pub sentences: Vec<LearningItem>,
}

/// Activity over a date range.
#[derive(Debug, Clone, Serialize)]
pub struct ActivitySummary {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub days: Vec<ActivityDay>,
    pub active_days: usize,
    pub total_words: usize,
    pub total_sentences: usize,
}

/// Group translated items by the day their translation was last set, keeping
/// only days in `from..=to`.
pub fn summarize_activity<'a, I>(
    items: I,
    boundary: DayBoundary,
    from: NaiveDate,
    to: NaiveDate,
) -> ActivitySummary
where
    I: IntoIterator<Item = (ItemKind, &'a LearningItem)>,
{
    let mut by_day: BTreeMap<NaiveDate, ActivityDay> = BTreeMap::new();

    for (kind, item) in items {
        let Some(stamp) = item.updated_at.filter(|_| item.is_translated()) else {
            continue;
        };
        let date = boundary.calendar_day(stamp);
        if date < from || date > to {
            continue;
        }

        let day = by_day.entry(date).or_insert_with(|| ActivityDay {
            date,
            words: Vec::new(),
            sentences: Vec::new(),
        });
        match kind {
            ItemKind::Word => day.words.push(item.clone()),
            ItemKind::Sentence => day.sentences.push(item.clone()),
        }
    }

    let days: Vec<ActivityDay> = by_day.into_values().collect();
    ActivitySummary {
        from,
        to,
        active_days: days.len(),
        total_words: days.iter().map(|d| d.words.len()).sum(),
        total_sentences: days.iter().map(|d| d.sentences.len()).sum(),
        days,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, day, hour, 0, 0).unwrap()
    }

    fn translated(tamil: &str, when: DateTime<Utc>) -> LearningItem {
        LearningItem::new("x".into(), tamil.into(), "Topic".into(), when)
    }

    #[test]
    fn test_groups_by_day_within_range() {
        let words = vec![
            translated("Onru", at(1, 8)),
            translated("Irandu", at(1, 20)),
            translated("Moonru", at(3, 9)),
            translated("", at(3, 9)),
            translated("Naangu", at(20, 9)),
        ];
        let sentences = vec![translated("Vanakkam", at(3, 10))];

        let items = words
            .iter()
            .map(|i| (ItemKind::Word, i))
            .chain(sentences.iter().map(|i| (ItemKind::Sentence, i)));

        let from = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let summary = summarize_activity(items, DayBoundary::Utc, from, to);

        assert_eq!(summary.active_days, 2);
        assert_eq!(summary.total_words, 3);
        assert_eq!(summary.total_sentences, 1);
        assert_eq!(summary.days[0].date, from);
        assert_eq!(summary.days[0].words.len(), 2);
        assert_eq!(summary.days[1].sentences.len(), 1);
    }
}

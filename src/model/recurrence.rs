//! Recurrence rules owned by a series root.

use chrono::{Datelike, Days, Months, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// How often a series repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceType {
    Daily,
    Weekly,
    Monthly,
}

impl RecurrenceType {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "daily" | "day" => Some(Self::Daily),
            "weekly" | "week" => Some(Self::Weekly),
            "monthly" | "month" => Some(Self::Monthly),
            _ => None,
        }
    }
}

/// A repeat rule: every `interval` days/weeks/months, optionally limited to
/// a weekday set (weekly rules only) and an inclusive end date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    #[serde(rename = "type")]
    pub kind: RecurrenceType,
    pub interval: u32,
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub weekdays: Vec<Weekday>,
}

impl RecurrenceRule {
    #[must_use]
    pub fn new(kind: RecurrenceType, interval: u32) -> Self {
        Self {
            kind,
            interval: interval.max(1),
            end_date: None,
            weekdays: Vec::new(),
        }
    }

    #[must_use]
    pub fn until(mut self, end_date: NaiveDate) -> Self {
        self.end_date = Some(end_date);
        self
    }

    #[must_use]
    pub fn on(mut self, weekdays: impl IntoIterator<Item = Weekday>) -> Self {
        let mut days: Vec<Weekday> = weekdays.into_iter().collect();
        days.sort_by_key(Weekday::num_days_from_monday);
        days.dedup();
        self.weekdays = days;
        self
    }

    /// The first occurrence strictly after `date`, or `None` once the rule
    /// has passed its end date.
    #[must_use]
    pub fn next_after(&self, date: NaiveDate) -> Option<NaiveDate> {
        let interval = self.interval.max(1);
        let next = match self.kind {
            RecurrenceType::Daily => date.checked_add_days(Days::new(u64::from(interval))),
            RecurrenceType::Weekly if self.weekdays.is_empty() => {
                date.checked_add_days(Days::new(7 * u64::from(interval)))
            }
            RecurrenceType::Weekly => self.next_weekday_after(date, interval),
            RecurrenceType::Monthly => date.checked_add_months(Months::new(interval)),
        }?;

        match self.end_date {
            Some(end) if next > end => None,
            _ => Some(next),
        }
    }

    /// Up to `count` consecutive occurrences after `date`.
    #[must_use]
    pub fn upcoming(&self, date: NaiveDate, count: usize) -> Vec<NaiveDate> {
        let mut dates = Vec::with_capacity(count);
        let mut cursor = date;
        while dates.len() < count {
            let Some(next) = self.next_after(cursor) else {
                break;
            };
            dates.push(next);
            cursor = next;
        }
        dates
    }

    // Weeks are counted from the week containing `date`; only every
    // `interval`-th week is eligible.
    fn next_weekday_after(&self, date: NaiveDate, interval: u32) -> Option<NaiveDate> {
        let week_start = |d: NaiveDate| d - Days::new(u64::from(d.weekday().num_days_from_monday()));
        let anchor = week_start(date);
        let horizon = 7 * (u64::from(interval) + 1);

        (1..=horizon)
            .filter_map(|offset| date.checked_add_days(Days::new(offset)))
            .find(|candidate| {
                let weeks = (week_start(*candidate) - anchor).num_days() / 7;
                weeks % i64::from(interval) == 0 && self.weekdays.contains(&candidate.weekday())
            })
    }
}

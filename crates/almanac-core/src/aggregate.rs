use chrono::NaiveDate;

use crate::codec::ViewZone;
use crate::item::CalendarItem;
use crate::span::items_for_day;

pub const DEFAULT_MAX_VISIBLE: usize = 3;

/// What a crowded cell shows: the first few entries and how many were cut.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleSlice<T> {
    pub shown: Vec<T>,
    pub overflow: usize,
}

impl<T> VisibleSlice<T> {
    /// `+N more` text, empty when nothing was cut.
    pub fn overflow_label(&self) -> Option<String> {
        (self.overflow > 0).then(|| format!("+{} more", self.overflow))
    }
}

/// Keeps the first `max_visible` entries in input order. Sorting is the
/// caller's job.
pub fn visible_slice<T: Clone>(items: &[T], max_visible: usize) -> VisibleSlice<T> {
    let capped = items.len().min(max_visible);
    VisibleSlice {
        shown: items[..capped].to_vec(),
        overflow: items.len().saturating_sub(capped),
    }
}

/// Orders by start instant, then title, keeping the original order for ties.
pub fn sort_by_start(items: &mut [CalendarItem]) {
    items.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.title.cmp(&b.title)));
}

/// One bucket per day of `days`, holding every item shown on that day.
pub fn group_by_day<'a>(
    items: &'a [CalendarItem],
    days: impl IntoIterator<Item = NaiveDate>,
    zone: ViewZone,
) -> Vec<(NaiveDate, Vec<&'a CalendarItem>)> {
    days.into_iter()
        .map(|day| (day, items_for_day(items, day, zone)))
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, NaiveDate};

    use super::*;
    use crate::item::sample_item;

    #[test]
    fn truncates_and_counts_overflow() {
        let slice = visible_slice(&["a", "b", "c", "d", "e"], 3);
        assert_eq!(slice.shown, vec!["a", "b", "c"]);
        assert_eq!(slice.overflow, 2);
        assert_eq!(slice.overflow_label().as_deref(), Some("+2 more"));
    }

    #[test]
    fn short_lists_are_untouched() {
        let slice = visible_slice(&[1, 2], 3);
        assert_eq!(slice.shown, vec![1, 2]);
        assert_eq!(slice.overflow, 0);
        assert_eq!(slice.overflow_label(), None);

        let none = visible_slice(&[1, 2], 0);
        assert!(none.shown.is_empty());
        assert_eq!(none.overflow, 2);
    }

    #[test]
    fn sorts_by_start_then_title() {
        let mut items = vec![
            sample_item("late", "2024-01-10T12:00:00Z", "2024-01-10T13:00:00Z"),
            sample_item("b", "2024-01-10T09:00:00Z", "2024-01-10T10:00:00Z"),
            sample_item("a", "2024-01-10T09:00:00Z", "2024-01-10T09:30:00Z"),
        ];
        sort_by_start(&mut items);
        let ids = items.iter().map(|i| i.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["a", "b", "late"]);
    }

    #[test]
    fn spanning_items_land_in_each_bucket() {
        let zone = ViewZone::Fixed(FixedOffset::east_opt(0).expect("offset"));
        let items = vec![sample_item(
            "trip",
            "2024-01-10T18:00:00Z",
            "2024-01-12T08:00:00Z",
        )];
        let days = (9..=13).map(|d| NaiveDate::from_ymd_opt(2024, 1, d).expect("date"));
        let counts = group_by_day(&items, days, zone)
            .into_iter()
            .map(|(_, bucket)| bucket.len())
            .collect::<Vec<_>>();
        assert_eq!(counts, vec![0, 1, 1, 1, 0]);
    }
}

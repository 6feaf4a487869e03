use chrono::{
  DateTime,
  FixedOffset,
  NaiveDate
};

use crate::codec::ViewZone;
use crate::error::CoreResult;
use crate::item::CalendarItem;
use crate::week::add_days;

/// Half-open local day `[start, end)` expressed as instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayWindow {
  pub start: DateTime<FixedOffset>,
  pub end:   DateTime<FixedOffset>
}

impl DayWindow {
  pub fn for_day(
    day: NaiveDate,
    zone: ViewZone
  ) -> CoreResult<Self> {
    Self::for_range(day, day, zone)
  }

  /// Window from local midnight of `first` to local midnight after
  /// `last`.
  pub fn for_range(
    first: NaiveDate,
    last: NaiveDate,
    zone: ViewZone
  ) -> CoreResult<Self> {
    let start = zone
      .resolve(first.and_time(
        chrono::NaiveTime::MIN
      ))?;
    let end = zone.resolve(
      add_days(last, 1)?
        .and_time(chrono::NaiveTime::MIN)
    )?;
    Ok(Self { start, end })
  }

  fn contains(
    &self,
    instant: &DateTime<FixedOffset>
  ) -> bool {
    *instant >= self.start
      && *instant < self.end
  }

  /// An item belongs to the window when it starts in it, ends in it, or
  /// runs across all of it.
  #[must_use]
  pub fn touches(
    &self,
    item: &CalendarItem
  ) -> bool {
    self.contains(&item.start)
      || self.contains(&item.end)
      || (item.start < self.start
        && item.end >= self.end)
  }
}

/// Whether `item` shows up on `day` as seen from `zone`. Multi-day items
/// answer true on every day they touch.
#[must_use]
pub fn occurs_on(
  item: &CalendarItem,
  day: NaiveDate,
  zone: ViewZone
) -> bool {
  match DayWindow::for_day(day, zone) {
    | Ok(window) => window.touches(item),
    | Err(err) => {
      tracing::debug!(
        day = %day,
        error = %err,
        "cannot build day window"
      );
      false
    }
  }
}

/// Items shown on `day`, in input order.
#[must_use]
pub fn items_for_day<'a>(
  items: &'a [CalendarItem],
  day: NaiveDate,
  zone: ViewZone
) -> Vec<&'a CalendarItem> {
  let Ok(window) =
    DayWindow::for_day(day, zone)
  else {
    return Vec::new();
  };
  items
    .iter()
    .filter(|item| window.touches(item))
    .collect()
}

/// Items touching any day of `first..=last`, in input order.
#[must_use]
pub fn items_for_range<'a>(
  items: &'a [CalendarItem],
  first: NaiveDate,
  last: NaiveDate,
  zone: ViewZone
) -> Vec<&'a CalendarItem> {
  let Ok(window) = DayWindow::for_range(
    first, last, zone
  ) else {
    return Vec::new();
  };
  items
    .iter()
    .filter(|item| window.touches(item))
    .collect()
}

/// Starts and ends on different local days.
#[must_use]
pub fn is_span_item(
  item: &CalendarItem,
  zone: ViewZone
) -> bool {
  zone.local_date(&item.start)
    != zone.local_date(&item.end)
}

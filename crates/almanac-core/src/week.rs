use chrono::{
  Datelike,
  Duration,
  NaiveDate
};

use crate::error::{
  CoreError,
  CoreResult
};

pub const DAYS_PER_WEEK: usize = 7;

/// Fails instead of clamping when the result
/// leaves chrono's calendar range.
pub fn add_days(
  date: NaiveDate,
  days: i64
) -> CoreResult<NaiveDate> {
  Duration::try_days(days)
    .and_then(|delta| {
      date.checked_add_signed(delta)
    })
    .ok_or_else(|| {
      CoreError::invalid(
        "date",
        date.to_string(),
        format!(
          "{days:+} days leaves the \
           supported calendar range"
        )
      )
    })
}

/// The Sunday on or before `day`.
pub fn start_of_week(
  day: NaiveDate
) -> CoreResult<NaiveDate> {
  let diff = day
    .weekday()
    .num_days_from_sunday()
    as i64;
  add_days(day, -diff)
}

/// The seven dates of the Sunday-first week containing `anchor`.
pub fn week_of(
  anchor: NaiveDate
) -> CoreResult<[NaiveDate; DAYS_PER_WEEK]>
{
  let start = start_of_week(anchor)?;
  let mut week = [start; DAYS_PER_WEEK];
  for (offset, slot) in
    week.iter_mut().enumerate().skip(1)
  {
    *slot = add_days(start, offset as i64)?;
  }
  Ok(week)
}

/// Week `offset` weeks away from the week containing `today`; the task
/// list pages through weeks this way.
pub fn day_offset_week(
  today: NaiveDate,
  offset: i64
) -> CoreResult<[NaiveDate; DAYS_PER_WEEK]>
{
  week_of(shift_week(today, offset)?)
}

pub fn shift_week(
  cursor: NaiveDate,
  step: i64
) -> CoreResult<NaiveDate> {
  add_days(cursor, step.saturating_mul(7))
}

/// Header text for a week: `January 7-13, 2024` when the week sits in one
/// month, `Jan 28 - Feb 3, 2024` otherwise.
#[must_use]
pub fn format_week_range(
  week: &[NaiveDate; DAYS_PER_WEEK]
) -> String {
  let start = week[0];
  let end = week[DAYS_PER_WEEK - 1];

  if start.month() == end.month()
    && start.year() == end.year()
  {
    format!(
      "{} {}-{}, {}",
      start.format("%B"),
      start.day(),
      end.day(),
      start.year()
    )
  } else {
    format!(
      "{} - {}, {}",
      start.format("%b %-d"),
      end.format("%b %-d"),
      end.year()
    )
  }
}

/// 12-hour label for an hour row.
#[must_use]
pub fn hour_label(hour: u32) -> String {
  match hour {
    | 0 => "12 AM".to_string(),
    | 1..=11 => format!("{hour} AM"),
    | 12 => "12 PM".to_string(),
    | _ => format!("{} PM", hour - 12)
  }
}

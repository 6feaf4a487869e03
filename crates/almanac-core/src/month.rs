use chrono::{
  Datelike,
  NaiveDate
};

use crate::error::{
  CoreError,
  CoreResult
};
use crate::week::{
  DAYS_PER_WEEK,
  add_days,
  start_of_week,
  week_of
};

/// One square of a calendar page.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub struct GridCell {
  pub date:              NaiveDate,
  /// False for the leading/trailing days borrowed from neighbouring
  /// months; those render as inert placeholders.
  pub in_current_period: bool
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthMatrix {
  pub year:        i32,
  /// Zero-based, January is 0.
  pub month_index: u32,
  pub weeks:       Vec<[GridCell; DAYS_PER_WEEK]>
}

impl MonthMatrix {
  pub fn cells(
    &self
  ) -> impl Iterator<Item = &GridCell> {
    self.weeks.iter().flatten()
  }

  pub fn days(
    &self
  ) -> impl Iterator<Item = NaiveDate> + '_
  {
    self.cells().map(|cell| cell.date)
  }

  /// First and last date shown on the page, padding included.
  #[must_use]
  pub fn visible_range(
    &self
  ) -> Option<(NaiveDate, NaiveDate)> {
    let first = self.weeks.first()?[0].date;
    let last = self.weeks.last()?
      [DAYS_PER_WEEK - 1]
      .date;
    Some((first, last))
  }

  #[must_use]
  pub fn title(&self) -> String {
    match NaiveDate::from_ymd_opt(
      self.year,
      self.month_index + 1,
      1
    ) {
      | Some(first) => {
        first.format("%B %Y").to_string()
      }
      | None => format!(
        "{}-{:02}",
        self.year,
        self.month_index + 1
      )
    }
  }
}

/// Builds the page for `month_index` (0-11) of `year`: every Sunday-first
/// week that touches the month, so 4 to 6 rows depending on where the
/// 1st falls.
#[tracing::instrument(level = "trace")]
pub fn build_month_matrix(
  year: i32,
  month_index: u32
) -> CoreResult<MonthMatrix> {
  let month = month_index
    .checked_add(1)
    .unwrap_or(u32::MAX);
  let first =
    first_day_of_month(year, month)?;
  let last =
    last_day_of_month(year, month)?;

  let grid_start = start_of_week(first)?;
  let trailing = 6 - last
    .weekday()
    .num_days_from_sunday()
    as i64;
  let grid_end = add_days(last, trailing)?;

  let total_days = grid_end
    .signed_duration_since(grid_start)
    .num_days()
    + 1;
  let rows = total_days
    / DAYS_PER_WEEK as i64;

  let mut weeks =
    Vec::with_capacity(rows as usize);
  for row in 0..rows {
    let week_start = add_days(
      grid_start,
      row * DAYS_PER_WEEK as i64
    )?;
    weeks.push(week_of(week_start)?.map(
      |date| GridCell {
        date,
        in_current_period: date.year()
          == year
          && date.month() == month
      }
    ));
  }

  tracing::trace!(
    year,
    month,
    rows = weeks.len(),
    "built month matrix"
  );

  Ok(MonthMatrix {
    year,
    month_index,
    weeks
  })
}

/// `month` is one-based here, as chrono counts months.
pub fn first_day_of_month(
  year: i32,
  month: u32
) -> CoreResult<NaiveDate> {
  NaiveDate::from_ymd_opt(year, month, 1)
    .ok_or_else(|| {
      CoreError::invalid(
        "month",
        format!("{year}-{month:02}"),
        "month index must be 0-11"
      )
    })
}

pub fn last_day_of_month(
  year: i32,
  month: u32
) -> CoreResult<NaiveDate> {
  first_day_of_month(year, month)?;
  (28..=31)
    .rev()
    .find_map(|day| {
      NaiveDate::from_ymd_opt(
        year, month, day
      )
    })
    .ok_or_else(|| {
      CoreError::invalid(
        "month",
        format!("{year}-{month:02}"),
        "has no last day"
      )
    })
}

#[must_use]
pub fn days_in_month(
  year: i32,
  month: u32
) -> u32 {
  last_day_of_month(year, month)
    .map(|last| last.day())
    .unwrap_or(0)
}

/// Moves `cursor` by whole months, clamping the day to the target month.
pub fn shift_month(
  cursor: NaiveDate,
  step: i32
) -> CoreResult<NaiveDate> {
  let total = i64::from(cursor.year()) * 12
    + i64::from(cursor.month0())
    + i64::from(step);
  let out_of_range = || {
    CoreError::invalid(
      "month",
      cursor.to_string(),
      format!(
        "{step:+} months leaves the \
         supported calendar range"
      )
    )
  };

  let year =
    i32::try_from(total.div_euclid(12))
      .map_err(|_| out_of_range())?;
  let month = total.rem_euclid(12) as u32 + 1;
  let day = cursor
    .day()
    .min(days_in_month(year, month));
  NaiveDate::from_ymd_opt(year, month, day)
    .ok_or_else(out_of_range)
}

#[must_use]
pub fn weekday_labels()
-> [&'static str; DAYS_PER_WEEK] {
  [
    "Sun", "Mon", "Tue", "Wed", "Thu",
    "Fri", "Sat"
  ]
}

#[cfg(test)]
mod tests {
  use chrono::{
    Datelike,
    NaiveDate,
    Weekday
  };

  use super::*;

  fn date(
    y: i32,
    m: u32,
    d: u32
  ) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d)
      .expect("valid date")
  }

  #[test]
  fn every_month_is_a_clean_grid() {
    for year in [1999, 2000, 2023, 2024, 2100]
    {
      for month_index in 0..12 {
        let matrix = build_month_matrix(
          year,
          month_index
        )
        .expect("matrix");
        let days =
          matrix.days().collect::<Vec<_>>();

        assert!(
          days
            .windows(2)
            .all(|w| w[0] < w[1]),
          "{year}-{month_index} not strictly increasing"
        );
        assert_eq!(
          days[0].weekday(),
          Weekday::Sun
        );
        assert_eq!(
          days.len() % 7,
          0
        );

        let in_month = matrix
          .cells()
          .filter(|c| c.in_current_period)
          .count() as u32;
        assert_eq!(
          in_month,
          days_in_month(
            year,
            month_index + 1
          )
        );
      }
    }
  }

  #[test]
  fn six_week_months_are_not_truncated() {
    // March 2024 starts on a Friday and has 31 days.
    let matrix =
      build_month_matrix(2024, 2)
        .expect("matrix");
    assert_eq!(matrix.weeks.len(), 6);
    assert_eq!(
      matrix.visible_range(),
      Some((
        date(2024, 2, 25),
        date(2024, 4, 6)
      ))
    );
  }

  #[test]
  fn four_week_february() {
    // February 2015 starts on a Sunday and has 28 days.
    let matrix =
      build_month_matrix(2015, 1)
        .expect("matrix");
    assert_eq!(matrix.weeks.len(), 4);
    assert!(
      matrix
        .cells()
        .all(|c| c.in_current_period)
    );
  }

  #[test]
  fn padding_cells_are_real_dates() {
    let matrix =
      build_month_matrix(2024, 0)
        .expect("matrix");
    let first = matrix.weeks[0][0];
    assert_eq!(
      first.date,
      date(2023, 12, 31)
    );
    assert!(!first.in_current_period);
    assert_eq!(
      matrix.title(),
      "January 2024"
    );
  }

  #[test]
  fn rejects_month_index_out_of_range() {
    assert!(
      build_month_matrix(2024, 12).is_err()
    );
  }

  #[test]
  fn shifting_clamps_day() {
    assert_eq!(
      shift_month(date(2024, 1, 31), 1)
        .expect("shift"),
      date(2024, 2, 29)
    );
    assert_eq!(
      shift_month(date(2024, 1, 15), -1)
        .expect("shift"),
      date(2023, 12, 15)
    );
    assert_eq!(
      shift_month(date(2024, 11, 30), 14)
        .expect("shift"),
      date(2026, 1, 30)
    );
    assert_eq!(
      shift_month(date(2024, 3, 31), -25)
        .expect("shift"),
      date(2022, 2, 28)
    );
    assert!(
      shift_month(NaiveDate::MAX, 1).is_err()
    );
  }

  #[test]
  fn months_at_the_calendar_edge() {
    let max_year = NaiveDate::MAX.year();
    assert_eq!(
      last_day_of_month(max_year, 12)
        .expect("last day"),
      NaiveDate::MAX
    );
    assert_eq!(days_in_month(max_year, 12), 31);

    // November still fits, padding included.
    let november =
      build_month_matrix(max_year, 10)
        .expect("matrix");
    let in_month = november
      .cells()
      .filter(|c| c.in_current_period)
      .count();
    assert_eq!(in_month, 30);

    // December's trailing padding would run
    // past the last representable day.
    assert!(
      build_month_matrix(max_year, 11)
        .is_err()
    );
    assert!(
      build_month_matrix(
        NaiveDate::MIN.year(),
        0
      )
      .is_err()
    );
  }
}

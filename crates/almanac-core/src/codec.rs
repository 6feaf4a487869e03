use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{
  DateTime,
  Duration,
  FixedOffset,
  Local,
  LocalResult,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  Offset,
  TimeZone,
  Utc
};
use regex::{
  Captures,
  Regex
};

use crate::error::{
  CoreError,
  CoreResult
};

const DATE_INPUT_FORMAT: &str =
  "%Y-%m-%d";
const TIME_INPUT_FORMAT: &str = "%H:%M";
const STORED_TIMESTAMP_FORMAT: &str =
  "%Y-%m-%dT%H:%M:%S%:z";

const DATE_PATTERN: &str = r"^(?P<year>\d{4})-(?P<month>\d{2})-(?P<day>\d{2})$";
const TIME_PATTERN: &str = r"^(?P<hour>\d{2}):(?P<minute>\d{2})(?::(?P<second>\d{2}))?$";
const OFFSET_PATTERN: &str =
  r"^(?P<sign>[+-])(?P<hours>\d{2}):?(?P<minutes>\d{2})$";
const STEP_PATTERN: &str =
  r"^(?P<sign>[+-])(?P<num>\d+)$";

type CachedRegex = OnceLock<Result<Regex, regex::Error>>;

static DATE_RE: CachedRegex = OnceLock::new();
static TIME_RE: CachedRegex = OnceLock::new();
static OFFSET_RE: CachedRegex = OnceLock::new();
static STEP_RE: CachedRegex = OnceLock::new();

const LEGACY_NAIVE_FORMATS: [&str; 3] = [
  "%Y-%m-%dT%H:%M:%S%.f",
  "%Y-%m-%dT%H:%M",
  "%Y-%m-%d %H:%M:%S%.f"
];

const LOOSE_OFFSET_FORMATS: [&str; 2] = [
  "%Y-%m-%dT%H:%M:%S%.f%#z",
  "%Y-%m-%d %H:%M:%S%.f%#z"
];

/// The zone wall-clock input is interpreted in.
///
/// `System` follows the host's current UTC offset, including DST
/// transitions. `Fixed` pins a single offset and is what tests and the
/// `timezone.offset` setting use.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Default,
)]
pub enum ViewZone {
  #[default]
  System,
  Fixed(FixedOffset)
}

impl ViewZone {
  pub fn fixed(
    raw: &str
  ) -> CoreResult<Self> {
    parse_offset(raw).map(Self::Fixed)
  }

  /// Resolves a wall-clock time to an instant in this zone.
  ///
  /// Ambiguous times (clocks turned back) take the earlier instant.
  /// Times inside a spring-forward gap move forward by one hour.
  pub fn resolve(
    &self,
    naive: NaiveDateTime
  ) -> CoreResult<DateTime<FixedOffset>> {
    match self {
      | Self::Fixed(offset) => {
        offset
          .from_local_datetime(&naive)
          .single()
          .ok_or_else(|| {
            CoreError::invalid(
              "datetime",
              naive.to_string(),
              "outside the representable range"
            )
          })
      }
      | Self::System => {
        resolve_system_local(naive)
      }
    }
  }

  /// Wall-clock reading of an instant in this zone.
  #[must_use]
  pub fn localize(
    &self,
    instant: &DateTime<FixedOffset>
  ) -> NaiveDateTime {
    match self {
      | Self::Fixed(offset) => {
        instant
          .with_timezone(offset)
          .naive_local()
      }
      | Self::System => {
        instant
          .with_timezone(&Local)
          .naive_local()
      }
    }
  }

  #[must_use]
  pub fn local_date(
    &self,
    instant: &DateTime<FixedOffset>
  ) -> NaiveDate {
    self.localize(instant).date()
  }

  #[must_use]
  pub fn today(&self) -> NaiveDate {
    let now = Utc::now().fixed_offset();
    self.local_date(&now)
  }

  /// Offset label such as `+05:30`, or `local` for the system zone.
  #[must_use]
  pub fn describe(&self) -> String {
    match self {
      | Self::Fixed(offset) => {
        format_offset(*offset)
      }
      | Self::System => {
        format!(
          "local ({})",
          format_offset(
            Local::now().offset().fix()
          )
        )
      }
    }
  }
}

fn resolve_system_local(
  naive: NaiveDateTime
) -> CoreResult<DateTime<FixedOffset>> {
  match Local.from_local_datetime(&naive)
  {
    | LocalResult::Single(local_dt) => {
      Ok(local_dt.fixed_offset())
    }
    | LocalResult::Ambiguous(
      first,
      second
    ) => {
      tracing::debug!(
        first = %first,
        second = %second,
        "ambiguous local datetime; using earliest"
      );
      let chosen = if first <= second {
        first
      } else {
        second
      };
      Ok(chosen.fixed_offset())
    }
    | LocalResult::None => {
      let shifted = naive
        .checked_add_signed(
          Duration::hours(1)
        )
        .ok_or_else(|| {
          CoreError::invalid(
            "datetime",
            naive.to_string(),
            "outside the representable range"
          )
        })?;
      tracing::debug!(
        requested = %naive,
        shifted = %shifted,
        "local datetime falls in a DST gap; moving forward"
      );
      Local
        .from_local_datetime(&shifted)
        .earliest()
        .map(|dt| dt.fixed_offset())
        .ok_or_else(|| {
          CoreError::invalid(
            "datetime",
            naive.to_string(),
            "does not exist in the local timezone"
          )
        })
    }
  }
}

/// Encodes a `YYYY-MM-DD` + `HH:MM` form pair as a stored timestamp
/// (`YYYY-MM-DDTHH:MM:SS±HH:MM`) using the zone's offset at that moment.
pub fn encode_local(
  date: &str,
  time: &str,
  zone: ViewZone
) -> CoreResult<String> {
  let instant =
    local_instant(date, time, zone)?;
  Ok(format_instant(&instant))
}

/// Same as [`encode_local`] but returns the instant instead of its
/// string form.
pub fn local_instant(
  date: &str,
  time: &str,
  zone: ViewZone
) -> CoreResult<DateTime<FixedOffset>> {
  let date = parse_date(date)?;
  let time = parse_time(time)?;
  zone.resolve(date.and_time(time))
}

/// Splits a stored timestamp back into the date and time fields a user in
/// `zone` would have typed.
pub fn decode_local(
  timestamp: &str,
  zone: ViewZone
) -> CoreResult<(String, String)> {
  let instant =
    parse_instant(timestamp, zone)?;
  let local = zone.localize(&instant);
  Ok((
    local
      .format(DATE_INPUT_FORMAT)
      .to_string(),
    local
      .format(TIME_INPUT_FORMAT)
      .to_string()
  ))
}

#[must_use]
pub fn format_instant(
  instant: &DateTime<FixedOffset>
) -> String {
  instant
    .format(STORED_TIMESTAMP_FORMAT)
    .to_string()
}

/// Parses a stored timestamp.
///
/// Offset-annotated values (`+05:30`, `Z`, `+00`) are taken as-is. Older
/// rows were written without any offset; those are read as wall-clock time
/// in `zone`.
pub fn parse_instant(
  raw: &str,
  zone: ViewZone
) -> CoreResult<DateTime<FixedOffset>> {
  let trimmed = raw.trim();

  if let Ok(parsed) =
    DateTime::parse_from_rfc3339(trimmed)
  {
    return Ok(parsed);
  }

  for fmt in LOOSE_OFFSET_FORMATS {
    if let Ok(parsed) =
      DateTime::parse_from_str(
        trimmed, fmt
      )
    {
      return Ok(parsed);
    }
  }

  for fmt in LEGACY_NAIVE_FORMATS {
    if let Ok(naive) =
      NaiveDateTime::parse_from_str(
        trimmed, fmt
      )
    {
      tracing::trace!(
        input = trimmed,
        "timestamp has no offset; reading as wall-clock time"
      );
      return zone.resolve(naive);
    }
  }

  Err(CoreError::invalid(
    "timestamp",
    trimmed,
    "expected YYYY-MM-DDTHH:MM:SS±HH:MM"
  ))
}

pub fn parse_date(
  raw: &str
) -> CoreResult<NaiveDate> {
  let trimmed = raw.trim();
  let caps = captures(
    &DATE_RE,
    DATE_PATTERN,
    trimmed
  )?
  .ok_or_else(|| {
    CoreError::invalid(
      "date",
      trimmed,
      "expected YYYY-MM-DD"
    )
  })?;

  let year = number::<i32>(&caps, "year");
  let month = number::<u32>(&caps, "month");
  let day = number::<u32>(&caps, "day");
  year
    .zip(month)
    .zip(day)
    .and_then(|((y, m), d)| {
      NaiveDate::from_ymd_opt(y, m, d)
    })
    .ok_or_else(|| {
      CoreError::invalid(
        "date",
        trimmed,
        "no such calendar day"
      )
    })
}

/// `HH:MM` or `HH:MM:SS`.
pub fn parse_time(
  raw: &str
) -> CoreResult<NaiveTime> {
  let trimmed = raw.trim();
  let caps = captures(
    &TIME_RE,
    TIME_PATTERN,
    trimmed
  )?
  .ok_or_else(|| {
    CoreError::invalid(
      "time",
      trimmed,
      "expected HH:MM"
    )
  })?;

  let hour = number::<u32>(&caps, "hour");
  let minute =
    number::<u32>(&caps, "minute");
  let second = match caps.name("second") {
    | Some(_) => {
      number::<u32>(&caps, "second")
    }
    | None => Some(0)
  };
  hour
    .zip(minute)
    .zip(second)
    .and_then(|((h, m), s)| {
      NaiveTime::from_hms_opt(h, m, s)
    })
    .ok_or_else(|| {
      CoreError::invalid(
        "time",
        trimmed,
        "hour must be 00-23 and minute 00-59"
      )
    })
}

/// Parses `+HH:MM`, `-HH:MM`, `+HHMM`, `Z` or `UTC`.
pub fn parse_offset(
  raw: &str
) -> CoreResult<FixedOffset> {
  let trimmed = raw.trim();
  let invalid = || {
    CoreError::invalid(
      "offset",
      trimmed,
      "expected ±HH:MM"
    )
  };

  if trimmed.eq_ignore_ascii_case("z")
    || trimmed
      .eq_ignore_ascii_case("utc")
  {
    return FixedOffset::east_opt(0)
      .ok_or_else(invalid);
  }

  let caps = captures(
    &OFFSET_RE,
    OFFSET_PATTERN,
    trimmed
  )?
  .ok_or_else(invalid)?;

  let sign = match caps
    .name("sign")
    .map(|m| m.as_str())
  {
    | Some("-") => -1,
    | _ => 1
  };
  let hours = number::<i32>(&caps, "hours")
    .ok_or_else(invalid)?;
  let minutes =
    number::<i32>(&caps, "minutes")
      .ok_or_else(invalid)?;
  if hours > 14 || minutes > 59 {
    return Err(invalid());
  }

  FixedOffset::east_opt(
    sign * (hours * 3600 + minutes * 60)
  )
  .ok_or_else(invalid)
}

/// Reads a signed navigation step such as
/// `+1` or `-3`. Unsigned input is not a
/// step and yields `None`.
pub fn parse_step(
  raw: &str
) -> CoreResult<Option<i64>> {
  let trimmed = raw.trim();
  let Some(caps) = captures(
    &STEP_RE,
    STEP_PATTERN,
    trimmed
  )?
  else {
    return Ok(None);
  };

  let num = number::<i64>(&caps, "num")
    .ok_or_else(|| {
      CoreError::invalid(
        "step",
        trimmed,
        "amount is too large"
      )
    })?;
  match caps
    .name("sign")
    .map(|m| m.as_str())
  {
    | Some("-") => Ok(Some(-num)),
    | _ => Ok(Some(num))
  }
}

fn captures<'t>(
  cell: &'static CachedRegex,
  pattern: &str,
  text: &'t str
) -> CoreResult<Option<Captures<'t>>> {
  let re = cell
    .get_or_init(|| Regex::new(pattern))
    .as_ref()
    .map_err(|e| {
      CoreError::Pattern(e.clone())
    })?;
  Ok(re.captures(text))
}

fn number<T: FromStr>(
  caps: &Captures<'_>,
  name: &str
) -> Option<T> {
  caps
    .name(name)?
    .as_str()
    .parse::<T>()
    .ok()
}

#[must_use]
pub fn format_offset(
  offset: FixedOffset
) -> String {
  let total =
    offset.local_minus_utc() / 60;
  let sign = if total < 0 { '-' } else { '+' };
  let total = total.abs();
  format!(
    "{sign}{:02}:{:02}",
    total / 60,
    total % 60
  )
}

#[cfg(test)]
mod tests {
  use chrono::FixedOffset;

  use super::{
    ViewZone,
    decode_local,
    encode_local,
    format_offset,
    parse_instant,
    parse_offset,
    parse_step,
    parse_time
  };
  use crate::error::CoreError;

  fn zone(seconds: i32) -> ViewZone {
    ViewZone::Fixed(
      FixedOffset::east_opt(seconds)
        .expect("valid offset")
    )
  }

  #[test]
  fn encodes_with_explicit_offset() {
    let encoded = encode_local(
      "2024-01-10",
      "22:00",
      zone(-5 * 3600)
    )
    .expect("encode");
    assert_eq!(
      encoded,
      "2024-01-10T22:00:00-05:00"
    );
  }

  #[test]
  fn utc_offset_is_written_numerically()
  {
    let encoded = encode_local(
      "2024-06-01",
      "08:15",
      zone(0)
    )
    .expect("encode");
    assert_eq!(
      encoded,
      "2024-06-01T08:15:00+00:00"
    );
  }

  #[test]
  fn round_trips_across_offsets() {
    let offsets = [
      -12 * 3600,
      -(9 * 3600 + 30 * 60),
      -3600,
      0,
      3600,
      5 * 3600 + 30 * 60,
      5 * 3600 + 45 * 60,
      12 * 3600 + 45 * 60,
      14 * 3600
    ];
    let pairs = [
      ("2024-02-29", "00:00"),
      ("2023-12-31", "23:59"),
      ("1999-07-04", "12:30"),
      ("2030-03-10", "02:30")
    ];

    for seconds in offsets {
      for (date, time) in pairs {
        let z = zone(seconds);
        let encoded =
          encode_local(date, time, z)
            .expect("encode");
        let decoded =
          decode_local(&encoded, z)
            .expect("decode");
        assert_eq!(
          decoded,
          (
            date.to_string(),
            time.to_string()
          ),
          "offset {seconds}s, stored {encoded}"
        );
      }
    }
  }

  #[test]
  fn preserves_half_hour_offsets() {
    let encoded = encode_local(
      "2024-03-05",
      "09:00",
      zone(5 * 3600 + 30 * 60)
    )
    .expect("encode");
    assert!(encoded.ends_with("+05:30"));
  }

  #[test]
  fn decoding_does_not_shift_into_utc() {
    let decoded = decode_local(
      "2024-01-10T22:00:00-05:00",
      zone(-5 * 3600)
    )
    .expect("decode");
    assert_eq!(
      decoded,
      (
        "2024-01-10".to_string(),
        "22:00".to_string()
      )
    );
  }

  #[test]
  fn decodes_into_viewer_zone() {
    let decoded = decode_local(
      "2024-01-10T22:00:00-05:00",
      zone(3600)
    )
    .expect("decode");
    assert_eq!(
      decoded,
      (
        "2024-01-11".to_string(),
        "04:00".to_string()
      )
    );
  }

  #[test]
  fn rejects_malformed_inputs() {
    let z = zone(0);
    for (date, time) in [
      ("2024-1-10", "10:00"),
      ("2024-13-01", "10:00"),
      ("2023-02-29", "10:00"),
      ("abcd-ef-gh", "10:00"),
      ("2024-01-10", "24:00"),
      ("2024-01-10", "10:60"),
      ("2024-01-10", "10am"),
      ("", "")
    ] {
      let err = encode_local(date, time, z)
        .expect_err("should fail");
      assert!(
        matches!(
          err,
          CoreError::InvalidInput { .. }
        ),
        "{date} {time}: {err}"
      );
    }
  }

  #[test]
  fn reads_legacy_naive_timestamps() {
    let z = zone(2 * 3600);
    let parsed =
      parse_instant("2024-05-01T09:30", z)
        .expect("legacy");
    assert_eq!(
      parsed.to_rfc3339(),
      "2024-05-01T09:30:00+02:00"
    );
  }

  #[test]
  fn reads_database_style_offsets() {
    let parsed = parse_instant(
      "2024-05-01 09:30:00+00",
      ViewZone::System
    )
    .expect("short offset");
    assert_eq!(
      parsed.to_rfc3339(),
      "2024-05-01T09:30:00+00:00"
    );
  }

  #[test]
  fn parses_offsets() {
    assert_eq!(
      format_offset(
        parse_offset("+05:45")
          .expect("offset")
      ),
      "+05:45"
    );
    assert_eq!(
      format_offset(
        parse_offset("-0930")
          .expect("offset")
      ),
      "-09:30"
    );
    assert_eq!(
      format_offset(
        parse_offset("Z").expect("utc")
      ),
      "+00:00"
    );
    assert!(parse_offset("+5").is_err());
    assert!(parse_offset("05:00").is_err());
  }

  #[test]
  fn times_accept_optional_seconds() {
    let time = parse_time("07:05:30")
      .expect("seconds");
    assert_eq!(
      time.format("%H:%M:%S").to_string(),
      "07:05:30"
    );
    assert!(parse_time("7:05").is_err());
    assert!(parse_time("07:05:").is_err());
    assert!(parse_time("07:05:61").is_err());
  }

  #[test]
  fn steps_need_an_explicit_sign() {
    assert_eq!(
      parse_step("+3").expect("step"),
      Some(3)
    );
    assert_eq!(
      parse_step("-12").expect("step"),
      Some(-12)
    );
    assert_eq!(
      parse_step("3").expect("plain"),
      None
    );
    assert_eq!(
      parse_step("2024-01").expect("month"),
      None
    );
    assert_eq!(
      parse_step("+1w").expect("unit"),
      None
    );
    assert!(
      parse_step("+99999999999999999999")
        .is_err()
    );
  }
}

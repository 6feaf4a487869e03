//! Vertical placement of timed items inside a 24-row day column.

use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, Timelike};

use crate::codec::ViewZone;
use crate::error::CoreError;
use crate::item::CalendarItem;
use crate::span::items_for_day;

pub const HOURS_PER_DAY: u32 = 24;
pub const DEFAULT_ROW_HEIGHT_PX: f64 = 64.0;
pub const DEFAULT_MIN_HEIGHT_PX: f64 = 20.0;

const MINUTES_PER_DAY: f64 = 1440.0;

/// What happens to an item that runs past midnight of the day it is drawn in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SpanPolicy {
    /// The block keeps its full length and extends below the last row.
    #[default]
    Overflow,
    /// The block stops at 24:00.
    ClampToDay,
}

impl FromStr for SpanPolicy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overflow" => Ok(Self::Overflow),
            "clamp" | "clamp_to_day" => Ok(Self::ClampToDay),
            other => Err(CoreError::invalid(
                "span policy",
                other,
                "expected overflow or clamp",
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridMetrics {
    pub row_height_px: f64,
    /// Floor so that very short or zero-length items stay clickable.
    pub min_height_px: f64,
    pub span_policy: SpanPolicy,
}

impl Default for GridMetrics {
    fn default() -> Self {
        Self {
            row_height_px: DEFAULT_ROW_HEIGHT_PX,
            min_height_px: DEFAULT_MIN_HEIGHT_PX,
            span_policy: SpanPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub top_px: f64,
    pub height_px: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowSpan {
    pub start_row: u32,
    pub row_span: u32,
}

impl Placement {
    /// Hour rows covered by the block. A block always covers at least one row.
    pub fn rows(&self, row_height_px: f64) -> RowSpan {
        if row_height_px <= 0.0 {
            return RowSpan {
                start_row: 0,
                row_span: 1,
            };
        }
        let start = (self.top_px / row_height_px).floor().max(0.0);
        let end = ((self.top_px + self.height_px) / row_height_px).ceil();
        let span = (end - start).max(1.0);
        RowSpan {
            start_row: start as u32,
            row_span: span as u32,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionedItem<'a> {
    pub item: &'a CalendarItem,
    pub placement: Placement,
}

/// Places `item` in the column of the day it starts on.
pub fn layout(item: &CalendarItem, zone: ViewZone, metrics: &GridMetrics) -> Placement {
    let anchor = zone.local_date(&item.start);
    let start = minutes_from(anchor, &item.start, zone);
    let end = minutes_from(anchor, &item.end, zone);
    place(start, end, metrics)
}

/// Places `item` in the column for `day`. Continuation days of a
/// multi-day item start at the top row. `None` when the item is not
/// shown on `day` at all.
pub fn layout_for_day(
    item: &CalendarItem,
    day: NaiveDate,
    zone: ViewZone,
    metrics: &GridMetrics,
) -> Option<Placement> {
    if !crate::span::occurs_on(item, day, zone) {
        return None;
    }
    let start = minutes_from(day, &item.start, zone).max(0.0);
    let end = minutes_from(day, &item.end, zone);
    Some(place(start, end, metrics))
}

/// Every item shown on `day`, positioned, in input order.
pub fn day_column<'a>(
    items: &'a [CalendarItem],
    day: NaiveDate,
    zone: ViewZone,
    metrics: &GridMetrics,
) -> Vec<PositionedItem<'a>> {
    items_for_day(items, day, zone)
        .into_iter()
        .filter_map(|item| {
            layout_for_day(item, day, zone, metrics)
                .map(|placement| PositionedItem { item, placement })
        })
        .collect()
}

fn place(start_minutes: f64, end_minutes: f64, metrics: &GridMetrics) -> Placement {
    let end_minutes = match metrics.span_policy {
        SpanPolicy::Overflow => end_minutes,
        SpanPolicy::ClampToDay => end_minutes.min(MINUTES_PER_DAY),
    };
    let row = metrics.row_height_px;
    let top_px = start_minutes / 60.0 * row;
    let duration_hours = (end_minutes - start_minutes) / 60.0;
    let height_px = (duration_hours * row).max(metrics.min_height_px);

    Placement { top_px, height_px }
}

/// Minutes between local midnight of `anchor` and `instant`; negative
/// for instants on earlier days, above 1440 for later ones.
fn minutes_from(anchor: NaiveDate, instant: &DateTime<FixedOffset>, zone: ViewZone) -> f64 {
    let local = zone.localize(instant);
    let day_shift = local.date().signed_duration_since(anchor).num_days() as f64;
    let of_day = f64::from(local.time().num_seconds_from_midnight()) / 60.0;
    day_shift * MINUTES_PER_DAY + of_day
}

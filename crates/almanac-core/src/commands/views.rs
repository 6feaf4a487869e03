use std::io;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use tracing::{debug, info, instrument};

use super::load_items;
use crate::codec;
use crate::datastore::{ItemQuery, ItemStore};
use crate::error::CoreResult;
use crate::item::CalendarItem;
use crate::month::{build_month_matrix, shift_month};
use crate::render::Renderer;
use crate::session::Session;
use crate::span::items_for_range;
use crate::week::{add_days, day_offset_week, shift_week, week_of};

#[instrument(skip(store, session, renderer, args))]
pub(super) fn cmd_month<S: ItemStore>(
    store: &S,
    session: &Session,
    renderer: &Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command month");
    let zone = renderer.settings().zone;
    let today = zone.today();

    let cursor = match args.first() {
        None => today,
        Some(arg) => match codec::parse_step(arg)? {
            Some(step) => {
                let step = i32::try_from(step)
                    .with_context(|| format!("month step out of range: {arg}"))?;
                shift_month(today, step)?
            }
            None => codec::parse_date(&format!("{arg}-01"))
                .with_context(|| format!("month: expected YYYY-MM, got '{arg}'"))?,
        },
    };

    let matrix = build_month_matrix(cursor.year(), cursor.month0())?;
    let (first, last) = matrix
        .visible_range()
        .ok_or_else(|| anyhow!("empty month grid for {}", matrix.title()))?;

    let items = load_items(store, session, &ItemQuery::active(), renderer)?;
    let visible = owned(items_for_range(&items, first, last, zone));
    debug!(rows = matrix.weeks.len(), count = visible.len(), "rendering month");

    renderer.write_month(io::stdout().lock(), &matrix, &visible, today)
}

#[instrument(skip(store, session, renderer, args))]
pub(super) fn cmd_week<S: ItemStore>(
    store: &S,
    session: &Session,
    renderer: &Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command week");
    let zone = renderer.settings().zone;
    let today = zone.today();
    let anchor = parse_anchor(args.first(), today, shift_week)?;
    let week = week_of(anchor)?;

    let items = load_items(store, session, &ItemQuery::active(), renderer)?;
    let visible = owned(items_for_range(&items, week[0], week[6], zone));

    renderer.write_week(io::stdout().lock(), &week, &visible, today)
}

#[instrument(skip(store, session, renderer, args))]
pub(super) fn cmd_day<S: ItemStore>(
    store: &S,
    session: &Session,
    renderer: &Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command day");
    let zone = renderer.settings().zone;
    let day = parse_anchor(args.first(), zone.today(), add_days)?;

    let items = load_items(store, session, &ItemQuery::active(), renderer)?;
    let visible = owned(items_for_range(&items, day, day, zone));

    renderer.write_day(io::stdout().lock(), day, &visible)
}

/// Upcoming items: anything not yet over. `list all` includes past and
/// archived items too.
#[instrument(skip(store, session, renderer, args, now))]
pub(super) fn cmd_list<S: ItemStore>(
    store: &S,
    session: &Session,
    renderer: &Renderer,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command list");
    let show_all = match args {
        [] => false,
        [flag] if flag == "all" => true,
        _ => return Err(anyhow!("usage: almanac list [all]")),
    };

    let query = if show_all {
        ItemQuery::active().including_archived()
    } else {
        ItemQuery::active()
    };
    let mut items = load_items(store, session, &query, renderer)?;
    if !show_all {
        items.retain(|item| item.end >= now);
    }

    if items.is_empty() {
        println!("No items.");
        return Ok(());
    }
    renderer.write_item_table(io::stdout().lock(), &items)?;
    println!("\n{} item(s).", items.len());
    Ok(())
}

/// Tasks falling in the week `WEEK_OFFSET` weeks from the current one.
#[instrument(skip(store, session, renderer, args))]
pub(super) fn cmd_tasks<S: ItemStore>(
    store: &S,
    session: &Session,
    renderer: &Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command tasks");
    let zone = renderer.settings().zone;
    let offset = match args.first() {
        None => 0,
        Some(arg) => arg
            .trim_start_matches('+')
            .parse::<i64>()
            .with_context(|| format!("tasks: week offset must be an integer, got '{arg}'"))?,
    };

    let today = zone.today();
    let week = day_offset_week(today, offset)?;
    let items = load_items(store, session, &ItemQuery::tasks(), renderer)?;
    let in_week = owned(items_for_range(&items, week[0], week[6], zone));
    debug!(count = in_week.len(), "rendering task week");

    renderer.write_tasks(io::stdout().lock(), &week, &in_week, today)
}

/// A date, a `+N`/`-N` step from `today`, or nothing for `today` itself.
fn parse_anchor(
    arg: Option<&String>,
    today: NaiveDate,
    step_by: impl Fn(NaiveDate, i64) -> CoreResult<NaiveDate>,
) -> anyhow::Result<NaiveDate> {
    let Some(arg) = arg else {
        return Ok(today);
    };
    if let Some(step) = codec::parse_step(arg)? {
        return Ok(step_by(today, step)?);
    }
    Ok(codec::parse_date(arg)?)
}

fn owned(items: Vec<&CalendarItem>) -> Vec<CalendarItem> {
    items.into_iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn anchors_accept_dates_and_steps() {
        let today = date(2024, 1, 10);
        assert_eq!(parse_anchor(None, today, shift_week).expect("none"), today);
        assert_eq!(
            parse_anchor(Some(&"+1".to_string()), today, shift_week).expect("next"),
            date(2024, 1, 17)
        );
        assert_eq!(
            parse_anchor(Some(&"-2".to_string()), today, add_days).expect("prev"),
            date(2024, 1, 8)
        );
        assert_eq!(
            parse_anchor(Some(&"2024-03-05".to_string()), today, add_days).expect("date"),
            date(2024, 3, 5)
        );
        assert!(parse_anchor(Some(&"soon".to_string()), today, add_days).is_err());
        assert!(
            parse_anchor(Some(&"-1".to_string()), NaiveDate::MIN, shift_week).is_err()
        );
    }
}

use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::NaiveDate;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::aggregate::{group_by_day, visible_slice};
use crate::config::{Config, ViewSettings};
use crate::importance::{Importance, ItemStatus};
use crate::item::CalendarItem;
use crate::layout::{HOURS_PER_DAY, day_column};
use crate::month::{MonthMatrix, weekday_labels};
use crate::span::is_span_item;
use crate::week::{DAYS_PER_WEEK, format_week_range, hour_label};

const MONTH_CELL_WIDTH: usize = 14;
const SHORT_ID_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
    settings: ViewSettings,
}

impl Renderer {
    pub fn new(cfg: &Config, settings: ViewSettings) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => io::stdout().is_terminal(),
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self { color, settings })
    }

    /// Renderer that never emits escape codes.
    pub fn plain(settings: ViewSettings) -> Self {
        Self {
            color: false,
            settings,
        }
    }

    pub fn settings(&self) -> &ViewSettings {
        &self.settings
    }

    /// Month page: one column per weekday, at most `max_visible` titles per
    /// cell and a `+N more` line for the rest.
    #[tracing::instrument(skip(self, out, matrix, items))]
    pub fn write_month<W: Write>(
        &self,
        mut out: W,
        matrix: &MonthMatrix,
        items: &[CalendarItem],
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let zone = self.settings.zone;
        writeln!(out, "{}", matrix.title())?;

        let header = weekday_labels()
            .iter()
            .map(|label| pad(label, MONTH_CELL_WIDTH))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(out, "{}", header.trim_end())?;

        for week in &matrix.weeks {
            let buckets = group_by_day(items, week.iter().map(|cell| cell.date), zone);
            let slices = buckets
                .iter()
                .map(|(_, bucket)| visible_slice(bucket, self.settings.max_visible))
                .collect::<Vec<_>>();

            let numbers = week
                .iter()
                .map(|cell| {
                    let text = if cell.in_current_period {
                        cell.date.format("%e").to_string()
                    } else {
                        String::new()
                    };
                    let text = pad(&text, MONTH_CELL_WIDTH);
                    if cell.date == today {
                        self.paint(&text, "7")
                    } else {
                        text
                    }
                })
                .collect::<Vec<_>>();
            writeln!(out, "{}", numbers.join(" ").trim_end())?;

            let lines = slices
                .iter()
                .map(|slice| slice.shown.len() + usize::from(slice.overflow > 0))
                .max()
                .unwrap_or(0);

            for line in 0..lines {
                let row = week
                    .iter()
                    .zip(&slices)
                    .map(|(cell, slice)| {
                        if !cell.in_current_period {
                            return pad("", MONTH_CELL_WIDTH);
                        }
                        if let Some(item) = slice.shown.get(line) {
                            let text = pad(
                                &fit(item.display_title(), MONTH_CELL_WIDTH),
                                MONTH_CELL_WIDTH,
                            );
                            self.paint(&text, item.importance.ansi_code())
                        } else if line == slice.shown.len()
                            && let Some(more) = slice.overflow_label()
                        {
                            pad(&more, MONTH_CELL_WIDTH)
                        } else {
                            pad("", MONTH_CELL_WIDTH)
                        }
                    })
                    .collect::<Vec<_>>();
                writeln!(out, "{}", row.join(" ").trim_end())?;
            }
            writeln!(out)?;
        }

        Ok(())
    }

    /// Week header plus, per day, each item with its time-grid placement.
    #[tracing::instrument(skip(self, out, week, items))]
    pub fn write_week<W: Write>(
        &self,
        mut out: W,
        week: &[NaiveDate; DAYS_PER_WEEK],
        items: &[CalendarItem],
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let zone = self.settings.zone;
        let metrics = &self.settings.metrics;
        writeln!(out, "{}", format_week_range(week))?;

        for day in week {
            let heading = day.format("%a %b %-d").to_string();
            if *day == today {
                writeln!(out, "\n{}", self.paint(&heading, "1"))?;
            } else {
                writeln!(out, "\n{heading}")?;
            }

            let column = day_column(items, *day, zone, metrics);
            if column.is_empty() {
                writeln!(out, "  -")?;
                continue;
            }

            for positioned in column {
                let item = positioned.item;
                let rows = positioned.placement.rows(metrics.row_height_px);
                writeln!(
                    out,
                    "  {} {} {} (top {:.0}px, height {:.0}px, rows {}+{})",
                    self.time_range(item),
                    item.status().marker(),
                    self.paint(item.display_title(), item.importance.ansi_code()),
                    positioned.placement.top_px,
                    positioned.placement.height_px,
                    rows.start_row,
                    rows.row_span,
                )?;
            }
        }

        Ok(())
    }

    /// One section per day of the week: weekday, short date, a `Today`
    /// badge and the tasks starting that day.
    #[tracing::instrument(skip(self, out, week, tasks))]
    pub fn write_tasks<W: Write>(
        &self,
        mut out: W,
        week: &[NaiveDate; DAYS_PER_WEEK],
        tasks: &[CalendarItem],
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let zone = self.settings.zone;
        writeln!(out, "Tasks for {}", format_week_range(week))?;

        for (day, bucket) in group_by_day(tasks, week.iter().copied(), zone) {
            let heading = format!("{} {}", day.format("%A"), day.format("%b %-d"));
            if day == today {
                writeln!(out, "\n{} {}", self.paint(&heading, "1"), self.paint("[Today]", "7"))?;
            } else {
                writeln!(out, "\n{heading}")?;
            }

            let starting = bucket
                .into_iter()
                .filter(|task| zone.local_date(&task.start) == day)
                .collect::<Vec<_>>();
            if starting.is_empty() {
                writeln!(out, "  No tasks.")?;
                continue;
            }

            for task in starting {
                writeln!(
                    out,
                    "  {} {} {} ({})",
                    task.status().marker(),
                    self.time_range(task),
                    self.paint(task.display_title(), task.importance.ansi_code()),
                    short_id(&task.id),
                )?;
            }
        }

        Ok(())
    }

    /// Twenty-four hour rows; an item's title sits on its first row and a
    /// bar marks the rows it continues through.
    #[tracing::instrument(skip(self, out, items))]
    pub fn write_day<W: Write>(
        &self,
        mut out: W,
        day: NaiveDate,
        items: &[CalendarItem],
    ) -> anyhow::Result<()> {
        let metrics = &self.settings.metrics;
        let column = day_column(items, day, self.settings.zone, metrics);
        let spans = column
            .iter()
            .map(|positioned| (positioned.item, positioned.placement.rows(metrics.row_height_px)))
            .collect::<Vec<_>>();

        writeln!(out, "{}", day.format("%A, %B %-d, %Y"))?;

        for hour in 0..HOURS_PER_DAY {
            let mut cells = Vec::new();
            for (item, rows) in &spans {
                let end_row = rows.start_row.saturating_add(rows.row_span);
                if rows.start_row == hour {
                    cells.push(format!(
                        "{} {}",
                        item.status().marker(),
                        self.paint(item.display_title(), item.importance.ansi_code())
                    ));
                } else if rows.start_row < hour && hour < end_row {
                    cells.push(format!("| {}", item.display_title()));
                }
            }
            let line = format!("{:>5} | {}", hour_label(hour), cells.join("  "));
            writeln!(out, "{}", line.trim_end())?;
        }

        let overflowing = spans
            .iter()
            .filter(|(_, rows)| rows.start_row.saturating_add(rows.row_span) > HOURS_PER_DAY)
            .count();
        if overflowing > 0 {
            writeln!(out, "      ({overflowing} continuing past midnight)")?;
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, out, items))]
    pub fn write_item_table<W: Write>(
        &self,
        out: W,
        items: &[CalendarItem],
    ) -> anyhow::Result<()> {
        let zone = self.settings.zone;
        let headers = vec![
            "ID".to_string(),
            "Start".to_string(),
            "End".to_string(),
            "St".to_string(),
            "Imp".to_string(),
            "Title".to_string(),
        ];

        let rows = items
            .iter()
            .map(|item| {
                vec![
                    self.paint(short_id(&item.id), "33"),
                    zone.localize(&item.start).format("%Y-%m-%d %H:%M").to_string(),
                    zone.localize(&item.end).format("%Y-%m-%d %H:%M").to_string(),
                    item.status().marker().to_string(),
                    self.paint(item.importance.label(), item.importance.ansi_code()),
                    item.display_title().to_string(),
                ]
            })
            .collect::<Vec<_>>();

        write_table(out, headers, rows)
    }

    #[tracing::instrument(skip(self, out, item))]
    pub fn write_item_info<W: Write>(&self, mut out: W, item: &CalendarItem) -> anyhow::Result<()> {
        let zone = self.settings.zone;

        writeln!(out, "id          {}", item.id)?;
        writeln!(out, "title       {}", item.display_title())?;
        writeln!(out, "kind        {}", status_name(item.status()))?;
        writeln!(out, "start       {}", zone.localize(&item.start).format("%Y-%m-%d %H:%M"))?;
        writeln!(out, "end         {}", zone.localize(&item.end).format("%Y-%m-%d %H:%M"))?;
        writeln!(out, "stored      {} .. {}", item.start.to_rfc3339(), item.end.to_rfc3339())?;
        writeln!(out, "importance  {}", importance_name(item.importance))?;
        if let Some(description) = &item.description {
            writeln!(out, "description {description}")?;
        }
        writeln!(out, "created     {}", item.created_at.format("%Y-%m-%dT%H:%M:%SZ"))?;
        writeln!(out, "modified    {}", item.updated_at.format("%Y-%m-%dT%H:%M:%SZ"))?;

        Ok(())
    }

    fn time_range(&self, item: &CalendarItem) -> String {
        let zone = self.settings.zone;
        let start = zone.localize(&item.start);
        let end = zone.localize(&item.end);
        if is_span_item(item, zone) {
            format!("{}-{}", start.format("%b %-d %H:%M"), end.format("%b %-d %H:%M"))
        } else {
            format!("{}-{}", start.format("%H:%M"), end.format("%H:%M"))
        }
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color || code.is_empty() {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

pub fn short_id(id: &str) -> &str {
    id.char_indices()
        .nth(SHORT_ID_LEN)
        .map_or(id, |(idx, _)| &id[..idx])
}

fn status_name(status: ItemStatus) -> &'static str {
    match status {
        ItemStatus::Event => "event",
        ItemStatus::OpenTask => "task (open)",
        ItemStatus::CompletedTask => "task (done)",
        ItemStatus::Archived => "archived",
    }
}

fn importance_name(importance: Importance) -> &'static str {
    match importance {
        Importance::None => "none",
        other => other.label(),
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

/// Truncates to `width` display columns, marking the cut with `~`.
fn fit(text: &str, width: usize) -> String {
    if UnicodeWidthStr::width(text) <= width {
        return text.to_string();
    }

    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w + 1 > width {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('~');
    out
}

fn pad(text: &str, width: usize) -> String {
    let visible = UnicodeWidthStr::width(strip_ansi(text).as_str());
    format!("{text}{}", " ".repeat(width.saturating_sub(visible)))
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use chrono::FixedOffset;

    use super::*;
    use crate::codec::ViewZone;
    use crate::item::sample_item;
    use crate::month::build_month_matrix;
    use crate::week::week_of;

    fn renderer() -> Renderer {
        Renderer::plain(ViewSettings {
            zone: ViewZone::Fixed(FixedOffset::east_opt(0).expect("offset")),
            ..ViewSettings::default()
        })
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn render(f: impl FnOnce(&mut Vec<u8>) -> anyhow::Result<()>) -> String {
        let mut buf = Vec::new();
        f(&mut buf).expect("render");
        String::from_utf8(buf).expect("utf8")
    }

    #[test]
    fn crowded_month_cell_shows_overflow() {
        let items = (0..5)
            .map(|n| {
                sample_item(
                    &format!("e{n}"),
                    &format!("2024-01-10T0{n}:00:00Z"),
                    &format!("2024-01-10T0{n}:30:00Z"),
                )
            })
            .collect::<Vec<_>>();
        let matrix = build_month_matrix(2024, 0).expect("matrix");

        let text = render(|buf| renderer().write_month(buf, &matrix, &items, date(2024, 1, 1)));

        assert!(text.starts_with("January 2024"));
        assert!(text.contains("e0"));
        assert!(text.contains("e2"));
        assert!(!text.contains("e3"));
        assert!(text.contains("+2 more"));
    }

    #[test]
    fn week_view_reports_geometry() {
        let items = vec![sample_item(
            "standup",
            "2024-01-10T09:00:00Z",
            "2024-01-10T10:30:00Z",
        )];
        let week = week_of(date(2024, 1, 10)).expect("week");

        let text = render(|buf| renderer().write_week(buf, &week, &items, date(2024, 1, 1)));

        assert!(text.starts_with("January 7-13, 2024"));
        assert!(text.contains("09:00-10:30 • standup (top 576px, height 96px, rows 9+2)"));
    }

    #[test]
    fn day_view_marks_continuation_rows() {
        let items = vec![sample_item(
            "review",
            "2024-01-10T13:00:00Z",
            "2024-01-10T15:00:00Z",
        )];

        let text = render(|buf| renderer().write_day(buf, date(2024, 1, 10), &items));
        let lines = text.lines().collect::<Vec<_>>();

        assert_eq!(lines.len(), 25);
        assert_eq!(lines[14], " 1 PM | • review");
        assert_eq!(lines[15], " 2 PM | | review");
        assert_eq!(lines[16], " 3 PM |");
    }

    #[test]
    fn task_week_lists_each_day_and_marks_today() {
        let mut rent = sample_item("rent0001", "2024-01-10T09:00:00Z", "2024-01-10T10:00:00Z");
        rent.title = "Pay rent".to_string();
        rent.is_task = true;
        let mut trip = sample_item("trip0001", "2024-01-08T20:00:00Z", "2024-01-09T08:00:00Z");
        trip.title = "Pack".to_string();
        trip.is_task = true;
        trip.complete = true;
        let week = week_of(date(2024, 1, 10)).expect("week");

        let text = render(|buf| {
            renderer().write_tasks(buf, &week, &[rent, trip], date(2024, 1, 10))
        });
        let lines = text.lines().collect::<Vec<_>>();

        assert_eq!(lines[0], "Tasks for January 7-13, 2024");
        assert_eq!(text.matches("No tasks.").count(), 5);
        assert!(text.contains("Wednesday Jan 10 [Today]\n  [ ] 09:00-10:00 Pay rent (rent0001)"));
        assert!(text.contains("Monday Jan 8\n  [x] Jan 8 20:00-Jan 9 08:00 Pack (trip0001)"));
        assert!(text.contains("Tuesday Jan 9\n  No tasks."));
        assert!(text.contains("\nSunday Jan 7\n"));
    }

    #[test]
    fn table_aligns_and_shortens_ids() {
        let mut item = sample_item(
            "0123456789abcdef",
            "2024-01-10T09:00:00Z",
            "2024-01-10T10:00:00Z",
        );
        item.title = "Café visit".to_string();

        let text = render(|buf| renderer().write_item_table(buf, &[item]));

        assert!(text.contains("01234567 "));
        assert!(!text.contains("89abcdef"));
        assert!(text.contains("Café visit"));
    }

    #[test]
    fn fit_truncates_by_display_width() {
        assert_eq!(fit("short", 10), "short");
        assert_eq!(fit("a very long title", 6), "a ver~");
    }
}

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  Duration,
  NaiveDate,
  NaiveTime
};
use tracing::{
  instrument,
  warn
};

use crate::codec::{
  self,
  ViewZone
};
use crate::importance::Importance;
use crate::item::{
  CalendarItem,
  FormInput,
  ItemPatch,
  validate_interval
};

const DEFAULT_START_TIME: &str = "09:00";
const DEFAULT_LENGTH_MINUTES: i64 = 60;

/// A `DATE[THH:MM]` token; the time is
/// optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct When {
  pub date: NaiveDate,
  pub time: Option<NaiveTime>
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Mod {
  Title(String),
  Start(When),
  End(When),
  Importance(Importance),
  Description(String),
  Task(bool)
}

/// Splits `add` arguments into title words
/// and `key:value` modifiers. Everything
/// after `--` is title text.
#[instrument(skip(args))]
pub(crate) fn parse_title_and_mods(
  args: &[String]
) -> anyhow::Result<(String, Vec<Mod>)> {
  let mut title_parts = Vec::new();
  let mut mods = Vec::new();

  let mut literal = false;
  for arg in args {
    if arg == "--" {
      literal = true;
      continue;
    }

    if !literal
      && let Some(one_mod) =
        parse_one_mod(arg)?
    {
      mods.push(one_mod);
      continue;
    }

    title_parts.push(arg.clone());
  }

  Ok((title_parts.join(" "), mods))
}

#[instrument(skip(args))]
pub(crate) fn parse_mods(
  args: &[String]
) -> anyhow::Result<Vec<Mod>> {
  let mut mods = Vec::new();
  for arg in args {
    if let Some(one_mod) =
      parse_one_mod(arg)?
    {
      mods.push(one_mod);
    } else {
      warn!(arg = %arg, "unrecognized modifier token ignored");
    }
  }
  Ok(mods)
}

fn parse_one_mod(
  tok: &str
) -> anyhow::Result<Option<Mod>> {
  let Some((key, value)) =
    tok.split_once(':')
  else {
    return Ok(None);
  };

  let key = key.to_ascii_lowercase();
  let parsed = match key.as_str() {
    | "title" => {
      Mod::Title(value.trim().to_string())
    }
    | "start" | "from" => {
      Mod::Start(parse_when(value)?)
    }
    | "end" | "to" | "until" => {
      Mod::End(parse_when(value)?)
    }
    | "imp" | "importance" | "pri"
    | "priority" => Mod::Importance(
      value.parse::<Importance>().with_context(
        || format!("bad modifier '{tok}'")
      )?
    ),
    | "desc" | "description" => {
      Mod::Description(
        value.trim().to_string()
      )
    }
    | "task" => Mod::Task(
      parse_flag(value).ok_or_else(
        || {
          anyhow!(
            "task: expected yes or no, \
             got '{value}'"
          )
        }
      )?
    ),
    | _ => return Ok(None)
  };
  Ok(Some(parsed))
}

/// `2024-01-10`, `2024-01-10T09:00` or
/// `2024-01-10 09:00`.
pub(crate) fn parse_when(
  raw: &str
) -> anyhow::Result<When> {
  let raw = raw.trim();
  let (date_part, time_part) = match raw
    .find(['T', 't', ' '])
  {
    | Some(idx) => {
      (&raw[..idx], Some(&raw[idx + 1..]))
    }
    | None => (raw, None)
  };

  let date = codec::parse_date(date_part)?;
  let time = time_part
    .map(codec::parse_time)
    .transpose()?;
  Ok(When { date, time })
}

/// Turns `add` modifiers into the same form
/// input the interactive form produces.
/// Start time defaults to 09:00 and a
/// missing end means one hour after start.
pub(crate) fn build_form(
  title: String,
  mods: &[Mod]
) -> anyhow::Result<FormInput> {
  let mut form = FormInput {
    title,
    ..FormInput::default()
  };
  let mut start = None;
  let mut end = None;

  for one_mod in mods {
    match one_mod {
      | Mod::Title(title) => {
        form.title = title.clone();
      }
      | Mod::Start(when) => start = Some(*when),
      | Mod::End(when) => end = Some(*when),
      | Mod::Importance(importance) => {
        form.importance = Some(
          importance.as_stored().to_string()
        );
      }
      | Mod::Description(text) => {
        form.description = Some(text.clone());
      }
      | Mod::Task(flag) => form.is_task = *flag
    }
  }

  let start = start.ok_or_else(|| {
    anyhow!(
      "add: start:YYYY-MM-DD[THH:MM] is \
       required"
    )
  })?;
  let default_start =
    codec::parse_time(DEFAULT_START_TIME)?;
  let start_at = start
    .date
    .and_time(start.time.unwrap_or(default_start));

  let end_at = match end {
    | Some(when) => when.date.and_time(
      when.time.unwrap_or(start_at.time())
    ),
    | None => start_at
      .checked_add_signed(Duration::minutes(
        DEFAULT_LENGTH_MINUTES
      ))
      .ok_or_else(|| {
        anyhow!("start is out of range")
      })?
  };

  form.start_date =
    start_at.format("%Y-%m-%d").to_string();
  form.start_time =
    start_at.format("%H:%M").to_string();
  form.end_date =
    end_at.format("%Y-%m-%d").to_string();
  form.end_time =
    end_at.format("%H:%M").to_string();
  Ok(form)
}

/// Builds an edit patch against `current`. A
/// date without a time keeps the current
/// local time of day. The resulting interval
/// must not end before it starts.
pub(crate) fn build_patch(
  mods: &[Mod],
  current: &CalendarItem,
  zone: ViewZone
) -> anyhow::Result<ItemPatch> {
  let mut patch = ItemPatch::default();

  for one_mod in mods {
    match one_mod {
      | Mod::Title(title) => {
        if title.is_empty() {
          return Err(anyhow!(
            "title cannot be empty"
          ));
        }
        patch.title = Some(title.clone());
      }
      | Mod::Start(when) => {
        patch.start = Some(resolve_when(
          *when,
          &current.start,
          zone
        )?);
      }
      | Mod::End(when) => {
        patch.end = Some(resolve_when(
          *when,
          &current.end,
          zone
        )?);
      }
      | Mod::Importance(importance) => {
        patch.importance = Some(*importance);
      }
      | Mod::Description(text) => {
        patch.description = Some(
          (!text.is_empty())
            .then(|| text.clone())
        );
      }
      | Mod::Task(flag) => {
        patch.is_task = Some(*flag);
      }
    }
  }

  let start =
    patch.start.unwrap_or(current.start);
  let end = patch.end.unwrap_or(current.end);
  validate_interval(&start, &end)?;

  Ok(patch)
}

fn resolve_when(
  when: When,
  current: &chrono::DateTime<
    chrono::FixedOffset
  >,
  zone: ViewZone
) -> anyhow::Result<
  chrono::DateTime<chrono::FixedOffset>
> {
  let time = when.time.unwrap_or_else(|| {
    zone.localize(current).time()
  });
  Ok(zone.resolve(when.date.and_time(time))?)
}

fn parse_flag(raw: &str) -> Option<bool> {
  match raw
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "1" | "y" | "yes" | "on" | "true" => {
      Some(true)
    }
    | "0" | "n" | "no" | "off"
    | "false" => Some(false),
    | _ => None
  }
}

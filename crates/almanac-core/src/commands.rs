mod items;
mod modifiers;
mod views;

use std::path::Path;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use crate::aggregate::sort_by_start;
use crate::cli::Invocation;
use crate::datastore::{ItemQuery, ItemStore};
use crate::error::CoreError;
use crate::item::CalendarItem;
use crate::render::Renderer;
use crate::session::Session;

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "login", "logout", "whoami", "month", "week", "day", "list", "events", "tasks", "add",
        "edit", "done", "undone", "archive", "delete", "info", "help", "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(store, data_dir, renderer, inv))]
pub fn dispatch<S: ItemStore>(
    store: &S,
    data_dir: &Path,
    renderer: &Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    let now = Utc::now();
    let command = inv.command.as_str();
    let args = inv.args.as_slice();

    debug!(command, args = ?args, "dispatching command");

    match command {
        "login" => cmd_login(data_dir, args, now),
        "logout" => cmd_logout(data_dir),
        "whoami" => cmd_whoami(data_dir),
        "help" => cmd_help(),
        "version" => {
            println!("almanac {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        _ => {
            let session = Session::current(data_dir)?;
            debug!(owner = %session.user_id(), "session resolved");
            match command {
                "month" => views::cmd_month(store, &session, renderer, args),
                "week" => views::cmd_week(store, &session, renderer, args),
                "day" => views::cmd_day(store, &session, renderer, args),
                "list" | "events" => views::cmd_list(store, &session, renderer, args, now),
                "tasks" => views::cmd_tasks(store, &session, renderer, args),
                "add" => items::cmd_add(store, &session, renderer, args, now),
                "edit" => items::cmd_edit(store, &session, renderer, args, now),
                "done" => items::cmd_complete(store, &session, renderer, args, true, now),
                "undone" => items::cmd_complete(store, &session, renderer, args, false, now),
                "archive" => items::cmd_archive(store, &session, renderer, args, now),
                "delete" => items::cmd_delete(store, &session, renderer, args),
                "info" => items::cmd_info(store, &session, renderer, args),
                other => Err(anyhow!("unknown command: {other}")),
            }
        }
    }
}

#[instrument(skip(data_dir, args, now))]
fn cmd_login(data_dir: &Path, args: &[String], now: DateTime<Utc>) -> anyhow::Result<()> {
    info!("command login");
    let [user] = args else {
        return Err(anyhow!("usage: almanac login <user>"));
    };
    let session = Session::sign_in(data_dir, user, now)?;
    println!("Signed in as {}.", session.user_id());
    Ok(())
}

#[instrument(skip(data_dir))]
fn cmd_logout(data_dir: &Path) -> anyhow::Result<()> {
    info!("command logout");
    if Session::sign_out(data_dir)? {
        println!("Signed out.");
    } else {
        println!("Not signed in.");
    }
    Ok(())
}

#[instrument(skip(data_dir))]
fn cmd_whoami(data_dir: &Path) -> anyhow::Result<()> {
    match Session::current(data_dir) {
        Ok(session) => {
            println!(
                "{} (since {})",
                session.user_id(),
                session.signed_in_at.format("%Y-%m-%d %H:%M UTC")
            );
            Ok(())
        }
        Err(CoreError::Unauthenticated) => {
            println!("Not signed in.");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

fn cmd_help() -> anyhow::Result<()> {
    println!(
        "\
usage: almanac [-v|-q] [--rc KEY=VALUE] [--almanacrc PATH] [--data DIR] <command> [args]

  login <user> | logout | whoami
  month [YYYY-MM | +N | -N]      month grid
  week  [YYYY-MM-DD | +N | -N]   week with time-grid placement
  day   [YYYY-MM-DD | +N | -N]   24-hour grid for one day
  list [all]                     upcoming items (alias: events)
  tasks [WEEK_OFFSET]            tasks in the week N weeks from now
  add <title> start:DATE[THH:MM] [end:DATE[THH:MM]] [imp:none|low|medium|high]
      [desc:TEXT] [task:yes|no]
  edit <id> key:value...         same keys as add, plus title:
  done <id> | undone <id> | archive <id> | delete <id> | info <id>
  help | version

Commands may be abbreviated to any unique prefix; ids to any unique prefix."
    );
    Ok(())
}

/// Loads the session's items matching `query`, normalized and ordered by
/// start.
fn load_items<S: ItemStore>(
    store: &S,
    session: &Session,
    query: &ItemQuery,
    renderer: &Renderer,
) -> anyhow::Result<Vec<CalendarItem>> {
    let records = store.select(session, query)?;
    let mut items = CalendarItem::from_records(&records, renderer.settings().zone);
    sort_by_start(&mut items);
    Ok(items)
}

use std::io;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use super::modifiers::{build_form, build_patch, parse_mods, parse_title_and_mods};
use crate::datastore::{ItemQuery, ItemStore};
use crate::error::CoreError;
use crate::item::{CalendarItem, ItemRecord, NewItem};
use crate::render::{Renderer, short_id};
use crate::session::Session;

#[instrument(skip(store, session, renderer, args, now))]
pub(super) fn cmd_add<S: ItemStore>(
    store: &S,
    session: &Session,
    renderer: &Renderer,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command add");

    let (title, mods) = parse_title_and_mods(args)?;
    let form = build_form(title, &mods)?;
    let item = NewItem::from_form(&form, renderer.settings().zone)?;
    let kind = kind_name(item.is_task);

    let record = store.insert(session, item, now)?;
    debug!(id = %record.id, "item added");
    println!("Created {kind} {}.", short_id(&record.id));
    Ok(())
}

#[instrument(skip(store, session, renderer, args, now))]
pub(super) fn cmd_edit<S: ItemStore>(
    store: &S,
    session: &Session,
    renderer: &Renderer,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command edit");

    let Some((id, rest)) = args.split_first() else {
        return Err(anyhow!("usage: almanac edit <id> key:value..."));
    };
    let record = resolve_item(store, session, id)?;
    let zone = renderer.settings().zone;
    let current = CalendarItem::from_record(&record, zone)?;

    let mods = parse_mods(rest)?;
    let patch = build_patch(&mods, &current, zone)?;
    if patch.is_empty() {
        println!("Nothing to change.");
        return Ok(());
    }

    let updated = store.update(session, &record.id, &patch, now)?;
    println!("Modified {} {}.", kind_name(updated.is_task), short_id(&updated.id));
    Ok(())
}

/// `done` and `undone`. Only tasks carry a completion flag.
#[instrument(skip(store, session, _renderer, args, now))]
pub(super) fn cmd_complete<S: ItemStore>(
    store: &S,
    session: &Session,
    _renderer: &Renderer,
    args: &[String],
    complete: bool,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!(complete, "command done/undone");

    let record = resolve_item(store, session, single_id(args)?)?;
    if !record.is_task {
        return Err(anyhow!("{} is an event, not a task", short_id(&record.id)));
    }
    if record.complete == complete {
        println!("Task {} is already {}.", short_id(&record.id), done_word(complete));
        return Ok(());
    }

    store.set_complete(session, &record.id, complete, now)?;
    println!("Marked task {} {}.", short_id(&record.id), done_word(complete));
    Ok(())
}

#[instrument(skip(store, session, _renderer, args, now))]
pub(super) fn cmd_archive<S: ItemStore>(
    store: &S,
    session: &Session,
    _renderer: &Renderer,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command archive");

    let record = resolve_item(store, session, single_id(args)?)?;
    if record.archived {
        println!("{} is already archived.", short_id(&record.id));
        return Ok(());
    }
    store.archive(session, &record.id, now)?;
    println!("Archived {} {}.", kind_name(record.is_task), short_id(&record.id));
    Ok(())
}

#[instrument(skip(store, session, _renderer, args))]
pub(super) fn cmd_delete<S: ItemStore>(
    store: &S,
    session: &Session,
    _renderer: &Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command delete");

    let record = resolve_item(store, session, single_id(args)?)?;
    store.delete(session, &record.id)?;
    println!("Deleted {} {}.", kind_name(record.is_task), short_id(&record.id));
    Ok(())
}

#[instrument(skip(store, session, renderer, args))]
pub(super) fn cmd_info<S: ItemStore>(
    store: &S,
    session: &Session,
    renderer: &Renderer,
    args: &[String],
) -> anyhow::Result<()> {
    info!("command info");

    let record = resolve_item(store, session, single_id(args)?)?;
    let item = CalendarItem::from_record(&record, renderer.settings().zone)?;
    renderer.write_item_info(io::stdout().lock(), &item)
}

/// Finds one of the session's items by full id or unique id prefix,
/// archived items included.
pub(super) fn resolve_item<S: ItemStore>(
    store: &S,
    session: &Session,
    token: &str,
) -> anyhow::Result<ItemRecord> {
    let token = token.trim();
    if token.is_empty() {
        return Err(anyhow!("item id cannot be empty"));
    }
    if let Some(exact) = store.get(session, token)? {
        return Ok(exact);
    }

    let mut matches = store
        .select(session, &ItemQuery::active().including_archived())?
        .into_iter()
        .filter(|record| record.id.starts_with(token));
    let first = matches
        .next()
        .ok_or_else(|| CoreError::NotFound(token.to_string()))?;
    if matches.next().is_some() {
        return Err(anyhow!("id prefix '{token}' matches more than one item"));
    }
    Ok(first)
}

fn single_id(args: &[String]) -> anyhow::Result<&str> {
    match args {
        [id] => Ok(id.as_str()),
        [] => Err(anyhow!("an item id is required")),
        _ => Err(anyhow!("expected exactly one item id")),
    }
}

fn kind_name(is_task: bool) -> &'static str {
    if is_task { "task" } else { "event" }
}

fn done_word(complete: bool) -> &'static str {
    if complete { "done" } else { "not done" }
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, TimeZone};
    use tempfile::tempdir;

    use super::*;
    use crate::codec::ViewZone;
    use crate::config::ViewSettings;
    use crate::datastore::DataStore;

    fn setup() -> (tempfile::TempDir, DataStore, Renderer) {
        let dir = tempdir().expect("tempdir");
        let zone = ViewZone::Fixed(FixedOffset::east_opt(0).expect("offset"));
        let store = DataStore::open(dir.path(), zone).expect("open");
        let renderer = Renderer::plain(ViewSettings {
            zone,
            ..ViewSettings::default()
        });
        (dir, store, renderer)
    }

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().expect("now")
    }

    #[test]
    fn add_edit_complete_archive_flow() {
        let (_dir, store, renderer) = setup();
        let session = Session::for_user("alice");

        cmd_add(
            &store,
            &session,
            &renderer,
            &args(&["Write", "report", "start:2024-01-10T09:00", "task:yes", "imp:2"]),
            now(),
        )
        .expect("add");
        let rows = store.select(&session, &ItemQuery::active()).expect("select");
        assert_eq!(rows.len(), 1);
        let id = rows[0].id.clone();
        assert_eq!(rows[0].event_name, "Write report");
        assert_eq!(rows[0].end_datetime, "2024-01-10T10:00:00+00:00");

        cmd_edit(
            &store,
            &session,
            &renderer,
            &args(&[&id[..6], "title:Ship report", "end:2024-01-10T12:00"]),
            now(),
        )
        .expect("edit");
        let edited = store.get(&session, &id).expect("get").expect("row");
        assert_eq!(edited.event_name, "Ship report");
        assert_eq!(edited.end_datetime, "2024-01-10T12:00:00+00:00");

        cmd_complete(&store, &session, &renderer, &args(&[id.as_str()]), true, now()).expect("done");
        assert!(store.get(&session, &id).expect("get").expect("row").complete);

        cmd_archive(&store, &session, &renderer, &args(&[id.as_str()]), now()).expect("archive");
        assert!(store.select(&session, &ItemQuery::active()).expect("select").is_empty());

        // archived items stay addressable
        cmd_info(&store, &session, &renderer, &args(&[id.as_str()])).expect("info");
        cmd_delete(&store, &session, &renderer, &args(&[id.as_str()])).expect("delete");
        assert!(store.get(&session, &id).expect("get").is_none());
    }

    #[test]
    fn invalid_edits_and_events_are_rejected() {
        let (_dir, store, renderer) = setup();
        let session = Session::for_user("alice");

        cmd_add(
            &store,
            &session,
            &renderer,
            &args(&["Lunch", "start:2024-01-10T12:00", "end:2024-01-10T13:00"]),
            now(),
        )
        .expect("add");
        let rows = store.select(&session, &ItemQuery::active()).expect("select");
        let id = rows[0].id.clone();

        let backwards_edit = args(&[id.as_str(), "end:2024-01-10T11:00"]);
        assert!(cmd_edit(&store, &session, &renderer, &backwards_edit, now()).is_err());
        let complete_event = args(&[id.as_str()]);
        assert!(cmd_complete(&store, &session, &renderer, &complete_event, true, now()).is_err());
        assert!(
            cmd_add(
                &store,
                &session,
                &renderer,
                &args(&["Backwards", "start:2024-01-10T12:00", "end:2024-01-10T11:00"]),
                now(),
            )
            .is_err()
        );

        let stranger = Session::for_user("bob");
        assert!(resolve_item(&store, &stranger, &id).is_err());
    }
}

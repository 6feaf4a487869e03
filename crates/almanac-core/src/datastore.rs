use std::cmp::Ordering;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, Utc};
use tempfile::NamedTempFile;
use tracing::{debug, info};
use uuid::Uuid;

use crate::codec::{self, ViewZone};
use crate::error::{CoreError, CoreResult};
use crate::item::{ItemPatch, ItemRecord, NewItem};
use crate::session::Session;

/// Filters for [`ItemStore::select`]. The owner filter is not part of the
/// query: it always comes from the session.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemQuery {
    /// `Some(false)` hides archived rows; `None` returns both.
    pub archived: Option<bool>,
    pub is_task: Option<bool>,
    /// Inclusive bounds on the start instant.
    pub start_from: Option<DateTime<FixedOffset>>,
    pub start_to: Option<DateTime<FixedOffset>>,
}

impl Default for ItemQuery {
    fn default() -> Self {
        Self::active()
    }
}

impl ItemQuery {
    pub fn active() -> Self {
        Self {
            archived: Some(false),
            is_task: None,
            start_from: None,
            start_to: None,
        }
    }

    pub fn tasks() -> Self {
        Self {
            is_task: Some(true),
            ..Self::active()
        }
    }

    pub fn including_archived(mut self) -> Self {
        self.archived = None;
        self
    }

    pub fn starting_between(
        mut self,
        from: DateTime<FixedOffset>,
        to: DateTime<FixedOffset>,
    ) -> Self {
        self.start_from = Some(from);
        self.start_to = Some(to);
        self
    }
}

/// Record store for calendar items. Every call is scoped to the session's
/// user; rows owned by anyone else are invisible to it.
pub trait ItemStore {
    /// Matching rows ordered by start instant, ascending.
    fn select(&self, session: &Session, query: &ItemQuery) -> CoreResult<Vec<ItemRecord>>;

    fn get(&self, session: &Session, id: &str) -> CoreResult<Option<ItemRecord>>;

    fn insert(&self, session: &Session, item: NewItem, now: DateTime<Utc>)
    -> CoreResult<ItemRecord>;

    fn update(
        &self,
        session: &Session,
        id: &str,
        patch: &ItemPatch,
        now: DateTime<Utc>,
    ) -> CoreResult<ItemRecord>;

    /// Permanent removal; the normal flow archives instead.
    fn delete(&self, session: &Session, id: &str) -> CoreResult<()>;

    fn archive(&self, session: &Session, id: &str, now: DateTime<Utc>) -> CoreResult<ItemRecord> {
        self.update(session, id, &ItemPatch::archive(), now)
    }

    fn set_complete(
        &self,
        session: &Session,
        id: &str,
        complete: bool,
        now: DateTime<Utc>,
    ) -> CoreResult<ItemRecord> {
        self.update(session, id, &ItemPatch::complete(complete), now)
    }
}

/// JSON-lines implementation over `items.data` in the data directory.
#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub items_path: PathBuf,
    zone: ViewZone,
}

impl DataStore {
    /// `zone` is used to order rows whose timestamps carry no offset.
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path, zone: ViewZone) -> CoreResult<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)?;

        let items_path = data_dir.join("items.data");
        if !items_path.exists() {
            fs::write(&items_path, "")?;
        }

        info!(
            data_dir = %data_dir.display(),
            items = %items_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            items_path,
            zone,
        })
    }

    #[tracing::instrument(skip(self))]
    fn load_all(&self) -> CoreResult<Vec<ItemRecord>> {
        load_jsonl(&self.items_path)
    }

    #[tracing::instrument(skip(self, records))]
    fn save_all(&self, records: &[ItemRecord]) -> CoreResult<()> {
        save_jsonl_atomic(&self.items_path, records)
    }

    fn start_instant(&self, record: &ItemRecord) -> Option<DateTime<FixedOffset>> {
        codec::parse_instant(&record.start_datetime, self.zone).ok()
    }

    fn matches(&self, record: &ItemRecord, query: &ItemQuery) -> bool {
        if query.archived.is_some_and(|archived| record.archived != archived) {
            return false;
        }
        if query.is_task.is_some_and(|is_task| record.is_task != is_task) {
            return false;
        }
        if query.start_from.is_none() && query.start_to.is_none() {
            return true;
        }

        let Some(start) = self.start_instant(record) else {
            return false;
        };
        query.start_from.is_none_or(|from| start >= from)
            && query.start_to.is_none_or(|to| start <= to)
    }

    fn compare_start(&self, a: &ItemRecord, b: &ItemRecord) -> Ordering {
        match (self.start_instant(a), self.start_instant(b)) {
            (Some(left), Some(right)) => left.cmp(&right),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.start_datetime.cmp(&b.start_datetime),
        }
    }
}

impl ItemStore for DataStore {
    #[tracing::instrument(skip(self, session, query), fields(owner = %session.user_id()))]
    fn select(&self, session: &Session, query: &ItemQuery) -> CoreResult<Vec<ItemRecord>> {
        let mut rows: Vec<ItemRecord> = self
            .load_all()?
            .into_iter()
            .filter(|record| record.user_id == session.user_id())
            .filter(|record| self.matches(record, query))
            .collect();
        rows.sort_by(|a, b| self.compare_start(a, b));

        debug!(count = rows.len(), ?query, "selected items");
        Ok(rows)
    }

    #[tracing::instrument(skip(self, session), fields(owner = %session.user_id()))]
    fn get(&self, session: &Session, id: &str) -> CoreResult<Option<ItemRecord>> {
        Ok(self
            .load_all()?
            .into_iter()
            .find(|record| record.id == id && record.user_id == session.user_id()))
    }

    #[tracing::instrument(skip(self, session, item, now), fields(owner = %session.user_id()))]
    fn insert(
        &self,
        session: &Session,
        item: NewItem,
        now: DateTime<Utc>,
    ) -> CoreResult<ItemRecord> {
        item.validate()?;

        let mut records = self.load_all()?;
        let record = item.into_record(Uuid::new_v4().to_string(), session.user_id(), now);
        records.push(record.clone());
        self.save_all(&records)?;

        info!(id = %record.id, "inserted item");
        Ok(record)
    }

    #[tracing::instrument(skip(self, session, patch, now), fields(owner = %session.user_id()))]
    fn update(
        &self,
        session: &Session,
        id: &str,
        patch: &ItemPatch,
        now: DateTime<Utc>,
    ) -> CoreResult<ItemRecord> {
        let mut records = self.load_all()?;
        let record = records
            .iter_mut()
            .find(|record| record.id == id && record.user_id == session.user_id())
            .ok_or_else(|| CoreError::NotFound(id.to_string()))?;

        patch.apply(record, now);
        let updated = record.clone();
        self.save_all(&records)?;

        debug!(id, "updated item");
        Ok(updated)
    }

    #[tracing::instrument(skip(self, session), fields(owner = %session.user_id()))]
    fn delete(&self, session: &Session, id: &str) -> CoreResult<()> {
        let mut records = self.load_all()?;
        let before = records.len();
        records.retain(|record| !(record.id == id && record.user_id == session.user_id()));
        if records.len() == before {
            return Err(CoreError::NotFound(id.to_string()));
        }
        self.save_all(&records)?;

        info!(id, "deleted item");
        Ok(())
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl(path: &Path) -> CoreResult<Vec<ItemRecord>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let record: ItemRecord = serde_json::from_str(trimmed).map_err(|err| {
            CoreError::Store(format!("failed parsing {} line {}: {err}", path.display(), idx + 1))
        })?;
        out.push(record);
    }

    debug!(count = out.len(), "loaded items from jsonl");
    Ok(out)
}

#[tracing::instrument(skip(path, records))]
fn save_jsonl_atomic(path: &Path, records: &[ItemRecord]) -> CoreResult<()> {
    debug!(file = %path.display(), count = records.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for record in records {
        let serialized = serde_json::to_string(record)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| CoreError::Store(format!("failed to persist {}: {}", path.display(), err)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use tempfile::tempdir;

    use super::*;
    use crate::importance::Importance;

    fn at(hour: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .expect("offset")
            .with_ymd_and_hms(2024, 1, 10, hour, 0, 0)
            .single()
            .expect("instant")
    }

    fn new_item(title: &str, hour: u32, is_task: bool) -> NewItem {
        NewItem {
            title: title.to_string(),
            description: None,
            start: at(hour),
            end: at(hour + 1),
            importance: Importance::Low,
            is_task,
            complete: false,
            archived: false,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().expect("now")
    }

    #[test]
    fn select_is_scoped_ordered_and_hides_archived() {
        let dir = tempdir().expect("tempdir");
        let store = DataStore::open(dir.path(), ViewZone::default()).expect("open");
        let alice = Session::for_user("alice");
        let bob = Session::for_user("bob");

        store.insert(&alice, new_item("late", 15, false), now()).expect("insert");
        let early = store.insert(&alice, new_item("early", 8, true), now()).expect("insert");
        store.insert(&bob, new_item("bob's", 9, false), now()).expect("insert");

        let rows = store.select(&alice, &ItemQuery::active()).expect("select");
        let titles = rows.iter().map(|r| r.event_name.as_str()).collect::<Vec<_>>();
        assert_eq!(titles, vec!["early", "late"]);
        assert!(rows.iter().all(|r| r.user_id == "alice"));

        store.archive(&alice, &early.id, now()).expect("archive");
        assert_eq!(store.select(&alice, &ItemQuery::active()).expect("select").len(), 1);
        assert_eq!(
            store
                .select(&alice, &ItemQuery::active().including_archived())
                .expect("select")
                .len(),
            2
        );
        assert!(store.select(&alice, &ItemQuery::tasks()).expect("tasks").is_empty());
    }

    #[test]
    fn other_owners_cannot_touch_rows() {
        let dir = tempdir().expect("tempdir");
        let store = DataStore::open(dir.path(), ViewZone::default()).expect("open");
        let alice = Session::for_user("alice");
        let mallory = Session::for_user("mallory");

        let row = store.insert(&alice, new_item("mine", 10, false), now()).expect("insert");

        assert!(store.get(&mallory, &row.id).expect("get").is_none());
        assert!(matches!(
            store.archive(&mallory, &row.id, now()),
            Err(CoreError::NotFound(_))
        ));
        assert!(matches!(store.delete(&mallory, &row.id), Err(CoreError::NotFound(_))));
        assert!(store.get(&alice, &row.id).expect("get").is_some());
    }

    #[test]
    fn update_stamps_and_range_filters() {
        let dir = tempdir().expect("tempdir");
        let store = DataStore::open(dir.path(), ViewZone::default()).expect("open");
        let alice = Session::for_user("alice");

        let row = store.insert(&alice, new_item("task", 10, true), now()).expect("insert");
        let later = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).single().expect("later");
        let done = store.set_complete(&alice, &row.id, true, later).expect("complete");
        assert!(done.complete);
        assert_eq!(done.updated_at, later);
        assert_eq!(done.created_at, now());

        let in_range = store
            .select(&alice, &ItemQuery::active().starting_between(at(9), at(11)))
            .expect("range");
        assert_eq!(in_range.len(), 1);
        let out_of_range = store
            .select(&alice, &ItemQuery::active().starting_between(at(11), at(12)))
            .expect("range");
        assert!(out_of_range.is_empty());

        store.delete(&alice, &row.id).expect("delete");
        assert!(store.get(&alice, &row.id).expect("get").is_none());
    }
}

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::codec::{self, ViewZone};
use crate::error::{CoreError, CoreResult};
use crate::importance::{Importance, ItemStatus, RawImportance, normalize_importance};

/// A row of the `calendar_items` table, field names as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: String,

    pub user_id: String,

    pub event_name: String,

    #[serde(rename = "Description", default)]
    pub description: Option<String>,

    pub start_datetime: String,

    pub end_datetime: String,

    #[serde(default)]
    pub importance: RawImportance,

    #[serde(default)]
    pub is_task: bool,

    #[serde(default)]
    pub complete: bool,

    #[serde(default)]
    pub archived: bool,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

/// Normalized in-memory item. Built only through [`CalendarItem::from_record`].
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarItem {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: Option<String>,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub importance: Importance,
    pub is_task: bool,
    pub complete: bool,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CalendarItem {
    /// Normalizes a stored row. Importance goes through the classifier and
    /// timestamps through the codec.
    pub fn from_record(record: &ItemRecord, zone: ViewZone) -> CoreResult<Self> {
        let start = codec::parse_instant(&record.start_datetime, zone)?;
        let end = codec::parse_instant(&record.end_datetime, zone)?;

        Ok(Self {
            id: record.id.clone(),
            owner_id: record.user_id.clone(),
            title: record.event_name.clone(),
            description: record.description.clone().filter(|d| !d.trim().is_empty()),
            start,
            end,
            importance: normalize_importance(&record.importance),
            is_task: record.is_task,
            complete: record.complete,
            archived: record.archived,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }

    /// Normalizes a batch, skipping rows whose timestamps cannot be read.
    pub fn from_records(records: &[ItemRecord], zone: ViewZone) -> Vec<Self> {
        records
            .iter()
            .filter_map(|record| match Self::from_record(record, zone) {
                Ok(item) => Some(item),
                Err(err) => {
                    tracing::warn!(id = %record.id, error = %err, "skipping unreadable item");
                    None
                }
            })
            .collect()
    }

    pub fn status(&self) -> ItemStatus {
        ItemStatus::classify(self.is_task, self.complete, self.archived)
    }

    pub fn display_title(&self) -> &str {
        let trimmed = self.title.trim();
        if trimmed.is_empty() { "(untitled)" } else { trimmed }
    }
}

/// Raw strings collected from the create/edit form.
#[derive(Debug, Clone, Default)]
pub struct FormInput {
    pub title: String,
    pub description: Option<String>,
    pub start_date: String,
    pub start_time: String,
    pub end_date: String,
    pub end_time: String,
    pub importance: Option<String>,
    pub is_task: bool,
}

/// Payload for an insert. Owner and id are assigned by the store.
#[derive(Debug, Clone, PartialEq)]
pub struct NewItem {
    pub title: String,
    pub description: Option<String>,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub importance: Importance,
    pub is_task: bool,
    pub complete: bool,
    pub archived: bool,
}

impl NewItem {
    pub fn from_form(form: &FormInput, zone: ViewZone) -> CoreResult<Self> {
        let start = codec::local_instant(&form.start_date, &form.start_time, zone)?;
        let end = codec::local_instant(&form.end_date, &form.end_time, zone)?;
        let importance = match form.importance.as_deref() {
            Some(raw) if !raw.trim().is_empty() => raw.parse()?,
            _ => Importance::None,
        };

        let item = Self {
            title: form.title.trim().to_string(),
            description: form
                .description
                .as_ref()
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
            start,
            end,
            importance,
            is_task: form.is_task,
            complete: false,
            archived: false,
        };
        item.validate()?;
        Ok(item)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.title.trim().is_empty() {
            return Err(CoreError::invalid("title", &self.title, "must not be empty"));
        }
        validate_interval(&self.start, &self.end)
    }

    pub fn into_record(self, id: String, owner: &str, now: DateTime<Utc>) -> ItemRecord {
        ItemRecord {
            id,
            user_id: owner.to_string(),
            event_name: self.title,
            description: self.description,
            start_datetime: codec::format_instant(&self.start),
            end_datetime: codec::format_instant(&self.end),
            importance: self.importance.into(),
            is_task: self.is_task,
            complete: self.complete,
            archived: self.archived,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Field-level update. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub start: Option<DateTime<FixedOffset>>,
    pub end: Option<DateTime<FixedOffset>>,
    pub importance: Option<Importance>,
    pub is_task: Option<bool>,
    pub complete: Option<bool>,
    pub archived: Option<bool>,
}

impl ItemPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn archive() -> Self {
        Self {
            archived: Some(true),
            ..Self::default()
        }
    }

    pub fn complete(complete: bool) -> Self {
        Self {
            complete: Some(complete),
            ..Self::default()
        }
    }

    /// Applies the patch and stamps `updated_at`.
    pub fn apply(&self, record: &mut ItemRecord, now: DateTime<Utc>) {
        if let Some(title) = &self.title {
            record.event_name = title.clone();
        }
        if let Some(description) = &self.description {
            record.description = description.clone();
        }
        if let Some(start) = &self.start {
            record.start_datetime = codec::format_instant(start);
        }
        if let Some(end) = &self.end {
            record.end_datetime = codec::format_instant(end);
        }
        if let Some(importance) = self.importance {
            record.importance = importance.into();
        }
        if let Some(is_task) = self.is_task {
            record.is_task = is_task;
        }
        if let Some(complete) = self.complete {
            record.complete = complete;
        }
        if let Some(archived) = self.archived {
            record.archived = archived;
        }
        record.updated_at = now;
    }
}

pub fn validate_interval(
    start: &DateTime<FixedOffset>,
    end: &DateTime<FixedOffset>,
) -> CoreResult<()> {
    if end < start {
        return Err(CoreError::invalid(
            "end",
            codec::format_instant(end),
            format!("ends before it starts ({})", codec::format_instant(start)),
        ));
    }
    Ok(())
}

/// Minimal item for engine tests; timestamps are RFC 3339.
#[cfg(test)]
pub(crate) fn sample_item(id: &str, start: &str, end: &str) -> CalendarItem {
    let parse = |raw: &str| DateTime::parse_from_rfc3339(raw).expect("rfc3339 timestamp");
    CalendarItem {
        id: id.to_string(),
        owner_id: "owner".to_string(),
        title: id.to_string(),
        description: None,
        start: parse(start),
        end: parse(end),
        importance: Importance::None,
        is_task: false,
        complete: false,
        archived: false,
        created_at: DateTime::<Utc>::UNIX_EPOCH,
        updated_at: DateTime::<Utc>::UNIX_EPOCH,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, TimeZone};

    use super::*;

    fn zone() -> ViewZone {
        ViewZone::Fixed(FixedOffset::east_opt(-5 * 3600).expect("offset"))
    }

    fn record(importance: serde_json::Value, is_task: bool) -> ItemRecord {
        let raw = serde_json::json!({
            "id": "a1",
            "user_id": "u1",
            "event_name": "Standup",
            "Description": null,
            "start_datetime": "2024-01-10T09:00:00-05:00",
            "end_datetime": "2024-01-10T09:30:00-05:00",
            "importance": importance,
            "is_task": is_task,
            "complete": false,
            "archived": false,
            "created_at": "2024-01-01T00:00:00Z",
            "updated_at": "2024-01-01T00:00:00Z"
        });
        serde_json::from_value(raw).expect("record")
    }

    #[test]
    fn integer_and_label_importance_normalize_identically() {
        let task = CalendarItem::from_record(&record(serde_json::json!(2), true), zone())
            .expect("task");
        let event =
            CalendarItem::from_record(&record(serde_json::json!("MEDIUM"), false), zone())
                .expect("event");

        assert_eq!(task.importance, Importance::Medium);
        assert_eq!(task.importance, event.importance);
        assert_eq!(task.importance.label(), event.importance.label());
        assert_eq!(task.importance.color_key(), event.importance.color_key());
    }

    #[test]
    fn missing_importance_defaults_to_none() {
        let mut raw = serde_json::to_value(record(serde_json::json!(1), false)).expect("value");
        raw.as_object_mut().expect("object").remove("importance");
        let parsed: ItemRecord = serde_json::from_value(raw).expect("record");
        let item = CalendarItem::from_record(&parsed, zone()).expect("item");
        assert_eq!(item.importance, Importance::None);
    }

    #[test]
    fn form_builds_offset_timestamps() {
        let form = FormInput {
            title: "  Dentist ".to_string(),
            description: Some(" ".to_string()),
            start_date: "2024-02-01".to_string(),
            start_time: "14:00".to_string(),
            end_date: "2024-02-01".to_string(),
            end_time: "15:00".to_string(),
            importance: Some("high".to_string()),
            is_task: false,
        };
        let item = NewItem::from_form(&form, zone()).expect("new item");
        assert_eq!(item.title, "Dentist");
        assert_eq!(item.description, None);
        assert_eq!(item.importance, Importance::High);

        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().expect("now");
        let stored = item.into_record("id".to_string(), "u1", now);
        assert_eq!(stored.start_datetime, "2024-02-01T14:00:00-05:00");
        assert_eq!(stored.importance, RawImportance::Text("HIGH".to_string()));
    }

    #[test]
    fn form_rejects_end_before_start() {
        let form = FormInput {
            title: "Backwards".to_string(),
            start_date: "2024-02-01".to_string(),
            start_time: "15:00".to_string(),
            end_date: "2024-02-01".to_string(),
            end_time: "14:00".to_string(),
            ..FormInput::default()
        };
        assert!(matches!(
            NewItem::from_form(&form, zone()),
            Err(CoreError::InvalidInput { field: "end", .. })
        ));
    }

    #[test]
    fn patch_refreshes_updated_at() {
        let mut stored = record(serde_json::json!(0), true);
        let before = stored.updated_at;
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).single().expect("now");

        ItemPatch::complete(true).apply(&mut stored, now);

        assert!(stored.complete);
        assert_eq!(stored.updated_at, now);
        assert_ne!(stored.updated_at, before);
        assert_eq!(stored.event_name, "Standup");
    }
}

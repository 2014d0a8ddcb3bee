//! Helpers for record lists stored as one JSON array per key.
//!
//! Lists are decoded one element at a time so a single malformed record is
//! skipped instead of hiding the whole collection. Updates overlay the typed
//! record onto the stored object, keeping fields this server does not model.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::errors::AppError;
use crate::filter::{scope_for_viewer, Targeted};
use crate::models::{Readable, Viewer};
use crate::store::{KvStore, RemoteStore};

/// Decode every well-formed element of `raw`.
pub fn decode_lenient<T: DeserializeOwned>(key: &str, raw: Vec<Value>) -> Vec<T> {
    let total = raw.len();
    let records: Vec<T> = raw
        .into_iter()
        .filter_map(|value| serde_json::from_value(value).ok())
        .collect();
    if records.len() < total {
        tracing::debug!(key, skipped = total - records.len(), "Skipped malformed records");
    }
    records
}

pub async fn load<R, T>(store: &KvStore<R>, key: &str) -> Vec<T>
where
    R: RemoteStore,
    T: DeserializeOwned,
{
    decode_lenient(key, store.get(key, Vec::new()).await)
}

/// Load `key` and narrow it to what `viewer` may see.
pub async fn load_visible<R, T>(store: &KvStore<R>, key: &str, viewer: &Viewer) -> Vec<T>
where
    R: RemoteStore,
    T: DeserializeOwned + Targeted,
{
    scope_for_viewer(load(store, key).await, viewer)
}

/// True when `value` is an object whose string `field` equals `expected`.
pub fn field_is(value: &Value, field: &str, expected: &str) -> bool {
    value.get(field).and_then(Value::as_str) == Some(expected)
}

fn has_id(value: &Value, id: &str) -> bool {
    field_is(value, "id", id)
}

fn overlay<T: Serialize>(slot: &mut Value, record: &T) {
    let Ok(Value::Object(fields)) = serde_json::to_value(record) else {
        return;
    };
    match slot {
        Value::Object(existing) => existing.extend(fields),
        other => *other = Value::Object(fields),
    }
}

/// Apply `apply` to the record with `id` and write the list back.
///
/// Returns `Ok(None)` when no well-formed record has that id. Nothing is
/// written when `apply` fails.
pub async fn update_record<R, T, E, F>(
    store: &KvStore<R>,
    key: &str,
    id: &str,
    apply: F,
) -> Result<Option<T>, E>
where
    R: RemoteStore,
    T: Serialize + DeserializeOwned,
    F: FnOnce(&mut T) -> Result<(), E>,
{
    let mut raw: Vec<Value> = store.get(key, Vec::new()).await;
    let Some(slot) = raw.iter_mut().find(|value| has_id(value, id)) else {
        return Ok(None);
    };
    let Ok(mut record) = serde_json::from_value::<T>(slot.clone()) else {
        return Ok(None);
    };

    apply(&mut record)?;
    overlay(slot, &record);
    store.set(key, &raw).await;

    Ok(Some(record))
}

/// Apply `apply` to every record accepted by `select` and write the list back
/// if anything changed. Returns the updated records.
pub async fn update_matching<R, T, S, F>(
    store: &KvStore<R>,
    key: &str,
    select: S,
    mut apply: F,
) -> Vec<T>
where
    R: RemoteStore,
    T: Serialize + DeserializeOwned,
    S: Fn(&T) -> bool,
    F: FnMut(&mut T),
{
    let mut raw: Vec<Value> = store.get(key, Vec::new()).await;
    let mut updated = Vec::new();

    for slot in raw.iter_mut() {
        let Ok(mut record) = serde_json::from_value::<T>(slot.clone()) else {
            continue;
        };
        if !select(&record) {
            continue;
        }
        apply(&mut record);
        overlay(slot, &record);
        updated.push(record);
    }

    if !updated.is_empty() {
        store.set(key, &raw).await;
    }
    updated
}

/// Replace the first element accepted by `matches` with `record`, or append
/// it. Other elements, well-formed or not, are written back untouched.
pub async fn upsert<R, T, M>(store: &KvStore<R>, key: &str, matches: M, record: &T) -> bool
where
    R: RemoteStore,
    T: Serialize,
    M: Fn(&Value) -> bool,
{
    let mut raw: Vec<Value> = store.get(key, Vec::new()).await;
    match raw.iter_mut().find(|value| matches(value)) {
        Some(slot) => overlay(slot, record),
        None => match serde_json::to_value(record) {
            Ok(value) => raw.push(value),
            Err(e) => {
                tracing::warn!(key, "Refusing to store unserializable record: {}", e);
                return false;
            }
        },
    }
    store.set(key, &raw).await
}

/// Drop every element accepted by `matches` and append `record`.
///
/// Returns the dropped elements. Nothing is written if `record` cannot be
/// serialized.
pub async fn replace_matching<R, T, M>(
    store: &KvStore<R>,
    key: &str,
    matches: M,
    record: &T,
) -> Vec<Value>
where
    R: RemoteStore,
    T: Serialize,
    M: Fn(&Value) -> bool,
{
    let entry = match serde_json::to_value(record) {
        Ok(entry) => entry,
        Err(e) => {
            tracing::warn!(key, "Refusing to store unserializable record: {}", e);
            return Vec::new();
        }
    };

    let raw: Vec<Value> = store.get(key, Vec::new()).await;
    let (removed, mut kept): (Vec<Value>, Vec<Value>) =
        raw.into_iter().partition(|value| matches(value));
    kept.push(entry);
    if !store.set(key, &kept).await {
        tracing::warn!(key, "Replacement kept in local cache only");
    }
    removed
}

/// Drop every element accepted by `matches`. Returns how many went.
pub async fn remove_matching<R, M>(store: &KvStore<R>, key: &str, matches: M) -> usize
where
    R: RemoteStore,
    M: Fn(&Value) -> bool,
{
    let mut raw: Vec<Value> = store.get(key, Vec::new()).await;
    let before = raw.len();
    raw.retain(|value| !matches(value));
    let removed = before - raw.len();
    if removed > 0 {
        store.set(key, &raw).await;
    }
    removed
}

/// Flip a record's read flag on behalf of one of its recipients.
///
/// Records the viewer cannot see are reported as missing.
pub async fn mark_read<R, T>(
    store: &KvStore<R>,
    key: &str,
    id: &str,
    viewer: &Viewer,
) -> Result<T, AppError>
where
    R: RemoteStore,
    T: Serialize + DeserializeOwned + Targeted + Readable,
{
    let not_found = || AppError::NotFound(format!("Record {} not found", id));

    update_record(store, key, id, |record: &mut T| {
        if !record.visible_to(viewer) {
            return Err(not_found());
        }
        record.mark_read();
        Ok(())
    })
    .await?
    .ok_or_else(not_found)
}

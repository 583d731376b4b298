//! Applies a push batch to the server store.
//!
//! Upserts run folders, then pages, then alarms so references created in
//! the same batch resolve. Deletes run alarms, then pages, then folders and
//! always win. Any business-rule violation aborts the whole batch.

use crate::error::{ServerError, ServerResult};
use crate::store::{ServerData, ServerRecord};
use notesync_protocol::{
    resolve_write, Alarm, ChangeSet, Collection, DeletedIds, Folder, Page, PushResponse,
    RecordOutcome, RejectedRows,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// How a record's weak references resolved against the server.
enum References {
    /// Every reference resolves; write the record.
    Resolved,
    /// The record points at something already deleted; drop it.
    Dead,
}

/// Per-collection reference rules applied before a write.
trait Reconcile: ServerRecord {
    /// Where server copies of rejected records of this type go.
    fn rejected(rows: &mut RejectedRows) -> &mut Vec<Self>;

    /// Where already-deleted ids of this type go.
    fn deleted(ids: &mut DeletedIds) -> &mut Vec<String>;

    /// Checks and repairs references in place.
    fn resolve_references(&mut self, data: &ServerData, user_id: &str) -> ServerResult<References>;

    /// Carries server-owned fields over from the stored row.
    fn keep_derived(&mut self, _stored: Option<&Self>) {}

    /// Runs after the record was written.
    fn after_write(_data: &mut ServerData, _previous: Option<&Self>, _written: &Self, _now: i64) {}
}

impl Reconcile for Folder {
    fn rejected(rows: &mut RejectedRows) -> &mut Vec<Self> {
        &mut rows.folder
    }

    fn deleted(ids: &mut DeletedIds) -> &mut Vec<String> {
        &mut ids.folders
    }

    fn resolve_references(&mut self, _data: &ServerData, _user_id: &str) -> ServerResult<References> {
        Ok(References::Resolved)
    }

    fn keep_derived(&mut self, stored: Option<&Self>) {
        match stored {
            Some(stored) => {
                self.page_count = stored.page_count;
                self.last_page_added_at = stored.last_page_added_at;
            }
            None => {
                self.page_count = 0;
                self.last_page_added_at = None;
            }
        }
    }
}

impl Reconcile for Page {
    fn rejected(rows: &mut RejectedRows) -> &mut Vec<Self> {
        &mut rows.page
    }

    fn deleted(ids: &mut DeletedIds) -> &mut Vec<String> {
        &mut ids.pages
    }

    fn resolve_references(&mut self, data: &ServerData, user_id: &str) -> ServerResult<References> {
        let Some(folder_id) = self.folder_id.clone() else {
            return Ok(References::Resolved);
        };
        if data
            .folders
            .get(&folder_id)
            .is_some_and(|folder| folder.user_id == user_id)
        {
            return Ok(References::Resolved);
        }
        if data
            .folders
            .tombstone(&folder_id)
            .is_some_and(|t| t.user_id == user_id)
        {
            debug!(page = %self.id, folder = %folder_id, "clearing reference to deleted folder");
            self.folder_id = None;
            return Ok(References::Resolved);
        }
        Err(ServerError::rejected(
            Collection::Page,
            format!("page {} references missing folder {folder_id}", self.id),
        ))
    }

    fn keep_derived(&mut self, _stored: Option<&Self>) {
        self.refresh_length();
    }

    fn after_write(data: &mut ServerData, previous: Option<&Self>, written: &Self, now: i64) {
        let Some(folder_id) = &written.folder_id else {
            return;
        };
        let moved_in = previous.map_or(true, |prev| prev.folder_id.as_ref() != Some(folder_id));
        if moved_in {
            if let Some(folder) = data.folders.get_mut(folder_id) {
                folder.last_page_added_at = Some(now);
            }
        }
    }
}

impl Reconcile for Alarm {
    fn rejected(rows: &mut RejectedRows) -> &mut Vec<Self> {
        &mut rows.alarm
    }

    fn deleted(ids: &mut DeletedIds) -> &mut Vec<String> {
        &mut ids.alarms
    }

    fn resolve_references(&mut self, data: &ServerData, user_id: &str) -> ServerResult<References> {
        if data
            .pages
            .get(&self.page_id)
            .is_some_and(|page| page.user_id == user_id)
        {
            return Ok(References::Resolved);
        }
        if data
            .pages
            .tombstone(&self.page_id)
            .is_some_and(|t| t.user_id == user_id)
        {
            return Ok(References::Dead);
        }
        Err(ServerError::rejected(
            Collection::Alarm,
            format!("alarm {} references missing page {}", self.id, self.page_id),
        ))
    }
}

/// Applies one push batch for `user_id` and returns the acknowledgement.
///
/// Runs inside a store transaction; an `Err` leaves the store untouched.
pub fn apply_push(
    data: &mut ServerData,
    user_id: &str,
    changes: ChangeSet,
    now: i64,
) -> ServerResult<PushResponse> {
    let mut response = PushResponse::default();
    let ChangeSet {
        page,
        folder,
        alarm,
    } = changes;
    let page = page.unwrap_or_default();
    let folder = folder.unwrap_or_default();
    let alarm = alarm.unwrap_or_default();

    upsert_all(data, user_id, folder.created.into_iter().chain(folder.updated), now, &mut response)?;
    upsert_all(data, user_id, page.created.into_iter().chain(page.updated), now, &mut response)?;
    upsert_all(data, user_id, alarm.created.into_iter().chain(alarm.updated), now, &mut response)?;

    delete_alarms(data, user_id, &alarm.deleted, now, &mut response)?;
    delete_pages(data, user_id, &page.deleted, now, &mut response)?;
    delete_folders(data, user_id, &folder.deleted, now, &mut response)?;

    recount_folders(data, user_id);
    debug!(
        user = user_id,
        accepted = response.accepted,
        rejected = response.rejected.len(),
        "push applied"
    );
    Ok(response)
}

fn upsert_all<T: Reconcile>(
    data: &mut ServerData,
    user_id: &str,
    records: impl Iterator<Item = T>,
    now: i64,
    response: &mut PushResponse,
) -> ServerResult<()> {
    for record in records {
        upsert(data, user_id, record, now, response)?;
    }
    Ok(())
}

fn upsert<T: Reconcile>(
    data: &mut ServerData,
    user_id: &str,
    mut record: T,
    now: i64,
    response: &mut PushResponse,
) -> ServerResult<()> {
    let id = record.id().to_string();
    check_owner::<T>(data, user_id, &id)?;
    record.set_user_id(user_id);

    let table = T::table(data);
    let stored = table.get(&id).cloned();
    let tombstoned = table.tombstone(&id).is_some();

    match resolve_write(stored.as_ref().map(T::updated_at), record.updated_at(), tombstoned) {
        RecordOutcome::Deleted => T::deleted(&mut response.deleted).push(id),
        RecordOutcome::Rejected => {
            debug!(collection = %T::COLLECTION, %id, "stale write kept at server version");
            if let Some(stored) = stored {
                T::rejected(&mut response.rejected).push(stored);
            }
        }
        RecordOutcome::Accepted => match record.resolve_references(data, user_id)? {
            References::Dead => T::deleted(&mut response.deleted).push(id),
            References::Resolved => {
                // created_at is the pull ordering key and never moves once stored
                match &stored {
                    Some(stored) => record.set_created_at(stored.created_at()),
                    None if record.created_at() == 0 => record.set_created_at(now),
                    None => {}
                }
                record.keep_derived(stored.as_ref());
                T::after_write(data, stored.as_ref(), &record, now);
                T::table_mut(data).put(record);
                response.accepted += 1;
            }
        },
    }
    Ok(())
}

fn check_owner<T: ServerRecord>(data: &ServerData, user_id: &str, id: &str) -> ServerResult<()> {
    let table = T::table(data);
    let owner = table
        .get(id)
        .map(|row| row.user_id().to_string())
        .or_else(|| table.tombstone(id).map(|t| t.user_id.clone()));
    match owner {
        Some(owner) if owner != user_id => Err(ServerError::rejected(
            T::COLLECTION,
            format!("{} {id} belongs to another user", T::COLLECTION),
        )),
        _ => Ok(()),
    }
}

fn delete_alarms(
    data: &mut ServerData,
    user_id: &str,
    ids: &[String],
    now: i64,
    response: &mut PushResponse,
) -> ServerResult<()> {
    for id in ids {
        check_owner::<Alarm>(data, user_id, id)?;
        data.alarms.bury(id, user_id, now);
        response.accepted += 1;
    }
    Ok(())
}

fn delete_pages(
    data: &mut ServerData,
    user_id: &str,
    ids: &[String],
    now: i64,
    response: &mut PushResponse,
) -> ServerResult<()> {
    for id in ids {
        check_owner::<Page>(data, user_id, id)?;
        data.pages.bury(id, user_id, now);

        let orphans: Vec<String> = data
            .alarms
            .owned_by(user_id)
            .filter(|alarm| &alarm.page_id == id)
            .map(|alarm| alarm.id.clone())
            .collect();
        for alarm_id in orphans {
            data.alarms.bury(&alarm_id, user_id, now);
        }
        response.accepted += 1;
    }
    Ok(())
}

fn delete_folders(
    data: &mut ServerData,
    user_id: &str,
    ids: &[String],
    now: i64,
    response: &mut PushResponse,
) -> ServerResult<()> {
    for id in ids {
        check_owner::<Folder>(data, user_id, id)?;
        data.folders.bury(id, user_id, now);

        let mut cleared = 0;
        for page in data.pages.owned_by_mut(user_id) {
            if page.folder_id.as_deref() == Some(id.as_str()) {
                page.folder_id = None;
                page.updated_at = now.max(page.updated_at + 1);
                cleared += 1;
            }
        }
        debug!(folder = %id, pages = cleared, "folder deleted, member pages detached");
        response.accepted += 1;
    }
    Ok(())
}

/// Recomputes every folder's `page_count` from live membership.
fn recount_folders(data: &mut ServerData, user_id: &str) {
    let mut counts = BTreeMap::<String, i64>::new();
    for page in data.pages.owned_by(user_id) {
        if let Some(folder_id) = &page.folder_id {
            *counts.entry(folder_id.clone()).or_default() += 1;
        }
    }
    let folder_ids: BTreeSet<String> = data.folders.owned_by(user_id).map(|f| f.id.clone()).collect();
    for folder_id in folder_ids {
        if let Some(folder) = data.folders.get_mut(&folder_id) {
            folder.page_count = counts.get(&folder_id).copied().unwrap_or(0);
        }
    }
}

//! Domain operations with referential integrity.
//!
//! Folders and pages are linked by a weak reference (`Page::folder_id`) and
//! pages and alarms by `Alarm::page_id`. There are no foreign keys; these
//! operations keep the references valid inside the caller's transaction.

use crate::error::{StoreError, StoreResult};
use crate::store::Transaction;
use crate::table::StoreData;
use notesync_protocol::{Alarm, Collection, Folder, Page, SyncRecord};
use tracing::debug;

impl Transaction<'_> {
    /// Creates a folder.
    pub fn create_folder(&mut self, mut folder: Folder) -> StoreResult<Folder> {
        folder.page_count = 0;
        folder.last_page_added_at = None;
        self.insert(folder)
    }

    /// Updates a folder's own fields.
    ///
    /// `page_count` and `last_page_added_at` are maintained by the store and
    /// cannot be set here.
    pub fn update_folder(&mut self, id: &str, f: impl FnOnce(&mut Folder)) -> StoreResult<Folder> {
        self.update(id, |folder: &mut Folder| {
            let page_count = folder.page_count;
            let last_page_added_at = folder.last_page_added_at;
            f(folder);
            folder.page_count = page_count;
            folder.last_page_added_at = last_page_added_at;
        })
    }

    /// Deletes a folder and detaches its pages.
    pub fn delete_folder(&mut self, id: &str) -> StoreResult<Folder> {
        let members: Vec<String> = self
            .data
            .pages
            .iter()
            .filter(|row| row.is_live() && row.record.folder_id.as_deref() == Some(id))
            .map(|row| row.record.id.clone())
            .collect();

        for page_id in &members {
            self.update(page_id, |page: &mut Page| page.folder_id = None)?;
        }
        debug!(folder = id, detached = members.len(), "deleting folder");
        self.remove::<Folder>(id)
    }

    /// Creates a page, optionally inside a folder.
    pub fn create_page(&mut self, mut page: Page) -> StoreResult<Page> {
        self.check_folder(&page)?;
        page.refresh_length();
        let page = self.insert(page)?;
        if let Some(folder_id) = &page.folder_id {
            touch_folder(self.data, folder_id, page.created_at);
        }
        Ok(page)
    }

    /// Updates a page. Moving it to another folder adjusts both folders.
    pub fn update_page(&mut self, id: &str, f: impl FnOnce(&mut Page)) -> StoreResult<Page> {
        let previous_folder = self
            .get::<Page>(id)
            .ok_or_else(|| StoreError::not_found(Collection::Page, id))?
            .folder_id
            .clone();

        let mut candidate = self
            .get::<Page>(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(Collection::Page, id))?;
        f(&mut candidate);
        self.check_folder(&candidate)?;

        let page = self.update(id, move |page: &mut Page| {
            *page = candidate;
            page.refresh_length();
        })?;

        if page.folder_id != previous_folder {
            if let Some(old) = &previous_folder {
                recount_folder(self.data, old);
            }
            if let Some(new) = &page.folder_id {
                touch_folder(self.data, new, page.updated_at);
            }
        }
        Ok(page)
    }

    /// Deletes a page and every alarm attached to it.
    pub fn delete_page(&mut self, id: &str) -> StoreResult<Page> {
        let alarms: Vec<String> = self
            .data
            .alarms
            .iter()
            .filter(|row| row.is_live() && row.record.page_id == id)
            .map(|row| row.record.id.clone())
            .collect();
        for alarm_id in &alarms {
            self.remove::<Alarm>(alarm_id)?;
        }

        let page = self.remove::<Page>(id)?;
        if let Some(folder_id) = &page.folder_id {
            recount_folder(self.data, folder_id);
        }
        Ok(page)
    }

    /// Creates an alarm for a live page.
    pub fn create_alarm(&mut self, alarm: Alarm) -> StoreResult<Alarm> {
        self.check_page(&alarm)?;
        self.insert(alarm)
    }

    /// Updates an alarm.
    pub fn update_alarm(&mut self, id: &str, f: impl FnOnce(&mut Alarm)) -> StoreResult<Alarm> {
        let mut candidate = self
            .get::<Alarm>(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(Collection::Alarm, id))?;
        f(&mut candidate);
        self.check_page(&candidate)?;
        self.update(id, move |alarm: &mut Alarm| *alarm = candidate)
    }

    /// Deletes an alarm.
    pub fn delete_alarm(&mut self, id: &str) -> StoreResult<Alarm> {
        self.remove::<Alarm>(id)
    }

    fn check_folder(&self, page: &Page) -> StoreResult<()> {
        match &page.folder_id {
            Some(folder_id) if !self.data.folders.contains_live(folder_id) => {
                Err(StoreError::MissingReference {
                    collection: Collection::Page,
                    id: page.id.clone(),
                    field: "folder_id",
                    target: folder_id.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    fn check_page(&self, alarm: &Alarm) -> StoreResult<()> {
        if self.data.pages.contains_live(&alarm.page_id) {
            Ok(())
        } else {
            Err(StoreError::MissingReference {
                collection: Collection::Alarm,
                id: alarm.id().to_string(),
                field: "page_id",
                target: alarm.page_id.clone(),
            })
        }
    }
}

/// Recounts a folder and records that a page just joined it.
fn touch_folder(data: &mut StoreData, folder_id: &str, at: i64) {
    recount_folder(data, folder_id);
    if let Some(row) = data.folders.get_mut(folder_id) {
        row.record.last_page_added_at = Some(at);
    }
}

/// Sets a folder's `page_count` to the number of live pages inside it.
///
/// The count is derived on both sides, so this does not mark the folder as
/// changed.
pub(crate) fn recount_folder(data: &mut StoreData, folder_id: &str) {
    let count = data
        .pages
        .iter()
        .filter(|row| row.is_live() && row.record.folder_id.as_deref() == Some(folder_id))
        .count() as i64;
    if let Some(row) = data.folders.get_mut(folder_id) {
        row.record.page_count = count;
    }
}

/// Recounts every folder.
pub(crate) fn recount_all(data: &mut StoreData) {
    let ids: Vec<String> = data.folders.iter().map(|row| row.record.id.clone()).collect();
    for id in ids {
        recount_folder(data, &id);
    }
}

//! Push client.

use crate::collector::{collect_changes, pushed_deletions, pushed_versions, summarize};
use crate::config::RetryConfig;
use crate::error::{SyncError, SyncResult};
use crate::retry::retry_and_continue;
use crate::transport::SyncTransport;
use notesync_protocol::{validate_push_body, Alarm, ChangeSet, Folder, Page, PushRequest, PushResponse};
use notesync_store::{LocalStore, MergeStats, StoreResult, Transaction};
use tracing::{debug, info};

/// What one push accomplished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushOutcome {
    /// Changes sent.
    pub sent: usize,
    /// Records the server accepted.
    pub accepted: u64,
    /// Records the server kept its own newer version of.
    pub rejected: usize,
    /// Records marked `synced` locally.
    pub settled: usize,
    /// Acknowledged local deletions that were purged.
    pub purged: usize,
}

/// Uploads pending local changes as one batch.
pub struct PushClient<'a, T: SyncTransport + ?Sized> {
    store: &'a LocalStore,
    transport: &'a T,
    bookkeeping_retry: &'a RetryConfig,
}

impl<'a, T: SyncTransport + ?Sized> PushClient<'a, T> {
    /// Creates a push client.
    pub fn new(store: &'a LocalStore, transport: &'a T, bookkeeping_retry: &'a RetryConfig) -> Self {
        Self {
            store,
            transport,
            bookkeeping_retry,
        }
    }

    /// Pushes every pending change.
    ///
    /// Nothing is sent when nothing is pending. The whole batch is validated
    /// before sending; a validation or transport failure leaves the local
    /// store untouched. After the server acknowledges the batch, pushed
    /// records are marked `synced` (unless edited again meanwhile),
    /// acknowledged deletions are purged and the server's versions of
    /// rejected records are written back.
    ///
    /// # Errors
    ///
    /// - `Validation` if any record fails the minimal record contract
    /// - `Network` on transport failure
    /// - `Server` if the server rejects the batch
    pub fn push(&self, last_pulled_at: Option<i64>) -> SyncResult<PushOutcome> {
        let changes = collect_changes(self.store);
        if changes.is_empty() {
            debug!("nothing to push");
            return Ok(PushOutcome::default());
        }

        let body =
            serde_json::to_value(&changes).map_err(|e| SyncError::Protocol(e.to_string()))?;
        validate_push_body(&body)?;

        info!(changes = %summarize(&changes), "pushing");
        let response = self
            .transport
            .push(&PushRequest::new(changes.clone(), last_pulled_at))?;

        let mut outcome = PushOutcome {
            sent: changes.len(),
            accepted: response.accepted,
            rejected: response.rejected.len(),
            ..PushOutcome::default()
        };

        // the server has committed, so a bookkeeping failure only logs
        if let Some((settled, purged)) = retry_and_continue(
            "acknowledge push",
            self.bookkeeping_retry,
            || self.acknowledge(&changes, &response),
        ) {
            outcome.settled = settled;
            outcome.purged = purged;
        }

        info!(
            accepted = outcome.accepted,
            rejected = outcome.rejected,
            settled = outcome.settled,
            "push acknowledged"
        );
        Ok(outcome)
    }

    fn acknowledge(&self, changes: &ChangeSet, response: &PushResponse) -> StoreResult<(usize, usize)> {
        self.store.transaction(|txn| {
            let settled = txn.mark_synced::<Page>(&pushed_versions(changes.page.as_ref()))
                + txn.mark_synced::<Folder>(&pushed_versions(changes.folder.as_ref()))
                + txn.mark_synced::<Alarm>(&pushed_versions(changes.alarm.as_ref()));

            let purged = txn.purge_deleted::<Alarm>(&pushed_deletions(changes.alarm.as_ref()))
                + txn.purge_deleted::<Page>(&pushed_deletions(changes.page.as_ref()))
                + txn.purge_deleted::<Folder>(&pushed_deletions(changes.folder.as_ref()));

            let merged = write_back(txn, response);
            debug!(?merged, "applied push response");
            Ok((settled, purged))
        })
    }
}

/// Applies the server's answer: its versions of rejected records and the
/// ids it had already deleted.
fn write_back(txn: &mut Transaction<'_>, response: &PushResponse) -> MergeStats {
    let mut merged = txn.apply_remote_deletes(&response.deleted);
    merged += txn.apply_remote(response.rejected.folder.clone());
    merged += txn.apply_remote(response.rejected.page.clone());
    merged += txn.apply_remote(response.rejected.alarm.clone());
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use notesync_protocol::{DeletedIds, RecordStatus, RejectedRows};
    use std::time::Duration;

    fn retry() -> RetryConfig {
        RetryConfig::new(2).with_delay(Duration::ZERO)
    }

    #[test]
    fn nothing_pending_sends_nothing() {
        let store = LocalStore::open_in_memory("u1");
        let transport = MockTransport::new();
        let outcome = PushClient::new(&store, &transport, &retry()).push(None).unwrap();
        assert_eq!(outcome, PushOutcome::default());
        assert!(transport.push_requests().is_empty());
    }

    #[test]
    fn successful_push_settles_records() {
        let store = LocalStore::open_in_memory("u1");
        store.create_folder(Folder::new("f1", "A")).unwrap();
        store.create_page(Page::new("p1").with_folder("f1")).unwrap();

        let transport = MockTransport::new();
        transport.set_push_response(PushResponse {
            accepted: 2,
            ..PushResponse::default()
        });

        let outcome = PushClient::new(&store, &transport, &retry())
            .push(Some(42))
            .unwrap();
        assert_eq!(outcome.sent, 2);
        assert_eq!(outcome.settled, 2);
        assert!(!store.has_pending());

        let sent = &transport.push_requests()[0];
        assert_eq!(sent.last_pulled_at, Some(42));
        assert_eq!(sent.changes.count(notesync_protocol::Collection::Page), 1);
    }

    #[test]
    fn failed_push_leaves_changes_pending() {
        let store = LocalStore::open_in_memory("u1");
        store.create_page(Page::new("p1")).unwrap();
        let transport = MockTransport::new();
        transport.fail_next(1);

        let err = PushClient::new(&store, &transport, &retry())
            .push(None)
            .unwrap_err();
        assert!(matches!(err, SyncError::Network { .. }));
        assert_eq!(store.pending::<Page>().len(), 1);
    }

    #[test]
    fn rejected_rows_are_written_back() {
        let store = LocalStore::open_in_memory("u1");
        let mine = store.create_page(Page::new("p1").with_title("mine")).unwrap();

        let mut theirs = mine.clone().with_title("theirs");
        theirs.updated_at = mine.updated_at + 10;
        theirs.refresh_length();

        let transport = MockTransport::new();
        transport.set_push_response(PushResponse {
            accepted: 0,
            rejected: RejectedRows {
                page: vec![theirs],
                ..RejectedRows::default()
            },
            ..PushResponse::default()
        });

        let outcome = PushClient::new(&store, &transport, &retry())
            .push(None)
            .unwrap();
        assert_eq!(outcome.rejected, 1);
        assert_eq!(store.get::<Page>("p1").unwrap().title, "theirs");
        assert_eq!(store.records::<Page>()[0].status, RecordStatus::Synced);
    }

    #[test]
    fn deletions_are_purged_and_server_deletes_applied() {
        let store = LocalStore::open_in_memory("u1");
        store.create_page(Page::new("gone")).unwrap();
        store.create_page(Page::new("kept")).unwrap();
        store
            .transaction(|txn| {
                let v = txn.get::<Page>("gone").unwrap().updated_at;
                txn.mark_synced::<Page>(&[("gone".into(), v)]);
                Ok(())
            })
            .unwrap();
        store.delete_page("gone").unwrap();
        store.create_page(Page::new("stale")).unwrap();

        let transport = MockTransport::new();
        transport.set_push_response(PushResponse {
            accepted: 2,
            deleted: DeletedIds {
                pages: vec!["stale".into()],
                ..DeletedIds::default()
            },
            ..PushResponse::default()
        });

        let outcome = PushClient::new(&store, &transport, &retry())
            .push(None)
            .unwrap();
        assert_eq!(outcome.purged, 1);
        let ids: Vec<String> = store.records::<Page>().into_iter().map(|r| r.record.id).collect();
        assert_eq!(ids, vec!["kept".to_string()]);
    }
}

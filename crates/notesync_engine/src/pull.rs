//! Pull client.

use crate::error::{SyncError, SyncResult};
use crate::transport::SyncTransport;
use notesync_protocol::{Alarm, PullCursor, PullRequest, PullResponse};
use notesync_store::{LocalStore, MergeStats};
use tracing::{debug, info};

/// What one pull cycle accomplished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullOutcome {
    /// Chunks fetched.
    pub chunks: usize,
    /// Rows received, including tombstoned ids.
    pub received: usize,
    /// Merge results summed over all chunks.
    pub merged: MergeStats,
    /// Server time recorded as `last_pulled_at`, if the server sent one.
    pub server_time: Option<i64>,
}

/// Downloads server changes in cursor order and merges them locally.
pub struct PullClient<'a, T: SyncTransport + ?Sized> {
    store: &'a LocalStore,
    transport: &'a T,
}

impl<'a, T: SyncTransport + ?Sized> PullClient<'a, T> {
    /// Creates a pull client.
    pub fn new(store: &'a LocalStore, transport: &'a T) -> Self {
        Self { store, transport }
    }

    /// Fetches one chunk after `cursor`. `None` opens a new cycle.
    pub fn pull(&self, cursor: Option<PullCursor>) -> SyncResult<PullResponse> {
        let request = PullRequest::new(cursor, self.store.last_pulled_at());
        self.transport.pull(&request)
    }

    /// Runs a full pull cycle.
    ///
    /// Chunks are applied in the order received, each in its own
    /// transaction, so a failure keeps the chunks already applied. Alarms
    /// are held back until every page chunk has arrived, then merged
    /// together with the cycle's `server_time`.
    pub fn pull_all(&self) -> SyncResult<PullOutcome> {
        let mut outcome = PullOutcome::default();
        let mut cursor: Option<PullCursor> = None;
        let mut alarms: Vec<Alarm> = Vec::new();

        loop {
            let first = cursor.is_none();
            let response = self.pull(cursor.clone())?;
            outcome.chunks += 1;
            outcome.received += response.row_count();

            let next = response.cursor()?;
            let has_more = response.has_more;
            if first {
                outcome.server_time = response.server_time;
            }

            let PullResponse {
                pages,
                folders,
                alarms: chunk_alarms,
                deleted,
                ..
            } = response;
            alarms.extend(chunk_alarms);

            let page_count = pages.len();
            let merged = self.store.transaction(|txn| {
                let mut merged = MergeStats::default();
                if first {
                    merged += txn.apply_remote_deletes(&deleted);
                }
                merged += txn.apply_remote(folders);
                merged += txn.apply_remote(pages);
                Ok(merged)
            })?;
            outcome.merged += merged;
            debug!(chunk = outcome.chunks, pages = page_count, has_more, "applied pull chunk");

            if !has_more {
                break;
            }
            cursor = match next {
                Some(next) if cursor.as_ref() != Some(&next) => Some(next),
                // an empty first chunk that still claims more would loop forever
                _ => return Err(SyncError::Protocol("pull cursor did not advance".into())),
            };
        }

        let server_time = outcome.server_time;
        outcome.merged += self.store.transaction(|txn| {
            let merged = txn.apply_remote(alarms);
            if let Some(server_time) = server_time {
                txn.set_last_pulled_at(server_time);
            }
            Ok(merged)
        })?;

        info!(
            chunks = outcome.chunks,
            applied = outcome.merged.applied,
            kept = outcome.merged.kept,
            removed = outcome.merged.removed,
            "pull complete"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use notesync_protocol::{DeletedIds, Folder, Page};

    fn page(id: &str, created_at: i64) -> Page {
        let mut page = Page::new(id).with_title(id).with_timestamps(created_at, created_at);
        page.user_id = "u1".into();
        page.refresh_length();
        page
    }

    fn chunk(pages: Vec<Page>, has_more: bool) -> PullResponse {
        let mut response = PullResponse {
            has_more,
            ..PullResponse::default()
        };
        let cursor = pages.last().map(|p| PullCursor::new(p.created_at, p.id.clone()));
        response.pages = pages;
        response.set_cursor(cursor);
        response
    }

    #[test]
    fn follows_cursor_until_exhausted() {
        let store = LocalStore::open_in_memory("u1");
        let transport = MockTransport::new();

        let mut first = chunk(vec![page("a", 1), page("b", 2)], true);
        first.folders = vec![Folder::new("f1", "A").with_timestamps(1, 1)];
        first.server_time = Some(500);
        transport.queue_pull_response(first);
        transport.queue_pull_response(chunk(vec![page("c", 3)], false));

        let outcome = PullClient::new(&store, &transport).pull_all().unwrap();
        assert_eq!(outcome.chunks, 2);
        assert_eq!(outcome.merged.applied, 4);
        assert_eq!(store.list::<Page>(&Default::default()).len(), 3);
        assert_eq!(store.last_pulled_at(), Some(500));

        let requests = transport.pull_requests();
        assert!(requests[0].is_first_chunk());
        assert_eq!(requests[1].cursor, Some(PullCursor::new(2, "b")));
    }

    #[test]
    fn next_cycle_sends_last_pulled_at() {
        let store = LocalStore::open_in_memory("u1");
        let transport = MockTransport::new();
        transport.queue_pull_response(PullResponse {
            server_time: Some(900),
            ..PullResponse::default()
        });
        PullClient::new(&store, &transport).pull_all().unwrap();
        PullClient::new(&store, &transport).pull_all().unwrap();

        let requests = transport.pull_requests();
        assert_eq!(requests[0].last_pulled_at, None);
        assert_eq!(requests[1].last_pulled_at, Some(900));
    }

    #[test]
    fn alarms_wait_for_later_page_chunks() {
        let store = LocalStore::open_in_memory("u1");
        let transport = MockTransport::new();

        let mut first = chunk(vec![page("a", 1)], true);
        first.alarms = vec![Alarm::new("al", "z", 10).with_timestamps(1, 1)];
        transport.queue_pull_response(first);
        transport.queue_pull_response(chunk(vec![page("z", 9)], false));

        let outcome = PullClient::new(&store, &transport).pull_all().unwrap();
        assert_eq!(outcome.merged.skipped, 0);
        assert!(store.get::<Alarm>("al").is_some());
    }

    #[test]
    fn tombstones_remove_local_rows() {
        let store = LocalStore::open_in_memory("u1");
        store
            .transaction(|txn| Ok(txn.apply_remote(vec![page("a", 1)])))
            .unwrap();

        let transport = MockTransport::new();
        transport.queue_pull_response(PullResponse {
            deleted: DeletedIds {
                pages: vec!["a".into()],
                ..DeletedIds::default()
            },
            ..PullResponse::default()
        });

        let outcome = PullClient::new(&store, &transport).pull_all().unwrap();
        assert_eq!(outcome.merged.removed, 1);
        assert!(store.records::<Page>().is_empty());
    }

    #[test]
    fn failed_chunk_keeps_earlier_chunks() {
        let store = LocalStore::open_in_memory("u1");
        let transport = MockTransport::new();
        let mut first = chunk(vec![page("a", 1)], true);
        first.server_time = Some(77);
        let mut broken = chunk(vec![page("b", 2)], false);
        broken.created_at = Some("not-a-time".into());
        transport.queue_pull_response(first.clone());
        transport.queue_pull_response(broken);

        let client = PullClient::new(&store, &transport);
        assert!(client.pull_all().is_err());
        assert!(store.get::<Page>("a").is_some());
        assert!(store.get::<Page>("b").is_none());
        assert_eq!(store.last_pulled_at(), None);

        transport.queue_pull_response(first);
        transport.queue_pull_response(chunk(vec![page("b", 2)], false));
        let outcome = client.pull_all().unwrap();
        assert_eq!(outcome.chunks, 2);
        assert!(store.get::<Page>("b").is_some());
        assert_eq!(store.last_pulled_at(), Some(77));
    }

    #[test]
    fn stuck_cursor_is_an_error() {
        let store = LocalStore::open_in_memory("u1");
        let transport = MockTransport::new();
        transport.queue_pull_response(chunk(Vec::new(), true));

        let err = PullClient::new(&store, &transport).pull_all().unwrap_err();
        assert!(matches!(err, SyncError::Protocol(_)));
    }
}

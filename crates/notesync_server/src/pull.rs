//! Builds pull chunks in `(created_at, id)` order.

use crate::config::ServerConfig;
use crate::store::ServerData;
use notesync_protocol::{DeletedIds, Page, PullCursor, PullRequest, PullResponse, SyncRecord};

/// Produces the chunk following `request.cursor` for `user_id`.
///
/// A chunk takes pages while it holds fewer than `max_pull_rows` rows and
/// the next page still fits the character budget. The first page of a
/// chunk is always taken so an oversize page cannot stall pagination.
///
/// The first chunk of a cycle (no cursor) also carries the full folder and
/// alarm snapshots, the ids tombstoned since `last_pulled_at`, and the
/// server time the client should send as `last_pulled_at` next cycle.
pub fn pull_chunk(
    data: &ServerData,
    user_id: &str,
    request: &PullRequest,
    config: &ServerConfig,
    now: i64,
) -> PullResponse {
    let mut remaining: Vec<&Page> = data
        .pages
        .owned_by(user_id)
        .filter(|page| {
            request
                .cursor
                .as_ref()
                .map_or(true, |cursor| cursor.precedes(page.created_at, &page.id))
        })
        .collect();
    remaining.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut size = 0usize;
    let mut taken = 0usize;
    for page in &remaining {
        let row_size = page.content_size();
        let fits = taken < config.max_pull_rows && size + row_size <= config.target_pull_size;
        if taken > 0 && !fits {
            break;
        }
        size += row_size;
        taken += 1;
    }

    let pages: Vec<Page> = remaining[..taken].iter().map(|page| (*page).clone()).collect();
    let mut response = PullResponse {
        has_more: taken < remaining.len(),
        ..PullResponse::default()
    };
    response.set_cursor(pages.last().map(|p| PullCursor::new(p.created_at, p.id.clone())));
    response.pages = pages;

    if request.is_first_chunk() {
        response.folders = data.folders.owned_by(user_id).cloned().collect();
        response.alarms = data.alarms.owned_by(user_id).cloned().collect();
        response.deleted = DeletedIds {
            pages: data.pages.buried_since(user_id, request.last_pulled_at),
            folders: data.folders.buried_since(user_id, request.last_pulled_at),
            alarms: data.alarms.buried_since(user_id, request.last_pulled_at),
        };
        response.server_time = Some(now);
    }
    response
}

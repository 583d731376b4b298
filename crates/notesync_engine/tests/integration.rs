//! Integration tests: client engines against an in-process sync server.

use notesync_engine::{
    HttpTransport, LoopbackClient, PullClient, SyncConfig, SyncEngine, SyncError,
    SyncOrchestrator, SyncTransport,
};
use notesync_protocol::{
    Alarm, ChangeBatch, ChangeSet, Folder, HttpRequest, HttpResponse, Page, PullRequest,
    PullResponse, PushRequest, PushResponse, RecordStatus,
};
use notesync_server::{AuthConfig, ServerConfig, SyncServer, TokenValidator};
use notesync_store::{LocalStore, ManualClock};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type Handler = Box<dyn Fn(&HttpRequest) -> HttpResponse + Send + Sync>;
type Transport = HttpTransport<LoopbackClient<Handler>>;
type Client = SyncEngine<Transport>;

fn transport(server: &Arc<SyncServer>, token: Option<&str>) -> Transport {
    let server = Arc::clone(server);
    let handler: Handler = Box::new(move |request: &HttpRequest| server.handle(request));
    let config = match token {
        Some(token) => SyncConfig::new("memory://").with_token(token),
        None => SyncConfig::new("memory://"),
    };
    HttpTransport::from_config(&config, LoopbackClient::new(handler))
}

/// A client for `user` whose bearer token is the user id (server without auth).
fn client(server: &Arc<SyncServer>, user: &str, clock: &Arc<ManualClock>) -> Client {
    let store = Arc::new(LocalStore::open_in_memory(user).with_clock(clock.clone()));
    SyncEngine::new(
        SyncConfig::new("memory://"),
        transport(server, Some(user)),
        store,
    )
}

fn server(config: ServerConfig) -> Arc<SyncServer> {
    Arc::new(SyncServer::new(config))
}

fn page_title(client: &Client, id: &str) -> Option<String> {
    client.store().get::<Page>(id).map(|page| page.title)
}

#[test]
fn changes_travel_between_devices() {
    let server = server(ServerConfig::default());
    let clock = Arc::new(ManualClock::new(1_000));
    let laptop = client(&server, "u1", &clock);
    let phone = client(&server, "u1", &clock);

    laptop.store().create_folder(Folder::new("f1", "Work")).unwrap();
    laptop
        .store()
        .create_page(Page::new("p1").with_title("Plan").with_folder("f1"))
        .unwrap();
    laptop.store().create_alarm(Alarm::new("a1", "p1", 9_000)).unwrap();

    let result = laptop.run_cycle().unwrap();
    assert_eq!(result.push.sent, 3);
    assert_eq!(result.push.accepted, 3);
    assert!(!laptop.store().has_pending());

    phone.run_cycle().unwrap();
    assert_eq!(page_title(&phone, "p1").as_deref(), Some("Plan"));
    assert_eq!(phone.store().get::<Folder>("f1").unwrap().page_count, 1);
    assert_eq!(phone.store().get::<Alarm>("a1").unwrap().page_id, "p1");
    assert!(!phone.store().has_pending());
}

#[test]
fn users_do_not_see_each_other() {
    let server = server(ServerConfig::default());
    let clock = Arc::new(ManualClock::new(1_000));
    let alice = client(&server, "alice", &clock);
    let bob = client(&server, "bob", &clock);

    alice.store().create_page(Page::new("p1").with_title("secret")).unwrap();
    alice.run_cycle().unwrap();
    bob.run_cycle().unwrap();

    assert!(bob.store().get::<Page>("p1").is_none());
}

#[test]
fn later_edit_wins_whichever_device_pushes_first() {
    for laptop_first in [true, false] {
        let server = server(ServerConfig::default());
        let laptop_clock = Arc::new(ManualClock::new(1_000));
        let phone_clock = Arc::new(ManualClock::new(1_000));
        let laptop = client(&server, "u1", &laptop_clock);
        let phone = client(&server, "u1", &phone_clock);

        laptop.store().create_page(Page::new("p1").with_title("draft")).unwrap();
        laptop.run_cycle().unwrap();
        phone.run_cycle().unwrap();

        laptop_clock.set(1_200);
        laptop
            .store()
            .update_page("p1", |page| page.title = "from laptop".into())
            .unwrap();
        phone_clock.set(1_100);
        phone
            .store()
            .update_page("p1", |page| page.title = "from phone".into())
            .unwrap();

        if laptop_first {
            laptop.run_cycle().unwrap();
            let result = phone.run_cycle().unwrap();
            assert_eq!(result.push.rejected, 1);
        } else {
            phone.run_cycle().unwrap();
            laptop.run_cycle().unwrap();
            phone.run_cycle().unwrap();
        }

        assert_eq!(page_title(&laptop, "p1").as_deref(), Some("from laptop"));
        assert_eq!(page_title(&phone, "p1").as_deref(), Some("from laptop"));
        assert!(!phone.store().has_pending());
    }
}

#[test]
fn stale_push_does_not_overwrite() {
    let server = server(ServerConfig::default());
    let transport = transport(&server, Some("u1"));
    let push = |updated_at: i64, title: &str| {
        let page = Page::new("p1").with_title(title).with_timestamps(10, updated_at);
        let changes = ChangeSet {
            page: Some(ChangeBatch {
                created: vec![page],
                ..ChangeBatch::default()
            }),
            ..ChangeSet::default()
        };
        transport.push(&PushRequest::new(changes, None)).unwrap()
    };

    push(100, "A");
    let response = push(50, "B");
    assert_eq!(response.rejected.page[0].title, "A");

    push(150, "C");
    let stored = server
        .store()
        .read(|data| data.pages.get("p1").map(|page| page.title.clone()));
    assert_eq!(stored.as_deref(), Some("C"));
}

#[test]
fn small_chunks_still_deliver_everything() {
    let server = server(ServerConfig::default().with_target_pull_size(10));
    let clock = Arc::new(ManualClock::new(1_000));
    let writer = client(&server, "u1", &clock);
    writer.store().create_page(Page::new("p1").with_body("123456")).unwrap();
    clock.advance(1);
    writer.store().create_page(Page::new("p2").with_body("12345678")).unwrap();
    writer.run_cycle().unwrap();

    let reader = client(&server, "u1", &clock);
    let outcome = PullClient::new(reader.store(), reader.transport().as_ref())
        .pull_all()
        .unwrap();
    assert_eq!(outcome.chunks, 2);
    assert!(reader.store().get::<Page>("p1").is_some());
    assert!(reader.store().get::<Page>("p2").is_some());
}

#[test]
fn folder_delete_reaches_other_devices() {
    let server = server(ServerConfig::default());
    let clock = Arc::new(ManualClock::new(1_000));
    let laptop = client(&server, "u1", &clock);
    let phone = client(&server, "u1", &clock);

    laptop.store().create_folder(Folder::new("f1", "Work")).unwrap();
    laptop.store().create_page(Page::new("p1").with_folder("f1")).unwrap();
    laptop.run_cycle().unwrap();
    phone.run_cycle().unwrap();
    assert_eq!(
        phone.store().get::<Page>("p1").unwrap().folder_id.as_deref(),
        Some("f1")
    );

    clock.advance(10);
    laptop.store().delete_folder("f1").unwrap();
    laptop.run_cycle().unwrap();
    phone.run_cycle().unwrap();

    for device in [&laptop, &phone] {
        assert!(device.store().get::<Folder>("f1").is_none());
        assert_eq!(device.store().get::<Page>("p1").unwrap().folder_id, None);
        assert!(!device.store().has_pending());
    }
    server.store().read(|data| {
        assert!(data.folders.tombstone("f1").is_some());
        assert_eq!(data.pages.get("p1").and_then(|p| p.folder_id.clone()), None);
    });
}

#[test]
fn page_delete_removes_alarms_on_other_devices() {
    let server = server(ServerConfig::default());
    let clock = Arc::new(ManualClock::new(1_000));
    let laptop = client(&server, "u1", &clock);
    let phone = client(&server, "u1", &clock);

    laptop.store().create_page(Page::new("p1")).unwrap();
    laptop.store().create_alarm(Alarm::new("a1", "p1", 5_000)).unwrap();
    laptop.run_cycle().unwrap();
    phone.run_cycle().unwrap();
    assert!(phone.store().get::<Alarm>("a1").is_some());

    laptop.store().delete_page("p1").unwrap();
    laptop.run_cycle().unwrap();
    phone.run_cycle().unwrap();

    assert!(phone.store().get::<Page>("p1").is_none());
    assert!(phone.store().get::<Alarm>("a1").is_none());
    assert!(laptop.store().records::<Page>().is_empty());
}

/// Forwards to the server, deleting a local page the first time a push goes out.
struct DeleteDuringPush {
    inner: Transport,
    store: Arc<LocalStore>,
    page: &'static str,
    fired: AtomicBool,
}

impl SyncTransport for DeleteDuringPush {
    fn pull(&self, request: &PullRequest) -> notesync_engine::SyncResult<PullResponse> {
        self.inner.pull(request)
    }

    fn push(&self, request: &PushRequest) -> notesync_engine::SyncResult<PushResponse> {
        if !self.fired.swap(true, Ordering::SeqCst) {
            self.store.delete_page(self.page).unwrap();
        }
        self.inner.push(request)
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn close(&self) -> notesync_engine::SyncResult<()> {
        self.inner.close()
    }
}

#[test]
fn page_deleted_during_push_stays_deleted() {
    let server = server(ServerConfig::default());
    let clock = Arc::new(ManualClock::new(1_000));
    let store = Arc::new(LocalStore::open_in_memory("u1").with_clock(clock.clone()));
    let laptop = SyncEngine::new(
        SyncConfig::new("memory://"),
        DeleteDuringPush {
            inner: transport(&server, Some("u1")),
            store: Arc::clone(&store),
            page: "p1",
            fired: AtomicBool::new(false),
        },
        Arc::clone(&store),
    );

    store.create_page(Page::new("p1").with_title("secret")).unwrap();
    laptop.run_cycle().unwrap();
    assert!(store.get::<Page>("p1").is_none());
    assert!(store.has_pending());

    clock.advance(10);
    laptop.run_cycle().unwrap();
    assert!(store.records::<Page>().is_empty());
    assert!(!store.has_pending());
    server.store().read(|data| {
        assert!(data.pages.get("p1").is_none());
        assert!(data.pages.tombstone("p1").is_some());
    });

    let phone = client(&server, "u1", &clock);
    phone.run_cycle().unwrap();
    assert!(page_title(&phone, "p1").is_none());
}

#[test]
fn pending_edit_survives_pull() {
    let server = server(ServerConfig::default());
    let clock = Arc::new(ManualClock::new(1_000));
    let laptop = client(&server, "u1", &clock);
    laptop.store().create_page(Page::new("p1").with_title("v1")).unwrap();
    laptop.run_cycle().unwrap();

    clock.advance(5);
    laptop
        .store()
        .update_page("p1", |page| page.title = "v2".into())
        .unwrap();
    let outcome = PullClient::new(laptop.store(), laptop.transport().as_ref())
        .pull_all()
        .unwrap();

    assert_eq!(outcome.merged.kept, 1);
    assert_eq!(page_title(&laptop, "p1").as_deref(), Some("v2"));
    assert_eq!(laptop.store().records::<Page>()[0].status, RecordStatus::Updated);
}

#[test]
fn unknown_folder_is_a_server_error() {
    let server = server(ServerConfig::default());
    let transport = transport(&server, Some("u1"));
    let changes = ChangeSet {
        page: Some(ChangeBatch {
            created: vec![Page::new("p1").with_folder("ghost").with_timestamps(1, 1)],
            ..ChangeBatch::default()
        }),
        ..ChangeSet::default()
    };

    let err = transport.push(&PushRequest::new(changes, None)).unwrap_err();
    assert!(matches!(err, SyncError::Server { status: 422, .. }));
    assert!(!err.is_retryable());
    assert!(server.store().read(|data| data.pages.is_empty()));
}

#[test]
fn authentication_is_enforced() {
    let secret = b"integration-secret".to_vec();
    let server = server(ServerConfig::default().with_auth(secret.clone()));
    let clock = Arc::new(ManualClock::new(1_000));

    let anonymous = SyncEngine::new(
        SyncConfig::new("memory://"),
        transport(&server, None),
        Arc::new(LocalStore::open_in_memory("u1").with_clock(clock.clone())),
    );
    anonymous.store().create_page(Page::new("p1")).unwrap();
    let err = anonymous.run_cycle().unwrap_err();
    assert!(matches!(err, SyncError::Server { status: 401, .. }));
    assert!(anonymous.store().has_pending());

    let token = TokenValidator::new(AuthConfig::new(secret))
        .create_token("u1")
        .unwrap();
    let signed = SyncEngine::new(
        SyncConfig::new("memory://"),
        transport(&server, Some(&token)),
        Arc::new(LocalStore::open_in_memory("u1").with_clock(clock)),
    );
    signed.store().create_page(Page::new("p2")).unwrap();
    signed.run_cycle().unwrap();
    assert!(!signed.store().has_pending());
}

#[tokio::test]
async fn orchestrated_devices_converge() {
    let server = server(ServerConfig::default());
    let clock = Arc::new(ManualClock::new(1_000));
    let laptop = SyncOrchestrator::new(client(&server, "u1", &clock));
    let phone = SyncOrchestrator::new(client(&server, "u1", &clock));

    laptop.engine().store().create_page(Page::new("p1").with_title("hello")).unwrap();
    laptop.sync_now().await.unwrap();
    phone.sync_now().await.unwrap();

    let title = phone.engine().store().get::<Page>("p1").map(|page| page.title);
    assert_eq!(title.as_deref(), Some("hello"));
    assert_eq!(phone.stats().cycles_completed, 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn chunked_pull_returns_every_page_once(
        rows in proptest::collection::vec((1i64..6, 0usize..12), 0..40),
        max_rows in 1usize..5,
        target in 1usize..25,
    ) {
        let config = ServerConfig::default()
            .with_max_pull_rows(max_rows)
            .with_target_pull_size(target);
        let server = server(config);

        let pages: Vec<Page> = rows
            .iter()
            .enumerate()
            .map(|(i, (created_at, len))| {
                Page::new(format!("p{i:02}"))
                    .with_body("x".repeat(*len))
                    .with_timestamps(*created_at, *created_at)
            })
            .collect();
        let expected: BTreeSet<String> = pages.iter().map(|page| page.id.clone()).collect();
        let changes = ChangeSet {
            page: Some(ChangeBatch { created: pages, ..ChangeBatch::default() }),
            ..ChangeSet::default()
        };
        server.handle_push("u1", PushRequest::new(changes, None)).unwrap();

        let clock = Arc::new(ManualClock::new(1_000));
        let reader = client(&server, "u1", &clock);
        let outcome = PullClient::new(reader.store(), reader.transport().as_ref())
            .pull_all()
            .unwrap();

        let received: BTreeSet<String> = reader
            .store()
            .records::<Page>()
            .into_iter()
            .map(|row| row.record.id)
            .collect();
        prop_assert_eq!(received, expected);
        prop_assert_eq!(outcome.merged.applied, rows.len());
        prop_assert!(outcome.chunks <= rows.len().max(1));
    }
}

use notegraf_core::model::note::{NoteDraft, NoteId, NoteLocator, RevisionId};
use notegraf_core::service::sequence::assemble_sequence;
use notegraf_core::service::{BrowseError, ErrorKind};
use notegraf_core::store::{HttpNoteStore, HttpStoreConfig, NoteStore, NoteWriter, StoreError};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

#[derive(Clone)]
struct Canned {
    status: u16,
    body: String,
    delay: Duration,
}

impl Canned {
    fn json(value: Value) -> Self {
        Self {
            status: 200,
            body: value.to_string(),
            delay: Duration::ZERO,
        }
    }

    fn status(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
            delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone)]
struct Recorded {
    route: String,
    body: String,
}

/// Serves canned responses keyed by `"METHOD /path"`; unknown routes get 404.
struct CannedServer {
    base_url: String,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl CannedServer {
    async fn start(routes: Vec<(&str, Canned)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let routes: Arc<HashMap<String, Canned>> = Arc::new(
            routes
                .into_iter()
                .map(|(route, canned)| (route.to_string(), canned))
                .collect(),
        );
        let requests = Arc::new(Mutex::new(Vec::new()));

        let log = Arc::clone(&requests);
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    break;
                };
                let routes = Arc::clone(&routes);
                let log = Arc::clone(&log);
                tokio::spawn(async move { handle(socket, routes, log).await });
            }
        });

        Self { base_url, requests }
    }

    fn store(&self) -> HttpNoteStore {
        HttpNoteStore::new(HttpStoreConfig::new(self.base_url.clone())).unwrap()
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

async fn handle(
    mut socket: TcpStream,
    routes: Arc<HashMap<String, Canned>>,
    log: Arc<Mutex<Vec<Recorded>>>,
) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let read = socket.read(&mut chunk).await.unwrap_or(0);
        if read == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..read]);
        if let Some(pos) = buf.windows(4).position(|window| window == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let read = socket.read(&mut chunk).await.unwrap_or(0);
        if read == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..read]);
    }

    let mut parts = head.split_whitespace();
    let route = format!(
        "{} {}",
        parts.next().unwrap_or_default(),
        parts.next().unwrap_or_default()
    );
    let body = String::from_utf8_lossy(&buf[header_end..]).to_string();
    log.lock().unwrap().push(Recorded {
        route: route.clone(),
        body,
    });

    let canned = routes
        .get(&route)
        .cloned()
        .unwrap_or_else(|| Canned::status(404));
    tokio::time::sleep(canned.delay).await;
    let response = format!(
        "HTTP/1.1 {} Canned\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        canned.status,
        canned.body.len(),
        canned.body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

fn wire_note(id: &str, rev: &str, prev: Option<&str>, next: Option<&str>) -> Value {
    json!({
        "id": id,
        "revision": rev,
        "title": format!("Note {id}"),
        "note_inner": format!("body of {id}"),
        "parent": null,
        "prev": prev,
        "next": next,
        "referents": [],
        "metadata": {
            "tags": [],
            "custom_metadata": {},
            "modified_at": "2023-03-01T08:00:00Z"
        }
    })
}

#[tokio::test]
async fn fetch_note_decodes_web_api_payload() {
    let server = CannedServer::start(vec![(
        "GET /api/v1/note/a",
        Canned::json(wire_note("a", "r1", None, Some("b"))),
    )])
    .await;

    let note = server.store().fetch_note(&NoteId::from("a")).await.unwrap();

    assert_eq!(note.body, "body of a");
    assert_eq!(note.next, Some(NoteId::from("b")));
    assert_eq!(server.requests()[0].route, "GET /api/v1/note/a");
}

#[tokio::test]
async fn http_404_is_not_found() {
    let server = CannedServer::start(Vec::new()).await;
    let store = server.store();

    assert_eq!(
        store.fetch_note(&NoteId::from("x")).await.unwrap_err(),
        StoreError::NotFound(NoteId::from("x"))
    );
    assert!(matches!(
        store
            .fetch_revision(&NoteId::from("x"), &RevisionId::from("r9"))
            .await,
        Err(StoreError::RevisionNotFound { .. })
    ));
}

#[tokio::test]
async fn server_error_surfaces_as_transport_with_status() {
    let server = CannedServer::start(vec![("GET /api/v1/note/a", Canned::status(500))]).await;

    let err = server
        .store()
        .fetch_note(&NoteId::from("a"))
        .await
        .unwrap_err();

    assert!(matches!(&err, StoreError::Transport(message) if message.contains("500")));
    assert_eq!(BrowseError::from(err).kind(), ErrorKind::Transport);
}

#[tokio::test]
async fn undecodable_body_is_invalid_data() {
    let server = CannedServer::start(vec![(
        "GET /api/v1/note/a",
        Canned::json(json!({"unexpected": true})),
    )])
    .await;

    let err = server
        .store()
        .fetch_note(&NoteId::from("a"))
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::InvalidData(_)));
}

#[tokio::test]
async fn slow_server_times_out_as_transport() {
    let mut slow = Canned::json(wire_note("a", "r1", None, None));
    slow.delay = Duration::from_secs(3);
    let server = CannedServer::start(vec![("GET /api/v1/note/a", slow)]).await;
    let mut config = HttpStoreConfig::new(server.base_url.clone());
    config.timeout = Duration::from_millis(200);
    let store = HttpNoteStore::new(config).unwrap();

    let err = store.fetch_note(&NoteId::from("a")).await.unwrap_err();

    assert!(matches!(err, StoreError::Transport(_)));
}

#[tokio::test]
async fn revision_list_is_one_request() {
    let server = CannedServer::start(vec![(
        "GET /api/v1/note/a/revision",
        Canned::json(json!([
            wire_note("a", "r2", None, None),
            wire_note("a", "r1", None, None)
        ])),
    )])
    .await;

    let revisions = server
        .store()
        .fetch_revisions(&NoteId::from("a"))
        .await
        .unwrap();

    assert_eq!(revisions.len(), 2);
    assert_eq!(revisions[0].revision, RevisionId::from("r2"));
    assert_eq!(server.requests().len(), 1);
}

#[tokio::test]
async fn sequence_assembles_over_http() {
    let server = CannedServer::start(vec![
        ("GET /api/v1/note/a", Canned::json(wire_note("a", "ra", None, Some("b")))),
        ("GET /api/v1/note/b", Canned::json(wire_note("b", "rb", Some("a"), Some("c")))),
        ("GET /api/v1/note/c", Canned::json(wire_note("c", "rc", Some("b"), None))),
    ])
    .await;

    let assembly = assemble_sequence(&server.store(), &NoteId::from("b"), true)
        .await
        .unwrap();

    let chain: Vec<_> = assembly.notes.iter().map(|note| note.id.as_str()).collect();
    assert_eq!(chain, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn create_posts_form_fields_and_returns_locator() {
    let server = CannedServer::start(vec![(
        "POST /api/v1/note",
        Canned::json(json!({"Specific": ["n1", "r1"]})),
    )])
    .await;

    let locator = server
        .store()
        .create_note(
            NoteDraft::new("hello")
                .with_title("Hi")
                .with_tags(["b", "a"]),
        )
        .await
        .unwrap();

    assert_eq!(
        locator,
        NoteLocator::Specific(NoteId::from("n1"), RevisionId::from("r1"))
    );
    let request = &server.requests()[0];
    let sent: Value = serde_json::from_str(&request.body).unwrap();
    assert_eq!(sent["note_inner"], "hello");
    assert_eq!(sent["title"], "Hi");
    assert_eq!(sent["metadata_tags"], "a, b");
}

#[tokio::test]
async fn delete_of_missing_note_is_not_found() {
    let server = CannedServer::start(Vec::new()).await;

    let err = server
        .store()
        .delete_note(&NoteId::from("gone"))
        .await
        .unwrap_err();

    assert_eq!(err, StoreError::NotFound(NoteId::from("gone")));
    assert_eq!(server.requests()[0].route, "DELETE /api/v1/note/gone");
}

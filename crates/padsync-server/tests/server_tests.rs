//! End-to-end WebSocket tests: real server, real clients, full sync pipeline.

use futures_util::{SinkExt, StreamExt};
use padsync_core::DocumentName;
use padsync_protocol::{Message, SyncMessage};
use padsync_server::{Engine, EngineConfig, WebSocketServer};
use padsync_storage::{MemoryStore, PersistedRecord, Store, StoreError};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Doc, GetString, ReadTxn, Text, Transact, Update};

/// Memory store that counts saves.
struct CountingStore {
    inner: MemoryStore,
    saves: AtomicUsize,
}

impl CountingStore {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            saves: AtomicUsize::new(0),
        })
    }

    fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Store for CountingStore {
    async fn load(&self, name: &DocumentName) -> Result<Option<PersistedRecord>, StoreError> {
        self.inner.load(name).await
    }

    async fn save(&self, name: &DocumentName, state: &[u8]) -> Result<(), StoreError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(name, state).await
    }

    async fn list(&self, limit: usize) -> Result<Vec<(DocumentName, u64)>, StoreError> {
        self.inner.list(limit).await
    }

    async fn delete(&self, name: &DocumentName) -> Result<bool, StoreError> {
        self.inner.delete(name).await
    }

    fn backend(&self) -> &'static str {
        "counting"
    }
}

async fn free_port() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Start a server with the given store and config, return its address.
async fn start_server(store: Arc<dyn Store>, config: EngineConfig) -> (Arc<Engine>, SocketAddr) {
    let engine = Engine::new(store, config);
    let addr = free_port().await;
    let server_engine = engine.clone();
    tokio::spawn(async move {
        let server = WebSocketServer::new(server_engine, addr);
        let _ = server.run().await;
    });
    tokio::time::sleep(Duration::from_millis(80)).await;
    (engine, addr)
}

fn quick_config() -> EngineConfig {
    EngineConfig {
        debounce: Duration::from_millis(200),
        idle_grace: Duration::from_secs(5),
        awareness_ttl: Duration::from_secs(5),
        sweep_interval: Duration::from_secs(5),
    }
}

/// A test client: a websocket plus a local document.
struct TestClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    doc: Doc,
}

impl TestClient {
    async fn connect(addr: SocketAddr, doc_name: &str) -> Self {
        let url = format!("ws://{}/collab/{}", addr, doc_name);
        let (ws, _) = connect_async(&url).await.expect("client connects");
        Self { ws, doc: Doc::new() }
    }

    /// Next binary frame, decoded; panics after two seconds of silence.
    async fn recv(&mut self) -> Message {
        let raw = self.recv_raw().await.expect("frame before timeout");
        Message::decode(&raw).expect("well-formed frame")
    }

    async fn recv_raw(&mut self) -> Option<Vec<u8>> {
        timeout(Duration::from_secs(2), async {
            while let Some(msg) = self.ws.next().await {
                if let Ok(WsMessage::Binary(data)) = msg {
                    return Some(data.into());
                }
            }
            None
        })
        .await
        .ok()
        .flatten()
    }

    /// True when no frame arrives within the window.
    async fn silent_for(&mut self, window: Duration) -> bool {
        timeout(window, self.ws.next()).await.is_err()
    }

    async fn send(&mut self, message: Message) {
        self.send_raw(message.encode()).await;
    }

    async fn send_raw(&mut self, frame: Vec<u8>) {
        self.ws.send(WsMessage::Binary(frame)).await.unwrap();
    }

    fn state_vector(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.state_vector().encode_v1()
    }

    fn apply(&self, update: &[u8]) {
        let mut txn = self.doc.transact_mut();
        txn.apply_update(Update::decode_v1(update).unwrap());
    }

    /// Apply the document payload of a sync frame to the local doc.
    fn apply_frame(&self, frame: &[u8]) {
        match Message::decode(frame).unwrap() {
            Message::Sync(SyncMessage::SyncStep2(update))
            | Message::Sync(SyncMessage::Update(update)) => self.apply(&update),
            other => panic!("expected document payload, got {other:?}"),
        }
    }

    /// Insert text locally and return the update frame to send.
    fn edit(&self, index: u32, chunk: &str) -> Vec<u8> {
        let before = {
            let txn = self.doc.transact();
            txn.state_vector()
        };
        let text = self.doc.get_or_insert_text("content");
        {
            let mut txn = self.doc.transact_mut();
            text.insert(&mut txn, index, chunk);
        }
        let txn = self.doc.transact();
        Message::update(txn.encode_diff_v1(&before)).encode()
    }

    fn content(&self) -> String {
        let text = self.doc.get_or_insert_text("content");
        let txn = self.doc.transact();
        text.get_string(&txn)
    }

    /// Drive the initial handshake: consume the server's SyncStep1, request
    /// and apply the server's state.
    async fn handshake(&mut self) {
        match self.recv().await {
            Message::Sync(SyncMessage::SyncStep1(_server_sv)) => {}
            other => panic!("expected server SyncStep1, got {other:?}"),
        }
        self.send(Message::sync_step1(self.state_vector())).await;
        match self.recv().await {
            Message::Sync(SyncMessage::SyncStep2(update)) => self.apply(&update),
            other => panic!("expected SyncStep2, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_server_opens_with_sync_step1() {
    let (_engine, addr) = start_server(Arc::new(MemoryStore::new()), quick_config()).await;

    let mut client = TestClient::connect(addr, "opening").await;
    match client.recv().await {
        Message::Sync(SyncMessage::SyncStep1(_)) => {}
        other => panic!("expected SyncStep1, got {other:?}"),
    }
}

#[tokio::test]
async fn test_scenario_two_clients_converge_with_one_save() {
    let store = CountingStore::new();
    let (_engine, addr) = start_server(store.clone(), quick_config()).await;

    let mut x = TestClient::connect(addr, "alpha").await;
    x.handshake().await;
    let mut y = TestClient::connect(addr, "alpha").await;
    y.handshake().await;

    // X edits "hello"; Y receives it forwarded verbatim.
    let u1 = x.edit(0, "hello");
    x.send_raw(u1.clone()).await;

    let forwarded = y.recv_raw().await.expect("update forwarded to Y");
    assert_eq!(forwarded, u1);
    y.apply_frame(&forwarded);

    // Y follows up 100ms later; X receives and applies it.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let u2 = y.edit(5, " world");
    y.send_raw(u2.clone()).await;

    let forwarded = x.recv_raw().await.expect("update forwarded to X");
    assert_eq!(forwarded, u2);
    x.apply_frame(&forwarded);

    assert_eq!(x.content(), "hello world");
    assert_eq!(y.content(), "hello world");

    // Neither sender sees its own update echoed back.
    assert!(x.silent_for(Duration::from_millis(250)).await);
    assert!(y.silent_for(Duration::from_millis(250)).await);

    // Both edits landed inside one debounce window: exactly one save.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(store.save_count(), 1);

    let record = store
        .inner
        .load(&DocumentName::new("alpha").unwrap())
        .await
        .unwrap()
        .expect("alpha persisted");
    assert_eq!(content_of(&record.state), "hello world");
}

#[tokio::test]
async fn test_awareness_fans_out_without_persistence() {
    let store = CountingStore::new();
    let (engine, addr) = start_server(store.clone(), quick_config()).await;

    let mut x = TestClient::connect(addr, "presence").await;
    x.handshake().await;
    let mut y = TestClient::connect(addr, "presence").await;
    y.handshake().await;

    let frame = Message::awareness(b"{\"user\":\"x\",\"cursor\":4}".to_vec()).encode();
    x.send_raw(frame.clone()).await;

    let forwarded = y.recv_raw().await.expect("awareness forwarded to Y");
    assert_eq!(forwarded, frame);
    assert!(x.silent_for(Duration::from_millis(250)).await);

    // Awareness never reaches the store.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(store.save_count(), 0);
    assert_eq!(engine.status().connections, 2);
}

#[tokio::test]
async fn test_malformed_frame_does_not_close_connection() {
    let (_engine, addr) = start_server(Arc::new(MemoryStore::new()), quick_config()).await;

    let mut client = TestClient::connect(addr, "tolerant").await;
    client.handshake().await;

    // Unknown message tag: discarded server-side.
    client.send_raw(vec![42, 1, 2, 3]).await;

    // The connection still works: a real update round-trips.
    let mut witness = TestClient::connect(addr, "tolerant").await;
    witness.handshake().await;

    let update = client.edit(0, "still alive");
    client.send_raw(update.clone()).await;
    assert_eq!(witness.recv_raw().await.expect("update forwarded"), update);
}

#[tokio::test]
async fn test_late_joiner_receives_existing_content() {
    let (_engine, addr) = start_server(Arc::new(MemoryStore::new()), quick_config()).await;

    let mut writer = TestClient::connect(addr, "catchup").await;
    writer.handshake().await;
    writer.send_raw(writer.edit(0, "early words")).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut reader = TestClient::connect(addr, "catchup").await;
    reader.handshake().await;

    assert_eq!(reader.content(), "early words");
}

#[tokio::test]
async fn test_room_reloads_from_store_after_idle_gc() {
    let store = CountingStore::new();
    let config = EngineConfig {
        debounce: Duration::from_millis(50),
        idle_grace: Duration::from_millis(100),
        awareness_ttl: Duration::from_secs(5),
        sweep_interval: Duration::from_secs(5),
    };
    let (engine, addr) = start_server(store.clone(), config).await;

    {
        let mut client = TestClient::connect(addr, "durable").await;
        client.handshake().await;
        client.send_raw(client.edit(0, "long lived")).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
    } // connection drops here

    // Wait for flush-on-disconnect and the idle grace period.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(engine.status().rooms, 0, "idle room removed");
    assert!(store.save_count() >= 1);

    // A fresh connection gets the persisted content back.
    let mut client = TestClient::connect(addr, "durable").await;
    client.handshake().await;
    assert_eq!(client.content(), "long lived");
}

/// Text content a persisted full-state update represents.
fn content_of(state: &[u8]) -> String {
    let doc = Doc::new();
    {
        let mut txn = doc.transact_mut();
        txn.apply_update(Update::decode_v1(state).unwrap());
    }
    let text = doc.get_or_insert_text("content");
    let txn = doc.transact();
    text.get_string(&txn)
}

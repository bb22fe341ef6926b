//! Reconnection behavior against a real loopback WebSocket server.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use assert_matches::assert_matches;
use futures::{SinkExt, StreamExt};
use hostlink_bridge::Incoming;
use hostlink_socket::{ConnectionState, SocketChannel, SocketConfig, SocketController, SocketNotice};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};

type ServerWs = WebSocketStream<TcpStream>;

const DELAY: Duration = Duration::from_millis(50);
const WAIT: Duration = Duration::from_secs(5);

struct TestServer {
    url: String,
    accepts: Arc<AtomicUsize>,
    conns: mpsc::UnboundedReceiver<ServerWs>,
}

impl TestServer {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepts = Arc::new(AtomicUsize::new(0));
        let (tx, conns) = mpsc::unbounded_channel();

        let counter = accepts.clone();
        drop(tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                if let Ok(ws) = accept_async(stream).await {
                    let _ = counter.fetch_add(1, Ordering::SeqCst);
                    if tx.send(ws).is_err() {
                        break;
                    }
                }
            }
        }));

        Self {
            url: format!("ws://{addr}"),
            accepts,
            conns,
        }
    }

    fn controller(&self) -> SocketController {
        SocketController::new(SocketConfig::new(&self.url).with_reconnect_delay(DELAY))
    }

    async fn next_conn(&mut self) -> ServerWs {
        tokio::time::timeout(WAIT, self.conns.recv())
            .await
            .expect("no connection accepted in time")
            .expect("accept loop ended")
    }

    fn accepted(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }
}

async fn next_text(ws: &mut ServerWs) -> Value {
    loop {
        let msg = tokio::time::timeout(WAIT, ws.next())
            .await
            .expect("no frame in time")
            .expect("stream ended")
            .expect("read failed");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Records every notice published on the error channel.
fn record_errors(controller: &SocketController) -> Arc<Mutex<Vec<SocketNotice>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    let _ = controller.listen(SocketChannel::Error, move |n: &SocketNotice| {
        s.lock().push(n.clone());
    });
    seen
}

fn closed_count(seen: &Mutex<Vec<SocketNotice>>) -> usize {
    seen.lock()
        .iter()
        .filter(|n| matches!(n, SocketNotice::Closed { .. }))
        .count()
}

#[tokio::test]
async fn opens_and_sends_text() {
    let mut server = TestServer::start().await;
    let controller = server.controller();
    let opened = Arc::new(AtomicUsize::new(0));
    let o = opened.clone();
    let _ = controller.listen(SocketChannel::Open, move |n: &SocketNotice| {
        assert_eq!(*n, SocketNotice::Open);
        let _ = o.fetch_add(1, Ordering::SeqCst);
    });

    controller.start();
    assert!(controller.wait_open(WAIT).await);
    assert_eq!(controller.state(), ConnectionState::Open);
    assert_eq!(opened.load(Ordering::SeqCst), 1);

    let mut ws = server.next_conn().await;
    assert!(controller.send_message(&json!({"id": 0, "event": "hello", "data": null})));
    assert_eq!(next_text(&mut ws).await["event"], "hello");

    controller.disconnect();
}

#[tokio::test]
async fn reconnects_after_server_close() {
    let mut server = TestServer::start().await;
    let controller = server.controller();
    let errors = record_errors(&controller);

    controller.start();
    assert!(controller.wait_open(WAIT).await);
    let mut first = server.next_conn().await;
    first.close(None).await.unwrap();

    let _second = server.next_conn().await;
    assert!(controller.wait_open(WAIT).await);
    assert_eq!(server.accepted(), 2);
    assert!(controller.attempts() >= 2);
    assert!(errors.lock().contains(&SocketNotice::Closed { retry_in: DELAY }));

    controller.disconnect();
}

#[tokio::test]
async fn reconnect_waits_for_the_configured_delay() {
    const SLOW: Duration = Duration::from_millis(300);

    let mut server = TestServer::start().await;
    let controller = SocketController::new(SocketConfig::new(&server.url).with_reconnect_delay(SLOW));
    let closed_at = Arc::new(Mutex::new(None));
    let c = closed_at.clone();
    let _ = controller.listen(SocketChannel::Error, move |n: &SocketNotice| {
        if matches!(n, SocketNotice::Closed { .. }) {
            let _ = c.lock().get_or_insert_with(Instant::now);
        }
    });

    controller.start();
    assert!(controller.wait_open(WAIT).await);
    let mut first = server.next_conn().await;
    first.close(None).await.unwrap();

    tokio::time::timeout(WAIT, async {
        while closed_at.lock().is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    // Well inside the delay: no new attempt yet.
    tokio::time::sleep(SLOW / 2).await;
    assert_eq!(controller.attempts(), 1);
    assert_eq!(server.accepted(), 1);
    assert_eq!(controller.state(), ConnectionState::Closed);

    let _second = server.next_conn().await;
    let closed = *closed_at.lock();
    assert!(closed.unwrap().elapsed() >= SLOW);
    assert_eq!(controller.attempts(), 2);
    assert!(controller.wait_open(WAIT).await);

    controller.disconnect();
}

#[tokio::test]
async fn disconnect_suppresses_reconnect() {
    let mut server = TestServer::start().await;
    let controller = server.controller();
    let errors = record_errors(&controller);

    controller.start();
    assert!(controller.wait_open(WAIT).await);
    let mut ws = server.next_conn().await;

    controller.disconnect();
    assert_eq!(controller.state(), ConnectionState::Closed);

    // The server sees the socket close.
    let end = tokio::time::timeout(WAIT, ws.next()).await.unwrap();
    assert_matches!(end, None | Some(Ok(Message::Close(_)) | Err(_)));

    tokio::time::sleep(DELAY * 6).await;
    assert_eq!(server.accepted(), 1);
    assert_eq!(controller.attempts(), 1);
    assert_eq!(closed_count(&errors), 0);
    assert!(!controller.send_text("late"));
}

#[tokio::test]
async fn retries_while_endpoint_is_down() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let controller = SocketController::new(
        SocketConfig::new(format!("ws://{addr}")).with_reconnect_delay(Duration::from_millis(20)),
    );
    let errors = record_errors(&controller);

    controller.start();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(controller.attempts() >= 3);
    assert_ne!(controller.state(), ConnectionState::Open);
    assert!(closed_count(&errors) >= 2);
    assert!(
        errors
            .lock()
            .iter()
            .any(|n| matches!(n, SocketNotice::Error(_)))
    );

    controller.disconnect();
    let attempts = controller.attempts();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(controller.attempts(), attempts);
}

#[tokio::test]
async fn frames_sent_while_closed_are_not_replayed() {
    let mut server = TestServer::start().await;
    let controller = server.controller();

    assert!(!controller.send_text(r#"{"id":0,"event":"early","data":null}"#));
    controller.start();
    assert!(controller.wait_open(WAIT).await);
    let mut ws = server.next_conn().await;

    assert!(controller.send_text(r#"{"id":0,"event":"late","data":null}"#));
    assert_eq!(next_text(&mut ws).await["event"], "late");

    controller.disconnect();
}

#[tokio::test]
async fn connect_replaces_live_socket_without_close_notice() {
    let mut server = TestServer::start().await;
    let controller = server.controller();
    let errors = record_errors(&controller);

    controller.start();
    assert!(controller.wait_open(WAIT).await);
    let _first = server.next_conn().await;

    controller.connect();
    let _second = server.next_conn().await;
    assert!(controller.wait_open(WAIT).await);
    assert_eq!(controller.attempts(), 2);
    assert_eq!(closed_count(&errors), 0);

    controller.disconnect();
}

#[tokio::test]
async fn unparsable_frames_are_dropped() {
    let mut server = TestServer::start().await;
    let controller = server.controller();
    let payloads = Arc::new(Mutex::new(Vec::new()));
    let p = payloads.clone();
    let _ = controller.listen(SocketChannel::Payload, move |n: &SocketNotice| {
        p.lock().push(n.clone());
    });

    controller.start();
    assert!(controller.wait_open(WAIT).await);
    let mut ws = server.next_conn().await;
    ws.send(Message::text("not json")).await.unwrap();
    ws.send(Message::text(r#"{"id":0,"event":"tick","data":1}"#))
        .await
        .unwrap();

    tokio::time::timeout(WAIT, async {
        while payloads.lock().is_empty() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    let seen = payloads.lock().clone();
    assert_eq!(seen.len(), 1);
    let SocketNotice::Payload(envelope) = &seen[0] else {
        panic!("expected payload");
    };
    assert!(envelope.id().is_event());

    controller.disconnect();
}

#[tokio::test]
async fn bridge_runs_over_the_socket() {
    let mut server = TestServer::start().await;
    let controller = server.controller();
    let bridge = controller.bridge(None);
    let _ = bridge.listen("Ping", |req: &Incoming| {
        let _ = req.respond(json!("pong"));
    });

    controller.start();
    assert!(controller.wait_open(WAIT).await);
    let mut ws = server.next_conn().await;

    // Server-initiated call answered by the bridge.
    ws.send(Message::text(r#"{"id":5,"event":"Ping","data":null}"#))
        .await
        .unwrap();
    assert_eq!(
        next_text(&mut ws).await,
        json!({"id": 5, "success": true, "data": "pong", "error": null})
    );

    // Bridge call answered by the server.
    let call = bridge.call("GetAppConfig", Value::Null);
    let request = next_text(&mut ws).await;
    assert_eq!(request["event"], "GetAppConfig");
    let reply = json!({"id": request["id"], "success": true, "data": {"port": 1818}, "error": null});
    ws.send(Message::text(reply.to_string())).await.unwrap();
    assert_eq!(call.await.unwrap(), json!({"port": 1818}));

    controller.disconnect();
}

//! Integration tests for the Courier server, handler, and full connection flow.

use std::sync::Arc;
use std::time::Duration;

use courier::prelude::*;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Starts a server on a random port and returns its address and router.
async fn start_server_with_limit(
    max_connections: usize,
) -> (String, Arc<Router<TracingDisplay>>) {
    let router = Arc::new(Router::new(UserDirectory::new(), TracingDisplay));
    let server = CourierServerBuilder::new()
        .bind("127.0.0.1:0")
        .max_connections(max_connections)
        .build(Arc::clone(&router))
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    (addr, router)
}

async fn start_server() -> (String, Arc<Router<TracingDisplay>>) {
    start_server_with_limit(64).await
}

async fn connect(addr: &str) -> ClientWs {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("should connect");
    ws
}

fn encode_envelope(envelope: &Envelope) -> Message {
    let bytes = serde_json::to_vec(envelope).expect("encode");
    Message::Binary(bytes.into())
}

async fn send(ws: &mut ClientWs, envelope: &Envelope) {
    ws.send(encode_envelope(envelope)).await.expect("send");
}

/// Receives the next envelope, failing the test after two seconds.
async fn recv(ws: &mut ClientWs) -> Envelope {
    let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("timed out waiting for envelope")
        .expect("stream ended")
        .expect("recv error");
    serde_json::from_slice(&msg.into_data()).expect("decode")
}

fn login_request(name: &str, password: &str) -> Envelope {
    Envelope::new(MessageKind::LoginRequest)
        .with_source(Some(name.into()), None)
        .with_content(password)
}

fn user_message(from: &str, to: &str, text: &str) -> Envelope {
    Envelope::new(MessageKind::UserMessage)
        .with_source(Some(from.into()), None)
        .with_destination(Some(to.into()), None)
        .with_content(text)
}

/// Logs in (registering if needed) and returns the LoginReply.
async fn login(ws: &mut ClientWs, name: &str, password: &str) -> Envelope {
    send(ws, &login_request(name, password)).await;
    recv(ws).await
}

/// Logs in and confirms, so the connection is bound to `name`.
async fn go_online(addr: &str, router: &Router<TracingDisplay>, name: &str) -> ClientWs {
    let mut ws = connect(addr).await;
    let reply = login(&mut ws, name, "pw").await;
    assert_eq!(reply.condition, Some(true));
    let confirm = Envelope::new(MessageKind::LoginConfirmation)
        .with_source(Some(name.into()), None);
    send(&mut ws, &confirm).await;
    wait_until(move || async move {
        router.online_names().await.iter().any(|n| n == name)
    })
    .await;
    ws
}

/// Polls `check` until it holds, failing the test after two seconds.
async fn wait_until<F, Fut>(check: F)
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_first_login_registers() {
    let (addr, router) = start_server().await;
    let mut ws = connect(&addr).await;

    let reply = login(&mut ws, "alice", "pw1").await;

    assert_eq!(reply.kind(), MessageKind::LoginReply);
    assert_eq!(reply.condition, Some(true));
    assert_eq!(
        reply.content.as_deref(),
        Some("User alice registered successfully.")
    );
    assert_eq!(reply.destination_name.as_deref(), Some("alice"));
    // The server tells the client how it sees its address.
    assert!(reply.destination_address.is_some());
    match reply.attachment {
        Some(Attachment::User(profile)) => {
            assert_eq!(profile.name, "alice");
            assert!(profile.password.is_none());
        }
        other => panic!("expected user attachment, got {other:?}"),
    }
    assert_eq!(router.registered_names().await, vec!["alice"]);
}

#[tokio::test]
async fn test_wrong_password_rejected() {
    let (addr, _router) = start_server().await;
    let mut ws = connect(&addr).await;
    login(&mut ws, "alice", "pw1").await;

    let reply = login(&mut ws, "alice", "wrong").await;

    assert_eq!(reply.condition, Some(false));
    assert_eq!(reply.content.as_deref(), Some("Incorrect password."));
}

#[tokio::test]
async fn test_queued_message_delivered_on_confirmation() {
    let (addr, router) = start_server().await;
    let mut alice = go_online(&addr, &router, "alice").await;

    // bob registers but does not confirm yet, so he is not online.
    let mut bob = connect(&addr).await;
    login(&mut bob, "bob", "pw").await;

    send(&mut alice, &user_message("alice", "bob", "first")).await;
    let forwarded = recv(&mut alice).await;
    assert_eq!(forwarded.kind(), MessageKind::UserMessageForwarding);
    assert_eq!(forwarded.condition, Some(true));
    assert_eq!(forwarded.source_name.as_deref(), Some("bob"));
    assert_eq!(forwarded.content.as_deref(), Some("first"));
    assert_eq!(router.queued_for("bob").await, 1);

    let confirm = Envelope::new(MessageKind::LoginConfirmation)
        .with_source(Some("bob".into()), None);
    send(&mut bob, &confirm).await;
    send(&mut alice, &user_message("alice", "bob", "second")).await;
    recv(&mut alice).await;

    let one = recv(&mut bob).await;
    let two = recv(&mut bob).await;
    assert_eq!(one.content.as_deref(), Some("first"));
    assert_eq!(two.content.as_deref(), Some("second"));
    assert_eq!(one.source_name.as_deref(), Some("alice"));
    assert_eq!(router.queued_for("bob").await, 0);
}

#[tokio::test]
async fn test_adding_request_to_unknown_user() {
    let (addr, router) = start_server().await;
    let mut alice = go_online(&addr, &router, "alice").await;

    let request = Envelope::new(MessageKind::AddingRequest)
        .with_source(Some("alice".into()), None)
        .with_destination(Some("carol".into()), None);
    send(&mut alice, &request).await;

    let reply = recv(&mut alice).await;
    assert_eq!(reply.kind(), MessageKind::AddingForwarding);
    assert_eq!(reply.condition, Some(false));
    assert_eq!(reply.content.as_deref(), Some("User carol does not exist."));
    assert_eq!(router.queued_for("carol").await, 0);
}

#[tokio::test]
async fn test_adding_request_reaches_online_user() {
    let (addr, router) = start_server().await;
    let mut alice = go_online(&addr, &router, "alice").await;
    let mut bob = go_online(&addr, &router, "bob").await;

    let request = Envelope::new(MessageKind::AddingRequest)
        .with_source(Some("alice".into()), None)
        .with_destination(Some("bob".into()), None);
    send(&mut alice, &request).await;

    let reply = recv(&mut alice).await;
    assert_eq!(reply.condition, Some(true));
    assert_eq!(reply.content.as_deref(), Some("Adding request sent to bob"));

    let forwarded = recv(&mut bob).await;
    assert_eq!(forwarded.kind(), MessageKind::AddingRequest);
    assert_eq!(forwarded.source_name.as_deref(), Some("alice"));
}

#[tokio::test]
async fn test_invalid_frame_ignored() {
    let (addr, _router) = start_server().await;
    let mut ws = connect(&addr).await;

    ws.send(Message::Text("not an envelope".into()))
        .await
        .expect("send garbage");
    ws.send(Message::Binary(b"{\"kind\":\"Teleport\"}".to_vec().into()))
        .await
        .expect("send unknown kind");

    // The connection survives and still answers.
    let reply = login(&mut ws, "alice", "pw1").await;
    assert_eq!(reply.condition, Some(true));
}

#[tokio::test]
async fn test_update_request_broadcast_to_online_users() {
    let (addr, router) = start_server().await;
    let mut alice = go_online(&addr, &router, "alice").await;
    let mut bob = go_online(&addr, &router, "bob").await;

    let report = router.broadcast_update_request().await;

    assert_eq!(report.delivered, 2);
    assert_eq!(recv(&mut alice).await.kind(), MessageKind::UserUpdateRequest);
    assert_eq!(recv(&mut bob).await.kind(), MessageKind::UserUpdateRequest);
}

#[tokio::test]
async fn test_disconnect_removes_user_from_online() {
    let (addr, router) = start_server().await;
    let alice = go_online(&addr, &router, "alice").await;
    let _bob = go_online(&addr, &router, "bob").await;

    drop(alice);

    let r = &*router;
    wait_until(move || async move { r.online_names().await == vec!["bob".to_string()] })
        .await;
    // Disconnecting does not unregister.
    assert_eq!(router.registered_names().await, vec!["alice", "bob"]);
}

#[tokio::test]
async fn test_connection_limit_rejects_extra_clients() {
    let (addr, router) = start_server_with_limit(1).await;
    let mut first = connect(&addr).await;
    login(&mut first, "alice", "pw").await;

    let mut second = connect(&addr).await;
    let next = tokio::time::timeout(Duration::from_secs(2), second.next())
        .await
        .expect("second client should be closed promptly");
    assert!(
        matches!(next, None | Some(Ok(Message::Close(_))) | Some(Err(_))),
        "expected close, got {next:?}"
    );

    // The first client is unaffected.
    let reply = login(&mut first, "alice", "pw").await;
    assert_eq!(reply.condition, Some(true));
    assert_eq!(router.registered_names().await, vec!["alice"]);
}

#[tokio::test]
async fn test_silent_peer_does_not_block_other_clients() {
    let (addr, _router) = start_server().await;

    // Opens TCP but never sends the WebSocket upgrade request.
    let _silent = tokio::net::TcpStream::connect(&addr)
        .await
        .expect("tcp connect");
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut ws = tokio::time::timeout(Duration::from_secs(2), connect(&addr))
        .await
        .expect("handshake must not wait behind the silent peer");
    let reply = login(&mut ws, "alice", "pw").await;
    assert_eq!(reply.condition, Some(true));
}

#[tokio::test]
async fn test_silent_peer_dropped_after_handshake_timeout() {
    use tokio::io::AsyncReadExt;

    let router = Arc::new(Router::new(UserDirectory::new(), TracingDisplay));
    let server = CourierServerBuilder::new()
        .bind("127.0.0.1:0")
        .handshake_timeout(Duration::from_millis(100))
        .build(Arc::clone(&router))
        .await
        .expect("server should build");
    let addr = server.local_addr().expect("local addr").to_string();
    tokio::spawn(async move {
        let _ = server.run().await;
    });

    let mut silent = tokio::net::TcpStream::connect(&addr)
        .await
        .expect("tcp connect");
    let mut buf = [0u8; 64];
    let read = tokio::time::timeout(Duration::from_secs(2), silent.read(&mut buf))
        .await
        .expect("server should drop the peer");
    // EOF or reset, either way the socket is gone.
    assert!(matches!(read, Ok(0) | Err(_)), "unexpected read {read:?}");
    assert!(router.online_names().await.is_empty());
}

#[tokio::test]
async fn test_connection_slot_freed_while_listener_idle() {
    let (addr, router) = start_server_with_limit(1).await;
    let first = go_online(&addr, &router, "alice").await;
    drop(first);

    let r = &*router;
    wait_until(move || async move { r.online_names().await.is_empty() }).await;

    // No other peer arrives in between; the finished task's slot is free.
    let mut second = connect(&addr).await;
    let reply = login(&mut second, "bob", "pw").await;
    assert_eq!(reply.condition, Some(true));
}

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use reqwest::Url;
use room_chat::common::OutboundMessage;
use room_chat::network::{Backoff, ChannelState, ChannelSupervisor, LiveChannel};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::{WebSocketStream, accept_hdr_async};
use uuid::Uuid;

const WAIT: Duration = Duration::from_secs(3);

async fn listen() -> (TcpListener, Url) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let endpoint = Url::parse(&format!("ws://{addr}/chat/ws")).unwrap();
    (listener, endpoint)
}

/// Accepts one websocket connection and reports the request uri it used.
async fn accept(listener: &TcpListener) -> (WebSocketStream<TcpStream>, String) {
    let (stream, _) = listener.accept().await.unwrap();
    let (uri_tx, uri_rx) = oneshot::channel();
    let ws = accept_hdr_async(
        stream,
        move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            let _ = uri_tx.send(request.uri().to_string());
            Ok(response)
        },
    )
    .await
    .unwrap();
    (ws, uri_rx.await.unwrap())
}

async fn wait_for_state(channel: &LiveChannel, expected: ChannelState) {
    let mut state_rx = channel.subscribe();
    timeout(WAIT, state_rx.wait_for(|state| *state == expected))
        .await
        .expect("state change timed out")
        .expect("state sender dropped");
}

fn outbound(text: &str) -> OutboundMessage {
    OutboundMessage {
        chat_room_uuid: "room-1".into(),
        username: "pjh2".into(),
        nickname: "UserNickName".into(),
        message: text.into(),
        client_id: Uuid::new_v4(),
    }
}

#[tokio::test]
async fn open_connects_with_room_id_in_the_query() {
    let (listener, endpoint) = listen().await;
    let channel = LiveChannel::new(&endpoint, "room-1", WAIT);

    let server = tokio::spawn(async move { accept(&listener).await });
    channel.open().await.unwrap();
    let (_ws, uri) = server.await.unwrap();

    assert_eq!(uri, "/chat/ws?roomId=room-1");
    assert_eq!(channel.state(), ChannelState::Connected);

    // Opening again while connected changes nothing.
    channel.open().await.unwrap();
    assert_eq!(channel.state(), ChannelState::Connected);
    channel.close();
}

#[tokio::test]
async fn inbound_messages_reach_the_consumer() {
    let (listener, endpoint) = listen().await;
    let channel = LiveChannel::new(&endpoint, "room-1", WAIT);
    let (inbound_tx, mut inbound_rx) = mpsc::channel(8);
    channel.on_message(inbound_tx);

    let server = tokio::spawn(async move {
        let (mut ws, _) = accept(&listener).await;
        ws.send(Message::Text(r#"{"event": "typing", "data": {}}"#.into()))
            .await
            .unwrap();
        let frame =
            r#"{"event": "message", "data": {"id": 7, "username": "pjh1", "message": "hi"}}"#;
        ws.send(Message::Text(frame.into())).await.unwrap();
        ws
    });

    channel.open().await.unwrap();
    let received = timeout(WAIT, inbound_rx.recv()).await.unwrap().unwrap();
    assert_eq!(received.id.as_deref(), Some("7"));
    assert_eq!(received.username, "pjh1");
    assert_eq!(received.message, "hi");

    let _ws = server.await.unwrap();
    channel.close();
}

#[tokio::test]
async fn send_reaches_the_server_with_its_field_names() {
    let (listener, endpoint) = listen().await;
    let channel = LiveChannel::new(&endpoint, "room-1", WAIT);

    let server = tokio::spawn(async move {
        let (mut ws, _) = accept(&listener).await;
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return text.as_str().to_string(),
                Some(Ok(_)) => continue,
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    });

    channel.open().await.unwrap();
    let message = outbound("hello");
    channel.send(&message).unwrap();

    let frame = timeout(WAIT, server).await.unwrap().unwrap();
    let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
    assert_eq!(value["event"], "message");
    assert_eq!(value["data"]["chatRoomUUID"], "room-1");
    assert_eq!(value["data"]["username"], "pjh2");
    assert_eq!(value["data"]["nickname"], "UserNickName");
    assert_eq!(value["data"]["message"], "hello");
    assert_eq!(value["data"]["clientId"], message.client_id.to_string());
    channel.close();
}

#[tokio::test]
async fn nothing_is_delivered_after_close() {
    let (listener, endpoint) = listen().await;
    let channel = LiveChannel::new(&endpoint, "room-1", WAIT);
    let (inbound_tx, mut inbound_rx) = mpsc::channel(8);
    channel.on_message(inbound_tx);
    let (closed_tx, closed_rx) = oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let (mut ws, _) = accept(&listener).await;
        closed_rx.await.unwrap();
        let _ = ws
            .send(Message::Text(
                r#"{"event": "message", "data": {"id": 8, "username": "pjh1", "message": "late"}}"#
                    .into(),
            ))
            .await;
    });

    channel.open().await.unwrap();
    channel.close();
    channel.close();
    closed_tx.send(()).unwrap();
    server.await.unwrap();

    let late = timeout(Duration::from_millis(300), inbound_rx.recv()).await;
    assert!(!matches!(late, Ok(Some(_))));
    assert_eq!(channel.state(), ChannelState::Disconnected);
    assert!(channel.send(&outbound("after close")).is_err());
}

#[tokio::test]
async fn server_drop_leaves_the_channel_disconnected() {
    let (listener, endpoint) = listen().await;
    let channel = LiveChannel::new(&endpoint, "room-1", WAIT);

    let server = tokio::spawn(async move {
        let (ws, _) = accept(&listener).await;
        drop(ws);
    });

    channel.open().await.unwrap();
    server.await.unwrap();
    wait_for_state(&channel, ChannelState::Disconnected).await;
    assert!(!channel.is_closed());
}

#[tokio::test]
async fn supervisor_reconnects_after_a_drop() {
    let (listener, endpoint) = listen().await;
    let channel = LiveChannel::new(&endpoint, "room-1", WAIT);
    let (reconnect_tx, mut reconnect_rx) = mpsc::unbounded_channel();

    let server = tokio::spawn(async move {
        let (first, _) = accept(&listener).await;
        drop(first);
        let (second, _) = accept(&listener).await;
        second
    });

    let supervisor = ChannelSupervisor::new(
        channel.clone(),
        Backoff::new(Duration::from_millis(10), Duration::from_millis(50), None),
    )
    .on_reconnect(reconnect_tx)
    .spawn();

    let notice = timeout(WAIT, reconnect_rx.recv()).await.unwrap().unwrap();
    assert!(notice.attempts >= 1);
    wait_for_state(&channel, ChannelState::Connected).await;

    let _second = server.await.unwrap();
    channel.close();
    timeout(WAIT, supervisor).await.unwrap().unwrap();
}

#[tokio::test]
async fn supervisor_gives_up_when_attempts_run_out() {
    let (listener, endpoint) = listen().await;
    drop(listener);
    let channel = LiveChannel::new(&endpoint, "room-1", WAIT);

    let supervisor = ChannelSupervisor::new(
        channel.clone(),
        Backoff::new(Duration::from_millis(5), Duration::from_millis(10), Some(2)),
    )
    .spawn();

    timeout(WAIT, supervisor).await.unwrap().unwrap();
    assert_eq!(channel.state(), ChannelState::Disconnected);
}

#[tokio::test]
async fn first_connect_after_failures_counts_as_a_reconnect() {
    let (listener, endpoint) = listen().await;
    let channel = LiveChannel::new(&endpoint, "room-1", WAIT);
    let (reconnect_tx, mut reconnect_rx) = mpsc::unbounded_channel();

    let server = tokio::spawn(async move {
        // Refuse the first handshake by hanging up on the raw socket.
        let (refused, _) = listener.accept().await.unwrap();
        drop(refused);
        let (ws, _) = accept(&listener).await;
        ws
    });

    let supervisor = ChannelSupervisor::new(
        channel.clone(),
        Backoff::new(Duration::from_millis(10), Duration::from_millis(50), None),
    )
    .on_reconnect(reconnect_tx)
    .spawn();

    let notice = timeout(WAIT, reconnect_rx.recv()).await.unwrap().unwrap();
    assert_eq!(notice.attempts, 1);
    wait_for_state(&channel, ChannelState::Connected).await;

    let _ws = server.await.unwrap();
    channel.close();
    timeout(WAIT, supervisor).await.unwrap().unwrap();
}

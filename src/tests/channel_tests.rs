use super::support::*;
use crate::channel::*;
use crate::model::Message;
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{accept_async, WebSocketStream};

/// Listener recording every callback as a short string
#[derive(Default)]
struct RecordingListener {
    events: Mutex<Vec<String>>,
}

impl RecordingListener {
    fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }
}

impl ConversationListener for RecordingListener {
    fn on_message(&self, message: Message) {
        self.events.lock().push(format!("message:{}", message.id));
    }

    fn on_typing(&self, user_id: &str, _username: &str) {
        self.events.lock().push(format!("typing:{}", user_id));
    }

    fn on_stop_typing(&self, user_id: &str) {
        self.events.lock().push(format!("stop:{}", user_id));
    }

    fn on_messages_read(&self, message_ids: &[String]) {
        self.events.lock().push(format!("read:{}", message_ids.join(",")));
    }

    fn on_reaction(
        &self,
        change: ReactionChange,
        message_id: &str,
        emoji: &str,
        _user_id: &str,
        _username: &str,
    ) {
        self.events
            .lock()
            .push(format!("reaction:{:?}:{}:{}", change, message_id, emoji));
    }
}

fn new_message_event(id: &str, conversation_id: &str) -> ServerEvent {
    let mut message = create_test_message(id, OTHER_ID, "yo", 1);
    message.conversation_id = conversation_id.to_string();
    ServerEvent::NewMessage { message }
}

fn recording_global(channel: &ChannelClient) -> Arc<Mutex<Vec<String>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    channel.set_global_message_listener(Some(Arc::new(move |m: Message| {
        sink.lock().push(m.id);
    })));
    seen
}

#[test]
fn test_backoff_doubles_until_cap() {
    let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));
    let delays: Vec<u64> = (0..7).map(|_| backoff.next_delay().as_secs()).collect();
    assert_eq!(delays, vec![1, 2, 4, 8, 16, 30, 30]);
    assert_eq!(backoff.attempt(), 7);

    backoff.reset();
    assert_eq!(backoff.next_delay(), Duration::from_secs(1));
}

#[test]
fn test_backoff_survives_many_attempts() {
    let mut backoff = Backoff::new(Duration::from_millis(500), Duration::from_secs(10));
    for _ in 0..100 {
        assert!(backoff.next_delay() <= Duration::from_secs(10));
    }
}

#[test]
fn test_connect_url_carries_token_and_client_id() {
    let channel = offline_channel();
    let config = ChannelConfig {
        url: "wss://chat.example.com/ws".to_string(),
        token: Some("secret".to_string()),
        reconnect_base_delay: Duration::from_secs(1),
        reconnect_max_delay: Duration::from_secs(30),
    };

    let url = config
        .connect_url(&channel.client_id())
        .expect("Failed to build URL");

    let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    assert_eq!(url.scheme(), "wss");
    assert!(query.contains(&("token".to_string(), "secret".to_string())));
    assert!(query.contains(&("client_id".to_string(), channel.client_id().to_string())));
}

#[test]
fn test_client_ids_differ_per_instance() {
    assert_ne!(offline_channel().client_id(), offline_channel().client_id());
}

#[test]
fn test_client_frame_wire_format() {
    let frame = ClientFrame::StopTyping {
        conversation_id: "C1".to_string(),
    };
    let json = serde_json::to_value(&frame).expect("Failed to serialize");
    assert_eq!(
        json,
        serde_json::json!({"type": "stop_typing", "data": {"conversation_id": "C1"}})
    );
}

#[test]
fn test_server_event_parsing() {
    let json = r#"{
        "type": "reaction_added",
        "data": {
            "conversation_id": "C1",
            "message_id": "m1",
            "emoji": "👍",
            "user_id": "u2",
            "username": "bob"
        }
    }"#;
    let event: ServerEvent = serde_json::from_str(json).expect("Failed to parse");
    assert_eq!(event.conversation_id(), Some("C1"));
    assert!(matches!(event, ServerEvent::ReactionAdded { ref emoji, .. } if emoji == "👍"));

    let json = r#"{"type": "new_message", "data": {"message": {
        "id": "m9", "conversation_id": "C1", "sender_id": "u2",
        "content": "yo", "created_at": "2024-01-01T12:00:00Z"
    }}}"#;
    let event: ServerEvent = serde_json::from_str(json).expect("Failed to parse");
    match event {
        ServerEvent::NewMessage { message } => {
            assert_eq!(message.id, "m9");
            assert!(message.reactions.is_empty());
            assert!(message.read_at.is_none());
        }
        other => panic!("unexpected event {:?}", other),
    }

    let event: ServerEvent =
        serde_json::from_str(r#"{"type": "error", "data": {"message": "nope"}}"#)
            .expect("Failed to parse");
    assert_eq!(event.conversation_id(), None);
}

#[test]
fn test_reaction_change_inverse() {
    assert!(ReactionChange::Added.is_add());
    assert_eq!(ReactionChange::Added.inverse(), ReactionChange::Removed);
    assert_eq!(ReactionChange::Removed.inverse(), ReactionChange::Added);
}

#[test]
fn test_listeners_are_mutually_exclusive() {
    let channel = offline_channel();
    assert_eq!(channel.mode(), SubscriptionMode::None);

    let global = recording_global(&channel);
    assert_eq!(channel.mode(), SubscriptionMode::List);

    let listener = Arc::new(RecordingListener::default());
    let subscription = channel.join_conversation(CONV_ID, listener.clone());
    assert_eq!(channel.mode(), SubscriptionMode::Conversation(CONV_ID.to_string()));

    channel.dispatch(new_message_event("m1", CONV_ID));
    assert!(global.lock().is_empty());
    assert_eq!(listener.events(), vec!["message:m1"]);

    subscription.unsubscribe();
    assert_eq!(channel.mode(), SubscriptionMode::None);

    let global = recording_global(&channel);
    channel.dispatch(new_message_event("m2", CONV_ID));
    assert_eq!(*global.lock(), vec!["m2".to_string()]);
    assert_eq!(listener.events(), vec!["message:m1"]);
}

#[test]
fn test_clearing_global_listener_keeps_conversation() {
    let channel = offline_channel();
    let _subscription = channel.join_conversation(CONV_ID, Arc::new(RecordingListener::default()));

    channel.set_global_message_listener(None);

    assert_eq!(channel.mode(), SubscriptionMode::Conversation(CONV_ID.to_string()));
}

#[test]
fn test_global_listener_replaces_conversation() {
    let channel = offline_channel();
    let subscription = channel.join_conversation(CONV_ID, Arc::new(RecordingListener::default()));

    let _global = recording_global(&channel);
    assert_eq!(channel.mode(), SubscriptionMode::List);

    // The old handle must not remove the list listener
    drop(subscription);
    assert_eq!(channel.mode(), SubscriptionMode::List);
}

#[test]
fn test_stale_subscription_does_not_clear_newer() {
    let channel = offline_channel();
    let first = channel.join_conversation("C1", Arc::new(RecordingListener::default()));
    let second = channel.join_conversation("C2", Arc::new(RecordingListener::default()));
    assert_eq!(first.conversation_id(), "C1");

    drop(first);
    assert_eq!(channel.mode(), SubscriptionMode::Conversation("C2".to_string()));
    assert_eq!(channel.joined_conversation().as_deref(), Some("C2"));

    drop(second);
    assert_eq!(channel.mode(), SubscriptionMode::None);
}

#[test]
fn test_events_for_other_conversations_are_dropped() {
    let channel = offline_channel();
    let listener = Arc::new(RecordingListener::default());
    let _subscription = channel.join_conversation(CONV_ID, listener.clone());

    channel.dispatch(new_message_event("m1", "C999"));
    channel.dispatch(ServerEvent::Typing {
        conversation_id: "C999".to_string(),
        user_id: OTHER_ID.to_string(),
        username: "bob".to_string(),
    });
    channel.dispatch(ServerEvent::Error {
        message: "rate limited".to_string(),
    });

    assert!(listener.events().is_empty());
}

#[test]
fn test_dispatch_routes_typed_events_in_order() {
    let channel = offline_channel();
    let listener = Arc::new(RecordingListener::default());
    let _subscription = channel.join_conversation(CONV_ID, listener.clone());

    channel.dispatch(ServerEvent::Typing {
        conversation_id: CONV_ID.to_string(),
        user_id: OTHER_ID.to_string(),
        username: "bob".to_string(),
    });
    channel.dispatch(ServerEvent::StopTyping {
        conversation_id: CONV_ID.to_string(),
        user_id: OTHER_ID.to_string(),
    });
    channel.dispatch(new_message_event("m1", CONV_ID));
    channel.dispatch(ServerEvent::MessagesRead {
        conversation_id: CONV_ID.to_string(),
        message_ids: vec!["m0".to_string(), "m1".to_string()],
    });
    channel.dispatch(ServerEvent::ReactionRemoved {
        conversation_id: CONV_ID.to_string(),
        message_id: "m1".to_string(),
        emoji: "🔥".to_string(),
        user_id: OTHER_ID.to_string(),
        username: "bob".to_string(),
    });

    assert_eq!(
        listener.events(),
        vec![
            format!("typing:{}", OTHER_ID),
            format!("stop:{}", OTHER_ID),
            "message:m1".to_string(),
            "read:m0,m1".to_string(),
            "reaction:Removed:m1:🔥".to_string(),
        ]
    );
}

#[test]
fn test_list_listener_ignores_non_message_events() {
    let channel = offline_channel();
    let global = recording_global(&channel);

    channel.dispatch(ServerEvent::MessagesRead {
        conversation_id: CONV_ID.to_string(),
        message_ids: vec!["m1".to_string()],
    });

    assert!(global.lock().is_empty());
}

#[test]
fn test_typing_frames_target_joined_conversation() {
    let channel = offline_channel();
    channel.send_typing_indicator();
    assert!(channel.drain_outbound().is_empty());

    let _subscription = channel.join_conversation(CONV_ID, Arc::new(RecordingListener::default()));
    channel.send_typing_indicator();
    channel.send_stop_typing();

    // Offline: join is deferred to the connection task, typing is queued
    assert_eq!(
        channel.drain_outbound(),
        vec![
            ClientFrame::Typing {
                conversation_id: CONV_ID.to_string()
            },
            ClientFrame::StopTyping {
                conversation_id: CONV_ID.to_string()
            },
        ]
    );
}

#[test]
fn test_join_and_leave_frames_while_connected() {
    let channel = offline_channel();
    channel.set_connected(true);

    let first = channel.join_conversation("C1", Arc::new(RecordingListener::default()));
    let _second = channel.join_conversation("C2", Arc::new(RecordingListener::default()));
    drop(first);

    assert_eq!(
        channel.drain_outbound(),
        vec![
            ClientFrame::Join {
                conversation_id: "C1".to_string()
            },
            ClientFrame::Leave {
                conversation_id: "C1".to_string()
            },
            ClientFrame::Join {
                conversation_id: "C2".to_string()
            },
        ]
    );
}

#[tokio::test]
async fn test_disconnect_without_connection_is_harmless() {
    let channel = offline_channel();
    channel.disconnect();
    assert!(!channel.is_connected());
}

async fn next_frame(socket: &mut WebSocketStream<TcpStream>) -> ClientFrame {
    loop {
        match socket.next().await {
            Some(Ok(WsMessage::Text(text))) => {
                return serde_json::from_str(&text).expect("Failed to parse client frame");
            }
            Some(Ok(_)) => continue,
            other => panic!("Socket ended before a frame arrived: {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_reconnect_rejoins_then_flushes_queued_frames() {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind listener");
    let addr = listener.local_addr().expect("Failed to read address");
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel();

    let server = tokio::spawn(async move {
        // First connection: read the join, then drop the socket
        let (stream, _) = listener.accept().await.expect("Failed to accept");
        let mut socket = accept_async(stream).await.expect("Failed to handshake");
        let _ = frames_tx.send((1, next_frame(&mut socket).await));
        drop(socket);

        let (stream, _) = listener.accept().await.expect("Failed to accept");
        let mut socket = accept_async(stream).await.expect("Failed to handshake");
        for _ in 0..2 {
            let _ = frames_tx.send((2, next_frame(&mut socket).await));
        }
        socket
    });

    let channel = ChannelClient::new(ChannelConfig {
        url: format!("ws://{}/ws", addr),
        token: None,
        reconnect_base_delay: Duration::from_millis(300),
        reconnect_max_delay: Duration::from_secs(1),
    });
    channel.connect().await.expect("Failed to connect");
    let _subscription = channel.join_conversation(CONV_ID, Arc::new(RecordingListener::default()));

    let join = ClientFrame::Join {
        conversation_id: CONV_ID.to_string(),
    };
    let first = timeout(Duration::from_secs(5), frames_rx.recv())
        .await
        .expect("Timed out waiting for first frame");
    assert_eq!(first, Some((1, join.clone())));

    timeout(Duration::from_secs(5), async {
        while channel.is_connected() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Timed out waiting for the connection to drop");
    channel.send_typing_indicator();

    let mut second = Vec::new();
    for _ in 0..2 {
        let frame = timeout(Duration::from_secs(5), frames_rx.recv())
            .await
            .expect("Timed out waiting for frames after reconnect");
        second.push(frame.expect("Server stopped early"));
    }
    assert_eq!(
        second,
        vec![
            (2, join),
            (
                2,
                ClientFrame::Typing {
                    conversation_id: CONV_ID.to_string()
                }
            ),
        ]
    );
    assert!(channel.is_connected());

    channel.disconnect();
    server.abort();
}

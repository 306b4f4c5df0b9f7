use super::support::*;
use crate::channel::SubscriptionMode;
use crate::session::{ActiveView, ChatSession, Command, SessionContext, LOAD_OLDER_THRESHOLD};
use crate::view::{Popover, ViewPhase};
use std::sync::Arc;

fn create_test_session() -> (ChatSession, Arc<MockApi>) {
    let mut bob = create_test_conversation(CONV_ID, "bob", 1);
    bob.unread_count = 2;
    let mut carol = create_test_conversation("C2", "carol", 10);
    carol.unread_count = 1;

    let api = MockApi::new()
        .with_page(
            CONV_ID,
            None,
            page(
                vec![
                    create_test_message("m1", OTHER_ID, "hi", 1),
                    create_test_message("m2", OTHER_ID, "there", 2),
                ],
                true,
            ),
        )
        .with_page(
            CONV_ID,
            Some("m1"),
            page(vec![create_test_message("m0", OTHER_ID, "first", 0)], false),
        );
    *api.conversations.lock() = vec![carol, bob];
    let api = Arc::new(api);

    let session = ChatSession::new(api.clone(), signed_in(), offline_channel(), &test_settings());
    (session, api)
}

fn open_bob() -> Command {
    Command::OpenConversation {
        username: "bob".to_string(),
        conversation_id: Some(CONV_ID.to_string()),
    }
}

#[test]
fn test_context_reset_keeps_pending_counter() {
    let mut context = SessionContext::new();
    context.conversation_id = Some(CONV_ID.to_string());
    context.popover = Some(Popover::Options("m1".to_string()));
    assert_eq!(context.next_pending_id(), "pending-1");

    context.reset();

    assert_eq!(context.conversation_id, None);
    assert_eq!(context.popover, None);
    assert_eq!(context.generation, 1);
    assert!(context.is_current(1));
    assert!(!context.is_current(0));
    assert_eq!(context.next_pending_id(), "pending-2");
}

#[test]
fn test_cancel_typing_without_timer() {
    let mut context = SessionContext::new();
    assert!(!context.cancel_typing());
}

#[tokio::test]
async fn test_open_drawer_shows_list() {
    let (session, _api) = create_test_session();

    session
        .execute(Command::OpenDrawer)
        .await
        .expect("Failed to open drawer");

    let snapshot = session.snapshot();
    assert_eq!(snapshot.active, ActiveView::List);
    assert_eq!(snapshot.subscription, SubscriptionMode::List);
    assert_eq!(snapshot.list.len(), 2);
    assert_eq!(snapshot.list[0].conversation_id, CONV_ID);
    assert_eq!(snapshot.unread_total, 3);
    assert!(!snapshot.connected);
}

#[tokio::test]
async fn test_list_and_conversation_listeners_exclusive() {
    let (session, _api) = create_test_session();
    session
        .execute(Command::OpenDrawer)
        .await
        .expect("Failed to open drawer");

    session.execute(open_bob()).await.expect("Failed to open conversation");
    assert_eq!(session.active(), ActiveView::Conversation);
    assert_eq!(
        session.channel().mode(),
        SubscriptionMode::Conversation(CONV_ID.to_string())
    );

    session.execute(Command::Back).await.expect("Failed to go back");
    assert_eq!(session.active(), ActiveView::List);
    assert_eq!(session.channel().mode(), SubscriptionMode::List);
    assert_eq!(session.snapshot().conversation.phase, ViewPhase::Closed);

    session.execute(open_bob()).await.expect("Failed to reopen conversation");
    session
        .execute(Command::CloseDrawer)
        .await
        .expect("Failed to close drawer");
    assert_eq!(session.active(), ActiveView::Closed);
    assert_eq!(session.channel().mode(), SubscriptionMode::None);
}

#[tokio::test]
async fn test_scroll_near_top_loads_older() {
    let (session, api) = create_test_session();
    session.execute(open_bob()).await.expect("Failed to open conversation");

    session
        .execute(Command::Scroll {
            offset: LOAD_OLDER_THRESHOLD + 50,
        })
        .await
        .expect("Failed to scroll");
    assert_eq!(api.count(|c| matches!(c, Call::GetMessages(_, Some(_)))), 0);

    session
        .execute(Command::Scroll { offset: 10 })
        .await
        .expect("Failed to scroll");

    assert_eq!(api.count(|c| matches!(c, Call::GetMessages(_, Some(_)))), 1);
    let ids: Vec<String> = session
        .snapshot()
        .conversation
        .messages
        .iter()
        .map(|m| m.id.clone())
        .collect();
    assert_eq!(ids, vec!["m0", "m1", "m2"]);
}

#[tokio::test]
async fn test_compose_and_send_through_commands() {
    let (session, api) = create_test_session();
    session.execute(open_bob()).await.expect("Failed to open conversation");

    session
        .execute(Command::Quote("m2".to_string()))
        .await
        .expect("Failed to quote");
    assert!(session.snapshot().quote.is_some());

    session
        .execute(Command::Input("on my way".to_string()))
        .await
        .expect("Failed to type");
    let handle = session.send().expect("Failed to start send");
    handle.await.expect("Failed to join send");

    assert!(api.calls().contains(&Call::Send(
        CONV_ID.to_string(),
        "on my way".to_string(),
        Some("m2".to_string())
    )));
    let snapshot = session.snapshot();
    assert!(snapshot.quote.is_none());
    assert!(snapshot.conversation.contains("srv-1"));
}

#[tokio::test]
async fn test_popover_commands() {
    let (session, _api) = create_test_session();
    session.execute(open_bob()).await.expect("Failed to open conversation");

    session
        .execute(Command::OpenEmojiPicker("m1".to_string()))
        .await
        .expect("Failed to open picker");
    assert_eq!(
        session.snapshot().popover,
        Some(Popover::EmojiPicker("m1".to_string()))
    );

    session
        .execute(Command::ClosePopovers)
        .await
        .expect("Failed to close popovers");
    assert_eq!(session.snapshot().popover, None);

    assert!(session
        .execute(Command::Quote("missing".to_string()))
        .await
        .is_err());
}

#[tokio::test]
async fn test_bootstrap_failure_surfaces_error() {
    let (session, api) = create_test_session();
    *api.conversation.lock() = None;

    assert!(session.execute(open_bob()).await.is_err());

    let snapshot = session.snapshot();
    assert_eq!(snapshot.conversation.phase, ViewPhase::Error);
    assert_eq!(snapshot.subscription, SubscriptionMode::None);
}

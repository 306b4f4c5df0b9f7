// TUI Tests - screens, rendering helpers and app navigation

use super::support::*;
use crate::model::{ChatPreview, DeliveryStatus};
use crate::channel::SubscriptionMode;
use crate::session::{ActiveView, ChatSession};
use crate::tui::screens::*;
use crate::tui::ui::{chat_row, format_relative_time, message_line};
use crate::tui::{App, Screen};
use crate::view::{RenderedMessage, ViewPhase, QUICK_EMOJIS};
use chrono::Duration;
use ratatui::text::Line;
use std::sync::Arc;
use tokio::runtime::Handle;

fn text(line: &Line) -> String {
    line.spans.iter().map(|s| s.content.as_ref()).collect()
}

fn create_test_app() -> App {
    let api = MockApi::new().with_page(
        CONV_ID,
        None,
        page(vec![create_test_message("m1", OTHER_ID, "hello", 1)], false),
    );
    *api.conversations.lock() = vec![create_test_conversation(CONV_ID, "bob", 1)];
    let session = ChatSession::new(Arc::new(api), signed_in(), offline_channel(), &test_settings());
    App::new(session, Handle::current())
}

#[test]
fn test_format_relative_time() {
    let now = base_time();
    let ago = |d: Duration| (now - d).timestamp_millis();

    assert_eq!(format_relative_time(ago(Duration::seconds(30)), now), "now");
    assert_eq!(format_relative_time(ago(Duration::minutes(5)), now), "5m");
    assert_eq!(format_relative_time(ago(Duration::hours(3)), now), "3h");
    assert_eq!(format_relative_time(ago(Duration::days(2)), now), "2d");
    assert_eq!(format_relative_time(ago(Duration::days(10)), now), "Dec 22");
}

#[test]
fn test_chat_row_shows_unread_count() {
    let mut conversation = create_test_conversation(CONV_ID, "bob", 5);
    conversation.unread_count = 2;
    let chat = ChatPreview::from(&conversation);

    let row = text(&chat_row(&chat, true, base_time()));

    assert!(row.starts_with("→ ● bob (2)"));
    assert!(row.contains("hello from bob"));
    assert!(row.ends_with("5m"));
}

#[test]
fn test_message_line_shows_status_and_badges() {
    let mut message = RenderedMessage::pending(
        "pending-1".to_string(),
        ME_ID.to_string(),
        "did it work?".to_string(),
        None,
    );
    message.status = Some(DeliveryStatus::Failed);
    message.add_reaction("👍", OTHER_ID, "bob", false);
    message.add_reaction("👍", ME_ID, "alice", true);

    let line = text(&message_line(&message, "bob", false));

    assert!(line.contains("You: did it work?"));
    assert!(line.contains("✗"));
    assert!(line.contains("👍2"));

    let theirs = RenderedMessage::from_message(
        &create_test_message("m1", OTHER_ID, "hey", 1),
        false,
        Some(ME_ID),
    );
    let line = text(&message_line(&theirs, "bob", true));
    assert!(line.starts_with("→ "));
    assert!(line.contains("bob: hey"));
    assert!(!line.contains("✓"));
}

#[test]
fn test_chat_list_screen_wraps() {
    let mut screen = ChatListScreen::new();
    screen.previous(3);
    assert_eq!(screen.selected_index, 2);
    screen.next(3);
    assert_eq!(screen.selected_index, 0);

    screen.selected_index = 5;
    screen.clamp(2);
    assert_eq!(screen.selected_index, 1);

    screen.next(0);
    screen.clamp(0);
    assert_eq!(screen.selected_index, 0);
}

#[test]
fn test_chat_view_selection_reports_scroll_offset() {
    let mut screen = ChatViewScreen::new();
    assert_eq!(screen.select_up(0), None);

    assert_eq!(screen.select_up(10), Some(9 * ROW_HEIGHT));
    assert_eq!(screen.select_up(10), Some(8 * ROW_HEIGHT));

    screen.selected_message = Some(0);
    assert_eq!(screen.select_up(10), Some(0));

    screen.select_down(10);
    assert_eq!(screen.selected_message, Some(1));
    screen.selected_message = Some(9);
    screen.select_down(10);
    assert_eq!(screen.selected_message, None);
}

#[test]
fn test_chat_view_selection_follows_prepend() {
    let mut screen = ChatViewScreen::new();
    screen.sync(5, 0);
    screen.selected_message = Some(0);

    screen.sync(8, 3);
    assert_eq!(screen.selected_message, Some(3));

    // Same length again: nothing new on top
    screen.sync(8, 3);
    assert_eq!(screen.selected_message, Some(3));

    screen.sync(2, 0);
    assert_eq!(screen.selected_message, Some(1));
}

#[test]
fn test_emoji_picker_wraps() {
    let mut screen = ChatViewScreen::new();
    assert_eq!(screen.emoji(), QUICK_EMOJIS[0]);

    screen.emoji_left();
    assert_eq!(screen.emoji(), QUICK_EMOJIS[QUICK_EMOJIS.len() - 1]);

    screen.emoji_right();
    screen.emoji_right();
    assert_eq!(screen.emoji(), QUICK_EMOJIS[1]);
}

#[test]
fn test_new_chat_username() {
    let mut screen = NewChatScreen::new();
    assert_eq!(screen.username(), None);

    for c in "@bo b".chars() {
        screen.add_char(c);
    }
    assert_eq!(screen.username().as_deref(), Some("bob"));

    screen.backspace();
    assert_eq!(screen.input, "@bo");
}

#[test]
fn test_screen_help() {
    assert!(Screen::ChatList.help().contains("New chat"));
    assert!(Screen::ChatView.help().contains("Ctrl+E"));
    assert!(Screen::NewChat.help().contains("Esc"));
}

#[tokio::test]
async fn test_app_opens_new_chat_and_goes_back() {
    let mut app = create_test_app();

    app.show_new_chat();
    assert_eq!(app.current_screen, Screen::NewChat);
    for c in "bob".chars() {
        app.new_chat_screen.add_char(c);
    }
    app.submit_new_chat();
    assert_eq!(app.current_screen, Screen::ChatView);

    settle().await;
    app.tick();
    assert_eq!(app.snapshot.conversation.phase, ViewPhase::Ready);
    assert_eq!(app.snapshot.conversation.messages.len(), 1);

    app.escape();
    assert_eq!(app.current_screen, Screen::ChatList);
    settle().await;
    app.tick();
    assert_eq!(app.snapshot.conversation.phase, ViewPhase::Closed);
    assert_eq!(app.snapshot.list.len(), 1);
}

#[tokio::test]
async fn test_app_escape_closes_quote_before_leaving() {
    let mut app = create_test_app();
    app.show_new_chat();
    app.new_chat_screen.input = "bob".to_string();
    app.submit_new_chat();
    settle().await;
    app.tick();

    app.select_up();
    app.reply();
    assert!(app.session.snapshot().quote.is_some());

    app.escape();
    assert!(app.session.snapshot().quote.is_none());
    assert_eq!(app.current_screen, Screen::ChatView);
}

#[tokio::test]
async fn test_app_composer_sends() {
    let mut app = create_test_app();
    app.new_chat_screen.input = "bob".to_string();
    app.submit_new_chat();
    settle().await;
    app.tick();

    for c in "yo".chars() {
        app.add_char(c);
    }
    assert_eq!(app.session.snapshot().conversation.draft, "yo");

    app.send_message();
    assert!(app.input.is_empty());
    settle().await;
    app.tick();
    assert!(app.snapshot.conversation.contains("srv-1"));
}

#[tokio::test]
async fn test_app_back_right_after_open_returns_to_list() {
    let mut app = create_test_app();
    app.new_chat_screen.input = "bob".to_string();
    app.submit_new_chat();
    app.escape();
    settle().await;
    app.tick();

    assert_eq!(app.current_screen, Screen::ChatList);
    assert_eq!(app.session.active(), ActiveView::List);
    assert_eq!(app.session.channel().mode(), SubscriptionMode::List);
    assert_eq!(app.session.conversation().conversation_id(), None);
    assert!(!app.session.conversation().read_receipts().is_pending());
    assert_eq!(app.snapshot.conversation.phase, ViewPhase::Closed);
}

#[tokio::test]
async fn test_app_quit_releases_channel() {
    let mut app = create_test_app();
    app.quit();
    assert!(app.should_quit);
    assert_eq!(
        app.session.channel().mode(),
        SubscriptionMode::None
    );
}

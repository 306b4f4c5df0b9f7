//! UI rendering functions for TUI

use crate::model::ChatPreview;
use crate::tui::app::App;
use crate::tui::types::Screen;
use crate::view::{Popover, RenderedMessage, ViewPhase, QUICK_EMOJIS};
use chrono::{DateTime, Utc};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame,
};

/// Main UI rendering function - dispatches to screen-specific render functions
pub fn ui(f: &mut Frame, app: &App) {
    match app.current_screen {
        Screen::ChatList => render_chat_list(f, app),
        Screen::ChatView => render_chat_view(f, app),
        Screen::NewChat => {
            render_chat_list(f, app);
            render_new_chat_popup(f, app);
        }
    }
}

/// Short relative time for list rows
pub(crate) fn format_relative_time(millis: i64, now: DateTime<Utc>) -> String {
    let Some(then) = DateTime::from_timestamp_millis(millis) else {
        return String::new();
    };
    let elapsed = now.signed_duration_since(then);
    if elapsed.num_minutes() < 1 {
        "now".to_string()
    } else if elapsed.num_hours() < 1 {
        format!("{}m", elapsed.num_minutes())
    } else if elapsed.num_days() < 1 {
        format!("{}h", elapsed.num_hours())
    } else if elapsed.num_days() < 7 {
        format!("{}d", elapsed.num_days())
    } else {
        then.format("%b %d").to_string()
    }
}

/// One list row
pub(crate) fn chat_row(chat: &ChatPreview, selected: bool, now: DateTime<Utc>) -> Line<'static> {
    let (style, indicator) = if chat.unread {
        (Style::default().fg(Color::Green).add_modifier(Modifier::BOLD), "● ")
    } else {
        (Style::default().fg(Color::Gray), "○ ")
    };
    let unread = if chat.unread_count > 0 {
        format!(" ({})", chat.unread_count)
    } else {
        String::new()
    };
    let preview: String = chat.last_message.chars().take(40).collect();

    Line::from(vec![
        Span::styled(
            if selected { "→ " } else { "  " },
            Style::default().fg(Color::Cyan),
        ),
        Span::styled(indicator, style),
        Span::styled(format!("{}{}", chat.display_name, unread), style),
        Span::styled(format!("  {}", preview), Style::default().fg(Color::DarkGray)),
        Span::styled(
            format!("  {}", format_relative_time(chat.last_message_time, now)),
            Style::default().fg(Color::DarkGray),
        ),
    ])
}

/// One message line: time, sender, text, delivery glyph, reactions
pub(crate) fn message_line(
    message: &RenderedMessage,
    counterpart: &str,
    selected: bool,
) -> Line<'static> {
    let (sender, color) = if message.outgoing {
        ("You".to_string(), Color::Green)
    } else {
        (counterpart.to_string(), Color::Blue)
    };
    let mut spans = vec![
        Span::styled(
            if selected { "→ " } else { "  " },
            Style::default().fg(Color::Cyan),
        ),
        Span::styled(
            format!("[{}] ", message.created_at.format("%H:%M")),
            Style::default().fg(Color::DarkGray),
        ),
        Span::styled(
            format!("{}: ", sender),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ),
    ];
    if message.reply_to.is_some() {
        spans.push(Span::styled("↩ ", Style::default().fg(Color::DarkGray)));
    }
    spans.push(Span::styled(message.content.clone(), Style::default().fg(Color::White)));

    if let Some(status) = message.status {
        let status_color = match status {
            crate::model::DeliveryStatus::Failed => Color::Red,
            crate::model::DeliveryStatus::Read => Color::Cyan,
            _ => Color::DarkGray,
        };
        spans.push(Span::styled(
            format!(" {}", status.status_indicator()),
            Style::default().fg(status_color),
        ));
    }
    for badge in &message.reactions {
        let style = if badge.user_reacted {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default().fg(Color::Gray)
        };
        spans.push(Span::styled(format!(" {}{}", badge.emoji, badge.count()), style));
    }
    Line::from(spans)
}

fn render_chat_list(f: &mut Frame, app: &App) {
    let size = f.size();
    let snapshot = &app.snapshot;

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(2)
        .constraints([
            Constraint::Length(3), // Title
            Constraint::Min(5),    // Chat list
            Constraint::Length(3), // Status message
            Constraint::Length(3), // Help text
        ])
        .split(size);

    let unread = if snapshot.unread_total > 0 {
        format!(" - {} unread", snapshot.unread_total)
    } else {
        String::new()
    };
    let title = Paragraph::new(format!("GH Chat ({} chats{})", snapshot.list.len(), unread))
        .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(title, chunks[0]);

    if snapshot.list.is_empty() {
        let text = if snapshot.list_loading {
            "Loading conversations..."
        } else if snapshot.list_error.is_some() {
            "Conversations could not be loaded. Press r to retry."
        } else {
            "No conversations yet. Press n to start one!"
        };
        let empty = Paragraph::new(text)
            .style(Style::default().fg(Color::DarkGray))
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL).title("Chats"));
        f.render_widget(empty, chunks[1]);
    } else {
        let now = Utc::now();
        let items: Vec<ListItem> = snapshot
            .list
            .iter()
            .enumerate()
            .map(|(i, chat)| ListItem::new(chat_row(chat, i == app.chat_list_screen.selected_index, now)))
            .collect();
        let list = List::new(items).block(
            Block::default()
                .borders(Borders::ALL)
                .title("Chats (● Unread | ○ Read)"),
        );
        f.render_widget(list, chunks[1]);
    }

    let status = app
        .status_message
        .clone()
        .or_else(|| snapshot.list_error.clone())
        .unwrap_or_else(|| {
            if snapshot.connected {
                "Live".to_string()
            } else {
                "Offline".to_string()
            }
        });
    let status_widget = Paragraph::new(status)
        .style(Style::default().fg(Color::Green))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title("Status"));
    f.render_widget(status_widget, chunks[2]);

    let help = Paragraph::new(Screen::ChatList.help())
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(help, chunks[3]);
}

fn render_chat_view(f: &mut Frame, app: &App) {
    let size = f.size();
    let view = &app.snapshot.conversation;

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(2)
        .constraints([
            Constraint::Length(3), // Title
            Constraint::Min(5),    // Message history
            Constraint::Length(3), // Input box
            Constraint::Length(3), // Status/Help
        ])
        .split(size);

    let counterpart = view
        .counterpart
        .as_ref()
        .map(|u| u.label().to_string())
        .unwrap_or_else(|| view.username.clone());
    let mut title_spans = vec![Span::styled(
        format!("Chat with {}", counterpart),
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
    )];
    if let Some(typing) = &view.typing {
        title_spans.push(Span::styled(
            format!("  {} is typing...", typing),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        ));
    }
    let title = Paragraph::new(Line::from(title_spans))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(title, chunks[0]);

    match view.phase {
        ViewPhase::Error => {
            let text = view
                .error
                .clone()
                .unwrap_or_else(|| "This conversation could not be opened.".to_string());
            let error = Paragraph::new(text)
                .style(Style::default().fg(Color::Red))
                .alignment(Alignment::Center)
                .wrap(Wrap { trim: true })
                .block(Block::default().borders(Borders::ALL).title("Error"));
            f.render_widget(error, chunks[1]);
        }
        ViewPhase::Idle | ViewPhase::Loading | ViewPhase::Closed if view.messages.is_empty() => {
            let loading = Paragraph::new("Loading...")
                .style(Style::default().fg(Color::DarkGray))
                .alignment(Alignment::Center)
                .block(Block::default().borders(Borders::ALL).title("Messages"));
            f.render_widget(loading, chunks[1]);
        }
        _ => render_messages(f, app, chunks[1], &counterpart),
    }

    let (input_text, input_title, input_style) = if !view.interactive {
        (
            app.input.clone(),
            "Read-only until you are signed in".to_string(),
            Style::default().fg(Color::DarkGray),
        )
    } else {
        let title = match &app.snapshot.quote {
            Some(quote) => format!(
                "Replying to {}: {}",
                quote.sender_label,
                quote.content.chars().take(30).collect::<String>()
            ),
            None => "Type your message".to_string(),
        };
        (app.input.clone(), title, Style::default().fg(Color::Yellow))
    };
    let input = Paragraph::new(input_text)
        .style(input_style)
        .block(Block::default().borders(Borders::ALL).title(input_title));
    f.render_widget(input, chunks[2]);

    let help_text = app
        .status_message
        .clone()
        .or_else(|| view.load_error.clone())
        .unwrap_or_else(|| Screen::ChatView.help().to_string());
    let help = Paragraph::new(help_text)
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(help, chunks[3]);

    match &app.snapshot.popover {
        Some(Popover::EmojiPicker(_)) => render_emoji_picker(f, size, app.chat_view_screen.emoji_index),
        Some(Popover::Options(_)) => render_options_menu(f, size),
        None => {}
    }
}

fn render_messages(f: &mut Frame, app: &App, area: Rect, counterpart: &str) {
    let view = &app.snapshot.conversation;

    if let Some(hint) = view.empty_hint() {
        let empty = Paragraph::new(hint)
            .style(Style::default().fg(Color::DarkGray))
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title("Messages"));
        f.render_widget(empty, area);
        return;
    }

    let mut lines: Vec<Line> = Vec::new();
    if view.loading_older {
        lines.push(Line::styled("  loading older messages...", Style::default().fg(Color::DarkGray)));
    } else if view.has_more {
        lines.push(Line::styled("  ↑ older messages", Style::default().fg(Color::DarkGray)));
    }
    let selected = app.chat_view_screen.selected_message;
    lines.extend(
        view.messages
            .iter()
            .enumerate()
            .map(|(i, m)| message_line(m, counterpart, selected == Some(i))),
    );

    // Keep the selection (or the newest message) in sight
    let visible = area.height.saturating_sub(2) as usize;
    let focus = selected.map(|i| i + 1).unwrap_or(lines.len());
    let start = focus.saturating_sub(visible);
    let end = (start + visible).min(lines.len());
    let shown: Vec<Line> = lines.drain(start..end).collect();

    let live = if app.snapshot.connected { "live" } else { "offline" };
    let messages = Paragraph::new(shown).block(
        Block::default()
            .borders(Borders::ALL)
            .title(format!("Messages ({}, {})", view.messages.len(), live)),
    );
    f.render_widget(messages, area);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    Rect {
        x: area.width.saturating_sub(width) / 2,
        y: area.height.saturating_sub(height) / 2,
        width: width.min(area.width),
        height: height.min(area.height),
    }
}

fn render_emoji_picker(f: &mut Frame, area: Rect, highlighted: usize) {
    let popup = centered(area, 50, 5);
    f.render_widget(Clear, popup);

    let spans: Vec<Span> = QUICK_EMOJIS
        .iter()
        .enumerate()
        .map(|(i, emoji)| {
            if i == highlighted {
                Span::styled(
                    format!("[{}]", emoji),
                    Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
                )
            } else {
                Span::raw(format!(" {} ", emoji))
            }
        })
        .collect();
    let picker = Paragraph::new(vec![
        Line::from(spans),
        Line::styled("←→: Choose | Enter: React | Esc: Close", Style::default().fg(Color::DarkGray)),
    ])
    .alignment(Alignment::Center)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title("React"),
    );
    f.render_widget(picker, popup);
}

fn render_options_menu(f: &mut Frame, area: Rect) {
    let popup = centered(area, 30, 5);
    f.render_widget(Clear, popup);

    let menu = Paragraph::new(vec![
        Line::from(vec![
            Span::styled("[r]", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)),
            Span::raw(" Reply"),
        ]),
        Line::from(vec![
            Span::styled("[e]", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)),
            Span::raw(" React"),
        ]),
    ])
    .alignment(Alignment::Center)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title("Message"),
    );
    f.render_widget(menu, popup);
}

fn render_new_chat_popup(f: &mut Frame, app: &App) {
    let popup = centered(f.size(), 50, 5);
    f.render_widget(Clear, popup);

    let prompt = Paragraph::new(vec![
        Line::from(Span::styled(
            format!("@{}", app.new_chat_screen.input),
            Style::default().fg(Color::Yellow),
        )),
        Line::styled(Screen::NewChat.help(), Style::default().fg(Color::DarkGray)),
    ])
    .alignment(Alignment::Center)
    .block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan))
            .title("New chat"),
    );
    f.render_widget(prompt, popup);
}

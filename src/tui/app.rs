//! Main TUI application state and logic

use crate::session::{ChatSession, Command, SessionSnapshot};
use crate::tui::screens::{ChatListScreen, ChatViewScreen, NewChatScreen};
use crate::tui::types::Screen;
use crate::view::Popover;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::warn;

/// Application state
pub struct App {
    /// The engine
    pub session: ChatSession,
    /// Current screen
    pub current_screen: Screen,
    /// View model as of the last tick
    pub snapshot: SessionSnapshot,
    /// Chat list screen
    pub chat_list_screen: ChatListScreen,
    /// Chat view screen
    pub chat_view_screen: ChatViewScreen,
    /// New chat prompt
    pub new_chat_screen: NewChatScreen,
    /// Status line (last error)
    pub status_message: Option<String>,
    /// Should quit
    pub should_quit: bool,
    /// Composer text, owned here so keystrokes never race the engine
    pub input: String,
    runtime: Handle,
    commands: mpsc::UnboundedSender<Command>,
    errors_tx: mpsc::UnboundedSender<String>,
    errors_rx: mpsc::UnboundedReceiver<String>,
}

impl App {
    /// Create the application around a session
    ///
    /// Must be called inside the runtime `runtime` belongs to, since the
    /// session spawns timers on it.
    pub fn new(session: ChatSession, runtime: Handle) -> Self {
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();
        let (commands, queue) = mpsc::unbounded_channel();
        runtime.spawn(run_commands(session.clone(), queue, errors_tx.clone()));
        let snapshot = session.snapshot();
        Self {
            session,
            current_screen: Screen::ChatList,
            snapshot,
            chat_list_screen: ChatListScreen::new(),
            chat_view_screen: ChatViewScreen::new(),
            new_chat_screen: NewChatScreen::new(),
            status_message: None,
            should_quit: false,
            input: String::new(),
            runtime,
            commands,
            errors_tx,
            errors_rx,
        }
    }

    /// Queue a command for the worker; errors land on the status line
    fn dispatch(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("Command worker stopped, command dropped");
        }
    }

    /// Connect the realtime channel and show the list
    pub fn start(&mut self) {
        let session = self.session.clone();
        let errors = self.errors_tx.clone();
        self.runtime.spawn(async move {
            if let Err(e) = session.connect().await {
                let _ = errors.send(format!("Offline: {}", e));
            }
        });
        self.dispatch(Command::OpenDrawer);
    }

    /// Pull the latest view model; call once per frame
    pub fn tick(&mut self) {
        while let Ok(error) = self.errors_rx.try_recv() {
            self.status_message = Some(error);
        }
        self.snapshot = self.session.snapshot();

        self.chat_list_screen.clamp(self.snapshot.list.len());
        if self.current_screen == Screen::ChatView {
            let conversation = &self.snapshot.conversation;
            self.chat_view_screen
                .sync(conversation.messages.len(), conversation.scroll_anchor);
        }
    }

    /// Move to next chat
    pub fn next(&mut self) {
        self.chat_list_screen.next(self.snapshot.list.len());
    }

    /// Move to previous chat
    pub fn previous(&mut self) {
        self.chat_list_screen.previous(self.snapshot.list.len());
    }

    /// Open the selected chat
    pub fn open_selected_chat(&mut self) {
        let Some(chat) = self.snapshot.list.get(self.chat_list_screen.selected_index) else {
            return;
        };
        let command = Command::OpenConversation {
            username: chat.username.clone(),
            conversation_id: Some(chat.conversation_id.clone()),
        };
        self.enter_chat_view();
        self.dispatch(command);
    }

    /// Re-fetch the list
    pub fn refresh_list(&mut self) {
        self.status_message = None;
        self.dispatch(Command::RefreshList);
    }

    /// Show the new chat prompt
    pub fn show_new_chat(&mut self) {
        self.new_chat_screen = NewChatScreen::new();
        self.current_screen = Screen::NewChat;
    }

    /// Open the conversation typed in the prompt
    pub fn submit_new_chat(&mut self) {
        let Some(username) = self.new_chat_screen.username() else {
            return;
        };
        self.enter_chat_view();
        self.dispatch(Command::OpenConversation {
            username,
            conversation_id: None,
        });
    }

    /// Leave the prompt
    pub fn cancel_new_chat(&mut self) {
        self.current_screen = Screen::ChatList;
    }

    fn enter_chat_view(&mut self) {
        self.chat_view_screen = ChatViewScreen::new();
        self.input.clear();
        self.status_message = None;
        self.current_screen = Screen::ChatView;
    }

    /// Back from a conversation to the list
    pub fn back_to_chat_list(&mut self) {
        self.current_screen = Screen::ChatList;
        self.input.clear();
        self.dispatch(Command::Back);
    }

    /// Type into the composer
    pub fn add_char(&mut self, c: char) {
        self.input.push(c);
        self.session.conversation().handle_input(&self.input);
    }

    /// Delete from the composer
    pub fn backspace(&mut self) {
        self.input.pop();
        self.session.conversation().handle_input(&self.input);
    }

    /// Send the composer text
    pub fn send_message(&mut self) {
        if self.session.send().is_some() {
            self.input.clear();
        }
    }

    /// Select an older message, loading the previous page near the top
    pub fn select_up(&mut self) {
        let count = self.snapshot.conversation.messages.len();
        if let Some(offset) = self.chat_view_screen.select_up(count) {
            self.dispatch(Command::Scroll { offset });
        }
    }

    /// Select a newer message
    pub fn select_down(&mut self) {
        let count = self.snapshot.conversation.messages.len();
        self.chat_view_screen.select_down(count);
    }

    fn selected_message_id(&self) -> Option<String> {
        let index = self.chat_view_screen.selected_message?;
        self.snapshot
            .conversation
            .messages
            .get(index)
            .map(|m| m.id.clone())
    }

    /// Toggle the emoji picker of the selected message
    pub fn open_emoji_picker(&mut self) {
        if let Some(id) = self.selected_message_id() {
            self.session.conversation().open_emoji_picker(&id);
        }
    }

    /// Toggle the options menu of the selected message
    pub fn open_options(&mut self) {
        if let Some(id) = self.selected_message_id() {
            self.session.conversation().open_options_menu(&id);
        }
    }

    /// Toggle the highlighted emoji on the picker's message
    pub fn pick_emoji(&mut self) {
        let Some(Popover::EmojiPicker(id)) = self.session.snapshot().popover else {
            return;
        };
        let emoji = self.chat_view_screen.emoji();
        self.session.conversation().toggle_reaction(&id, emoji);
    }

    /// Quote the selected message (or the options menu's message)
    pub fn reply(&mut self) {
        let id = match self.session.snapshot().popover {
            Some(popover) => Some(popover.message_id().to_string()),
            None => self.selected_message_id(),
        };
        if let Some(id) = id {
            if let Err(e) = self.session.conversation().quote_message(&id) {
                self.status_message = Some(e.to_string());
            }
        }
    }

    /// Switch from the options menu to the emoji picker of the same message
    pub fn react_from_options(&mut self) {
        if let Some(Popover::Options(id)) = self.session.snapshot().popover {
            self.session.conversation().open_emoji_picker(&id);
        }
    }

    /// Esc: close a popover, then drop the quote, then go back
    pub fn escape(&mut self) {
        let snapshot = self.session.snapshot();
        if snapshot.popover.is_some() {
            self.session.conversation().close_popovers();
        } else if snapshot.quote.is_some() {
            self.session.conversation().clear_quote();
        } else {
            self.back_to_chat_list();
        }
    }

    /// Close the drawer and quit
    pub fn quit(&mut self) {
        self.session.conversation().teardown();
        self.session.list().deactivate();
        self.session.channel().disconnect();
        self.should_quit = true;
    }
}

/// Execute queued commands one at a time, in the order they were issued
async fn run_commands(
    session: ChatSession,
    mut queue: mpsc::UnboundedReceiver<Command>,
    errors: mpsc::UnboundedSender<String>,
) {
    while let Some(command) = queue.recv().await {
        if let Err(e) = session.execute(command).await {
            warn!("Command failed: {}", e);
            let _ = errors.send(e.to_string());
        }
    }
}

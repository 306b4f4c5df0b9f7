//! GH Chat TUI (Terminal User Interface)
//!
//! A terminal client for GH Chat conversations.

use anyhow::Context;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ghchat::api::HttpApi;
use ghchat::channel::{ChannelClient, ChannelConfig};
use ghchat::config::Settings;
use ghchat::session::ChatSession;
use ghchat::tui::{ui::ui, App, Screen};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::sync::Arc;

const SETTINGS_PATH: &str = "ghchat.json";
const LOG_PATH: &str = "ghchat.log";

fn main() -> anyhow::Result<()> {
    // Log to a file; stdout belongs to the terminal UI
    let log_file = std::fs::File::create(LOG_PATH).context("creating log file")?;
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .init();

    let settings = Settings::load(SETTINGS_PATH).context("loading settings")?;
    if settings.auth_token.is_none() {
        eprintln!("Warning: no auth token; set GHCHAT_TOKEN to send messages");
    }

    let runtime = tokio::runtime::Runtime::new().context("starting runtime")?;
    let _guard = runtime.enter();

    let api = Arc::new(HttpApi::from_settings(&settings)?);
    let channel = ChannelClient::new(ChannelConfig::from_settings(&settings));
    let session = ChatSession::new(api.clone(), api, channel, &settings);

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(session, runtime.handle().clone());
    app.start();

    // Run main loop
    let res = run_app(&mut terminal, &mut app);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(terminal: &mut Terminal<B>, app: &mut App) -> io::Result<()> {
    loop {
        app.tick();
        terminal.draw(|f| ui(f, app))?;

        if event::poll(std::time::Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
                match app.current_screen {
                    Screen::ChatList => match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => app.quit(),
                        KeyCode::Down | KeyCode::Char('j') => app.next(),
                        KeyCode::Up | KeyCode::Char('k') => app.previous(),
                        KeyCode::Enter => app.open_selected_chat(),
                        KeyCode::Char('n') => app.show_new_chat(),
                        KeyCode::Char('r') | KeyCode::F(5) => app.refresh_list(),
                        _ => {}
                    },
                    Screen::NewChat => match key.code {
                        KeyCode::Esc => app.cancel_new_chat(),
                        KeyCode::Enter => app.submit_new_chat(),
                        KeyCode::Backspace => app.new_chat_screen.backspace(),
                        KeyCode::Char(c) if !ctrl => app.new_chat_screen.add_char(c),
                        _ => {}
                    },
                    Screen::ChatView => {
                        // Popovers capture the keyboard while open
                        match app.snapshot.popover.clone() {
                            Some(ghchat::view::Popover::EmojiPicker(_)) => {
                                match key.code {
                                    KeyCode::Left => app.chat_view_screen.emoji_left(),
                                    KeyCode::Right => app.chat_view_screen.emoji_right(),
                                    KeyCode::Enter => app.pick_emoji(),
                                    KeyCode::Esc => app.escape(),
                                    _ => {}
                                }
                                continue;
                            }
                            Some(ghchat::view::Popover::Options(_)) => {
                                match key.code {
                                    KeyCode::Char('r') => app.reply(),
                                    KeyCode::Char('e') => app.react_from_options(),
                                    KeyCode::Esc => app.escape(),
                                    _ => {}
                                }
                                continue;
                            }
                            None => {}
                        }
                        match key.code {
                            KeyCode::Esc => app.escape(),
                            KeyCode::Char('c') if ctrl => app.quit(),
                            KeyCode::Char('e') if ctrl => app.open_emoji_picker(),
                            KeyCode::Char('o') if ctrl => app.open_options(),
                            KeyCode::Char('r') if ctrl => app.reply(),
                            KeyCode::Char(c) if !ctrl => app.add_char(c),
                            KeyCode::Backspace => app.backspace(),
                            KeyCode::Enter => app.send_message(),
                            KeyCode::Up => app.select_up(),
                            KeyCode::Down => app.select_down(),
                            _ => {}
                        }
                    }
                }
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

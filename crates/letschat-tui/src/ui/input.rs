//! Keyboard input handling for the TUI.
//!
//! This module handles all keyboard events and translates them into
//! application state changes.

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent};
use letschat_core::models::ChatColor;

use crate::app::{
    can_add_input_char, can_add_name_char, App, AppState, ChatFocus, Screen, StartFocus,
    PAGE_SCROLL_SIZE,
};

/// Handle keyboard input. Returns true if the app should quit.
pub async fn handle_input(app: &mut App, key: KeyEvent) -> Result<bool> {
    // Handle help overlay
    if matches!(app.state, AppState::ShowingHelp) {
        if matches!(key.code, KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q')) {
            app.state = AppState::Normal;
        }
        return Ok(false);
    }

    // Handle quit confirmation
    if matches!(app.state, AppState::ConfirmingQuit) {
        match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => {
                app.state = AppState::Quitting;
                return Ok(true);
            }
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                app.state = AppState::Normal;
            }
            _ => {}
        }
        return Ok(false);
    }

    match app.screen {
        Screen::Start => handle_start_input(app, key),
        Screen::Chat => handle_chat_input(app, key),
    }
}

fn handle_start_input(app: &mut App, key: KeyEvent) -> Result<bool> {
    match key.code {
        KeyCode::Esc => {
            app.state = AppState::ConfirmingQuit;
        }
        KeyCode::Down | KeyCode::Tab => {
            app.start_focus = app.start_focus.next();
        }
        KeyCode::Up | KeyCode::BackTab => {
            app.start_focus = app.start_focus.prev();
        }
        KeyCode::Left if app.start_focus == StartFocus::Color => {
            app.selected_color = app.selected_color.prev();
        }
        KeyCode::Right if app.start_focus == StartFocus::Color => {
            app.selected_color = app.selected_color.next();
        }
        KeyCode::Enter => match app.start_focus {
            StartFocus::Name => app.start_focus = StartFocus::Color,
            StartFocus::Color => app.start_focus = StartFocus::Button,
            StartFocus::Button => app.start_chat(),
        },
        KeyCode::Backspace => {
            if app.start_focus == StartFocus::Name {
                app.name_input.pop();
            }
        }
        KeyCode::Char(c) => match app.start_focus {
            StartFocus::Name => {
                if can_add_name_char(app.name_input.chars().count(), c) {
                    app.name_input.push(c);
                }
            }
            StartFocus::Color => {
                // 1-4 picks a colour directly
                let picked = c
                    .to_digit(10)
                    .and_then(|n| (n as usize).checked_sub(1))
                    .and_then(|i| ChatColor::ALL.get(i));
                if let Some(color) = picked {
                    app.selected_color = *color;
                }
            }
            StartFocus::Button => {
                if c == '?' {
                    app.state = AppState::ShowingHelp;
                }
            }
        },
        _ => {}
    }
    Ok(false)
}

fn handle_chat_input(app: &mut App, key: KeyEvent) -> Result<bool> {
    if app.chat_focus == ChatFocus::Input {
        if !app.input_visible() {
            app.chat_focus = ChatFocus::Messages;
            return Ok(false);
        }
        match key.code {
            KeyCode::Esc => {
                app.chat_focus = ChatFocus::Messages;
            }
            KeyCode::Enter => {
                app.send_input();
            }
            KeyCode::Backspace => {
                app.input.pop();
            }
            KeyCode::Char(c) => {
                if can_add_input_char(app.input.chars().count(), c) {
                    app.input.push(c);
                }
            }
            _ => {}
        }
        return Ok(false);
    }

    let message_count = app.manager.snapshot().len();
    match key.code {
        KeyCode::Char('q') => {
            app.state = AppState::ConfirmingQuit;
        }
        KeyCode::Char('?') => {
            app.state = AppState::ShowingHelp;
        }
        KeyCode::Char('o') => {
            app.toggle_offline();
        }
        KeyCode::Char('i') | KeyCode::Enter => {
            if app.input_visible() {
                app.chat_focus = ChatFocus::Input;
            } else {
                app.status_message = Some("Offline: sending is disabled".to_string());
            }
        }
        KeyCode::Up | KeyCode::Char('k') => {
            app.scroll = (app.scroll + 1).min(message_count.saturating_sub(1));
        }
        KeyCode::Down | KeyCode::Char('j') => {
            app.scroll = app.scroll.saturating_sub(1);
        }
        KeyCode::PageUp => {
            app.scroll = (app.scroll + PAGE_SCROLL_SIZE).min(message_count.saturating_sub(1));
        }
        KeyCode::PageDown => {
            app.scroll = app.scroll.saturating_sub(PAGE_SCROLL_SIZE);
        }
        KeyCode::End | KeyCode::Char('G') => {
            app.scroll = 0;
        }
        KeyCode::Esc => {
            app.screen = Screen::Start;
            app.start_focus = StartFocus::Name;
        }
        _ => {}
    }
    Ok(false)
}

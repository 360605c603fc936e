use chrono::Utc;
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

use letschat_core::cache::age_display;
use letschat_core::models::{ChatColor, Message, MessageContent, SyncMode};
use letschat_core::utils::{format_timestamp, map_url, truncate_string};

use crate::app::{App, AppState, ChatFocus, Screen, StartFocus};

use super::styles;

const LOGO: [&str; 3] = [
    "  ╦  ╔═╗╔╦╗╔═╗  ╔═╗╦ ╦╔═╗╔╦╗",
    "  ║  ║╣  ║ ╚═╗  ║  ╠═╣╠═╣ ║ ",
    "  ╩═╝╚═╝ ╩ ╚═╝  ╚═╝╩ ╩╩ ╩ ╩ ",
];

pub fn render(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title bar
            Constraint::Min(8),    // Main content
            Constraint::Length(2), // Status bar
        ])
        .split(frame.area());

    render_title_bar(frame, app, chunks[0]);
    match app.screen {
        Screen::Start => render_start_screen(frame, app, chunks[1]),
        Screen::Chat => render_chat_screen(frame, app, chunks[1]),
    }
    render_status_bar(frame, app, chunks[2]);

    // Render overlays
    if matches!(app.state, AppState::ShowingHelp) {
        render_help_overlay(frame);
    }

    if matches!(app.state, AppState::ConfirmingQuit) {
        render_quit_overlay(frame);
    }
}

fn render_title_bar(frame: &mut Frame, app: &App, area: Rect) {
    let title = match app.screen {
        Screen::Start => "  Let's Chat".to_string(),
        Screen::Chat => format!("  Let's Chat · {}", app.user.display_name()),
    };
    let help_hint = "[?] Help";
    let title_width = title.chars().count();

    let title_line = Line::from(vec![
        Span::styled(title, styles::title_style()),
        Span::raw(" ".repeat(
            area.width
                .saturating_sub(title_width as u16 + help_hint.len() as u16 + 4)
                as usize,
        )),
        Span::styled(help_hint, styles::muted_style()),
    ]);

    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(styles::muted_style());

    let paragraph = Paragraph::new(title_line).block(block);
    frame.render_widget(paragraph, area);
}

// ============================================================================
// Start screen
// ============================================================================

fn render_start_screen(frame: &mut Frame, app: &App, area: Rect) {
    let area = centered_rect_fixed(46, 14, area);
    let mut lines: Vec<Line> = LOGO
        .iter()
        .map(|l| Line::from(Span::styled(format!("     {}", l), styles::title_style())))
        .collect();
    lines.push(Line::from(""));

    // Name field
    let name_focused = app.start_focus == StartFocus::Name;
    let name_style = if name_focused {
        styles::selected_style()
    } else {
        styles::list_item_style()
    };
    let cursor = if name_focused { "▌" } else { "" };
    lines.push(Line::from(vec![
        Span::raw("   "),
        Span::styled("Your name: [", styles::muted_style()),
        Span::styled(
            format!("{:<20}{}", truncate_string(&app.name_input, 20), cursor),
            name_style,
        ),
        Span::styled("]", styles::muted_style()),
    ]));
    lines.push(Line::from(""));

    // Colour picker
    let color_focused = app.start_focus == StartFocus::Color;
    lines.push(Line::from(vec![
        Span::raw("   "),
        Span::styled("Choose background color:", styles::muted_style()),
    ]));
    let mut swatches = vec![Span::raw("    ")];
    for (i, color) in ChatColor::ALL.iter().enumerate() {
        let selected = *color == app.selected_color;
        let marker = if selected { "●" } else { " " };
        swatches.push(Span::styled(
            format!(" {} {} ", i + 1, marker),
            Style::default().bg(styles::chat_color(*color)).fg(
                if color.is_light() {
                    ratatui::style::Color::Black
                } else {
                    ratatui::style::Color::White
                },
            ),
        ));
        swatches.push(Span::raw(" "));
    }
    lines.push(Line::from(swatches));
    let label_style = if color_focused {
        styles::highlight_style()
    } else {
        styles::muted_style()
    };
    lines.push(Line::from(Span::styled(
        format!("    {} {}", app.selected_color.label(), app.selected_color.hex()),
        label_style,
    )));
    lines.push(Line::from(""));

    // Start button
    let button_focused = app.start_focus == StartFocus::Button;
    let button_style = if button_focused {
        styles::selected_style()
    } else {
        styles::list_item_style()
    };
    let label = if button_focused {
        " ▶ Start Chatting ◀ "
    } else {
        "   Start Chatting   "
    };
    lines.push(Line::from(vec![
        Span::raw("            ["),
        Span::styled(label, button_style),
        Span::raw("]"),
    ]));

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(true));

    frame.render_widget(Clear, area);
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

// ============================================================================
// Chat screen
// ============================================================================

fn message_lines<'a>(message: &'a Message, own_id: &str, now: chrono::DateTime<Utc>) -> Vec<Line<'a>> {
    let timestamp = format_timestamp(message.created_at, now);

    if let MessageContent::System(text) = message.content() {
        return vec![Line::from(Span::styled(
            format!("* {} ({}) *", text, timestamp),
            styles::system_message_style(),
        ))
        .alignment(Alignment::Center)];
    }

    let own = message.user.id == own_id;
    let header = Line::from(vec![
        Span::styled(message.user.display_name().to_string(), styles::author_style(own)),
        Span::raw("  "),
        Span::styled(timestamp, styles::muted_style()),
    ]);

    let mut lines = vec![header];
    match message.content() {
        MessageContent::Text(text) => {
            lines.extend(text.lines().map(|l| Line::from(format!("  {}", l))));
        }
        MessageContent::Image(url) => {
            lines.push(Line::from(vec![
                Span::styled("  [image] ", styles::highlight_style()),
                Span::raw(url),
            ]));
        }
        MessageContent::Location(point) => {
            lines.push(Line::from(vec![
                Span::styled("  [location] ", styles::highlight_style()),
                Span::raw(point.to_string()),
            ]));
            lines.push(Line::from(Span::styled(
                format!("  {}", map_url(point)),
                styles::muted_style(),
            )));
        }
        MessageContent::System(_) => {}
    }
    lines.push(Line::from(""));
    lines
}

fn render_chat_screen(frame: &mut Frame, app: &App, area: Rect) {
    let show_input = app.input_visible();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(if show_input {
            vec![Constraint::Min(3), Constraint::Length(3)]
        } else {
            vec![Constraint::Min(3)]
        })
        .split(area);

    render_messages(frame, app, chunks[0]);
    if show_input {
        render_input(frame, app, chunks[1]);
    }
}

fn render_messages(frame: &mut Frame, app: &App, area: Rect) {
    let snapshot = app.manager.snapshot();
    let now = Utc::now();

    // Newest at the bottom; `scroll` hides the newest messages
    let visible: Vec<&Message> = snapshot.chronological().collect();
    let end = visible.len().saturating_sub(app.scroll);
    let mut lines: Vec<Line> = visible[..end]
        .iter()
        .flat_map(|m| message_lines(m, &app.user.id, now))
        .collect();

    if lines.is_empty() {
        let hint = match app.manager.status().mode {
            SyncMode::Offline => "No cached messages",
            SyncMode::Live => "No messages yet. Press Enter to say hello!",
            _ => "Connecting...",
        };
        lines.push(Line::from(Span::styled(hint, styles::muted_style())));
    }

    let title = if app.scroll > 0 {
        format!(" Messages ({} newer below) ", app.scroll)
    } else {
        " Messages ".to_string()
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(styles::border_style(app.chat_focus == ChatFocus::Messages))
        .style(styles::chat_area_style(app.selected_color));

    let inner_height = area.height.saturating_sub(2) as usize;
    let offset = lines.len().saturating_sub(inner_height);
    let paragraph = Paragraph::new(lines)
        .block(block)
        .scroll((offset.min(u16::MAX as usize) as u16, 0));
    frame.render_widget(paragraph, area);
}

fn render_input(frame: &mut Frame, app: &App, area: Rect) {
    let focused = app.chat_focus == ChatFocus::Input;
    let cursor = if focused { "▌" } else { "" };
    let content = if app.input.is_empty() && !focused {
        Line::from(Span::styled(
            "Press Enter to type. /image <path>, /location <lat> <lon>",
            styles::muted_style(),
        ))
    } else {
        // Keep the tail of long input visible
        let width = area.width.saturating_sub(6) as usize;
        let chars: Vec<char> = app.input.chars().collect();
        let start = chars.len().saturating_sub(width);
        let shown: String = chars[start..].iter().collect();
        Line::from(vec![
            Span::styled("> ", styles::highlight_style()),
            Span::raw(shown),
            Span::raw(cursor),
        ])
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(focused));
    frame.render_widget(Paragraph::new(content).block(block), area);
}

// ============================================================================
// Status bar and overlays
// ============================================================================

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let status = app.manager.status();
    let shortcuts = match app.screen {
        Screen::Start => "[Tab] next | [Enter] select | [Esc] quit",
        Screen::Chat => "[o]ffline | [?] help | [q]uit",
    };

    let mode_label = if app.screen == Screen::Start {
        String::new()
    } else if app.forced_offline {
        " Offline (forced) ".to_string()
    } else {
        format!(" {} ", status.mode.label())
    };

    let left_text = if let Some(ref msg) = app.status_message {
        format!(" {} ", msg)
    } else if let (SyncMode::Offline, Some(cached_at)) = (status.mode, status.cached_at) {
        format!(" Cached {} ", age_display(cached_at))
    } else if app.local_mode {
        " Local loopback ".to_string()
    } else {
        String::new()
    };

    let right_text = format!(" {} ", shortcuts);
    let width = area.width as usize;
    let padding_len = width
        .saturating_sub(mode_label.chars().count())
        .saturating_sub(left_text.chars().count())
        .saturating_sub(right_text.len());

    let status_line = Line::from(vec![
        Span::styled(mode_label, styles::mode_style(status.mode)),
        Span::styled(left_text, styles::muted_style()),
        Span::raw(" ".repeat(padding_len)),
        Span::styled(right_text, styles::muted_style()),
    ]);
    let paragraph = Paragraph::new(status_line).style(styles::status_bar_style());
    frame.render_widget(paragraph, area);
}

fn render_help_overlay(frame: &mut Frame) {
    let area = centered_rect_fixed(52, 22, frame.area());
    frame.render_widget(Clear, area);

    let version = env!("CARGO_PKG_VERSION");
    let key_line = |key: &'static str, desc: &'static str| {
        Line::from(vec![
            Span::styled(format!("  {:<12}", key), styles::help_key_style()),
            Span::styled(desc, styles::help_desc_style()),
        ])
    };

    let mut help_text: Vec<Line> = LOGO
        .iter()
        .map(|l| Line::from(Span::styled(format!("       {}", l), styles::title_style())))
        .collect();
    help_text.push(Line::from(Span::styled(
        format!("                 version {}", version),
        styles::muted_style(),
    )));
    help_text.push(Line::from(""));
    help_text.push(Line::from(Span::styled(" Chat", styles::highlight_style())));
    help_text.push(key_line("Enter / i", "Type a message"));
    help_text.push(key_line("Esc", "Stop typing / back to start"));
    help_text.push(key_line("↑/↓ PgUp/Dn", "Scroll history"));
    help_text.push(key_line("End", "Jump to newest"));
    help_text.push(Line::from(""));
    help_text.push(Line::from(Span::styled(" Commands", styles::highlight_style())));
    help_text.push(key_line("/image", "<path>  Send an image"));
    help_text.push(key_line("/location", "<lat> <lon>  Share a location"));
    help_text.push(Line::from(""));
    help_text.push(Line::from(Span::styled(" Actions", styles::highlight_style())));
    help_text.push(key_line("o", "Toggle offline mode"));
    help_text.push(key_line("q", "Quit"));
    help_text.push(Line::from(""));
    help_text.push(Line::from(vec![
        Span::styled("       Press ", styles::muted_style()),
        Span::styled("?", styles::help_key_style()),
        Span::styled(" or ", styles::muted_style()),
        Span::styled("Esc", styles::help_key_style()),
        Span::styled(" to close", styles::muted_style()),
    ]));

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(true))
        .style(Style::default());

    frame.render_widget(Paragraph::new(help_text).block(block), area);
}

/// Create a centered rectangle with fixed dimensions
fn centered_rect_fixed(width: u16, height: u16, r: Rect) -> Rect {
    let x = r.x + (r.width.saturating_sub(width)) / 2;
    let y = r.y + (r.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width.min(r.width), height.min(r.height))
}

fn render_quit_overlay(frame: &mut Frame) {
    let area = centered_rect_fixed(46, 9, frame.area());
    frame.render_widget(Clear, area);

    let mut lines: Vec<Line> = LOGO
        .iter()
        .map(|l| Line::from(Span::styled(format!("     {}", l), styles::title_style())))
        .collect();
    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "   Are you sure you want to quit?",
        styles::highlight_style(),
    )));
    lines.push(Line::from(vec![
        Span::styled("   Press ", styles::muted_style()),
        Span::styled("[Y]", styles::help_key_style()),
        Span::styled(" to quit, ", styles::muted_style()),
        Span::styled("[N]", styles::help_key_style()),
        Span::styled(" to cancel", styles::muted_style()),
    ]));

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(true))
        .style(Style::default());

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

use letschat_core::models::{ChatColor, SyncMode};
use ratatui::style::{Color, Modifier, Style};

// Color palette
pub const PRIMARY: Color = Color::Rgb(64, 128, 192);
pub const SECONDARY: Color = Color::Rgb(96, 160, 96);
pub const ACCENT: Color = Color::Rgb(192, 160, 64);
pub const ERROR: Color = Color::Rgb(192, 64, 64);
pub const MUTED: Color = Color::Rgb(128, 128, 128);
pub const HIGHLIGHT: Color = Color::Rgb(48, 48, 64);

// Styles
pub fn title_style() -> Style {
    Style::default().fg(PRIMARY).add_modifier(Modifier::BOLD)
}

pub fn selected_style() -> Style {
    Style::default()
        .bg(HIGHLIGHT)
        .add_modifier(Modifier::BOLD)
}

pub fn list_item_style() -> Style {
    Style::default().fg(Color::White)
}

pub fn muted_style() -> Style {
    Style::default().fg(MUTED)
}

pub fn highlight_style() -> Style {
    Style::default().fg(ACCENT)
}

pub fn error_style() -> Style {
    Style::default().fg(ERROR)
}

pub fn border_style(focused: bool) -> Style {
    if focused {
        Style::default().fg(PRIMARY)
    } else {
        Style::default().fg(MUTED)
    }
}

pub fn status_bar_style() -> Style {
    Style::default().bg(Color::Rgb(32, 32, 40)).fg(Color::White)
}

pub fn help_key_style() -> Style {
    Style::default()
        .fg(ACCENT)
        .add_modifier(Modifier::BOLD)
}

pub fn help_desc_style() -> Style {
    Style::default().fg(Color::White)
}

pub fn chat_color(color: ChatColor) -> Color {
    let (r, g, b) = color.rgb();
    Color::Rgb(r, g, b)
}

/// Chat area tinted with the chosen colour, with readable text on top
pub fn chat_area_style(color: ChatColor) -> Style {
    let fg = if color.is_light() { Color::Black } else { Color::White };
    Style::default().bg(chat_color(color)).fg(fg)
}

pub fn author_style(own: bool) -> Style {
    if own {
        Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(PRIMARY).add_modifier(Modifier::BOLD)
    }
}

pub fn system_message_style() -> Style {
    Style::default().fg(MUTED).add_modifier(Modifier::ITALIC)
}

pub fn mode_style(mode: SyncMode) -> Style {
    match mode {
        SyncMode::Live => Style::default().fg(SECONDARY).add_modifier(Modifier::BOLD),
        SyncMode::Offline => Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        SyncMode::Stalled => Style::default().fg(ERROR).add_modifier(Modifier::BOLD),
        SyncMode::Idle => muted_style(),
    }
}

//! Terminal output: door-state coloring and status lines.

use std::io::{self, IsTerminal};

use owo_colors::OwoColorize;

use garagelink_core::DoorState;

use crate::cli::ColorMode;

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none(),
    }
}

/// Render a door state, colored by how settled it is.
pub fn paint_state(state: DoorState, color: bool) -> String {
    let text = state.to_string();
    if !color {
        return text;
    }
    match state {
        DoorState::Closed => text.green().to_string(),
        DoorState::Open => text.yellow().bold().to_string(),
        DoorState::Opening | DoorState::Closing => text.cyan().to_string(),
        DoorState::Stopped => text.red().to_string(),
        DoorState::Unknown => text.dimmed().to_string(),
    }
}

/// `Garage  current=closed  target=closed`
pub fn status_line(name: &str, current: DoorState, target: DoorState, color: bool) -> String {
    let name = if color {
        name.bold().to_string()
    } else {
        name.to_owned()
    };
    format!(
        "{name}  current={}  target={}",
        paint_state(current, color),
        paint_state(target, color)
    )
}

/// A check-list line for `config check`.
pub fn check_line(ok: bool, label: &str, detail: &str, color: bool) -> String {
    let mark = match (ok, color) {
        (true, true) => "ok".green().to_string(),
        (false, true) => "error".red().bold().to_string(),
        (true, false) => "ok".to_owned(),
        (false, false) => "error".to_owned(),
    };
    if detail.is_empty() {
        format!("{mark:>5}  {label}")
    } else {
        format!("{mark:>5}  {label}: {detail}")
    }
}

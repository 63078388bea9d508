// Terminal output for the FC passthrough tool
//
// Pastel-colored status lines and the numbered device menu

pub mod colors;
pub mod menu;

use crossterm::terminal;

/// Terminal width in columns, 80 when it cannot be determined
pub fn terminal_width() -> usize {
    terminal::size().map(|(w, _)| w as usize).unwrap_or(80)
}

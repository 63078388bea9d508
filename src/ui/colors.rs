// Color palette for operator-facing output

use crossterm::style::{Color, StyledContent, Stylize};
use std::fmt;

/// Colors used for status lines and the device menu
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PastelColor {
    Pink,
    Lavender,
    Mint,
    SkyBlue,
    Peach,
    White,
    Gray,
}

impl PastelColor {
    /// Get the terminal color representation
    pub fn as_color(&self) -> Color {
        match self {
            PastelColor::Pink => Color::Rgb { r: 255, g: 182, b: 193 },
            PastelColor::Lavender => Color::Rgb { r: 204, g: 169, b: 221 },
            PastelColor::Mint => Color::Rgb { r: 176, g: 224, b: 183 },
            PastelColor::SkyBlue => Color::Rgb { r: 173, g: 216, b: 230 },
            PastelColor::Peach => Color::Rgb { r: 255, g: 218, b: 185 },
            PastelColor::White => Color::White,
            PastelColor::Gray => Color::Rgb { r: 169, g: 169, b: 169 },
        }
    }
}

/// A styled text element
pub struct StyledText<'a> {
    styled: StyledContent<&'a str>,
}

impl<'a> StyledText<'a> {
    /// Create new styled text with foreground color
    pub fn new(text: &'a str, fg_color: PastelColor) -> Self {
        Self {
            styled: text.with(fg_color.as_color()),
        }
    }
}

impl<'a> fmt::Display for StyledText<'a> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.styled)
    }
}

/// Theme mapping message kinds to colors
#[derive(Clone, Copy, Debug)]
pub struct Theme {
    pub primary: PastelColor,
    pub accent: PastelColor,
    pub text: PastelColor,
    pub muted: PastelColor,
    pub warning: PastelColor,
    pub error: PastelColor,
    pub success: PastelColor,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            primary: PastelColor::Lavender,
            accent: PastelColor::SkyBlue,
            text: PastelColor::White,
            muted: PastelColor::Gray,
            warning: PastelColor::Peach,
            error: PastelColor::Pink,
            success: PastelColor::Mint,
        }
    }
}

/// Applies `color` when `enabled`, otherwise returns the text unchanged
pub fn paint(text: &str, color: PastelColor, enabled: bool) -> String {
    if enabled {
        StyledText::new(text, color).to_string()
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paint_disabled_is_plain() {
        assert_eq!(paint("0000:05:00.2", PastelColor::Mint, false), "0000:05:00.2");
    }

    #[test]
    fn paint_enabled_wraps_in_escape_codes() {
        let painted = paint("ok", PastelColor::Mint, true);
        assert!(painted.contains("ok"));
        assert!(painted.starts_with('\u{1b}'));
    }
}

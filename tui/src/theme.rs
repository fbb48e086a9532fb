//! Color theme and glyphs for the Syntest TUI.
//!
//! Uses the Kanagawa Wave palette for chrome by default with an optional
//! high-contrast override. Stimulus and answer colors are always drawn as
//! true RGB.

use ratatui::style::{Color, Modifier, Style};
use syntest_types::Rgb;

mod colors {
    use super::Color;

    pub const BG_DARK: Color = Color::Rgb(22, 22, 29); // sumiInk0
    pub const BG_PANEL: Color = Color::Rgb(31, 31, 40); // sumiInk3
    pub const BG_BORDER: Color = Color::Rgb(84, 84, 109); // sumiInk6

    pub const TEXT_PRIMARY: Color = Color::Rgb(220, 215, 186); // fujiWhite
    pub const TEXT_SECONDARY: Color = Color::Rgb(200, 192, 147); // oldWhite
    pub const TEXT_MUTED: Color = Color::Rgb(114, 113, 105); // fujiGray

    pub const PRIMARY: Color = Color::Rgb(149, 127, 184); // oniViolet
    pub const CYAN: Color = Color::Rgb(127, 180, 202); // springBlue
    pub const GREEN: Color = Color::Rgb(152, 187, 108); // springGreen
    pub const YELLOW: Color = Color::Rgb(230, 195, 132); // carpYellow
    pub const RED: Color = Color::Rgb(255, 93, 98); // peachRed
}

/// Display options that change how chrome is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UiOptions {
    pub ascii_only: bool,
    pub high_contrast: bool,
}

/// Resolved theme palette used by the UI.
#[derive(Debug, Clone, Copy)]
pub struct Palette {
    pub bg_dark: Color,
    pub bg_panel: Color,
    pub bg_border: Color,
    pub text_primary: Color,
    pub text_secondary: Color,
    pub text_muted: Color,
    pub primary: Color,
    pub accent: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
}

impl Palette {
    #[must_use]
    pub fn standard() -> Self {
        Self {
            bg_dark: colors::BG_DARK,
            bg_panel: colors::BG_PANEL,
            bg_border: colors::BG_BORDER,
            text_primary: colors::TEXT_PRIMARY,
            text_secondary: colors::TEXT_SECONDARY,
            text_muted: colors::TEXT_MUTED,
            primary: colors::PRIMARY,
            accent: colors::CYAN,
            success: colors::GREEN,
            warning: colors::YELLOW,
            error: colors::RED,
        }
    }

    #[must_use]
    pub fn high_contrast() -> Self {
        Self {
            bg_dark: Color::Black,
            bg_panel: Color::Black,
            bg_border: Color::Gray,
            text_primary: Color::White,
            text_secondary: Color::Gray,
            text_muted: Color::DarkGray,
            primary: Color::White,
            accent: Color::Cyan,
            success: Color::Green,
            warning: Color::Yellow,
            error: Color::Red,
        }
    }
}

#[must_use]
pub fn palette(options: UiOptions) -> Palette {
    if options.high_contrast {
        Palette::high_contrast()
    } else {
        Palette::standard()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Glyphs {
    pub marker: &'static str,
    pub tone: &'static str,
    pub pass: &'static str,
    pub fail: &'static str,
    pub separator: &'static str,
    pub spinner_frames: &'static [&'static str],
}

const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const SPINNER_FRAMES_ASCII: &[&str] = &["|", "/", "-", "\\"];

#[must_use]
pub fn glyphs(options: UiOptions) -> Glyphs {
    if options.ascii_only {
        Glyphs {
            marker: "+",
            tone: "~",
            pass: "PASS",
            fail: "FAIL",
            separator: "|",
            spinner_frames: SPINNER_FRAMES_ASCII,
        }
    } else {
        Glyphs {
            marker: "✛",
            tone: "♪",
            pass: "✓ PASS",
            fail: "✗ FAIL",
            separator: "·",
            spinner_frames: SPINNER_FRAMES,
        }
    }
}

#[must_use]
pub fn spinner_frame(tick: usize, options: UiOptions) -> &'static str {
    let frames = glyphs(options).spinner_frames;
    frames[tick % frames.len()]
}

/// Terminal color for a captured or stimulus color.
#[must_use]
pub fn rgb_color(color: Rgb) -> Color {
    Color::Rgb(color.r, color.g, color.b)
}

/// Black or white, whichever reads better on `background`.
#[must_use]
pub fn contrast_text(background: Rgb) -> Color {
    let luma = 0.299 * f64::from(background.r)
        + 0.587 * f64::from(background.g)
        + 0.114 * f64::from(background.b);
    if luma > 140.0 {
        Color::Black
    } else {
        Color::White
    }
}

pub mod styles {
    use super::{Modifier, Palette, Style};

    #[must_use]
    pub fn title(palette: &Palette) -> Style {
        Style::default()
            .fg(palette.primary)
            .add_modifier(Modifier::BOLD)
    }

    #[must_use]
    pub fn key_hint(palette: &Palette) -> Style {
        Style::default()
            .fg(palette.accent)
            .add_modifier(Modifier::BOLD)
    }

    #[must_use]
    pub fn muted(palette: &Palette) -> Style {
        Style::default().fg(palette.text_muted)
    }

    #[must_use]
    pub fn border(palette: &Palette) -> Style {
        Style::default().fg(palette.bg_border)
    }

    #[must_use]
    pub fn stimulus(palette: &Palette) -> Style {
        Style::default()
            .fg(palette.text_primary)
            .add_modifier(Modifier::BOLD)
    }
}

#[cfg(test)]
mod tests {
    use ratatui::style::Color;
    use syntest_types::Rgb;

    use super::{UiOptions, contrast_text, glyphs, rgb_color, spinner_frame};

    #[test]
    fn contrast_text_flips_on_luma() {
        assert_eq!(contrast_text(Rgb::new(255, 255, 0)), Color::Black);
        assert_eq!(contrast_text(Rgb::new(0, 0, 128)), Color::White);
    }

    #[test]
    fn ascii_glyphs_are_ascii() {
        let g = glyphs(UiOptions {
            ascii_only: true,
            high_contrast: false,
        });
        for s in [g.marker, g.tone, g.pass, g.fail, g.separator] {
            assert!(s.is_ascii());
        }
        assert!(g.spinner_frames.iter().all(|f| f.is_ascii()));
    }

    #[test]
    fn spinner_wraps() {
        let options = UiOptions {
            ascii_only: true,
            high_contrast: false,
        };
        assert_eq!(spinner_frame(0, options), spinner_frame(4, options));
        assert_eq!(rgb_color(Rgb::new(1, 2, 3)), Color::Rgb(1, 2, 3));
    }
}

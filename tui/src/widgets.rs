//! Color widgets: the capture plane and flat swatches.

use ratatui::buffer::Buffer;
use ratatui::layout::Rect;
use ratatui::style::{Color, Style};
use ratatui::widgets::Widget;
use syntest_engine::SurfacePoint;
use syntest_types::Rgb;

use crate::layout::{cell_at, surface_point};
use crate::theme::{contrast_text, rgb_color};

/// Paints every cell with the surface color at its center.
pub struct ColorPlane<'a> {
    sampler: &'a dyn Fn(SurfacePoint) -> Option<Rgb>,
    marker: Option<(SurfacePoint, &'a str)>,
}

impl<'a> ColorPlane<'a> {
    #[must_use]
    pub fn new(sampler: &'a dyn Fn(SurfacePoint) -> Option<Rgb>) -> Self {
        Self {
            sampler,
            marker: None,
        }
    }

    /// Draw `glyph` over the cell under `point`.
    #[must_use]
    pub fn marker(mut self, point: Option<SurfacePoint>, glyph: &'a str) -> Self {
        self.marker = point.map(|p| (p, glyph));
        self
    }
}

impl Widget for ColorPlane<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        for row in area.top()..area.bottom() {
            for column in area.left()..area.right() {
                let Some(color) = (self.sampler)(surface_point(area, column, row)) else {
                    continue;
                };
                if let Some(cell) = buf.cell_mut((column, row)) {
                    cell.set_symbol(" ").set_bg(rgb_color(color));
                }
            }
        }
        let Some((point, glyph)) = self.marker else {
            return;
        };
        let Some((column, row)) = cell_at(area, point) else {
            return;
        };
        let under = (self.sampler)(surface_point(area, column, row));
        if let Some(cell) = buf.cell_mut((column, row)) {
            let fg = under.map_or(Color::White, contrast_text);
            cell.set_symbol(glyph).set_fg(fg);
        }
    }
}

/// A solid block of one color with an optional centered caption.
pub struct Swatch<'a> {
    color: Rgb,
    caption: Option<&'a str>,
}

impl<'a> Swatch<'a> {
    #[must_use]
    pub fn new(color: Rgb) -> Self {
        Self {
            color,
            caption: None,
        }
    }

    #[must_use]
    pub fn caption(mut self, caption: &'a str) -> Self {
        self.caption = Some(caption);
        self
    }
}

impl Widget for Swatch<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        if area.is_empty() {
            return;
        }
        buf.set_style(area, Style::default().bg(rgb_color(self.color)));
        let Some(caption) = self.caption else {
            return;
        };
        let width = caption.chars().count().min(area.width as usize) as u16;
        let x = area.x + (area.width - width) / 2;
        let y = area.y + area.height / 2;
        buf.set_stringn(
            x,
            y,
            caption,
            width as usize,
            Style::default()
                .fg(contrast_text(self.color))
                .bg(rgb_color(self.color)),
        );
    }
}

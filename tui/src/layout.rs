//! Screen regions and the mapping from terminal cells to surface coordinates.

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use syntest_engine::SurfacePoint;

/// Regions of the consistency screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsistencyLayout {
    pub header: Rect,
    pub stimulus: Rect,
    pub swatch: Rect,
    /// The hue-lightness plane, borders excluded.
    pub plane: Rect,
    pub status: Rect,
}

impl ConsistencyLayout {
    #[must_use]
    pub fn compute(area: Rect) -> Self {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1), // Title + progress
                Constraint::Length(5), // Stimulus + swatch
                Constraint::Min(3),    // Plane
                Constraint::Length(1), // Status bar
            ])
            .split(area);
        let top = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(10), Constraint::Length(18)])
            .split(rows[1]);
        Self {
            header: rows[0],
            stimulus: top[0],
            swatch: top[1],
            plane: inner(rows[2]),
            status: rows[3],
        }
    }
}

/// Regions of the forced-choice screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeedLayout {
    pub header: Rect,
    pub body: Rect,
    /// Row of option swatches, borders excluded.
    pub options: Rect,
    pub status: Rect,
}

impl SpeedLayout {
    #[must_use]
    pub fn compute(area: Rect) -> Self {
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(3),
                Constraint::Length(7),
                Constraint::Length(1),
            ])
            .split(area);
        Self {
            header: rows[0],
            body: rows[1],
            options: inner(rows[2]),
            status: rows[3],
        }
    }
}

/// `area` shrunk by a one-cell border.
fn inner(area: Rect) -> Rect {
    Rect {
        x: area.x.saturating_add(1),
        y: area.y.saturating_add(1),
        width: area.width.saturating_sub(2),
        height: area.height.saturating_sub(2),
    }
}

/// Normalized position of the center of cell `(column, row)` relative to `area`.
///
/// Cells outside `area` map outside the unit square, so surfaces ignore them.
#[must_use]
pub fn surface_point(area: Rect, column: u16, row: u16) -> SurfacePoint {
    let axis = |pos: u16, origin: u16, len: u16| {
        if len == 0 {
            return f64::NAN;
        }
        (f64::from(pos) - f64::from(origin) + 0.5) / f64::from(len)
    };
    SurfacePoint::new(
        axis(column, area.x, area.width),
        axis(row, area.y, area.height),
    )
}

/// Terminal cell nearest to a normalized point, clamped into `area`.
#[must_use]
pub fn cell_at(area: Rect, point: SurfacePoint) -> Option<(u16, u16)> {
    if area.is_empty() || !point.x.is_finite() || !point.y.is_finite() {
        return None;
    }
    let offset = |v: f64, len: u16| ((v * f64::from(len)).floor().max(0.0) as u16).min(len - 1);
    Some((
        area.x + offset(point.x, area.width),
        area.y + offset(point.y, area.height),
    ))
}

/// Which of `count` equal-width option slots a point falls into.
#[must_use]
pub fn option_at(point: SurfacePoint, count: usize) -> Option<usize> {
    let inside = |v: f64| v.is_finite() && (0.0..1.0).contains(&v);
    if count == 0 || !inside(point.x) || !inside(point.y) {
        return None;
    }
    Some(((point.x * count as f64).floor() as usize).min(count - 1))
}

/// Split `area` into `count` equal columns.
#[must_use]
pub fn option_slots(area: Rect, count: usize) -> Vec<Rect> {
    if count == 0 {
        return Vec::new();
    }
    let constraints = vec![Constraint::Ratio(1, count as u32); count];
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints(constraints)
        .split(area)
        .to_vec()
}

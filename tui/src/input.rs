//! Input handling for the Syntest TUI.
//!
//! Terminal events are read on a blocking thread and forwarded through a
//! bounded channel. [`InputMapper`] turns them into [`UiCommand`]s; mouse
//! positions become normalized surface points relative to a target region.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent,
    MouseEventKind,
};
use ratatui::layout::Rect;
use syntest_engine::{PointerEvent, SurfacePoint};
use tokio::sync::mpsc;

use crate::layout::surface_point;

const INPUT_POLL_TIMEOUT: Duration = Duration::from_millis(25); // shutdown responsiveness
const INPUT_CHANNEL_CAPACITY: usize = 1024; // bounded: no OOM

/// A user intent, independent of the key or button that produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UiCommand {
    /// Enter: commit the trial, or acknowledge the intro.
    Confirm,
    ToggleNoColor,
    /// Keyboard freeze toggle at the last pointer position.
    ToggleFreeze,
    Retry,
    Skip,
    /// Abandon the pending request.
    Cancel,
    /// Restart from the previous block (dev navigation only).
    PrevBlock,
    /// Forced-choice option by zero-based slot.
    Choose(usize),
    Pointer(PointerEvent),
    Redraw,
    Quit,
}

/// Map a key press to a command. Releases and repeats are ignored.
#[must_use]
pub fn map_key(key: KeyEvent) -> Option<UiCommand> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return matches!(key.code, KeyCode::Char('c' | 'd')).then_some(UiCommand::Quit);
    }
    let command = match key.code {
        KeyCode::Enter => UiCommand::Confirm,
        KeyCode::Char('n') => UiCommand::ToggleNoColor,
        KeyCode::Char('f' | ' ') => UiCommand::ToggleFreeze,
        KeyCode::Char('r') => UiCommand::Retry,
        KeyCode::Char('s') => UiCommand::Skip,
        KeyCode::Char('c') | KeyCode::Esc => UiCommand::Cancel,
        KeyCode::Char('[') => UiCommand::PrevBlock,
        KeyCode::Char('q') => UiCommand::Quit,
        KeyCode::Char(c @ '1'..='9') => UiCommand::Choose(c as usize - '1' as usize),
        _ => return None,
    };
    Some(command)
}

/// Turns raw mouse events into pointer events.
///
/// A click is a left press followed by a release with no drag in between;
/// it is reported after the `Up`, at the press position.
#[derive(Debug, Default)]
pub struct PointerTracker {
    pressed_at: Option<SurfacePoint>,
    dragged: bool,
}

impl PointerTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&mut self, mouse: MouseEvent, target: Rect) -> Vec<PointerEvent> {
        let point = surface_point(target, mouse.column, mouse.row);
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                self.pressed_at = Some(point);
                self.dragged = false;
                vec![PointerEvent::Down(point)]
            }
            MouseEventKind::Drag(MouseButton::Left) => {
                if self.pressed_at.is_some() {
                    self.dragged = true;
                }
                vec![PointerEvent::Move(point)]
            }
            MouseEventKind::Moved => vec![PointerEvent::Move(point)],
            MouseEventKind::Up(MouseButton::Left) => {
                let pressed = self.pressed_at.take();
                let dragged = std::mem::take(&mut self.dragged);
                match pressed {
                    Some(at) if !dragged => vec![PointerEvent::Up, PointerEvent::Click(at)],
                    _ => vec![PointerEvent::Up],
                }
            }
            _ => Vec::new(),
        }
    }
}

/// Stateful event-to-command translation.
#[derive(Debug, Default)]
pub struct InputMapper {
    pointer: PointerTracker,
}

impl InputMapper {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate one terminal event. Mouse positions are relative to `target`.
    pub fn translate(&mut self, event: &Event, target: Rect) -> Vec<UiCommand> {
        match event {
            Event::Key(key) => map_key(*key).into_iter().collect(),
            Event::Mouse(mouse) => self
                .pointer
                .handle(*mouse, target)
                .into_iter()
                .map(UiCommand::Pointer)
                .collect(),
            Event::Resize(..) | Event::FocusGained => vec![UiCommand::Redraw],
            _ => Vec::new(),
        }
    }
}

enum InputMsg {
    Event(Event),
    Error(String),
}

/// Background reader for terminal events.
pub struct InputPump {
    rx: mpsc::Receiver<InputMsg>,
    stop: Arc<AtomicBool>,
    join: Option<tokio::task::JoinHandle<()>>,
}

impl InputPump {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(INPUT_CHANNEL_CAPACITY);
        let stop = Arc::new(AtomicBool::new(false));
        let stop2 = stop.clone();

        let join = tokio::task::spawn_blocking(move || input_loop(stop2, tx));
        Self {
            rx,
            stop,
            join: Some(join),
        }
    }

    /// Next terminal event. Cancel-safe, so it can sit in a `select!`.
    pub async fn next(&mut self) -> Result<Event> {
        match self.rx.recv().await {
            Some(InputMsg::Event(ev)) => Ok(ev),
            Some(InputMsg::Error(msg)) => Err(anyhow!("input error: {msg}")),
            None => Err(anyhow!("input pump disconnected")),
        }
    }

    pub async fn shutdown(&mut self) {
        // Close first so a backpressured input thread unblocks.
        self.rx.close();

        self.stop.store(true, Ordering::Release);
        if let Some(join) = self.join.take() {
            let _ = tokio::time::timeout(Duration::from_secs(2), join).await;
        }
    }
}

impl Default for InputPump {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InputPump {
    fn drop(&mut self) {
        // Best-effort stop; do not block in Drop.
        self.rx.close();
        self.stop.store(true, Ordering::Release);
    }
}

fn input_loop(stop: Arc<AtomicBool>, tx: mpsc::Sender<InputMsg>) {
    while !stop.load(Ordering::Acquire) {
        match event::poll(INPUT_POLL_TIMEOUT) {
            Ok(true) => match event::read() {
                Ok(ev) => {
                    if tx.blocking_send(InputMsg::Event(ev)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    let _ = tx.blocking_send(InputMsg::Error(e.to_string()));
                    break;
                }
            },
            Ok(false) => {}
            Err(e) => {
                let _ = tx.blocking_send(InputMsg::Error(e.to_string()));
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crossterm::event::{
        Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent,
        MouseEventKind,
    };
    use ratatui::layout::Rect;
    use syntest_engine::{PointerEvent, SurfacePoint};

    use super::{InputMapper, PointerTracker, UiCommand, map_key};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn mouse(kind: MouseEventKind, column: u16, row: u16) -> MouseEvent {
        MouseEvent {
            kind,
            column,
            row,
            modifiers: KeyModifiers::NONE,
        }
    }

    const TARGET: Rect = Rect::new(0, 0, 10, 10);

    #[test]
    fn keys_map_to_commands() {
        assert_eq!(map_key(key(KeyCode::Enter)), Some(UiCommand::Confirm));
        assert_eq!(map_key(key(KeyCode::Char('n'))), Some(UiCommand::ToggleNoColor));
        assert_eq!(map_key(key(KeyCode::Char('f'))), Some(UiCommand::ToggleFreeze));
        assert_eq!(map_key(key(KeyCode::Char('r'))), Some(UiCommand::Retry));
        assert_eq!(map_key(key(KeyCode::Char('s'))), Some(UiCommand::Skip));
        assert_eq!(map_key(key(KeyCode::Char('c'))), Some(UiCommand::Cancel));
        assert_eq!(map_key(key(KeyCode::Char('['))), Some(UiCommand::PrevBlock));
        assert_eq!(map_key(key(KeyCode::Char(']'))), None);
        assert_eq!(map_key(key(KeyCode::Char('q'))), Some(UiCommand::Quit));
        assert_eq!(map_key(key(KeyCode::Char('3'))), Some(UiCommand::Choose(2)));
        assert_eq!(map_key(key(KeyCode::Char('x'))), None);
    }

    #[test]
    fn ctrl_c_quits_and_releases_are_ignored() {
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(map_key(ctrl_c), Some(UiCommand::Quit));
        let mut release = key(KeyCode::Enter);
        release.kind = KeyEventKind::Release;
        assert_eq!(map_key(release), None);
    }

    #[test]
    fn press_and_release_is_a_click() {
        let mut tracker = PointerTracker::new();
        let down = tracker.handle(mouse(MouseEventKind::Down(MouseButton::Left), 4, 4), TARGET);
        let at = SurfacePoint::new(0.45, 0.45);
        assert_eq!(down, vec![PointerEvent::Down(at)]);
        let up = tracker.handle(mouse(MouseEventKind::Up(MouseButton::Left), 4, 4), TARGET);
        assert_eq!(up, vec![PointerEvent::Up, PointerEvent::Click(at)]);
    }

    #[test]
    fn drag_suppresses_the_click() {
        let mut tracker = PointerTracker::new();
        tracker.handle(mouse(MouseEventKind::Down(MouseButton::Left), 1, 1), TARGET);
        let drag = tracker.handle(mouse(MouseEventKind::Drag(MouseButton::Left), 5, 1), TARGET);
        assert_eq!(drag, vec![PointerEvent::Move(SurfacePoint::new(0.55, 0.15))]);
        let up = tracker.handle(mouse(MouseEventKind::Up(MouseButton::Left), 5, 1), TARGET);
        assert_eq!(up, vec![PointerEvent::Up]);

        // The next plain press is a click again.
        tracker.handle(mouse(MouseEventKind::Down(MouseButton::Left), 2, 2), TARGET);
        let up = tracker.handle(mouse(MouseEventKind::Up(MouseButton::Left), 2, 2), TARGET);
        assert_eq!(up.len(), 2);
    }

    #[test]
    fn mapper_routes_events() {
        let mut mapper = InputMapper::new();
        assert_eq!(
            mapper.translate(&Event::Key(key(KeyCode::Enter)), TARGET),
            vec![UiCommand::Confirm]
        );
        assert_eq!(
            mapper.translate(&Event::Resize(80, 24), TARGET),
            vec![UiCommand::Redraw]
        );
        let moved = mapper.translate(&Event::Mouse(mouse(MouseEventKind::Moved, 0, 9)), TARGET);
        assert_eq!(
            moved,
            vec![UiCommand::Pointer(PointerEvent::Move(SurfacePoint::new(
                0.05, 0.95
            )))]
        );
        let scroll = mapper.translate(
            &Event::Mouse(mouse(MouseEventKind::ScrollUp, 0, 0)),
            TARGET,
        );
        assert!(scroll.is_empty());
    }
}

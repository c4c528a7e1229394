//! Application state and logic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tui_keyrouter::{Input, Key, Macro, MacroManager, PendingInput};

/// Lines moved by a half-page scroll.
const HALF_PAGE: usize = 10;

/// Name the demo stores its single macro under.
const MACRO_NAME: &str = "last";

/// Messages produced by key handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Down(usize),
    Up(usize),
    Top,
    Bottom,
    HalfPageDown(usize),
    HalfPageUp(usize),
    Delete(usize),
    EnterSelect,
    ExitSelect,
    DeleteSelection,
    /// Recording began at the key that sent this.
    RecordingStarted,
    /// Recording ended; the keys exclude the stopping key.
    Recorded(Vec<Key>),
    Replay,
    Quit,
    /// Input changed without an action (count typed, key buffered).
    Redraw,
    /// A handler ran during playback and must not act.
    Ignored,
}

/// Current input mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Normal,
    Select,
}

/// Application state.
pub struct App {
    /// Displayed lines.
    pub items: Vec<String>,
    /// Cursor line.
    pub cursor: usize,
    /// Selection start while in select mode.
    pub anchor: Option<usize>,
    /// Current mode.
    pub mode: Mode,
    /// Status message.
    pub message: Option<String>,
    /// Whether to quit.
    pub should_quit: bool,
    input: Input,
    macros: MacroManager,
    playing: Arc<AtomicBool>,
}

impl App {
    /// Create the app around a running input.
    pub fn new(input: Input, playing: Arc<AtomicBool>) -> Self {
        Self {
            items: (1..=60).map(|n| format!("Item {n}")).collect(),
            cursor: 0,
            anchor: None,
            mode: Mode::Normal,
            message: None,
            should_quit: false,
            input,
            macros: MacroManager::new(),
            playing,
        }
    }

    /// Count and keys typed so far, for the status line.
    pub fn pending(&self) -> PendingInput {
        self.input.pending()
    }

    /// Whether a macro is being recorded.
    pub fn is_recording(&self) -> bool {
        self.input.is_recording()
    }

    /// Selected line range, inclusive.
    pub fn selection(&self) -> Option<(usize, usize)> {
        self.anchor
            .map(|anchor| (anchor.min(self.cursor), anchor.max(self.cursor)))
    }

    fn last_index(&self) -> usize {
        self.items.len().saturating_sub(1)
    }

    fn move_down(&mut self, n: usize) {
        self.cursor = self.cursor.saturating_add(n).min(self.last_index());
    }

    fn move_up(&mut self, n: usize) {
        self.cursor = self.cursor.saturating_sub(n);
    }

    fn delete_range(&mut self, start: usize, end: usize) {
        if self.items.is_empty() {
            return;
        }
        let end = end.min(self.last_index());
        let removed = self.items.drain(start..=end).count();
        self.cursor = start.min(self.last_index());
        self.message = Some(format!("{removed} line(s) deleted"));
    }

    /// Apply one handler message.
    pub fn apply(&mut self, action: Action) {
        match action {
            Action::Down(n) => self.move_down(n),
            Action::Up(n) => self.move_up(n),
            Action::Top => self.cursor = 0,
            Action::Bottom => self.cursor = self.last_index(),
            Action::HalfPageDown(n) => self.move_down(HALF_PAGE.saturating_mul(n)),
            Action::HalfPageUp(n) => self.move_up(HALF_PAGE.saturating_mul(n)),
            Action::Delete(n) => {
                let end = self.cursor.saturating_add(n.saturating_sub(1));
                self.delete_range(self.cursor, end);
            }
            Action::EnterSelect => {
                self.anchor = Some(self.cursor);
                self.mode = Mode::Select;
            }
            Action::ExitSelect => self.exit_select(),
            Action::DeleteSelection => {
                if let Some((start, end)) = self.selection() {
                    self.delete_range(start, end);
                }
                self.exit_select();
            }
            Action::RecordingStarted => self.message = Some("Recording...".to_string()),
            Action::Recorded(keys) => self.save_recording(keys),
            Action::Replay => self.replay(),
            Action::Quit => self.should_quit = true,
            Action::Redraw | Action::Ignored => {}
        }
    }

    /// The router itself is popped by the handler that sent the action.
    fn exit_select(&mut self) {
        self.anchor = None;
        self.mode = Mode::Normal;
    }

    /// Recording starts and stops inside the `m` handler, on the input
    /// thread, so the capture boundary is exact; the app only keeps the result.
    fn save_recording(&mut self, keys: Vec<Key>) {
        let recorded = Macro::new(MACRO_NAME, keys);
        self.message = Some(format!("Recorded {}", recorded.pattern()));
        self.macros.insert(recorded);
    }

    fn replay(&mut self) {
        if self.input.is_recording() {
            return;
        }
        self.playing.store(true, Ordering::SeqCst);
        let played = self.macros.play(&self.input, MACRO_NAME);
        self.playing.store(false, Ordering::SeqCst);
        if !played {
            self.message = Some("No macro recorded".to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tui_keyrouter::Router;

    fn app() -> App {
        App::new(Input::new(Router::new()), Arc::default())
    }

    #[test]
    fn test_motion() {
        let mut app = app();
        app.apply(Action::Down(5));
        assert_eq!(app.cursor, 5);
        app.apply(Action::Up(10));
        assert_eq!(app.cursor, 0);
        app.apply(Action::Bottom);
        assert_eq!(app.cursor, 59);
        app.apply(Action::HalfPageDown(1));
        assert_eq!(app.cursor, 59);
        app.apply(Action::HalfPageUp(2));
        assert_eq!(app.cursor, 39);
        app.apply(Action::Top);
        assert_eq!(app.cursor, 0);
    }

    #[test]
    fn test_delete() {
        let mut app = app();
        app.apply(Action::Down(2));
        app.apply(Action::Delete(3));
        assert_eq!(app.items.len(), 57);
        assert_eq!(app.items[2], "Item 6");

        app.apply(Action::Bottom);
        app.apply(Action::Delete(5));
        assert_eq!(app.items.len(), 56);
        assert_eq!(app.cursor, 55);
    }

    #[test]
    fn test_huge_counts_clamp() {
        let mut app = app();
        app.apply(Action::Down(1));
        app.apply(Action::Down(usize::MAX));
        assert_eq!(app.cursor, 59);

        app.apply(Action::Top);
        app.apply(Action::HalfPageDown(usize::MAX));
        assert_eq!(app.cursor, 59);
        app.apply(Action::HalfPageUp(usize::MAX));
        assert_eq!(app.cursor, 0);

        app.apply(Action::Down(10));
        app.apply(Action::Delete(usize::MAX));
        assert_eq!(app.items.len(), 10);
        assert_eq!(app.cursor, 9);
    }

    #[test]
    fn test_recorded_macro_replays() {
        let mut app = app();
        app.apply(Action::Recorded(tui_keyrouter::parse_pattern("3j")));
        assert_eq!(app.message.as_deref(), Some("Recorded 3j"));
        app.apply(Action::Replay);
        assert_eq!(app.message.as_deref(), Some("Recorded 3j"));
    }

    #[test]
    fn test_select_mode() {
        let mut app = app();
        app.apply(Action::Down(1));
        app.apply(Action::EnterSelect);
        assert_eq!(app.mode, Mode::Select);

        app.apply(Action::Down(2));
        assert_eq!(app.selection(), Some((1, 3)));
        app.apply(Action::DeleteSelection);
        assert_eq!(app.items.len(), 57);
        assert_eq!(app.mode, Mode::Normal);
        assert_eq!(app.selection(), None);
    }

    #[test]
    fn test_replay_without_macro() {
        let mut app = app();
        app.apply(Action::Replay);
        assert_eq!(app.message.as_deref(), Some("No macro recorded"));
    }
}

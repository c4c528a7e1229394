//! Key types.

use crossterm::event::{KeyCode as TermKeyCode, KeyEvent, KeyModifiers};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

bitflags::bitflags! {
    /// Modifier keys held during a keypress.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Modifiers: u8 {
        const CTRL  = 1 << 0;
        const ALT   = 1 << 1;
        const SHIFT = 1 << 2;
    }
}

impl Modifiers {
    /// No modifiers held.
    pub const NONE: Self = Self::empty();
}

/// The key part of a keypress, without modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyCode {
    /// No key. Produced only by degenerate pattern text such as `<>`.
    #[default]
    Null,
    /// A printable character.
    Char(char),
    Esc,
    Enter,
    Tab,
    Space,
    Backspace,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
    /// Function key `F1` through `F12`.
    F(u8),
}

impl KeyCode {
    /// Look up a special key by its vim name (case-insensitive).
    ///
    /// Accepts the usual aliases: `Esc`/`Escape`, `CR`/`Enter`/`Return`,
    /// `BS`/`Backspace`, `Del`/`Delete`, and `F1`..`F12`.
    pub fn from_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        let code = match lower.as_str() {
            "esc" | "escape" => Self::Esc,
            "cr" | "enter" | "return" => Self::Enter,
            "tab" => Self::Tab,
            "space" => Self::Space,
            "bs" | "backspace" => Self::Backspace,
            "up" => Self::Up,
            "down" => Self::Down,
            "left" => Self::Left,
            "right" => Self::Right,
            "home" => Self::Home,
            "end" => Self::End,
            "pageup" => Self::PageUp,
            "pagedown" => Self::PageDown,
            "insert" => Self::Insert,
            "del" | "delete" => Self::Delete,
            _ => {
                let digits = lower.strip_prefix('f')?;
                if digits.starts_with('0') || !digits.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                match digits.parse::<u8>() {
                    Ok(n @ 1..=12) => Self::F(n),
                    _ => return None,
                }
            }
        };
        Some(code)
    }

    /// Canonical vim name of a special key. `None` for `Char` and `Null`.
    pub fn name(&self) -> Option<String> {
        let name = match self {
            Self::Null | Self::Char(_) => return None,
            Self::Esc => "Esc",
            Self::Enter => "CR",
            Self::Tab => "Tab",
            Self::Space => "Space",
            Self::Backspace => "BS",
            Self::Up => "Up",
            Self::Down => "Down",
            Self::Left => "Left",
            Self::Right => "Right",
            Self::Home => "Home",
            Self::End => "End",
            Self::PageUp => "PageUp",
            Self::PageDown => "PageDown",
            Self::Insert => "Insert",
            Self::Delete => "Del",
            Self::F(n) => return Some(format!("F{n}")),
        };
        Some(name.to_string())
    }

    /// Whether this is a named special key rather than a character.
    pub fn is_special(&self) -> bool {
        !matches!(self, Self::Null | Self::Char(_))
    }
}

/// A single keypress: a key code plus the modifiers held with it.
///
/// Keys are plain values. Equality is structural, so they work as map keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Key {
    /// The key code
    pub code: KeyCode,
    /// Modifier keys (Ctrl, Alt, Shift)
    pub modifiers: Modifiers,
}

impl Key {
    /// Create a new key.
    pub const fn new(code: KeyCode, modifiers: Modifiers) -> Self {
        Self { code, modifiers }
    }

    /// Create a key with no modifiers.
    pub const fn key(code: KeyCode) -> Self {
        Self::new(code, Modifiers::NONE)
    }

    /// Create a plain character key.
    pub const fn char(c: char) -> Self {
        Self::key(KeyCode::Char(c))
    }

    /// Create a Ctrl+key.
    pub fn ctrl(c: char) -> Self {
        Self::new(KeyCode::Char(c.to_ascii_lowercase()), Modifiers::CTRL)
    }

    /// Create an Alt+key.
    pub const fn alt(c: char) -> Self {
        Self::new(KeyCode::Char(c), Modifiers::ALT)
    }

    /// Return this key with additional modifiers.
    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers |= modifiers;
        self
    }

    /// The ASCII digit this key types, if it is an unmodified digit.
    pub fn digit(&self) -> Option<char> {
        match self.code {
            KeyCode::Char(c) if self.modifiers.is_empty() && c.is_ascii_digit() => Some(c),
            _ => None,
        }
    }

    /// Whether a terminal delivers this key as a multi-byte escape sequence.
    ///
    /// Navigation keys, function keys, Shift+Tab and anything held with Alt
    /// all arrive prefixed by ESC, so a router binding any of them needs the
    /// reader to wait for the rest of the sequence.
    pub fn requires_escape_sequence(&self) -> bool {
        if self.modifiers.contains(Modifiers::ALT) {
            return true;
        }
        match self.code {
            KeyCode::Up
            | KeyCode::Down
            | KeyCode::Left
            | KeyCode::Right
            | KeyCode::Home
            | KeyCode::End
            | KeyCode::PageUp
            | KeyCode::PageDown
            | KeyCode::Insert
            | KeyCode::Delete
            | KeyCode::F(_) => true,
            KeyCode::Tab => self.modifiers.contains(Modifiers::SHIFT),
            _ => false,
        }
    }

    /// Check if this matches a crossterm key event.
    pub fn matches(&self, event: &KeyEvent) -> bool {
        *self == Key::from(*event)
    }
}

impl fmt::Display for Key {
    /// Vim notation: `j`, `<C-w>`, `<S-Tab>`, `<C-A-d>`, `<F5>`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.modifiers.is_empty() {
            match self.code {
                KeyCode::Char(c) => return write!(f, "{c}"),
                KeyCode::Null => return Ok(()),
                _ => {}
            }
        }

        let mut parts: Vec<String> = Vec::new();
        if self.modifiers.contains(Modifiers::CTRL) {
            parts.push("C".into());
        }
        if self.modifiers.contains(Modifiers::ALT) {
            parts.push("A".into());
        }
        if self.modifiers.contains(Modifiers::SHIFT) {
            parts.push("S".into());
        }
        match self.code {
            KeyCode::Char(c) => parts.push(c.to_string()),
            KeyCode::Null => parts.push(String::new()),
            code => parts.extend(code.name()),
        }

        write!(f, "<{}>", parts.join("-"))
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        match crate::pattern::parse_pattern(&text).as_slice() {
            [key] => Ok(*key),
            _ => Err(serde::de::Error::custom(format!(
                "expected exactly one key, got {text:?}"
            ))),
        }
    }
}

impl From<KeyEvent> for Key {
    fn from(event: KeyEvent) -> Self {
        let mut modifiers = Modifiers::NONE;
        if event.modifiers.contains(KeyModifiers::CONTROL) {
            modifiers |= Modifiers::CTRL;
        }
        if event.modifiers.contains(KeyModifiers::ALT) {
            modifiers |= Modifiers::ALT;
        }
        if event.modifiers.contains(KeyModifiers::SHIFT) {
            modifiers |= Modifiers::SHIFT;
        }

        let code = match event.code {
            // Shift is already folded into the character itself.
            TermKeyCode::Char(' ') => {
                modifiers.remove(Modifiers::SHIFT);
                KeyCode::Space
            }
            TermKeyCode::Char(c) => {
                modifiers.remove(Modifiers::SHIFT);
                KeyCode::Char(c)
            }
            TermKeyCode::Esc => KeyCode::Esc,
            TermKeyCode::Enter => KeyCode::Enter,
            TermKeyCode::Tab => KeyCode::Tab,
            TermKeyCode::BackTab => {
                modifiers |= Modifiers::SHIFT;
                KeyCode::Tab
            }
            TermKeyCode::Backspace => KeyCode::Backspace,
            TermKeyCode::Up => KeyCode::Up,
            TermKeyCode::Down => KeyCode::Down,
            TermKeyCode::Left => KeyCode::Left,
            TermKeyCode::Right => KeyCode::Right,
            TermKeyCode::Home => KeyCode::Home,
            TermKeyCode::End => KeyCode::End,
            TermKeyCode::PageUp => KeyCode::PageUp,
            TermKeyCode::PageDown => KeyCode::PageDown,
            TermKeyCode::Insert => KeyCode::Insert,
            TermKeyCode::Delete => KeyCode::Delete,
            TermKeyCode::F(n) if (1..=12).contains(&n) => KeyCode::F(n),
            _ => KeyCode::Null,
        };

        Self { code, modifiers }
    }
}

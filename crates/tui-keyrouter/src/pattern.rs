//! Vim-style pattern compiler.

use crate::key::{Key, KeyCode, Modifiers};

/// Compile a pattern string into the sequence of keys it denotes.
///
/// Supported notation:
/// - `"j"`, `"gg"` - literal characters, one key each (a space is `<Space>`)
/// - `"<C-w>"`, `"<A-x>"`, `"<M-x>"`, `"<S-Tab>"` - one chord
/// - `"<C-A-d>"` - stacked modifiers
/// - `"<Esc>"`, `"<CR>"`, `"<Space>"`, `"<F1>"`, `"<PageUp>"` - special keys
/// - `"<C-w>j"`, `"<C-w><C-j>"` - chords and characters mixed freely
///
/// Compilation never fails. Bracket content that is not a valid chord
/// degrades to its first character, and a `<` without a closing `>` is a
/// literal. An empty pattern compiles to an empty sequence.
pub fn parse_pattern(pattern: &str) -> Vec<Key> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut keys = Vec::with_capacity(chars.len());
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '<' {
            if let Some(end) = find_close(&chars, i) {
                let inner: String = chars[i + 1..end].iter().collect();
                keys.push(parse_chord(&inner));
                i = end + 1;
                continue;
            }
        }
        keys.push(match chars[i] {
            ' ' => Key::key(KeyCode::Space),
            c => Key::char(c),
        });
        i += 1;
    }

    keys
}

/// Find the `>` closing the bracket opened at `open`.
///
/// A chord whose key is `>` itself (`<C->>`) leaves the first `>` directly
/// after a hyphen, so that case extends to the following `>`.
fn find_close(chars: &[char], open: usize) -> Option<usize> {
    let mut end = open + 1;
    while end < chars.len() && chars[end] != '>' {
        end += 1;
    }
    if end >= chars.len() {
        return None;
    }
    if chars[end - 1] == '-' && chars.get(end + 1) == Some(&'>') {
        end += 1;
    }
    Some(end)
}

/// Parse the content of one `<...>` token.
fn parse_chord(inner: &str) -> Key {
    let mut modifiers = Modifiers::NONE;
    let mut rest = inner;

    // Modifier letters are only modifiers when something follows the hyphen.
    while let Some((head, tail)) = rest.split_once('-') {
        if tail.is_empty() {
            break;
        }
        let modifier = match head.to_ascii_lowercase().as_str() {
            "c" => Modifiers::CTRL,
            "a" | "m" => Modifiers::ALT, // M for Meta
            "s" => Modifiers::SHIFT,
            _ => break,
        };
        modifiers |= modifier;
        rest = tail;
    }

    let code = match KeyCode::from_name(rest) {
        Some(code) => code,
        None => match rest.chars().next() {
            Some(' ') => KeyCode::Space,
            Some(c) => KeyCode::Char(c),
            None => KeyCode::Null,
        },
    };

    Key::new(code, modifiers)
}

/// Render a key sequence back into pattern text.
pub fn format_pattern(keys: &[Key]) -> String {
    keys.iter().map(ToString::to_string).collect()
}

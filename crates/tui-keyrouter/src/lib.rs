//! # tui-keyrouter
//!
//! Vim-style key sequence routing for terminal applications.
//!
//! ## Features
//!
//! - Patterns in vim notation: `j`, `gg`, `<C-w>j`, `<S-Tab>`, `<F5>`
//! - Count prefixes (`5j`) and timed disambiguation of `g` vs `gg`
//! - A stack of routers for modal input
//! - Named, rebindable bindings loaded from a shared TOML file
//! - Macro recording and playback
//! - A terminal byte decoder that turns raw tty input into keys
//!
//! ```no_run
//! use tui_keyrouter::{Input, Reader, Router};
//!
//! let mut router = Router::new();
//! router.handle("j", |m| println!("down {}", m.count));
//! router.handle("gg", |_| println!("top"));
//!
//! let input = Input::new(router);
//! let mut reader = Reader::new(std::io::stdin());
//! input.run(&mut reader, |_handled| {}).ok();
//! ```

mod config;
mod error;
mod input;
mod key;
mod macros;
mod pattern;
mod reader;
mod router;
mod timer;

pub use config::config_path;
pub use error::{Error, Result};
pub use input::{DispatchState, Input, PendingInput};
pub use key::{Key, KeyCode, Modifiers};
pub use macros::{Macro, MacroManager};
pub use pattern::{format_pattern, parse_pattern};
pub use reader::{Reader, DEFAULT_ESCAPE_TIMEOUT};
pub use router::{
    Binding, Handler, Lookup, Match, Message, MessageSink, Router, SinkFn, DEFAULT_TIMEOUT,
};

/// Helper to create a key with no modifiers.
pub fn key(code: KeyCode) -> Key {
    Key::key(code)
}

/// Helper to create a Ctrl+key.
pub fn ctrl(c: char) -> Key {
    Key::ctrl(c)
}

/// Helper to create an Alt+key.
pub fn alt(c: char) -> Key {
    Key::alt(c)
}

/// Helper to create a Shift+key.
pub fn shift(code: KeyCode) -> Key {
    Key::new(code, Modifiers::SHIFT)
}

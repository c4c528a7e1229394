//! Named macros captured from an [`Input`] and replayed through it.

use crate::error::Result;
use crate::input::Input;
use crate::key::Key;
use crate::pattern::format_pattern;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// A recorded macro.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Macro {
    /// Macro name
    pub name: String,
    /// Recorded keys, stored in vim notation
    pub keys: Vec<Key>,
    /// Optional description
    #[serde(default)]
    pub description: Option<String>,
    /// When the macro was created
    pub created_at: DateTime<Utc>,
}

impl Macro {
    /// Create a new macro.
    pub fn new(name: impl Into<String>, keys: Vec<Key>) -> Self {
        Self {
            name: name.into(),
            keys,
            description: None,
            created_at: Utc::now(),
        }
    }

    /// Set the description.
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// The keys as pattern text, e.g. `3j<C-w>l`.
    pub fn pattern(&self) -> String {
        format_pattern(&self.keys)
    }

    /// Get the number of keys in this macro.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if the macro is empty.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Recording state for a macro being recorded.
#[derive(Debug)]
struct MacroRecording {
    name: String,
    started_at: DateTime<Utc>,
}

/// Macro manager for recording and playback.
///
/// Key capture itself happens inside [`Input`]; the manager names the
/// captures and keeps them.
#[derive(Debug, Default)]
pub struct MacroManager {
    /// Stored macros
    macros: HashMap<String, Macro>,
    /// Current recording
    recording: Option<MacroRecording>,
    /// Most recently recorded or played macro
    last: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct MacroFile {
    #[serde(default)]
    macros: Vec<Macro>,
}

impl MacroManager {
    /// Create a new macro manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start recording keys dispatched to `input` under `name`.
    pub fn start_recording(&mut self, input: &Input, name: impl Into<String>) {
        input.start_recording();
        self.recording = Some(MacroRecording {
            name: name.into(),
            started_at: Utc::now(),
        });
    }

    /// Stop recording and save the macro.
    ///
    /// The last key dispatched (the one that stopped recording) is not part
    /// of the macro.
    pub fn stop_recording(&mut self, input: &Input) -> Option<Macro> {
        let recording = self.recording.take()?;
        let keys = input.stop_recording()?;

        let macro_def = Macro {
            name: recording.name.clone(),
            keys,
            description: None,
            created_at: recording.started_at,
        };
        tracing::debug!(name = %macro_def.name, keys = %macro_def.pattern(), "macro saved");

        self.last = Some(recording.name.clone());
        self.macros.insert(recording.name, macro_def.clone());
        Some(macro_def)
    }

    /// Cancel recording without saving.
    pub fn cancel_recording(&mut self, input: &Input) {
        if self.recording.take().is_some() {
            input.cancel_recording();
        }
    }

    /// Check if currently recording.
    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    /// Get the name of the macro being recorded.
    pub fn recording_name(&self) -> Option<&str> {
        self.recording.as_ref().map(|r| r.name.as_str())
    }

    /// Store a macro, replacing any with the same name.
    pub fn insert(&mut self, macro_def: Macro) {
        self.macros.insert(macro_def.name.clone(), macro_def);
    }

    /// Get a macro by name.
    pub fn get(&self, name: &str) -> Option<&Macro> {
        self.macros.get(name)
    }

    /// The most recently recorded or played macro.
    pub fn last(&self) -> Option<&Macro> {
        self.last.as_deref().and_then(|name| self.macros.get(name))
    }

    /// List all macros, sorted by name.
    pub fn list(&self) -> Vec<&Macro> {
        let mut macros: Vec<&Macro> = self.macros.values().collect();
        macros.sort_by(|a, b| a.name.cmp(&b.name));
        macros
    }

    /// Delete a macro.
    pub fn delete(&mut self, name: &str) -> bool {
        if self.last.as_deref() == Some(name) {
            self.last = None;
        }
        self.macros.remove(name).is_some()
    }

    /// Replay a macro through `input`. Returns false if it doesn't exist.
    pub fn play(&mut self, input: &Input, name: &str) -> bool {
        let Some(macro_def) = self.macros.get(name) else {
            return false;
        };
        tracing::debug!(name, keys = %macro_def.pattern(), "playing macro");
        input.play(&macro_def.keys);
        self.last = Some(name.to_string());
        true
    }

    /// Save macros to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let file = MacroFile {
            macros: self.list().into_iter().cloned().collect(),
        };
        let content = toml::to_string_pretty(&file)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load macros from a TOML file, merging them into this manager.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let content = std::fs::read_to_string(path)?;
        let file: MacroFile = toml::from_str(&content)?;

        for macro_def in file.macros {
            self.insert(macro_def);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::parse_pattern;
    use crate::router::Router;
    use std::sync::Arc;

    fn input_with_log() -> (Input, Arc<parking_lot::Mutex<Vec<String>>>) {
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let mut router = Router::new();
        for pattern in ["j", "k", "q"] {
            let log = log.clone();
            router.handle(pattern, move |m| log.lock().push(format!("{pattern}x{}", m.count)));
        }
        (Input::new(router), log)
    }

    #[test]
    fn test_macro_creation() {
        let macro_def = Macro::new("test", parse_pattern("3j<C-w>")).with_description("Test macro");

        assert_eq!(macro_def.name, "test");
        assert!(macro_def.description.is_some());
        assert_eq!(macro_def.len(), 3);
        assert_eq!(macro_def.pattern(), "3j<C-w>");
    }

    #[test]
    fn test_recording() {
        let (input, _log) = input_with_log();
        let mut manager = MacroManager::new();

        manager.start_recording(&input, "test");
        assert!(manager.is_recording());
        assert!(input.is_recording());
        assert_eq!(manager.recording_name(), Some("test"));

        for key in parse_pattern("2jkq") {
            input.dispatch(key);
        }

        let macro_def = manager.stop_recording(&input).unwrap();
        assert_eq!(macro_def.name, "test");
        assert_eq!(macro_def.keys, parse_pattern("2jk"));
        assert!(!manager.is_recording());
        assert_eq!(manager.last().map(|m| m.name.as_str()), Some("test"));
    }

    #[test]
    fn test_cancel_recording() {
        let (input, _log) = input_with_log();
        let mut manager = MacroManager::new();

        manager.start_recording(&input, "test");
        input.dispatch(Key::char('j'));
        manager.cancel_recording(&input);

        assert!(!manager.is_recording());
        assert!(!input.is_recording());
        assert!(manager.get("test").is_none());
    }

    #[test]
    fn test_play() {
        let (input, log) = input_with_log();
        let mut manager = MacroManager::new();
        manager.insert(Macro::new("down", parse_pattern("3jk")));

        assert!(manager.play(&input, "down"));
        assert_eq!(*log.lock(), vec!["jx3", "kx1"]);
        assert!(!manager.play(&input, "nonexistent"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("macros.toml");

        let mut manager = MacroManager::new();
        manager.insert(Macro::new("nav", parse_pattern("<C-w>l2j")).with_description("next pane"));
        manager.insert(Macro::new("top", parse_pattern("gg")));
        manager.save(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains(r#""<C-w>""#));

        let mut loaded = MacroManager::new();
        loaded.load(&path).unwrap();
        assert_eq!(loaded.list().len(), 2);
        assert_eq!(loaded.get("nav"), manager.get("nav"));
        assert_eq!(loaded.get("nav").unwrap().description.as_deref(), Some("next pane"));
    }
}

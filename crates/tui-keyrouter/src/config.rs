//! User key configuration file.
//!
//! One TOML file shared by every application:
//!
//! ```toml
//! [aliases]
//! leader = ","
//!
//! [global]
//! scroll_down = "<C-e>"
//!
//! [my_app]
//! scroll_down = "j"
//! ```
//!
//! `[aliases]` applies first, then `[global]`, then the application's own
//! table, so application entries win.

use crate::error::Result;
use crate::router::Router;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "keyrouter.toml";

/// Location of the shared configuration file.
///
/// `$XDG_CONFIG_HOME/keyrouter.toml` when the variable is set, otherwise
/// `~/.config/keyrouter.toml`. `None` if no home directory can be found.
pub fn config_path() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os("XDG_CONFIG_HOME").filter(|d| !d.is_empty()) {
        return Some(PathBuf::from(dir).join(CONFIG_FILE));
    }
    directories::BaseDirs::new().map(|dirs| dirs.home_dir().join(".config").join(CONFIG_FILE))
}

impl Router {
    /// Apply the shared configuration file for `app`.
    pub fn load_bindings(&mut self, app: &str) -> Result<()> {
        match config_path() {
            Some(path) => self.load_bindings_from(path, app),
            None => Ok(()),
        }
    }

    /// Apply a configuration file for `app`. A missing file is not an error.
    pub fn load_bindings_from(&mut self, path: impl AsRef<Path>, app: &str) -> Result<()> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        let table: toml::Table = toml::from_str(&content)?;

        for (name, expansion) in string_entries(&table, "aliases") {
            self.set_alias(name, expansion);
        }
        for section in ["global", app] {
            for (name, pattern) in string_entries(&table, section) {
                self.rebind(name, pattern);
            }
        }

        tracing::debug!(path = %path.display(), app, "applied key config");
        Ok(())
    }

    /// Write a config template for `app` listing every named binding,
    /// commented out, with its default pattern.
    pub fn write_default_bindings<W: Write>(&self, mut writer: W, app: &str) -> Result<()> {
        let mut out = format!("[{app}]\n");
        for binding in self.bindings() {
            let value = toml::Value::String(binding.default_pattern);
            out.push_str(&format!("# {} = {value}\n", binding.name));
        }
        writer.write_all(out.as_bytes())?;
        Ok(())
    }
}

/// String values of one table; anything else is skipped with a warning.
fn string_entries<'a>(table: &'a toml::Table, section: &str) -> Vec<(&'a str, &'a str)> {
    let Some(entries) = table.get(section).and_then(toml::Value::as_table) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|(name, value)| match value.as_str() {
            Some(s) => Some((name.as_str(), s)),
            None => {
                tracing::warn!(section, name = %name, "ignoring non-string key config value");
                None
            }
        })
        .collect()
}

// ── Display configuration ─────────────────────────────────────────────────────
//
// Reads `%APPDATA%\winws\display.json` (or the file named by `WINWS_CONFIG`).
// No `unsafe`; pure safe Rust + serde_json.  Every field has a default, so a
// partial file only overrides what it names.

use std::{fs, path::Path, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Environment variable that overrides the configuration path.
pub const CONFIG_ENV: &str = "WINWS_CONFIG";

// ── On-disk types ─────────────────────────────────────────────────────────────

/// Root of the JSON configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Upper bound on a single wait for native messages, in milliseconds.
    pub poll_interval_ms: u64,
    /// Maximum press/release and release/release distance of a click.
    pub click_threshold_ms: u64,
    /// Task identifiers cycle in `1..task_id_limit`.
    pub task_id_limit: u32,
    /// Window class registered by the Win32 backend.
    pub window_class: String,
    /// Caption given to new native windows.
    pub default_caption: String,
    /// Fonts loaded when the display starts.
    pub fonts: Vec<FontSpec>,
    /// Aliases registered after `fonts`.
    pub aliases: Vec<FontAliasSpec>,
}

/// A font file to register under `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontSpec {
    pub name: String,
    pub path: PathBuf,
}

/// `name` resolves to whatever `alias` resolves to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontAliasSpec {
    pub name: String,
    pub alias: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            click_threshold_ms: 400,
            task_id_limit: 0x7f_ffff,
            window_class: "WinWsWindow".to_owned(),
            default_caption: "winws".to_owned(),
            fonts: Vec::new(),
            aliases: Vec::new(),
        }
    }
}

impl DisplayConfig {
    /// Return the configuration path: `$WINWS_CONFIG`, else
    /// `%APPDATA%\winws\display.json`.
    ///
    /// Returns `None` if neither variable is set.
    pub fn config_path() -> Option<PathBuf> {
        if let Some(p) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(p));
        }
        let appdata = std::env::var_os("APPDATA")?;
        let mut p = PathBuf::from(appdata);
        p.push("winws");
        p.push("display.json");
        Some(p)
    }

    /// Parse a configuration from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read and parse the configuration file at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Load from `config_path()`, falling back to defaults on any error.
    /// A missing file is normal; a broken one is logged.
    pub fn load_or_default() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                log::warn!("ignoring {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Write the configuration as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let file = fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg = DisplayConfig::from_json(r#"{ "poll_interval_ms": 20 }"#).unwrap();
        assert_eq!(cfg.poll_interval_ms, 20);
        assert_eq!(cfg.click_threshold_ms, 400);
        assert_eq!(cfg.task_id_limit, 0x7f_ffff);
        assert!(cfg.fonts.is_empty());
    }

    #[test]
    fn fonts_and_aliases_parse() {
        let cfg = DisplayConfig::from_json(
            r#"{
                "fonts": [ { "name": "lsp-icons", "path": "fonts/icons.ttf" } ],
                "aliases": [ { "name": "ui", "alias": "lsp-icons" } ]
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.fonts[0].name, "lsp-icons");
        assert_eq!(cfg.fonts[0].path, PathBuf::from("fonts/icons.ttf"));
        assert_eq!(cfg.aliases[0].alias, "lsp-icons");
    }

    #[test]
    fn malformed_json_is_a_config_error() {
        let err = DisplayConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, crate::error::WsError::Config(_)));
    }

    #[test]
    fn save_then_load() {
        let dir = std::env::temp_dir().join(format!("winws-config-{}", std::process::id()));
        let path = dir.join("display.json");
        let cfg = DisplayConfig {
            click_threshold_ms: 250,
            ..DisplayConfig::default()
        };
        cfg.save(&path).unwrap();
        assert_eq!(DisplayConfig::load(&path).unwrap(), cfg);
        let _ = fs::remove_dir_all(&dir);
    }
}

//! JSON configuration file for the CLI.

use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

use sg_compiler::ParseMode;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeSetting {
    Strict,
    #[default]
    Lenient,
}

impl From<ModeSetting> for ParseMode {
    fn from(mode: ModeSetting) -> Self {
        match mode {
            ModeSetting::Strict => ParseMode::Strict,
            ModeSetting::Lenient => ParseMode::Lenient,
        }
    }
}

/// One engine slot built from one or more list files.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    pub name: String,
    pub lists: Vec<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub mode: ModeSetting,
    /// Public suffix list file (`public_suffix_list.dat` format)
    pub psl: Option<PathBuf>,
    pub tags: Vec<String>,
    pub stores: Vec<StoreConfig>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self, String> {
        let text = fs::read_to_string(path).map_err(|e| format!("Failed to read config '{}': {}", path, e))?;
        Self::from_json(&text).map_err(|e| format!("Invalid config '{}': {}", path, e))
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Fold command-line flags into the file settings.
    ///
    /// Each `--list` becomes its own store after the configured ones.
    pub fn merge_flags(&mut self, lists: &[String], tags: &[String], strict: bool, psl: Option<&str>) {
        if strict {
            self.mode = ModeSetting::Strict;
        }
        if let Some(psl) = psl {
            self.psl = Some(PathBuf::from(psl));
        }
        for tag in tags {
            if !self.tags.contains(tag) {
                self.tags.push(tag.clone());
            }
        }
        for list in lists {
            self.stores.push(StoreConfig {
                name: list.clone(),
                lists: vec![PathBuf::from(list)],
            });
        }
    }
}

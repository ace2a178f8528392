use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::AppError;
use crate::graph::Workspace;

pub mod presets;

const KEY_PREFIX: &str = "prompt_template_";

/// A saved workspace together with the prompt it compiled to at save time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedTemplate {
    pub name: String,
    pub workspace: Workspace,
    pub prompt: String,
    pub saved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateEntry {
    pub key: String,
    pub name: String,
    pub saved_at: DateTime<Utc>,
}

/// One JSON file per template under `<store>/templates`, keyed by file stem.
pub struct TemplateStore {
    dir: PathBuf,
}

impl TemplateStore {
    pub fn new(store_dir: &Path) -> Self {
        Self { dir: store_dir.join("templates") }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Path of a caller-supplied key. Only `prompt_template_<digits>` keys are
    /// accepted, so a key can never point outside the template directory.
    fn checked_path(&self, key: &str) -> Result<PathBuf> {
        let valid = key
            .strip_prefix(KEY_PREFIX)
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()));
        if !valid {
            return Err(AppError::Store(format!("invalid template key {key:?}")).into());
        }
        Ok(self.path_for(key))
    }

    /// Stores the template under a fresh `prompt_template_<millis>` key and returns the key.
    pub fn save(&self, name: &str, workspace: &Workspace, prompt: &str) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::Store("template name must not be empty".into()).into());
        }
        fs::create_dir_all(&self.dir)?;

        let saved_at = Utc::now();
        let mut millis = saved_at.timestamp_millis();
        let mut key = format!("{KEY_PREFIX}{millis}");
        while self.path_for(&key).exists() {
            millis += 1;
            key = format!("{KEY_PREFIX}{millis}");
        }

        let record = SavedTemplate {
            name: name.to_string(),
            workspace: workspace.clone(),
            prompt: prompt.to_string(),
            saved_at,
        };
        fs::write(self.path_for(&key), serde_json::to_string_pretty(&record)?)?;
        tracing::info!(%key, name, "template saved");
        Ok(key)
    }

    /// Saved templates oldest first. Unreadable entries are skipped.
    pub fn list(&self) -> Result<Vec<TemplateEntry>> {
        if !self.dir.exists() {
            return Ok(vec![]);
        }
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(key) = path.file_stem().and_then(|s| s.to_str()) else { continue };
            if !key.starts_with(KEY_PREFIX) || path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.load(key) {
                Ok(t) => out.push(TemplateEntry { key: key.to_string(), name: t.name, saved_at: t.saved_at }),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable template"),
            }
        }
        out.sort_by(|a, b| a.saved_at.cmp(&b.saved_at).then_with(|| a.key.cmp(&b.key)));
        Ok(out)
    }

    pub fn load(&self, key: &str) -> Result<SavedTemplate> {
        let path = self.checked_path(key)?;
        if !path.exists() {
            return Err(AppError::Store(format!("no saved template {key}")).into());
        }
        let text = fs::read_to_string(&path)?;
        serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Returns whether a template was removed.
    pub fn delete(&self, key: &str) -> Result<bool> {
        let path = self.checked_path(key)?;
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        Ok(true)
    }
}

/// Serialized form of a workspace for sharing with other users.
pub fn export_shared(ws: &Workspace) -> Result<String> {
    ws.to_json_pretty()
}

pub fn import_shared(text: &str) -> Result<Workspace> {
    Workspace::from_json(text)
}

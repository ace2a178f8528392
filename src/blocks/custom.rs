use anyhow::{Context, Result};
use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use super::{BlockError, BlockKind, SlotSpec};
use crate::errors::AppError;

pub const CONTENT_SLOT: &str = "CONTENT";
pub const DEFAULT_ICON: &str = "🧩";
pub const DEFAULT_COLOR: &str = "#5b67a5";

/// A user-authored block kind: one `CONTENT` slot rendered as `{name}：{content}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomBlockDefinition {
    pub id: String,
    pub name: String,
    #[serde(default = "default_icon")]
    pub icon: String,
    #[serde(default = "default_color")]
    pub color: String,
}

fn default_icon() -> String {
    DEFAULT_ICON.into()
}

fn default_color() -> String {
    DEFAULT_COLOR.into()
}

impl CustomBlockDefinition {
    /// Builds a definition with a fresh id, applying icon/color defaults and
    /// validating the same way the block editor form does.
    pub fn create(name: &str, icon: Option<&str>, color: Option<&str>) -> Result<Self, BlockError> {
        let def = Self {
            id: Uuid::new_v4().to_string(),
            name: name.trim().to_string(),
            icon: icon.filter(|i| !i.trim().is_empty()).unwrap_or(DEFAULT_ICON).to_string(),
            color: color.unwrap_or(DEFAULT_COLOR).to_string(),
        };
        def.validate()?;
        Ok(def)
    }

    pub fn validate(&self) -> Result<(), BlockError> {
        if self.name.trim().is_empty() {
            return Err(BlockError::EmptyName);
        }
        if !is_hex_color(&self.color) {
            return Err(BlockError::InvalidColor(self.color.clone()));
        }
        Ok(())
    }

    pub fn kind_id(&self) -> String {
        kind_id_for(&self.id)
    }

    pub fn to_kind(&self) -> BlockKind {
        BlockKind {
            id: self.kind_id(),
            fields: vec![],
            slots: vec![SlotSpec::value(CONTENT_SLOT)],
            produces_value: false,
        }
    }
}

pub fn kind_id_for(definition_id: &str) -> String {
    format!("custom_{definition_id}")
}

fn is_hex_color(s: &str) -> bool {
    s.len() == 7 && s.starts_with('#') && s[1..].chars().all(|c| c.is_ascii_hexdigit())
}

/// JSON-file persistence for custom block definitions.
pub struct CustomBlockStore {
    path: PathBuf,
}

impl CustomBlockStore {
    pub fn new(store_dir: &Path) -> Self {
        Self { path: store_dir.join("custom_blocks.json") }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored definitions; a missing file means none have been defined yet.
    pub fn list(&self) -> Result<Vec<CustomBlockDefinition>> {
        if !self.path.exists() {
            return Ok(vec![]);
        }
        let text = fs::read_to_string(&self.path)?;
        let defs: Vec<CustomBlockDefinition> = serde_json::from_str(&text)
            .map_err(|e| AppError::Store(format!("{}: {e}", self.path.display())))?;
        Ok(defs)
    }

    /// Inserts or replaces the definition with the same id.
    pub fn add(&self, def: CustomBlockDefinition) -> Result<CustomBlockDefinition> {
        def.validate()?;
        let mut defs = self.list()?;
        match defs.iter_mut().find(|d| d.id == def.id) {
            Some(existing) => *existing = def.clone(),
            None => defs.push(def.clone()),
        }
        self.write(&defs)?;
        tracing::info!(id = %def.id, name = %def.name, "custom block saved");
        Ok(def)
    }

    /// Returns whether a definition was removed.
    pub fn remove(&self, id: &str) -> Result<bool> {
        let mut defs = self.list()?;
        let before = defs.len();
        defs.retain(|d| d.id != id);
        if defs.len() == before {
            return Ok(false);
        }
        self.write(&defs)?;
        Ok(true)
    }

    fn write(&self, defs: &[CustomBlockDefinition]) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        let text = serde_json::to_string_pretty(defs)?;
        fs::write(&self.path, text)
            .with_context(|| format!("failed to write {}", self.path.display()))?;
        Ok(())
    }
}

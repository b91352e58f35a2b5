//! Watermark templates.
//!
//! Built-in templates ship with the crate and are read-only. User templates
//! and the recently used list are persisted together in one JSON file.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::settings::{
    Anchor, ExportSettings, Placement, ProcessMode, RenderSettings, TextStyle, TileSettings,
    TileStyle, WatermarkKind, WatermarkSpec,
};

/// Id prefix reserved for built-in templates.
pub const BUILTIN_PREFIX: &str = "builtin-";
/// Length of the recently used list.
pub const RECENT_LIMIT: usize = 3;

/// A named watermark setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    /// Unique id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Watermark to draw.
    pub watermark: WatermarkSpec,
    /// Export settings, if the template carries them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export: Option<ExportSettings>,
}

impl Template {
    /// Capture the watermark and export parts of `settings` as a new user template.
    #[must_use]
    pub fn snapshot(name: impl Into<String>, settings: &RenderSettings) -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_millis());
        Self {
            id: format!("user-{millis}"),
            name: name.into(),
            watermark: settings.watermark.clone(),
            export: Some(settings.export.clone()),
        }
    }

    /// Overwrite `settings` with this template.
    ///
    /// A font or logo path the template leaves unset keeps the one already in
    /// `settings`. Templates always describe an add-watermark setup, so the
    /// process mode is reset to [`ProcessMode::Add`].
    pub fn apply(&self, settings: &mut RenderSettings) {
        let mut watermark = self.watermark.clone();
        if watermark.text.font.is_none() {
            watermark.text.font = settings.watermark.text.font.take();
        }
        if watermark.logo.path.is_none() {
            watermark.logo.path = settings.watermark.logo.path.take();
        }
        settings.watermark = watermark;
        if let Some(export) = &self.export {
            settings.export = export.clone();
        }
        settings.process_mode = ProcessMode::Add;
        settings.remove_then_add = false;
    }

    /// Whether this is one of the read-only built-ins.
    #[must_use]
    pub fn is_builtin(&self) -> bool {
        self.id.starts_with(BUILTIN_PREFIX)
    }
}

fn text_template(id: &str, name: &str, text: &str, size: f32, color: &str) -> Template {
    Template {
        id: format!("{BUILTIN_PREFIX}{id}"),
        name: name.to_string(),
        watermark: WatermarkSpec {
            kind: WatermarkKind::Text,
            text: TextStyle {
                content: text.to_string(),
                font: None,
                font_size: size,
                color: color.to_string(),
            },
            ..WatermarkSpec::default()
        },
        export: None,
    }
}

fn tiled(mut template: Template, opacity: f32, rotation: f32, style: TileStyle, gap: f32) -> Template {
    let wm = &mut template.watermark;
    wm.placement = Placement::Tile;
    wm.opacity = opacity;
    wm.rotation = rotation;
    wm.tile = TileSettings { gap, style };
    template
}

fn single(mut template: Template, opacity: f32, rotation: f32, x: f32, y: f32) -> Template {
    let wm = &mut template.watermark;
    wm.placement = Placement::Single;
    wm.opacity = opacity;
    wm.rotation = rotation;
    wm.anchor = Anchor { x, y };
    template
}

/// The read-only templates every store offers.
#[must_use]
pub fn builtin_templates() -> Vec<Template> {
    let mut corner = single(
        text_template("corner", "Corner logo", "", 48.0, "#ffffff"),
        0.5,
        0.0,
        0.85,
        0.85,
    );
    corner.watermark.kind = WatermarkKind::Logo;
    corner.watermark.logo.scale = 0.8;

    vec![
        tiled(
            text_template("light", "Light leak guard", "For submission only", 48.0, "#ffffff"),
            0.28,
            -20.0,
            TileStyle::Grid4,
            220.0,
        ),
        tiled(
            text_template("strong", "Strong diagonal tile", "DO NOT COPY", 64.0, "#ffb74a"),
            0.4,
            -30.0,
            TileStyle::Grid9,
            160.0,
        ),
        corner,
        single(
            text_template("center", "Centered", "CONFIDENTIAL", 56.0, "#5cc8ff"),
            0.45,
            0.0,
            0.5,
            0.5,
        ),
        single(
            text_template("date", "Date stamp", "© 2024 All rights reserved", 24.0, "#9aa3b2"),
            0.6,
            0.0,
            0.5,
            0.92,
        ),
        tiled(
            text_template("dense", "Dense leak guard", "Internal", 36.0, "#ffffff"),
            0.22,
            -15.0,
            TileStyle::Grid9,
            100.0,
        ),
        tiled(
            text_template("review", "Review only", "REVIEW ONLY", 72.0, "#ff6b6b"),
            0.35,
            -25.0,
            TileStyle::Grid4,
            200.0,
        ),
        single(
            text_template("social", "Social media", "@username", 32.0, "#ffffff"),
            0.7,
            0.0,
            0.5,
            0.9,
        ),
    ]
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    templates: Vec<Template>,
    #[serde(default)]
    recent: Vec<String>,
}

/// Built-in plus user templates, backed by a JSON file.
#[derive(Debug)]
pub struct TemplateStore {
    path: PathBuf,
    builtin: Vec<Template>,
    data: StoreFile,
}

impl TemplateStore {
    /// Open the store at `path`.
    ///
    /// A missing file is an empty store. A file that cannot be parsed is
    /// logged and treated as empty; it is overwritten on the next change.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if an existing file cannot be read.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "unreadable template file, starting empty");
                StoreFile::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreFile::default(),
            Err(e) => return Err(e.into()),
        };
        debug!(
            path = %path.display(),
            templates = data.templates.len(),
            "template store opened"
        );
        Ok(Self {
            path,
            builtin: builtin_templates(),
            data,
        })
    }

    /// Backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Built-ins first, then user templates newest first.
    pub fn templates(&self) -> impl Iterator<Item = &Template> {
        self.builtin.iter().chain(self.data.templates.iter())
    }

    /// Look up a template by id.
    #[must_use]
    pub fn find(&self, id: &str) -> Option<&Template> {
        self.templates().find(|t| t.id == id)
    }

    /// Store a user template in front of the existing ones.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Settings`] if the id is reserved or already taken, and
    /// a write error if the file cannot be saved.
    pub fn add(&mut self, template: Template) -> Result<()> {
        if template.is_builtin() {
            return Err(Error::Settings(format!(
                "template id '{}' is reserved for built-ins",
                template.id
            )));
        }
        if self.find(&template.id).is_some() {
            return Err(Error::Settings(format!(
                "template id '{}' already exists",
                template.id
            )));
        }
        self.data.templates.insert(0, template);
        self.save()
    }

    /// Delete a user template. Returns whether one was removed.
    ///
    /// Built-ins cannot be removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Settings`] for a built-in id and a write error if the file cannot be saved.
    pub fn remove(&mut self, id: &str) -> Result<bool> {
        if id.starts_with(BUILTIN_PREFIX) {
            return Err(Error::Settings(format!(
                "built-in template '{id}' cannot be removed"
            )));
        }
        let before = self.data.templates.len();
        self.data.templates.retain(|t| t.id != id);
        if self.data.templates.len() == before {
            return Ok(false);
        }
        self.data.recent.retain(|r| r != id);
        self.save()?;
        Ok(true)
    }

    /// Mark `id` as most recently used.
    ///
    /// # Errors
    ///
    /// Returns a write error if the file cannot be saved.
    pub fn touch_recent(&mut self, id: &str) -> Result<()> {
        self.data.recent.retain(|r| r != id);
        self.data.recent.insert(0, id.to_string());
        self.data.recent.truncate(RECENT_LIMIT);
        self.save()
    }

    /// Recently used templates, most recent first. Ids that no longer resolve are skipped.
    pub fn recent(&self) -> impl Iterator<Item = &Template> {
        self.data.recent.iter().filter_map(move |id| self.find(id))
    }

    fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.data)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::from_write(e, parent))?;
        }
        std::fs::write(&self.path, json).map_err(|e| Error::from_write(e, &self.path))
    }
}

//! Layout of a CMS installation on disk

use crate::error::{Error, Result};
use crate::model::AddonType;
use std::path::{Path, PathBuf};

/// Default add-on directories, relative to the installation root
pub const DEFAULT_PLUGINS_DIR: &str = "modules";
pub const DEFAULT_THEMES_DIR: &str = "themes";

/// A CMS installation rooted at a directory
#[derive(Debug, Clone)]
pub struct Installation {
    root: PathBuf,
    plugins_dir: PathBuf,
    themes_dir: PathBuf,
}

impl Installation {
    pub fn new(
        root: impl Into<PathBuf>,
        plugins_dir: impl Into<PathBuf>,
        themes_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            root: root.into(),
            plugins_dir: plugins_dir.into(),
            themes_dir: themes_dir.into(),
        }
    }

    /// Installation root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding add-ons of the given type
    pub fn addons_path(&self, addon_type: AddonType) -> PathBuf {
        match addon_type {
            AddonType::Plugin => self.root.join(&self.plugins_dir),
            AddonType::Theme => self.root.join(&self.themes_dir),
        }
    }

    /// Names of the add-ons installed for a type, sorted
    ///
    /// Every non-hidden subdirectory of the add-ons directory is an add-on.
    ///
    /// # Errors
    ///
    /// Fails if the add-ons directory cannot be listed.
    pub fn fetch_addons(&self, addon_type: AddonType) -> Result<Vec<String>> {
        let path = self.addons_path(addon_type);
        let enumeration = |source| Error::Enumeration {
            path: path.clone(),
            source,
        };

        let mut names = Vec::new();
        for entry in std::fs::read_dir(&path).map_err(enumeration)? {
            let entry = entry.map_err(enumeration)?;
            if !entry.file_type().map_err(enumeration)?.is_dir() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') {
                names.push(name);
            }
        }

        names.sort();
        Ok(names)
    }
}

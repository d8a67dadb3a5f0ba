//! Detection of locally modified add-on files

use crate::error::{Error, Result};
use crate::model::Addon;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Compares an installed add-on with an authoritative pristine copy
#[async_trait]
pub trait AlterationChecker: Send + Sync {
    /// Return the add-on's altered files, relative to `addon_path`
    ///
    /// Files whose name appears in `ignored` are never reported.
    async fn check(&self, addon: &Addon, addon_path: &Path, ignored: &[&str])
    -> Result<Vec<String>>;
}

/// Checker used when no pristine reference is available
#[derive(Debug, Default, Clone, Copy)]
pub struct SkipAlteration;

#[async_trait]
impl AlterationChecker for SkipAlteration {
    async fn check(&self, addon: &Addon, _: &Path, _: &[&str]) -> Result<Vec<String>> {
        debug!(indent = 1, addon = %addon.name, "no pristine reference, alteration check skipped");
        Ok(Vec::new())
    }
}

/// Compares against extracted release archives laid out as `<root>/<addon name>/`
#[derive(Debug, Clone)]
pub struct PristineDirChecker {
    reference_root: PathBuf,
}

impl PristineDirChecker {
    pub fn new(reference_root: impl Into<PathBuf>) -> Self {
        Self {
            reference_root: reference_root.into(),
        }
    }

    /// Walk the add-on tree and compare each file; blocking, run off the runtime
    fn altered_files(
        addon_path: &Path,
        reference: &Path,
        ignored: &[String],
    ) -> Result<Vec<String>> {
        let mut altered = Vec::new();

        for entry in WalkDir::new(addon_path).follow_links(false) {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(addon_path).to_path_buf();
                Error::io(path, e.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(addon_path) else {
                continue;
            };
            let is_ignored = relative
                .components()
                .any(|c| ignored.iter().any(|name| c.as_os_str() == name.as_str()));
            if is_ignored {
                continue;
            }

            let installed = std::fs::read(entry.path()).map_err(|e| Error::io(entry.path(), e))?;
            let pristine = std::fs::read(reference.join(relative)).ok();

            if pristine.as_deref() != Some(installed.as_slice()) {
                altered.push(
                    relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy())
                        .collect::<Vec<_>>()
                        .join("/"),
                );
            }
        }

        altered.sort();
        Ok(altered)
    }
}

#[async_trait]
impl AlterationChecker for PristineDirChecker {
    async fn check(
        &self,
        addon: &Addon,
        addon_path: &Path,
        ignored: &[&str],
    ) -> Result<Vec<String>> {
        let reference = self.reference_root.join(&addon.name);
        if !reference.is_dir() {
            return Err(Error::io(
                reference,
                std::io::Error::new(std::io::ErrorKind::NotFound, "pristine copy not found"),
            ));
        }

        let addon_path = addon_path.to_path_buf();
        let ignored: Vec<String> = ignored.iter().map(|name| name.to_string()).collect();
        let altered = tokio::task::spawn_blocking({
            let addon_path = addon_path.clone();
            move || Self::altered_files(&addon_path, &reference, &ignored)
        })
        .await
        .map_err(|e| Error::io(addon_path, std::io::Error::other(e)))??;
        if altered.is_empty() {
            debug!(indent = 1, addon = %addon.name, "no altered files");
        } else {
            warn!(indent = 1, "[-] {} altered file(s): {}", altered.len(), altered.join(", "));
        }

        Ok(altered)
    }
}

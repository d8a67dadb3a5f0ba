//! Operations every supported CMS family provides
//!
//! The orchestration in [`Scanner`](crate::Scanner) only talks to this
//! trait, so a family can change how it scrapes or parses its remote
//! catalog without touching the batch logic.

use crate::error::Result;
use crate::model::{Addon, Core, Vulnerability};
use async_trait::async_trait;
use std::path::Path;

/// A CMS family (Drupal, ...) able to audit its core and add-ons
#[async_trait]
pub trait CmsFamily: Send + Sync {
    /// Human-readable family name
    fn name(&self) -> &'static str;

    /// Infer the installed major version from marker files under `root`
    ///
    /// Returns an empty string when no marker is present.
    fn detect_major_version(&self, root: &Path) -> String;

    /// Read the installed core version for a known major version
    ///
    /// Returns an empty string when `major` is empty or unsupported.
    ///
    /// # Errors
    ///
    /// Fails if the version file cannot be read or holds no version.
    fn detect_core_version(&self, root: &Path, major: &str) -> Result<String>;

    /// URL of the release history feed for a major version
    fn release_feed_url(&self, major: &str) -> String;

    /// Extract the latest core version from a release history feed body
    ///
    /// # Errors
    ///
    /// Fails with [`Error::FeedParse`](crate::Error::FeedParse) if the body is
    /// not well-formed or holds no release.
    fn extract_last_version(&self, body: &str) -> Result<String>;

    /// Fetch the release feed for `major` and extract its latest version
    async fn fetch_core_last_version(&self, major: &str) -> Result<String>;

    /// Name of the file an add-on's local version is read from
    fn addon_filename(&self, name: &str, major: &str) -> String;

    /// Read the add-on's installed version from `addon_path` into `addon.version`
    fn read_addon_version(&self, addon: &mut Addon, addon_path: &Path, major: &str)
    -> Result<String>;

    /// Look up the latest published version of an add-on
    ///
    /// Commits `last_version`, `last_release_date` and `link` only when the
    /// catalog page is fully recognised. Returns the resolved last version,
    /// which may be empty.
    ///
    /// # Errors
    ///
    /// HTTP error statuses are noted on the add-on and then returned.
    async fn lookup_last_version(&self, addon: &mut Addon) -> Result<String>;

    /// Download URL of the pristine archive for an add-on's installed version
    fn download_url(&self, addon: &Addon) -> String;

    /// Known vulnerabilities of the installed core; empty when none match
    async fn check_core_vulnerabilities(&self, core: &Core) -> Vec<Vulnerability>;

    /// Known vulnerabilities of an add-on; empty when none match
    async fn check_addon_vulnerabilities(&self, addon: &Addon) -> Vec<Vulnerability>;

    /// Directory name of the pristine core archive
    fn archive_name(&self, core: &Core) -> String;

    /// Paths excluded from core alteration checks
    fn core_ignored_files(&self) -> &'static [&'static str];

    /// File names excluded from add-on alteration checks
    fn addon_ignored_files(&self) -> &'static [&'static str];
}

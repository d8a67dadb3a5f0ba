//! Drupal 7 and 8 support
//!
//! Versions are detected from marker files on disk, latest releases are read
//! from the updates.drupal.org release history feed (core) and the
//! drupal.org project release listings (modules and themes).

use crate::catalog::parse_release_page;
use crate::cms::CmsFamily;
use crate::error::{Error, Result};
use crate::model::{Addon, AddonStatus, Core, Vulnerability};
use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, StatusCode, redirect};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// User agent for requests
const USER_AGENT: &str = concat!("drupal-audit/", env!("CARGO_PKG_VERSION"));

/// Default request timeout in seconds
const TIMEOUT_SECS: u64 = 30;

/// drupal.org endpoints
const SITE_URL: &str = "https://www.drupal.org";
const RELEASE_SITE: &str = "https://updates.drupal.org/release-history/drupal/";
const DOWNLOAD_ADDON_URL: &str = "https://ftp.drupal.org/files/projects/";

/// Allowed URL schemes
const ALLOWED_SCHEMES: &[&str] = &["http", "https"];

/// Marker file per major version, checked in order; the last match wins
const MAJOR_VERSION_MARKERS: &[(&str, &str)] = &[
    ("8", "core/lib/Drupal.php"),
    ("7", "includes/bootstrap.inc"),
];

/// Core files that never take part in alteration checks
const CORE_IGNORED_FILES: &[&str] = &[
    "modules",
    "CHANGELOG.txt",
    "COPYRIGHT.txt",
    "LICENSE.txt",
    "MAINTAINERS.txt",
    "INSTALL.txt",
    "README.txt",
    "INSTALL.mysql.txt",
    "INSTALL.pgsql.txt",
    "INSTALL.sqlite.txt",
    "UPGRADE.txt",
];

/// Add-on files added by the packaging script
const ADDON_IGNORED_FILES: &[&str] = &["LICENSE.txt"];

const NOTE_UNTRACKED: &str = "This is a default addon. Analysis is not yet implemented !";
const NOTE_NOT_LISTED: &str = "Addon not on official site. Search manually !";

/// Drupal 8: `const VERSION = '8.8.1';`
static CORE_VERSION_8: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"const\s+VERSION\s*=\s*'([^']+)'").expect("core 8 version regex")
});

/// Drupal 7: `define('VERSION', '7.67');`
static CORE_VERSION_7: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"define\(\s*'VERSION'\s*,\s*'([^']+)'\s*\)"#).expect("core 7 version regex")
});

/// `name.info.yml`: `version: '8.x-1.0'`
static ADDON_VERSION_YAML: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^version\s*:\s*['"]?([^'"\r\n]+?)['"]?\s*$"#).expect("yaml version regex")
});

/// `name.info`: `version = "7.x-3.1"`
static ADDON_VERSION_INFO: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^version\s*=\s*['"]?([^'"\r\n]+?)['"]?\s*$"#).expect("info version regex")
});

/// Format of an add-on's metadata file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InfoFormat {
    Yaml,
    Ini,
}

impl InfoFormat {
    fn extension(self) -> &'static str {
        match self {
            Self::Yaml => ".info.yml",
            Self::Ini => ".info",
        }
    }

    fn pattern(self) -> &'static Regex {
        match self {
            Self::Yaml => &*ADDON_VERSION_YAML,
            Self::Ini => &*ADDON_VERSION_INFO,
        }
    }

    /// Candidate formats for a major version, most likely first
    fn candidates(major: &str) -> &'static [InfoFormat] {
        match major {
            "7" => &[Self::Ini],
            "" => &[Self::Yaml, Self::Ini],
            _ => &[Self::Yaml],
        }
    }
}

/// Drupal CMS family
#[derive(Debug)]
pub struct DrupalCms {
    client: Client,
    site_url: String,
    release_site: String,
    download_addon_url: String,
}

/// Builder for configuring [`DrupalCms`] endpoints and transport
#[derive(Debug)]
pub struct DrupalCmsBuilder {
    site_url: String,
    release_site: String,
    download_addon_url: String,
    timeout: Duration,
}

impl Default for DrupalCmsBuilder {
    fn default() -> Self {
        Self {
            site_url: SITE_URL.to_string(),
            release_site: RELEASE_SITE.to_string(),
            download_addon_url: DOWNLOAD_ADDON_URL.to_string(),
            timeout: Duration::from_secs(TIMEOUT_SECS),
        }
    }
}

impl DrupalCmsBuilder {
    /// Base URL of the project pages (`https://www.drupal.org`)
    pub fn site_url(mut self, url: impl Into<String>) -> Self {
        self.site_url = url.into();
        self
    }

    /// Prefix of the core release history feed
    pub fn release_site(mut self, url: impl Into<String>) -> Self {
        self.release_site = url.into();
        self
    }

    /// Prefix of add-on archive downloads
    pub fn download_addon_url(mut self, url: impl Into<String>) -> Self {
        self.download_addon_url = url.into();
        self
    }

    /// Timeout applied to every request
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the Drupal family with the configured options
    pub fn build(self) -> Result<DrupalCms> {
        for url in [&self.site_url, &self.release_site, &self.download_addon_url] {
            validate_url(url)?;
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(self.timeout)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| Error::HttpClient(e.to_string()))?;

        Ok(DrupalCms {
            client,
            site_url: self.site_url.trim_end_matches('/').to_string(),
            release_site: self.release_site,
            download_addon_url: self.download_addon_url,
        })
    }
}

/// Check that an endpoint is an absolute http(s) URL
fn validate_url(url: &str) -> Result<()> {
    let parsed = Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;
    if !ALLOWED_SCHEMES.contains(&parsed.scheme()) {
        return Err(Error::InvalidUrl(format!(
            "scheme '{}' not allowed (use http or https)",
            parsed.scheme()
        )));
    }
    Ok(())
}

impl DrupalCms {
    /// Create a Drupal family talking to drupal.org
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Create a builder for configuring endpoints
    pub fn builder() -> DrupalCmsBuilder {
        DrupalCmsBuilder::default()
    }

    /// Release listing page of a project
    pub fn releases_url(&self, name: &str) -> String {
        format!("{}/project/{}/releases", self.site_url, name)
    }

    async fn get_text(&self, url: &str) -> Result<(StatusCode, String)> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::HttpRequest(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::HttpRequest(e.to_string()))?;

        Ok((status, body))
    }
}

fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| Error::io(path, e))
}

#[async_trait]
impl CmsFamily for DrupalCms {
    fn name(&self) -> &'static str {
        "Drupal"
    }

    fn detect_major_version(&self, root: &Path) -> String {
        let mut version_major = String::new();

        for (major, marker) in MAJOR_VERSION_MARKERS {
            if root.join(marker).is_file() {
                version_major = major.to_string();
            }
        }

        debug!(version_major = %version_major, "major version detection");
        version_major
    }

    fn detect_core_version(&self, root: &Path, major: &str) -> Result<String> {
        let (marker, pattern) = match major {
            "8" => (MAJOR_VERSION_MARKERS[0].1, &*CORE_VERSION_8),
            "7" => (MAJOR_VERSION_MARKERS[1].1, &*CORE_VERSION_7),
            _ => return Ok(String::new()),
        };

        let path = root.join(marker);
        let content = read_file(&path)?;
        pattern
            .captures(&content)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .ok_or(Error::VersionNotFound(path))
    }

    fn release_feed_url(&self, major: &str) -> String {
        format!("{}{}.x", self.release_site, major)
    }

    fn extract_last_version(&self, body: &str) -> Result<String> {
        let doc = roxmltree::Document::parse(body).map_err(|e| Error::FeedParse(e.to_string()))?;
        let project = doc.root_element();

        let tag = if project.has_tag_name("project") {
            project
                .children()
                .filter(|n| n.has_tag_name("releases"))
                .flat_map(|releases| releases.children().filter(|n| n.has_tag_name("release")))
                .flat_map(|release| release.children().filter(|n| n.has_tag_name("tag")))
                .next()
                .and_then(|tag| tag.text())
                .map(str::trim)
                .filter(|text| !text.is_empty())
                .map(str::to_string)
        } else {
            None
        };

        tag.ok_or_else(|| Error::FeedParse("no /project/releases/release/tag node".to_string()))
    }

    async fn fetch_core_last_version(&self, major: &str) -> Result<String> {
        let url = self.release_feed_url(major);
        let (status, body) = self.get_text(&url).await?;

        if !status.is_success() {
            return Err(Error::HttpStatus(status.as_u16()));
        }

        self.extract_last_version(&body)
    }

    fn addon_filename(&self, name: &str, major: &str) -> String {
        let format = InfoFormat::candidates(major)[0];
        format!("{}{}", name, format.extension())
    }

    fn read_addon_version(
        &self,
        addon: &mut Addon,
        addon_path: &Path,
        major: &str,
    ) -> Result<String> {
        let mut last_path = PathBuf::new();

        for format in InfoFormat::candidates(major) {
            let filename = format!("{}{}", addon.name, format.extension());
            let path = addon_path.join(&filename);
            if !path.is_file() {
                last_path = path;
                continue;
            }

            let content = read_file(&path)?;
            let version = format
                .pattern()
                .captures(&content)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().trim().to_string())
                .ok_or_else(|| Error::VersionNotFound(path.clone()))?;

            info!(indent = 1, "Version : {}", version);
            addon.filename = filename;
            addon.version = version.clone();
            return Ok(version);
        }

        Err(Error::io(
            last_path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "add-on info file not found"),
        ))
    }

    async fn lookup_last_version(&self, addon: &mut Addon) -> Result<String> {
        if addon.is_untracked() {
            addon.notes = NOTE_UNTRACKED.to_string();
            addon.status = AddonStatus::Untracked;
            warn!(indent = 1, "{}", addon.notes);
            return Ok(String::new());
        }

        let releases_url = self.releases_url(&addon.name);
        let (status, page) = self.get_text(&releases_url).await?;

        if status.is_client_error() || status.is_server_error() {
            addon.notes = NOTE_NOT_LISTED.to_string();
            warn!(indent = 1, "[-] {}", addon.notes);
            return Err(Error::HttpStatus(status.as_u16()));
        }

        if status != StatusCode::OK {
            debug!(indent = 1, %status, url = %releases_url, "release listing not served directly");
            return Ok(addon.last_version.clone());
        }

        match parse_release_page(&page) {
            Some(release) => {
                addon.last_version = release.version;
                addon.last_release_date = release.date;
                addon.link = releases_url;

                if addon.last_version == addon.version {
                    addon.status = AddonStatus::UpToDate;
                    info!(indent = 1, status = "good", "Up to date !");
                } else {
                    addon.status = AddonStatus::Outdated;
                    warn!(
                        indent = 1,
                        "Outdated, last version: {} ({}) check: {}",
                        addon.last_version,
                        addon.last_release_date,
                        addon.link
                    );
                }
            }
            None => debug!(indent = 1, url = %releases_url, "no release found on listing page"),
        }

        Ok(addon.last_version.clone())
    }

    fn download_url(&self, addon: &Addon) -> String {
        format!("{}{}-{}.zip", self.download_addon_url, addon.name, addon.version)
    }

    // TODO: query the drupal.org security advisories feed once it exposes a
    // machine-readable format per project.
    async fn check_core_vulnerabilities(&self, _core: &Core) -> Vec<Vulnerability> {
        warn!(indent = 0, "[-] CVE check not yet implemented !");
        Vec::new()
    }

    async fn check_addon_vulnerabilities(&self, _addon: &Addon) -> Vec<Vulnerability> {
        warn!(indent = 1, "[-] CVE check not yet implemented !");
        Vec::new()
    }

    fn archive_name(&self, core: &Core) -> String {
        format!("drupal-{}", core.version)
    }

    fn core_ignored_files(&self) -> &'static [&'static str] {
        CORE_IGNORED_FILES
    }

    fn addon_ignored_files(&self) -> &'static [&'static str] {
        ADDON_IGNORED_FILES
    }
}

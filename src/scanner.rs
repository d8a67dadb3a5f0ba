//! CMS installation scanner
//!
//! Drives the core analysis and the per-add-on check pipeline. Add-ons are
//! processed one after another in enumeration order; a failing add-on is
//! recorded with its failure and never removed from the results.

use crate::alteration::{AlterationChecker, SkipAlteration};
use crate::cms::CmsFamily;
use crate::drupal::DrupalCms;
use crate::error::{Error, Result};
use crate::installation::{DEFAULT_PLUGINS_DIR, DEFAULT_THEMES_DIR, Installation};
use crate::model::{Addon, AddonStatus, AddonType, Core};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Step of the add-on pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Reading the installed version
    LocalVersion,
    /// Looking up the latest published version
    LastVersion,
    /// Comparing files with the pristine release
    Alteration,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LocalVersion => write!(f, "local version"),
            Self::LastVersion => write!(f, "last version"),
            Self::Alteration => write!(f, "alteration check"),
        }
    }
}

/// Why an add-on's pipeline stopped early
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddonFailure {
    pub stage: Stage,
    pub message: String,
}

impl AddonFailure {
    fn new(stage: Stage, error: Error) -> Self {
        Self {
            stage,
            message: error.to_string(),
        }
    }
}

impl std::fmt::Display for AddonFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} failed: {}", self.stage, self.message)
    }
}

/// Result of analysing one add-on
///
/// `addon` holds every field populated before a failure, if any.
#[derive(Debug, Clone, Serialize)]
pub struct AddonReport {
    #[serde(flatten)]
    pub addon: Addon,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<AddonFailure>,
}

impl AddonReport {
    /// Whether every check ran to completion
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

/// Scan results for a whole installation
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    /// Installation root
    pub root: PathBuf,
    /// CMS family name
    pub cms: &'static str,
    pub core: Core,
    /// Reason the core analysis stopped early
    #[serde(skip_serializing_if = "Option::is_none")]
    pub core_failure: Option<String>,
    pub plugins: Vec<AddonReport>,
    pub themes: Vec<AddonReport>,
}

impl ScanResult {
    /// All add-on reports, plugins first
    pub fn addons(&self) -> impl Iterator<Item = &AddonReport> {
        self.plugins.iter().chain(self.themes.iter())
    }

    /// Count of outdated components, core included
    pub fn outdated_count(&self) -> usize {
        let core_outdated = (self.core.status == AddonStatus::Outdated) as usize;
        core_outdated
            + self
                .addons()
                .filter(|r| r.addon.status == AddonStatus::Outdated)
                .count()
    }

    /// Count of add-ons whose pipeline did not complete
    pub fn failed_count(&self) -> usize {
        self.addons().filter(|r| !r.is_complete()).count()
    }

    /// Count of add-ons with at least one altered file
    pub fn altered_count(&self) -> usize {
        self.addons()
            .filter(|r| !r.addon.altered_files.is_empty())
            .count()
    }
}

/// Scanning session for one installation
pub struct Scanner {
    cms: Box<dyn CmsFamily>,
    alteration: Box<dyn AlterationChecker>,
    installation: Installation,
    core: Core,
    addons: BTreeMap<AddonType, Vec<AddonReport>>,
}

/// Builder for configuring a Scanner with options
pub struct ScannerBuilder {
    root: PathBuf,
    plugins_dir: PathBuf,
    themes_dir: PathBuf,
    cms: Option<Box<dyn CmsFamily>>,
    alteration: Option<Box<dyn AlterationChecker>>,
}

impl ScannerBuilder {
    /// Create a new builder for the installation at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            plugins_dir: PathBuf::from(DEFAULT_PLUGINS_DIR),
            themes_dir: PathBuf::from(DEFAULT_THEMES_DIR),
            cms: None,
            alteration: None,
        }
    }

    /// Plugins directory, relative to the root
    pub fn plugins_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plugins_dir = dir.into();
        self
    }

    /// Themes directory, relative to the root
    pub fn themes_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.themes_dir = dir.into();
        self
    }

    /// CMS family to audit with (Drupal by default)
    pub fn cms(mut self, cms: impl CmsFamily + 'static) -> Self {
        self.cms = Some(Box::new(cms));
        self
    }

    /// Alteration checker (skipped by default)
    pub fn alteration(mut self, checker: impl AlterationChecker + 'static) -> Self {
        self.alteration = Some(Box::new(checker));
        self
    }

    /// Build the Scanner with the configured options
    pub fn build(self) -> Result<Scanner> {
        let cms: Box<dyn CmsFamily> = match self.cms {
            Some(cms) => cms,
            None => Box::new(DrupalCms::new()?),
        };
        let alteration: Box<dyn AlterationChecker> = match self.alteration {
            Some(checker) => checker,
            None => Box::new(SkipAlteration),
        };
        let core = Core::new(cms.core_ignored_files().iter().copied());

        Ok(Scanner {
            cms,
            alteration,
            installation: Installation::new(self.root, self.plugins_dir, self.themes_dir),
            core,
            addons: BTreeMap::new(),
        })
    }
}

impl Scanner {
    /// Create a Drupal scanner with default directories and no alteration check
    ///
    /// For more options, use [`Scanner::builder()`].
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        ScannerBuilder::new(root).build()
    }

    /// Create a builder for configuring scanner options
    ///
    /// # Example
    ///
    /// ```no_run
    /// use drupal_audit::{PristineDirChecker, Scanner};
    ///
    /// let scanner = Scanner::builder("/var/www/drupal")
    ///     .plugins_dir("sites/all/modules")
    ///     .alteration(PristineDirChecker::new("/srv/pristine"))
    ///     .build()?;
    /// # Ok::<(), drupal_audit::Error>(())
    /// ```
    pub fn builder(root: impl Into<PathBuf>) -> ScannerBuilder {
        ScannerBuilder::new(root)
    }

    /// Installation root
    pub fn root(&self) -> &Path {
        self.installation.root()
    }

    /// Core record as analysed so far
    pub fn core(&self) -> &Core {
        &self.core
    }

    /// Reports of the last analysis for an add-on type
    pub fn addons(&self, addon_type: AddonType) -> &[AddonReport] {
        self.addons.get(&addon_type).map(Vec::as_slice).unwrap_or_default()
    }

    /// Scan the core, then plugins and themes
    ///
    /// A core failure is recorded on the result and does not stop add-on
    /// analysis. Failing to enumerate add-ons aborts the scan.
    pub async fn scan(mut self) -> Result<ScanResult> {
        let core_failure = match self.analyze_core().await {
            Ok(_) => None,
            Err(e) => {
                warn!(indent = 0, "[-] Core analysis failed: {}", e);
                Some(e.to_string())
            }
        };

        for addon_type in AddonType::ALL {
            self.addon_analysis(addon_type).await?;
        }

        let mut addons = std::mem::take(&mut self.addons);
        Ok(ScanResult {
            root: self.installation.root().to_path_buf(),
            cms: self.cms.name(),
            core: self.core,
            core_failure,
            plugins: addons.remove(&AddonType::Plugin).unwrap_or_default(),
            themes: addons.remove(&AddonType::Theme).unwrap_or_default(),
        })
    }

    /// Resolve the installed and latest core versions
    ///
    /// # Errors
    ///
    /// Errors reading the local version, fetching the release feed or
    /// parsing it are returned as is.
    pub async fn analyze_core(&mut self) -> Result<&Core> {
        info!(indent = 0, "{} core analysis", self.cms.name());

        let root = self.installation.root();
        self.core.version_major = self.cms.detect_major_version(root);
        if self.core.version_major.is_empty() {
            warn!(indent = 0, "[-] Unable to detect the major version, core skipped");
            return Ok(&self.core);
        }

        self.core.version = self.cms.detect_core_version(root, &self.core.version_major)?;
        info!(indent = 0, "[+] CMS version used : {}", self.core.version);
        debug!(archive = %self.cms.archive_name(&self.core), "pristine core archive");

        self.core.last_version = self
            .cms
            .fetch_core_last_version(&self.core.version_major)
            .await?;
        info!(indent = 0, "[+] Last CMS version: {}", self.core.last_version);

        if self.core.last_version == self.core.version {
            self.core.status = AddonStatus::UpToDate;
            info!(indent = 0, status = "good", "CMS is up to date");
        } else {
            self.core.status = AddonStatus::Outdated;
            warn!(indent = 0, "[-] CMS is outdated, last version: {}", self.core.last_version);
        }

        self.core.vulnerabilities = self.cms.check_core_vulnerabilities(&self.core).await;
        Ok(&self.core)
    }

    /// Analyse every add-on of a type and store the reports on the session
    ///
    /// Returns exactly one report per enumerated add-on, in enumeration
    /// order, whatever the individual checks do.
    ///
    /// # Errors
    ///
    /// Fails only if the add-ons directory cannot be enumerated.
    pub async fn addon_analysis(&mut self, addon_type: AddonType) -> Result<&[AddonReport]> {
        info!(indent = 0, "{} analysis", addon_type.plural());

        let addons_path = self.installation.addons_path(addon_type);
        let names = self.installation.fetch_addons(addon_type)?;

        let mut reports = Vec::with_capacity(names.len());
        for name in names {
            let filename = self.cms.addon_filename(&name, &self.core.version_major);
            let mut addon = Addon::new(addon_type, &name, filename);
            info!(indent = 0, "[+] {}", name);

            let failure = match self.run_checks(&mut addon, &addons_path.join(&name)).await {
                Ok(()) => None,
                Err(failure) => {
                    debug!(addon = %name, stage = %failure.stage, "{}", failure.message);
                    Some(failure)
                }
            };
            reports.push(AddonReport { addon, failure });
        }

        let slot = self.addons.entry(addon_type).or_default();
        *slot = reports;
        Ok(slot.as_slice())
    }

    /// Run the add-on checks in order, stopping at the first failure
    async fn run_checks(
        &self,
        addon: &mut Addon,
        addon_path: &Path,
    ) -> std::result::Result<(), AddonFailure> {
        self.cms
            .read_addon_version(addon, addon_path, &self.core.version_major)
            .map_err(|e| AddonFailure::new(Stage::LocalVersion, e))?;

        self.cms
            .lookup_last_version(addon)
            .await
            .map_err(|e| AddonFailure::new(Stage::LastVersion, e))?;

        addon.vulnerabilities = self.cms.check_addon_vulnerabilities(addon).await;

        debug!(indent = 1, url = %self.cms.download_url(addon), "pristine archive");
        addon.altered_files = self
            .alteration
            .check(addon, addon_path, self.cms.addon_ignored_files())
            .await
            .map_err(|e| AddonFailure::new(Stage::Alteration, e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{UNTRACKED_VERSION, Vulnerability};
    use async_trait::async_trait;
    use std::fs;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    /// Family whose checks fail for add-ons named `broken*`
    struct FlakyCms;

    #[async_trait]
    impl CmsFamily for FlakyCms {
        fn name(&self) -> &'static str {
            "Flaky"
        }

        fn detect_major_version(&self, _: &Path) -> String {
            "9".to_string()
        }

        fn detect_core_version(&self, _: &Path, _: &str) -> Result<String> {
            Ok("9.0".to_string())
        }

        fn release_feed_url(&self, major: &str) -> String {
            format!("http://feed.invalid/{major}")
        }

        fn extract_last_version(&self, _: &str) -> Result<String> {
            Err(Error::FeedParse("unused".to_string()))
        }

        async fn fetch_core_last_version(&self, _: &str) -> Result<String> {
            Err(Error::HttpStatus(503))
        }

        fn addon_filename(&self, name: &str, _: &str) -> String {
            format!("{name}.info")
        }

        fn read_addon_version(&self, addon: &mut Addon, _: &Path, _: &str) -> Result<String> {
            if addon.name == "broken-local" {
                return Err(Error::VersionNotFound(PathBuf::from("broken-local.info")));
            }
            addon.version = "1.0".to_string();
            Ok(addon.version.clone())
        }

        async fn lookup_last_version(&self, addon: &mut Addon) -> Result<String> {
            if addon.name == "broken-remote" {
                addon.notes = "not listed".to_string();
                return Err(Error::HttpStatus(404));
            }
            addon.last_version = "1.0".to_string();
            addon.status = AddonStatus::UpToDate;
            Ok(addon.last_version.clone())
        }

        fn download_url(&self, addon: &Addon) -> String {
            format!("http://files.invalid/{}.zip", addon.name)
        }

        async fn check_core_vulnerabilities(&self, _: &Core) -> Vec<Vulnerability> {
            Vec::new()
        }

        async fn check_addon_vulnerabilities(&self, _: &Addon) -> Vec<Vulnerability> {
            Vec::new()
        }

        fn archive_name(&self, _: &Core) -> String {
            "flaky".to_string()
        }

        fn core_ignored_files(&self) -> &'static [&'static str] {
            &[]
        }

        fn addon_ignored_files(&self) -> &'static [&'static str] {
            &[]
        }
    }

    /// Alteration checker failing for add-ons named `broken-files`
    struct FlakyAlteration;

    #[async_trait]
    impl AlterationChecker for FlakyAlteration {
        async fn check(&self, addon: &Addon, _: &Path, _: &[&str]) -> Result<Vec<String>> {
            if addon.name == "broken-files" {
                return Err(Error::io(
                    "pristine/broken-files",
                    std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
                ));
            }
            Ok(Vec::new())
        }
    }

    fn install_with(modules: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for name in modules {
            fs::create_dir_all(dir.path().join("modules").join(name)).unwrap();
        }
        fs::create_dir_all(dir.path().join("themes")).unwrap();
        dir
    }

    #[tokio::test]
    async fn every_addon_is_reported_despite_failures() {
        let names = ["broken-files", "broken-local", "broken-remote", "ctools", "views"];
        let dir = install_with(&names);

        let mut scanner = Scanner::builder(dir.path())
            .cms(FlakyCms)
            .alteration(FlakyAlteration)
            .build()
            .unwrap();
        let reports = scanner.addon_analysis(AddonType::Plugin).await.unwrap();

        assert_eq!(reports.len(), names.len());
        let reported: Vec<&str> = reports.iter().map(|r| r.addon.name.as_str()).collect();
        assert_eq!(reported, names);

        let stages: Vec<Option<Stage>> = reports
            .iter()
            .map(|r| r.failure.as_ref().map(|f| f.stage))
            .collect();
        assert_eq!(
            stages,
            vec![
                Some(Stage::Alteration),
                Some(Stage::LocalVersion),
                Some(Stage::LastVersion),
                None,
                None,
            ]
        );

        // Fields set before the failure survive
        assert_eq!(reports[2].addon.version, "1.0");
        assert_eq!(reports[2].addon.notes, "not listed");
        assert_eq!(scanner.addons(AddonType::Plugin).len(), names.len());
        assert!(scanner.addons(AddonType::Theme).is_empty());
    }

    #[tokio::test]
    async fn enumeration_failure_aborts_invocation() {
        let dir = TempDir::new().unwrap();
        let mut scanner = Scanner::builder(dir.path()).cms(FlakyCms).build().unwrap();

        let result = scanner.addon_analysis(AddonType::Plugin).await;
        assert!(matches!(result, Err(Error::Enumeration { .. })));
    }

    #[tokio::test]
    async fn core_failure_does_not_stop_addon_scan() {
        let dir = install_with(&["views"]);
        let scanner = Scanner::builder(dir.path()).cms(FlakyCms).build().unwrap();

        let result = scanner.scan().await.unwrap();
        assert!(result.core_failure.is_some());
        assert_eq!(result.core.version, "9.0");
        assert_eq!(result.plugins.len(), 1);
        assert!(result.themes.is_empty());
    }

    fn drupal_7_site(root: &Path) {
        write(root, "includes/bootstrap.inc", "<?php\ndefine('VERSION', '7.67');\n");
        write(
            root,
            "modules/views/views.info",
            "name = Views\ncore = 7.x\nversion = \"7.x-3.1\"\n",
        );
        write(
            root,
            "modules/node/node.info",
            "name = Node\ncore = 7.x\nversion = VERSION\n",
        );
        write(
            root,
            "themes/bartik/bartik.info",
            "name = Bartik\ncore = 7.x\nversion = \"7.x-1.0\"\n",
        );
    }

    fn drupal_for(server: &MockServer) -> DrupalCms {
        DrupalCms::builder()
            .site_url(server.uri())
            .release_site(format!("{}/release-history/drupal/", server.uri()))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn full_drupal_scan() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/release-history/drupal/7.x"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<project><releases><release><tag>7.78</tag></release></releases></project>",
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/project/views/releases"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<h2><a href="/project/views/releases/7.x-3.2">views 7.x-3.2</a></h2>
                   <time pubdate datetime="2021-01-01T00:00:00">2021-01-01</time>"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/project/bartik/releases"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        drupal_7_site(dir.path());

        let scanner = Scanner::builder(dir.path())
            .cms(drupal_for(&server))
            .build()
            .unwrap();
        let result = scanner.scan().await.unwrap();

        assert_eq!(result.core.version_major, "7");
        assert_eq!(result.core.version, "7.67");
        assert_eq!(result.core.last_version, "7.78");
        assert_eq!(result.core.status, AddonStatus::Outdated);

        let names: Vec<&str> = result.plugins.iter().map(|r| r.addon.name.as_str()).collect();
        assert_eq!(names, vec!["node", "views"]);

        let node = &result.plugins[0];
        assert!(node.is_complete());
        assert_eq!(node.addon.version, UNTRACKED_VERSION);
        assert_eq!(node.addon.status, AddonStatus::Untracked);

        let views = &result.plugins[1];
        assert!(views.is_complete());
        assert_eq!(views.addon.last_version, "7.x-3.2");
        assert_eq!(views.addon.last_release_date, "2021-01-01");
        assert_eq!(views.addon.status, AddonStatus::Outdated);
        assert_eq!(views.addon.link, format!("{}/project/views/releases", server.uri()));

        let bartik = &result.themes[0];
        assert_eq!(bartik.failure.as_ref().map(|f| f.stage), Some(Stage::LastVersion));
        assert!(!bartik.addon.notes.is_empty());
        assert_eq!(bartik.addon.version, "7.x-1.0");

        assert_eq!(result.outdated_count(), 2);
        assert_eq!(result.failed_count(), 1);
    }

    #[tokio::test]
    async fn drupal_8_addon_outdated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/release-history/drupal/8.x"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not xml at all"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/project/views/releases"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<h2><a href="/project/views/releases/7.x-3.2">views 7.x-3.2</a></h2>
                   <time pubdate datetime="2021-01-01T00:00:00">2021-01-01</time>"#,
            ))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "core/lib/Drupal.php",
            "<?php\nclass Drupal {\n  const VERSION = '8.9.0';\n}\n",
        );
        write(dir.path(), "modules/views/views.info.yml", "version: '7.x-3.1'\n");
        fs::create_dir_all(dir.path().join("themes")).unwrap();

        let scanner = Scanner::builder(dir.path())
            .cms(drupal_for(&server))
            .build()
            .unwrap();
        let result = scanner.scan().await.unwrap();

        assert_eq!(result.core.version_major, "8");
        assert!(result.core_failure.is_some());

        let views = &result.plugins[0].addon;
        assert_eq!(views.filename, "views.info.yml");
        assert_eq!(views.last_version, "7.x-3.2");
        assert_eq!(views.status, AddonStatus::Outdated);
        assert_eq!(views.link, format!("{}/project/views/releases", server.uri()));
    }

    #[tokio::test]
    async fn analyze_core_propagates_feed_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/release-history/drupal/7.x"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<project>"))
            .mount(&server)
            .await;

        let dir = TempDir::new().unwrap();
        drupal_7_site(dir.path());

        let mut scanner = Scanner::builder(dir.path())
            .cms(drupal_for(&server))
            .build()
            .unwrap();
        let result = scanner.analyze_core().await;

        assert!(matches!(result, Err(Error::FeedParse(_))));
        assert_eq!(scanner.core().version, "7.67");
        assert!(scanner.core().last_version.is_empty());
    }

    #[tokio::test]
    async fn core_without_marker_is_skipped() {
        let dir = TempDir::new().unwrap();
        let mut scanner = Scanner::new(dir.path()).unwrap();

        let core = scanner.analyze_core().await.unwrap();
        assert!(core.version_major.is_empty());
        assert!(core.version.is_empty());
        assert!(core.ignored_files().contains("CHANGELOG.txt"));
    }
}

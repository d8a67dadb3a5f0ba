//! Records produced by an audit: the core, its add-ons and their findings

use serde::Serialize;
use std::collections::BTreeSet;

/// Placeholder version meaning "this add-on's version is intentionally untracked"
///
/// Drupal ships core modules with `version = VERSION`; these have no
/// release page of their own and must not be looked up remotely.
pub const UNTRACKED_VERSION: &str = "VERSION";

/// Kind of add-on installed under a CMS
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AddonType {
    /// Plugin (a Drupal module)
    Plugin,
    /// Theme
    Theme,
}

impl AddonType {
    /// Both add-on kinds, in scan order
    pub const ALL: [AddonType; 2] = [AddonType::Plugin, AddonType::Theme];

    /// Plural label used in log banners
    pub fn plural(&self) -> &'static str {
        match self {
            Self::Plugin => "plugins",
            Self::Theme => "themes",
        }
    }
}

impl std::fmt::Display for AddonType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Plugin => write!(f, "Plugin"),
            Self::Theme => write!(f, "Theme"),
        }
    }
}

/// Outcome of comparing a local version with the latest published one
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AddonStatus {
    /// Latest version matches the local one
    UpToDate,
    /// No latest version could be determined
    #[default]
    Unknown,
    /// Version intentionally untracked, needs manual review
    Untracked,
    /// A different version has been published
    Outdated,
}

impl std::fmt::Display for AddonStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UpToDate => write!(f, "Up to date"),
            Self::Unknown => write!(f, "Unknown"),
            Self::Untracked => write!(f, "Untracked"),
            Self::Outdated => write!(f, "Outdated"),
        }
    }
}

/// A known vulnerability affecting the core or an add-on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Vulnerability {
    /// Advisory identifier (CVE or SA-CORE/SA-CONTRIB reference)
    pub id: String,
    /// Short description
    pub description: String,
}

/// The audited CMS core
#[derive(Debug, Clone, Default, Serialize)]
pub struct Core {
    /// Installed version
    pub version: String,
    /// Installed major version ("7", "8", or empty if unknown)
    pub version_major: String,
    /// Latest published version for that major branch
    pub last_version: String,
    /// Comparison of `version` with `last_version`
    pub status: AddonStatus,
    /// Known vulnerabilities
    pub vulnerabilities: Vec<Vulnerability>,
    #[serde(skip)]
    ignored_files: BTreeSet<String>,
}

impl Core {
    /// Create an empty core record with its alteration exclusions
    pub fn new<I, S>(ignored_files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ignored_files: ignored_files.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Paths excluded from core alteration checks
    pub fn ignored_files(&self) -> &BTreeSet<String> {
        &self.ignored_files
    }
}

/// An installed plugin or theme
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Addon {
    #[serde(rename = "type")]
    pub addon_type: AddonType,
    /// Machine name (directory name)
    pub name: String,
    /// File the local version is read from
    pub filename: String,
    /// Installed version
    pub version: String,
    /// Latest published version
    pub last_version: String,
    /// Publication date of the latest version
    pub last_release_date: String,
    /// Page the latest version was read from
    pub link: String,
    /// Free-form remarks for the reader of the report
    pub notes: String,
    pub status: AddonStatus,
    pub vulnerabilities: Vec<Vulnerability>,
    /// Files differing from the pristine release, relative to the add-on directory
    pub altered_files: Vec<String>,
}

impl Addon {
    /// Create a record with only its identity filled in
    pub fn new(
        addon_type: AddonType,
        name: impl Into<String>,
        filename: impl Into<String>,
    ) -> Self {
        Self {
            addon_type,
            name: name.into(),
            filename: filename.into(),
            version: String::new(),
            last_version: String::new(),
            last_release_date: String::new(),
            link: String::new(),
            notes: String::new(),
            status: AddonStatus::Unknown,
            vulnerabilities: Vec::new(),
            altered_files: Vec::new(),
        }
    }

    /// Whether the local version is the untracked placeholder
    pub fn is_untracked(&self) -> bool {
        self.version == UNTRACKED_VERSION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_addon_has_empty_defaults() {
        let addon = Addon::new(AddonType::Theme, "bartik", "bartik.info");
        assert_eq!(addon.name, "bartik");
        assert_eq!(addon.filename, "bartik.info");
        assert!(addon.version.is_empty());
        assert!(addon.last_version.is_empty());
        assert_eq!(addon.status, AddonStatus::Unknown);
    }

    #[test]
    fn untracked_placeholder() {
        let mut addon = Addon::new(AddonType::Plugin, "node", "node.info");
        assert!(!addon.is_untracked());
        addon.version = UNTRACKED_VERSION.to_string();
        assert!(addon.is_untracked());
    }

    #[test]
    fn core_keeps_ignored_files() {
        let core = Core::new(["README.txt", "modules"]);
        assert!(core.ignored_files().contains("modules"));
        assert_eq!(core.ignored_files().len(), 2);
    }

    #[test]
    fn addon_serializes_type_field() {
        let addon = Addon::new(AddonType::Plugin, "views", "views.info");
        let json = serde_json::to_value(&addon).unwrap();
        assert_eq!(json["type"], "plugin");
        assert_eq!(json["status"], "unknown");
    }
}

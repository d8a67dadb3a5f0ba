//! Drupal Audit - Drupal installation auditor
//!
//! Audits the core, modules and themes of a Drupal installation on disk:
//! installed versions, latest published versions, known vulnerabilities and
//! files altered from the pristine release.
//!
//! # Example
//!
//! ```no_run
//! use drupal_audit::{AddonType, Scanner};
//!
//! #[tokio::main]
//! async fn main() -> drupal_audit::Result<()> {
//!     let mut scanner = Scanner::new("/var/www/drupal")?;
//!     scanner.analyze_core().await?;
//!     for report in scanner.addon_analysis(AddonType::Plugin).await? {
//!         let addon = &report.addon;
//!         println!("{}: {} -> {}", addon.name, addon.version, addon.last_version);
//!     }
//!     Ok(())
//! }
//! ```

pub mod alteration;
pub mod catalog;
pub mod cms;
pub mod drupal;
pub mod error;
pub mod installation;
pub mod model;
pub mod output;
pub mod scanner;

pub use alteration::{AlterationChecker, PristineDirChecker, SkipAlteration};
pub use cms::CmsFamily;
pub use drupal::{DrupalCms, DrupalCmsBuilder};
pub use error::{Error, Result};
pub use installation::Installation;
pub use model::{Addon, AddonStatus, AddonType, Core, UNTRACKED_VERSION, Vulnerability};
pub use output::{OutputConfig, OutputFormat, OutputSort, output_scan};
pub use scanner::{AddonFailure, AddonReport, ScanResult, Scanner, ScannerBuilder, Stage};

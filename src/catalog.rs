//! Scraping of drupal.org project release pages
//!
//! The release listing has no API; the latest release is read from the
//! first release heading and the first publication timestamp on the page.
//! Both patterns are tied to the current markup, so any mismatch yields
//! `None` rather than an error.

use regex::Regex;
use std::sync::LazyLock;

/// First release heading: `<h2><a href="...">views 7.x-3.2</a></h2>`
static RELEASE_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<h2><a href="(.*?)">(.+?) (.+?)</a></h2>"#).expect("release heading regex")
});

/// First release timestamp: `<time pubdate datetime="...">2021-01-01</time>`
static RELEASE_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<time pubdate datetime="(.*?)">(.+?)</time>"#).expect("release date regex")
});

/// Latest release scraped from a project's release listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseInfo {
    /// Release version, e.g. `7.x-3.2`
    pub version: String,
    /// Human-readable publication date
    pub date: String,
}

/// Extract the latest release from a release listing page
///
/// Returns `None` unless both the version heading and the date element are
/// found; a page with only one of them is treated as unrecognised markup.
pub fn parse_release_page(html: &str) -> Option<ReleaseInfo> {
    let version = RELEASE_HEADING.captures(html)?.get(3)?.as_str();
    let date = RELEASE_DATE.captures(html)?.get(2)?.as_str();

    Some(ReleaseInfo {
        version: version.to_string(),
        date: date.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <div class="view-content">
          <h2><a href="/project/views/releases/7.x-3.24">views 7.x-3.24</a></h2>
          <time pubdate datetime="2020-02-06T15:21:10+00:00">6 February 2020</time>
          <h2><a href="/project/views/releases/7.x-3.23">views 7.x-3.23</a></h2>
          <time pubdate datetime="2019-05-29T10:02:13+00:00">29 May 2019</time>
        </div>
    "#;

    #[test]
    fn parses_first_release() {
        let info = parse_release_page(PAGE).unwrap();
        assert_eq!(info.version, "7.x-3.24");
        assert_eq!(info.date, "6 February 2020");
    }

    #[test]
    fn heading_without_date_is_ignored() {
        let html = r#"<h2><a href="/project/views/releases/7.x-3.24">views 7.x-3.24</a></h2>"#;
        assert_eq!(parse_release_page(html), None);
    }

    #[test]
    fn date_without_heading_is_ignored() {
        let html = r#"<time pubdate datetime="2020-02-06">6 February 2020</time>"#;
        assert_eq!(parse_release_page(html), None);
    }

    #[test]
    fn unrelated_markup() {
        assert_eq!(parse_release_page("<html><body>Page not found</body></html>"), None);
    }
}

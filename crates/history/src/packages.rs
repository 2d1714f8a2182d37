//! Dependency references declared in markup
//!
//! Legacy snippets pin libraries with attributes on `<script>` / `<link>`
//! tags:
//!
//! ```html
//! <script data-require="jquery@*" data-semver="2.1.0" src="..."></script>
//! ```
//!
//! The scan is a tolerant pattern match, not an HTML parser.

use once_cell::sync::Lazy;
use plunk_core::Tree;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Width each numeric version component is padded to
pub const PAD_WIDTH: usize = 5;

static MARKUP_FILE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\.html?$").expect("markup pattern compiles")
});

static DECLARATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"<(?:script|link) [^>]*?data-(semver|require)="([^"]*)"(?: [^>]*?data-(semver|require)="([^"]*)")?"#,
    )
    .expect("declaration pattern compiles")
});

static README: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"readme(.md|markdown)?$").expect("readme pattern compiles")
});

/// A library pinned by a snippet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRef {
    pub name: String,
    /// Zero-padded so versions sort lexically
    pub semver: String,
    #[serde(rename = "semverRange")]
    pub range: String,
}

/// Collect package references from every markup file in a tree
///
/// Later declarations of the same name replace earlier ones. The result is
/// sorted by name.
pub fn scan(tree: &Tree) -> Vec<PackageRef> {
    let mut found = BTreeMap::new();

    for (path, blob) in tree.files() {
        if !MARKUP_FILE.is_match(path) {
            continue;
        }
        for package in scan_markup(&blob.text()) {
            found.insert(package.name.clone(), package);
        }
    }

    found.into_values().collect()
}

/// Package references in one markup document, in order of appearance
pub fn scan_markup(markup: &str) -> Vec<PackageRef> {
    let mut packages = Vec::new();

    for caps in DECLARATION.captures_iter(markup) {
        let mut semver = None;
        let mut require = None;
        for (key, value) in [(1, 2), (3, 4)] {
            if let (Some(key), Some(value)) = (caps.get(key), caps.get(value)) {
                match key.as_str() {
                    "semver" => semver = Some(value.as_str()),
                    _ => require = Some(value.as_str()),
                }
            }
        }

        let (Some(require), Some(declared)) = (require, semver) else {
            continue;
        };
        let (name, range) = split_require(require);

        match pad_version(declared) {
            Some(padded) => packages.push(PackageRef {
                name: name.to_string(),
                semver: padded,
                range: range.to_string(),
            }),
            None => tracing::debug!(
                package = name,
                version = declared,
                "Dropping declaration with invalid version"
            ),
        }
    }

    packages
}

/// Split `name@range`; a missing range means any version
///
/// A leading `@` belongs to a scoped name.
fn split_require(require: &str) -> (&str, &str) {
    let search_from = usize::from(require.starts_with('@'));
    match require[search_from..].find('@') {
        Some(at) => {
            let at = at + search_from;
            let range = &require[at + 1..];
            (&require[..at], if range.is_empty() { "*" } else { range })
        }
        None => (require, "*"),
    }
}

/// Validate a version and zero-pad its numeric components
///
/// Accepts surrounding whitespace and a leading `v`. Pre-release tags are
/// kept; build metadata is dropped. Returns `None` for invalid versions.
pub fn pad_version(version: &str) -> Option<String> {
    let trimmed = version.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    let parsed = semver::Version::parse(trimmed).ok()?;

    let mut padded = format!(
        "{:0w$}.{:0w$}.{:0w$}",
        parsed.major,
        parsed.minor,
        parsed.patch,
        w = PAD_WIDTH
    );
    if !parsed.pre.is_empty() {
        padded.push('-');
        padded.push_str(parsed.pre.as_str());
    }
    Some(padded)
}

/// Content of the first file that looks like a readme
pub fn find_readme(tree: &Tree) -> Option<String> {
    tree.files()
        .find(|(path, _)| README.is_match(path))
        .map(|(_, blob)| blob.text().into_owned())
}

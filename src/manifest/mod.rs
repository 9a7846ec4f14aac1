//! Dependency manifest (pip-style requirements file) parsing and checks.
//!
//! One requirement per line, optionally pinned with `==` and optionally
//! restricted by an environment marker after `;`. Blank lines and `#`
//! comments only group entries into sections.

pub mod marker;
pub mod platform;
pub mod requirement;
pub mod validate;
pub mod version;

use std::path::Path;
use thiserror::Error;

pub use marker::Marker;
pub use platform::TargetPlatform;
pub use requirement::{normalize_name, Requirement, Specifier};
pub use validate::{validate, Issue, Report};
pub use version::Version;

#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Failed to read manifest: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid package name: {0}")]
    InvalidName(String),
    #[error("Invalid version specifier: {0}")]
    InvalidSpecifier(String),
    #[error("Invalid version: {0}")]
    InvalidVersion(String),
    #[error("Invalid environment marker: {0}")]
    InvalidMarker(String),
    #[error("Direct references are not supported: {0}")]
    DirectReference(String),
    #[error("Unknown platform `{0}`, expected os/machine such as linux/x86_64")]
    InvalidPlatform(String),
}

/// Cuts a trailing `#` comment, which must be preceded by whitespace.
fn strip_inline_comment(line: &str) -> &str {
    let mut previous_is_space = false;
    for (idx, c) in line.char_indices() {
        if c == '#' && previous_is_space {
            return line[..idx].trim_end();
        }
        previous_is_space = c.is_whitespace();
    }
    line
}

#[derive(Debug, Clone)]
pub struct ManifestEntry {
    pub line: usize,
    pub section: Option<String>,
    pub text: String,
    pub requirement: Requirement,
}

impl ManifestEntry {
    pub fn applies_to(&self, platform: &TargetPlatform) -> bool {
        self.requirement
            .marker
            .as_ref()
            .map_or(true, |marker| marker.evaluate(platform))
    }
}

#[derive(Debug, Clone)]
pub struct InvalidLine {
    pub line: usize,
    pub text: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub entries: Vec<ManifestEntry>,
    pub invalid: Vec<InvalidLine>,
    pub sections: Vec<String>,
}

impl Manifest {
    /// Never fails: lines that are not valid requirements are kept in `invalid`.
    pub fn parse(text: &str) -> Self {
        let mut manifest = Manifest::default();
        let mut section: Option<String> = None;
        let mut after_blank = true;

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();

            if line.is_empty() {
                after_blank = true;
                continue;
            }

            if let Some(comment) = line.strip_prefix('#') {
                // A comment opening a block names the section of the lines below it.
                let title = comment.trim();
                if after_blank && !title.is_empty() {
                    manifest.sections.push(title.to_string());
                    section = Some(title.to_string());
                }
                after_blank = false;
                continue;
            }
            after_blank = false;

            let content = strip_inline_comment(line);

            match content.parse::<Requirement>() {
                Ok(requirement) => manifest.entries.push(ManifestEntry {
                    line: idx + 1,
                    section: section.clone(),
                    text: content.to_string(),
                    requirement,
                }),
                Err(e) => manifest.invalid.push(InvalidLine {
                    line: idx + 1,
                    text: content.to_string(),
                    reason: e.to_string(),
                }),
            }
        }

        manifest
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, ManifestError> {
        let text = std::fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    pub fn applicable<'a>(&'a self, platform: &'a TargetPlatform) -> impl Iterator<Item = &'a ManifestEntry> + 'a {
        self.entries.iter().filter(move |entry| entry.applies_to(platform))
    }

    pub fn section_entries<'a>(&'a self, section: &'a str) -> impl Iterator<Item = &'a ManifestEntry> + 'a {
        self.entries
            .iter()
            .filter(move |entry| entry.section.as_deref() == Some(section))
    }
}

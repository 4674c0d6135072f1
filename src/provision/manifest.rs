//! Dependency manifest parsing.
//!
//! One requirement per line: a package name optionally followed by a version
//! constraint. `#` starts a comment; blank lines are ignored.
//!
//! ```text
//! axum >=0.7, <0.9
//! serde ==1.0.200
//! tracing
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use semver::VersionReq;
use thiserror::Error;

/// Errors raised while reading a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line {line}: invalid package name {text:?}")]
    InvalidName { line: usize, text: String },

    #[error("line {line}: invalid version constraint {constraint:?} for {name}: {source}")]
    InvalidConstraint {
        line: usize,
        name: PackageName,
        constraint: String,
        #[source]
        source: semver::Error,
    },

    #[error("line {line}: duplicate package {name} (first declared on line {first_line})")]
    Duplicate {
        name: PackageName,
        line: usize,
        first_line: usize,
    },
}

/// A normalized package name.
///
/// Comparison is case-insensitive and treats `_`, `.` and `-` as the same
/// separator, so `Typing_Extensions` and `typing-extensions` collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageName(String);

impl PackageName {
    pub fn new(raw: &str) -> Option<Self> {
        let mut chars = raw.chars();
        if !chars.next().is_some_and(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        if !raw.chars().all(is_name_char) {
            return None;
        }
        let normalized = raw
            .chars()
            .map(|c| match c {
                '_' | '.' => '-',
                c => c.to_ascii_lowercase(),
            })
            .collect();
        Some(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

/// A single (name, constraint) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub name: PackageName,
    pub constraint: VersionReq,
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.constraint == VersionReq::STAR {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} {}", self.name, self.constraint)
        }
    }
}

/// Ordered, duplicate-free list of requirements. Immutable once parsed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyManifest {
    requirements: Vec<Requirement>,
}

impl DependencyManifest {
    /// A manifest with no requirements; provisions a bare runtime.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Read and parse a manifest file.
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        text.parse()
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn len(&self) -> usize {
        self.requirements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }
}

impl FromStr for DependencyManifest {
    type Err = ManifestError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let mut requirements: Vec<Requirement> = Vec::new();
        let mut declared_on: Vec<usize> = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = idx + 1;
            let content = raw.split('#').next().unwrap_or("").trim();
            if content.is_empty() {
                continue;
            }

            let requirement = parse_line(line, content)?;
            if let Some(pos) = requirements.iter().position(|r| r.name == requirement.name) {
                return Err(ManifestError::Duplicate {
                    name: requirement.name,
                    line,
                    first_line: declared_on[pos],
                });
            }
            requirements.push(requirement);
            declared_on.push(line);
        }

        Ok(Self { requirements })
    }
}

fn parse_line(line: usize, content: &str) -> Result<Requirement, ManifestError> {
    let split = content.find(|c: char| !is_name_char(c)).unwrap_or(content.len());
    let (raw_name, rest) = content.split_at(split);

    let name = PackageName::new(raw_name).ok_or_else(|| ManifestError::InvalidName {
        line,
        text: content.to_string(),
    })?;

    let rest = rest.trim();
    let constraint_text = if rest.is_empty() {
        "*".to_string()
    } else {
        // `==` pins an exact version; semver spells that `=`.
        rest.replace("==", "=")
    };

    let constraint =
        VersionReq::parse(&constraint_text).map_err(|source| ManifestError::InvalidConstraint {
            line,
            name: name.clone(),
            constraint: rest.to_string(),
            source,
        })?;

    Ok(Requirement { name, constraint })
}

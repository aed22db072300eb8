//! Exclusion rules: which files never enter the vault
//!
//! A rule's syntax picks its matching mode:
//! ```text
//! *keep*      contains   (relative path contains "keep")
//! *.iso       suffix     (relative path ends with ".iso")
//! portable*   prefix     (relative path starts with "portable")
//! backup/     prefix     (directory rule — skips the subtree)
//! b?ckup.db   glob       (glob against the basename)
//! notes.txt   exact      (whole relative path or basename)
//! ```
//! The effective set is the built-in defaults ∪ the process-wide config list
//! ∪ the drive-local exclusion file, if present.

use std::path::Path;
use tracing::debug;

/// Drive-local exclusion file, one pattern per line, `#` comments.
pub const EXCLUDE_FILE: &str = ".shroud.exclude";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Prefix,
    Suffix,
    Contains,
    Glob,
}

#[derive(Debug, Clone)]
pub struct ExclusionRule {
    pattern: String,
    kind: MatchKind,
    glob: Option<glob::Pattern>,
}

impl ExclusionRule {
    /// Parse one pattern line. Empty lines and comments yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let (kind, pattern) = if line.starts_with('*') && line.ends_with('*') && line.len() > 1 {
            (MatchKind::Contains, &line[1..line.len() - 1])
        } else if let Some(rest) = line.strip_prefix('*') {
            (MatchKind::Suffix, rest)
        } else if let Some(rest) = line.strip_suffix('*') {
            (MatchKind::Prefix, rest)
        } else if let Some(rest) = line.strip_suffix('/') {
            (MatchKind::Prefix, rest)
        } else if line.contains(['*', '?', '[']) {
            (MatchKind::Glob, line)
        } else {
            (MatchKind::Exact, line)
        };

        let glob = match kind {
            MatchKind::Glob => glob::Pattern::new(pattern).ok(),
            _ => None,
        };

        Some(Self {
            pattern: pattern.to_string(),
            kind,
            glob,
        })
    }

    /// Match against a slash-normalized relative path and its basename.
    pub fn matches(&self, rel_path: &str, name: &str) -> bool {
        match self.kind {
            MatchKind::Exact => rel_path == self.pattern || name == self.pattern,
            MatchKind::Prefix => rel_path.starts_with(&self.pattern),
            MatchKind::Suffix => rel_path.ends_with(&self.pattern),
            MatchKind::Contains => rel_path.contains(&self.pattern),
            MatchKind::Glob => self.glob.as_ref().is_some_and(|g| g.matches(name)),
        }
    }

    pub fn kind(&self) -> MatchKind {
        self.kind
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    rules: Vec<ExclusionRule>,
}

impl ExclusionSet {
    pub fn from_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            rules: patterns
                .into_iter()
                .filter_map(|p| ExclusionRule::parse(p.as_ref()))
                .collect(),
        }
    }

    /// Defaults ∪ config patterns ∪ the drive-local `.shroud.exclude` file.
    pub fn load(drive_root: &Path, config_patterns: &[String]) -> Self {
        let mut patterns: Vec<String> = default_exclusions();
        patterns.extend(config_patterns.iter().cloned());

        if let Ok(text) = std::fs::read_to_string(drive_root.join(EXCLUDE_FILE)) {
            let before = patterns.len();
            patterns.extend(text.lines().map(str::to_string));
            debug!(
                drive = %drive_root.display(),
                added = patterns.len() - before,
                "loaded drive-local exclusions"
            );
        }

        Self::from_patterns(patterns)
    }

    pub fn matches(&self, rel_path: &str, name: &str) -> bool {
        self.rules.iter().any(|r| r.matches(rel_path, name))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Built-in patterns shielding OS litter and the tool's own artifacts.
pub fn default_exclusions() -> Vec<String> {
    [
        "shroud*",
        "System Volume Information/",
        "$RECYCLE.BIN/",
        ".Trash*",
        ".DS_Store",
        "Thumbs.db",
        "desktop.ini",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Write a commented template exclusion file onto the drive.
pub fn write_exclude_template(drive_root: &Path, patterns: &[String]) -> std::io::Result<()> {
    let mut content = String::from(
        "# shroud exclusions\n\
         # One pattern per line. Examples:\n\
         #   portable/*     exclude the portable folder\n\
         #   *.exe          exclude all exe files\n\
         #   *secret*       exclude anything containing 'secret'\n\
         #   backup/        exclude the backup directory\n\n",
    );
    for p in patterns {
        content.push_str(p);
        content.push('\n');
    }
    std::fs::write(drive_root.join(EXCLUDE_FILE), content)
}

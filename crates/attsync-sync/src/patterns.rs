//! Include/exclude file selection
//!
//! A file is tracked when it matches at least one include glob and no
//! exclude glob. Patterns are matched case-insensitively against both the
//! bare file name and the `/`-separated relative path, so `*.png` and
//! `ui/*.png` both work as expected. Editor and OS scratch files are never
//! tracked.

use glob::{MatchOptions, Pattern, PatternError};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Compiled include/exclude globs
#[derive(Debug, Clone)]
pub struct FilePatterns {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl FilePatterns {
    /// Compile the given glob lists
    ///
    /// # Errors
    /// Returns the first glob that fails to compile
    pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Result<Self, PatternError> {
        let compile = |list: &[S]| -> Result<Vec<Pattern>, PatternError> {
            list.iter().map(|p| Pattern::new(p.as_ref())).collect()
        };
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    /// Whether the file at `relative` (using `/` separators) is tracked
    pub fn matches(&self, relative: &str) -> bool {
        let name = relative.rsplit('/').next().unwrap_or(relative);
        if is_scratch_file(name) {
            return false;
        }

        let hit = |p: &Pattern| p.matches_with(name, MATCH_OPTIONS) || p.matches_with(relative, MATCH_OPTIONS);

        self.include.iter().any(hit) && !self.exclude.iter().any(hit)
    }
}

/// Office lock files, macOS resource forks and temp files
pub fn is_scratch_file(name: &str) -> bool {
    name.starts_with("~$") || name.starts_with("._") || name.ends_with(".tmp")
}

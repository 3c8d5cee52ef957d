//! Glob pattern matching utilities for path filtering
//!
//! Patterns are matched against root-relative paths with `/` separators.
//! A bare name without glob characters or slashes (`target`, `node_modules`)
//! matches any path component with that name.

use crate::error::ValidationError;
use globset::{Glob, GlobSet, GlobSetBuilder};

/// Compiled include/exclude filter. Excludes win over includes.
#[derive(Debug, Clone)]
pub struct PathFilter {
    include: Option<PatternSet>,
    exclude: Option<PatternSet>,
}

#[derive(Debug, Clone)]
struct PatternSet {
    globs: GlobSet,
    names: Vec<String>,
}

impl PatternSet {
    fn compile(patterns: &[String]) -> Result<Option<Self>, ValidationError> {
        if patterns.is_empty() {
            return Ok(None);
        }

        let mut builder = GlobSetBuilder::new();
        let mut names = Vec::new();
        for pattern in patterns {
            if is_bare_name(pattern) {
                names.push(pattern.clone());
                continue;
            }
            let glob = Glob::new(pattern)
                .map_err(|e| ValidationError::InvalidPattern(format!("{}: {}", pattern, e)))?;
            builder.add(glob);
        }
        let globs = builder
            .build()
            .map_err(|e| ValidationError::InvalidPattern(e.to_string()))?;

        Ok(Some(Self { globs, names }))
    }

    fn is_match(&self, relative_path: &str) -> bool {
        let path = relative_path.trim_start_matches('/');
        if path.split('/').any(|c| self.names.iter().any(|n| n == c)) {
            return true;
        }
        if self.globs.is_match(path) {
            return true;
        }
        // "lib/**" should also match "pkg/lib/x.rs"
        let mut rest = path;
        while let Some(idx) = rest.find('/') {
            rest = &rest[idx + 1..];
            if self.globs.is_match(rest) {
                return true;
            }
        }
        false
    }
}

fn is_bare_name(pattern: &str) -> bool {
    !pattern.contains(['*', '?', '[', '{', '/'])
}

impl PathFilter {
    /// Compile include and exclude patterns
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, ValidationError> {
        Ok(Self {
            include: PatternSet::compile(include)?,
            exclude: PatternSet::compile(exclude)?,
        })
    }

    /// Filter accepting every path
    pub fn allow_all() -> Self {
        Self {
            include: None,
            exclude: None,
        }
    }

    /// Whether a root-relative path should be indexed
    pub fn is_allowed(&self, relative_path: &str) -> bool {
        if let Some(exclude) = &self.exclude
            && exclude.is_match(relative_path)
        {
            return false;
        }
        match &self.include {
            Some(include) => include.is_match(relative_path),
            None => true,
        }
    }

    /// Whether a directory can be skipped entirely during the walk
    pub fn excludes_dir(&self, relative_dir: &str) -> bool {
        self.exclude
            .as_ref()
            .is_some_and(|exclude| exclude.is_match(relative_dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_matches_directory_glob() {
        let filter = PathFilter::new(&strings(&["lib/**"]), &[]).unwrap();

        assert!(filter.is_allowed("lib/utils.ts"));
        assert!(filter.is_allowed("pkg/lib/nested/file.rs"));
        assert!(!filter.is_allowed("src/main.rs"));
    }

    #[test]
    fn test_matches_extension_glob() {
        let filter = PathFilter::new(&strings(&["**/*.ts"]), &[]).unwrap();

        assert!(filter.is_allowed("src/main.ts"));
        assert!(filter.is_allowed("utils.ts"));
        assert!(!filter.is_allowed("src/main.rs"));
    }

    #[test]
    fn test_bare_name_matches_component() {
        let filter = PathFilter::new(&[], &strings(&["target", "node_modules"])).unwrap();

        assert!(!filter.is_allowed("target/debug/build.rs"));
        assert!(!filter.is_allowed("web/node_modules/react/index.js"));
        assert!(filter.is_allowed("src/targeting.rs"));
        assert!(filter.excludes_dir("target"));
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let filter =
            PathFilter::new(&strings(&["src/**"]), &strings(&["src/generated/**"])).unwrap();

        assert!(filter.is_allowed("src/lib.rs"));
        assert!(!filter.is_allowed("src/generated/api.rs"));
    }

    #[test]
    fn test_empty_patterns_allow_everything() {
        let filter = PathFilter::new(&[], &[]).unwrap();
        assert!(filter.is_allowed("any/path.rs"));
        assert!(PathFilter::allow_all().is_allowed("x"));
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let result = PathFilter::new(&strings(&["[invalid"]), &[]);
        assert!(matches!(result, Err(ValidationError::InvalidPattern(_))));
    }

    #[test]
    fn test_matches_with_leading_slash() {
        let filter = PathFilter::new(&strings(&["lib/**"]), &[]).unwrap();
        assert!(filter.is_allowed("/lib/file.rs"));
    }
}

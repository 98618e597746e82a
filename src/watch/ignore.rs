//! Ignore rules loaded from `.gitignore`-style files
//!
//! Rules are re-read for every decision, so editing an ignore file takes
//! effect on the next event or sync cycle without any invalidation.
//!
//! Pattern dialect:
//! - `*`, `?`, `[...]` never cross a `/`; `**` does
//! - a pattern without `/` matches a path component at any depth
//! - a trailing `/` only matches directories (everything beneath them)
//! - a leading `/` anchors the pattern to the ignore file's directory
//! - `#` lines are comments, `!` negations are not supported and skipped

use std::path::Path;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::config::ChronicleConfig;

/// Default ignore file name
pub const IGNORE_FILE_NAME: &str = ".gitignore";

/// A single compiled pattern
#[derive(Debug, Clone)]
pub struct IgnoreRule {
    pattern: String,
    matcher: GlobSet,
}

impl IgnoreRule {
    /// Compile a pattern line. Returns `None` for comments, negations and
    /// patterns that are not valid globs.
    pub fn parse(line: &str) -> Option<Self> {
        let pattern = line.trim();
        if pattern.is_empty() || pattern.starts_with('#') {
            return None;
        }
        if pattern.starts_with('!') {
            tracing::debug!("Negated ignore pattern not supported: {}", pattern);
            return None;
        }

        let dir_only = pattern.ends_with('/');
        let body = pattern.trim_end_matches('/');
        let anchored = body.starts_with('/') || body.contains('/');
        let body = body.trim_start_matches('/');
        if body.is_empty() {
            return None;
        }

        let base = if anchored {
            body.to_string()
        } else {
            format!("**/{}", body)
        };

        let mut variants = vec![format!("{}/**", base)];
        if !dir_only {
            variants.push(base);
        }

        let mut builder = GlobSetBuilder::new();
        for variant in &variants {
            match GlobBuilder::new(variant).literal_separator(true).build() {
                Ok(glob) => {
                    builder.add(glob);
                }
                Err(e) => {
                    tracing::warn!("Skipping invalid ignore pattern '{}': {}", pattern, e);
                    return None;
                }
            }
        }

        let matcher = match builder.build() {
            Ok(set) => set,
            Err(e) => {
                tracing::warn!("Skipping invalid ignore pattern '{}': {}", pattern, e);
                return None;
            }
        };

        Some(Self {
            pattern: pattern.to_string(),
            matcher,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches(&self, relative_path: &str) -> bool {
        self.matcher.is_match(relative_path)
    }
}

/// Ordered set of ignore rules from one directory
#[derive(Debug, Clone, Default)]
pub struct IgnoreRuleSet {
    rules: Vec<IgnoreRule>,
}

impl IgnoreRuleSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from pattern lines; blank lines, comments and invalid globs are dropped
    pub fn from_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = patterns
            .into_iter()
            .filter_map(|line| IgnoreRule::parse(line.as_ref()))
            .collect();
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(IgnoreRule::pattern)
    }

    /// First rule matching the path, if any
    pub fn matching_rule(&self, relative_path: &str) -> Option<&IgnoreRule> {
        self.rules.iter().find(|rule| rule.matches(relative_path))
    }
}

/// Read `dir/.gitignore`. A missing or unreadable file means "no rules".
pub fn load_ignore_rules(dir: &Path) -> IgnoreRuleSet {
    load_ignore_rules_from(dir, IGNORE_FILE_NAME)
}

/// Read the named ignore file in `dir`
pub fn load_ignore_rules_from(dir: &Path, file_name: &str) -> IgnoreRuleSet {
    let path = dir.join(file_name);
    match std::fs::read_to_string(&path) {
        Ok(raw) => IgnoreRuleSet::from_patterns(raw.lines()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => IgnoreRuleSet::empty(),
        Err(e) => {
            tracing::warn!("Could not read {}: {}", path.display(), e);
            IgnoreRuleSet::empty()
        }
    }
}

/// True on the first matching rule; an empty set never ignores
pub fn is_ignored(relative_path: &str, rules: &IgnoreRuleSet) -> bool {
    rules.matching_rule(relative_path).is_some()
}

/// Paths that are never synced regardless of ignore files
pub fn is_builtin_excluded(relative_path: &str) -> bool {
    relative_path
        .split('/')
        .any(|component| component == ".git")
}

/// Layered decision: root rules against the root-relative path, then the
/// containing directory's rules against the path relative to that directory.
pub fn is_path_ignored(root: &Path, relative_path: &str, file_name: &str) -> bool {
    if is_builtin_excluded(relative_path) {
        return true;
    }

    if is_ignored(relative_path, &load_ignore_rules_from(root, file_name)) {
        return true;
    }

    match relative_path.rsplit_once('/') {
        Some((parent, leaf)) => {
            let rules = load_ignore_rules_from(&root.join(parent), file_name);
            is_ignored(leaf, &rules)
        }
        None => false,
    }
}

/// Sync eligibility of root-relative paths for one session
#[derive(Debug, Clone)]
pub struct PathFilter {
    ignore_file: String,
    log_file: String,
}

impl PathFilter {
    pub fn new(ignore_file: impl Into<String>, log_file: impl Into<String>) -> Self {
        Self {
            ignore_file: ignore_file.into(),
            log_file: log_file.into().trim_start_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &ChronicleConfig) -> Self {
        Self::new(config.ignore_file.clone(), config.log_file.clone())
    }

    pub fn ignore_file(&self) -> &str {
        &self.ignore_file
    }

    pub fn log_file(&self) -> &str {
        &self.log_file
    }

    /// Never synced from disk: `.git` contents and the remote change log,
    /// which only passes write.
    pub fn is_reserved(&self, relative_path: &str) -> bool {
        is_builtin_excluded(relative_path) || relative_path == self.log_file
    }

    /// Watch-side check against the root ignore file only
    pub fn is_ignored_at_root(&self, root: &Path, relative_path: &str) -> bool {
        self.is_reserved(relative_path)
            || is_ignored(relative_path, &load_ignore_rules_from(root, &self.ignore_file))
    }

    /// Full layered check used by tree walks and sync passes
    pub fn is_ignored(&self, root: &Path, relative_path: &str) -> bool {
        self.is_reserved(relative_path) || is_path_ignored(root, relative_path, &self.ignore_file)
    }
}

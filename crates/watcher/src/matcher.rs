//! Ignore matching for watch resources
//!
//! Two sources of rules, checked in order:
//! 1. Implicit rules (editor swap/backup files, IDE metadata) - always active,
//!    never part of a resource spec
//! 2. Explicit rules from the resource spec: a base path plus optional globs
//!    evaluated relative to it

use crate::error::WatchError;
use filewatch_core::IgnoreDef;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Path, PathBuf};

/// Compiled set of explicit ignore rules for one watcher
///
/// Immutable once built, so it can be shared freely across tasks.
#[derive(Debug, Clone, Default)]
pub struct IgnoreMatcher {
    rules: Vec<CompiledRule>,
}

#[derive(Debug, Clone)]
enum CompiledRule {
    /// Everything under the base path
    Recursive(PathBuf),
    /// Paths under the base whose remainder matches a glob
    Patterns { base: PathBuf, globs: Gitignore },
}

impl IgnoreMatcher {
    /// Compile explicit rules
    ///
    /// Malformed patterns are returned as errors and skipped; every other
    /// pattern (including the rest of the same rule) still applies.
    pub fn compile(rules: &[IgnoreDef]) -> (Self, Vec<WatchError>) {
        let mut compiled = Vec::with_capacity(rules.len());
        let mut errors = Vec::new();

        for rule in rules {
            // Event paths are absolute; an empty base would match all of them
            if !rule.base_path.is_absolute() {
                errors.push(WatchError::InvalidIgnore {
                    base: rule.base_path.clone(),
                    pattern: rule.patterns.join(", "),
                    reason: "base path must be absolute".to_string(),
                });
                continue;
            }

            if rule.patterns.is_empty() {
                compiled.push(CompiledRule::Recursive(rule.base_path.clone()));
                continue;
            }

            let mut builder = GitignoreBuilder::new(&rule.base_path);
            let mut added = 0;
            for pattern in &rule.patterns {
                match builder.add_line(None, &anchor_pattern(pattern)) {
                    Ok(_) => added += 1,
                    Err(e) => errors.push(WatchError::InvalidIgnore {
                        base: rule.base_path.clone(),
                        pattern: pattern.clone(),
                        reason: e.to_string(),
                    }),
                }
            }

            if added == 0 {
                continue;
            }

            match builder.build() {
                Ok(globs) => compiled.push(CompiledRule::Patterns {
                    base: rule.base_path.clone(),
                    globs,
                }),
                Err(e) => errors.push(WatchError::InvalidIgnore {
                    base: rule.base_path.clone(),
                    pattern: rule.patterns.join(", "),
                    reason: e.to_string(),
                }),
            }
        }

        (Self { rules: compiled }, errors)
    }

    /// Check if a changed path should be dropped
    pub fn is_ignored(&self, path: &Path) -> bool {
        is_ephemeral(path) || self.matches_explicit(path)
    }

    /// Number of compiled explicit rules
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    fn matches_explicit(&self, path: &Path) -> bool {
        self.rules.iter().any(|rule| match rule {
            CompiledRule::Recursive(base) => path.starts_with(base),
            CompiledRule::Patterns { base, globs } => match path.strip_prefix(base) {
                Ok(rel) if !rel.as_os_str().is_empty() => {
                    globs.matched_path_or_any_parents(rel, false).is_ignore()
                }
                _ => false,
            },
        })
    }
}

/// Stateless form of the matcher: implicit rules plus `rules`
///
/// Compiles the rules on every call; watchers hold an `IgnoreMatcher`
/// instead.
pub fn is_ignored(path: &Path, rules: &[IgnoreDef]) -> bool {
    IgnoreMatcher::compile(rules).0.is_ignored(path)
}

/// Anchor a pattern to the rule's base path
///
/// Gitignore semantics let a slash-free pattern match at any depth; a
/// leading `/` restricts it to the base, so `*.log` only matches files
/// directly under the base while `**/*.log` matches at any depth.
fn anchor_pattern(pattern: &str) -> String {
    let (negate, body) = match pattern.strip_prefix('!') {
        Some(rest) => ("!", rest),
        None => ("", pattern),
    };

    if body.starts_with('/') {
        format!("{negate}{body}")
    } else {
        format!("{negate}/{body}")
    }
}

/// Check if path is filesystem noise from editors, IDEs, or the OS
///
/// Covers: Vim, Emacs, Kate, JetBrains, MacOS/Windows system files
pub fn is_ephemeral(path: &Path) -> bool {
    // JetBrains project metadata directory
    if path.components().any(|c| c.as_os_str() == ".idea") {
        return true;
    }

    let filename = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name,
        None => return false,
    };

    // Vim swap files and the write-test file Vim creates before saving
    if filename.ends_with(".swp")
        || filename.ends_with(".swo")
        || filename.ends_with(".swn")
        || filename.ends_with(".swx")
        || filename == "4913"
    {
        return true;
    }

    // Vim/Emacs backup files (~)
    if filename.ends_with('~') {
        return true;
    }

    // Emacs auto-save (#*#) and lock (.#*) files
    if (filename.len() > 1 && filename.starts_with('#') && filename.ends_with('#'))
        || filename.starts_with(".#")
    {
        return true;
    }

    // Kate swap files
    if filename.starts_with('.') && filename.ends_with(".kate-swp") {
        return true;
    }

    // JetBrains safe-write temp files
    if filename.ends_with("___jb_tmp___") || filename.ends_with("___jb_old___") {
        return true;
    }

    // MacOS/Windows system files
    filename == ".DS_Store" || filename == "Thumbs.db"
}

//! Extraction of import references from source text.
//!
//! Statements are captured with regexes rather than a full parser; anything the patterns do not
//! recognize simply contributes no edge. Star imports carry no resolvable target and are skipped
//! wholesale.

use once_cell::sync::Lazy;
use regex::Regex;

/// Matches `import a.b as c, d` statements, capturing the name list.
pub static RE_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^[ \t]*import[ \t]+(?P<names>[\w.]+(?:[ \t]+as[ \t]+\w+)?(?:[ \t]*,[ \t]*[\w.]+(?:[ \t]+as[ \t]+\w+)?)*)",
    )
    .unwrap()
});

/// Matches `from ..pkg.sub import x as y, z` statements, capturing the leading dots, the dotted
/// base and the imported name list (parenthesized lists may span lines).
pub static RE_FROM_IMPORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^[ \t]*from[ \t]+(?P<dots>\.*)(?P<base>[\w.]*)[ \t]+import[ \t]+(?:\((?P<group>[^)]*)\)|(?P<names>[^\n#;]+))",
    )
    .unwrap()
});

/// A single reference recovered from an import statement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportRef {
    /// Dotted module path named by the statement; empty for `from . import x` forms.
    pub base: String,
    /// Trailing symbol of `from base import identifier` forms.
    pub identifier: Option<String>,
    /// Number of leading dots; `0` means absolute.
    pub level: usize,
}

impl ImportRef {
    pub fn is_relative(&self) -> bool {
        self.level > 0
    }

    /// Builds the dotted candidate name this reference resolves against, given the dotted package
    /// containing the importing file (empty string for top-level files).
    ///
    /// Relative references start from the containing package and ascend one package per dot beyond
    /// the first; a reference that ascends past the repository root yields no candidate.
    pub fn candidate(&self, package: &str) -> Option<String> {
        let mut parts: Vec<&str> = Vec::new();
        if self.level == 0 {
            if !self.base.is_empty() {
                parts.extend(self.base.split('.'));
            }
        } else {
            let mut pkg: Vec<&str> =
                if package.is_empty() { Vec::new() } else { package.split('.').collect() };
            let ascend = self.level - 1;
            if ascend > pkg.len() {
                return None;
            }
            pkg.truncate(pkg.len() - ascend);
            parts = pkg;
            if !self.base.is_empty() {
                parts.extend(self.base.split('.'));
            }
        }
        if let Some(identifier) = &self.identifier {
            parts.push(identifier);
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("."))
        }
    }
}

/// Import references scraped from one source file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceImports {
    pub refs: Vec<ImportRef>,
}

impl SourceImports {
    /// Extracts every import reference from `content`.
    pub fn parse(content: &str) -> Self {
        let mut refs = Vec::new();

        for cap in RE_IMPORT.captures_iter(content) {
            for name in split_names(&cap["names"]) {
                refs.push(ImportRef { base: name.to_string(), identifier: None, level: 0 });
            }
        }

        for cap in RE_FROM_IMPORT.captures_iter(content) {
            let level = cap["dots"].len();
            let base = &cap["base"];
            let names = cap.name("group").or_else(|| cap.name("names")).map_or("", |m| m.as_str());
            for name in split_names(names) {
                if name == "*" {
                    continue;
                }
                refs.push(ImportRef {
                    base: base.to_string(),
                    identifier: Some(name.to_string()),
                    level,
                });
            }
        }

        Self { refs }
    }
}

/// Splits a captured name list on commas, keeping only the name before any `as` alias and
/// dropping anything that is not a plain dotted name (stray comment fragments and the like).
fn split_names(list: &str) -> impl Iterator<Item = &str> {
    list.split(',')
        .filter_map(|item| item.split_whitespace().next())
        .filter(|name| {
            *name == "*" || name.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.')
        })
        .filter(|name| !name.is_empty())
}

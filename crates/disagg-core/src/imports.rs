// Import consolidation for generated files.
// Scans each contributing rule's source file for top-level import lines;
// imports of the source framework (and of this translator's own support
// package) are dropped by whole-word match, as are relative imports.

use indexmap::IndexSet;
use regex::Regex;

/// Package roots whose imports never survive translation: the source
/// simulation framework and the translator support package.
pub const DEFAULT_EXCLUDED_ROOTS: &[&str] = &["pram", "disagg"];

/// Line-level import scanner.
#[derive(Debug, Clone)]
pub struct ImportExtractor {
    excluded: Regex,
    relative: Regex,
}

impl ImportExtractor {
    /// Build an extractor excluding the given package roots. The match
    /// is word-bounded, so a package merely containing an excluded root
    /// as a substring is kept.
    pub fn new(excluded_roots: &[&str]) -> Self {
        let alternation = excluded_roots
            .iter()
            .map(|r| regex::escape(r))
            .collect::<Vec<_>>()
            .join("|");
        Self {
            excluded: Regex::new(&format!(r"\b(?:{alternation})\b")).expect("valid exclusion regex"),
            relative: Regex::new(r"^from\s+\.").expect("valid relative-import regex"),
        }
    }

    /// Top-level `import`/`from ... import` lines of `source`, minus
    /// excluded-package and relative imports, first-seen order, no
    /// duplicates. Conditional or otherwise nested imports are not
    /// scanned.
    pub fn extract(&self, source: &str) -> IndexSet<String> {
        source
            .lines()
            .filter(|line| line.starts_with("from") || line.starts_with("import"))
            .filter(|line| !self.excluded.is_match(line))
            .filter(|line| !self.relative.is_match(line))
            .map(|line| line.trim().to_string())
            .collect()
    }
}

impl Default for ImportExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_EXCLUDED_ROOTS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_top_level_imports_only() {
        let extractor = ImportExtractor::default();
        let src = "import random\n\
                   x = 1\n\
                   if True:\n\
                   \x20   import os\n\
                   from math import sqrt\n";
        let imports = extractor.extract(src);
        assert!(imports.contains("import random"));
        assert!(imports.contains("from math import sqrt"));
        assert!(!imports.iter().any(|i| i.contains("os")));
    }

    #[test]
    fn test_excluded_and_relative_imports_dropped() {
        let extractor = ImportExtractor::new(&["excludedpkg", "pram"]);
        let src = "from .relative import x\n\
                   import excludedpkg.sub\n\
                   import supramolecular\n";
        let imports = extractor.extract(src);
        assert_eq!(imports.len(), 1);
        // look-alike package survives the whole-word match
        assert!(imports.contains("import supramolecular"));
    }

    #[test]
    fn test_framework_imports_dropped_by_default() {
        let extractor = ImportExtractor::default();
        let src = "from pram.entity import GroupQry, GroupSplitSpec\n\
                   from pram.rule import Rule\n\
                   import random\n";
        let imports = extractor.extract(src);
        assert_eq!(imports.len(), 1);
        assert!(imports.contains("import random"));
    }

    #[test]
    fn test_duplicates_collapse() {
        let extractor = ImportExtractor::default();
        let a = extractor.extract("import random\nimport numpy\n");
        let b = extractor.extract("import random\n");
        let mut merged = a;
        merged.extend(b);
        assert_eq!(merged.len(), 2);
    }
}

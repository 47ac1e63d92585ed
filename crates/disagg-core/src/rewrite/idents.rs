// Canonical identifier resolution.
// Attribute, relation, and rule names in the source model are arbitrary
// strings; generated code stores them as plain instance fields, so every
// constant key is mapped onto a valid identifier at translation time.
// The generated files ship a helper with identical semantics for keys
// that only exist at runtime.

/// The relocation sentinel: a field keyed by this string means "current
/// location" and moves the agent instead of setting an attribute.
pub const RELOCATION_KEY: &str = "@";

/// Reserved identifier the relocation sentinel resolves to.
pub const RELOCATION_IDENT: &str = "_at_sign";

const RESERVED_WORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class", "continue",
    "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if", "import",
    "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return", "try", "while",
    "with", "yield",
];

/// Map an arbitrary string key to a canonical identifier.
///
/// Deterministic: the same input always yields the same output. No
/// cross-call collision tracking is performed; two distinct keys that
/// sanitize to the same identifier are the caller's problem, matching
/// the behavior of the helper the generated code uses.
pub fn resolve(name: &str) -> String {
    if name == RELOCATION_KEY {
        return RELOCATION_IDENT.to_string();
    }

    let mut out = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            out.extend(c.to_lowercase());
        } else if c.is_whitespace() || c == '-' {
            out.push('_');
        }
        // anything else is dropped
    }

    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    if RESERVED_WORDS.contains(&out.as_str()) {
        out.push('_');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relocation_sentinel() {
        assert_eq!(resolve("@"), "_at_sign");
    }

    #[test]
    fn test_plain_names_pass_through() {
        assert_eq!(resolve("flu"), "flu");
        assert_eq!(resolve("income_level"), "income_level");
    }

    #[test]
    fn test_sanitization() {
        assert_eq!(resolve("Flu Stage"), "flu_stage");
        assert_eq!(resolve("is-sick?"), "is_sick");
        assert_eq!(resolve("  padded "), "padded");
        assert_eq!(resolve("90th percentile"), "_90th_percentile");
        assert_eq!(resolve(""), "_");
    }

    #[test]
    fn test_reserved_words_suffixed() {
        assert_eq!(resolve("class"), "class_");
        assert_eq!(resolve("lambda"), "lambda_");
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(resolve("a b"), resolve("a b"));
        // distinct keys may collide; no namespace is maintained
        assert_eq!(resolve("a b"), resolve("a-b"));
    }
}

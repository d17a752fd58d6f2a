/// Escape LIKE wildcards so they match the character and not the wildcard.
///
/// `%`, `_` and `\` are prefixed with a backslash; sequences that are already
/// escaped pass through untouched, so re-escaping escaped input is a no-op.
/// With `translate_human_wildcards` set, human-entered glyphs are first turned
/// into their SQL equivalents: `*` becomes `%` and `?` becomes `_`.
pub fn escape_wildcard_string(input: &str, translate_human_wildcards: bool) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(&next) = chars.peek() {
                    if next == '%' || next == '_' || next == '\\' {
                        // already escaped, keep as-is
                        out.push('\\');
                        out.push(next);
                        chars.next();
                        continue;
                    }
                }
                out.push_str("\\\\");
            }
            '%' => out.push_str("\\%"),
            '_' => out.push_str("\\_"),
            '*' if translate_human_wildcards => out.push('%'),
            '?' if translate_human_wildcards => out.push('_'),
            _ => out.push(c),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escapes_sql_wildcards() {
        assert_eq!(escape_wildcard_string("50% of_users", false), "50\\% of\\_users");
    }

    #[test]
    fn test_translates_human_wildcards() {
        assert_eq!(escape_wildcard_string("jo*n d?e", true), "jo%n d_e");
        // untranslated glyphs stay literal
        assert_eq!(escape_wildcard_string("jo*n", false), "jo*n");
    }

    #[test]
    fn test_idempotent_on_escaped_input() {
        let once = escape_wildcard_string("100% \\ done_", false);
        let twice = escape_wildcard_string(&once, false);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_trailing_backslash() {
        let once = escape_wildcard_string("path\\", false);
        assert_eq!(once, "path\\\\");
        assert_eq!(escape_wildcard_string(&once, false), once);
    }
}

//! Shell-style wildcard matching for table names and storage paths.

use log::warn;
use regex::Regex;

/// A compiled, case-sensitive shell-style pattern (`*`, `?`, `[seq]`, `[!seq]`).
#[derive(Debug, Clone)]
pub struct Glob {
    regex: Regex,
}

impl Glob {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(&translate(pattern, false)).map(|regex| Self { regex })
    }

    /// Like [`Glob::new`], but `*` and `?` never cross a `/`.
    pub fn path(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(&translate(pattern, true)).map(|regex| Self { regex })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

fn translate(pattern: &str, within_segment: bool) -> String {
    let (any, one) = if within_segment {
        ("[^/]*", "[^/]")
    } else {
        (".*", ".")
    };
    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::from("^");
    let mut i = 0;

    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(any),
            '?' => out.push_str(one),
            '[' => {
                let negated = chars.get(i + 1) == Some(&'!');
                let start = if negated { i + 2 } else { i + 1 };
                // the first member is literal even when it is `]`
                let close = chars
                    .iter()
                    .skip(start + 1)
                    .position(|c| *c == ']')
                    .map(|offset| start + 1 + offset);

                match close {
                    Some(end) if start < chars.len() => {
                        out.push('[');
                        if negated {
                            out.push('^');
                        }
                        for c in &chars[start..end] {
                            if matches!(c, '\\' | '[' | ']' | '^' | '&' | '~') {
                                out.push('\\');
                            }
                            out.push(*c);
                        }
                        out.push(']');
                        i = end;
                    }
                    _ => out.push_str("\\["),
                }
            }
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }

    out.push('$');
    out
}

pub fn fnmatch(text: &str, pattern: &str) -> bool {
    match Glob::new(pattern) {
        Ok(glob) => glob.is_match(text),
        Err(e) => {
            warn!("Ignoring invalid pattern `{pattern}`: {e}");
            false
        }
    }
}

/// Returns the members of `existing` matching `pattern`, keeping their order.
pub fn expand_table_globs(existing: &[String], pattern: &str) -> Vec<String> {
    let glob = match Glob::new(pattern) {
        Ok(glob) => glob,
        Err(e) => {
            warn!("Ignoring invalid table pattern `{pattern}`: {e}");
            return Vec::new();
        }
    };

    existing
        .iter()
        .filter(|table| glob.is_match(table))
        .cloned()
        .collect()
}

/// Splits `schema.table` into its parts; unqualified names have no schema.
pub fn parse_table(name: &str) -> (Option<&str>, &str) {
    match name.split_once('.') {
        Some((schema, table)) => (Some(schema), table),
        None => (None, name),
    }
}

/// Prefixes an unqualified table pattern with the default schema.
pub fn qualify(pattern: &str, default_schema: &str) -> String {
    if pattern.contains('.') {
        pattern.to_string()
    } else {
        format!("{default_schema}.{pattern}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn star_matches_schema_members() {
        let existing = tables(&["public.orders", "public.secret_keys", "other.orders"]);
        assert_eq!(
            expand_table_globs(&existing, "public.*"),
            tables(&["public.orders", "public.secret_keys"])
        );
    }

    #[test]
    fn dot_is_literal() {
        assert!(fnmatch("public.orders", "public.orders"));
        assert!(!fnmatch("publicXorders", "public.orders"));
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert!(!fnmatch("public.Orders", "public.orders"));
    }

    #[test]
    fn question_mark_and_classes() {
        assert!(fnmatch("public.t1", "public.t?"));
        assert!(fnmatch("public.t1", "public.t[0-9]"));
        assert!(!fnmatch("public.tx", "public.t[!a-z]"));
        assert!(fnmatch("public.t[", "public.t["));
    }

    #[test]
    fn leading_bracket_in_class_is_literal() {
        assert!(fnmatch("a]", "a[]]"));
        assert!(fnmatch("ay", "a[!]x]"));
        assert!(!fnmatch("a]", "a[!]x]"));
        assert!(!fnmatch("ax", "a[!]x]"));
        assert!(fnmatch("a^", "a[^]"));
    }

    #[test]
    fn path_globs_stay_within_one_segment() {
        let glob = Glob::path("backups/public.sale/*").unwrap();
        assert!(glob.is_match("backups/public.sale/2024-01-04"));
        assert!(!glob.is_match("backups/public.sale/2024-01-04/public.store"));
        assert!(!Glob::path("a/?").unwrap().is_match("a//"));

        assert!(Glob::new("backups/*").unwrap().is_match("backups/a/b"));
    }

    #[test]
    fn qualifies_unqualified_patterns() {
        assert_eq!(qualify("store", "public"), "public.store");
        assert_eq!(qualify("sales.store", "public"), "sales.store");
        assert_eq!(parse_table("public.store"), (Some("public"), "store"));
        assert_eq!(parse_table("store"), (None, "store"));
    }
}

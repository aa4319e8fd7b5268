//! File-path include/exclude pattern matching, with an in-memory form and a
//! SQL `LIKE ... ESCAPE '\'` form guaranteed to agree on every input.

use gitmem_types::ScopeConfig;
use regex_lite::Regex;

/// Strips a leading `./` or `/`, the only normalization patterns receive.
pub fn normalize(path: &str) -> String {
    path.strip_prefix("./")
        .or_else(|| path.strip_prefix('/'))
        .unwrap_or(path)
        .to_string()
}

/// True iff `path` matches `pattern` under the scope semantics: no `*` means
/// prefix match, any `*` means wildcard match with `*` as "any substring".
pub fn matches_pattern(path: &str, pattern: &str) -> bool {
    let path = normalize(path);
    let pattern = normalize(pattern);
    if !pattern.contains('*') {
        return path.starts_with(&pattern);
    }
    let regex = wildcard_regex(&pattern);
    regex.is_match(&path)
}

fn wildcard_regex(pattern: &str) -> Regex {
    let mut out = String::with_capacity(pattern.len() * 2 + 2);
    out.push('^');
    for c in pattern.chars() {
        match c {
            '*' => out.push_str(".*"),
            other => out.push_str(&regex_lite::escape(&other.to_string())),
        }
    }
    out.push('$');
    Regex::new(&out).expect("wildcard patterns always produce valid regex")
}

/// Builds the SQL `LIKE` pattern (for use with `ESCAPE '\'`) equivalent to
/// `matches_pattern` for the same input pattern.
pub fn to_like_pattern(pattern: &str) -> String {
    let pattern = normalize(pattern);
    let has_wildcard = pattern.contains('*');
    let mut out = String::with_capacity(pattern.len() + 1);
    for c in pattern.chars() {
        match c {
            '*' => out.push('%'),
            '%' => out.push_str("\\%"),
            '_' => out.push_str("\\_"),
            '\\' => out.push_str("\\\\"),
            other => out.push(other),
        }
    }
    if !has_wildcard {
        out.push('%');
    }
    out
}

/// True iff `path` is within `scope`: matches at least one include pattern
/// (or the include list is empty, meaning "all files") and no exclude
/// pattern.
pub fn matches_scope(path: &str, scope: &ScopeConfig) -> bool {
    let included = scope.include.is_empty() || scope.include.iter().any(|p| matches_pattern(path, p));
    if !included {
        return false;
    }
    !scope.exclude.iter().any(|p| matches_pattern(path, p))
}

/// Merges a config-file default scope with CLI-supplied overrides.
/// `all == true` clears both lists outright. A non-empty CLI include
/// replaces the config include; CLI excludes append to config excludes.
/// Final lists are deduplicated, order-preserving.
pub fn merge_scope(
    config: &ScopeConfig,
    cli_include: &[String],
    cli_exclude: &[String],
    all: bool,
) -> ScopeConfig {
    if all {
        return ScopeConfig::default();
    }
    let include = if cli_include.is_empty() {
        config.include.clone()
    } else {
        cli_include.to_vec()
    };
    let mut exclude = config.exclude.clone();
    exclude.extend(cli_exclude.iter().cloned());

    ScopeConfig {
        include: dedupe(include),
        exclude: dedupe(exclude),
    }
}

fn dedupe(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items.into_iter().filter(|i| seen.insert(i.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(include: &[&str], exclude: &[&str]) -> ScopeConfig {
        ScopeConfig {
            include: include.iter().map(|s| s.to_string()).collect(),
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn prefix_pattern_matches_any_suffix() {
        assert!(matches_pattern("src/app.ts", "src/"));
        assert!(!matches_pattern("lib/app.ts", "src/"));
    }

    #[test]
    fn wildcard_pattern_matches_any_substring() {
        assert!(matches_pattern("src/a.test.ts", "*.test.*"));
        assert!(!matches_pattern("src/a.ts", "*.test.*"));
    }

    #[test]
    fn scope_equivalence_scenario() {
        let s = scope(&["src/"], &["*.test.*"]);
        let files = ["src/a.ts", "src/a.test.ts", "lib/b.ts"];
        let matched: Vec<_> = files.iter().filter(|f| matches_scope(f, &s)).collect();
        assert_eq!(matched, vec![&"src/a.ts"]);
    }

    #[test]
    fn sql_like_form_agrees_with_in_memory_form() {
        let cases = [
            ("src/", "src/app.ts", true),
            ("src/", "lib/app.ts", false),
            ("*.test.*", "src/a.test.ts", true),
            ("*.test.*", "src/a.ts", false),
        ];
        for (pattern, path, expected) in cases {
            assert_eq!(matches_pattern(path, pattern), expected);
            let like = to_like_pattern(pattern);
            assert_eq!(like_matches(path, &like), expected, "pattern={pattern} path={path}");
        }
    }

    /// A tiny reference `LIKE ... ESCAPE '\'` evaluator used only to check
    /// `to_like_pattern` against `matches_pattern` in tests; the real
    /// matching happens inside SQLite in production.
    fn like_matches(path: &str, like: &str) -> bool {
        let mut regex = String::from("^");
        let mut chars = like.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        regex.push_str(&regex_lite::escape(&escaped.to_string()));
                    }
                }
                '%' => regex.push_str(".*"),
                '_' => regex.push('.'),
                other => regex.push_str(&regex_lite::escape(&other.to_string())),
            }
        }
        regex.push('$');
        Regex::new(&regex).unwrap().is_match(path)
    }

    #[test]
    fn merge_scope_all_clears_everything() {
        let cfg = scope(&["src/"], &["*.test.*"]);
        let merged = merge_scope(&cfg, &["lib/".into()], &[], true);
        assert!(merged.is_empty());
    }

    #[test]
    fn merge_scope_cli_include_replaces_config_include() {
        let cfg = scope(&["src/"], &[]);
        let merged = merge_scope(&cfg, &["lib/".to_string()], &[], false);
        assert_eq!(merged.include, vec!["lib/".to_string()]);
    }

    #[test]
    fn merge_scope_cli_exclude_appends() {
        let cfg = scope(&[], &["*.test.*".into()]);
        let merged = merge_scope(&cfg, &[], &["*.snap.*".to_string()], false);
        assert_eq!(merged.exclude, vec!["*.test.*".to_string(), "*.snap.*".to_string()]);
    }
}

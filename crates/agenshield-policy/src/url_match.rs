//! URL glob matching.
//!
//! Patterns are normalised (trimmed, trailing `/` stripped, `https://`
//! prepended when schemeless) and compiled to case-insensitive regexes:
//! `**` crosses path segments, `*` stays within one (except in final
//! position, where it is greedy), `?` matches a single character. A pattern
//! that does not end in `*` also matches any deeper path under it.

use regex::Regex;

/// Normalise a pattern: trim, strip trailing `/`, default the scheme.
fn normalize_pattern(pattern: &str) -> String {
    let mut p = pattern.trim().to_string();
    while p.len() > 1 && p.ends_with('/') && !p.ends_with("//") {
        p.pop();
    }
    if !p.contains("://") {
        p = format!("https://{}", p);
    }
    p
}

/// Normalise a target URL to `{scheme}://{host}{path}{search}` with the
/// scheme and host lowercased and any trailing path slash stripped.
pub fn normalize_target(url: &str) -> String {
    let t = url.trim();
    let (scheme, rest) = match t.find("://") {
        Some(idx) => (t[..idx].to_lowercase(), &t[idx + 3..]),
        None => ("https".to_string(), t),
    };
    let (authority_path, search) = match rest.find('?') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };
    let (host, path) = match authority_path.find('/') {
        Some(idx) => (&authority_path[..idx], &authority_path[idx..]),
        None => (authority_path, ""),
    };
    let mut path = path.to_string();
    while path.len() > 1 && path.ends_with('/') {
        path.pop();
    }
    if path == "/" {
        path.clear();
    }
    format!("{}://{}{}{}", scheme, host.to_lowercase(), path, search)
}

/// Compile a normalised glob to an anchored, case-insensitive regex.
fn glob_to_regex(glob: &str) -> Option<Regex> {
    let mut re = String::with_capacity(glob.len() * 2 + 8);
    re.push_str("(?i)^");
    let chars: Vec<char> = glob.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => {
                if i + 1 < chars.len() && chars[i + 1] == '*' {
                    re.push_str(".*");
                    i += 1;
                } else if i + 1 == chars.len() {
                    // Trailing single star is greedy: `host/path/*` covers
                    // everything under the prefix.
                    re.push_str(".*");
                } else {
                    re.push_str("[^/]*");
                }
            }
            '?' => re.push('.'),
            c if "\\.+()[]{}|^$".contains(c) => {
                re.push('\\');
                re.push(c);
            }
            c => re.push(c),
        }
        i += 1;
    }
    re.push('$');
    Regex::new(&re).ok()
}

/// Test a URL pattern against a target URL.
pub fn url_matches(pattern: &str, target: &str) -> bool {
    // A bare wildcard matches any URL regardless of scheme.
    if matches!(pattern.trim(), "*" | "**") {
        return true;
    }
    let pattern = normalize_pattern(pattern);
    let target = normalize_target(target);

    if let Some(re) = glob_to_regex(&pattern) {
        if re.is_match(&target) {
            return true;
        }
    }
    // Patterns without a trailing wildcard implicitly cover deeper paths.
    if !pattern.ends_with('*') {
        if let Some(re) = glob_to_regex(&format!("{}/**", pattern)) {
            if re.is_match(&target) {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_targets() {
        assert_eq!(
            normalize_target("HTTPS://API.Example.com/v1/"),
            "https://api.example.com/v1"
        );
        assert_eq!(
            normalize_target("api.example.com/v1?x=1"),
            "https://api.example.com/v1?x=1"
        );
        assert_eq!(normalize_target("example.com/"), "https://example.com");
    }

    #[test]
    fn trailing_star_crosses_segments() {
        assert!(url_matches(
            "api.example.com/*",
            "https://api.example.com/v1/users"
        ));
        assert!(!url_matches("api.example.com/*", "https://other.com/x"));
    }

    #[test]
    fn bare_host_covers_subpaths() {
        assert!(url_matches("api.example.com", "https://api.example.com"));
        assert!(url_matches(
            "api.example.com",
            "https://api.example.com/v2/anything"
        ));
        assert!(!url_matches("api.example.com", "https://api.example.org"));
    }

    #[test]
    fn interior_star_stays_in_segment() {
        assert!(url_matches(
            "api.example.com/*/users",
            "https://api.example.com/v1/users"
        ));
        assert!(!url_matches(
            "api.example.com/*/users",
            "https://api.example.com/v1/extra/users"
        ));
    }

    #[test]
    fn double_star_crosses_segments() {
        assert!(url_matches(
            "api.example.com/**/users",
            "https://api.example.com/v1/extra/users"
        ));
    }

    #[test]
    fn question_mark_single_char() {
        assert!(url_matches("api.example.com/v?", "https://api.example.com/v1"));
        assert!(!url_matches(
            "api.example.com/v?",
            "https://api.example.com/v10"
        ));
    }

    #[test]
    fn case_insensitive() {
        assert!(url_matches("API.EXAMPLE.COM/*", "https://api.example.com/x"));
    }

    #[test]
    fn scheme_in_pattern_respected() {
        assert!(url_matches("http://plain.example.com", "http://plain.example.com/x"));
        assert!(!url_matches(
            "http://plain.example.com",
            "https://plain.example.com/x"
        ));
    }

    #[test]
    fn query_matching() {
        assert!(url_matches(
            "api.example.com/v1**",
            "https://api.example.com/v1/users?page=2"
        ));
    }
}

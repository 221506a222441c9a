//! Command pattern matching.
//!
//! Targets and patterns are lowercased. `*` matches anything. A pattern
//! ending in `:*` matches any invocation of the command **with arguments**
//! (`git:*` matches `git push` but not the bare `git`); an exact pattern
//! matches by equality only. When either side names the command by absolute
//! path, the basename form is also considered, so `curl:*` catches
//! `/usr/bin/curl https://x` and `/usr/bin/curl:*` catches `curl https://x`.
//! `sudo` invocations are matched verbatim - the path that follows `sudo`
//! is never rewritten.

/// Candidate forms of a command line: as given, and with an absolute first
/// token reduced to its basename.
fn target_candidates(target: &str) -> Vec<String> {
    let t = target.trim().to_lowercase();
    let mut out = vec![t.clone()];
    let first = t.split_whitespace().next().unwrap_or("");
    if first.starts_with('/') && first != "sudo" {
        if let Some(base) = first.rsplit('/').next() {
            if !base.is_empty() && base != first {
                let rest = &t[first.len()..];
                out.push(format!("{}{}", base, rest));
            }
        }
    }
    out
}

/// Candidate forms of a pattern: as given, and with an absolute command part
/// reduced to its basename (preserving a `:*` suffix).
fn pattern_candidates(pattern: &str) -> Vec<String> {
    let p = pattern.trim().to_lowercase();
    let mut out = vec![p.clone()];
    let (head, suffix) = match p.strip_suffix(":*") {
        Some(head) => (head, ":*"),
        None => (p.as_str(), ""),
    };
    let first = head.split_whitespace().next().unwrap_or("");
    if first.starts_with('/') && first != "sudo" {
        if let Some(base) = first.rsplit('/').next() {
            if !base.is_empty() && base != first {
                let rest = &head[first.len()..];
                out.push(format!("{}{}{}", base, rest, suffix));
            }
        }
    }
    out
}

/// One pattern form against one target form.
fn matches_one(pattern: &str, target: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix(":*") {
        // Requires at least one argument after the command.
        return target.starts_with(&format!("{} ", prefix));
    }
    pattern == target
}

/// Test a command pattern against a command line.
pub fn command_matches(pattern: &str, target: &str) -> bool {
    let targets = target_candidates(target);
    for p in pattern_candidates(pattern) {
        for t in &targets {
            if matches_one(&p, t) {
                return true;
            }
        }
    }
    false
}

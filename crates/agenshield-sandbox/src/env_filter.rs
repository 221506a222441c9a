//! Base environment allowlist for wrapped child processes.
//!
//! The child starts from a filtered copy of the caller's environment: only
//! allowlisted variables survive, per-policy extensions widen the list, and
//! proxy variables plus injected secrets are applied after filtering so they
//! always win.

use std::collections::BTreeMap;

/// Exact variable names that pass the filter.
pub const BASE_ENV_EXACT: &[&str] = &[
    "HOME",
    "USER",
    "LOGNAME",
    "PATH",
    "SHELL",
    "TMPDIR",
    "TERM",
    "COLORTERM",
    "LANG",
    "XPC_FLAGS",
    "XPC_SERVICE_NAME",
    "__CF_USER_TEXT_ENCODING",
    "SHLVL",
    "NVM_DIR",
    "HOMEBREW_PREFIX",
    "HOMEBREW_CELLAR",
    "HOMEBREW_REPOSITORY",
    "SSH_AUTH_SOCK",
    "NODE_OPTIONS",
];

/// Prefix patterns (`X*`) that pass the filter.
pub const BASE_ENV_PREFIXES: &[&str] = &["LC_", "AGENSHIELD_"];

fn base_allowed(key: &str) -> bool {
    BASE_ENV_EXACT.contains(&key) || BASE_ENV_PREFIXES.iter().any(|p| key.starts_with(p))
}

/// Filter `env` through the base allowlist plus `extra_allow` entries
/// (exact names, or prefixes when ending in `*`).
pub fn filter_env(
    env: impl IntoIterator<Item = (String, String)>,
    extra_allow: &[String],
) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for (key, value) in env {
        let extra = extra_allow.iter().any(|pat| match pat.strip_suffix('*') {
            Some(prefix) => key.starts_with(prefix),
            None => key == *pat,
        });
        if base_allowed(&key) || extra {
            out.insert(key, value);
        }
    }
    out
}

/// Build the final child environment: filtered base, then proxy variables,
/// then injected secrets. Later layers override earlier ones.
pub fn compose_child_env(
    env: impl IntoIterator<Item = (String, String)>,
    extra_allow: &[String],
    proxy_vars: &BTreeMap<String, String>,
    secrets: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut out = filter_env(env, extra_allow);
    for (k, v) in proxy_vars {
        out.insert(k.clone(), v.clone());
    }
    for (k, v) in secrets {
        out.insert(k.clone(), v.clone());
    }
    out
}

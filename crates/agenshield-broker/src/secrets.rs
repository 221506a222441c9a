//! Broker-side secret resolver.
//!
//! Holds the last `secrets_sync` bundle behind a lock-guarded `Arc`: a sync
//! replaces the whole bundle atomically, concurrent execs see either the
//! old or the new bindings in their entirety. Nothing here ever touches
//! disk, and only secret *names* are reported outward.

use agenshield_core::protocol::{BindingTarget, SecretsSyncPayload};
use agenshield_policy::command_match::command_matches;
use agenshield_policy::url_match::url_matches;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Flags whose value occupies the next argv slot - skipped when looking for
/// the URL in a curl/wget command line.
const VALUE_FLAGS: &[&str] = &[
    "-X",
    "--request",
    "-H",
    "--header",
    "-d",
    "--data",
    "--data-raw",
    "--data-binary",
    "--data-urlencode",
    "-o",
    "--output",
    "-u",
    "--user",
    "-A",
    "--user-agent",
    "-e",
    "--referer",
    "-b",
    "--cookie",
    "-c",
    "--cookie-jar",
    "--connect-timeout",
    "--max-time",
    "-w",
    "--write-out",
    "-T",
    "--upload-file",
    "--resolve",
    "--cacert",
    "--cert",
    "--key",
];

/// First non-flag argument of a curl/wget argv - the request URL.
pub fn extract_url_argument(args: &[String]) -> Option<&str> {
    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if VALUE_FLAGS.contains(&arg.as_str()) {
            skip_next = true;
            continue;
        }
        if arg.starts_with('-') {
            // Unknown flag: `--flag=value` carries its value inline, a bare
            // flag is assumed boolean.
            continue;
        }
        return Some(arg);
    }
    None
}

/// Commands whose first URL argument participates in url-target bindings.
fn is_url_command(command: &str) -> bool {
    let base = command.rsplit('/').next().unwrap_or(command);
    matches!(base, "curl" | "wget")
}

/// In-memory binding of pushed secrets to matched exec requests.
#[derive(Default)]
pub struct SecretResolver {
    bundle: RwLock<Option<Arc<SecretsSyncPayload>>>,
}

impl SecretResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a pushed bundle atomically.
    pub fn replace(&self, payload: SecretsSyncPayload) {
        let mut guard = self.bundle.write().unwrap_or_else(|p| p.into_inner());
        *guard = Some(Arc::new(payload));
    }

    fn snapshot(&self) -> Option<Arc<SecretsSyncPayload>> {
        self.bundle
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Current bundle version, if any bundle was pushed.
    pub fn version(&self) -> Option<u64> {
        self.snapshot().map(|b| b.version)
    }

    /// Look up one global secret by name (the secret_inject path).
    pub fn global_secret(&self, name: &str) -> Option<String> {
        self.snapshot()?.global_secrets.get(name).cloned()
    }

    /// Environment to merge into an exec: global secrets first, then every
    /// matching binding in push order (later bindings win on collision).
    pub fn resolve_for_exec(&self, command: &str, args: &[String]) -> BTreeMap<String, String> {
        let Some(bundle) = self.snapshot() else {
            return BTreeMap::new();
        };
        let mut merged = bundle.global_secrets.clone();

        let command_line = if args.is_empty() {
            command.to_string()
        } else {
            format!("{} {}", command, args.join(" "))
        };
        let url_arg = if is_url_command(command) {
            extract_url_argument(args)
        } else {
            None
        };

        for binding in &bundle.policy_bindings {
            let hit = match binding.target {
                BindingTarget::Url => url_arg
                    .map(|url| binding.patterns.iter().any(|p| url_matches(p, url)))
                    .unwrap_or(false),
                BindingTarget::Command => binding
                    .patterns
                    .iter()
                    .any(|p| command_matches(p, &command_line)),
            };
            if hit {
                for (k, v) in &binding.secrets {
                    merged.insert(k.clone(), v.clone());
                }
            }
        }
        merged
    }
}

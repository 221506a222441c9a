//! Sandboxed child spawn for wrapped commands.
//!
//! Composes `sandbox-exec -f <profile.sb> <real> <args>` with the filtered
//! environment (base allowlist + policy extensions), injects the proxy
//! variables after filtering, and layers injected secrets last so they
//! bypass the allowlist.

use agenshield_core::config::BrokerConfig;
use agenshield_sandbox::env_filter::compose_child_env;
use agenshield_sandbox::profile::{HostPaths, ProfileCache};
use agenshield_sandbox::spawn::{run_with_deadline, ExecOutcome};
use agenshield_sandbox::SandboxConfig;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

/// Proxy variables pointing wrapped tools at the broker's HTTP fallback.
pub fn proxy_vars(config: &BrokerConfig) -> BTreeMap<String, String> {
    let proxy = format!("http://{}:{}", config.http_host, config.http_port);
    [
        ("HTTP_PROXY".to_string(), proxy.clone()),
        ("HTTPS_PROXY".to_string(), proxy.clone()),
        ("http_proxy".to_string(), proxy.clone()),
        ("https_proxy".to_string(), proxy),
        ("NO_PROXY".to_string(), "127.0.0.1,localhost".to_string()),
    ]
    .into()
}

/// The argv that actually runs: `sandbox-exec -f <profile> <real> <args>`.
pub fn wrap_argv(profile: &Path, real_executable: &str, args: &[String]) -> Vec<String> {
    let mut argv = vec![
        "sandbox-exec".to_string(),
        "-f".to_string(),
        profile.to_string_lossy().to_string(),
        real_executable.to_string(),
    ];
    argv.extend(args.iter().cloned());
    argv
}

/// Spawn `real_executable` under the seatbelt profile for `sandbox_config`,
/// with the composed environment, and supervise it to `timeout`.
pub fn spawn_sandboxed(
    broker_config: &BrokerConfig,
    sandbox_config: &SandboxConfig,
    real_executable: &str,
    args: &[String],
    extra_env_allow: &[String],
    secrets: &BTreeMap<String, String>,
    timeout: Duration,
) -> Result<ExecOutcome> {
    let cache = ProfileCache::new(&broker_config.profile_dir)?;
    let profile = cache
        .ensure(sandbox_config, &HostPaths::from_env())
        .context("Materialize seatbelt profile")?;

    let argv = wrap_argv(&profile, real_executable, args);
    let env = compose_child_env(
        std::env::vars(),
        extra_env_allow,
        &proxy_vars(broker_config),
        secrets,
    );

    let mut cmd = Command::new(&argv[0]);
    cmd.args(&argv[1..]);
    cmd.env_clear();
    cmd.envs(&env);
    agenshield_sandbox::spawn::harden(&mut cmd);

    tracing::debug!(
        executable = %real_executable,
        profile = %profile.display(),
        "spawning sandboxed child"
    );
    run_with_deadline(cmd, None, timeout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_argv_shape() {
        let argv = wrap_argv(
            Path::new("/var/run/agenshield/profiles/sb-abc.sb"),
            "/usr/bin/curl",
            &["-s".to_string(), "https://x".to_string()],
        );
        assert_eq!(
            argv,
            vec![
                "sandbox-exec",
                "-f",
                "/var/run/agenshield/profiles/sb-abc.sb",
                "/usr/bin/curl",
                "-s",
                "https://x",
            ]
        );
    }

    #[test]
    fn proxy_vars_point_at_fallback() {
        let mut config = BrokerConfig::from_env();
        config.http_host = "127.0.0.1".into();
        config.http_port = 5201;
        let vars = proxy_vars(&config);
        assert_eq!(vars["HTTP_PROXY"], "http://127.0.0.1:5201");
        assert_eq!(vars["NO_PROXY"], "127.0.0.1,localhost");
    }
}

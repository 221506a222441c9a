//! Wrapper entry point.
//!
//! Installed as a symlink per proxied command (`$agentHome/bin/curl` →
//! `shield-exec`), so argv[0] names the command being wrapped. The request
//! is proxied through the broker, which enforces policy and injects
//! secrets. When the broker is unreachable and fail-open is configured,
//! the command runs locally under a network-denying seatbelt profile
//! instead of silently escaping the sandbox.

use agenshield_core::config::env_keys::{broker as broker_keys, interceptor as intercept_keys};
use agenshield_core::config::{env_bool, BrokerConfig};
use agenshield_core::observability::init_tracing;
use agenshield_interceptor::client::{BrokerClient, RpcFailure};
use agenshield_interceptor::exec::spawn_sandboxed;
use agenshield_sandbox::SandboxConfig;
use anyhow::Result;
use std::io::Write;
use std::time::Duration;

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("shield-exec: {:#}", e);
            let code = e
                .downcast_ref::<RpcFailure>()
                .map(|f| f.code as i32)
                .unwrap_or(1);
            std::process::exit(code);
        }
    }
}

/// The wrapped command name: argv[0]'s basename, unless invoked directly as
/// `shield-exec <command> [args...]`.
fn wrapped_command(argv: &[String]) -> Option<(String, Vec<String>)> {
    let arg0 = argv.first()?;
    let base = arg0.rsplit('/').next().unwrap_or(arg0).to_string();
    if base == "shield-exec" {
        let command = argv.get(1)?.clone();
        Some((command, argv[2..].to_vec()))
    } else {
        Some((base, argv[1..].to_vec()))
    }
}

fn run() -> Result<i32> {
    let argv: Vec<String> = std::env::args().collect();
    let (command, args) = wrapped_command(&argv)
        .ok_or_else(|| anyhow::anyhow!("usage: shield-exec <command> [args...]"))?;

    if !env_bool(intercept_keys::AGENSHIELD_INTERCEPT_EXEC, &[], true) {
        // Interception disabled: run sandboxed locally, never bare.
        return run_local_fallback(&command, &args);
    }

    let client = BrokerClient::from_env();
    match client.exec(&command, &args) {
        Ok(result) => {
            print!("{}", result.stdout);
            eprint!("{}", result.stderr);
            std::io::stdout().flush()?;
            std::io::stderr().flush()?;
            Ok(result.exit_code)
        }
        Err(e) if e.downcast_ref::<RpcFailure>().is_some() => Err(e),
        Err(transport) => {
            // Broker unreachable. Fail-open means a locally sandboxed run
            // with the network denied; fail-closed means refusal.
            if env_bool(broker_keys::AGENSHIELD_FAIL_OPEN, &[], true) {
                tracing::warn!(
                    error = %format!("{:#}", transport),
                    command = %command,
                    "broker unreachable, running under local deny-network profile"
                );
                run_local_fallback(&command, &args)
            } else {
                Err(transport)
            }
        }
    }
}

fn run_local_fallback(command: &str, args: &[String]) -> Result<i32> {
    let broker_config = BrokerConfig::from_env();
    let sandbox_config = SandboxConfig::default();
    let timeout = Duration::from_secs(broker_config.op_timeout_secs);
    let outcome = spawn_sandboxed(
        &broker_config,
        &sandbox_config,
        command,
        args,
        &[],
        &Default::default(),
        timeout,
    )?;
    print!("{}", outcome.stdout);
    eprint!("{}", outcome.stderr);
    std::io::stdout().flush()?;
    std::io::stderr().flush()?;
    Ok(outcome.exit_code)
}

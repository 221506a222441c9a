//! Socket client used by the shell-script wrapper fallback:
//! `shield-client exec <name> [args...]` routes a command through the
//! broker and mirrors its stdout/stderr/exit code.

use agenshield_core::observability::init_tracing;
use agenshield_interceptor::client::{BrokerClient, RpcFailure};
use anyhow::Result;
use std::io::Write;

fn main() {
    init_tracing();
    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(args) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("shield-client: {:#}", e);
            let code = e
                .downcast_ref::<RpcFailure>()
                .map(|f| f.code as i32)
                .unwrap_or(1);
            std::process::exit(code);
        }
    }
}

fn run(args: Vec<String>) -> Result<i32> {
    let mut args = args.into_iter();
    let subcommand = args.next().unwrap_or_default();
    let client = BrokerClient::from_env();

    match subcommand.as_str() {
        "exec" => {
            let command = args
                .next()
                .ok_or_else(|| anyhow::anyhow!("usage: shield-client exec <command> [args...]"))?;
            let rest: Vec<String> = args.collect();
            let result = client.exec(&command, &rest)?;
            print!("{}", result.stdout);
            eprint!("{}", result.stderr);
            std::io::stdout().flush()?;
            std::io::stderr().flush()?;
            Ok(result.exit_code)
        }
        "check" => {
            let operation = args
                .next()
                .ok_or_else(|| anyhow::anyhow!("usage: shield-client check <operation> <target>"))?;
            let target = args
                .next()
                .ok_or_else(|| anyhow::anyhow!("usage: shield-client check <operation> <target>"))?;
            let allowed = client.policy_check(&operation, &target)?;
            println!("{}", serde_json::json!({ "allowed": allowed }));
            Ok(if allowed { 0 } else { 1 })
        }
        "secret" => {
            let name = args
                .next()
                .ok_or_else(|| anyhow::anyhow!("usage: shield-client secret <name>"))?;
            let value = client.secret_inject(&name)?;
            println!("{}", value);
            Ok(0)
        }
        "ping" => {
            let result = client.call("ping", serde_json::json!({}))?;
            println!("{}", result);
            Ok(0)
        }
        other => {
            anyhow::bail!(
                "unknown subcommand '{}' (expected exec | check | secret | ping)",
                other
            );
        }
    }
}

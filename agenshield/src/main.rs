mod cli;

use agenshield_core::config::{BrokerConfig, DaemonConfig};
use agenshield_core::observability::init_tracing;
use agenshield_core::protocol::OperationKind;
use agenshield_policy::{store, PolicyEngine};
use agenshield_sandbox::profile::ProfileCache;
use agenshield_sandbox::wrappers::WrapperManager;
use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::time::Duration;

fn main() {
    init_tracing();
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        // Fatal start-up and command errors: one diagnostic line, non-zero
        // exit.
        eprintln!("agenshield: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Broker => {
            let config = BrokerConfig::from_env();
            tracing::info!(
                socket = %config.socket_path.display(),
                http = %format!("{}:{}", config.http_host, config.http_port),
                "starting broker"
            );
            agenshield_broker::Broker::new(config)?.run()
        }
        Commands::Daemon => {
            let config = DaemonConfig::from_env();
            let daemon = agenshield_daemon::Daemon::new(config)?;
            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?
                .block_on(daemon.run())
        }
        Commands::Check { operation, target } => {
            let config = BrokerConfig::from_env();
            let policies = store::load_policies(&config.policies_path)?;
            let engine = PolicyEngine::new(policies, config.fail_open);
            let op = OperationKind::from_method(&operation)
                .ok_or_else(|| anyhow::anyhow!("unknown operation: {}", operation))?;
            let decision = engine.evaluate(op, &target);
            println!(
                "{}",
                serde_json::json!({
                    "allowed": decision.allowed,
                    "policyId": decision.policy_id,
                    "policyName": decision.policy_name,
                    "requiresApproval": decision.requires_approval,
                })
            );
            if !decision.allowed {
                std::process::exit(1);
            }
            Ok(())
        }
        Commands::Wrappers { verify } => {
            let config = BrokerConfig::from_env();
            let manager = WrapperManager::new(config.agent_home.join("bin"));
            if verify {
                let bad = manager.verify(&[]);
                if bad.is_empty() {
                    println!("all wrappers healthy");
                    return Ok(());
                }
                for (name, state) in &bad {
                    println!("{}: {:?}", name, state);
                }
                std::process::exit(1);
            }
            manager.install_all(&[])?;
            println!("wrappers installed under {}", manager.bin_dir().display());
            Ok(())
        }
        Commands::CleanProfiles { max_age_hours } => {
            let config = BrokerConfig::from_env();
            let cache = ProfileCache::new(&config.profile_dir)?;
            let removed = cache.cleanup(Duration::from_secs(max_age_hours * 3600))?;
            println!("removed {} stale profiles", removed);
            Ok(())
        }
    }
}

//! Propagation check command
//!
//! Only queries DNS, so no API key is needed.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Subcommand};
use colored::Colorize;
use opusdns::config::parse_resolver;
use opusdns::{HickoryTxtLookup, OpusDnsError, PropagationVerifier, Quorum};
use tokio_util::sync::CancellationToken;

use super::{cancel_on_ctrl_c, GlobalOptions};

/// DNS propagation commands
#[derive(Args)]
pub struct PropagationCommand {
    #[command(subcommand)]
    pub command: PropagationSubcommand,
}

#[derive(Subcommand)]
pub enum PropagationSubcommand {
    /// Poll resolvers until a TXT value is visible
    Wait(WaitCommand),
}

#[derive(Args)]
pub struct WaitCommand {
    /// Fully qualified record name
    pub fqdn: String,

    /// Expected TXT value, with or without quotes
    pub value: String,

    /// Resolver to query, repeatable (default: configured resolvers)
    #[arg(long = "resolver", value_parser = parse_resolver_arg)]
    pub resolvers: Vec<SocketAddr>,

    /// any: one resolver suffices; all: every resolver in the same round
    #[arg(long, value_parser = parse_quorum_arg)]
    pub quorum: Option<Quorum>,

    /// Seconds between polling rounds
    #[arg(long)]
    pub interval: Option<f64>,

    /// Give up after this many seconds
    #[arg(long)]
    pub timeout: Option<f64>,
}

fn parse_resolver_arg(value: &str) -> Result<SocketAddr, String> {
    parse_resolver(value).map_err(|e| e.to_string())
}

fn parse_quorum_arg(value: &str) -> Result<Quorum, String> {
    value.parse().map_err(|e: OpusDnsError| e.to_string())
}

fn seconds(value: f64, flag: &str) -> anyhow::Result<Duration> {
    Duration::try_from_secs_f64(value).with_context(|| format!("Invalid --{} value {}", flag, value))
}

impl PropagationCommand {
    pub fn execute(self, global: &GlobalOptions) -> anyhow::Result<()> {
        match self.command {
            PropagationSubcommand::Wait(cmd) => execute_wait(cmd, global),
        }
    }
}

fn execute_wait(cmd: WaitCommand, global: &GlobalOptions) -> anyhow::Result<()> {
    let mut config = global.client_config()?.propagation;
    if !cmd.resolvers.is_empty() {
        config.resolvers = cmd.resolvers.clone();
    }
    if let Some(quorum) = cmd.quorum {
        config.quorum = quorum;
    }
    if let Some(interval) = cmd.interval {
        config.interval = seconds(interval, "interval")?;
    }
    if let Some(timeout) = cmd.timeout {
        config.timeout = seconds(timeout, "timeout")?;
    }

    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let lookup = Arc::new(HickoryTxtLookup::new(config.recursion_desired));
        let verifier = PropagationVerifier::new(lookup, config);
        let cancel = CancellationToken::new();
        cancel_on_ctrl_c(cancel.clone());

        println!(
            "Waiting for {} on {} (quorum {})",
            cmd.fqdn.bold(),
            verifier
                .config()
                .resolvers
                .iter()
                .map(SocketAddr::to_string)
                .collect::<Vec<_>>()
                .join(", "),
            verifier.config().quorum
        );

        match verifier
            .wait_for_propagation(&cmd.fqdn, &cmd.value, &cancel)
            .await
        {
            Ok(report) => {
                println!(
                    "{} Confirmed after {} rounds ({:.1}s)",
                    "✓".green(),
                    report.rounds,
                    report.elapsed.as_secs_f64()
                );
                Ok(())
            }
            Err(OpusDnsError::PropagationTimeout(timeout)) => {
                println!("{} Not propagated after {} rounds", "✗".red(), timeout.rounds);
                for resolver in &timeout.pending {
                    println!("  {} {}", "pending".yellow(), resolver);
                }
                Err(OpusDnsError::PropagationTimeout(timeout).into())
            }
            Err(e) => Err(e.into()),
        }
    })
}

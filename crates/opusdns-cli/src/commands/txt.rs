//! TXT record commands for DNS-01 challenges

use anyhow::Context;
use clap::{Args, Subcommand};
use colored::Colorize;

use super::{run_with_client, GlobalOptions};

/// TXT record commands
#[derive(Args)]
pub struct TxtCommand {
    #[command(subcommand)]
    pub command: TxtSubcommand,
}

#[derive(Subcommand)]
pub enum TxtSubcommand {
    /// Create or replace a TXT record
    Set(SetTxtCommand),
    /// Remove a TXT record
    Remove(RemoveTxtCommand),
}

#[derive(Args)]
pub struct SetTxtCommand {
    /// Fully qualified record name (e.g. "_acme-challenge.example.com")
    pub fqdn: String,

    /// Record value, quoted automatically
    pub value: String,

    /// Wait until resolvers return the new value
    #[arg(long, default_value = "false")]
    pub wait: bool,
}

#[derive(Args)]
pub struct RemoveTxtCommand {
    /// Fully qualified record name
    pub fqdn: String,
}

impl TxtCommand {
    pub fn execute(self, global: &GlobalOptions) -> anyhow::Result<()> {
        let config = global.client_config()?;

        run_with_client(config, |client| async move {
            match self.command {
                TxtSubcommand::Set(cmd) => {
                    client
                        .upsert_txt_record(&cmd.fqdn, &cmd.value)
                        .await
                        .with_context(|| format!("Failed to set TXT record {}", cmd.fqdn))?;
                    println!("{} TXT {}", "✓".green(), cmd.fqdn);

                    if cmd.wait {
                        let report = client
                            .wait_for_propagation(&cmd.fqdn, &cmd.value)
                            .await
                            .with_context(|| format!("TXT record {} did not propagate", cmd.fqdn))?;
                        println!(
                            "{} Propagated after {} rounds ({:.1}s)",
                            "✓".green(),
                            report.rounds,
                            report.elapsed.as_secs_f64()
                        );
                    }
                    Ok(())
                }
                TxtSubcommand::Remove(cmd) => {
                    client
                        .remove_txt_record(&cmd.fqdn)
                        .await
                        .with_context(|| format!("Failed to remove TXT record {}", cmd.fqdn))?;
                    println!("{} Removed TXT {}", "✓".green(), cmd.fqdn);
                    Ok(())
                }
            }
        })
    }
}

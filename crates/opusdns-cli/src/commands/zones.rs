//! Zone listing and lookup commands

use anyhow::Context;
use clap::{Args, Subcommand};
use colored::Colorize;
use opusdns::{DnssecStatus, ListZonesOptions, OpusDnsClient, Zone};

use super::{run_with_client, GlobalOptions};

/// DNS zone commands
#[derive(Args)]
pub struct ZonesCommand {
    #[command(subcommand)]
    pub command: ZonesSubcommand,
}

#[derive(Subcommand)]
pub enum ZonesSubcommand {
    /// List all zones in the account
    List(ListZonesCommand),
    /// Show a zone and its records
    Get(GetZoneCommand),
    /// Find the zone that owns a name
    Resolve(ResolveZoneCommand),
    /// Show zone counts
    Summary,
}

#[derive(Args)]
pub struct ListZonesCommand {
    /// Only zones whose name contains this string
    #[arg(long)]
    pub search: Option<String>,

    /// Only zones ending with this suffix (e.g. "com")
    #[arg(long)]
    pub suffix: Option<String>,
}

#[derive(Args)]
pub struct GetZoneCommand {
    /// Zone name (e.g. "example.com")
    pub zone: String,
}

#[derive(Args)]
pub struct ResolveZoneCommand {
    /// Fully qualified name (e.g. "_acme-challenge.www.example.com")
    pub fqdn: String,
}

impl ZonesCommand {
    pub fn execute(self, global: &GlobalOptions) -> anyhow::Result<()> {
        let config = global.client_config()?;

        run_with_client(config, |client| async move {
            match self.command {
                ZonesSubcommand::List(cmd) => execute_list(&client, cmd).await,
                ZonesSubcommand::Get(cmd) => execute_get(&client, cmd).await,
                ZonesSubcommand::Resolve(cmd) => execute_resolve(&client, cmd).await,
                ZonesSubcommand::Summary => execute_summary(&client).await,
            }
        })
    }
}

async fn execute_list(client: &OpusDnsClient, cmd: ListZonesCommand) -> anyhow::Result<()> {
    let options = ListZonesOptions {
        search: cmd.search,
        suffix: cmd.suffix,
        ..Default::default()
    };
    let zones = client
        .dns()
        .list_zones(&options, &client.cancellation_token())
        .await
        .context("Failed to list zones")?;

    if zones.is_empty() {
        println!("{}", "No zones found".yellow());
        return Ok(());
    }

    println!("{:<40} {:<10} {}", "ZONE".bold(), "DNSSEC".bold(), "CREATED".bold());
    for zone in &zones {
        print_zone_row(zone);
    }
    println!("\n{} zones", zones.len());
    Ok(())
}

async fn execute_get(client: &OpusDnsClient, cmd: GetZoneCommand) -> anyhow::Result<()> {
    let cancel = client.cancellation_token();
    let zone = client
        .dns()
        .get_zone(&cmd.zone, &cancel)
        .await
        .with_context(|| format!("Failed to fetch zone {}", cmd.zone))?;
    let rrsets = client
        .dns()
        .get_rrsets(&zone.name, &cancel)
        .await
        .with_context(|| format!("Failed to fetch records for {}", zone.name))?;

    println!("{} {}", "Zone:".bold(), zone.name.green());
    println!("{} {}", "DNSSEC:".bold(), dnssec_label(zone.dnssec_status));
    println!();
    for rrset in rrsets {
        for record in &rrset.records {
            println!(
                "{:<30} {:<6} {:<7} {}",
                rrset.name,
                rrset.ttl,
                rrset.record_type.to_string().cyan(),
                record.rdata
            );
        }
    }
    Ok(())
}

async fn execute_resolve(client: &OpusDnsClient, cmd: ResolveZoneCommand) -> anyhow::Result<()> {
    let zone = client
        .resolve_zone(&cmd.fqdn)
        .await
        .with_context(|| format!("Failed to resolve zone for {}", cmd.fqdn))?;
    println!("{} -> {}", cmd.fqdn, zone.green());
    Ok(())
}

async fn execute_summary(client: &OpusDnsClient) -> anyhow::Result<()> {
    let summary = client
        .dns()
        .get_summary(&client.cancellation_token())
        .await
        .context("Failed to fetch zone summary")?;

    println!("{} {}", "Total zones:".bold(), summary.total_zones);
    for (status, count) in &summary.zones_by_dnssec {
        println!("  {:<10} {}", dnssec_label(Some(*status)), count);
    }
    Ok(())
}

fn print_zone_row(zone: &Zone) {
    let created = zone
        .created_on
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "{:<40} {:<10} {}",
        zone.name,
        dnssec_label(zone.dnssec_status),
        created
    );
}

fn dnssec_label(status: Option<DnssecStatus>) -> colored::ColoredString {
    match status {
        Some(DnssecStatus::Enabled) => "enabled".green(),
        Some(DnssecStatus::Pending) => "pending".yellow(),
        Some(DnssecStatus::Disabled) => "disabled".normal(),
        None => "-".dimmed(),
    }
}

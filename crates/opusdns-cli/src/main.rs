//! OpusDNS CLI - manage zones and TXT records from the command line

mod commands;

use clap::{Parser, Subcommand};
use commands::{GlobalOptions, PropagationCommand, TxtCommand, ZonesCommand};
use tracing_subscriber::{layer::SubscriberExt, Layer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "OPUSDNS_LOG_LEVEL", global = true)]
    log_level: String,

    /// Log format: compact, full
    #[arg(
        long,
        default_value = "compact",
        env = "OPUSDNS_LOG_FORMAT",
        global = true
    )]
    log_format: String,

    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List, inspect and resolve DNS zones
    Zones(ZonesCommand),
    /// Publish or remove TXT records
    Txt(TxtCommand),
    /// Check that records are visible to public resolvers
    Propagation(PropagationCommand),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = cli.log_level.clone();

    // RUST_LOG wins when set; otherwise our crates at the requested level
    // and noisy dependencies at warn
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) if std::env::var("RUST_LOG").is_ok() => filter,
        _ => tracing_subscriber::EnvFilter::new(format!(
            "opusdns_cli={level},\
             opusdns={level},\
             hickory_proto=warn,\
             hickory_resolver=warn,\
             h2=warn,\
             hyper=warn,\
             reqwest=warn,\
             rustls=warn",
            level = log_level
        )),
    };

    let fmt_layer = match cli.log_format.as_str() {
        "full" => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
        _ => tracing_subscriber::fmt::layer() // "compact" or any other value
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Zones(cmd) => cmd.execute(&cli.global),
        Commands::Txt(cmd) => cmd.execute(&cli.global),
        Commands::Propagation(cmd) => cmd.execute(&cli.global),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_txt_set() {
        let cli = Cli::try_parse_from([
            "opusdns",
            "--api-key",
            "key",
            "txt",
            "set",
            "_acme-challenge.example.com",
            "token",
            "--wait",
        ])
        .unwrap();
        assert_eq!(cli.global.api_key.as_deref(), Some("key"));
        assert!(matches!(cli.command, Commands::Txt(_)));
    }
}

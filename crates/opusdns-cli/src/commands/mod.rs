pub mod propagation;
pub mod txt;
pub mod zones;

pub use propagation::PropagationCommand;
pub use txt::TxtCommand;
pub use zones::ZonesCommand;

use std::future::Future;

use anyhow::Context;
use clap::Args;
use opusdns::{ClientConfig, OpusDnsClient};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Connection settings shared by every command
#[derive(Args)]
pub struct GlobalOptions {
    /// OpusDNS API key
    #[arg(long, env = "OPUSDNS_API_KEY", global = true, hide_env_values = true)]
    pub api_key: Option<String>,

    /// OpusDNS API endpoint
    #[arg(long, env = "OPUSDNS_API_ENDPOINT", global = true)]
    pub endpoint: Option<String>,
}

impl GlobalOptions {
    /// Environment configuration with command line overrides applied
    pub fn client_config(&self) -> anyhow::Result<ClientConfig> {
        let mut config = ClientConfig::from_env().context("Invalid OPUSDNS_* environment")?;
        if let Some(api_key) = &self.api_key {
            config = config.with_api_key(api_key.clone());
        }
        if let Some(endpoint) = &self.endpoint {
            config = config.with_endpoint(endpoint.clone());
        }
        Ok(config)
    }
}

/// Run `f` with a client on a fresh runtime; Ctrl-C cancels the client
pub fn run_with_client<F, Fut>(config: ClientConfig, f: F) -> anyhow::Result<()>
where
    F: FnOnce(OpusDnsClient) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let rt = tokio::runtime::Runtime::new()?;

    rt.block_on(async {
        let client = OpusDnsClient::new(config).context("Failed to create OpusDNS client")?;
        cancel_on_ctrl_c(client.cancellation_token());
        f(client).await
    })
}

pub fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            token.cancel();
        }
    });
}

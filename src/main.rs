use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use graphql_relay::config::{
    DEFAULT_LISTEN_ADDR, DEFAULT_MAX_BODY_BYTES, DEFAULT_TIMEOUT_SECS, DEFAULT_UPSTREAM_URL,
};
use graphql_relay::projects::{projects_by_region, DEFAULT_ENTITY};
use graphql_relay::{ForwardMode, HttpUpstream, ProjectsClient, RelayConfig, RelayServerBuilder};
use tracing::info;

/// GraphQL relay for the public-works dashboard
#[derive(Parser, Debug)]
#[command(name = "graphql-relay", version, about)]
struct Cli {
    /// Upstream GraphQL endpoint every query is forwarded to
    #[arg(long, env = "RELAY_UPSTREAM_URL", default_value = DEFAULT_UPSTREAM_URL, global = true)]
    upstream_url: String,

    /// Address the HTTP server binds to
    #[arg(long, env = "RELAY_LISTEN_ADDR", default_value = DEFAULT_LISTEN_ADDR, global = true)]
    listen: String,

    /// Outbound payload: `query-only` or `full-body`
    #[arg(long, env = "RELAY_FORWARD_MODE", default_value = "query-only", global = true)]
    forward_mode: ForwardMode,

    /// Timeout for the outbound call, in seconds
    #[arg(long, env = "RELAY_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS, global = true)]
    timeout_secs: u64,

    /// Largest inbound body accepted, in bytes
    #[arg(long, env = "RELAY_MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES, global = true)]
    max_body_bytes: usize,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the relay server (default)
    Serve,
    /// Fetch the project catalogue through the upstream and print counts per region
    Summary {
        /// Entity whose projects are listed
        #[arg(long, default_value_t = DEFAULT_ENTITY)]
        entity: u32,
    },
}

impl Cli {
    fn relay_config(&self) -> graphql_relay::Result<RelayConfig> {
        let config = RelayConfig {
            upstream_url: self.upstream_url.clone(),
            listen_addr: self.listen.clone(),
            forward_mode: self.forward_mode,
            timeout: Duration::from_secs(self.timeout_secs),
            max_body_bytes: self.max_body_bytes,
        };
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .compact()
        .init();

    let cli = Cli::parse();
    let config = cli.relay_config()?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            info!(?config, "starting graphql-relay");
            RelayServerBuilder::from_config(&config)
                .serve(config.listen_addr.clone())
                .await?;
        }
        Command::Summary { entity } => summary(&config, entity).await?,
    }

    Ok(())
}

async fn summary(config: &RelayConfig, entity: u32) -> Result<()> {
    let upstream = HttpUpstream::builder(config.upstream_url.clone())
        .timeout(config.timeout)
        .build()?;
    let client = ProjectsClient::new(Arc::new(upstream)).with_entity(entity);

    let projects = client.projects().await?;
    println!("{} projects for entity {}", projects.len(), entity);
    for (region, count) in projects_by_region(&projects) {
        println!("  {region:<30} {count:>4}");
    }
    Ok(())
}

use anyhow::Result;
use cse::config::{load_config, CseConfig};
use cse::node::Node;
use std::path::Path;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "cse.toml".to_string());
    let (mut config, loaded) = if Path::new(&config_path).exists() {
        (load_config(&config_path)?, true)
    } else {
        (CseConfig::default(), false)
    };
    config.apply_env();

    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log.directive().into()),
        )
        .init();

    if !loaded {
        warn!(path = %config_path, "Config file not found, using defaults");
    }
    info!("CSE starting...");

    let node = Node::build(config).await?;
    node.run().await
}

//! Streamwall control node binary

use streamwall_control::{ControlConfig, StreamwallNode};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "streamwall=info,streamwall_control=info,streamwall_streams=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Streamwall");

    let config = ControlConfig::default();

    let node = StreamwallNode::new(config)?;
    node.run().await?;

    Ok(())
}

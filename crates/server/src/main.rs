//! King-of-the-Hill session server binary.

use anyhow::Result;
use tracing::info;

use koth_server::ServerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("koth_server=info".parse()?),
        )
        .init();

    let config = ServerConfig::from_env()?;
    let handle = koth_server::serve(config).await?;
    info!(
        request = %handle.request_addr,
        publish = %handle.publish_addr,
        "king-of-the-hill session server listening"
    );

    handle.join().await;
    Ok(())
}

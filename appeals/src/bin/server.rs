//! Appeals service server.
//!
//! # Usage
//!
//! ```bash
//! # Start infrastructure
//! docker compose up -d
//!
//! # Run server
//! DATABASE_URL=postgres://... cargo run --bin appeals-server
//! ```

use appeals::{ApplicationBuilder, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    let _ = dotenvy::dotenv();

    let config = Config::from_env();
    let app = ApplicationBuilder::new()
        .with_config(config.clone())
        .with_tracing("info,appeals=debug,sqlx=warn")?;

    tracing::info!(
        address = %config.bind_address(),
        redis = config.cache.redis_url.is_some(),
        push_webhook = config.push.webhook_url.is_some(),
        "Starting appeals server"
    );

    app.with_resources().await?.build().await?.run().await?;

    tracing::info!("Appeals server stopped");
    Ok(())
}

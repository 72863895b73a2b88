//! LifePlan server binary
//!
//! # Usage
//!
//! ```bash
//! # Local run without external services
//! cargo run -p lifeplan-server -- --in-memory
//!
//! # Against Supabase and Cloudinary (values usually come from .env)
//! SUPABASE_URL=... SUPABASE_KEY=... CLOUDINARY_CLOUD_NAME=... \
//! CLOUDINARY_API_KEY=... CLOUDINARY_API_SECRET=... cargo run -p lifeplan-server
//! ```

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lifeplan_server::Args;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "lifeplan_server={level},lifeplan_core={level},tower_http={level},warn",
                    level = log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("LifePlan server v{}", env!("CARGO_PKG_VERSION"));
    info!("Listen: {}", args.listen);
    info!(
        "Storage: {}",
        if args.in_memory { "in-memory" } else { "supabase + cloudinary" }
    );
    info!("Upload folder: {}", args.upload_folder);

    lifeplan_server::start_server(args).await
}

//! LifePlan HTTP Server
//!
//! REST surface over `lifeplan_core::services::PlanService`.
//!
//! # Modules
//!
//! - [`config`] - CLI/environment configuration
//! - [`routes`] - axum router, shared state and endpoints
//! - [`http_error`] - JSON error responses

use std::sync::Arc;

use lifeplan_core::db::{
    BlobStore, CloudinaryBlobStore, InMemoryBlobStore, InMemoryTreeStore, InMemoryXpStore,
    SupabaseTreeStore, SupabaseXpStore, TreeStore, XpStore,
};
use lifeplan_core::services::PlanService;

pub mod config;
pub mod http_error;
pub mod routes;

pub use config::Args;
pub use http_error::HttpError;
pub use routes::{create_router, AppState};

/// Build the service with the backends selected by `args`
pub fn build_service(args: &Args) -> anyhow::Result<PlanService> {
    let (store, blobs, xp): (Arc<dyn TreeStore>, Arc<dyn BlobStore>, Arc<dyn XpStore>) =
        if args.in_memory {
            tracing::warn!("In-memory mode: plans, media and XP are lost on exit");
            (
                Arc::new(InMemoryTreeStore::new()),
                Arc::new(InMemoryBlobStore::new()),
                Arc::new(InMemoryXpStore::new()),
            )
        } else {
            let supabase = args
                .supabase()
                .ok_or_else(|| anyhow::anyhow!("Supabase configuration incomplete"))?;
            let cloudinary = args
                .cloudinary()
                .ok_or_else(|| anyhow::anyhow!("Cloudinary configuration incomplete"))?;
            tracing::info!("Plans: {} (table {})", supabase.url, supabase.table);
            tracing::info!("Media: cloudinary/{}", cloudinary.cloud_name);
            (
                Arc::new(SupabaseTreeStore::new(supabase.clone())),
                Arc::new(CloudinaryBlobStore::new(cloudinary)),
                Arc::new(SupabaseXpStore::new(supabase)),
            )
        };

    Ok(PlanService::new(store, blobs)
        .with_xp_store(xp)
        .with_upload_folder(args.upload_folder.clone()))
}

/// Bind `args.listen` and serve until the process is stopped
pub async fn start_server(args: Args) -> anyhow::Result<()> {
    let service = build_service(&args)?;
    let app = create_router(AppState::new(service), args.cors_allow_origin.as_deref());

    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    tracing::info!("LifePlan server listening on http://{}", args.listen);
    axum::serve(listener, app).await?;

    Ok(())
}

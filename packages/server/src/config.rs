//! Configuration for the LifePlan server
//!
//! CLI arguments with environment variable fallbacks, parsed with clap. A
//! `.env` file in the working directory is loaded first by `main`.

use clap::Parser;
use std::net::SocketAddr;

use lifeplan_core::db::{CloudinaryConfig, SupabaseConfig};
use lifeplan_core::services::DEFAULT_UPLOAD_FOLDER;

/// LifePlan - REST backend for nested life plans
#[derive(Parser, Debug, Clone)]
#[command(name = "lifeplan-server")]
#[command(about = "REST backend for nested life plans, progress tracking and photo uploads")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:5000")]
    pub listen: SocketAddr,

    /// Supabase project URL
    #[arg(long, env = "SUPABASE_URL")]
    pub supabase_url: Option<String>,

    /// Supabase API key (service or anon key)
    #[arg(long, env = "SUPABASE_KEY", hide_env_values = true)]
    pub supabase_key: Option<String>,

    /// Table holding plan rows
    #[arg(long, env = "SUPABASE_TABLE", default_value = "plans")]
    pub supabase_table: String,

    /// Cloudinary cloud name
    #[arg(long, env = "CLOUDINARY_CLOUD_NAME")]
    pub cloudinary_cloud_name: Option<String>,

    /// Cloudinary API key
    #[arg(long, env = "CLOUDINARY_API_KEY")]
    pub cloudinary_api_key: Option<String>,

    /// Cloudinary API secret
    #[arg(long, env = "CLOUDINARY_API_SECRET", hide_env_values = true)]
    pub cloudinary_api_secret: Option<String>,

    /// Root folder for uploaded media
    #[arg(long, env = "UPLOAD_FOLDER", default_value = DEFAULT_UPLOAD_FOLDER)]
    pub upload_folder: String,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Keep plans and media in process memory instead of Supabase/Cloudinary
    #[arg(long, env = "IN_MEMORY", default_value = "false")]
    pub in_memory: bool,

    /// Allowed CORS origin (any origin when unset)
    #[arg(long, env = "CORS_ALLOW_ORIGIN")]
    pub cors_allow_origin: Option<String>,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.in_memory {
            return Ok(());
        }

        let missing: Vec<&str> = [
            ("SUPABASE_URL", self.supabase_url.is_none()),
            ("SUPABASE_KEY", self.supabase_key.is_none()),
            ("CLOUDINARY_CLOUD_NAME", self.cloudinary_cloud_name.is_none()),
            ("CLOUDINARY_API_KEY", self.cloudinary_api_key.is_none()),
            ("CLOUDINARY_API_SECRET", self.cloudinary_api_secret.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();

        if !missing.is_empty() {
            return Err(format!(
                "{} required unless IN_MEMORY is set",
                missing.join(", ")
            ));
        }

        if self.upload_folder.trim_matches('/').is_empty() {
            return Err("UPLOAD_FOLDER must not be empty".to_string());
        }

        Ok(())
    }

    /// Supabase settings, if all present
    pub fn supabase(&self) -> Option<SupabaseConfig> {
        let mut config =
            SupabaseConfig::new(self.supabase_url.clone()?, self.supabase_key.clone()?);
        config.table = self.supabase_table.clone();
        Some(config)
    }

    /// Cloudinary settings, if all present
    pub fn cloudinary(&self) -> Option<CloudinaryConfig> {
        Some(CloudinaryConfig::new(
            self.cloudinary_cloud_name.clone()?,
            self.cloudinary_api_key.clone()?,
            self.cloudinary_api_secret.clone()?,
        ))
    }
}

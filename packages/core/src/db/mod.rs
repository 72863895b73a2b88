//! Storage Layer
//!
//! This module holds everything that talks to systems outside the process:
//!
//! - [`TreeStore`] - plan rows, keyed by id and filtered by owner/parent
//! - [`BlobStore`] - hosted media, addressed by public id
//! - [`XpStore`] - append-only XP ledger per owner
//!
//! # Backends
//!
//! | Trait       | Production              | Tests / local            |
//! |-------------|-------------------------|--------------------------|
//! | `TreeStore` | [`SupabaseTreeStore`]   | [`InMemoryTreeStore`]    |
//! | `BlobStore` | [`CloudinaryBlobStore`] | [`InMemoryBlobStore`]    |
//! | `XpStore`   | [`SupabaseXpStore`]     | [`InMemoryXpStore`]      |
//!
//! Nothing outside this module knows how rows or blobs are encoded.

mod blob_store;
mod cloudinary;
mod error;
mod memory_store;
mod supabase_store;
mod tree_store;
mod xp_store;

pub use blob_store::{
    owner_folder, plan_folder, BlobResult, BlobStore, InMemoryBlobStore, UploadRequest,
    UploadedBlob, UNATTACHED_FOLDER,
};
pub use cloudinary::{sign as sign_cloudinary_params, CloudinaryBlobStore, CloudinaryConfig};
pub use error::{BlobError, StoreError};
pub use memory_store::InMemoryTreeStore;
pub use supabase_store::{
    SupabaseConfig, SupabaseTreeStore, SupabaseXpStore, ACHIEVEMENTS_TABLE, XP_TABLE,
};
pub use tree_store::{StoreResult, TreeStore};
pub use xp_store::{InMemoryXpStore, XpStore};

//! TradeBidz media service
//!
//! Two independent jobs share this process:
//!
//! - An HTTP endpoint that normalizes uploaded product images and stores them
//!   in Supabase Storage
//! - A worker that consumes the notification stream and sends HTML emails

pub mod config;
pub mod error;
pub mod image_processor;
pub mod notifications;
pub mod storage_client;
pub mod upload_api;

pub use config::Config;
pub use error::UploadError;
pub use image_processor::{ImageProcessor, ProcessedImage, ProcessingError};
pub use storage_client::{storage_filename, ObjectStorage, StorageError, SupabaseStorage};
pub use upload_api::{create_router, start_api_server, AppState};

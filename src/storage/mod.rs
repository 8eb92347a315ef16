//! S3-compatible storage
//!
//! Object storage behind the `s3` sync provider. Works with MinIO,
//! Cloudflare R2, Backblaze B2 and AWS S3.

mod s3_client;
mod types;

pub use s3_client::S3Client;
pub use types::*;

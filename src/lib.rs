pub mod config;
pub mod dispatch;
pub mod ditto;
pub mod error;
pub mod identity;
pub mod models;
#[cfg(test)]
pub(crate) mod testing;
pub mod upload;

pub use config::{Cli, Config};
pub use error::{BlobUploadError, Result};

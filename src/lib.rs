//! Content-addressed image upload server
//!
//! Accepts single-file `multipart/form-data` uploads, names each payload by
//! its BLAKE3 digest, stores it once in a flat directory and deletes it after
//! a fixed retention period. The expiry schedule is rebuilt from file
//! timestamps at startup, so no schedule is persisted.

pub mod address;
pub mod config;
pub mod expiry;
pub mod multipart;
pub mod server;
pub mod store;
pub mod vault;

pub use address::{ContentAddress, StoredName};
pub use config::{Config, ConfigError};
pub use multipart::{Boundary, ExtractedPayload, MultipartError};
pub use store::{FileStore, StoreError};
pub use vault::{RetentionPolicy, Vault};

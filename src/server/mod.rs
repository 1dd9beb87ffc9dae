//! HTTP front end
//!
//! Routes uploads into the vault. Every response is `200 OK` with a plain
//! text body: the file's URL on success, the configured failure URL on any
//! failure.

mod handlers;

use crate::address::StoredName;
use crate::config::UploadConfig;
use crate::multipart::{ExtractLimits, MultipartError};
use crate::store::StoreError;
use crate::vault::Vault;
use axum::routing::{delete, post};
use axum::Router;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tower_http::services::ServeDir;

/// Reasons an upload is answered with the failure URL
#[derive(Debug, Error)]
pub enum UploadError {
    #[error("authentication key mismatch")]
    AuthenticationMismatch,

    #[error("content type {0} is not eligible for storage")]
    IneligibleContentType(String),

    #[error("multipart error: {0}")]
    Multipart(#[from] MultipartError),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("storage task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Upload handling settings resolved from configuration
#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub secret: String,
    pub address: String,
    pub fail_address: String,
    pub only_images: bool,
    pub limits: ExtractLimits,
}

impl UploadSettings {
    pub fn from_config(config: &UploadConfig) -> Self {
        Self {
            secret: config.secret.clone(),
            address: config.address.clone(),
            fail_address: config.fail_address.clone(),
            only_images: config.only_images,
            limits: config.extract_limits(),
        }
    }

    /// `<address>/<name>` with exactly one slash between the two
    pub fn success_url(&self, name: &StoredName) -> String {
        format!("{}/{}", self.address.trim_end_matches('/'), name)
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    vault: Vault,
    settings: Arc<UploadSettings>,
}

impl AppState {
    pub fn new(vault: Vault, settings: UploadSettings) -> Self {
        Self {
            vault,
            settings: Arc::new(settings),
        }
    }
}

/// Build the router.
///
/// Uploads are accepted at `upload_path` with or without a trailing slash;
/// `DELETE <upload_path>/{name}` removes a stored file. When `files_dir`
/// is given, its contents are served under `/files/`.
pub fn router(state: AppState, upload_path: &str, files_dir: Option<&Path>) -> Router {
    let base = upload_path.trim_end_matches('/');

    let mut app = Router::new().route(&format!("{}/{{name}}", base), delete(handlers::remove));
    app = if base.is_empty() {
        app.route("/", post(handlers::upload))
    } else {
        app.route(base, post(handlers::upload))
            .route(&format!("{}/", base), post(handlers::upload))
    };

    if let Some(dir) = files_dir {
        app = app.nest_service("/files", ServeDir::new(dir));
    }

    app.with_state(state)
}

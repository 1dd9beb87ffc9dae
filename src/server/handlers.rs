//! Request handlers

use super::{AppState, UploadError};
use crate::address::{ContentAddress, StoredName};
use crate::multipart::{extract_payload, Boundary, MultipartError};
use crate::store::StoreError;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap};
use futures::TryStreamExt;
use std::io;
use tokio_util::io::StreamReader;

/// Header carrying the shared secret
const KEY_HEADER: &str = "key";

/// Media types accepted when `only_images` is set
const IMAGE_TYPES: &[&str] = &["image/png", "image/jpeg"];

/// Store an uploaded file
pub(super) async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Body,
) -> String {
    match store_upload(&state, &headers, body).await {
        Ok(name) => {
            let url = state.settings.success_url(&name);
            log::info!("Upload stored: {}", url);
            url
        }
        Err(e) => {
            log::warn!("Upload failed: {}", e);
            state.settings.fail_address.clone()
        }
    }
}

/// Delete a stored file
pub(super) async fn remove(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> String {
    match remove_stored(&state, &headers, name).await {
        Ok(true) => "deleted".to_string(),
        Ok(false) => "not found".to_string(),
        Err(e) => {
            log::warn!("Delete failed: {}", e);
            state.settings.fail_address.clone()
        }
    }
}

fn authenticate(headers: &HeaderMap, secret: &str) -> Result<(), UploadError> {
    match headers.get(KEY_HEADER) {
        Some(key) if key.as_bytes() == secret.as_bytes() => Ok(()),
        _ => Err(UploadError::AuthenticationMismatch),
    }
}

async fn store_upload(
    state: &AppState,
    headers: &HeaderMap,
    body: Body,
) -> Result<StoredName, UploadError> {
    let settings = &state.settings;
    authenticate(headers, &settings.secret)?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or(MultipartError::MissingBoundary)?;
    log::debug!("Upload with content type {}", content_type);
    let boundary = Boundary::from_content_type(content_type)?;

    let reader = StreamReader::new(body.into_data_stream().map_err(io::Error::other));
    let payload = extract_payload(reader, &boundary, &settings.limits).await?;

    if settings.only_images && !IMAGE_TYPES.contains(&payload.content_type.as_str()) {
        return Err(UploadError::IneligibleContentType(payload.content_type));
    }

    let name = StoredName::new(ContentAddress::of(&payload.bytes), &payload.content_type);
    log::debug!(
        "Received {} bytes ({:?}) as {}",
        payload.bytes.len(),
        payload.filename,
        name
    );

    let vault = state.vault.clone();
    let stored = name.clone();
    let outcome =
        tokio::task::spawn_blocking(move || vault.ingest(&stored, &payload.bytes)).await??;
    log::debug!("{} ingested: {:?}", name, outcome);

    Ok(name)
}

async fn remove_stored(
    state: &AppState,
    headers: &HeaderMap,
    name: String,
) -> Result<bool, UploadError> {
    authenticate(headers, &state.settings.secret)?;
    if StoredName::parse(&name).is_none() {
        return Err(StoreError::InvalidName(name).into());
    }

    let vault = state.vault.clone();
    Ok(tokio::task::spawn_blocking(move || vault.remove(&name)).await??)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_authenticate() {
        let mut headers = HeaderMap::new();
        assert!(authenticate(&headers, "").is_err());

        headers.insert(KEY_HEADER, HeaderValue::from_static("secret"));
        assert!(authenticate(&headers, "secret").is_ok());
        assert!(authenticate(&headers, "Secret").is_err());
        assert!(authenticate(&headers, "secret ").is_err());
    }
}

//! End-to-end upload tests against the router

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use imgdrop::config::UploadConfig;
use imgdrop::server::{router, AppState, UploadSettings};
use imgdrop::store::FileStore;
use imgdrop::vault::{RetentionPolicy, Vault};
use imgdrop::ContentAddress;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

const SECRET: &str = "s3cret";
const ADDRESS: &str = "http://localhost/";
const FAIL: &str = "http://localhost/failed.jpg";

const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR\x00\x00\x00\x01\x00\x00\x00\x01\x08\x06\x00\x00\x00\x1f\x15\xc4\x89";

fn app(root: &Path, only_images: bool) -> (Router, Vault) {
    let policy = RetentionPolicy::new(Duration::from_secs(14 * 86_400), ["index.html"]);
    let vault = Vault::new(FileStore::open(root).unwrap(), policy);
    let settings = UploadSettings::from_config(&UploadConfig {
        secret: SECRET.to_string(),
        address: ADDRESS.to_string(),
        fail_address: FAIL.to_string(),
        only_images,
        ..UploadConfig::default()
    });
    let state = AppState::new(vault.clone(), settings);
    (router(state, "/upload/", Some(root)), vault)
}

fn multipart(boundary: &str, content_type: &str, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        b"Content-Disposition: form-data; name=\"sharex\"; filename=\"screenshot.png\"\r\n",
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(payload);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());
    body
}

fn upload_request(key: Option<&str>, body: Vec<u8>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(Method::POST)
        .uri("/upload/")
        .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XYZ");
    if let Some(key) = key {
        builder = builder.header("key", key);
    }
    builder.body(Body::from(body)).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> String {
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn file_count(root: &Path) -> usize {
    fs::read_dir(root).unwrap().count()
}

#[tokio::test]
async fn test_upload_dedup_and_auth_scenario() {
    let temp = TempDir::new().unwrap();
    let (app, vault) = app(temp.path(), true);
    let expected_name = format!("{}.png", ContentAddress::of(PNG).to_hex());
    let expected = format!("http://localhost/{}", expected_name);

    let first = send(&app, upload_request(Some(SECRET), multipart("XYZ", "image/png", PNG))).await;
    assert_eq!(first, expected);
    assert_eq!(fs::read(temp.path().join(&expected_name)).unwrap(), PNG);
    let deadline = vault.deadline_of(&expected_name).unwrap();

    let second = send(&app, upload_request(Some(SECRET), multipart("XYZ", "image/png", PNG))).await;
    assert_eq!(second, expected);
    assert_eq!(file_count(temp.path()), 1);
    assert_eq!(vault.deadline_of(&expected_name), Some(deadline));

    let other = b"\x89PNG different image".to_vec();
    let wrong = send(&app, upload_request(Some("wrong"), multipart("XYZ", "image/png", &other))).await;
    assert_eq!(wrong, FAIL);
    assert_eq!(file_count(temp.path()), 1);
}

#[tokio::test]
async fn test_missing_key_stores_nothing() {
    let temp = TempDir::new().unwrap();
    let (app, _vault) = app(temp.path(), true);

    let response = send(&app, upload_request(None, multipart("XYZ", "image/png", PNG))).await;
    assert_eq!(response, FAIL);
    assert_eq!(file_count(temp.path()), 0);
}

#[tokio::test]
async fn test_ineligible_content_type() {
    let temp = TempDir::new().unwrap();
    let (app, _vault) = app(temp.path(), true);

    let body = multipart("XYZ", "text/plain", b"hello");
    assert_eq!(send(&app, upload_request(Some(SECRET), body)).await, FAIL);
    assert_eq!(file_count(temp.path()), 0);
}

#[tokio::test]
async fn test_any_content_type_when_images_not_required() {
    let temp = TempDir::new().unwrap();
    let (app, _vault) = app(temp.path(), false);

    let body = multipart("XYZ", "text/plain", b"hello");
    let response = send(&app, upload_request(Some(SECRET), body)).await;
    assert_eq!(
        response,
        format!("http://localhost/{}.bin", ContentAddress::of(b"hello").to_hex())
    );
}

#[tokio::test]
async fn test_jpeg_upload_without_trailing_slash() {
    let temp = TempDir::new().unwrap();
    let (app, _vault) = app(temp.path(), true);
    let jpeg = b"\xff\xd8\xff\xe0 jpeg body \xff\xd9";

    let request = Request::builder()
        .method(Method::POST)
        .uri("/upload")
        .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XYZ")
        .header("key", SECRET)
        .body(Body::from(multipart("XYZ", "image/jpeg", jpeg)))
        .unwrap();
    let response = send(&app, request).await;
    assert!(response.ends_with(".jpg"), "{}", response);
    assert_eq!(file_count(temp.path()), 1);
}

#[tokio::test]
async fn test_malformed_body_fails_and_service_continues() {
    let temp = TempDir::new().unwrap();
    let (app, _vault) = app(temp.path(), true);

    let mut truncated = multipart("XYZ", "image/png", PNG);
    truncated.truncate(truncated.len() - 10);
    assert_eq!(send(&app, upload_request(Some(SECRET), truncated)).await, FAIL);

    let no_boundary = Request::builder()
        .method(Method::POST)
        .uri("/upload/")
        .header(header::CONTENT_TYPE, "multipart/form-data")
        .header("key", SECRET)
        .body(Body::from(multipart("XYZ", "image/png", PNG)))
        .unwrap();
    assert_eq!(send(&app, no_boundary).await, FAIL);
    assert_eq!(file_count(temp.path()), 0);

    // Same router still accepts a valid upload
    let ok = send(&app, upload_request(Some(SECRET), multipart("XYZ", "image/png", PNG))).await;
    assert_ne!(ok, FAIL);
}

#[tokio::test]
async fn test_large_upload() {
    let temp = TempDir::new().unwrap();
    let (app, _vault) = app(temp.path(), true);
    let payload: Vec<u8> = (0..200_000u32).map(|i| (i.wrapping_mul(31) % 251) as u8).collect();

    let response =
        send(&app, upload_request(Some(SECRET), multipart("XYZ", "image/png", &payload))).await;
    let name = response.trim_start_matches("http://localhost/");
    assert_eq!(fs::read(temp.path().join(name)).unwrap(), payload);
}

#[tokio::test]
async fn test_delete_and_serve() {
    let temp = TempDir::new().unwrap();
    let (app, vault) = app(temp.path(), true);
    fs::write(temp.path().join("index.html"), b"<html></html>").unwrap();

    let url = send(&app, upload_request(Some(SECRET), multipart("XYZ", "image/png", PNG))).await;
    let name = url.trim_start_matches("http://localhost/").to_string();

    let get = Request::builder()
        .uri(format!("/files/{}", name))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(get).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let served = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&served[..], PNG);

    let delete = |key: &str, target: &str| {
        Request::builder()
            .method(Method::DELETE)
            .uri(format!("/upload/{}", target))
            .header("key", key)
            .body(Body::empty())
            .unwrap()
    };

    assert_eq!(send(&app, delete("wrong", &name)).await, FAIL);
    assert!(temp.path().join(&name).exists());

    assert_eq!(send(&app, delete(SECRET, &name)).await, "deleted");
    assert!(!temp.path().join(&name).exists());
    assert!(!vault.is_tracked(&name));
    assert_eq!(send(&app, delete(SECRET, &name)).await, "not found");

    assert_eq!(send(&app, delete(SECRET, "index.html")).await, FAIL);
    assert!(temp.path().join("index.html").exists());
}

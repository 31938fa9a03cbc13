//! Common test utilities for integration tests
//!
//! This module provides shared infrastructure for integration tests:
//! - An app wired to an in-memory store, a recording mailer and temp avatar dirs
//! - Request helpers returning status and JSON body
//! - A small multipart body builder
//! - Account setup shortcuts (registered, verified, logged in)

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba};
use passgate_api::app::{build_router, AppState};
use passgate_api::config::Config;
use passgate_shared::accounts::{AccountService, AccountSettings};
use passgate_shared::avatar::AvatarStorage;
use passgate_shared::mail::RecordingMailer;
use passgate_shared::models::user::{User, UserFilter};
use passgate_shared::store::{InMemoryUserStore, UserStore};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use tower::ServiceExt;

pub const PASSWORD: &str = "secret123";

const SECRET: &str = "test-secret-key-at-least-32-bytes-long";
const BOUNDARY: &str = "passgate-test-boundary";

/// Test context containing all necessary resources
pub struct TestContext {
    pub app: axum::Router,
    pub store: Arc<InMemoryUserStore>,
    pub mailer: Arc<RecordingMailer>,
    pub avatars: AvatarStorage,
    _dir: tempfile::TempDir,
}

impl TestContext {
    /// Creates a new test context with an empty store
    pub async fn new() -> anyhow::Result<Self> {
        Self::with_mailer(RecordingMailer::new()).await
    }

    pub async fn with_mailer(mailer: RecordingMailer) -> anyhow::Result<Self> {
        let dir = tempfile::tempdir()?;
        let temp_dir = dir.path().join("tmp");
        let public_dir = dir.path().join("public/avatars");

        let vars: HashMap<&str, String> = HashMap::from([
            ("DATABASE_URL", "postgresql://localhost/unused".to_string()),
            ("JWT_SECRET", SECRET.to_string()),
            ("AVATAR_TEMP_DIR", temp_dir.display().to_string()),
            ("AVATAR_PUBLIC_DIR", public_dir.display().to_string()),
        ]);
        let config = Config::from_lookup(|key| vars.get(key).cloned())?;

        let avatars = AvatarStorage::new(&config.avatars.temp_dir, &config.avatars.public_dir);
        avatars.ensure_dirs().await?;

        let store = Arc::new(InMemoryUserStore::new());
        let mailer = Arc::new(mailer);

        let accounts = AccountService::new(
            store.clone(),
            mailer.clone(),
            avatars.clone(),
            AccountSettings::new(&config.api.base_url, &config.jwt.secret),
        );
        let app = build_router(AppState::new(accounts, config));

        Ok(Self {
            app,
            store,
            mailer,
            avatars,
            _dir: dir,
        })
    }

    /// Sends a request and returns the status and JSON body (`Null` if empty)
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&body).to_string()))
        };

        (status, json)
    }

    /// Stored record for `email`
    pub async fn user(&self, email: &str) -> User {
        self.store
            .find_one(&UserFilter::Email(email.to_string()))
            .await
            .unwrap()
            .expect("user should exist")
    }

    /// Registers `email` with [`PASSWORD`] and no avatar
    pub async fn register(&self, email: &str) -> (StatusCode, Value) {
        let body = MultipartBody::new().text("email", email).text("password", PASSWORD);
        self.send(body.request("POST", "/api/auth/register", None)).await
    }

    /// Registers and verifies `email`
    pub async fn register_verified(&self, email: &str) {
        let (status, _) = self.register(email).await;
        assert_eq!(status, StatusCode::CREATED);

        let token = self.user(email).await.verification_token.unwrap();
        let (status, _) = self.send(get(&format!("/api/auth/verify/{}", token), None)).await;
        assert_eq!(status, StatusCode::OK);
    }

    /// Registers, verifies and logs in `email`; returns the session token
    pub async fn login_verified(&self, email: &str) -> String {
        self.register_verified(email).await;

        let (status, body) = self
            .send(json_request("POST", "/api/auth/login", json!({ "email": email, "password": PASSWORD }), None))
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);

        body["token"].as_str().unwrap().to_string()
    }
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {}", token)
}

pub fn get(uri: &str, auth: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = auth {
        builder = builder.header(header::AUTHORIZATION, bearer(token));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn post_empty(uri: &str, auth: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(token) = auth {
        builder = builder.header(header::AUTHORIZATION, bearer(token));
    }
    builder.body(Body::empty()).unwrap()
}

pub fn json_request(method: &str, uri: &str, body: Value, auth: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = auth {
        builder = builder.header(header::AUTHORIZATION, bearer(token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// A small PNG
pub fn png() -> Vec<u8> {
    let img = ImageBuffer::from_pixel(32, 24, Rgba([40u8, 80, 160, 255]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(img)
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// multipart/form-data body builder
#[derive(Default)]
pub struct MultipartBody {
    bytes: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.bytes.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub fn file(mut self, name: &str, file_name: &str, content_type: &str, data: &[u8]) -> Self {
        self.bytes.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.bytes.extend_from_slice(data);
        self.bytes.extend_from_slice(b"\r\n");
        self
    }

    pub fn request(mut self, method: &str, uri: &str, auth: Option<&str>) -> Request<Body> {
        self.bytes.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"));
        if let Some(token) = auth {
            builder = builder.header(header::AUTHORIZATION, bearer(token));
        }
        builder.body(Body::from(self.bytes)).unwrap()
    }
}

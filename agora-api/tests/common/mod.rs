//! Helpers shared by the API integration tests.
#![allow(dead_code)]

use agora_api::server::{self, CookieSettings, ServerState};
use agora_common::{
    model::auth::{SESSION_COOKIE_NAME, SESSION_LIFETIME, SessionKeys},
    util::PositiveDuration,
};
use agora_db::client::DbClient;
use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::sync::Arc;
use tower::ServiceExt;

pub const TEST_SECRET: &[u8] = b"integration-test-secret";
pub const TEST_PASSWORD: &str = "correct horse battery";

pub fn session_keys() -> SessionKeys {
    let lifetime = PositiveDuration::new(SESSION_LIFETIME).unwrap();
    SessionKeys::new(TEST_SECRET, lifetime)
}

pub fn test_app(pool: PgPool) -> Router {
    server::app(ServerState {
        db_client: Arc::new(DbClient::new(pool)),
        session_keys: Arc::new(session_keys()),
        cookie_settings: CookieSettings::default(),
    })
}

/// An app whose pool never connects. Only usable for requests that are
/// answered before the database is touched.
pub fn offline_app() -> Router {
    let pool = PgPoolOptions::new()
        .connect_lazy("postgres://agora@localhost:1/agora")
        .unwrap();
    test_app(pool)
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    /// `name=value` of the session cookie set by the response.
    pub fn session_cookie(&self) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .filter(|value| value.starts_with(&format!("{SESSION_COOKIE_NAME}=")))
            .map(|value| value.split(';').next().unwrap().to_owned())
            .next()
    }
}

pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    cookie: Option<&str>,
    body: Option<Value>,
) -> TestResponse {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, cookie);
    }

    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    TestResponse {
        status,
        headers,
        body,
    }
}

pub async fn sign_up(app: &Router, username: &str) -> TestResponse {
    send(
        app,
        Method::POST,
        "/api/users/signup",
        None,
        Some(json!({ "username": username, "password": TEST_PASSWORD })),
    )
    .await
}

pub async fn log_in(app: &Router, username: &str, password: &str) -> TestResponse {
    send(
        app,
        Method::POST,
        "/api/users/login",
        None,
        Some(json!({ "username": username, "password": password })),
    )
    .await
}

/// Signs up `username` and returns the cookie header of a fresh session.
pub async fn session_for(app: &Router, username: &str) -> String {
    assert_eq!(sign_up(app, username).await.status, StatusCode::CREATED);

    let response = log_in(app, username, TEST_PASSWORD).await;
    assert_eq!(response.status, StatusCode::OK);
    response.session_cookie().unwrap()
}

pub async fn create_topic(app: &Router, cookie: &str, title: &str) -> i64 {
    let response = send(
        app,
        Method::POST,
        "/api/topics",
        Some(cookie),
        Some(json!({ "title": title })),
    )
    .await;
    assert_eq!(response.status, StatusCode::CREATED);
    response.body["id"].as_i64().unwrap()
}

pub async fn create_post(app: &Router, cookie: &str, topic_id: i64) -> i64 {
    let response = send(
        app,
        Method::POST,
        "/api/posts",
        Some(cookie),
        Some(json!({
            "topic_id": topic_id,
            "title": "First impressions",
            "content": "Works better than expected.",
        })),
    )
    .await;
    assert_eq!(response.status, StatusCode::CREATED);
    response.body["id"].as_i64().unwrap()
}

pub async fn create_comment(app: &Router, cookie: &str, post_id: i64) -> i64 {
    let response = send(
        app,
        Method::POST,
        "/api/comments",
        Some(cookie),
        Some(json!({ "post_id": post_id, "content": "Agreed." })),
    )
    .await;
    assert_eq!(response.status, StatusCode::CREATED);
    response.body["id"].as_i64().unwrap()
}

pub async fn react(app: &Router, cookie: &str, uri: &str, reaction: i64) -> TestResponse {
    send(
        app,
        Method::POST,
        uri,
        Some(cookie),
        Some(json!({ "reaction": reaction })),
    )
    .await
}

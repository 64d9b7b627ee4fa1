//! Shared setup for API integration tests
//!
//! Tests drive the real router with `tower::ServiceExt::oneshot` against a
//! PostgreSQL database named by `DATABASE_URL`. Without it, `TestContext::new`
//! returns None and the test returns early.
//!
//! Mail goes to a [`RecordingTransport`] so tests can read verification and
//! invitation links. Image uploads are not configured.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use sqlx::PgPool;
use std::sync::Arc;
use tenantdesk_api::app::{build_router, AppState};
use tenantdesk_api::config::{ApiConfig, Config, DatabaseConfig, JwtConfig, MailConfig};
use tenantdesk_api::services::mailer::{Mailer, RecordingTransport};
use tenantdesk_shared::db::migrations::{ensure_database_exists, run_migrations};
use tenantdesk_shared::db::pool::{create_pool, DatabaseConfig as PoolConfig};
use tower::ServiceExt;
use uuid::Uuid;

pub const PASSWORD: &str = "Fr3sh&Clean-42";

pub struct TestContext {
    pub db: PgPool,
    pub app: Router,
    pub mail: Arc<RecordingTransport>,
}

/// A registered user with an active session
pub struct Account {
    pub email: String,
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub access_token: String,
    pub refresh_token: String,
}

fn test_config(database_url: &str) -> Config {
    Config {
        api: ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec!["*".to_string()],
            production: false,
            public_url: "https://app.tenantdesk.test".to_string(),
        },
        database: DatabaseConfig {
            url: database_url.to_string(),
            max_connections: 5,
        },
        jwt: JwtConfig {
            secret: "integration-test-secret-that-is-long-enough".to_string(),
            access_ttl_minutes: 15,
            refresh_ttl_days: 30,
        },
        mail: MailConfig {
            api_url: None,
            api_key: None,
            from: "TenantDesk <no-reply@tenantdesk.test>".to_string(),
        },
        cloudinary: None,
    }
}

impl TestContext {
    pub async fn new() -> Option<Self> {
        let url = match std::env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                eprintln!("DATABASE_URL not set; skipping");
                return None;
            }
        };

        ensure_database_exists(&url).await.expect("create database");
        let db = create_pool(PoolConfig::from_url(url.clone())).await.expect("pool");
        run_migrations(&db).await.expect("migrations");

        let mail = Arc::new(RecordingTransport::new());
        let config = test_config(&url);
        let mailer = Mailer::new(mail.clone(), config.mail.from.clone());
        let state = AppState::new(db.clone(), config, mailer, None);

        Some(Self {
            db,
            app: build_router(state),
            mail,
        })
    }

    /// Sends a request and returns the status with the parsed JSON body
    /// (`Value::Null` for empty bodies)
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };

        (status, json)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn put(&self, uri: &str, token: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::PUT, uri, Some(token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, Some(token), None).await
    }

    /// Registers a fresh user with their own workspace
    pub async fn register(&self, name: &str) -> Account {
        let email = format!("{}-{}@tenantdesk.test", name.to_lowercase(), Uuid::new_v4());
        let (status, body) = self
            .post(
                "/v1/auth/register",
                None,
                serde_json::json!({
                    "email": email,
                    "password": PASSWORD,
                    "name": name,
                    "tenant_name": format!("{}'s Cleaning Co", name),
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);

        Account {
            email,
            user_id: parse_id(&body["user_id"]),
            tenant_id: parse_id(&body["tenant_id"]),
            access_token: body["access_token"].as_str().unwrap().to_string(),
            refresh_token: body["refresh_token"].as_str().unwrap().to_string(),
        }
    }

    /// Token query parameter of the latest email sent to `to`
    pub async fn token_from_email(&self, to: &str) -> String {
        let email = self.mail.wait_for(to).await.expect("email was sent");
        let start = email.text.find("token=").expect("link with token") + "token=".len();
        email.text[start..]
            .split_whitespace()
            .next()
            .unwrap()
            .to_string()
    }
}

impl TestContext {
    /// Token from the latest email to `to` whose link points at `path`
    pub async fn token_from_link(&self, to: &str, path: &str) -> String {
        let marker = format!("{}?token=", path);
        for _ in 0..50 {
            let sent = self.mail.sent().await;
            let found = sent
                .iter()
                .rev()
                .filter(|email| email.to == to)
                .find_map(|email| email.text.split(marker.as_str()).nth(1));
            if let Some(rest) = found {
                return rest.split_whitespace().next().unwrap().to_string();
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("no email to {} linking {}", to, path);
    }
}

pub fn parse_id(value: &Value) -> Uuid {
    value
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(|| panic!("expected a UUID, got {}", value))
}

#![allow(dead_code, unused_macros)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use urbifix::auth::{create_jwt, hash_password, Role};
use urbifix::config::AppConfig;
use urbifix::models::{Category, Id, ProviderProfile, Service, User};
use urbifix::repo::inmem::InMemRepo;
use urbifix::repo::{CategoryRepo, ServiceRepo, UserRepo};
use urbifix::storage::{AttachmentStore, StoreError};
use urbifix::AppState;

pub const SECRET: &str = "integration-test-secret-0123456789abcdef";
pub const PASSWORD: &str = "correct-horse-battery";

/// Attachment store double keeping files in memory.
#[derive(Default)]
pub struct MemoryAttachments {
    pub files: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait::async_trait]
impl AttachmentStore for MemoryAttachments {
    async fn save(&self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.files.lock().unwrap().entry(name.to_string()).or_insert_with(|| bytes.to_vec());
        Ok(())
    }
    async fn load(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        self.files.lock().unwrap().get(name).cloned().ok_or(StoreError::NotFound)
    }
}

pub fn test_config() -> AppConfig {
    AppConfig::for_secret(SECRET)
}

pub fn state_with(cfg: AppConfig) -> (InMemRepo, Arc<MemoryAttachments>, AppState) {
    let repo = InMemRepo::new();
    let attachments = Arc::new(MemoryAttachments::default());
    let state = AppState::new(Arc::new(repo.clone()), attachments.clone(), cfg);
    (repo, attachments, state)
}

pub fn state() -> (InMemRepo, Arc<MemoryAttachments>, AppState) {
    state_with(test_config())
}

pub fn token_for(user: &User) -> String {
    create_jwt(SECRET, user.id, user.role, 1).unwrap()
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {token}"))
}

pub async fn seed_user(repo: &InMemRepo, role: Role, name: &str) -> (User, String) {
    let now = Utc::now();
    let user = User {
        id: Id::new_v4(),
        name: name.to_string(),
        email: format!("{}-{}@example.com", name.to_lowercase(), Id::new_v4().simple()),
        password_hash: hash_password(PASSWORD).unwrap(),
        role,
        phone: None,
        is_active: true,
        provider_profile: (role == Role::Provider).then(ProviderProfile::default),
        created_at: now,
        updated_at: now,
        version: 0,
    };
    let user = repo.create_user(user).await.unwrap();
    let token = token_for(&user);
    (user, token)
}

pub async fn seed_category(repo: &InMemRepo, name: &str) -> Category {
    let now = Utc::now();
    repo.create_category(Category {
        id: Id::new_v4(),
        name: name.to_string(),
        description: String::new(),
        icon: None,
        is_active: true,
        created_at: now,
        updated_at: now,
        version: 0,
    })
    .await
    .unwrap()
}

pub async fn seed_service(repo: &InMemRepo, provider: Id, category: Id, price: f64) -> Service {
    let now = Utc::now();
    repo.create_service(Service {
        id: Id::new_v4(),
        provider,
        category,
        name: "Road repair".into(),
        description: "Patching and resurfacing".into(),
        base_price: price,
        is_active: true,
        created_at: now,
        updated_at: now,
        version: 0,
    })
    .await
    .unwrap()
}

/// RFC 3339 timestamp `days` from now.
pub fn days_from_now(days: i64) -> String {
    (Utc::now() + Duration::days(days)).to_rfc3339()
}

/// Builds the full application around an `AppState`.
macro_rules! app {
    ($state:expr) => {
        actix_web::test::init_service(
            actix_web::App::new()
                .wrap(urbifix::SecurityHeaders::default())
                .app_data(actix_web::web::Data::new($state.clone()))
                .configure(urbifix::config),
        )
        .await
    };
}

/// Sends a `TestRequest` and returns the status and the JSON body (`Null` when empty).
macro_rules! call {
    ($app:expr, $req:expr) => {{
        let resp = actix_web::test::call_service(&$app, $req.to_request()).await;
        let status = resp.status();
        let body = actix_web::test::read_body(resp).await;
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }};
}

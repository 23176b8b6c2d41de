use std::sync::Arc;

use actix_web::{web, HttpRequest, HttpResponse};

use crate::config::AppConfig;
use crate::error::{extractor_error, ApiError};
use crate::rate_limit::{InMemoryRateLimiter, RateLimiterFacade};
use crate::repo::Repo;
use crate::storage::{mime_for_name, AttachmentStore};

pub mod admin;
pub mod auth;
pub mod bookings;
pub mod catalog;
pub mod chat;
pub mod issues;
pub mod proposals;
pub mod stats;

/// Everything a handler needs, injected once as `web::Data<AppState>`.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub attachments: Arc<dyn AttachmentStore>,
    pub config: Arc<AppConfig>,
    pub rate_limiter: RateLimiterFacade,
}

impl AppState {
    pub fn new(repo: Arc<dyn Repo>, attachments: Arc<dyn AttachmentStore>, config: AppConfig) -> Self {
        let rate_limiter = RateLimiterFacade::new(InMemoryRateLimiter::new(true), config.rate_limits.clone());
        Self { repo, attachments, config: Arc::new(config), rate_limiter }
    }

    pub fn repo(&self) -> &dyn Repo {
        self.repo.as_ref()
    }
}

/// Turns a limiter verdict into a 429.
pub(crate) fn limited(allowed: bool, key: &str) -> Result<(), ApiError> {
    if allowed {
        return Ok(());
    }
    tracing::warn!(key, "rate limit exceeded");
    Err(ApiError::TooManyRequests)
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _| extractor_error(err)))
        .app_data(web::PathConfig::default().error_handler(|err, _| extractor_error(err)))
        .app_data(web::QueryConfig::default().error_handler(|err, _| extractor_error(err)))
        .route("/", web::get().to(health))
        .service(
            web::scope("/api")
                .configure(auth::config)
                .configure(catalog::config)
                .configure(issues::config)
                .configure(bookings::config)
                .configure(proposals::config)
                .configure(chat::config)
                .configure(stats::config)
                .configure(admin::config),
        )
        // public so attachment urls work in <img src>
        .route("/uploads/chat/{name}", web::get().to(serve_upload))
        .default_service(web::route().to(not_found));
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "success": true, "message": "Urbi-Fix API is running!" }))
}

async fn not_found(req: HttpRequest) -> Result<HttpResponse, ApiError> {
    tracing::debug!(path = req.path(), "no route");
    Err(ApiError::NotFound("Route not found".into()))
}

async fn serve_upload(data: web::Data<AppState>, path: web::Path<String>) -> Result<HttpResponse, ApiError> {
    let name = path.into_inner();
    let bytes = data.attachments.load(&name).await?;
    Ok(HttpResponse::Ok().content_type(mime_for_name(&name)).body(bytes))
}

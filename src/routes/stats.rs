use actix_web::{web, HttpResponse};
use chrono::Utc;

use crate::auth::Auth;
use crate::error::ApiError;
use crate::response::ok;
use crate::routes::AppState;
use crate::stats::{self, Dashboard};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/stats/dashboard").route(web::get().to(dashboard)));
}

#[utoipa::path(
    get,
    path = "/api/stats/dashboard",
    responses(
        (status = 200, description = "Dashboard for the caller's role", body = Dashboard),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn dashboard(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(ok(stats::dashboard(data.repo(), &auth.0, Utc::now()).await?))
}

use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use utoipa::IntoParams;

use crate::auth::Auth;
use crate::error::{ApiError, RepoResultExt};
use crate::issues::require_active_category;
use crate::models::{Category, Id, NewService, Service, UpdateService};
use crate::policy::{authorize, authorize_kind, Action, ResourceKind};
use crate::repo::ServiceFilter;
use crate::response::{created, ok, ok_msg, paged, PageQuery, Pagination};
use crate::routes::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/categories").route(web::get().to(list_categories)))
        .service(
            web::resource("/services")
                .route(web::get().to(list_services))
                .route(web::post().to(create_service)),
        )
        .service(
            web::resource("/services/{id}")
                .route(web::get().to(get_service))
                .route(web::put().to(update_service))
                .route(web::delete().to(delete_service)),
        );
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct CategoryQuery {
    /// Admin only.
    pub include_inactive: Option<bool>,
}

#[utoipa::path(
    get,
    path = "/api/categories",
    params(CategoryQuery),
    responses((status = 200, description = "Categories", body = [Category]))
)]
pub async fn list_categories(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    q: web::Query<CategoryQuery>,
) -> Result<HttpResponse, ApiError> {
    let is_admin = auth.map_or(false, |a| a.0.is_admin());
    let active_only = !(is_admin && q.include_inactive.unwrap_or(false));
    Ok(ok(data.repo.list_categories(active_only).await?))
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ServiceQuery {
    pub category: Option<Id>,
    pub provider: Option<Id>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[utoipa::path(
    get,
    path = "/api/services",
    params(ServiceQuery),
    responses((status = 200, description = "Active services", body = [Service]))
)]
pub async fn list_services(data: web::Data<AppState>, q: web::Query<ServiceQuery>) -> Result<HttpResponse, ApiError> {
    let page = PageQuery { page: q.page, limit: q.limit }.resolve(10);
    let filter = ServiceFilter { provider: q.provider, category: q.category, active_only: true };
    let result = data.repo.list_services(&filter, Some(page)).await?;
    Ok(paged(result.items, Pagination::new(page.page, page.limit, result.total)))
}

#[utoipa::path(
    get,
    path = "/api/services/{id}",
    params(("id" = Id, Path, description = "Service id")),
    responses(
        (status = 200, description = "Service", body = Service),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_service(data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    Ok(ok(data.repo.get_service(path.into_inner()).await.or_not_found("Service")?))
}

fn validate_price(price: f64) -> Result<(), ApiError> {
    if price > 0.0 && price.is_finite() {
        Ok(())
    } else {
        Err(ApiError::bad_request("Base price must be greater than zero"))
    }
}

#[utoipa::path(
    post,
    path = "/api/services",
    request_body = NewService,
    responses(
        (status = 201, description = "Service published", body = Service),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Providers only")
    )
)]
pub async fn create_service(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewService>,
) -> Result<HttpResponse, ApiError> {
    authorize_kind(&auth.0, ResourceKind::Service, Action::Create)?;
    let new = payload.into_inner();
    if new.name.trim().is_empty() {
        return Err(ApiError::bad_request("Service name is required"));
    }
    validate_price(new.base_price)?;
    require_active_category(data.repo(), new.category).await?;
    let now = Utc::now();
    let service = data
        .repo
        .create_service(Service {
            id: Id::new_v4(),
            provider: auth.0.id,
            category: new.category,
            name: new.name.trim().to_string(),
            description: new.description,
            base_price: new.base_price,
            is_active: true,
            created_at: now,
            updated_at: now,
            version: 0,
        })
        .await?;
    info!(service = %service.id, provider = %service.provider, "service published");
    Ok(created("Service created successfully", service))
}

#[utoipa::path(
    put,
    path = "/api/services/{id}",
    request_body = UpdateService,
    params(("id" = Id, Path, description = "Service id")),
    responses(
        (status = 200, description = "Service updated", body = Service),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Not found")
    )
)]
pub async fn update_service(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateService>,
) -> Result<HttpResponse, ApiError> {
    let mut service = data.repo.get_service(path.into_inner()).await.or_not_found("Service")?;
    authorize(&auth.0, Action::Update, &service)?;
    let upd = payload.into_inner();
    if let Some(category) = upd.category {
        require_active_category(data.repo(), category).await?;
        service.category = category;
    }
    if let Some(name) = upd.name {
        if name.trim().is_empty() {
            return Err(ApiError::bad_request("Service name is required"));
        }
        service.name = name.trim().to_string();
    }
    if let Some(description) = upd.description {
        service.description = description;
    }
    if let Some(price) = upd.base_price {
        validate_price(price)?;
        service.base_price = price;
    }
    if let Some(active) = upd.is_active {
        service.is_active = active;
    }
    service.updated_at = Utc::now();
    Ok(ok_msg("Service updated successfully", data.repo.update_service(service).await?))
}

#[utoipa::path(
    delete,
    path = "/api/services/{id}",
    params(("id" = Id, Path, description = "Service id")),
    responses(
        (status = 200, description = "Service deleted"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_service(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let service = data.repo.get_service(path.into_inner()).await.or_not_found("Service")?;
    authorize(&auth.0, Action::Delete, &service)?;
    data.repo.delete_service(service.id).await?;
    info!(service = %service.id, by = %auth.0.id, "service deleted");
    Ok(ok_msg("Service deleted successfully", serde_json::Value::Null))
}

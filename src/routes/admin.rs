use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

use crate::auth::{Auth, Role};
use crate::bookings;
use crate::error::{ApiError, RepoResultExt};
use crate::models::{Booking, Category, Id, NewCategory, PublicUser, UpdateCategory};
use crate::policy::{authorize_kind, Action, ResourceKind};
use crate::repo::{RepoError, UserFilter};
use crate::response::{created, ok, ok_msg, paged, PageQuery, Pagination};
use crate::routes::AppState;
use crate::stats::{self, Dashboard};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/admin/categories").route(web::post().to(create_category)))
        .service(web::resource("/admin/categories/{id}").route(web::put().to(update_category)))
        .service(web::resource("/admin/users").route(web::get().to(list_users)))
        .service(web::resource("/admin/users/{id}/status").route(web::patch().to(set_user_status)))
        .service(web::resource("/admin/providers/{id}/verify").route(web::patch().to(verify_provider)))
        .service(web::resource("/admin/bookings/{id}/refund").route(web::post().to(refund_booking)))
        .service(web::resource("/admin/stats").route(web::get().to(admin_stats)));
}

fn duplicate_name(e: RepoError) -> ApiError {
    match e {
        RepoError::Conflict => ApiError::bad_request("Category name already exists"),
        other => other.into(),
    }
}

#[utoipa::path(
    post,
    path = "/api/admin/categories",
    request_body = NewCategory,
    responses(
        (status = 201, description = "Category created", body = Category),
        (status = 400, description = "Missing or duplicate name"),
        (status = 403, description = "Admins only")
    )
)]
pub async fn create_category(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewCategory>,
) -> Result<HttpResponse, ApiError> {
    authorize_kind(&auth.0, ResourceKind::Category, Action::Create)?;
    let new = payload.into_inner();
    if new.name.trim().is_empty() {
        return Err(ApiError::bad_request("Category name is required"));
    }
    let now = Utc::now();
    let category = Category {
        id: Id::new_v4(),
        name: new.name.trim().to_string(),
        description: new.description,
        icon: new.icon,
        is_active: true,
        created_at: now,
        updated_at: now,
        version: 0,
    };
    let category = data.repo.create_category(category).await.map_err(duplicate_name)?;
    info!(category = %category.id, name = %category.name, "category created");
    Ok(created("Category created successfully", category))
}

#[utoipa::path(
    put,
    path = "/api/admin/categories/{id}",
    request_body = UpdateCategory,
    params(("id" = Id, Path, description = "Category id")),
    responses(
        (status = 200, description = "Category updated", body = Category),
        (status = 400, description = "Duplicate name"),
        (status = 404, description = "Not found")
    )
)]
pub async fn update_category(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateCategory>,
) -> Result<HttpResponse, ApiError> {
    authorize_kind(&auth.0, ResourceKind::Category, Action::Update)?;
    let mut category = data.repo.get_category(path.into_inner()).await.or_not_found("Category")?;
    let upd = payload.into_inner();
    if let Some(name) = upd.name {
        if name.trim().is_empty() {
            return Err(ApiError::bad_request("Category name is required"));
        }
        category.name = name.trim().to_string();
    }
    if let Some(description) = upd.description { category.description = description; }
    if let Some(icon) = upd.icon { category.icon = Some(icon); }
    if let Some(active) = upd.is_active { category.is_active = active; }
    category.updated_at = Utc::now();
    let category = data.repo.update_category(category).await.map_err(duplicate_name)?;
    Ok(ok_msg("Category updated successfully", category))
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct UserListQuery {
    pub role: Option<Role>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[utoipa::path(
    get,
    path = "/api/admin/users",
    params(UserListQuery),
    responses(
        (status = 200, description = "Users", body = [PublicUser]),
        (status = 403, description = "Admins only")
    )
)]
pub async fn list_users(auth: Auth, data: web::Data<AppState>, q: web::Query<UserListQuery>) -> Result<HttpResponse, ApiError> {
    authorize_kind(&auth.0, ResourceKind::User, Action::List)?;
    let page = PageQuery { page: q.page, limit: q.limit }.resolve(10);
    let result = data.repo.list_users(&UserFilter { role: q.role }, Some(page)).await?;
    let users = result.items.iter().map(PublicUser::from).collect();
    Ok(paged(users, Pagination::new(page.page, page.limit, result.total)))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UserStatusUpdate {
    pub is_active: bool,
}

#[utoipa::path(
    patch,
    path = "/api/admin/users/{id}/status",
    request_body = UserStatusUpdate,
    params(("id" = Id, Path, description = "User id")),
    responses(
        (status = 200, description = "Status changed", body = PublicUser),
        (status = 400, description = "Admins cannot deactivate themselves"),
        (status = 404, description = "Not found")
    )
)]
pub async fn set_user_status(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UserStatusUpdate>,
) -> Result<HttpResponse, ApiError> {
    authorize_kind(&auth.0, ResourceKind::User, Action::Update)?;
    let mut user = data.repo.get_user(path.into_inner()).await.or_not_found("User")?;
    if user.id == auth.0.id && !payload.is_active {
        return Err(ApiError::bad_request("You cannot deactivate your own account"));
    }
    user.is_active = payload.is_active;
    user.updated_at = Utc::now();
    let user = data.repo.update_user(user).await?;
    info!(user = %user.id, active = user.is_active, by = %auth.0.id, "user status changed");
    Ok(ok_msg("User status updated successfully", PublicUser::from(&user)))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyProvider {
    pub is_verified: bool,
}

#[utoipa::path(
    patch,
    path = "/api/admin/providers/{id}/verify",
    request_body = VerifyProvider,
    params(("id" = Id, Path, description = "Provider id")),
    responses(
        (status = 200, description = "Verification changed", body = PublicUser),
        (status = 400, description = "User is not a provider"),
        (status = 404, description = "Not found")
    )
)]
pub async fn verify_provider(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<VerifyProvider>,
) -> Result<HttpResponse, ApiError> {
    authorize_kind(&auth.0, ResourceKind::User, Action::Update)?;
    let mut user = data.repo.get_user(path.into_inner()).await.or_not_found("Provider")?;
    if user.role != Role::Provider {
        return Err(ApiError::bad_request("User is not a provider"));
    }
    user.provider_profile.get_or_insert_with(Default::default).is_verified = payload.is_verified;
    user.updated_at = Utc::now();
    let user = data.repo.update_user(user).await?;
    info!(provider = %user.id, verified = payload.is_verified, "provider verification changed");
    Ok(ok_msg("Provider verification updated", PublicUser::from(&user)))
}

#[utoipa::path(
    post,
    path = "/api/admin/bookings/{id}/refund",
    params(("id" = Id, Path, description = "Booking id")),
    responses(
        (status = 200, description = "Payment refunded", body = Booking),
        (status = 400, description = "Booking is not paid"),
        (status = 403, description = "Admins only")
    )
)]
pub async fn refund_booking(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let booking = bookings::refund_booking(data.repo(), &auth.0, path.into_inner()).await?;
    Ok(ok_msg("Refund processed successfully", booking))
}

#[utoipa::path(
    get,
    path = "/api/admin/stats",
    responses(
        (status = 200, description = "Admin dashboard", body = Dashboard),
        (status = 403, description = "Admins only")
    )
)]
pub async fn admin_stats(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    authorize_kind(&auth.0, ResourceKind::Stats, Action::List)?;
    Ok(ok(stats::dashboard(data.repo(), &auth.0, Utc::now()).await?))
}

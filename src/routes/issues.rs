use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::Auth;
use crate::error::ApiError;
use crate::issues::{self, IssueQuery};
use crate::models::{Id, Issue, IssueStatus, NewContribution, NewIssue, Priority, UpdateIssue};
use crate::repo::{IssueSort, IssueSortKey, SortOrder};
use crate::response::{created, ok, ok_msg, paged, PageQuery, Pagination};
use crate::routes::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/issues")
            .route(web::get().to(list_issues))
            .route(web::post().to(create_issue)),
    )
    .service(
        web::resource("/issues/{id}")
            .route(web::get().to(get_issue))
            .route(web::put().to(update_issue))
            .route(web::delete().to(delete_issue)),
    )
    .service(web::resource("/issues/{id}/upvote").route(web::patch().to(upvote_issue)))
    .service(web::resource("/issues/{id}/accept").route(web::patch().to(accept_issue)))
    .service(web::resource("/issues/{id}/resolve").route(web::patch().to(resolve_issue)))
    .service(web::resource("/issues/{id}/contribute").route(web::post().to(contribute)));
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct IssueListQuery {
    pub status: Option<IssueStatus>,
    pub category: Option<Id>,
    pub priority: Option<Priority>,
    /// `created_at` (default), `upvotes` or `priority`.
    #[param(value_type = Option<String>)]
    pub sort_by: Option<IssueSortKey>,
    /// `asc` or `desc` (default).
    #[param(value_type = Option<String>)]
    pub sort_order: Option<SortOrder>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[utoipa::path(
    get,
    path = "/api/issues",
    params(IssueListQuery),
    responses((status = 200, description = "Issues visible to the caller", body = [Issue]))
)]
pub async fn list_issues(
    auth: Auth,
    data: web::Data<AppState>,
    q: web::Query<IssueListQuery>,
) -> Result<HttpResponse, ApiError> {
    let q = q.into_inner();
    let page = PageQuery { page: q.page, limit: q.limit }.resolve(10);
    let query = IssueQuery {
        status: q.status,
        category: q.category,
        priority: q.priority,
        sort: IssueSort { key: q.sort_by.unwrap_or_default(), order: q.sort_order.unwrap_or_default() },
    };
    let result = issues::list_issues(data.repo(), &auth.0, query, page).await?;
    Ok(paged(result.items, Pagination::new(page.page, page.limit, result.total)))
}

#[utoipa::path(
    post,
    path = "/api/issues",
    request_body = NewIssue,
    responses(
        (status = 201, description = "Issue reported", body = Issue),
        (status = 400, description = "Invalid input")
    )
)]
pub async fn create_issue(auth: Auth, data: web::Data<AppState>, payload: web::Json<NewIssue>) -> Result<HttpResponse, ApiError> {
    let issue = issues::create_issue(data.repo(), &auth.0, payload.into_inner()).await?;
    Ok(created("Issue created successfully", issue))
}

#[utoipa::path(
    get,
    path = "/api/issues/{id}",
    params(("id" = Id, Path, description = "Issue id")),
    responses(
        (status = 200, description = "Issue", body = Issue),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_issue(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    Ok(ok(issues::view_issue(data.repo(), &auth.0, path.into_inner()).await?))
}

#[utoipa::path(
    put,
    path = "/api/issues/{id}",
    request_body = UpdateIssue,
    params(("id" = Id, Path, description = "Issue id")),
    responses(
        (status = 200, description = "Issue updated", body = Issue),
        (status = 400, description = "Invalid change"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found"),
        (status = 409, description = "Concurrent modification")
    )
)]
pub async fn update_issue(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateIssue>,
) -> Result<HttpResponse, ApiError> {
    let issue = issues::update_issue(data.repo(), &auth.0, path.into_inner(), payload.into_inner()).await?;
    Ok(ok_msg("Issue updated successfully", issue))
}

#[utoipa::path(
    delete,
    path = "/api/issues/{id}",
    params(("id" = Id, Path, description = "Issue id")),
    responses(
        (status = 200, description = "Issue deleted"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_issue(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    issues::delete_issue(data.repo(), &auth.0, path.into_inner()).await?;
    Ok(ok_msg("Issue deleted successfully", serde_json::Value::Null))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UpvoteResponse {
    pub upvotes: u32,
    pub has_upvoted: bool,
}

#[utoipa::path(
    patch,
    path = "/api/issues/{id}/upvote",
    params(("id" = Id, Path, description = "Issue id")),
    responses(
        (status = 200, description = "Vote toggled", body = UpvoteResponse),
        (status = 404, description = "Not found")
    )
)]
pub async fn upvote_issue(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let (issue, has_upvoted) = issues::toggle_upvote(data.repo(), &auth.0, path.into_inner()).await?;
    let message = if has_upvoted { "Issue upvoted" } else { "Upvote removed" };
    Ok(ok_msg(message, UpvoteResponse { upvotes: issue.upvotes, has_upvoted }))
}

#[utoipa::path(
    patch,
    path = "/api/issues/{id}/accept",
    params(("id" = Id, Path, description = "Issue id")),
    responses(
        (status = 200, description = "Issue assigned to the caller", body = Issue),
        (status = 400, description = "Issue is not open"),
        (status = 403, description = "Providers only"),
        (status = 409, description = "Another provider won the race")
    )
)]
pub async fn accept_issue(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let issue = issues::accept_issue(data.repo(), &auth.0, path.into_inner()).await?;
    Ok(ok_msg("Issue accepted successfully", issue))
}

#[utoipa::path(
    patch,
    path = "/api/issues/{id}/resolve",
    params(("id" = Id, Path, description = "Issue id")),
    responses(
        (status = 200, description = "Issue resolved", body = Issue),
        (status = 400, description = "Issue is not in progress"),
        (status = 403, description = "Not the assigned provider")
    )
)]
pub async fn resolve_issue(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let issue = issues::resolve_issue(data.repo(), &auth.0, path.into_inner()).await?;
    Ok(ok_msg("Issue resolved successfully", issue))
}

#[utoipa::path(
    post,
    path = "/api/issues/{id}/contribute",
    request_body = NewContribution,
    params(("id" = Id, Path, description = "Issue id")),
    responses(
        (status = 200, description = "Contribution recorded", body = Issue),
        (status = 400, description = "Crowdfunding closed or invalid amount")
    )
)]
pub async fn contribute(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<NewContribution>,
) -> Result<HttpResponse, ApiError> {
    let issue = issues::contribute(data.repo(), &auth.0, path.into_inner(), payload.into_inner()).await?;
    Ok(ok_msg("Contribution successful", issue))
}

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::auth::Auth;
use crate::error::ApiError;
use crate::models::{Id, NewProposal, Proposal, ProposalResponse, ProposalStatus};
use crate::negotiation::{self, Direction, Responded};
use crate::response::{created, ok, ok_msg};
use crate::routes::AppState;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/bookings/{id}/proposals")
            .route(web::get().to(list_booking_proposals))
            .route(web::post().to(create_proposal)),
    )
    .service(web::resource("/proposals").route(web::get().to(list_my_proposals)))
    .service(web::resource("/proposals/{id}").route(web::get().to(get_proposal)))
    .service(web::resource("/proposals/{id}/respond").route(web::patch().to(respond_to_proposal)))
    .service(web::resource("/proposals/{id}/cancel").route(web::patch().to(cancel_proposal)));
}

#[utoipa::path(
    post,
    path = "/api/bookings/{id}/proposals",
    request_body = NewProposal,
    params(("id" = Id, Path, description = "Booking id")),
    responses(
        (status = 201, description = "Proposal sent", body = Proposal),
        (status = 400, description = "Booking not negotiable or empty changes"),
        (status = 403, description = "Not a party to the booking"),
        (status = 404, description = "Booking not found")
    )
)]
pub async fn create_proposal(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<NewProposal>,
) -> Result<HttpResponse, ApiError> {
    let proposal = negotiation::create_proposal(
        data.repo(),
        &auth.0,
        path.into_inner(),
        payload.into_inner(),
        data.config.proposal_ttl_hours,
    )
    .await?;
    Ok(created("Proposal created successfully", proposal))
}

#[utoipa::path(
    get,
    path = "/api/bookings/{id}/proposals",
    params(("id" = Id, Path, description = "Booking id")),
    responses(
        (status = 200, description = "Proposals for the booking, newest first", body = [Proposal]),
        (status = 403, description = "Not a party to the booking")
    )
)]
pub async fn list_booking_proposals(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    Ok(ok(negotiation::list_for_booking(data.repo(), &auth.0, path.into_inner()).await?))
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct MyProposalsQuery {
    /// `sent`, `received` or `all` (default).
    #[serde(rename = "type")]
    #[param(rename = "type", value_type = Option<String>)]
    pub direction: Option<Direction>,
    pub status: Option<ProposalStatus>,
}

#[utoipa::path(
    get,
    path = "/api/proposals",
    params(MyProposalsQuery),
    responses((status = 200, description = "The caller's proposals", body = [Proposal]))
)]
pub async fn list_my_proposals(
    auth: Auth,
    data: web::Data<AppState>,
    q: web::Query<MyProposalsQuery>,
) -> Result<HttpResponse, ApiError> {
    let direction = q.direction.unwrap_or_default();
    Ok(ok(negotiation::list_mine(data.repo(), &auth.0, direction, q.status).await?))
}

#[utoipa::path(
    get,
    path = "/api/proposals/{id}",
    params(("id" = Id, Path, description = "Proposal id")),
    responses(
        (status = 200, description = "Proposal", body = Proposal),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_proposal(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    Ok(ok(negotiation::get_proposal(data.repo(), &auth.0, path.into_inner()).await?))
}

#[utoipa::path(
    patch,
    path = "/api/proposals/{id}/respond",
    request_body = ProposalResponse,
    params(("id" = Id, Path, description = "Proposal id")),
    responses(
        (status = 200, description = "Response recorded", body = Responded),
        (status = 400, description = "Proposal expired or no longer active"),
        (status = 403, description = "Only the recipient may respond")
    )
)]
pub async fn respond_to_proposal(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<ProposalResponse>,
) -> Result<HttpResponse, ApiError> {
    let out = negotiation::respond_to_proposal(
        data.repo(),
        &auth.0,
        path.into_inner(),
        payload.into_inner(),
        data.config.proposal_ttl_hours,
    )
    .await?;
    let message = format!("Proposal {} successfully", out.proposal.status.as_str());
    Ok(ok_msg(&message, out))
}

#[utoipa::path(
    patch,
    path = "/api/proposals/{id}/cancel",
    params(("id" = Id, Path, description = "Proposal id")),
    responses(
        (status = 200, description = "Proposal cancelled", body = Proposal),
        (status = 400, description = "Proposal is not pending"),
        (status = 403, description = "Only the creator can cancel")
    )
)]
pub async fn cancel_proposal(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let proposal = negotiation::cancel_proposal(data.repo(), &auth.0, path.into_inner()).await?;
    Ok(ok_msg("Proposal cancelled successfully", proposal))
}

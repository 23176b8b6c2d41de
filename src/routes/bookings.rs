use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use utoipa::IntoParams;

use crate::auth::Auth;
use crate::bookings;
use crate::error::ApiError;
use crate::models::{Booking, BookingStatus, BookingStatusUpdate, CancelBooking, Id, NewBooking, NewReview};
use crate::response::{created, ok, ok_msg, paged, PageQuery, Pagination};
use crate::routes::AppState;
use crate::stats::{self, BookingStats};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource("/bookings")
            .route(web::get().to(list_bookings))
            .route(web::post().to(create_booking)),
    )
    // before /bookings/{id} so "stats" is not parsed as an id
    .service(web::resource("/bookings/stats").route(web::get().to(booking_stats)))
    .service(
        web::resource("/bookings/{id}")
            .route(web::get().to(get_booking))
            .route(web::patch().to(update_booking_status))
            .route(web::delete().to(delete_booking)),
    )
    .service(web::resource("/bookings/{id}/cancel").route(web::patch().to(cancel_booking)))
    .service(web::resource("/bookings/{id}/pay").route(web::post().to(pay_booking)))
    .service(web::resource("/bookings/{id}/review").route(web::post().to(review_booking)));
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct BookingListQuery {
    pub status: Option<BookingStatus>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[utoipa::path(
    get,
    path = "/api/bookings",
    params(BookingListQuery),
    responses((status = 200, description = "Bookings visible to the caller", body = [Booking]))
)]
pub async fn list_bookings(
    auth: Auth,
    data: web::Data<AppState>,
    q: web::Query<BookingListQuery>,
) -> Result<HttpResponse, ApiError> {
    let page = PageQuery { page: q.page, limit: q.limit }.resolve(10);
    let result = bookings::list_bookings(data.repo(), &auth.0, q.status, page).await?;
    Ok(paged(result.items, Pagination::new(page.page, page.limit, result.total)))
}

#[utoipa::path(
    post,
    path = "/api/bookings",
    request_body = NewBooking,
    responses(
        (status = 201, description = "Booking created", body = Booking),
        (status = 400, description = "Invalid booking or duplicate for the issue"),
        (status = 404, description = "Service or provider not found")
    )
)]
pub async fn create_booking(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewBooking>,
) -> Result<HttpResponse, ApiError> {
    let booking = bookings::create_booking(data.repo(), &auth.0, payload.into_inner()).await?;
    Ok(created("Booking created successfully", booking))
}

#[utoipa::path(
    get,
    path = "/api/bookings/stats",
    responses(
        (status = 200, description = "Platform booking counters", body = BookingStats),
        (status = 403, description = "Admins only")
    )
)]
pub async fn booking_stats(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(ok(stats::platform_booking_stats(data.repo(), &auth.0, Utc::now()).await?))
}

#[utoipa::path(
    get,
    path = "/api/bookings/{id}",
    params(("id" = Id, Path, description = "Booking id")),
    responses(
        (status = 200, description = "Booking", body = Booking),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found")
    )
)]
pub async fn get_booking(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    Ok(ok(bookings::get_booking(data.repo(), &auth.0, path.into_inner()).await?))
}

#[utoipa::path(
    patch,
    path = "/api/bookings/{id}",
    request_body = BookingStatusUpdate,
    params(("id" = Id, Path, description = "Booking id")),
    responses(
        (status = 200, description = "Status changed", body = Booking),
        (status = 400, description = "Transition not allowed"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found")
    )
)]
pub async fn update_booking_status(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<BookingStatusUpdate>,
) -> Result<HttpResponse, ApiError> {
    let booking = bookings::update_status(data.repo(), &auth.0, path.into_inner(), payload.into_inner()).await?;
    Ok(ok_msg("Booking status updated successfully", booking))
}

#[utoipa::path(
    delete,
    path = "/api/bookings/{id}",
    params(("id" = Id, Path, description = "Booking id")),
    responses(
        (status = 200, description = "Booking deleted"),
        (status = 400, description = "Only pending bookings can be deleted"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Not found")
    )
)]
pub async fn delete_booking(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    bookings::delete_booking(data.repo(), &auth.0, path.into_inner()).await?;
    Ok(ok_msg("Booking deleted successfully", serde_json::Value::Null))
}

#[utoipa::path(
    patch,
    path = "/api/bookings/{id}/cancel",
    request_body = CancelBooking,
    params(("id" = Id, Path, description = "Booking id")),
    responses(
        (status = 200, description = "Booking cancelled", body = Booking),
        (status = 400, description = "Already cancelled or completed")
    )
)]
pub async fn cancel_booking(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: Option<web::Json<CancelBooking>>,
) -> Result<HttpResponse, ApiError> {
    let reason = payload.and_then(|p| p.into_inner().reason);
    let booking = bookings::cancel_booking(data.repo(), &auth.0, path.into_inner(), reason).await?;
    Ok(ok_msg("Booking cancelled successfully", booking))
}

#[utoipa::path(
    post,
    path = "/api/bookings/{id}/pay",
    params(("id" = Id, Path, description = "Booking id")),
    responses(
        (status = 200, description = "Payment recorded", body = Booking),
        (status = 400, description = "Booking not payable")
    )
)]
pub async fn pay_booking(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    let booking = bookings::pay_booking(data.repo(), &auth.0, path.into_inner()).await?;
    Ok(ok_msg("Payment successful", booking))
}

#[utoipa::path(
    post,
    path = "/api/bookings/{id}/review",
    request_body = NewReview,
    params(("id" = Id, Path, description = "Booking id")),
    responses(
        (status = 200, description = "Review stored", body = Booking),
        (status = 400, description = "Not reviewable")
    )
)]
pub async fn review_booking(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<NewReview>,
) -> Result<HttpResponse, ApiError> {
    let booking = bookings::review_booking(data.repo(), &auth.0, path.into_inner(), payload.into_inner()).await?;
    Ok(ok_msg("Review submitted successfully", booking))
}

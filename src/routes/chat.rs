use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use futures_util::TryStreamExt as _;
use serde::Deserialize;
use tracing::error;
use utoipa::IntoParams;

use crate::auth::Auth;
use crate::chat::{self, Upload, DEFAULT_MESSAGE_PAGE};
use crate::error::ApiError;
use crate::models::{
    ChatRoomView, Id, Message, NewMessage, NewPriceOffer, NewScheduleModification, OfferResponse,
};
use crate::response::{created, ok, ok_msg, paged, PageQuery, Pagination};
use crate::routes::{limited, AppState};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/chat/rooms").route(web::get().to(list_rooms)))
        .service(web::resource("/chat/room/{booking_id}").route(web::get().to(open_room)))
        .service(
            web::resource("/chat/room/{room_id}/messages")
                .route(web::get().to(list_messages))
                .route(web::post().to(send_message)),
        )
        .service(web::resource("/chat/room/{room_id}/price-offer").route(web::post().to(send_price_offer)))
        .service(
            web::resource("/chat/room/{room_id}/price-offer/{message_id}/respond")
                .route(web::post().to(respond_to_price_offer)),
        )
        .service(web::resource("/chat/room/{room_id}/schedule").route(web::post().to(send_schedule_modification)))
        .service(web::resource("/chat/room/{room_id}/upload").route(web::post().to(upload_file)));
}

fn allow_message(data: &AppState, auth: &Auth) -> Result<(), ApiError> {
    limited(data.rate_limiter.allow_message(&auth.0.id.to_string()), "message")
}

#[utoipa::path(
    get,
    path = "/api/chat/rooms",
    responses((status = 200, description = "Rooms the caller participates in", body = [ChatRoomView]))
)]
pub async fn list_rooms(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(ok(chat::list_rooms(data.repo(), &auth.0).await?))
}

#[utoipa::path(
    get,
    path = "/api/chat/room/{booking_id}",
    params(("booking_id" = Id, Path, description = "Booking id")),
    responses(
        (status = 200, description = "The booking's chat room, created on first access", body = ChatRoomView),
        (status = 403, description = "Not a party to the booking"),
        (status = 404, description = "Booking not found")
    )
)]
pub async fn open_room(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> {
    Ok(ok(chat::open_room(data.repo(), &auth.0, path.into_inner()).await?))
}

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct MessagePageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

#[utoipa::path(
    get,
    path = "/api/chat/room/{room_id}/messages",
    params(("room_id" = Id, Path, description = "Chat room id"), MessagePageQuery),
    responses(
        (status = 200, description = "Messages in chronological order", body = [Message]),
        (status = 403, description = "Not a participant"),
        (status = 404, description = "Chat room not found")
    )
)]
pub async fn list_messages(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    q: web::Query<MessagePageQuery>,
) -> Result<HttpResponse, ApiError> {
    let page = PageQuery { page: q.page, limit: q.limit }.resolve(DEFAULT_MESSAGE_PAGE);
    let result = chat::list_messages(data.repo(), &auth.0, path.into_inner(), page).await?;
    Ok(paged(result.items, Pagination::new(page.page, page.limit, result.total)))
}

#[utoipa::path(
    post,
    path = "/api/chat/room/{room_id}/messages",
    request_body = NewMessage,
    params(("room_id" = Id, Path, description = "Chat room id")),
    responses(
        (status = 201, description = "Message sent", body = Message),
        (status = 400, description = "Empty text or unknown reply target"),
        (status = 429, description = "Too many messages")
    )
)]
pub async fn send_message(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<NewMessage>,
) -> Result<HttpResponse, ApiError> {
    allow_message(&data, &auth)?;
    let message = chat::send_text(data.repo(), &auth.0, path.into_inner(), payload.into_inner()).await?;
    Ok(created("Message sent successfully", message))
}

#[utoipa::path(
    post,
    path = "/api/chat/room/{room_id}/price-offer",
    request_body = NewPriceOffer,
    params(("room_id" = Id, Path, description = "Chat room id")),
    responses(
        (status = 201, description = "Offer posted and proposal created", body = Message),
        (status = 400, description = "Booking not negotiable or invalid amount")
    )
)]
pub async fn send_price_offer(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<NewPriceOffer>,
) -> Result<HttpResponse, ApiError> {
    allow_message(&data, &auth)?;
    let message = chat::send_price_offer(
        data.repo(),
        &auth.0,
        path.into_inner(),
        payload.into_inner(),
        data.config.proposal_ttl_hours,
    )
    .await?;
    Ok(created("Price offer sent successfully", message))
}

#[utoipa::path(
    post,
    path = "/api/chat/room/{room_id}/price-offer/{message_id}/respond",
    request_body = OfferResponse,
    params(
        ("room_id" = Id, Path, description = "Chat room id"),
        ("message_id" = Id, Path, description = "Price offer message id")
    ),
    responses(
        (status = 200, description = "Offer answered, system reply posted", body = Message),
        (status = 400, description = "Offer expired or no longer active"),
        (status = 404, description = "Price offer not found")
    )
)]
pub async fn respond_to_price_offer(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<(Id, Id)>,
    payload: web::Json<OfferResponse>,
) -> Result<HttpResponse, ApiError> {
    let (room_id, message_id) = path.into_inner();
    let reply = chat::respond_to_offer(
        data.repo(),
        &auth.0,
        room_id,
        message_id,
        payload.into_inner(),
        data.config.proposal_ttl_hours,
    )
    .await?;
    Ok(ok_msg("Price offer response recorded", reply))
}

#[utoipa::path(
    post,
    path = "/api/chat/room/{room_id}/schedule",
    request_body = NewScheduleModification,
    params(("room_id" = Id, Path, description = "Chat room id")),
    responses(
        (status = 201, description = "Schedule change proposed", body = Message),
        (status = 400, description = "Date in the past or booking not negotiable")
    )
)]
pub async fn send_schedule_modification(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<NewScheduleModification>,
) -> Result<HttpResponse, ApiError> {
    allow_message(&data, &auth)?;
    let message = chat::send_schedule_modification(
        data.repo(),
        &auth.0,
        path.into_inner(),
        payload.into_inner(),
        data.config.proposal_ttl_hours,
    )
    .await?;
    Ok(created("Schedule modification sent successfully", message))
}

/// Reads the `file` and `description` fields, refusing files over `limit` bytes.
async fn read_upload(mut payload: Multipart, limit: usize) -> Result<Upload, ApiError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut description: Option<String> = None;
    while let Some(mut field) = payload.try_next().await.map_err(|e| {
        error!("multipart error: {e}");
        ApiError::bad_request("Malformed multipart body")
    })? {
        let disposition = field.content_disposition();
        let name = disposition.get_name().unwrap_or_default().to_string();
        let filename = disposition.get_filename().map(str::to_string);
        let mut bytes = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(|e| {
            error!("multipart stream error: {e}");
            ApiError::bad_request("Malformed multipart body")
        })? {
            if bytes.len() + chunk.len() > limit {
                return Err(ApiError::PayloadTooLarge);
            }
            bytes.extend_from_slice(&chunk);
        }
        match name.as_str() {
            "file" => file = Some((filename.unwrap_or_default(), bytes)),
            "description" => description = String::from_utf8(bytes).ok(),
            _ => {}
        }
    }
    let (filename, bytes) = file.ok_or_else(|| ApiError::bad_request("No file uploaded"))?;
    if bytes.is_empty() {
        return Err(ApiError::bad_request("No file uploaded"));
    }
    Ok(Upload { filename, bytes, description })
}

#[utoipa::path(
    post,
    path = "/api/chat/room/{room_id}/upload",
    params(("room_id" = Id, Path, description = "Chat room id")),
    responses(
        (status = 201, description = "File stored and message posted", body = Message),
        (status = 413, description = "File too large"),
        (status = 415, description = "File type not allowed"),
        (status = 429, description = "Too many uploads")
    )
)]
pub async fn upload_file(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    limited(data.rate_limiter.allow_upload(&auth.0.id.to_string()), "upload")?;
    let upload = read_upload(payload, data.config.max_upload_bytes).await?;
    let message =
        chat::upload_file(data.repo(), data.attachments.as_ref(), &auth.0, path.into_inner(), upload).await?;
    Ok(created("File uploaded successfully", message))
}

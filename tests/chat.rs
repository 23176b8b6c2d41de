#[macro_use]
mod common;

use actix_web::test;
use chrono::{Duration, Utc};
use serde_json::json;
use urbifix::auth::{Actor, Role};
use urbifix::bookings;
use urbifix::models::{Id, NewBooking, User};
use urbifix::repo::inmem::InMemRepo;

use common::*;

const BOUNDARY: &str = "----urbifix-test-boundary";

struct Room {
    booking: Id,
    consumer: User,
    consumer_tok: String,
    provider: User,
    provider_tok: String,
}

async fn booked(repo: &InMemRepo) -> Room {
    let (consumer, consumer_tok) = seed_user(repo, Role::Consumer, "Cara").await;
    let (provider, provider_tok) = seed_user(repo, Role::Provider, "Pat").await;
    let category = seed_category(repo, "Plumbing").await;
    let service = seed_service(repo, provider.id, category.id, 400.0).await;
    let new = NewBooking {
        service_id: service.id,
        provider_id: provider.id,
        issue_id: None,
        scheduled_date: Utc::now() + Duration::days(4),
        scheduled_time: Some("10:00".into()),
        notes: "Leaking pipe under the sink".into(),
    };
    let booking = bookings::create_booking(repo, &Actor::new(consumer.id, Role::Consumer), new).await.unwrap();
    Room { booking: booking.id, consumer, consumer_tok, provider, provider_tok }
}

fn multipart(filename: &str, bytes: &[u8], description: Option<&str>) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    if let Some(d) = description {
        body.extend_from_slice(format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"description\"\r\n\r\n{d}\r\n").as_bytes());
    }
    body.extend_from_slice(
        format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n").as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}

#[actix_web::test]
async fn room_is_created_once_per_booking() {
    let (repo, _files, state) = state();
    let app = app!(state);
    let r = booked(&repo).await;
    let uri = format!("/api/chat/room/{}", r.booking);

    let (status, first) = call!(app, test::TestRequest::get().uri(&uri).insert_header(bearer(&r.consumer_tok)));
    assert_eq!(status, 200);
    assert_eq!(first["data"]["participants"], json!([r.consumer.id, r.provider.id]));
    assert_eq!(first["data"]["negotiation_data"]["original_price"], 400.0);
    assert_eq!(first["data"]["negotiation_data"]["current_offer"], 400.0);

    let (_, second) = call!(app, test::TestRequest::get().uri(&uri).insert_header(bearer(&r.provider_tok)));
    assert_eq!(first["data"]["id"], second["data"]["id"]);

    let (_, booking) = call!(app, test::TestRequest::get().uri(&format!("/api/bookings/{}", r.booking)).insert_header(bearer(&r.consumer_tok)));
    assert_eq!(booking["data"]["chat_room_id"], first["data"]["id"]);

    let (_, rooms) = call!(app, test::TestRequest::get().uri("/api/chat/rooms").insert_header(bearer(&r.provider_tok)));
    assert_eq!(rooms["data"].as_array().unwrap().len(), 1);
}

#[actix_web::test]
async fn outsiders_are_kept_out() {
    let (repo, _files, state) = state();
    let app = app!(state);
    let r = booked(&repo).await;
    let (_, outsider) = seed_user(&repo, Role::Provider, "Otto").await;
    let (_, room) = call!(app, test::TestRequest::get().uri(&format!("/api/chat/room/{}", r.booking)).insert_header(bearer(&r.consumer_tok)));
    let room_id = room["data"]["id"].as_str().unwrap().to_string();

    let (status, _) = call!(app, test::TestRequest::get().uri(&format!("/api/chat/room/{}", r.booking)).insert_header(bearer(&outsider)));
    assert_eq!(status, 403);
    let (status, _) = call!(app, test::TestRequest::get().uri(&format!("/api/chat/room/{room_id}/messages")).insert_header(bearer(&outsider)));
    assert_eq!(status, 403);
    let (status, _) = call!(app, test::TestRequest::post().uri(&format!("/api/chat/room/{room_id}/messages")).insert_header(bearer(&outsider))
        .set_json(json!({"content": {"text": "hello?"}})));
    assert_eq!(status, 403);
    let (ct, body) = multipart("notes.txt", b"let me in", None);
    let (status, _) = call!(app, test::TestRequest::post().uri(&format!("/api/chat/room/{room_id}/upload")).insert_header(bearer(&outsider))
        .insert_header(("content-type", ct)).set_payload(body));
    assert_eq!(status, 403);
}

#[actix_web::test]
async fn unread_counts_follow_reads() {
    let (repo, _files, state) = state();
    let app = app!(state);
    let r = booked(&repo).await;
    let (_, room) = call!(app, test::TestRequest::get().uri(&format!("/api/chat/room/{}", r.booking)).insert_header(bearer(&r.consumer_tok)));
    let room_id = room["data"]["id"].as_str().unwrap().to_string();
    let messages = format!("/api/chat/room/{room_id}/messages");

    let (status, _) = call!(app, test::TestRequest::post().uri(&messages).insert_header(bearer(&r.consumer_tok)).set_json(json!({"content": {"text": "   "}})));
    assert_eq!(status, 400);

    let (status, first) = call!(app, test::TestRequest::post().uri(&messages).insert_header(bearer(&r.consumer_tok)).set_json(json!({"content": {"text": "Hi, when can you come?"}})));
    assert_eq!(status, 201);
    call!(app, test::TestRequest::post().uri(&messages).insert_header(bearer(&r.consumer_tok))
        .set_json(json!({"content": {"text": "Mornings work best"}, "reply_to": first["data"]["id"]})));
    let (status, _) = call!(app, test::TestRequest::post().uri(&messages).insert_header(bearer(&r.consumer_tok))
        .set_json(json!({"content": {"text": "dangling"}, "reply_to": Id::new_v4()})));
    assert_eq!(status, 400);

    let (_, rooms) = call!(app, test::TestRequest::get().uri("/api/chat/rooms").insert_header(bearer(&r.provider_tok)));
    let unread = &rooms["data"][0]["unread_count"];
    assert_eq!(unread[r.provider.id.to_string()], 2);
    assert_eq!(unread[r.consumer.id.to_string()], json!(null));

    let (_, page) = call!(app, test::TestRequest::get().uri(&messages).insert_header(bearer(&r.provider_tok)));
    let list = page["data"].as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["content"]["text"], "Hi, when can you come?");
    assert_eq!(list[1]["reply_to"], first["data"]["id"]);
    assert_eq!(list[1]["read_by"], json!([]));

    let (_, rooms) = call!(app, test::TestRequest::get().uri("/api/chat/rooms").insert_header(bearer(&r.provider_tok)));
    assert_eq!(rooms["data"][0]["unread_count"][r.provider.id.to_string()], 0);
    let (_, page) = call!(app, test::TestRequest::get().uri(&messages).insert_header(bearer(&r.consumer_tok)));
    assert_eq!(page["data"][0]["read_by"][0]["user_id"], json!(r.provider.id));
}

#[actix_web::test]
async fn accepted_price_offer_updates_booking_and_summary() {
    let (repo, _files, state) = state();
    let app = app!(state);
    let r = booked(&repo).await;
    let (_, room) = call!(app, test::TestRequest::get().uri(&format!("/api/chat/room/{}", r.booking)).insert_header(bearer(&r.consumer_tok)));
    let room_id = room["data"]["id"].as_str().unwrap().to_string();

    let (status, offer) = call!(app, test::TestRequest::post().uri(&format!("/api/chat/room/{room_id}/price-offer")).insert_header(bearer(&r.provider_tok))
        .set_json(json!({"amount": 500.0, "description": "Extra parts needed"})));
    assert_eq!(status, 201);
    assert_eq!(offer["data"]["message_type"], "price_offer");
    assert_eq!(offer["data"]["content"]["price_offer"]["amount"], 500.0);
    let message_id = offer["data"]["id"].as_str().unwrap().to_string();

    let (_, view) = call!(app, test::TestRequest::get().uri(&format!("/api/chat/room/{}", r.booking)).insert_header(bearer(&r.consumer_tok)));
    assert_eq!(view["data"]["negotiation_data"]["current_offer"], 500.0);
    assert_eq!(view["data"]["negotiation_data"]["counter_offers"][0]["status"], "pending");

    let respond = format!("/api/chat/room/{room_id}/price-offer/{message_id}/respond");
    let (status, _) = call!(app, test::TestRequest::post().uri(&respond).insert_header(bearer(&r.provider_tok)).set_json(json!({"action": "accept"})));
    assert_eq!(status, 403);
    let (status, reply) = call!(app, test::TestRequest::post().uri(&respond).insert_header(bearer(&r.consumer_tok))
        .set_json(json!({"action": "accept", "message": "deal"})));
    assert_eq!(status, 200);
    assert_eq!(reply["data"]["message_type"], "system");
    assert_eq!(reply["data"]["content"]["text"], "Price offer accepted. deal");
    assert_eq!(reply["data"]["reply_to"], json!(message_id));

    let (_, booking) = call!(app, test::TestRequest::get().uri(&format!("/api/bookings/{}", r.booking)).insert_header(bearer(&r.consumer_tok)));
    assert_eq!(booking["data"]["status"], "confirmed");
    assert_eq!(booking["data"]["total_amount"], 500.0);

    let (_, view) = call!(app, test::TestRequest::get().uri(&format!("/api/chat/room/{}", r.booking)).insert_header(bearer(&r.consumer_tok)));
    assert_eq!(view["data"]["negotiation_data"]["agreed_price"], 500.0);

    let (status, _) = call!(app, test::TestRequest::post().uri(&format!("/api/chat/room/{room_id}/price-offer/{}/respond", Id::new_v4()))
        .insert_header(bearer(&r.consumer_tok)).set_json(json!({"action": "reject"})));
    assert_eq!(status, 404);
}

#[actix_web::test]
async fn rest_proposals_show_up_in_the_room() {
    let (repo, _files, state) = state();
    let app = app!(state);
    let r = booked(&repo).await;
    let (_, room) = call!(app, test::TestRequest::get().uri(&format!("/api/chat/room/{}", r.booking)).insert_header(bearer(&r.consumer_tok)));
    let room_id = room["data"]["id"].as_str().unwrap().to_string();

    let (_, proposal) = call!(app, test::TestRequest::post().uri(&format!("/api/bookings/{}/proposals", r.booking)).insert_header(bearer(&r.consumer_tok))
        .set_json(json!({"proposal_type": "price", "proposed_changes": {"price": 350.0}})));
    let id = proposal["data"]["id"].as_str().unwrap().to_string();
    call!(app, test::TestRequest::patch().uri(&format!("/api/proposals/{id}/respond")).insert_header(bearer(&r.provider_tok))
        .set_json(json!({"action": "reject", "response_message": "Too low"})));

    let (_, page) = call!(app, test::TestRequest::get().uri(&format!("/api/chat/room/{room_id}/messages")).insert_header(bearer(&r.consumer_tok)));
    let list = page["data"].as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["content"]["price_offer"]["proposal_id"], json!(id));
    assert_eq!(list[1]["content"]["text"], "Proposal rejected. Too low");
}

#[actix_web::test]
async fn schedule_change_must_be_in_the_future() {
    let (repo, _files, state) = state();
    let app = app!(state);
    let r = booked(&repo).await;
    let (_, room) = call!(app, test::TestRequest::get().uri(&format!("/api/chat/room/{}", r.booking)).insert_header(bearer(&r.consumer_tok)));
    let uri = format!("/api/chat/room/{}/schedule", room["data"]["id"].as_str().unwrap());

    let (status, body) = call!(app, test::TestRequest::post().uri(&uri).insert_header(bearer(&r.provider_tok)).set_json(json!({"proposed_date": days_from_now(-1)})));
    assert_eq!(status, 400);
    assert_eq!(body["message"], "Proposed date must be in the future");

    let (status, body) = call!(app, test::TestRequest::post().uri(&uri).insert_header(bearer(&r.provider_tok))
        .set_json(json!({"proposed_date": days_from_now(6), "proposed_time": "14:00", "reason": "Parts arrive late"})));
    assert_eq!(status, 201);
    assert_eq!(body["data"]["message_type"], "schedule_modification");
    assert_eq!(body["data"]["content"]["schedule_modification"]["proposed_time"], "14:00");
}

#[actix_web::test]
async fn uploaded_document_is_posted_and_served() {
    let (repo, files, state) = state();
    let app = app!(state);
    let r = booked(&repo).await;
    let (_, room) = call!(app, test::TestRequest::get().uri(&format!("/api/chat/room/{}", r.booking)).insert_header(bearer(&r.consumer_tok)));
    let uri = format!("/api/chat/room/{}/upload", room["data"]["id"].as_str().unwrap());

    let (ct, body) = multipart("quote.txt", b"Replace 2m of pipe", Some("The old quote"));
    let (status, msg) = call!(app, test::TestRequest::post().uri(&uri).insert_header(bearer(&r.consumer_tok))
        .insert_header(("content-type", ct)).set_payload(body));
    assert_eq!(status, 201);
    assert_eq!(msg["data"]["message_type"], "document");
    assert_eq!(msg["data"]["content"]["text"], "The old quote");
    let attachment = &msg["data"]["content"]["attachments"][0];
    assert_eq!(attachment["filename"], "quote.txt");
    assert_eq!(attachment["size"], 18);
    let url = attachment["url"].as_str().unwrap().to_string();
    assert!(url.starts_with("/uploads/chat/"));
    assert_eq!(files.files.lock().unwrap().len(), 1);

    let resp = test::call_service(&app, test::TestRequest::get().uri(&url).to_request()).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(test::read_body(resp).await.as_ref(), b"Replace 2m of pipe");
}

#[actix_web::test]
async fn disallowed_or_missing_files_are_refused() {
    let (repo, _files, state) = state();
    let app = app!(state);
    let r = booked(&repo).await;
    let (_, room) = call!(app, test::TestRequest::get().uri(&format!("/api/chat/room/{}", r.booking)).insert_header(bearer(&r.consumer_tok)));
    let uri = format!("/api/chat/room/{}/upload", room["data"]["id"].as_str().unwrap());

    let (ct, body) = multipart("setup.exe", b"MZ\x90\x00binary", None);
    let (status, _) = call!(app, test::TestRequest::post().uri(&uri).insert_header(bearer(&r.consumer_tok))
        .insert_header(("content-type", ct)).set_payload(body));
    assert_eq!(status, 415);

    let (ct, body) = multipart("empty.txt", b"", None);
    let (status, body) = call!(app, test::TestRequest::post().uri(&uri).insert_header(bearer(&r.consumer_tok))
        .insert_header(("content-type", ct)).set_payload(body));
    assert_eq!(status, 400);
    assert_eq!(body["message"], "No file uploaded");
}

#[actix_web::test]
async fn oversized_upload_is_rejected() {
    let mut cfg = test_config();
    cfg.max_upload_bytes = 8;
    let (repo, _files, state) = state_with(cfg);
    let app = app!(state);
    let r = booked(&repo).await;
    let (_, room) = call!(app, test::TestRequest::get().uri(&format!("/api/chat/room/{}", r.booking)).insert_header(bearer(&r.consumer_tok)));
    let uri = format!("/api/chat/room/{}/upload", room["data"]["id"].as_str().unwrap());

    let (ct, body) = multipart("long.txt", b"this is more than eight bytes", None);
    let (status, _) = call!(app, test::TestRequest::post().uri(&uri).insert_header(bearer(&r.consumer_tok))
        .insert_header(("content-type", ct)).set_payload(body));
    assert_eq!(status, 413);
}

#[macro_use]
mod common;

use actix_web::dev::Payload;
use actix_web::{test, web, FromRequest};
use serde_json::json;
use urbifix::auth::{create_jwt, Auth, Role};
use urbifix::models::Id;
use urbifix::repo::UserRepo;

use common::*;

fn registration(email: &str, role: &str) -> serde_json::Value {
    json!({ "name": "Dana", "email": email, "password": PASSWORD, "role": role })
}

#[actix_web::test]
async fn register_login_and_me() {
    let (_repo, _files, state) = state();
    let app = app!(state);

    let (status, body) = call!(app, test::TestRequest::post().uri("/api/auth/register").set_json(registration("Dana@Example.com", "consumer")));
    assert_eq!(status, 201);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["user"]["email"], "dana@example.com");
    assert!(body["data"]["user"].get("password_hash").is_none());

    let (status, body) = call!(app, test::TestRequest::post().uri("/api/auth/login").set_json(json!({"email": "dana@example.com", "password": PASSWORD})));
    assert_eq!(status, 200);
    let token = body["data"]["token"].as_str().unwrap().to_string();

    let (status, body) = call!(app, test::TestRequest::get().uri("/api/auth/me").insert_header(bearer(&token)));
    assert_eq!(status, 200);
    assert_eq!(body["data"]["role"], "consumer");
}

#[actix_web::test]
async fn duplicate_email_is_rejected() {
    let (_repo, _files, state) = state();
    let app = app!(state);
    let (status, _) = call!(app, test::TestRequest::post().uri("/api/auth/register").set_json(registration("sam@example.com", "provider")));
    assert_eq!(status, 201);
    let (status, body) = call!(app, test::TestRequest::post().uri("/api/auth/register").set_json(registration("SAM@example.com", "consumer")));
    assert_eq!(status, 400);
    assert_eq!(body["message"], "Email already registered");
}

#[actix_web::test]
async fn short_password_and_bad_email_are_rejected() {
    let (_repo, _files, state) = state();
    let app = app!(state);
    let (status, _) = call!(app, test::TestRequest::post().uri("/api/auth/register")
        .set_json(json!({"name": "A", "email": "a@example.com", "password": "short", "role": "consumer"})));
    assert_eq!(status, 400);
    let (status, _) = call!(app, test::TestRequest::post().uri("/api/auth/register")
        .set_json(json!({"name": "A", "email": "not-an-email", "password": PASSWORD, "role": "consumer"})));
    assert_eq!(status, 400);
}

#[actix_web::test]
async fn admin_registration_needs_the_key() {
    let mut cfg = test_config();
    cfg.admin_registration_key = Some("let-me-in".into());
    let (_repo, _files, state) = state_with(cfg);
    let app = app!(state);

    let (status, _) = call!(app, test::TestRequest::post().uri("/api/auth/register").set_json(registration("root@example.com", "admin")));
    assert_eq!(status, 403);

    let mut body = registration("root@example.com", "admin");
    body["admin_key"] = json!("let-me-in");
    let (status, body) = call!(app, test::TestRequest::post().uri("/api/auth/register").set_json(body));
    assert_eq!(status, 201);
    assert_eq!(body["data"]["user"]["role"], "admin");
}

#[actix_web::test]
async fn admin_registration_disabled_without_key() {
    let (_repo, _files, state) = state();
    let app = app!(state);
    let mut body = registration("root@example.com", "admin");
    body["admin_key"] = json!("anything");
    let (status, _) = call!(app, test::TestRequest::post().uri("/api/auth/register").set_json(body));
    assert_eq!(status, 403);
}

#[actix_web::test]
async fn wrong_password_and_deactivated_account() {
    let (repo, _files, state) = state();
    let app = app!(state);
    let (user, _) = seed_user(&repo, Role::Consumer, "Lee").await;

    let (status, body) = call!(app, test::TestRequest::post().uri("/api/auth/login").set_json(json!({"email": user.email, "password": "wrong-password"})));
    assert_eq!(status, 401);
    assert_eq!(body["message"], "Invalid credentials");

    let (status, _) = call!(app, test::TestRequest::post().uri("/api/auth/login").set_json(json!({"email": "nobody@example.com", "password": PASSWORD})));
    assert_eq!(status, 401);

    let mut stored = repo.get_user(user.id).await.unwrap();
    stored.is_active = false;
    repo.update_user(stored).await.unwrap();
    let (status, body) = call!(app, test::TestRequest::post().uri("/api/auth/login").set_json(json!({"email": user.email, "password": PASSWORD})));
    assert_eq!(status, 403);
    assert_eq!(body["message"], "Account is deactivated");
}

#[actix_web::test]
async fn protected_routes_need_a_valid_token() {
    let (_repo, _files, state) = state();
    let app = app!(state);
    let (status, body) = call!(app, test::TestRequest::get().uri("/api/issues"));
    assert_eq!(status, 401);
    assert_eq!(body["success"], false);

    let (status, _) = call!(app, test::TestRequest::get().uri("/api/issues").insert_header(bearer("not-a-token")));
    assert_eq!(status, 401);

    let forged = create_jwt("some-other-secret-some-other-secret!!", Id::new_v4(), Role::Admin, 1).unwrap();
    let (status, _) = call!(app, test::TestRequest::get().uri("/api/issues").insert_header(bearer(&forged)));
    assert_eq!(status, 401);
}

#[actix_web::test]
async fn extractor_yields_actor() {
    let (repo, _files, state) = state();
    let (user, token) = seed_user(&repo, Role::Provider, "Pat").await;
    let req = test::TestRequest::default()
        .insert_header(bearer(&token))
        .app_data(web::Data::new(state))
        .to_http_request();
    let auth = Auth::from_request(&req, &mut Payload::None).await.expect("extract");
    assert_eq!(auth.0.id, user.id);
    assert_eq!(auth.0.role, Role::Provider);

    // well signed, but nobody by that id
    let ghost = create_jwt(SECRET, Id::new_v4(), Role::Admin, 1).unwrap();
    let req = test::TestRequest::default()
        .insert_header(bearer(&ghost))
        .app_data(web::Data::new(state_with(test_config()).2))
        .to_http_request();
    assert!(Auth::from_request(&req, &mut Payload::None).await.is_err());
}

#[actix_web::test]
async fn deactivation_revokes_live_tokens() {
    let (repo, _files, state) = state();
    let app = app!(state);
    let (_, admin) = seed_user(&repo, Role::Admin, "Ada").await;
    let (user, token) = seed_user(&repo, Role::Consumer, "Cara").await;

    let (status, _) = call!(app, test::TestRequest::get().uri("/api/auth/me").insert_header(bearer(&token)));
    assert_eq!(status, 200);

    let (status, _) = call!(app, test::TestRequest::patch().uri(&format!("/api/admin/users/{}/status", user.id))
        .insert_header(bearer(&admin)).set_json(json!({"is_active": false})));
    assert_eq!(status, 200);

    let (status, body) = call!(app, test::TestRequest::get().uri("/api/auth/me").insert_header(bearer(&token)));
    assert_eq!(status, 403);
    assert_eq!(body["message"], "Account is deactivated");
    let (status, _) = call!(app, test::TestRequest::get().uri("/api/issues").insert_header(bearer(&token)));
    assert_eq!(status, 403);
}

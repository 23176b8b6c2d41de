#[macro_use]
mod common;

use actix_web::test;
use serde_json::json;
use urbifix::auth::Role;

use common::*;

#[actix_web::test]
async fn categories_are_admin_managed() {
    let (repo, _files, state) = state();
    let app = app!(state);
    let (_, admin) = seed_user(&repo, Role::Admin, "Ada").await;
    let (_, consumer) = seed_user(&repo, Role::Consumer, "Cara").await;

    let (status, _) = call!(app, test::TestRequest::post().uri("/api/admin/categories").insert_header(bearer(&consumer)).set_json(json!({"name": "Parks"})));
    assert_eq!(status, 403);

    let (status, body) = call!(app, test::TestRequest::post().uri("/api/admin/categories").insert_header(bearer(&admin))
        .set_json(json!({"name": "Parks", "description": "Green spaces", "icon": "tree"})));
    assert_eq!(status, 201);
    let parks = body["data"]["id"].as_str().unwrap().to_string();

    let (status, body) = call!(app, test::TestRequest::post().uri("/api/admin/categories").insert_header(bearer(&admin)).set_json(json!({"name": "parks"})));
    assert_eq!(status, 400);
    assert_eq!(body["message"], "Category name already exists");

    let (status, body) = call!(app, test::TestRequest::put().uri(&format!("/api/admin/categories/{parks}")).insert_header(bearer(&admin)).set_json(json!({"is_active": false})));
    assert_eq!(status, 200);
    assert_eq!(body["data"]["is_active"], false);

    // public listing hides inactive categories, admins may ask for them
    let (status, body) = call!(app, test::TestRequest::get().uri("/api/categories"));
    assert_eq!(status, 200);
    assert_eq!(body["data"], json!([]));
    let (_, body) = call!(app, test::TestRequest::get().uri("/api/categories?include_inactive=true").insert_header(bearer(&consumer)));
    assert_eq!(body["data"], json!([]));
    let (_, body) = call!(app, test::TestRequest::get().uri("/api/categories?include_inactive=true").insert_header(bearer(&admin)));
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[actix_web::test]
async fn users_are_listed_and_deactivated() {
    let (repo, _files, state) = state();
    let app = app!(state);
    let (me, admin) = seed_user(&repo, Role::Admin, "Ada").await;
    let (consumer, consumer_tok) = seed_user(&repo, Role::Consumer, "Cara").await;
    seed_user(&repo, Role::Provider, "Pat").await;

    let (status, _) = call!(app, test::TestRequest::get().uri("/api/admin/users").insert_header(bearer(&consumer_tok)));
    assert_eq!(status, 403);
    let (_, body) = call!(app, test::TestRequest::get().uri("/api/admin/users").insert_header(bearer(&admin)));
    assert_eq!(body["pagination"]["total"], 3);
    assert!(body["data"][0].get("password_hash").is_none());
    let (_, body) = call!(app, test::TestRequest::get().uri("/api/admin/users?role=provider").insert_header(bearer(&admin)));
    assert_eq!(body["pagination"]["total"], 1);

    let (status, body) = call!(app, test::TestRequest::patch().uri(&format!("/api/admin/users/{}/status", me.id)).insert_header(bearer(&admin)).set_json(json!({"is_active": false})));
    assert_eq!(status, 400);
    assert_eq!(body["message"], "You cannot deactivate your own account");

    let (status, body) = call!(app, test::TestRequest::patch().uri(&format!("/api/admin/users/{}/status", consumer.id)).insert_header(bearer(&admin)).set_json(json!({"is_active": false})));
    assert_eq!(status, 200);
    assert_eq!(body["data"]["is_active"], false);
    let (status, _) = call!(app, test::TestRequest::post().uri("/api/auth/login").set_json(json!({"email": consumer.email, "password": PASSWORD})));
    assert_eq!(status, 403);
}

#[actix_web::test]
async fn only_providers_are_verified() {
    let (repo, _files, state) = state();
    let app = app!(state);
    let (_, admin) = seed_user(&repo, Role::Admin, "Ada").await;
    let (consumer, _) = seed_user(&repo, Role::Consumer, "Cara").await;
    let (provider, _) = seed_user(&repo, Role::Provider, "Pat").await;

    let (status, body) = call!(app, test::TestRequest::patch().uri(&format!("/api/admin/providers/{}/verify", consumer.id)).insert_header(bearer(&admin)).set_json(json!({"is_verified": true})));
    assert_eq!(status, 400);
    assert_eq!(body["message"], "User is not a provider");

    let (status, body) = call!(app, test::TestRequest::patch().uri(&format!("/api/admin/providers/{}/verify", provider.id)).insert_header(bearer(&admin)).set_json(json!({"is_verified": true})));
    assert_eq!(status, 200);
    assert_eq!(body["data"]["provider_profile"]["is_verified"], true);
}

#[actix_web::test]
async fn services_belong_to_their_provider() {
    let (repo, _files, state) = state();
    let app = app!(state);
    let (_, provider) = seed_user(&repo, Role::Provider, "Pat").await;
    let (_, rival) = seed_user(&repo, Role::Provider, "Rita").await;
    let (_, consumer) = seed_user(&repo, Role::Consumer, "Cara").await;
    let plumbing = seed_category(&repo, "Plumbing").await;

    let service = json!({"category": plumbing.id, "name": "Pipe repair", "base_price": 80.0});
    let (status, _) = call!(app, test::TestRequest::post().uri("/api/services").insert_header(bearer(&consumer)).set_json(service.clone()));
    assert_eq!(status, 403);
    let (status, body) = call!(app, test::TestRequest::post().uri("/api/services").insert_header(bearer(&provider))
        .set_json(json!({"category": plumbing.id, "name": "Free work", "base_price": 0})));
    assert_eq!(status, 400);
    assert_eq!(body["message"], "Base price must be greater than zero");

    let (status, body) = call!(app, test::TestRequest::post().uri("/api/services").insert_header(bearer(&provider)).set_json(service));
    assert_eq!(status, 201);
    let id = body["data"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/services/{id}");

    let (status, _) = call!(app, test::TestRequest::put().uri(&uri).insert_header(bearer(&rival)).set_json(json!({"base_price": 10.0})));
    assert_eq!(status, 403);
    let (status, body) = call!(app, test::TestRequest::put().uri(&uri).insert_header(bearer(&provider)).set_json(json!({"base_price": 95.0})));
    assert_eq!(status, 200);
    assert_eq!(body["data"]["base_price"], 95.0);

    let (_, body) = call!(app, test::TestRequest::get().uri(&format!("/api/services?category={}", plumbing.id)));
    assert_eq!(body["pagination"]["total"], 1);

    let (status, _) = call!(app, test::TestRequest::delete().uri(&uri).insert_header(bearer(&provider)));
    assert_eq!(status, 200);
    let (status, _) = call!(app, test::TestRequest::get().uri(&uri));
    assert_eq!(status, 404);
}

#[actix_web::test]
async fn dashboards_follow_the_role() {
    let (repo, _files, state) = state();
    let app = app!(state);
    let (_, admin) = seed_user(&repo, Role::Admin, "Ada").await;
    let (_, consumer) = seed_user(&repo, Role::Consumer, "Cara").await;
    let (_, provider) = seed_user(&repo, Role::Provider, "Pat").await;
    let roads = seed_category(&repo, "Roads").await;
    call!(app, test::TestRequest::post().uri("/api/issues").insert_header(bearer(&consumer))
        .set_json(json!({"title": "Pothole", "description": "Big one", "category": roads.id})));

    let (status, body) = call!(app, test::TestRequest::get().uri("/api/stats/dashboard").insert_header(bearer(&consumer)));
    assert_eq!(status, 200);
    assert_eq!(body["data"]["role"], "consumer");
    assert_eq!(body["data"]["issues_reported"], 1);
    assert_eq!(body["data"]["open_issues"], 1);

    let (_, body) = call!(app, test::TestRequest::get().uri("/api/stats/dashboard").insert_header(bearer(&provider)));
    assert_eq!(body["data"]["role"], "provider");
    assert_eq!(body["data"]["total_bookings"], 0);

    let (status, _) = call!(app, test::TestRequest::get().uri("/api/admin/stats").insert_header(bearer(&provider)));
    assert_eq!(status, 403);
    let (status, body) = call!(app, test::TestRequest::get().uri("/api/admin/stats").insert_header(bearer(&admin)));
    assert_eq!(status, 200);
    assert_eq!(body["data"]["role"], "admin");
    assert_eq!(body["data"]["users"], json!({"consumers": 1, "providers": 1, "admins": 1}));
    assert_eq!(body["data"]["issues"]["open"], 1);
}

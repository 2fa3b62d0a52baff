mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use serde_json::json;

use common::{TestApp, User};

const BOUNDARY: &str = "taskdeck-test-boundary";

fn avatar_request(user: &User, field: &str, content_type: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"me.png\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/api/profile/avatar")
        .header(header::AUTHORIZATION, format!("Bearer {}", user.token))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn first_request_creates_the_profile() {
    let app = TestApp::new();
    let alice = app.user("alice").await;

    let resp = app.get("/api/profile", &alice).await;
    assert_eq!(resp.body["data"]["id"], alice.id.as_str());
    assert_eq!(resp.body["data"]["email"], alice.email.as_str());

    let resp = app
        .put("/api/profile", &alice, json!({ "full_name": "  Alice Smith " }))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["message"], "Profile updated successfully");
    assert_eq!(resp.body["data"]["full_name"], "Alice Smith");
}

#[tokio::test]
async fn avatar_upload_validates_and_replaces() {
    let app = TestApp::new();
    let alice = app.user("alice").await;

    let resp = app
        .send(avatar_request(&alice, "picture", "image/png", b"png"))
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.body["error"], "No file uploaded");

    let resp = app
        .send(avatar_request(&alice, "avatar", "text/plain", b"hello"))
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let first = app
        .send(avatar_request(&alice, "avatar", "image/png", b"png-1"))
        .await;
    assert_eq!(first.status, StatusCode::OK, "{}", first.body);
    let first_path = first.body["data"]["path"].as_str().unwrap().to_string();
    assert!(first_path.starts_with(&format!("{}/", alice.id)));
    assert!(first_path.ends_with(".png"));

    // Keys are millisecond stamped.
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = app
        .send(avatar_request(&alice, "avatar", "image/png", b"png-2"))
        .await;
    assert_eq!(second.status, StatusCode::OK);
    let second_path = second.body["data"]["path"].as_str().unwrap().to_string();

    let events = app.events();
    let put_second = events
        .iter()
        .position(|e| *e == format!("avatar.put {second_path}"))
        .unwrap();
    let remove_first = events
        .iter()
        .position(|e| *e == format!("avatar.remove {first_path}"))
        .unwrap();
    assert!(put_second < remove_first, "{events:?}");

    let profile = app.get("/api/profile", &alice).await;
    assert_eq!(
        profile.body["data"]["avatar_url"],
        second.body["data"]["avatar_url"]
    );

    let resp = app.delete("/api/profile/avatar", &alice).await;
    assert_eq!(resp.status, StatusCode::OK);
    let resp = app.delete("/api/profile/avatar", &alice).await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert_eq!(resp.body["error"], "No avatar to delete");
}

#[tokio::test]
async fn account_deletion_removes_avatar_before_identity() {
    let app = TestApp::new();
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;

    let upload = app
        .send(avatar_request(&alice, "avatar", "image/jpeg", b"jpg"))
        .await;
    let key = upload.body["data"]["path"].as_str().unwrap().to_string();
    app.post("/api/tasks", &alice, json!({ "title": "Mine" })).await;

    let resp = app.delete("/api/profile", &alice).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["message"], "Account deleted successfully");

    let events = app.events();
    let removed = events
        .iter()
        .position(|e| *e == format!("avatar.remove {key}"))
        .unwrap();
    let deleted = events
        .iter()
        .position(|e| *e == format!("identity.delete {}", alice.id))
        .unwrap();
    assert!(removed < deleted, "{events:?}");

    let resp = app.get(&format!("/api/users/{}", alice.id), &bob).await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn user_search_excludes_the_caller() {
    let app = TestApp::new();
    let alice = app.user("alice.search").await;
    let _ally = app.user("ally.search").await;

    let resp = app.get("/api/users/search?email=search", &alice).await;
    assert_eq!(resp.status, StatusCode::OK);
    let emails: Vec<&str> = resp.body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["email"].as_str().unwrap())
        .collect();
    assert_eq!(emails, vec!["ally.search@example.com"]);

    let resp = app.get("/api/users/search", &alice).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
}

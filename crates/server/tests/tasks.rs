mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::TestApp;

#[tokio::test]
async fn requests_without_a_token_are_rejected() {
    let app = TestApp::new();
    let resp = app.call(Method::GET, "/api/tasks", None, None).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.body["success"], false);
    assert_eq!(resp.body["error"], "Missing or invalid authorization header");
}

#[tokio::test]
async fn personal_tasks_are_private_to_their_owner() {
    let app = TestApp::new();
    let alice = app.user("alice").await;
    let bob = app.user("bob").await;

    let resp = app
        .post("/api/tasks", &alice, json!({ "title": "  Write report " }))
        .await;
    assert_eq!(resp.status, StatusCode::CREATED);
    assert_eq!(resp.body["message"], "Task created successfully");
    assert_eq!(resp.body["data"]["title"], "Write report");
    assert_eq!(resp.body["data"]["status"], "todo");
    assert_eq!(resp.body["data"]["priority"], "medium");
    let task_id = resp.body["data"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/tasks/{task_id}");

    assert_eq!(app.get(&uri, &bob).await.status, StatusCode::FORBIDDEN);
    assert_eq!(
        app.put(&uri, &bob, json!({ "status": "completed" })).await.status,
        StatusCode::FORBIDDEN
    );
    assert_eq!(app.delete(&uri, &bob).await.status, StatusCode::FORBIDDEN);

    let listed = app.get("/api/tasks", &bob).await;
    assert_eq!(listed.body["data"].as_array().unwrap().len(), 0);

    let listed = app.get("/api/tasks", &alice).await;
    assert_eq!(listed.body["workspace"], "personal");
    assert_eq!(listed.body["pagination"]["total"], 1);
    assert_eq!(listed.body["pagination"]["has_more"], false);

    let resp = app.delete(&uri, &alice).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["message"], "Task deleted successfully");
    assert_eq!(app.get(&uri, &alice).await.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn task_validation_reports_every_field() {
    let app = TestApp::new();
    let alice = app.user("alice").await;

    let resp = app
        .post(
            "/api/tasks",
            &alice,
            json!({ "title": "", "due_date": "next tuesday" }),
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.body["error"], "Validation failed");
    let fields: Vec<&str> = resp.body["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["field"].as_str().unwrap())
        .collect();
    assert!(fields.contains(&"title"));
    assert!(fields.contains(&"due_date"));

    let resp = app.get("/api/tasks/not-a-uuid", &alice).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn team_members_may_only_change_status() {
    let app = TestApp::new();
    let lead = app.user("lead").await;
    let member = app.user("member").await;
    let team_id = app.team(&lead, &[&member]).await;

    let resp = app
        .post(
            "/api/tasks",
            &lead,
            json!({ "title": "Ship it", "team_id": team_id, "assigned_to": member.id }),
        )
        .await;
    assert_eq!(resp.status, StatusCode::CREATED, "{}", resp.body);
    let task_id = resp.body["data"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/tasks/{task_id}");

    // A mixed payload is refused as a whole.
    let resp = app
        .put(&uri, &member, json!({ "status": "in_progress", "title": "Renamed" }))
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
    let task = app.get(&uri, &member).await;
    assert_eq!(task.body["data"]["title"], "Ship it");
    assert_eq!(task.body["data"]["status"], "todo");

    let resp = app.put(&uri, &member, json!({ "status": "in_progress" })).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["data"]["status"], "in_progress");

    let resp = app.put(&uri, &lead, json!({ "title": "Ship it today" })).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["data"]["title"], "Ship it today");

    assert_eq!(app.delete(&uri, &member).await.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn members_cannot_touch_any_field_besides_status() {
    let app = TestApp::new();
    let lead = app.user("lead").await;
    let member = app.user("member").await;
    let team_id = app.team(&lead, &[&member]).await;

    let resp = app
        .post(
            "/api/tasks",
            &lead,
            json!({
                "title": "Ship it",
                "description": "Cut the release",
                "priority": "high",
                "category": "ops",
                "due_date": "2025-03-01T08:00:00Z",
                "team_id": team_id,
                "assigned_to": member.id,
            }),
        )
        .await;
    assert_eq!(resp.status, StatusCode::CREATED, "{}", resp.body);
    let task_id = resp.body["data"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/tasks/{task_id}");
    let before = app.get(&uri, &member).await.body["data"].clone();

    let payloads = [
        json!({ "status": "completed", "title": "Renamed" }),
        json!({ "status": "completed", "description": "Rewritten" }),
        json!({ "status": "completed", "priority": "low" }),
        json!({ "status": "completed", "category": "misc" }),
        json!({ "status": "completed", "due_date": "2030-01-01T00:00:00Z" }),
        json!({ "status": "completed", "assigned_to": lead.id }),
        json!({ "status": "completed", "description": null }),
        json!({ "status": "completed", "category": null }),
        json!({ "status": "completed", "due_date": null }),
        json!({ "status": "completed", "assigned_to": null }),
        json!({ "status": "completed", "priority": null, "title": null }),
    ];
    for payload in payloads {
        let resp = app.put(&uri, &member, payload.clone()).await;
        assert_eq!(resp.status, StatusCode::FORBIDDEN, "{payload}");
        let after = app.get(&uri, &member).await.body["data"].clone();
        assert_eq!(after, before, "{payload} changed the task");
    }
}

#[tokio::test]
async fn required_task_columns_cannot_be_cleared() {
    let app = TestApp::new();
    let alice = app.user("alice").await;
    let resp = app.post("/api/tasks", &alice, json!({ "title": "Mine" })).await;
    let uri = format!("/api/tasks/{}", resp.body["data"]["id"].as_str().unwrap());

    for payload in [
        json!({ "title": null }),
        json!({ "status": null }),
        json!({ "priority": null }),
    ] {
        let resp = app.put(&uri, &alice, payload.clone()).await;
        assert_eq!(resp.status, StatusCode::BAD_REQUEST, "{payload}");
    }
    let task = app.get(&uri, &alice).await;
    assert_eq!(task.body["data"]["title"], "Mine");
    assert_eq!(task.body["data"]["status"], "todo");
    assert_eq!(task.body["data"]["priority"], "medium");
}

#[tokio::test]
async fn members_cannot_create_team_tasks() {
    let app = TestApp::new();
    let lead = app.user("lead").await;
    let member = app.user("member").await;
    let team_id = app.team(&lead, &[&member]).await;

    let resp = app
        .post("/api/tasks", &member, json!({ "title": "Mine", "team_id": team_id }))
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
    assert_eq!(resp.body["error"], "Only team leaders can create team tasks");
}

#[tokio::test]
async fn assignment_is_checked_and_notified() {
    let app = TestApp::new();
    let lead = app.user("lead").await;
    let member = app.user("member").await;
    let outsider = app.user("outsider").await;
    let team_id = app.team(&lead, &[&member]).await;

    let resp = app
        .post(
            "/api/tasks",
            &lead,
            json!({ "title": "Review", "team_id": team_id, "assigned_to": outsider.id }),
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.body["error"], "Assigned user is not a team member");

    let resp = app
        .post(
            "/api/tasks",
            &lead,
            json!({ "title": "Review", "team_id": team_id, "assigned_to": member.id }),
        )
        .await;
    assert_eq!(resp.status, StatusCode::CREATED);

    let notes = app.get("/api/notifications", &member).await;
    let kinds: Vec<&str> = notes.body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["type"].as_str().unwrap())
        .collect();
    assert!(kinds.contains(&"task_assigned"));
    assert!(kinds.contains(&"team_invitation"));

    let resp = app
        .post(
            "/api/tasks",
            &lead,
            json!({ "title": "Solo", "assigned_to": member.id }),
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.body["error"], "Personal tasks cannot be assigned to others");
}

#[tokio::test]
async fn team_listing_requires_membership() {
    let app = TestApp::new();
    let lead = app.user("lead").await;
    let outsider = app.user("outsider").await;
    let team_id = app.team(&lead, &[]).await;

    let resp = app.get("/api/tasks?workspace=team", &lead).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let uri = format!("/api/tasks?workspace=team&team_id={team_id}");
    assert_eq!(app.get(&uri, &outsider).await.status, StatusCode::FORBIDDEN);

    app.post("/api/tasks", &lead, json!({ "title": "One", "team_id": team_id }))
        .await;
    let resp = app.get(&uri, &lead).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["workspace"], "team");
    assert_eq!(resp.body["data"].as_array().unwrap().len(), 1);

    // Team tasks stay out of the personal listing.
    let personal = app.get("/api/tasks", &lead).await;
    assert_eq!(personal.body["data"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn comments_and_progress_follow_task_access() {
    let app = TestApp::new();
    let lead = app.user("lead").await;
    let member = app.user("member").await;
    let other = app.user("other").await;
    let team_id = app.team(&lead, &[&member, &other]).await;

    let resp = app
        .post(
            "/api/tasks",
            &lead,
            json!({ "title": "Ship it", "team_id": team_id, "assigned_to": member.id }),
        )
        .await;
    let task_id = resp.body["data"]["id"].as_str().unwrap().to_string();

    let resp = app
        .post(
            &format!("/api/tasks/{task_id}/comments"),
            &other,
            json!({ "content": "looks good" }),
        )
        .await;
    assert_eq!(resp.status, StatusCode::CREATED);
    let comment_id = resp.body["data"]["id"].as_str().unwrap().to_string();

    // Only the author edits a comment, even a team leader cannot.
    let resp = app
        .patch(&format!("/api/comments/{comment_id}"), &lead, json!({ "content": "x" }))
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let progress_uri = format!("/api/tasks/{task_id}/progress");
    let resp = app
        .post(&progress_uri, &other, json!({ "status": "on_track", "progress_percentage": 10 }))
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let resp = app
        .post(&progress_uri, &member, json!({ "status": "on_track", "progress_percentage": 40 }))
        .await;
    assert_eq!(resp.status, StatusCode::CREATED, "{}", resp.body);
    assert_eq!(resp.body["message"], "Progress update added");

    let resp = app.get(&progress_uri, &other).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["data"][0]["progress_percentage"], 40);
}

mod common;

use axum::http::StatusCode;
use serde_json::json;

use common::TestApp;

#[tokio::test]
async fn creator_becomes_the_leader() {
    let app = TestApp::new();
    let lead = app.user("lead").await;

    let resp = app
        .post(
            "/api/teams",
            &lead,
            json!({ "name": "Platform", "description": "infra and tooling" }),
        )
        .await;
    assert_eq!(resp.status, StatusCode::CREATED);
    assert_eq!(resp.body["message"], "Team created successfully");
    let team_id = resp.body["data"]["id"].as_str().unwrap().to_string();

    let resp = app.get(&format!("/api/teams/{team_id}"), &lead).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["data"]["member_count"], 1);
    assert_eq!(resp.body["data"]["members"][0]["user_id"], lead.id.as_str());
    assert_eq!(resp.body["data"]["members"][0]["role"], "leader");

    let resp = app.get("/api/teams", &lead).await;
    assert_eq!(resp.body["data"][0]["role"], "leader");
    assert_eq!(resp.body["data"][0]["name"], "Platform");
}

#[tokio::test]
async fn adding_a_member_notifies_and_emails_them() {
    let app = TestApp::new();
    let lead = app.user("lead").await;
    let member = app.user("member").await;
    let team_id = app.team(&lead, &[&member]).await;

    let notes = app.get("/api/notifications", &member).await;
    assert_eq!(notes.body["data"][0]["type"], "team_invitation");
    assert_eq!(notes.body["data"][0]["read"], false);

    let outbox = app.wait_for_mail(1).await;
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0].to, member.email);
    assert_eq!(outbox[0].subject, "You've been invited to join Platform!");
    assert!(outbox[0].html.contains("http://app.test/dashboard"));

    let again = app
        .post(
            &format!("/api/teams/{team_id}/members"),
            &lead,
            json!({ "user_id": member.id }),
        )
        .await;
    assert_eq!(again.status, StatusCode::CONFLICT);
    assert_eq!(again.body["error"], "User is already a team member");
}

#[tokio::test]
async fn only_leaders_manage_members() {
    let app = TestApp::new();
    let lead = app.user("lead").await;
    let member = app.user("member").await;
    let newcomer = app.user("newcomer").await;
    let team_id = app.team(&lead, &[&member]).await;
    let members_uri = format!("/api/teams/{team_id}/members");

    let resp = app
        .post(&members_uri, &member, json!({ "user_id": newcomer.id }))
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
    assert_eq!(resp.body["error"], "Only team leaders can add members");

    let resp = app
        .post(&members_uri, &lead, json!({ "user_id": uuid::Uuid::new_v4().to_string() }))
        .await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    assert_eq!(resp.body["error"], "User not found");

    let resp = app.post(&members_uri, &lead, json!({})).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let listed = app.get(&members_uri, &member).await;
    let row = listed.body["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["user_id"] == member.id.as_str())
        .unwrap()
        .clone();
    let member_row = format!("{members_uri}/{}", row["id"].as_str().unwrap());

    let resp = app.patch(&member_row, &member, json!({ "role": "leader" })).await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let resp = app.patch(&member_row, &lead, json!({ "role": "leader" })).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["data"]["role"], "leader");
}

#[tokio::test]
async fn users_who_never_signed_in_can_still_be_added() {
    let app = TestApp::new();
    let lead = app.user("lead").await;
    let team_id = app.team(&lead, &[]).await;
    let fresh = app.signed_up_user("fresh");

    let resp = app
        .post(
            &format!("/api/teams/{team_id}/members"),
            &lead,
            json!({ "user_id": fresh.id }),
        )
        .await;
    assert_eq!(resp.status, StatusCode::CREATED, "{}", resp.body);
    assert_eq!(resp.body["data"]["user_id"], fresh.id.as_str());

    let outbox = app.wait_for_mail(1).await;
    assert_eq!(outbox[0].to, fresh.email);

    let teams = app.get("/api/teams", &fresh).await;
    assert_eq!(teams.body["data"][0]["id"], team_id.as_str());
    assert_eq!(teams.body["data"][0]["role"], "member");
}

#[tokio::test]
async fn members_can_leave_and_outsiders_see_nothing() {
    let app = TestApp::new();
    let lead = app.user("lead").await;
    let member = app.user("member").await;
    let outsider = app.user("outsider").await;
    let team_id = app.team(&lead, &[&member]).await;

    let resp = app.get(&format!("/api/teams/{team_id}"), &outsider).await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
    let resp = app.get(&format!("/api/teams/{team_id}/stats"), &outsider).await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let listed = app.get(&format!("/api/teams/{team_id}/members"), &member).await;
    let own_row = listed.body["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["user_id"] == member.id.as_str())
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let resp = app
        .delete(&format!("/api/teams/{team_id}/members/{own_row}"), &member)
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["message"], "Member removed successfully");

    let resp = app.get(&format!("/api/teams/{team_id}"), &member).await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn deleting_a_team_takes_its_tasks_along() {
    let app = TestApp::new();
    let lead = app.user("lead").await;
    let member = app.user("member").await;
    let team_id = app.team(&lead, &[&member]).await;

    let resp = app
        .post("/api/tasks", &lead, json!({ "title": "T", "team_id": team_id }))
        .await;
    let task_id = resp.body["data"]["id"].as_str().unwrap().to_string();

    let stats = app.get(&format!("/api/teams/{team_id}/stats"), &member).await;
    assert_eq!(stats.body["data"]["total_tasks"], 1);

    assert_eq!(
        app.delete(&format!("/api/teams/{team_id}"), &member).await.status,
        StatusCode::FORBIDDEN
    );
    let resp = app.delete(&format!("/api/teams/{team_id}"), &lead).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.body["message"], "Team deleted successfully");

    assert_eq!(
        app.get(&format!("/api/tasks/{task_id}"), &lead).await.status,
        StatusCode::NOT_FOUND
    );
}

#[tokio::test]
async fn meetings_are_scoped_to_the_team() {
    let app = TestApp::new();
    let lead = app.user("lead").await;
    let member = app.user("member").await;
    let outsider = app.user("outsider").await;
    let team_id = app.team(&lead, &[&member]).await;

    let standup = json!({
        "team_id": team_id,
        "title": "Standup",
        "scheduled_at": "2030-01-02T09:00:00+01:00",
    });
    let resp = app.post("/api/meetings", &member, standup.clone()).await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let resp = app.post("/api/meetings", &lead, standup).await;
    assert_eq!(resp.status, StatusCode::CREATED, "{}", resp.body);
    assert_eq!(resp.body["message"], "Meeting scheduled successfully");
    assert_eq!(resp.body["data"]["scheduled_at"], "2030-01-02T08:00:00Z");
    assert_eq!(resp.body["data"]["duration_minutes"], 60);
    let meeting_id = resp.body["data"]["id"].as_str().unwrap().to_string();

    let notes = app.get("/api/notifications", &member).await;
    assert!(
        notes.body["data"]
            .as_array()
            .unwrap()
            .iter()
            .any(|n| n["type"] == "meeting_scheduled")
    );

    assert_eq!(
        app.get(&format!("/api/meetings/{meeting_id}"), &outsider).await.status,
        StatusCode::FORBIDDEN
    );
    let resp = app
        .get(&format!("/api/meetings?team_id={team_id}"), &outsider)
        .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let resp = app.get("/api/meetings", &lead).await;
    assert_eq!(resp.body["data"].as_array().unwrap().len(), 1);
    let resp = app.get("/api/meetings", &outsider).await;
    assert_eq!(resp.body["data"].as_array().unwrap().len(), 0);
}

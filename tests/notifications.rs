//! Integration tests for notifications and reminders.

mod common;

use axum::http::StatusCode;
use rstest::rstest;
use serde_json::{Value, json};

use common::{Session, TestApp};

/// Creates a project owned by `owner` and invites `invitee` into it, which
/// leaves one system notification with the invitee.
async fn invite(app: &TestApp, owner: &Session, title: &str, invitee: &Session) -> String {
    let project = app.create_project(owner, title).await;
    let (status, body) = app
        .post(
            &format!("/api/projects/{project}/invitations"),
            &owner.token,
            json!({ "to": invitee.id }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    project
}

async fn notifications(app: &TestApp, session: &Session, query: &str) -> Value {
    let (status, body) = app.get(&format!("/api/notifications{query}"), &session.token).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body
}

fn reminder(target_type: &str, target_id: &str, send_time: &str) -> Value {
    json!({
        "title": "Stand-up",
        "message": "Prepare the demo",
        "target_type": target_type,
        "target_id": target_id,
        "send_time": send_time,
    })
}

// =============================================================================
// System Notifications
// =============================================================================

#[rstest]
#[tokio::test]
async fn test_invitations_notify_the_invitee() {
    let app = TestApp::new();
    let ada = app.sign_up("Ada", "Lovelace", "ada@example.com").await;
    let grace = app.sign_up("Grace", "Hopper", "grace@example.com").await;
    invite(&app, &ada, "Engine", &grace).await;
    invite(&app, &ada, "Loom", &grace).await;

    let body = notifications(&app, &grace, "?kind=system").await;
    assert_eq!(body["count"], 2);
    assert_eq!(body["items"][0]["title"], "New project invitation");
    assert_eq!(body["items"][0]["target_type"], "Project");
    assert_eq!(body["items"][0]["is_read"], false);

    assert_eq!(notifications(&app, &grace, "?is_read=true").await["count"], 0);
    assert_eq!(notifications(&app, &ada, "").await["count"], 0);
}

#[rstest]
#[tokio::test]
async fn test_mark_one_notification_read() {
    let app = TestApp::new();
    let ada = app.sign_up("Ada", "Lovelace", "ada@example.com").await;
    let grace = app.sign_up("Grace", "Hopper", "grace@example.com").await;
    invite(&app, &ada, "Engine", &grace).await;
    invite(&app, &ada, "Loom", &grace).await;

    let listed = notifications(&app, &grace, "").await;
    let id = listed["items"][0]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/notifications/{id}");

    let (status, body) = app.put(&uri, &grace.token, json!({ "is_read": true })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_read"], true);
    assert_eq!(notifications(&app, &grace, "?is_read=false").await["count"], 1);
    assert_eq!(notifications(&app, &grace, "?is_read=true").await["count"], 1);

    let (status, body) = app.put(&uri, &ada.token, json!({ "is_read": false })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Notification not found");

    let (status, _) = app
        .put("/api/notifications/not-a-uuid", &grace.token, json!({ "is_read": true }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[rstest]
#[tokio::test]
async fn test_mark_all_returns_the_requested_page() {
    let app = TestApp::new();
    let ada = app.sign_up("Ada", "Lovelace", "ada@example.com").await;
    let grace = app.sign_up("Grace", "Hopper", "grace@example.com").await;
    for title in ["Engine", "Loom", "Mill"] {
        invite(&app, &ada, title, &grace).await;
    }

    let (status, body) = app
        .put(
            "/api/notifications",
            &grace.token,
            json!({ "is_read": true, "page": 1, "limit": 2 }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["count"], 3);
    assert_eq!(body["page"], 1);
    assert_eq!(body["limit"], 2);
    assert_eq!(body["total_pages"], 2);
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert!(items.iter().all(|item| item["is_read"] == true));
    assert_eq!(notifications(&app, &grace, "?is_read=false").await["count"], 0);

    let (status, body) = app
        .put("/api/notifications", &grace.token, json!({ "is_read": false }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["limit"], 10);
    assert_eq!(notifications(&app, &grace, "?is_read=false").await["count"], 3);

    let (status, body) = app
        .put("/api/notifications", &grace.token, json!({ "is_read": true, "limit": 101 }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[rstest]
#[tokio::test]
async fn test_delete_one_notification() {
    let app = TestApp::new();
    let ada = app.sign_up("Ada", "Lovelace", "ada@example.com").await;
    let grace = app.sign_up("Grace", "Hopper", "grace@example.com").await;
    invite(&app, &ada, "Engine", &grace).await;

    let id = notifications(&app, &grace, "").await["items"][0]["id"]
        .as_str()
        .unwrap()
        .to_string();
    let uri = format!("/api/notifications/{id}");

    let (status, _) = app.delete(&uri, &ada.token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.delete(&uri, &grace.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id.as_str());
    assert_eq!(notifications(&app, &grace, "").await["count"], 0);

    let (status, _) = app.delete(&uri, &grace.token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[rstest]
#[tokio::test]
async fn test_delete_many_reports_the_count() {
    let app = TestApp::new();
    let ada = app.sign_up("Ada", "Lovelace", "ada@example.com").await;
    let grace = app.sign_up("Grace", "Hopper", "grace@example.com").await;
    for title in ["Engine", "Loom", "Mill"] {
        invite(&app, &ada, title, &grace).await;
    }
    let id = notifications(&app, &grace, "").await["items"][0]["id"]
        .as_str()
        .unwrap()
        .to_string();
    let (status, _) = app
        .put(&format!("/api/notifications/{id}"), &grace.token, json!({ "is_read": true }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.delete("/api/notifications?is_read=true", &grace.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 1);

    let (status, body) = app.delete("/api/notifications?is_read=maybe", &grace.token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
    let (status, _) = app.delete("/api/notifications?kind=system", &grace.token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.delete("/api/notifications", &ada.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 0);

    let (status, body) = app.delete("/api/notifications", &grace.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 2);
    assert_eq!(notifications(&app, &grace, "").await["count"], 0);
}

// =============================================================================
// Reminders
// =============================================================================

#[rstest]
#[tokio::test]
async fn test_reminder_lifecycle() {
    let app = TestApp::new();
    let ada = app.sign_up("Ada", "Lovelace", "ada@example.com").await;
    let (status, task) = app.post("/api/tasks", &ada.token, json!({ "title": "Demo" })).await;
    assert_eq!(status, StatusCode::CREATED);
    let task_id = task["id"].as_str().unwrap();

    let (status, created) = app
        .post(
            "/api/notifications/reminders",
            &ada.token,
            reminder("Task", task_id, "2099-01-01T09:00:00Z"),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    assert_eq!(created["kind"], "user");
    assert_eq!(created["target_id"], task_id);
    let id = created["id"].as_str().unwrap();
    let uri = format!("/api/notifications/reminders/{id}");

    let (status, body) = app.get("/api/notifications/reminders", &ada.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(notifications(&app, &ada, "").await["count"], 0);

    let (status, updated) = app
        .put(&uri, &ada.token, json!({ "title": "Retro", "send_time": "2020-01-01" }))
        .await;
    assert_eq!(status, StatusCode::OK, "{updated}");
    assert_eq!(updated["title"], "Retro");
    assert_eq!(updated["message"], "Prepare the demo");
    assert_eq!(updated["is_read"], false);

    let delivered = notifications(&app, &ada, "?kind=user").await;
    assert_eq!(delivered["count"], 1);
    assert_eq!(delivered["items"][0]["title"], "Retro");

    let (status, body) = app.put(&uri, &ada.token, json!({ "send_time": "soon" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");

    let (status, body) = app.delete(&uri, &ada.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], id);
    let (status, body) = app.get("/api/notifications/reminders", &ada.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);
}

#[rstest]
#[tokio::test]
async fn test_reminders_belong_to_their_creator() {
    let app = TestApp::new();
    let ada = app.sign_up("Ada", "Lovelace", "ada@example.com").await;
    let grace = app.sign_up("Grace", "Hopper", "grace@example.com").await;
    let project = invite(&app, &ada, "Engine", &grace).await;

    let (status, created) = app
        .post(
            "/api/notifications/reminders",
            &ada.token,
            reminder("Project", &project, "2099-01-01"),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{created}");
    let uri = format!("/api/notifications/reminders/{}", created["id"].as_str().unwrap());

    let (status, body) = app.put(&uri, &grace.token, json!({ "title": "Mine now" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Reminder not found");
    let (status, _) = app.delete(&uri, &grace.token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = app.get("/api/notifications/reminders", &grace.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 0);

    // A system notification is not a reminder.
    let system = notifications(&app, &grace, "").await["items"][0]["id"]
        .as_str()
        .unwrap()
        .to_string();
    let (status, body) = app
        .delete(&format!("/api/notifications/reminders/{system}"), &grace.token)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Reminder not found");
}

#[rstest]
#[case("Task")]
#[case("Project")]
#[tokio::test]
async fn test_reminders_need_a_visible_target(#[case] target_type: &str) {
    let app = TestApp::new();
    let ada = app.sign_up("Ada", "Lovelace", "ada@example.com").await;
    let grace = app.sign_up("Grace", "Hopper", "grace@example.com").await;
    let project = app.create_project(&ada, "Engine").await;
    let (status, task) = app
        .post("/api/tasks", &ada.token, json!({ "title": "Gears", "project_id": project }))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{task}");
    let target = match target_type {
        "Task" => task["id"].as_str().unwrap().to_string(),
        _ => project,
    };

    let (status, _) = app
        .post(
            "/api/notifications/reminders",
            &grace.token,
            reminder(target_type, &target, "2099-01-01"),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .post(
            "/api/notifications/reminders",
            &ada.token,
            reminder(target_type, &target, "2099-01-01"),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[rstest]
#[case(reminder("Task", "not-a-uuid", "2099-01-01"))]
#[case(reminder("Task", "0190a0a0-0000-7000-8000-000000000000", "tomorrow"))]
#[case(json!({
    "title": "",
    "message": "m",
    "target_type": "Task",
    "target_id": "0190a0a0-0000-7000-8000-000000000000",
    "send_time": "2099-01-01",
}))]
#[tokio::test]
async fn test_reminder_fields_are_validated(#[case] body: Value) {
    let app = TestApp::new();
    let ada = app.sign_up("Ada", "Lovelace", "ada@example.com").await;

    let (status, response) = app.post("/api/notifications/reminders", &ada.token, body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{response}");
    assert_eq!(response["code"], "VALIDATION_ERROR");
}

//! Integration tests for projects, memberships and invitations.

mod common;

use axum::http::StatusCode;
use rstest::rstest;
use serde_json::json;

use common::TestApp;

#[rstest]
#[tokio::test]
async fn test_create_project_counts_for_the_owner() {
    let app = TestApp::new();
    let ada = app.sign_up("Ada", "Lovelace", "ada@example.com").await;

    let (status, body) = app
        .post(
            "/api/projects",
            &ada.token,
            json!({ "title": "  Analytical Engine ", "description": "Notes on the engine" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["title"], "Analytical Engine");
    assert_eq!(body["owner"], ada.id.as_str());
    assert_eq!(body["members"], json!([ada.id]));
    assert_eq!(body["task_count"], 0);

    let me = app.user(&ada, &ada.id).await;
    assert_eq!(me["project_own_count"], 1);
    assert_eq!(me["project_in_count"], 1);
}

#[rstest]
#[tokio::test]
async fn test_outsiders_cannot_see_a_project() {
    let app = TestApp::new();
    let ada = app.sign_up("Ada", "Lovelace", "ada@example.com").await;
    let grace = app.sign_up("Grace", "Hopper", "grace@example.com").await;
    let project = app.create_project(&ada, "Engine").await;

    let (status, body) = app.get(&format!("/api/projects/{project}"), &grace.token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");

    let (status, _) = app.get("/api/projects/not-a-uuid", &ada.token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[rstest]
#[tokio::test]
async fn test_invitation_flow_adds_a_member() {
    let app = TestApp::new();
    let ada = app.sign_up("Ada", "Lovelace", "ada@example.com").await;
    let grace = app.sign_up("Grace", "Hopper", "grace@example.com").await;
    let project = app.create_project(&ada, "Engine").await;

    let (status, body) = app
        .post(
            &format!("/api/projects/{project}/invitations"),
            &ada.token,
            json!({ "to": grace.id }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "pending");

    let (status, body) = app.get("/api/invitations/incoming", &grace.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["items"][0]["project"], project.as_str());

    let (status, _) = app
        .post(
            &format!("/api/projects/{project}/invitations"),
            &ada.token,
            json!({ "to": grace.id }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .put(
            &format!("/api/projects/{project}/invitations/{}", grace.id),
            &ada.token,
            json!({ "status": "accepted" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .put(
            &format!("/api/projects/{project}/invitations/{}", grace.id),
            &grace.token,
            json!({ "status": "accepted" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "accepted");

    let (status, body) = app.get(&format!("/api/projects/{project}"), &grace.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["members"].as_array().unwrap().len(), 2);
    assert_eq!(app.user(&grace, &grace.id).await["project_in_count"], 1);

    let (status, body) = app.get("/api/notifications", &ada.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["items"][0]["title"], "Invitation accepted");

    let (status, _) = app
        .post(
            &format!("/api/projects/{project}/invitations"),
            &ada.token,
            json!({ "to": grace.id }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[rstest]
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_simultaneous_invitations_create_one_record() {
    let app = TestApp::new();
    let ada = app.sign_up("Ada", "Lovelace", "ada@example.com").await;
    let grace = app.sign_up("Grace", "Hopper", "grace@example.com").await;
    let project = app.create_project(&ada, "Engine").await;
    let invitations = format!("/api/projects/{project}/invitations");
    let invite = || app.post(&invitations, &ada.token, json!({ "to": grace.id }));

    let ((first, _), (second, _)) = tokio::join!(invite(), invite());
    let mut statuses = vec![first, second];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::CREATED, StatusCode::CONFLICT]);

    let (status, body) = app.get(&invitations, &ada.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
}

#[rstest]
#[tokio::test]
async fn test_declined_invitation_can_be_sent_again() {
    let app = TestApp::new();
    let ada = app.sign_up("Ada", "Lovelace", "ada@example.com").await;
    let grace = app.sign_up("Grace", "Hopper", "grace@example.com").await;
    let project = app.create_project(&ada, "Engine").await;
    let invitations = format!("/api/projects/{project}/invitations");

    let (status, _) = app.post(&invitations, &ada.token, json!({ "to": grace.id })).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = app
        .put(
            &format!("{invitations}/{}", grace.id),
            &grace.token,
            json!({ "status": "declined" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.post(&invitations, &ada.token, json!({ "to": grace.id })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "pending");

    let (status, body) = app.get(&invitations, &ada.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
}

#[rstest]
#[tokio::test]
async fn test_members_cannot_manage_the_project() {
    let app = TestApp::new();
    let ada = app.sign_up("Ada", "Lovelace", "ada@example.com").await;
    let grace = app.sign_up("Grace", "Hopper", "grace@example.com").await;
    let project = app.create_project(&ada, "Engine").await;
    app.add_member(&ada, &project, &grace).await;

    let (status, body) = app
        .put(
            &format!("/api/projects/{project}"),
            &grace.token,
            json!({ "title": "Mine now" }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "FORBIDDEN");

    let (status, _) = app.delete(&format!("/api/projects/{project}"), &grace.token).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app
        .put(
            &format!("/api/projects/{project}"),
            &ada.token,
            json!({ "title": "Difference Engine", "status": "Ongoing" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Difference Engine");
}

#[rstest]
#[tokio::test]
async fn test_project_dates_must_be_ordered() {
    let app = TestApp::new();
    let ada = app.sign_up("Ada", "Lovelace", "ada@example.com").await;

    let (status, body) = app
        .post(
            "/api/projects",
            &ada.token,
            json!({ "title": "Engine", "start_at": "2026-05-01", "due_at": "2026-04-01" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[rstest]
#[case("owner", 1)]
#[case("lead", 1)]
#[case("member", 1)]
#[tokio::test]
async fn test_list_projects_by_role(#[case] role: &str, #[case] expected: u64) {
    let app = TestApp::new();
    let ada = app.sign_up("Ada", "Lovelace", "ada@example.com").await;
    let grace = app.sign_up("Grace", "Hopper", "grace@example.com").await;

    app.create_project(&grace, "Mine").await;
    let led = app.create_project(&ada, "Led").await;
    app.add_member(&ada, &led, &grace).await;
    let (status, _) = app
        .put(
            &format!("/api/projects/{led}/members/{}/lead", grace.id),
            &ada.token,
            json!({ "is_lead": true }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let joined = app.create_project(&ada, "Joined").await;
    app.add_member(&ada, &joined, &grace).await;

    let (status, body) = app
        .get(
            &format!("/api/projects?current_user_role={role}"),
            &grace.token,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], expected);
}

#[rstest]
#[tokio::test]
async fn test_deleting_a_project_cascades() {
    let app = TestApp::new();
    let ada = app.sign_up("Ada", "Lovelace", "ada@example.com").await;
    let grace = app.sign_up("Grace", "Hopper", "grace@example.com").await;
    let project = app.create_project(&ada, "Engine").await;
    app.add_member(&ada, &project, &grace).await;

    let (status, _) = app
        .put(&format!("/api/users/me/favorites/{project}"), &grace.token, json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, task) = app
        .post(
            "/api/tasks",
            &ada.token,
            json!({ "title": "Punch cards", "project_id": project, "assignee_id": grace.id }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let task_id = task["id"].as_str().unwrap();
    assert_eq!(app.user(&grace, &grace.id).await["task_count"], 1);

    let (status, body) = app.delete(&format!("/api/projects/{project}"), &ada.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_deleted"], true);

    let (status, _) = app.get(&format!("/api/tasks/{task_id}"), &grace.token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = app.get(&format!("/api/projects/{project}"), &ada.token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let owner = app.user(&ada, &ada.id).await;
    assert_eq!(owner["project_own_count"], 0);
    assert_eq!(owner["project_in_count"], 0);
    let member = app.user(&grace, &grace.id).await;
    assert_eq!(member["project_in_count"], 0);
    assert_eq!(member["task_count"], 0);
    assert_eq!(member["favorite_projects"], json!([]));

    let (_, body) = app.get("/api/notifications?kind=system", &grace.token).await;
    let titles: Vec<&str> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|item| item["title"].as_str())
        .collect();
    assert!(titles.contains(&"Project deleted"));
}

#[rstest]
#[tokio::test]
async fn test_removing_a_member_unassigns_their_tasks() {
    let app = TestApp::new();
    let ada = app.sign_up("Ada", "Lovelace", "ada@example.com").await;
    let grace = app.sign_up("Grace", "Hopper", "grace@example.com").await;
    let project = app.create_project(&ada, "Engine").await;
    app.add_member(&ada, &project, &grace).await;

    let (status, task) = app
        .post(
            "/api/tasks",
            &ada.token,
            json!({ "title": "Bernoulli numbers", "project_id": project, "assignee_id": grace.id }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let task_id = task["id"].as_str().unwrap();

    let (status, _) = app
        .delete(
            &format!("/api/projects/{project}/members/{}", ada.id),
            &ada.token,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .delete(
            &format!("/api/projects/{project}/members/{}", grace.id),
            &ada.token,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["members"], json!([ada.id]));

    let (status, body) = app.get(&format!("/api/tasks/{task_id}"), &ada.token).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["assignee"].is_null());

    let member = app.user(&grace, &grace.id).await;
    assert_eq!(member["task_count"], 0);
    assert_eq!(member["project_in_count"], 0);

    let (status, _) = app.get(&format!("/api/projects/{project}"), &grace.token).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[rstest]
#[tokio::test]
async fn test_members_may_leave() {
    let app = TestApp::new();
    let ada = app.sign_up("Ada", "Lovelace", "ada@example.com").await;
    let grace = app.sign_up("Grace", "Hopper", "grace@example.com").await;
    let linus = app.sign_up("Linus", "Torvalds", "linus@example.com").await;
    let project = app.create_project(&ada, "Engine").await;
    app.add_member(&ada, &project, &grace).await;
    app.add_member(&ada, &project, &linus).await;

    let (status, _) = app
        .delete(
            &format!("/api/projects/{project}/members/{}", linus.id),
            &grace.token,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .delete(
            &format!("/api/projects/{project}/members/{}", grace.id),
            &grace.token,
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .get(&format!("/api/projects/{project}/members"), &ada.token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
}

#[rstest]
#[tokio::test]
async fn test_candidates_show_pending_invitations() {
    let app = TestApp::new();
    let ada = app.sign_up("Ada", "Lovelace", "ada@example.com").await;
    let grace = app.sign_up("Grace", "Hopper", "grace@example.com").await;
    app.sign_up("Linus", "Torvalds", "linus@example.com").await;

    let (status, body) = app
        .post(
            "/api/projects",
            &ada.token,
            json!({ "title": "Engine", "invitee_ids": [grace.id] }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let project = body["id"].as_str().unwrap();

    let (status, body) = app
        .get(&format!("/api/projects/{project}/candidates?limit=100"), &ada.token)
        .await;
    assert_eq!(status, StatusCode::OK);
    let items = body["items"].as_array().unwrap();
    let grace_row = items.iter().find(|item| item["id"] == grace.id.as_str()).unwrap();
    assert_eq!(grace_row["invitation"]["status"], "pending");
    let linus_row = items
        .iter()
        .find(|item| item["email"] == "linus@example.com")
        .unwrap();
    assert!(linus_row["invitation"].is_null());
}

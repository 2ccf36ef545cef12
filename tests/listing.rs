//! Integration tests for pagination, filtering and query-key checks.

mod common;

use axum::http::StatusCode;
use rstest::rstest;
use serde_json::json;

use common::TestApp;

#[rstest]
#[case("", 1, 10, 10)]
#[case("?page=2&limit=5", 2, 5, 5)]
#[case("?page=3&limit=5", 3, 5, 2)]
#[case("?page=9&limit=5", 9, 5, 0)]
#[tokio::test]
async fn test_task_pages(
    #[case] query: &str,
    #[case] page: u64,
    #[case] limit: u64,
    #[case] on_page: usize,
) {
    let app = TestApp::new();
    let ada = app.sign_up("Ada", "Lovelace", "ada@example.com").await;
    for index in 0..12 {
        let (status, _) = app
            .post("/api/tasks", &ada.token, json!({ "title": format!("Task {index}") }))
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = app.get(&format!("/api/tasks{query}"), &ada.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 12);
    assert_eq!(body["page"], page);
    assert_eq!(body["limit"], limit);
    assert_eq!(body["items"].as_array().unwrap().len(), on_page);
    assert_eq!(body["total_pages"], 12_u64.div_ceil(limit));
}

#[rstest]
#[tokio::test]
async fn test_unknown_keys_are_rejected() {
    let app = TestApp::new();
    let ada = app.sign_up("Ada", "Lovelace", "ada@example.com").await;

    let (status, body) = app.get("/api/tasks?foo=bar", &ada.token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
    assert_eq!(body["message"], "Key foo is not allowed");

    let (status, _) = app.get("/api/users/me/tasks?assignee_id=x", &ada.token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[rstest]
#[case("limit=101")]
#[case("limit=0")]
#[case("page=0")]
#[case("page=first")]
#[tokio::test]
async fn test_out_of_range_pages_are_rejected(#[case] query: &str) {
    let app = TestApp::new();
    let ada = app.sign_up("Ada", "Lovelace", "ada@example.com").await;

    let (status, body) = app.get(&format!("/api/projects?{query}"), &ada.token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

#[rstest]
#[tokio::test]
async fn test_search_ignores_case() {
    let app = TestApp::new();
    let ada = app.sign_up("Ada", "Lovelace", "ada@example.com").await;
    for title in ["Difference Engine", "Analytical ENGINE", "Poetical science"] {
        app.create_project(&ada, title).await;
    }

    let (status, body) = app.get("/api/projects?search=engine", &ada.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);

    let (status, body) = app.get("/api/users?search=LOVE", &ada.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["items"][0]["id"], ada.id.as_str());
}

#[rstest]
#[tokio::test]
async fn test_task_filters_combine() {
    let app = TestApp::new();
    let ada = app.sign_up("Ada", "Lovelace", "ada@example.com").await;
    let tasks = [
        ("Cogs", "High", "2026-03-01"),
        ("Levers", "High", "2026-06-01"),
        ("Cards", "Low", "2026-03-15"),
    ];
    for (title, priority, due_at) in tasks {
        let (status, _) = app
            .post(
                "/api/tasks",
                &ada.token,
                json!({ "title": title, "priority": priority, "due_at": due_at }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = app
        .get("/api/tasks?priority=High&due_before=2026-04-01", &ada.token)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);
    assert_eq!(body["items"][0]["title"], "Cogs");

    let (status, _) = app.get("/api/tasks?priority=Urgent", &ada.token).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[rstest]
#[tokio::test]
async fn test_newest_tasks_come_first() {
    let app = TestApp::new();
    let ada = app.sign_up("Ada", "Lovelace", "ada@example.com").await;
    for title in ["First", "Second"] {
        let (status, _) = app.post("/api/tasks", &ada.token, json!({ "title": title })).await;
        assert_eq!(status, StatusCode::CREATED);
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }

    let (status, body) = app.get("/api/tasks", &ada.token).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["items"][0]["title"], "Second");
}

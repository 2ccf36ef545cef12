//! Route table.

use axum::Router;
use axum::routing::{delete, get, post, put};

use super::handlers::{AppState, health_check, welcome};
use super::{
    auth, checklists, comments, invitations, notifications, projects, subtasks, tags, tasks,
    users, verifications,
};

/// Builds the application router: `/health` plus every resource under `/api`.
pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/", get(welcome))
        // Auth
        .route("/auth/login", post(auth::login))
        .route("/auth/login/google", post(auth::login_with_google))
        // Users
        .route("/users", get(users::list_users).post(users::register))
        .route("/users/me", get(users::get_current_user))
        .route("/users/me/projects", get(projects::list_projects))
        .route("/users/me/tasks", get(tasks::list_my_tasks))
        .route(
            "/users/me/favorites/{project_id}",
            put(users::add_favorite).delete(users::remove_favorite),
        )
        .route(
            "/users/{id}",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        // Verifications
        .route(
            "/verifications/password-reset",
            post(verifications::request_password_reset),
        )
        .route(
            "/verifications/password-reset/{code}",
            put(verifications::reset_password),
        )
        .route("/verifications/{code}", put(verifications::verify_email))
        // Projects
        .route(
            "/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route(
            "/projects/{id}",
            get(projects::get_project)
                .put(projects::update_project)
                .delete(projects::delete_project),
        )
        .route("/projects/{id}/members", get(projects::list_members))
        .route(
            "/projects/{id}/members/{member_id}",
            delete(projects::remove_member),
        )
        .route(
            "/projects/{id}/members/{member_id}/lead",
            put(projects::set_lead),
        )
        .route("/projects/{id}/candidates", get(projects::list_candidates))
        .route("/projects/{id}/tasks", get(projects::list_project_tasks))
        .route(
            "/projects/{id}/comments",
            get(projects::list_project_comments),
        )
        // Invitations
        .route(
            "/projects/{id}/invitations",
            get(invitations::list_project_invitations).post(invitations::send_invitation),
        )
        .route(
            "/projects/{id}/invitations/{invitee_id}",
            put(invitations::respond_invitation).delete(invitations::cancel_invitation),
        )
        .route("/invitations/incoming", get(invitations::list_incoming))
        .route("/invitations/outgoing", get(invitations::list_outgoing))
        // Tasks
        .route("/tasks", get(tasks::list_tasks).post(tasks::create_task))
        .route(
            "/tasks/{id}",
            get(tasks::get_task)
                .put(tasks::update_task)
                .delete(tasks::delete_task),
        )
        .route("/tasks/{id}/comments", get(tasks::list_task_comments))
        .route(
            "/tasks/{id}/subtasks",
            get(subtasks::list_sub_tasks).post(subtasks::create_sub_task),
        )
        .route(
            "/tasks/{id}/checklists",
            get(checklists::list_checklists).post(checklists::create_checklist),
        )
        // Sub-tasks
        .route(
            "/subtasks/{id}",
            put(subtasks::update_sub_task).delete(subtasks::delete_sub_task),
        )
        // Checklists
        .route(
            "/checklists/{id}",
            put(checklists::update_checklist).delete(checklists::delete_checklist),
        )
        .route(
            "/checklists/{id}/items",
            get(checklists::list_items).post(checklists::create_item),
        )
        .route(
            "/checklist-items/{id}",
            put(checklists::update_item).delete(checklists::delete_item),
        )
        // Tags
        .route("/tags", get(tags::list_tags).post(tags::create_tag))
        .route(
            "/tags/{id}",
            put(tags::update_tag).delete(tags::delete_tag),
        )
        // Comments
        .route("/comments", post(comments::create_comment))
        .route(
            "/comments/{id}",
            get(comments::get_comment)
                .put(comments::update_comment)
                .delete(comments::delete_comment),
        )
        // Notifications
        .route(
            "/notifications",
            get(notifications::list_notifications)
                .put(notifications::update_all_notifications)
                .delete(notifications::delete_notifications),
        )
        .route(
            "/notifications/reminders",
            get(notifications::list_reminders).post(notifications::create_reminder),
        )
        .route(
            "/notifications/reminders/{id}",
            put(notifications::update_reminder).delete(notifications::delete_reminder),
        )
        .route(
            "/notifications/{id}",
            put(notifications::update_notification).delete(notifications::delete_notification),
        );

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api)
        .with_state(state)
}

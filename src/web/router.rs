//! Axum router construction.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;

use crate::web::handlers::{analysts, application, groups, lookups, notes, users};
use crate::web::state::SharedState;

/// Room for the multipart framing and form fields around an upload.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Build the complete router with every page and API route.
pub fn build_router(state: SharedState) -> Router {
    let body_limit = usize::try_from(state.office.max_upload_bytes())
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        // Application
        .route("/", get(application::home_handler))
        .route(
            "/login",
            get(application::login_page_handler).post(application::login_handler),
        )
        .route("/logout", get(application::logout_handler))
        // Analysts
        .route("/analysts", get(analysts::list_handler))
        .route(
            "/analysts/:analyst_id",
            get(analysts::edit_handler).post(analysts::save_handler),
        )
        .route("/analysts/:analyst_id/delete", post(analysts::delete_handler))
        .route("/analysts/:analyst_id/profile", post(analysts::upload_profile_handler))
        .route("/analysts/:analyst_id/document", post(analysts::upload_document_handler))
        .route("/analysts/:analyst_id/desks", get(analysts::desks_handler))
        .route(
            "/analysts/:analyst_id/desks/:desk_id",
            post(analysts::add_desk_handler),
        )
        .route(
            "/analysts/:analyst_id/desks/:desk_id/delete",
            post(analysts::remove_desk_handler),
        )
        // Notes
        .route(
            "/analysts/:analyst_id/notes/:note_id",
            get(notes::edit_handler).post(notes::save_handler),
        )
        .route(
            "/analysts/:analyst_id/notes/:note_id/delete",
            post(notes::delete_handler),
        )
        // Users
        .route("/users", get(users::list_handler))
        .route(
            "/users/:user_id",
            get(users::edit_handler).post(users::save_handler),
        )
        .route("/users/:user_id/delete", post(users::delete_handler))
        .route(
            "/users/:user_id/password",
            get(users::password_page_handler).post(users::change_password_handler),
        )
        .route(
            "/users/:user_id/groups/:group_id",
            post(users::add_group_handler),
        )
        .route(
            "/users/:user_id/groups/:group_id/delete",
            post(users::remove_group_handler),
        )
        // Groups
        .route("/groups", get(groups::list_handler))
        .route(
            "/groups/:group_id",
            get(groups::edit_handler).post(groups::save_handler),
        )
        .route("/groups/:group_id/delete", post(groups::delete_handler))
        // Lookups
        .route(
            "/desks",
            get(lookups::desks_handler).post(lookups::create_desk_handler),
        )
        .route("/ranks", get(lookups::ranks_handler))
        .route("/statuses", get(lookups::statuses_handler))
        .fallback(application::not_found_handler)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

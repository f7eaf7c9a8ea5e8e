use crate::handlers;
use crate::state::AppState;
use axum::{routing::{get, post}, Router};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::index))
        .route("/register", post(handlers::register_form))
        .route("/in-town", post(handlers::in_town_form))
        .route("/logout", post(handlers::logout_form))
        .route("/leave", post(handlers::leave_form))
        .route("/visits", post(handlers::plan_visit_form))
        .route("/suggestions", post(handlers::suggestion_form))
        .route("/api/session", get(handlers::get_session))
        .route("/api/register", post(handlers::register))
        .route("/api/logout", post(handlers::logout))
        .route("/api/leave", post(handlers::leave))
        .route("/api/users", get(handlers::list_users))
        .route("/api/users/grouped", get(handlers::grouped_users))
        .route("/api/visits", get(handlers::list_visits).post(handlers::plan_visit))
        .route("/api/visits/active", get(handlers::list_active_visits))
        .route("/api/visits/in-town", post(handlers::mark_in_town))
        .route("/api/visits/:id/status", post(handlers::update_visit_status))
        .route("/api/visits/:id/suggestions", get(handlers::visit_suggestions))
        .route("/api/suggestions", post(handlers::add_suggestion))
        .with_state(state)
}

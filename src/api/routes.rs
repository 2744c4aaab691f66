//! Routing definitions for the task tracker API.

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{
    AppState, create_task, delete_task, get_task, health_check, list_tasks, update_task,
};

/// Creates the API router with all routes and middleware.
///
/// # Examples
///
/// ```ignore
/// let repository = JsonFileTaskRepository::open("tasks.json").await?;
/// let router = create_router(AppState::new(repository));
///
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
/// axum::serve(listener, router).await?;
/// ```
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/tasks", get(list_tasks).post(create_task))
        .route(
            "/tasks/{id}",
            get(get_task).put(update_task).delete(delete_task),
        )
        .layer(TraceLayer::new_for_http())
        .layer(create_cors_layer())
        .with_state(state)
}

/// Creates the CORS layer configuration.
fn create_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

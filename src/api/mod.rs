//! REST API layer: authentication, route handlers, DTOs, OpenAPI and
//! router composition.
//!
//! Resource endpoints are mounted under `/api/v1`; `/health` sits at the
//! root.

pub mod auth;
pub mod dto;
pub mod handlers;
pub mod openapi;

use axum::Router;
use axum::response::{IntoResponse, Response};

use crate::app_state::AppState;
use crate::error::ErrorDetails;

/// Builds the complete API router with all REST endpoints.
///
/// With `expose_error_details` set, 5xx bodies carry the underlying cause
/// in `details`.
pub fn build_router(expose_error_details: bool) -> Router<AppState> {
    let router = Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes());

    #[cfg(feature = "swagger-ui")]
    let router = {
        use utoipa::OpenApi;
        router.merge(
            utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", openapi::ApiDoc::openapi()),
        )
    };

    if expose_error_details {
        router.layer(axum::middleware::map_response(expose_details))
    } else {
        router
    }
}

async fn expose_details(mut response: Response) -> Response {
    match response.extensions_mut().remove::<ErrorDetails>() {
        Some(ErrorDetails(body)) => (response.status(), axum::Json(body)).into_response(),
        None => response,
    }
}

#[cfg(test)]
mod tests;

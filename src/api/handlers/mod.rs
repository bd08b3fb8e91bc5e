//! REST endpoint handlers organized by resource.

pub mod consultation;
pub mod donation;
pub mod sponsorship;
pub mod system;
pub mod user;
pub mod webhook;

use axum::Router;

use crate::app_state::AppState;

/// Composes all resource routes under `/api/v1`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(sponsorship::routes())
        .merge(donation::routes())
        .merge(consultation::routes())
        .merge(user::routes())
        .merge(webhook::routes())
}

//! OpenAPI document and Swagger UI mounting.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::api::handlers::{consultation, donation, sponsorship, system, user, webhook};

/// Generated OpenAPI description of every REST endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "HealthPal API",
        description = "Treatment sponsorship ledger, donations and remote consultations."
    ),
    paths(
        system::health_handler,
        sponsorship::create_sponsorship,
        sponsorship::list_sponsorships,
        sponsorship::get_sponsorship,
        sponsorship::close_sponsorship,
        sponsorship::initiate_payment,
        sponsorship::confirm_payment,
        sponsorship::donate,
        donation::create_donation,
        donation::donation_history,
        donation::sponsorship_donations,
        donation::donation_stats,
        donation::refund_donation,
        consultation::book_consultation,
        consultation::list_consultations,
        consultation::update_status,
        consultation::start_video_call,
        consultation::start_audio_call,
        consultation::list_video_calls,
        consultation::list_audio_calls,
        consultation::end_video_call,
        consultation::end_audio_call,
        consultation::call_stats,
        user::register_user,
        user::get_user,
        webhook::payment_webhook,
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Sponsorships", description = "Treatment funding campaigns"),
        (name = "Donations", description = "Direct donations, history and refunds"),
        (name = "Payments", description = "Gateway payment flow and webhooks"),
        (name = "Consultations", description = "Booking and status changes"),
        (name = "Calls", description = "Audio and video call sessions"),
        (name = "Users", description = "User directory"),
        (name = "System", description = "Health"),
    )
)]
pub struct ApiDoc;

/// Registers the `bearer` JWT security scheme referenced by the paths.
#[derive(Debug)]
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_ledger_and_call_paths() {
        let doc = ApiDoc::openapi();
        for path in [
            "/health",
            "/api/v1/sponsorships",
            "/api/v1/sponsorships/{id}/donate",
            "/api/v1/donations",
            "/api/v1/consultations/{id}/video-calls/end",
            "/api/v1/webhooks/payments",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        let has_bearer = doc
            .components
            .as_ref()
            .is_some_and(|c| c.security_schemes.contains_key("bearer"));
        assert!(has_bearer);
    }
}

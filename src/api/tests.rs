//! Router tests: requests go through the full Axum stack over the
//! in-memory store.

#![allow(clippy::panic)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::IntoResponse;
use chrono::Utc;
use serde_json::{Value, json};
use tower::ServiceExt;

use super::auth::JwtKeys;
use super::{build_router, expose_details};
use crate::app_state::AppState;
use crate::domain::{EventBus, NewUser, Role, UserId, UserProfile};
use crate::error::HealthPalError;
use crate::payment::DisabledGateway;
use crate::payment::webhook::sign_payload;
use crate::persistence::{ConsultationStore, LedgerStore, MemoryStore, UserStore};
use crate::service::{ConsultationService, LedgerService, UserService};

const WEBHOOK_SECRET: &str = "whsec_router_test";

struct TestApp {
    router: Router,
    keys: JwtKeys,
    store: Arc<MemoryStore>,
}

impl TestApp {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let bus = EventBus::new(64);
        let keys = JwtKeys::from_secret(b"router-test-secret");
        let ledger = LedgerService::new(
            Arc::clone(&store) as Arc<dyn LedgerStore>,
            Arc::new(DisabledGateway),
            bus.clone(),
        )
        .with_webhook_secret(Some(WEBHOOK_SECRET.to_string()), 300);
        let state = AppState {
            ledger: Arc::new(ledger),
            consultations: Arc::new(ConsultationService::new(
                Arc::clone(&store) as Arc<dyn ConsultationStore>,
                Arc::clone(&store) as Arc<dyn UserStore>,
                bus.clone(),
            )),
            users: Arc::new(UserService::new(Arc::clone(&store) as Arc<dyn UserStore>)),
            event_bus: bus,
            jwt: Arc::new(keys.clone()),
        };
        Self {
            router: build_router(false).with_state(state),
            keys,
            store,
        }
    }

    fn token(&self, user: UserId, role: Role) -> String {
        let now = u64::try_from(Utc::now().timestamp()).unwrap_or_default();
        let Ok(token) = self.keys.issue(user, role, now, 3_600) else {
            panic!("token issued");
        };
        token
    }

    async fn register(&self, name: &str, email: &str, role: Role) -> UserId {
        let Ok(user) = UserProfile::register(
            NewUser {
                full_name: name.to_string(),
                email: email.to_string(),
                phone: None,
                role,
            },
            Utc::now(),
        ) else {
            panic!("valid user");
        };
        assert!(self.store.insert_user(&user).await.is_ok());
        user.id
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let Ok(request) = builder.body(body) else {
            panic!("request built");
        };
        self.dispatch(request).await
    }

    async fn dispatch(&self, request: Request<Body>) -> (StatusCode, Value) {
        let Ok(response) = self.router.clone().oneshot(request).await else {
            panic!("router is infallible");
        };
        let status = response.status();
        let Ok(bytes) = axum::body::to_bytes(response.into_body(), usize::MAX).await else {
            panic!("body read");
        };
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }
}

fn string_field(value: &Value, key: &str) -> String {
    let Some(s) = value.get(key).and_then(Value::as_str) else {
        panic!("missing string field {key} in {value}");
    };
    s.to_string()
}

#[tokio::test]
async fn health_is_public() {
    let app = TestApp::new();
    let (status, body) = app.send("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(string_field(&body, "status"), "healthy");
}

#[tokio::test]
async fn missing_or_bad_token_is_unauthorized() {
    let app = TestApp::new();
    let (status, body) = app.send("GET", "/api/v1/sponsorships", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body.get("code").is_some());

    let (status, _) = app
        .send("GET", "/api/v1/sponsorships", Some("not-a-jwt"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn donor_cannot_open_sponsorship() {
    let app = TestApp::new();
    let donor = app.token(UserId::new(), Role::Donor);
    let (status, _) = app
        .send(
            "POST",
            "/api/v1/sponsorships",
            Some(&donor),
            Some(json!({
                "treatment_type": "Dialysis",
                "goal_amount": 100,
                "description": "Weekly sessions",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn donations_fund_campaign_and_then_are_rejected() {
    let app = TestApp::new();
    let patient = app.token(UserId::new(), Role::Patient);
    let donor = app.token(UserId::new(), Role::Donor);

    let (status, created) = app
        .send(
            "POST",
            "/api/v1/sponsorships",
            Some(&patient),
            Some(json!({
                "treatment_type": "Dialysis",
                "goal_amount": 100,
                "description": "Weekly sessions",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(string_field(&created, "status"), "open");
    let sponsorship_id = string_field(&created, "sponsorshipId");

    let (status, first) = app
        .send(
            "POST",
            "/api/v1/donations",
            Some(&donor),
            Some(json!({
                "sponsorship_id": sponsorship_id,
                "amount": 60,
                "payment_method": "card",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first.get("isFunded"), Some(&Value::Bool(false)));

    let (status, second) = app
        .send(
            "POST",
            "/api/v1/donations",
            Some(&donor),
            Some(json!({
                "sponsorshipId": sponsorship_id,
                "amount": "50.00",
                "paymentMethod": "bank",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(second.get("isFunded"), Some(&Value::Bool(true)));
    assert_eq!(string_field(&second, "sponsorship_funded_amount"), "110.00");

    let (status, rejected) = app
        .send(
            "POST",
            "/api/v1/donations",
            Some(&donor),
            Some(json!({
                "sponsorship_id": sponsorship_id,
                "amount": 10,
                "payment_method": "card",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(rejected.get("code"), Some(&json!(2002)));

    let (status, detail) = app
        .send(
            "GET",
            &format!("/api/v1/sponsorships/{sponsorship_id}"),
            Some(&donor),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let donations = detail
        .get("donations")
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    assert_eq!(donations, 2);

    let (status, history) = app
        .send("GET", "/api/v1/donations/history", Some(&donor), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.get("total_donations"), Some(&json!(2)));
    assert_eq!(string_field(&history, "total_amount_donated"), "110.00");

    let (status, open) = app
        .send("GET", "/api/v1/sponsorships", Some(&donor), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let listed = open.get("data").and_then(Value::as_array).map_or(0, Vec::len);
    assert_eq!(listed, 0);
}

#[tokio::test]
async fn unknown_payment_method_is_rejected() {
    let app = TestApp::new();
    let patient = app.token(UserId::new(), Role::Patient);
    let donor = app.token(UserId::new(), Role::Donor);
    let (_, created) = app
        .send(
            "POST",
            "/api/v1/sponsorships",
            Some(&patient),
            Some(json!({
                "treatment_type": "Insulin",
                "goal_amount": "250.00",
                "description": "Three months of supply",
            })),
        )
        .await;
    let sponsorship_id = string_field(&created, "sponsorshipId");

    let (status, _) = app
        .send(
            "POST",
            "/api/v1/donations",
            Some(&donor),
            Some(json!({
                "sponsorship_id": sponsorship_id,
                "amount": 10,
                "payment_method": "crypto",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn card_payment_without_gateway_is_bad_gateway() {
    let app = TestApp::new();
    let patient = app.token(UserId::new(), Role::Patient);
    let donor = app.token(UserId::new(), Role::Donor);
    let (_, created) = app
        .send(
            "POST",
            "/api/v1/sponsorships",
            Some(&patient),
            Some(json!({
                "treatment_type": "Surgery",
                "goal_amount": 500,
                "description": "Knee replacement",
            })),
        )
        .await;
    let sponsorship_id = string_field(&created, "sponsorshipId");

    let (status, body) = app
        .send(
            "POST",
            &format!("/api/v1/sponsorships/{sponsorship_id}/payment/initiate"),
            Some(&donor),
            Some(json!({ "amount": 20 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body.get("details").is_none());
}

#[tokio::test]
async fn legacy_donate_path_confirms_payment() {
    let app = TestApp::new();
    let patient = app.token(UserId::new(), Role::Patient);
    let donor = app.token(UserId::new(), Role::Donor);
    let (_, created) = app
        .send(
            "POST",
            "/api/v1/sponsorships",
            Some(&patient),
            Some(json!({
                "treatment_type": "Surgery",
                "goal_amount": 500,
                "description": "Knee replacement",
            })),
        )
        .await;
    let sponsorship_id = string_field(&created, "sponsorshipId");
    let body = json!({ "payment_intent_id": "pi_legacy", "amount": 20 });

    let (status, _) = app
        .send(
            "POST",
            &format!("/api/v1/sponsorships/{sponsorship_id}/donate"),
            Some(&patient),
            Some(body.clone()),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Reaches the gateway lookup, which is disabled here
    let (status, _) = app
        .send(
            "POST",
            &format!("/api/v1/sponsorships/{sponsorship_id}/donate"),
            Some(&donor),
            Some(body),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn webhook_requires_valid_signature() {
    let app = TestApp::new();
    let payload = json!({
        "type": "customer.created",
        "data": { "object": { "id": "cus_1" } },
    })
    .to_string();

    let (status, _) = app
        .send(
            "POST",
            "/api/v1/webhooks/payments",
            None,
            serde_json::from_str(&payload).ok(),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let Ok(signature) = sign_payload(payload.as_bytes(), WEBHOOK_SECRET, Utc::now().timestamp())
    else {
        panic!("payload signed");
    };
    let Ok(request) = Request::builder()
        .method("POST")
        .uri("/api/v1/webhooks/payments")
        .header("content-type", "application/json")
        .header("stripe-signature", signature)
        .body(Body::from(payload))
    else {
        panic!("request built");
    };
    let (status, body) = app.dispatch(request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.get("received"), Some(&Value::Bool(true)));
}

#[tokio::test]
async fn video_call_completes_consultation() {
    let app = TestApp::new();
    let patient_id = app
        .register("Lina Haddad", "lina@example.org", Role::Patient)
        .await;
    let doctor_id = app
        .register("Dr. Omar Saleh", "omar@example.org", Role::Doctor)
        .await;
    let patient = app.token(patient_id, Role::Patient);
    let doctor = app.token(doctor_id, Role::Doctor);

    let (status, booked) = app
        .send(
            "POST",
            "/api/v1/consultations",
            Some(&patient),
            Some(json!({
                "doctorId": doctor_id.to_string(),
                "consultationDate": Utc::now().to_rfc3339(),
                "mode": "video",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(string_field(&booked, "status"), "pending");
    let consultation_id = string_field(&booked, "consultationId");

    let (status, _) = app
        .send(
            "POST",
            &format!("/api/v1/consultations/{consultation_id}/video-calls"),
            Some(&patient),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .send(
            "PATCH",
            &format!("/api/v1/consultations/{consultation_id}/status"),
            Some(&patient),
            Some(json!({ "status": "accepted" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, accepted) = app
        .send(
            "PATCH",
            &format!("/api/v1/consultations/{consultation_id}/status"),
            Some(&doctor),
            Some(json!({ "status": "accepted" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(string_field(&accepted, "status"), "accepted");

    let (status, _) = app
        .send(
            "POST",
            &format!("/api/v1/consultations/{consultation_id}/audio-calls"),
            Some(&patient),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, started) = app
        .send(
            "POST",
            &format!("/api/v1/consultations/{consultation_id}/video-calls"),
            Some(&patient),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let call_id = string_field(&started, "callId");

    let (status, ended) = app
        .send(
            "PATCH",
            &format!("/api/v1/consultations/{consultation_id}/video-calls/end"),
            Some(&doctor),
            Some(json!({ "callId": call_id, "duration_seconds": 420 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ended.get("durationSeconds"), Some(&json!(420)));
    assert_eq!(string_field(&ended, "consultationStatus"), "completed");

    let (status, calls) = app
        .send(
            "GET",
            &format!("/api/v1/consultations/{consultation_id}/video-calls"),
            Some(&doctor),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let listed = calls.get("data").and_then(Value::as_array).map_or(0, Vec::len);
    assert_eq!(listed, 1);

    let (status, stats) = app
        .send("GET", "/api/v1/calls/stats", Some(&patient), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let video_calls = stats
        .get("data")
        .and_then(Value::as_array)
        .and_then(|rows| {
            rows.iter()
                .find(|r| r.get("modality").and_then(Value::as_str) == Some("video"))
        })
        .and_then(|r| r.get("total_calls"))
        .and_then(Value::as_u64);
    assert_eq!(video_calls, Some(1));
}

#[tokio::test]
async fn only_admins_register_users() {
    let app = TestApp::new();
    let body = json!({
        "full_name": "Maha Odeh",
        "email": "maha@example.org",
        "role": "donor",
    });

    let patient = app.token(UserId::new(), Role::Patient);
    let (status, _) = app
        .send("POST", "/api/v1/users", Some(&patient), Some(body.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = app.token(UserId::new(), Role::Admin);
    let (status, created) = app
        .send("POST", "/api/v1/users", Some(&admin), Some(body.clone()))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let user_id = string_field(&created, "userId");

    let (status, _) = app
        .send("POST", "/api/v1/users", Some(&admin), Some(body))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, profile) = app
        .send("GET", &format!("/api/v1/users/{user_id}"), Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(string_field(&profile, "email"), "maha@example.org");
}

#[tokio::test]
async fn error_details_are_swapped_in_when_exposed() {
    let response = HealthPalError::Persistence("pool timed out".to_string()).into_response();
    let response = expose_details(response).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let Ok(bytes) = axum::body::to_bytes(response.into_body(), usize::MAX).await else {
        panic!("body read");
    };
    let Ok(body) = serde_json::from_slice::<Value>(&bytes) else {
        panic!("json body");
    };
    assert_eq!(string_field(&body, "error"), "internal server error");
    assert!(string_field(&body, "details").contains("pool timed out"));
}

//! Shared fixtures for the HTTP integration tests.
//!
//! The router runs on in-memory stores and a recording message sender, so no
//! database or mail provider is needed.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request},
    response::Response,
    Router,
};
use fake::faker::company::en::CompanyName;
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use fake::Fake;
use serde_json::{json, Value};
use std::sync::Arc;

use domain::models::{FormKind, Modality, NewTemplate, Template};
use domain::services::{InMemorySubmissionStore, InMemoryTemplateStore, MockMessageSender};
use quote_desk_api::app::{build_state, create_app, AppState, Backends};
use quote_desk_api::config::Config;

pub const ADMIN_KEY: &str = "test-admin-key";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub templates: Arc<InMemoryTemplateStore>,
    pub submissions: Arc<InMemorySubmissionStore>,
    pub sender: Arc<MockMessageSender>,
}

pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    Config::load_for_test(overrides).expect("Failed to load test config")
}

pub fn spawn_app() -> TestApp {
    spawn_app_with(test_config(&[]), MockMessageSender::new())
}

pub fn spawn_app_with(config: Config, sender: MockMessageSender) -> TestApp {
    let templates = Arc::new(InMemoryTemplateStore::new());
    let submissions = Arc::new(InMemorySubmissionStore::new());
    let sender = Arc::new(sender);

    let backends = Backends {
        templates: templates.clone(),
        submissions: submissions.clone(),
        audit_log: None,
        notification_store: None,
        sender: Some(sender.clone()),
    };
    let state = build_state(config, None, backends).expect("Failed to build state");

    TestApp {
        router: create_app(state.clone()),
        state,
        templates,
        submissions,
        sender,
    }
}

/// Seed an active, bound template.
pub fn seed_template(
    store: &InMemoryTemplateStore,
    form: FormKind,
    modality: Option<Modality>,
    name: &str,
) -> Template {
    store.seed(
        NewTemplate {
            name: name.to_string(),
            subject: "Your {{product}} quote, {{company_name}}".to_string(),
            body: "Hello {{contact_name}}, thanks for your interest in {{product}}.".to_string(),
            description: None,
            active: true,
            bound_to_form: true,
            form: Some(form),
            modality,
        }
        .into_template(),
    )
}

pub fn quote_payload() -> Value {
    json!({
        "company_name": CompanyName().fake::<String>(),
        "tax_id": "B-1234 5678",
        "contact_name": Name().fake::<String>(),
        "contact_email": SafeEmail().fake::<String>(),
        "phone": "+34 600 123 456",
        "modality": "saas",
        "fields": { "seats": "25" }
    })
}

pub fn json_request(method: Method, uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub fn admin_get(uri: &str) -> Request<Body> {
    let mut request = get_request(uri);
    request
        .headers_mut()
        .insert("x-admin-key", ADMIN_KEY.parse().unwrap());
    request
}

pub fn admin_json(method: Method, uri: &str, body: &Value) -> Request<Body> {
    let mut request = json_request(method, uri, body);
    let headers = request.headers_mut();
    headers.insert("x-admin-key", ADMIN_KEY.parse().unwrap());
    headers.insert("x-actor-id", "ops@example.com".parse().unwrap());
    request
}

pub async fn parse_response_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap_or(Value::Null)
}

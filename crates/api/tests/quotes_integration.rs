//! Quote submission over HTTP.

mod common;

use axum::http::{header, Method, StatusCode};
use domain::models::{FormKind, Modality, SubmissionStatus};
use domain::services::MockMessageSender;
use tower::ServiceExt;

use common::{
    json_request, parse_response_body, quote_payload, seed_template, spawn_app, spawn_app_with,
    test_config,
};

#[tokio::test]
async fn test_submit_queues_quote_with_specific_template() {
    let app = spawn_app();
    let template = seed_template(&app.templates, FormKind::Erp, Some(Modality::Saas), "ERP SaaS");

    let response = app
        .router
        .clone()
        .oneshot(json_request(Method::POST, "/api/v1/quotes/erp", &quote_payload()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = parse_response_body(response).await;
    assert_eq!(body["status"], "pending_approval");

    let records = app.submissions.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id.to_string(), body["submission_id"].as_str().unwrap());
    assert_eq!(records[0].template_id, template.id);
    assert_eq!(records[0].status, SubmissionStatus::PendingApproval);
    assert!(records[0].subject.starts_with("Your erp quote, "));
    assert!(app.sender.sent().is_empty());

    let feed = app.state.in_app.feed(None).await;
    assert!(feed.iter().any(|n| n.message.contains(&records[0].id.to_string())));
}

#[tokio::test]
async fn test_submit_falls_back_to_form_default() {
    let app = spawn_app();
    let generic = seed_template(&app.templates, FormKind::Crm, None, "CRM generic");

    let response = app
        .router
        .clone()
        .oneshot(json_request(Method::POST, "/api/v1/quotes/crm", &quote_payload()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let records = app.submissions.records();
    assert_eq!(records[0].template_id, generic.id);
    assert_eq!(records[0].fallback_kind.as_str(), "form_default");
}

#[tokio::test]
async fn test_repeat_submission_is_conflict() {
    let app = spawn_app();
    seed_template(&app.templates, FormKind::Erp, None, "ERP generic");
    let payload = quote_payload();

    let first = app
        .router
        .clone()
        .oneshot(json_request(Method::POST, "/api/v1/quotes/erp", &payload))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::ACCEPTED);

    let second = app
        .router
        .clone()
        .oneshot(json_request(Method::POST, "/api/v1/quotes/erp", &payload))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let body = parse_response_body(second).await;
    assert_eq!(body["error"], "duplicate_submission");
    assert_eq!(body["message"], "This request has already been submitted.");

    assert_eq!(app.submissions.records().len(), 1);
}

#[tokio::test]
async fn test_concurrent_double_submit_creates_one_record() {
    let app = spawn_app();
    seed_template(&app.templates, FormKind::Payroll, None, "Payroll generic");
    let payload = quote_payload();

    let (a, b) = tokio::join!(
        app.router
            .clone()
            .oneshot(json_request(Method::POST, "/api/v1/quotes/payroll", &payload)),
        app.router
            .clone()
            .oneshot(json_request(Method::POST, "/api/v1/quotes/payroll", &payload)),
    );

    let mut statuses = vec![a.unwrap().status(), b.unwrap().status()];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::ACCEPTED, StatusCode::CONFLICT]);
    assert_eq!(app.submissions.records().len(), 1);
}

#[tokio::test]
async fn test_client_idempotency_key_is_hashed_and_used() {
    let app = spawn_app();
    seed_template(&app.templates, FormKind::Erp, None, "ERP generic");

    let mut request = json_request(Method::POST, "/api/v1/quotes/erp", &quote_payload());
    request
        .headers_mut()
        .insert("idempotency-key", "order-42".parse().unwrap());
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    // A different payload under the same client key is still a duplicate.
    let mut retry = json_request(Method::POST, "/api/v1/quotes/erp", &quote_payload());
    retry
        .headers_mut()
        .insert("idempotency-key", "order-42".parse().unwrap());
    let response = app.router.clone().oneshot(retry).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let records = app.submissions.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].idempotency_key, shared::crypto::sha256_hex("order-42"));
}

#[tokio::test]
async fn test_no_template_is_service_unavailable_and_key_released() {
    let app = spawn_app();
    let payload = quote_payload();

    let response = app
        .router
        .clone()
        .oneshot(json_request(Method::POST, "/api/v1/quotes/erp", &payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = parse_response_body(response).await;
    assert_eq!(body["error"], "template_unavailable");

    seed_template(&app.templates, FormKind::Erp, None, "ERP generic");
    let retry = app
        .router
        .clone()
        .oneshot(json_request(Method::POST, "/api/v1/quotes/erp", &payload))
        .await
        .unwrap();
    assert_eq!(retry.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_invalid_payload_is_rejected_with_details() {
    let app = spawn_app();
    let mut payload = quote_payload();
    payload["contact_email"] = "not-an-email".into();
    payload["tax_id"] = "!".into();

    let response = app
        .router
        .clone()
        .oneshot(json_request(Method::POST, "/api/v1/quotes/erp", &payload))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = parse_response_body(response).await;
    assert_eq!(body["error"], "validation_error");
    let fields: Vec<&str> = body["details"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["contact_email", "tax_id"]);
}

#[tokio::test]
async fn test_unknown_product_is_bad_request() {
    let app = spawn_app();
    let response = app
        .router
        .clone()
        .oneshot(json_request(Method::POST, "/api/v1/quotes/hr", &quote_payload()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_send_directly_delivers_to_contact() {
    let app = spawn_app();
    seed_template(&app.templates, FormKind::Erp, Some(Modality::Saas), "ERP SaaS");
    let payload = quote_payload();

    let response = app
        .router
        .clone()
        .oneshot(json_request(Method::POST, "/api/v1/quotes/erp/send", &payload))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(parse_response_body(response).await["sent"], true);

    let sent = app.sender.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, payload["contact_email"].as_str().unwrap());
    assert_eq!(app.submissions.records()[0].status, SubmissionStatus::Sent);
}

#[tokio::test]
async fn test_send_directly_retries_transient_failures() {
    let app = spawn_app_with(test_config(&[]), MockMessageSender::failing_transiently(2));
    seed_template(&app.templates, FormKind::Crm, None, "CRM generic");

    let response = app
        .router
        .clone()
        .oneshot(json_request(Method::POST, "/api/v1/quotes/crm/send", &quote_payload()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.sender.attempts(), 3);
    assert_eq!(app.sender.sent().len(), 1);
}

#[tokio::test]
async fn test_rejected_delivery_is_not_retried() {
    let app = spawn_app_with(test_config(&[]), MockMessageSender::rejecting());
    seed_template(&app.templates, FormKind::Crm, None, "CRM generic");

    let response = app
        .router
        .clone()
        .oneshot(json_request(Method::POST, "/api/v1/quotes/crm/send", &quote_payload()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(parse_response_body(response).await["error"], "delivery_failed");
    assert_eq!(app.sender.attempts(), 1);
    assert!(app.submissions.records().is_empty());
}

#[tokio::test]
async fn test_quote_routes_are_rate_limited_per_client() {
    let app = spawn_app_with(
        test_config(&[("security.rate_limit_per_minute", "2")]),
        MockMessageSender::new(),
    );
    seed_template(&app.templates, FormKind::Erp, None, "ERP generic");

    for _ in 0..2 {
        let mut request = json_request(Method::POST, "/api/v1/quotes/erp", &quote_payload());
        request
            .headers_mut()
            .insert("x-forwarded-for", "198.51.100.4".parse().unwrap());
        let response = app.router.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    let mut request = json_request(Method::POST, "/api/v1/quotes/erp", &quote_payload());
    request
        .headers_mut()
        .insert("x-forwarded-for", "198.51.100.4".parse().unwrap());
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(header::RETRY_AFTER));

    let mut other = json_request(Method::POST, "/api/v1/quotes/erp", &quote_payload());
    other
        .headers_mut()
        .insert("x-forwarded-for", "198.51.100.5".parse().unwrap());
    let response = app.router.clone().oneshot(other).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}
